//! Prompt command

use crate::app::{OutputFormat, PromptArgs};
use anyhow::Result;
use kbgate_core::knowledge::{load_documents, render_knowledge_base};
use kbgate_core::{Config, PromptComposer};

pub async fn run(args: PromptArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let documents = load_documents(&config.knowledge.dir)?;
    let knowledge = render_knowledge_base(&documents);

    let composer = PromptComposer::from_config(&config.knowledge);
    composer.set_knowledge_base(knowledge.clone());
    let prompt = composer.get_final_prompt()?;

    if !args.stats {
        match format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({ "prompt": &*prompt }))?
                );
            }
            OutputFormat::Cli => println!("{}", prompt),
        }
        return Ok(());
    }

    let instructions = composer.load_base_instructions();
    match format {
        OutputFormat::Json => {
            let stats = serde_json::json!({
                "documents": documents.len(),
                "knowledge_chars": knowledge.chars().count(),
                "instructions_chars": instructions.chars().count(),
                "prompt_chars": prompt.chars().count(),
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        OutputFormat::Cli => {
            println!("Documents:       {}", documents.len());
            for doc in &documents {
                println!("  {:<28} {:>8} chars", doc.name, doc.content.chars().count());
            }
            println!("Knowledge:       {} chars", knowledge.chars().count());
            println!("Instructions:    {} chars", instructions.chars().count());
            println!("System prompt:   {} chars", prompt.chars().count());
        }
    }
    Ok(())
}
