//! Status command

use crate::app::OutputFormat;
use anyhow::Result;
use kbgate_core::{knowledge::load_documents, Config};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct StatusReport {
    config_path: String,
    knowledge_dir: String,
    knowledge_dir_exists: bool,
    knowledge_documents: usize,
    knowledge_base_chars: usize,
    knowledge_base_loaded: bool,
    instructions_file: String,
    instructions_override: bool,
    api_key_configured: bool,
    model: String,
    endpoint: String,
    listen: String,
}

/// Report readiness without contacting the completion service
pub async fn run(
    config: &Config,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_path);

    let knowledge_dir = &config.knowledge.dir;
    let knowledge_dir_exists = knowledge_dir.is_dir();
    let documents = if knowledge_dir_exists {
        load_documents(knowledge_dir)?
    } else {
        Vec::new()
    };
    let knowledge_base_chars: usize = documents.iter().map(|d| d.content.chars().count()).sum();

    let report = StatusReport {
        config_path: config_path.display().to_string(),
        knowledge_dir: knowledge_dir.display().to_string(),
        knowledge_dir_exists,
        knowledge_documents: documents.len(),
        knowledge_base_chars,
        knowledge_base_loaded: !documents.is_empty(),
        instructions_file: config.knowledge.instructions_file.display().to_string(),
        instructions_override: config.knowledge.instructions_file.is_file(),
        api_key_configured: config.llm_service.api_key.is_some(),
        model: config.llm_service.model.clone(),
        endpoint: config.llm_service.url.clone(),
        listen: config.server.bind_addr(),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Cli => {
            println!("Config:          {}", report.config_path);
            println!();
            println!("Knowledge base:");
            println!(
                "  Directory:     {}{}",
                report.knowledge_dir,
                if report.knowledge_dir_exists { "" } else { " (missing)" }
            );
            println!("  Documents:     {}", report.knowledge_documents);
            println!("  Characters:    {}", report.knowledge_base_chars);
            println!(
                "  Instructions:  {}",
                if report.instructions_override {
                    report.instructions_file.as_str()
                } else {
                    "built-in default"
                }
            );
            println!();
            println!("Completion service:");
            println!("  Endpoint:      {}", report.endpoint);
            println!("  Model:         {}", report.model);
            println!(
                "  API key:       {}",
                if report.api_key_configured { "configured" } else { "missing" }
            );
            println!();
            println!("Gateway:         {}", report.listen);
        }
    }
    Ok(())
}
