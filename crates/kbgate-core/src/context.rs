//! Application context shared by request handlers
//!
//! Built once at startup and passed to every handler. Holds the prompt
//! composer (with its memoized system prompt) and the completion client.

use crate::config::{Config, GenerationConfig};
use crate::error::Result;
use crate::knowledge::KnowledgeLoader;
use crate::llm::{ChatMessage, CompletionClient, CompletionOptions, FragmentStream};
use crate::prompt::PromptComposer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Readiness report for the status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub knowledge_base_loaded: bool,
    pub knowledge_base_chars: usize,
    pub prompt_composer_ready: bool,
    pub prompt_composed: bool,
    pub completion_client_ready: bool,
    pub model: String,
}

pub struct AppContext {
    prompt: PromptComposer,
    client: CompletionClient,
    generation: GenerationConfig,
    knowledge_chars: usize,
}

impl AppContext {
    /// Load the knowledge base and construct the client
    ///
    /// Fails when the configuration is incomplete or the knowledge directory
    /// is missing.
    pub fn initialize(config: &Config) -> Result<Self> {
        config.validate()?;

        let loader = KnowledgeLoader::new(&config.knowledge.dir);
        tracing::info!("Loading knowledge base from {}", loader.dir().display());
        let knowledge = loader.load()?;
        tracing::info!("Knowledge base loaded ({} chars)", knowledge.chars().count());

        let prompt = PromptComposer::from_config(&config.knowledge);
        let client = CompletionClient::new(config.llm_service.clone())?;
        tracing::info!(
            "Completion client ready (model {}, endpoint {})",
            client.model_name(),
            client.endpoint()
        );

        Ok(Self::from_parts(prompt, client, config.generation, knowledge))
    }

    /// Assemble a context from already constructed parts
    pub fn from_parts(
        prompt: PromptComposer,
        client: CompletionClient,
        generation: GenerationConfig,
        knowledge: String,
    ) -> Self {
        let knowledge_chars = knowledge.chars().count();
        prompt.set_knowledge_base(knowledge);
        Self {
            prompt,
            client,
            generation,
            knowledge_chars,
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// The memoized system prompt
    pub fn system_prompt(&self) -> Result<Arc<str>> {
        self.prompt.get_final_prompt()
    }

    /// Options used for gateway requests
    pub fn options(&self) -> CompletionOptions {
        self.generation.into()
    }

    /// Buffered answer to a single user message
    pub async fn chat(&self, message: &str) -> Result<String> {
        self.chat_with(message, self.options()).await
    }

    /// Buffered answer with explicit generation options
    pub async fn chat_with(&self, message: &str, options: CompletionOptions) -> Result<String> {
        let system_prompt = self.system_prompt()?;
        let options = CompletionOptions {
            stream: false,
            ..options
        };
        self.client
            .complete(vec![ChatMessage::user(message)], &system_prompt, options)
            .await?
            .into_text()
            .await
    }

    /// Streamed answer to a single user message
    pub async fn chat_stream(&self, message: &str) -> Result<FragmentStream> {
        self.chat_stream_with(message, self.options()).await
    }

    /// Streamed answer with explicit generation options
    pub async fn chat_stream_with(
        &self,
        message: &str,
        options: CompletionOptions,
    ) -> Result<FragmentStream> {
        let system_prompt = self.system_prompt()?;
        Ok(self
            .client
            .complete(
                vec![ChatMessage::user(message)],
                &system_prompt,
                options.streaming(),
            )
            .await?
            .into_stream())
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            knowledge_base_loaded: self.knowledge_chars > 0,
            knowledge_base_chars: self.knowledge_chars,
            prompt_composer_ready: self.prompt.is_ready(),
            prompt_composed: self.prompt.is_composed(),
            completion_client_ready: true,
            model: self.client.model_name().to_string(),
        }
    }
}
