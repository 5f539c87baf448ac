//! Kbgate Core Library
//!
//! Core functionality for the kbgate knowledge-augmented LLM proxy.
//!
//! # Features
//! - Knowledge ingestion from plain text and PDF documents
//! - A system prompt composed once and memoized for the process lifetime
//! - Buffered and streamed chat completions against OpenAI-compatible APIs
//! - Bounded exponential backoff keyed on the upstream failure class

pub mod config;
pub mod context;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod prompt;

pub use config::{Config, GenerationConfig, KnowledgeConfig, LLMServiceConfig, ServerConfig};
pub use context::{AppContext, ServiceStatus};
pub use error::{KbgateError, Error, Result};
pub use knowledge::{load_knowledge_base, KnowledgeDocument, KnowledgeLoader};
pub use llm::{
    ChatMessage, CompletionClient, CompletionOptions, CompletionRequest, CompletionResult,
    FragmentStream, RetryPolicy, Role,
};
pub use prompt::PromptComposer;

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "kbgate";
