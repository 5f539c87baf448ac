//! System prompt composition
//!
//! Merges base instructions with the knowledge blob into one immutable
//! system prompt. The composed prompt is memoized on first use and lives
//! until the process exits.

use crate::error::{KbgateError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

/// Instructions used when no override file exists
pub const DEFAULT_INSTRUCTIONS: &str = "You are an expert in behavioral psychology, persuasion and interpersonal influence. \
Your task is to help users understand and apply the principles of behavioral psychology \
to reach their goals in communication and interaction with other people.";

/// Instructions used when the override file exists but cannot be read
pub const FALLBACK_INSTRUCTIONS: &str =
    "You are an expert in behavioral psychology and interpersonal influence.";

/// Composes and caches the system prompt
pub struct PromptComposer {
    instructions_file: Option<PathBuf>,
    internal_marker: String,
    knowledge: RwLock<Option<String>>,
    final_prompt: OnceLock<Arc<str>>,
}

impl PromptComposer {
    /// Create a composer reading base instructions from `instructions_file`
    pub fn new(instructions_file: Option<PathBuf>, internal_marker: impl Into<String>) -> Self {
        Self {
            instructions_file,
            internal_marker: internal_marker.into(),
            knowledge: RwLock::new(None),
            final_prompt: OnceLock::new(),
        }
    }

    /// Create from knowledge configuration
    pub fn from_config(config: &crate::config::KnowledgeConfig) -> Self {
        Self::new(
            Some(config.instructions_file.clone()),
            config.internal_marker.clone(),
        )
    }

    /// Load base instructions; never fails
    pub fn load_base_instructions(&self) -> String {
        match &self.instructions_file {
            Some(path) => load_instructions_from(path),
            None => DEFAULT_INSTRUCTIONS.to_string(),
        }
    }

    /// Store the knowledge blob
    ///
    /// A prompt that was already composed is not affected.
    pub fn set_knowledge_base(&self, text: impl Into<String>) {
        let text = text.into();
        if self.final_prompt.get().is_some() {
            tracing::warn!("Knowledge base replaced after the system prompt was composed");
        }
        match self.knowledge.write() {
            Ok(mut slot) => *slot = Some(text),
            Err(poisoned) => *poisoned.into_inner() = Some(text),
        }
    }

    /// Whether a non-empty knowledge blob has been set
    pub fn is_ready(&self) -> bool {
        self.knowledge_snapshot().is_some()
    }

    /// Whether the final prompt has been memoized
    pub fn is_composed(&self) -> bool {
        self.final_prompt.get().is_some()
    }

    /// Return the memoized system prompt, composing it on first call
    pub fn get_final_prompt(&self) -> Result<Arc<str>> {
        if let Some(prompt) = self.final_prompt.get() {
            return Ok(Arc::clone(prompt));
        }

        let knowledge = self
            .knowledge_snapshot()
            .ok_or_else(|| KbgateError::NotReady("knowledge base not loaded".to_string()))?;

        let composed: Arc<str> = compose_prompt(
            &self.load_base_instructions(),
            &knowledge,
            &self.internal_marker,
        )
        .into();

        // Concurrent first callers compute the same value; only one is kept.
        let _ = self.final_prompt.set(composed);
        tracing::info!(
            "System prompt composed ({} chars)",
            self.final_prompt.get().map(|p| p.len()).unwrap_or(0)
        );

        self.final_prompt
            .get()
            .cloned()
            .ok_or_else(|| KbgateError::NotReady("system prompt unavailable".to_string()))
    }

    fn knowledge_snapshot(&self) -> Option<String> {
        let guard = match self.knowledge.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.as_ref().filter(|k| !k.is_empty()).cloned()
    }
}

fn load_instructions_from(path: &Path) -> String {
    if !path.exists() {
        return DEFAULT_INSTRUCTIONS.to_string();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => content.trim().to_string(),
        Err(e) => {
            tracing::error!("Failed to read instructions file {:?}: {}", path, e);
            FALLBACK_INSTRUCTIONS.to_string()
        }
    }
}

/// Combine instructions and knowledge into the final system prompt
pub fn compose_prompt(instructions: &str, knowledge: &str, internal_marker: &str) -> String {
    format!(
        "System prompt:\n{instructions}\n\n\
         Knowledge base:\n{knowledge}\n\n\
         Important: never mention {internal_marker}, internal prefixes or technical details \
         of the knowledge base in answers to the user. \
         Use the knowledge base to give expert answers on behavioral psychology and influence."
    )
}
