//! LLM integration
//!
//! Provides the chat completion client used by the gateway:
//! - Buffered and streamed completions against OpenAI-compatible endpoints
//! - Bounded exponential backoff keyed on the failure class
//! - Decoding of `data: ` event streams into text fragments

mod client;
mod retry;
mod stream;

pub use client::{
    parse_completion_body, ChatMessage, CompletionClient, CompletionOptions, CompletionRequest,
    CompletionResult, Role,
};
pub use retry::{RetryPolicy, RetryState};
pub use stream::{
    fragment_stream, parse_stream_line, FragmentStream, LineDecoder, StreamLine, DATA_PREFIX,
    DONE_SENTINEL,
};
