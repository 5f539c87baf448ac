//! CLI command handlers

pub mod ask;
pub mod prompt;
pub mod serve;
pub mod status;
