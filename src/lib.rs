//! filebridge - file-mailbox bridge for streaming chat completions
//! 
//! An external producer drops a JSON chat request into a watched file; the
//! bridge posts it to an OpenAI-compatible streaming endpoint and appends
//! the generated text to a response file as it arrives.
//! 
//! # Architecture
//! 
//! - **streaming**: completion service seam, HTTP client, SSE line decoder
//! - **bridge**: mailbox files, watcher, single-flight event loop
//! - **telemetry**: counters and log setup
//! - **cli**: arguments and TOML configuration

pub mod errors;
pub mod types;
pub mod streaming;
pub mod bridge;
pub mod telemetry;
pub mod cli;

// Re-export commonly used types
pub use bridge::{CycleOutcome, FileBridge};
pub use errors::{BridgeError, Result};
pub use streaming::{CompletionClient, CompletionService};
