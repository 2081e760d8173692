//! Streaming client module
//! 
//! Provides the completion service seam, its HTTP implementation and the
//! incremental SSE line decoder.

pub mod client;
pub mod parser;

// Re-export commonly used types
pub use client::{
    fragment_stream, ClientSettings, CompletionClient, CompletionService, FragmentStream,
    DEFAULT_ENDPOINT,
};
pub use parser::{parse_delta_line, LineEvent, SseLineDecoder, MAX_LINE_BYTES};
