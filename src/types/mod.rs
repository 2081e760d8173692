//! Type definitions module
//! 
//! Payloads that travel through the bridge: the request handed to the
//! completion service and the fragments streamed back.

pub mod messages;

// Re-export commonly used types
pub use messages::{Fragment, Request};
