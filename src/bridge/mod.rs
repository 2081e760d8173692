//! File bridge module
//! 
//! Watches the request mailbox file, runs one completion request at a time
//! and streams the answer into the response mailbox file.

pub mod mailbox;
pub mod runner;
pub mod state;
pub mod watcher;

// Re-export commonly used types
pub use mailbox::{Durability, Mailbox, ResponseWriter, DEFAULT_REQUEST_FILE, DEFAULT_RESPONSE_FILE};
pub use runner::{BridgeSettings, CycleOutcome, FileBridge, DEFAULT_DEBOUNCE};
pub use state::{BridgeState, ProcessingFlag, ProcessingGuard};
pub use watcher::{RequestWatcher, WatchEvent, WatchKind, DEFAULT_EVENT_CAPACITY};
