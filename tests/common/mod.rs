//! Shared fixtures for bridge integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use filebridge::bridge::{BridgeSettings, Mailbox};
use filebridge::streaming::{CompletionService, FragmentStream};
use filebridge::types::{Fragment, Request};
use filebridge::{BridgeError, FileBridge, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex, Notify};

/// What a scripted stream does after its fragments
#[derive(Debug, Clone)]
pub enum Ending {
    Close,
    Fail(String),
}

/// Completion service double with controllable timing
pub struct ScriptedService {
    fragments: Vec<String>,
    ending: Ending,
    gate: Option<Arc<Notify>>,
    refuse: bool,
    calls: AtomicUsize,
    submitted_tx: mpsc::UnboundedSender<Request>,
    submitted_rx: Mutex<mpsc::UnboundedReceiver<Request>>,
}

impl ScriptedService {
    pub fn streaming(fragments: &[&str]) -> Self {
        let (submitted_tx, submitted_rx) = mpsc::unbounded_channel();
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            ending: Ending::Close,
            gate: None,
            refuse: false,
            calls: AtomicUsize::new(0),
            submitted_tx,
            submitted_rx: Mutex::new(submitted_rx),
        }
    }

    /// Stream holds its fragments back until `release` is called
    pub fn gated(fragments: &[&str]) -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Self::streaming(fragments)
        }
    }

    /// Every submit fails with a 503
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::streaming(&[])
        }
    }

    pub fn ending_with(mut self, ending: Ending) -> Self {
        self.ending = ending;
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait until the bridge has submitted a request
    pub async fn next_submitted(&self) -> Request {
        let mut rx = self.submitted_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no request submitted within 5s")
            .expect("service dropped")
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn submit(&self, request: &Request) -> Result<FragmentStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.submitted_tx.send(request.clone());

        if self.refuse {
            return Err(BridgeError::ConnectionFailure {
                endpoint: self.endpoint().to_string(),
                status: Some(503),
                body: "no model loaded".to_string(),
            });
        }

        let fragments = self.fragments.clone();
        let ending = self.ending.clone();
        let gate = self.gate.clone();

        Ok(Box::pin(async_stream::stream! {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            for text in fragments {
                if let Some(fragment) = Fragment::new(text) {
                    yield Ok(fragment);
                }
            }
            if let Ending::Fail(reason) = ending {
                yield Err(BridgeError::StreamingError(reason));
            }
        }))
    }

    fn endpoint(&self) -> &str {
        "scripted://completions"
    }
}

/// Temporary mailbox directory with a bridge wired to `service`
pub struct Harness {
    pub dir: TempDir,
    pub bridge: FileBridge,
}

impl Harness {
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        let dir = TempDir::new().unwrap();
        let mailbox = Mailbox::new(dir.path().join("input.txt"), dir.path().join("output.txt"));
        let bridge = FileBridge::new(mailbox, service).with_settings(BridgeSettings {
            debounce: Duration::ZERO,
            event_capacity: 16,
        });
        Self { dir, bridge }
    }

    pub fn request_path(&self) -> PathBuf {
        self.dir.path().join("input.txt")
    }

    pub fn response_path(&self) -> PathBuf {
        self.dir.path().join("output.txt")
    }

    pub fn write_request(&self, contents: &str) {
        std::fs::write(self.request_path(), contents).unwrap();
    }

    pub fn request(&self) -> String {
        std::fs::read_to_string(self.request_path()).unwrap_or_default()
    }

    pub fn response(&self) -> String {
        std::fs::read_to_string(self.response_path()).unwrap_or_default()
    }
}

pub const HELLO_REQUEST: &str = r#"{"model":"x","messages":[{"role":"user","content":"hi"}]}"#;
