//! File bridge event loop
//!
//! Turns request-file notifications into completion requests and streams the
//! answer into the response file. Notifications are consumed by one loop;
//! a notification that arrives while a request is in flight is dropped, not
//! queued.

use crate::bridge::mailbox::Mailbox;
use crate::bridge::state::{BridgeState, ProcessingFlag, ProcessingGuard};
use crate::bridge::watcher::{RequestWatcher, WatchEvent, DEFAULT_EVENT_CAPACITY};
use crate::errors::{BridgeError, Result};
use crate::streaming::CompletionService;
use crate::telemetry::{DropReason, TelemetryCollector, TelemetryEvent};
use crate::types::Request;
use futures_util::{FutureExt, StreamExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Default delay between a notification and reading the request file
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// How one processing cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Stream ran to the end and every fragment was appended
    Completed { fragments: usize, bytes: u64 },

    /// Request file was empty (typically our own clearing write)
    Blank,

    /// Request file could not be read
    ReadFailed,

    /// Request file was not a JSON object; no service call was made
    MalformedRequest,

    /// Service unreachable or non-success status; no fragments produced
    ConnectionFailure,

    /// Transport broke or stalled after `fragments` were appended
    StreamFailed { fragments: usize },

    /// Response file stopped accepting writes after `fragments` were appended
    WriteFailed { fragments: usize },

    /// Processing panicked; cleanup still ran
    Panicked,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Completed { .. } | CycleOutcome::Blank)
    }
}

/// Bridge tuning knobs
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Wait before reading, absorbs duplicate notifications of one write
    pub debounce: Duration,
    pub event_capacity: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Request-file to completion-service bridge
#[derive(Clone)]
pub struct FileBridge {
    service: Arc<dyn CompletionService>,
    mailbox: Arc<Mailbox>,
    flag: ProcessingFlag,
    settings: BridgeSettings,
    telemetry: TelemetryCollector,
}

impl FileBridge {
    pub fn new(mailbox: Mailbox, service: Arc<dyn CompletionService>) -> Self {
        Self {
            service,
            mailbox: Arc::new(mailbox),
            flag: ProcessingFlag::new(),
            settings: BridgeSettings::default(),
            telemetry: TelemetryCollector::new(),
        }
    }

    pub fn with_settings(mut self, settings: BridgeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn state(&self) -> BridgeState {
        self.flag.state()
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    /// Watch the request file until Ctrl-C
    pub async fn serve(&self) -> Result<()> {
        self.mailbox.prepare().await?;

        let (watcher, events) = RequestWatcher::start(
            self.mailbox.request_path(),
            self.settings.event_capacity,
            self.telemetry.clone(),
        )?;

        info!(
            request = %self.mailbox.request_path().display(),
            response = %self.mailbox.response_path().display(),
            directory = %watcher.directory().display(),
            endpoint = %self.service.endpoint(),
            "Watching for requests"
        );

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Unable to listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        };

        let result = self.run(events, shutdown).await;
        drop(watcher);
        result
    }

    /// Consume notifications until `shutdown` resolves or the channel closes
    ///
    /// A request already in flight is allowed to finish; there is no
    /// mid-stream cancellation.
    pub async fn run<F>(&self, mut events: mpsc::Receiver<WatchEvent>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut in_flight: Option<JoinHandle<CycleOutcome>> = None;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(handle) = self.handle_event(&event) {
                            in_flight = Some(handle);
                        }
                    }
                    None => {
                        debug!("Event channel closed");
                        break;
                    }
                },
            }
        }

        if let Some(handle) = in_flight {
            if !handle.is_finished() {
                info!("Waiting for in-flight request to finish");
            }
            handle
                .await
                .map_err(|e| BridgeError::Generic(format!("Processing task failed: {}", e)))?;
        }

        info!(summary = %self.telemetry.summary(), "Bridge stopped");
        Ok(())
    }

    /// Guarded dequeue: start a cycle for `event` or drop it
    ///
    /// Returns the cycle task when the event was accepted.
    pub fn handle_event(&self, event: &WatchEvent) -> Option<JoinHandle<CycleOutcome>> {
        if !event.targets(self.mailbox.request_path()) {
            self.telemetry.record(TelemetryEvent::EventDropped {
                reason: DropReason::OtherPath,
            });
            return None;
        }

        let Some(guard) = self.flag.try_acquire() else {
            debug!(path = %event.path.display(), "Request in flight, dropping notification");
            self.telemetry.record(TelemetryEvent::EventDropped {
                reason: DropReason::Busy,
            });
            return None;
        };

        self.telemetry.record(TelemetryEvent::EventAccepted);
        let bridge = self.clone();
        Some(tokio::spawn(async move { bridge.run_cycle(guard).await }))
    }

    /// One full cycle: process, then clean up and release the flag
    pub async fn run_cycle(&self, guard: ProcessingGuard) -> CycleOutcome {
        let span = info_span!("cycle", id = %Uuid::new_v4());

        async move {
            let started = Instant::now();

            let outcome = match AssertUnwindSafe(self.process()).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!("Processing panicked");
                    CycleOutcome::Panicked
                }
            };

            self.cleanup(&outcome).await;
            guard.release();

            let duration = started.elapsed();
            match &outcome {
                CycleOutcome::Completed { fragments, bytes } => info!(
                    fragments,
                    bytes,
                    duration_ms = duration.as_millis() as u64,
                    "Response complete"
                ),
                CycleOutcome::Blank => debug!("Request file empty, nothing to do"),
                other => debug!(outcome = ?other, "Cycle finished without a complete response"),
            }

            self.telemetry.record(TelemetryEvent::CycleFinished {
                outcome: outcome.clone(),
                duration,
            });
            outcome
        }
        .instrument(span)
        .await
    }

    async fn process(&self) -> CycleOutcome {
        if !self.settings.debounce.is_zero() {
            tokio::time::sleep(self.settings.debounce).await;
        }

        let raw = match self.mailbox.read_request().await {
            Ok(raw) => raw,
            Err(e @ BridgeError::MalformedRequest(_)) => {
                warn!(error = %e, "Invalid request payload");
                return CycleOutcome::MalformedRequest;
            }
            Err(e) => {
                error!(error = %e, "Failed to read request file");
                return CycleOutcome::ReadFailed;
            }
        };

        if raw.is_empty() {
            return CycleOutcome::Blank;
        }

        let request = match Request::parse(&raw) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Invalid request payload");
                return CycleOutcome::MalformedRequest;
            }
        };

        info!(
            model = request.model().unwrap_or("-"),
            messages = request.message_count().unwrap_or(0),
            "Processing request"
        );

        if let Err(e) = self.mailbox.remove_marker().await {
            warn!(error = %e, "Failed to remove completion marker");
        }

        let mut writer = match self.mailbox.reset_response().await {
            Ok(writer) => writer,
            Err(e) => {
                error!(error = %e, "Failed to reset response file");
                return CycleOutcome::WriteFailed { fragments: 0 };
            }
        };

        let mut stream = match self.service.submit(&request).await {
            Ok(stream) => stream,
            Err(BridgeError::ConnectionFailure {
                endpoint,
                status,
                body,
            }) => {
                error!(%endpoint, ?status, %body, "Completion service request failed");
                return CycleOutcome::ConnectionFailure;
            }
            Err(e) => {
                error!(endpoint = %self.service.endpoint(), error = %e, "Completion service request failed");
                return CycleOutcome::ConnectionFailure;
            }
        };

        let mut fragments = 0;
        while let Some(item) = stream.next().await {
            let fragment = match item {
                Ok(fragment) => fragment,
                Err(e) => {
                    warn!(error = %e, fragments, "Stream ended early");
                    return CycleOutcome::StreamFailed { fragments };
                }
            };

            if let Err(e) = writer.append(&fragment).await {
                error!(error = %e, fragments, "Failed to append fragment");
                return CycleOutcome::WriteFailed { fragments };
            }

            fragments += 1;
            self.telemetry.record(TelemetryEvent::FragmentAppended {
                bytes: fragment.len(),
            });
        }

        CycleOutcome::Completed {
            fragments,
            bytes: writer.bytes_written(),
        }
    }

    async fn cleanup(&self, outcome: &CycleOutcome) {
        if let Err(e) = self.mailbox.clear_request().await {
            error!(error = %e, "Failed to clear request file");
        }

        if *outcome != CycleOutcome::Blank {
            if let Err(e) = self.mailbox.write_marker().await {
                warn!(error = %e, "Failed to write completion marker");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::FragmentStream;
    use crate::types::Fragment;
    use async_trait::async_trait;
    use futures_util::stream;
    use tempfile::TempDir;

    /// Service that must never be reached
    struct Unreachable;

    #[async_trait]
    impl CompletionService for Unreachable {
        async fn submit(&self, _request: &Request) -> Result<FragmentStream> {
            panic!("service must not be called");
        }

        fn endpoint(&self) -> &str {
            "unreachable"
        }
    }

    /// Service returning a fixed list of fragments
    struct Fixed(Vec<&'static str>);

    #[async_trait]
    impl CompletionService for Fixed {
        async fn submit(&self, _request: &Request) -> Result<FragmentStream> {
            let items: Vec<Result<Fragment>> = self
                .0
                .iter()
                .filter_map(|text| Fragment::new(*text))
                .map(Ok)
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }

        fn endpoint(&self) -> &str {
            "fixed"
        }
    }

    fn bridge(dir: &TempDir, service: Arc<dyn CompletionService>) -> FileBridge {
        let mailbox = Mailbox::new(dir.path().join("input.txt"), dir.path().join("output.txt"));
        FileBridge::new(mailbox, service).with_settings(BridgeSettings {
            debounce: Duration::ZERO,
            event_capacity: 8,
        })
    }

    #[tokio::test]
    async fn test_other_path_is_dropped() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir, Arc::new(Unreachable));

        let handle = bridge.handle_event(&WatchEvent::modified(dir.path().join("output.txt")));
        assert!(handle.is_none());
        assert_eq!(bridge.telemetry().get_stats().dropped_other_path, 1);
        assert_eq!(bridge.state(), BridgeState::Idle);
    }

    #[tokio::test]
    async fn test_busy_event_is_dropped() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir, Arc::new(Unreachable));

        let _guard = bridge.flag.try_acquire().unwrap();
        let handle = bridge.handle_event(&WatchEvent::modified(dir.path().join("input.txt")));

        assert!(handle.is_none());
        assert_eq!(bridge.telemetry().get_stats().dropped_busy, 1);
    }

    #[tokio::test]
    async fn test_blank_request_leaves_files_alone() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir, Arc::new(Unreachable));
        std::fs::write(dir.path().join("input.txt"), "  \n").unwrap();
        std::fs::write(dir.path().join("output.txt"), "previous answer").unwrap();

        let handle = bridge
            .handle_event(&WatchEvent::modified(dir.path().join("input.txt")))
            .unwrap();

        assert_eq!(handle.await.unwrap(), CycleOutcome::Blank);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("output.txt")).unwrap(),
            "previous answer"
        );
        assert_eq!(bridge.state(), BridgeState::Idle);
    }

    #[tokio::test]
    async fn test_completed_cycle() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir, Arc::new(Fixed(vec!["Hel", "", "lo"])));
        std::fs::write(dir.path().join("input.txt"), r#"{"model":"x","messages":[]}"#).unwrap();

        let handle = bridge
            .handle_event(&WatchEvent::modified(dir.path().join("input.txt")))
            .unwrap();

        assert_eq!(
            handle.await.unwrap(),
            CycleOutcome::Completed { fragments: 2, bytes: 5 }
        );
        assert_eq!(std::fs::read_to_string(dir.path().join("output.txt")).unwrap(), "Hello");
        assert_eq!(std::fs::read_to_string(dir.path().join("input.txt")).unwrap(), "");
    }

    #[tokio::test]
    async fn test_non_utf8_request_is_malformed() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir, Arc::new(Unreachable));
        std::fs::write(dir.path().join("input.txt"), [0x7b, 0xc3, 0x28, 0x7d]).unwrap();

        let handle = bridge
            .handle_event(&WatchEvent::modified(dir.path().join("input.txt")))
            .unwrap();

        assert_eq!(handle.await.unwrap(), CycleOutcome::MalformedRequest);
        assert!(std::fs::read(dir.path().join("input.txt")).unwrap().is_empty());
        assert_eq!(bridge.state(), BridgeState::Idle);
        assert_eq!(bridge.telemetry().get_stats().malformed_requests, 1);
    }

    #[tokio::test]
    async fn test_panicking_service_still_cleans_up() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir, Arc::new(Unreachable));
        std::fs::write(dir.path().join("input.txt"), r#"{"model":"x"}"#).unwrap();

        let handle = bridge
            .handle_event(&WatchEvent::modified(dir.path().join("input.txt")))
            .unwrap();

        assert_eq!(handle.await.unwrap(), CycleOutcome::Panicked);
        assert_eq!(std::fs::read_to_string(dir.path().join("input.txt")).unwrap(), "");
        assert_eq!(bridge.state(), BridgeState::Idle);
        assert_eq!(bridge.telemetry().get_stats().panics, 1);
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir, Arc::new(Fixed(vec!["ok"])));
        std::fs::write(dir.path().join("input.txt"), r#"{"model":"x"}"#).unwrap();

        let (tx, rx) = mpsc::channel(4);
        tx.send(WatchEvent::modified(dir.path().join("input.txt")))
            .await
            .unwrap();
        drop(tx);

        bridge.run(rx, std::future::pending()).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("output.txt")).unwrap(), "ok");
        assert_eq!(bridge.telemetry().get_stats().cycles_completed, 1);
    }

    #[test]
    fn test_outcome_success() {
        assert!(CycleOutcome::Completed { fragments: 0, bytes: 0 }.is_success());
        assert!(CycleOutcome::Blank.is_success());
        assert!(!CycleOutcome::ConnectionFailure.is_success());
        assert!(!CycleOutcome::StreamFailed { fragments: 1 }.is_success());
    }
}
