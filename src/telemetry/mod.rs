//! Telemetry system for the bridge
//!
//! Counts what happened to every notification and every processing cycle,
//! and installs the `tracing` subscriber used by the binary.

use crate::bridge::CycleOutcome;
use crate::errors::{BridgeError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Why a notification did not start a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Notification for a different file in the watched directory
    OtherPath,

    /// A request was already in flight
    Busy,

    /// Event channel was full
    ChannelFull,
}

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    EventAccepted,
    EventDropped {
        reason: DropReason,
    },
    FragmentAppended {
        bytes: usize,
    },
    CycleFinished {
        outcome: CycleOutcome,
        duration: Duration,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    pub events_accepted: usize,
    pub dropped_other_path: usize,
    pub dropped_busy: usize,
    pub dropped_channel_full: usize,
    pub fragments_appended: usize,
    pub bytes_appended: usize,
    pub cycles_completed: usize,
    pub cycles_blank: usize,
    pub read_failures: usize,
    pub malformed_requests: usize,
    pub connection_failures: usize,
    pub stream_failures: usize,
    pub write_failures: usize,
    pub panics: usize,
    pub total_cycle_ms: u64,
}

impl TelemetryStats {
    /// Notifications that were ignored for any reason
    pub fn total_dropped(&self) -> usize {
        self.dropped_other_path + self.dropped_busy + self.dropped_channel_full
    }

    /// Cycles that ran to cleanup, whatever their outcome
    pub fn total_cycles(&self) -> usize {
        self.cycles_completed
            + self.cycles_blank
            + self.read_failures
            + self.malformed_requests
            + self.connection_failures
            + self.stream_failures
            + self.write_failures
            + self.panics
    }

    /// Cycles that did not produce a complete response
    pub fn failed_cycles(&self) -> usize {
        self.read_failures
            + self.malformed_requests
            + self.connection_failures
            + self.stream_failures
            + self.write_failures
            + self.panics
    }
}

/// Telemetry collector
#[derive(Debug, Clone)]
pub struct TelemetryCollector {
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    /// Create a new telemetry collector
    pub fn new() -> Self {
        Self {
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        let mut stats = self.lock();
        match event {
            TelemetryEvent::EventAccepted => stats.events_accepted += 1,
            TelemetryEvent::EventDropped { reason } => match reason {
                DropReason::OtherPath => stats.dropped_other_path += 1,
                DropReason::Busy => stats.dropped_busy += 1,
                DropReason::ChannelFull => stats.dropped_channel_full += 1,
            },
            TelemetryEvent::FragmentAppended { bytes } => {
                stats.fragments_appended += 1;
                stats.bytes_appended += bytes;
            }
            TelemetryEvent::CycleFinished { outcome, duration } => {
                stats.total_cycle_ms += duration.as_millis() as u64;
                match outcome {
                    CycleOutcome::Completed { .. } => stats.cycles_completed += 1,
                    CycleOutcome::Blank => stats.cycles_blank += 1,
                    CycleOutcome::ReadFailed => stats.read_failures += 1,
                    CycleOutcome::MalformedRequest => stats.malformed_requests += 1,
                    CycleOutcome::ConnectionFailure => stats.connection_failures += 1,
                    CycleOutcome::StreamFailed { .. } => stats.stream_failures += 1,
                    CycleOutcome::WriteFailed { .. } => stats.write_failures += 1,
                    CycleOutcome::Panicked => stats.panics += 1,
                }
            }
        }
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        self.lock().clone()
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// One-line summary for the shutdown log
    pub fn summary(&self) -> String {
        let stats = self.get_stats();
        format!(
            "{} cycles ({} failed), {} fragments / {} bytes appended, {} notifications dropped, up {:?}",
            stats.total_cycles(),
            stats.failed_cycles(),
            stats.fragments_appended,
            stats.bytes_appended,
            stats.total_dropped(),
            self.elapsed(),
        )
    }

    // Counters stay meaningful after a panic elsewhere
    fn lock(&self) -> MutexGuard<'_, TelemetryStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the global fmt subscriber
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init_tracing(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| BridgeError::ConfigError(format!("Invalid log level: {}", e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| BridgeError::Generic(format!("Failed to install logger: {}", e)))
}
