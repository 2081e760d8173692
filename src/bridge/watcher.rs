//! Filesystem notifications for the request file
//!
//! The watcher callback runs on notify's own thread and only forwards
//! events into a bounded channel. All decisions (which file, busy or not)
//! are taken by the single consuming loop in `FileBridge::run`.

use crate::errors::Result;
use crate::telemetry::{DropReason, TelemetryCollector, TelemetryEvent};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

/// Default event channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Kind of change reported for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Created,
    Modified,
}

/// One filesystem notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchKind,
}

impl WatchEvent {
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: WatchKind::Modified,
        }
    }

    /// Whether the event concerns `target`
    ///
    /// Only file names are compared: the watch is non-recursive on the
    /// target's directory, and backends differ on whether they report
    /// absolute or canonical paths.
    pub fn targets(&self, target: &Path) -> bool {
        match (self.path.file_name(), target.file_name()) {
            (Some(event_name), Some(target_name)) => event_name == target_name,
            _ => false,
        }
    }
}

/// Map a notify event to bridge events; access, metadata and removal
/// notifications are discarded
pub fn classify(event: Event) -> Vec<WatchEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => WatchKind::Created,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => WatchKind::Modified,
        _ => return Vec::new(),
    };

    event
        .paths
        .into_iter()
        .map(|path| WatchEvent { path, kind })
        .collect()
}

/// Live watch on the request file's directory
///
/// Dropping it stops notifications and closes the channel.
pub struct RequestWatcher {
    _watcher: RecommendedWatcher,
    directory: PathBuf,
}

impl RequestWatcher {
    /// Start watching and return the receiving end of the event channel
    pub fn start(
        request_path: &Path,
        capacity: usize,
        telemetry: TelemetryCollector,
    ) -> Result<(Self, mpsc::Receiver<WatchEvent>)> {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Filesystem watch error");
                    return;
                }
            };

            for watch_event in classify(event) {
                match tx.try_send(watch_event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(dropped)) => {
                        trace!(path = %dropped.path.display(), "Event channel full, dropping notification");
                        telemetry.record(TelemetryEvent::EventDropped {
                            reason: DropReason::ChannelFull,
                        });
                    }
                    Err(TrySendError::Closed(_)) => return,
                }
            }
        })?;

        let directory = watch_directory(request_path);
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        Ok((
            Self {
                _watcher: watcher,
                directory,
            },
            rx,
        ))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Directory holding `request_path`, `.` for bare file names
pub fn watch_directory(request_path: &Path) -> PathBuf {
    match request_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
