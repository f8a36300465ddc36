//! Config file watcher for hot reload
//!
//! Watches the config file's directory (so atomic "write temp + rename" saves
//! are seen) and collapses bursts of change events into a single callback
//! after a quiet window.

use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::constants::config::{DEBOUNCE_MS, POLL_INTERVAL_MS};
use crate::timer::sleep_until_deadline;

/// Live file watch; dropping it (or calling [`WatchHandle::cancel`]) stops it
pub struct WatchHandle {
    path: PathBuf,
    watcher: Option<Box<dyn Watcher + Send>>,
    debounce_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("path", &self.path)
            .field("active", &self.is_active())
            .finish()
    }
}

impl WatchHandle {
    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop watching. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        // Observer first so no raw event lands after the task is gone
        let had_watcher = self.watcher.take().is_some();
        if let Some(task) = self.debounce_task.take() {
            task.abort();
        }
        if had_watcher {
            info!(path = %self.path.display(), "Stopped watching config file");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Watch `path` and call `on_change` once per debounced burst of edits
///
/// The consumer re-reads the file itself; the callback carries no data.
/// Must be called from within a tokio runtime.
pub fn watch<F>(path: &Path, on_change: F) -> Result<WatchHandle>
where
    F: Fn() + Send + 'static,
{
    let filename = path
        .file_name()
        .context("Config path has no filename")?
        .to_os_string();
    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let (raw_tx, raw_rx) = unbounded_channel::<()>();
    let mut watcher = create_watcher(filename, raw_tx)?;
    watcher
        .watch(&parent_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch config directory: {}", parent_dir.display()))?;

    let debounce_task = tokio::spawn(debounce(
        raw_rx,
        Duration::from_millis(DEBOUNCE_MS),
        on_change,
    ));

    info!(path = %path.display(), debounce_ms = DEBOUNCE_MS, "Config hot reload: watching");

    Ok(WatchHandle {
        path: path.to_path_buf(),
        watcher: Some(watcher),
        debounce_task: Some(debounce_task),
    })
}

/// Filter raw notify events down to modify/create on our file name
fn make_event_handler(
    filename: OsString,
    raw_tx: UnboundedSender<()>,
) -> impl Fn(notify::Result<Event>) + Send + 'static {
    move |result: notify::Result<Event>| {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Config watcher error");
                return;
            }
        };

        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }

        let matches_config = event
            .paths
            .iter()
            .any(|p| p.file_name().map(|f| f == filename).unwrap_or(false));
        if !matches_config {
            return;
        }

        trace!(kind = ?event.kind, "Raw config file event");
        // Receiver gone means the handle was cancelled
        let _ = raw_tx.send(());
    }
}

/// Native backend first, polling if that cannot start (containers, network mounts)
fn create_watcher(filename: OsString, raw_tx: UnboundedSender<()>) -> Result<Box<dyn Watcher + Send>> {
    match notify::recommended_watcher(make_event_handler(filename.clone(), raw_tx.clone())) {
        Ok(w) => {
            debug!("Config watcher: using native backend");
            Ok(Box::new(w))
        }
        Err(e) => {
            warn!(error = %e, "Config watcher: native backend unavailable, falling back to polling");
            let poll_watcher = PollWatcher::new(
                make_event_handler(filename, raw_tx),
                NotifyConfig::default().with_poll_interval(Duration::from_millis(POLL_INTERVAL_MS)),
            )
            .context("Failed to create fallback PollWatcher")?;
            Ok(Box::new(poll_watcher))
        }
    }
}

/// Fire `on_change` once `window` has passed without a new raw event
///
/// Every raw event replaces the pending deadline. Ends when the sending side
/// is dropped; a pending deadline at that point is discarded.
pub(crate) async fn debounce<F>(mut raw: UnboundedReceiver<()>, window: Duration, on_change: F)
where
    F: Fn(),
{
    let mut deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            event = raw.recv() => match event {
                Some(()) => deadline = Some(Instant::now() + window),
                None => break,
            },
            () = sleep_until_deadline(deadline) => {
                deadline = None;
                debug!("Config file settled, reloading");
                on_change();
            }
        }
    }
    if deadline.is_some() {
        debug!("Config watcher closed with a reload pending, dropping it");
    }
}
