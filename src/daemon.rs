//! Daemon: owns the badge and runs the single-threaded event loop
//!
//! Every mutation of the badge happens on this loop. Other threads (control
//! listener, X11 event pump, file watcher) only send messages to it.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc::{self, UnboundedReceiver, unbounded_channel};
use tracing::{debug, info, warn};

use crate::badge::Badge;
use crate::config::{Config, ConfigStore, WatchHandle};
use crate::constants::control::CALL_QUEUE_DEPTH;
use crate::constants::layout::{HEADLESS_DISPLAY_HEIGHT, HEADLESS_DISPLAY_WIDTH};
use crate::control::{dispatch, into_reply};
use crate::display::{DisplayTopology, StaticDisplays};
use crate::ipc::{ControlCall, ControlServer, spawn_control_listener};
use crate::surface::{HeadlessSurface, Metrics, Surface};
use crate::timer::sleep_until_deadline;
use crate::x11::{self, DisplayEvent};

#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub config_path: PathBuf,
    pub socket_path: PathBuf,
    /// Skip the X server entirely
    pub headless: bool,
    /// Flash `listening` briefly at startup
    pub self_test: bool,
}

/// Surface and topology the badge will drive
struct Backend {
    surface: Box<dyn Surface>,
    displays: Box<dyn DisplayTopology>,
    events: Option<UnboundedReceiver<DisplayEvent>>,
}

impl Backend {
    fn headless(config: &Config) -> Self {
        Self {
            surface: Box::new(HeadlessSurface::new(Metrics::from_config(config))),
            displays: Box::new(StaticDisplays::single(HEADLESS_DISPLAY_WIDTH, HEADLESS_DISPLAY_HEIGHT)),
            events: None,
        }
    }

    fn open(config: &Config, headless: bool) -> Self {
        if headless {
            info!("Running headless by request");
            return Self::headless(config);
        }
        match x11::connect(config) {
            Ok(backend) => Self {
                surface: Box::new(backend.surface),
                displays: Box::new(backend.displays),
                events: Some(backend.events),
            },
            Err(e) => {
                warn!(error = ?e, "No display server, continuing headless");
                Self::headless(config)
            }
        }
    }
}

/// Next display event; pends forever once the source is gone
async fn next_display_event(events: &mut Option<UnboundedReceiver<DisplayEvent>>) -> DisplayEvent {
    if let Some(rx) = events {
        if let Some(event) = rx.recv().await {
            return event;
        }
        debug!("Display event source closed");
        *events = None;
    }
    std::future::pending().await
}

/// SIGINT and SIGTERM listeners, installed once for the life of the loop
///
/// A signal delivered while the loop is busy stays queued until the next `recv`.
struct ShutdownSignals {
    sigint: Signal,
    sigterm: Signal,
}

impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?,
            sigterm: signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?,
        })
    }

    /// Name of the next termination signal
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
        }
    }
}

/// Run the daemon until SIGINT or SIGTERM
pub fn run(options: DaemonOptions) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    runtime.block_on(run_loop(options))
}

async fn run_loop(options: DaemonOptions) -> Result<()> {
    let store = ConfigStore::new(options.config_path.clone());
    store.ensure_document();
    let config = Arc::new(store.load());
    info!(config = ?config, "Loaded configuration");

    let backend = Backend::open(&config, options.headless);
    let mut display_events = backend.events;
    let mut badge = Badge::new(Arc::clone(&config), backend.surface, backend.displays);

    let server = ControlServer::bind_to(options.socket_path.clone())?;
    let (call_tx, mut calls) = mpsc::channel::<ControlCall>(CALL_QUEUE_DEPTH);
    spawn_control_listener(&server, call_tx)?;

    let (reload_tx, mut reloads) = unbounded_channel::<()>();
    let mut watch: Option<WatchHandle> = match store.watch(move || {
        let _ = reload_tx.send(());
    }) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(path = %store.path().display(), error = ?e, "Hot reload disabled");
            None
        }
    };

    if options.self_test {
        badge.power_on_self_test(Instant::now());
    }

    let mut signals = ShutdownSignals::install()?;

    info!(socket = %server.path().display(), "ai-overlay running");

    loop {
        let deadline = badge.next_deadline().map(tokio::time::Instant::from_std);
        tokio::select! {
            Some(call) = calls.recv() => {
                let reply = into_reply(dispatch(&mut badge, &call.request, Instant::now()));
                if call.reply.send(reply).is_err() {
                    debug!(method = %call.request.method, "Control caller hung up before the reply");
                }
            }
            Some(()) = reloads.recv() => {
                let config = Arc::new(store.load());
                info!(path = %store.path().display(), "Config reloaded");
                badge.replace_config(config, Instant::now());
            }
            event = next_display_event(&mut display_events) => match event {
                DisplayEvent::TopologyChanged => badge.on_topology_changed(),
                DisplayEvent::Exposed => badge.on_exposed(),
            },
            _ = sleep_until_deadline(deadline) => {
                badge.advance(Instant::now());
            }
            name = signals.recv() => {
                info!(signal = name, "Received termination signal, shutting down");
                break;
            }
        }
    }

    badge.stop_pulse();
    if let Some(mut handle) = watch.take() {
        handle.cancel();
    }
    calls.close();
    badge.shutdown();
    drop(server);
    info!("ai-overlay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_display_events_pend_after_source_closes() {
        let (tx, rx) = unbounded_channel();
        let mut events = Some(rx);
        tx.send(DisplayEvent::Exposed).unwrap();
        drop(tx);

        assert_eq!(next_display_event(&mut events).await, DisplayEvent::Exposed);

        let pending = tokio::time::timeout(std::time::Duration::from_secs(5), next_display_event(&mut events)).await;
        assert!(pending.is_err());
        assert!(events.is_none());
    }

    #[tokio::test]
    async fn test_signal_sent_between_polls_is_not_lost() {
        let mut signals = ShutdownSignals::install().unwrap();

        // Delivered while nothing is awaiting `recv`
        let status = std::process::Command::new("kill")
            .args(["-INT", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let name = tokio::time::timeout(std::time::Duration::from_secs(5), signals.recv())
            .await
            .unwrap();
        assert_eq!(name, "SIGINT");
    }

    #[test]
    fn test_headless_backend_has_one_display() {
        let backend = Backend::headless(&Config::default());
        assert_eq!(backend.displays.count(), 1);
        assert!(backend.events.is_none());
    }
}
