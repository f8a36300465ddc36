//! X11 collaborators: the badge window and the RandR display topology
//!
//! A single shared connection; a background thread blocks on
//! `wait_for_event` and forwards what the event loop cares about.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::randr::{ConnectionExt as RandrExt, NotifyMask};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::config::Config;
use crate::constants::x11::ARGB_DEPTH;
use crate::display::DisplayTopology;
use crate::placement::Rect;
use crate::surface::Metrics;

mod font;
mod raster;
mod surface;

pub use surface::X11Surface;

use font::TextRenderer;

/// Forwarded from the X11 event thread to the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// Monitors were added, removed, resized or rearranged
    TopologyChanged,
    /// The badge window lost its contents
    Exposed,
}

/// Pre-cached X11 atoms to avoid repeated roundtrips
#[derive(Debug, Clone, Copy)]
pub struct CachedAtoms {
    pub net_wm_window_opacity: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_above: Atom,
    pub net_wm_window_type: Atom,
    pub net_wm_window_type_notification: Atom,
}

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name.as_bytes())
        .context(format!("Failed to intern {name} atom"))?
        .reply()
        .context(format!("Failed to get reply for {name} atom"))?
        .atom)
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        Ok(Self {
            net_wm_window_opacity: intern(conn, "_NET_WM_WINDOW_OPACITY")?,
            net_wm_state: intern(conn, "_NET_WM_STATE")?,
            net_wm_state_above: intern(conn, "_NET_WM_STATE_ABOVE")?,
            net_wm_window_type: intern(conn, "_NET_WM_WINDOW_TYPE")?,
            net_wm_window_type_notification: intern(conn, "_NET_WM_WINDOW_TYPE_NOTIFICATION")?,
        })
    }
}

/// What the surface needs to know about the screen it lives on
#[derive(Debug, Clone, Copy)]
pub struct ScreenInfo {
    pub root: Window,
    pub root_depth: u8,
    pub root_visual: Visualid,
    pub argb_visual: Option<Visualid>,
    pub width: u16,
    pub height: u16,
}

impl ScreenInfo {
    fn from_screen(screen: &Screen) -> Self {
        Self {
            root: screen.root,
            root_depth: screen.root_depth,
            root_visual: screen.root_visual,
            argb_visual: find_argb_visual(screen),
            width: screen.width_in_pixels,
            height: screen.height_in_pixels,
        }
    }
}

/// A 32-bit TrueColor visual, needed for per-pixel transparency
fn find_argb_visual(screen: &Screen) -> Option<Visualid> {
    screen
        .allowed_depths
        .iter()
        .filter(|depth| depth.depth == ARGB_DEPTH)
        .flat_map(|depth| depth.visuals.iter())
        .find(|visual| visual.class == VisualClass::TRUE_COLOR)
        .map(|visual| visual.visual_id)
}

/// Keep usable monitors; the primary index falls back to the first one
fn collect_monitors(monitors: impl IntoIterator<Item = (Rect, bool)>) -> (Vec<Rect>, usize) {
    let mut rects = Vec::new();
    let mut primary = None;
    for (rect, is_primary) in monitors {
        if rect.width <= 0 || rect.height <= 0 {
            continue;
        }
        if is_primary && primary.is_none() {
            primary = Some(rects.len());
        }
        rects.push(rect);
    }
    (rects, primary.unwrap_or(0))
}

/// Monitors as reported by RandR 1.5, or the whole root window without it
pub struct RandrDisplays {
    conn: Arc<RustConnection>,
    root: Window,
    randr: bool,
    monitors: Vec<Rect>,
    primary: usize,
}

impl RandrDisplays {
    fn new(conn: Arc<RustConnection>, screen: &ScreenInfo, randr: bool) -> Self {
        let mut displays = Self {
            conn,
            root: screen.root,
            randr,
            monitors: vec![Rect::new(0, 0, screen.width as i32, screen.height as i32)],
            primary: 0,
        };
        displays.refresh();
        displays
    }

    fn query_monitors(&self) -> Result<(Vec<Rect>, usize)> {
        let reply = self
            .conn
            .randr_get_monitors(self.root, true)
            .context("Failed to query RandR monitors")?
            .reply()
            .context("Failed to get RandR monitors reply")?;
        Ok(collect_monitors(reply.monitors.iter().map(|m| {
            (
                Rect::new(m.x as i32, m.y as i32, m.width as i32, m.height as i32),
                m.primary,
            )
        })))
    }

    fn query_root(&self) -> Result<Rect> {
        let geom = self
            .conn
            .get_geometry(self.root)
            .context("Failed to send geometry query for root window")?
            .reply()
            .context("Failed to get root window geometry")?;
        Ok(Rect::new(0, 0, geom.width as i32, geom.height as i32))
    }
}

impl DisplayTopology for RandrDisplays {
    fn primary_index(&self) -> usize {
        self.primary
    }

    fn count(&self) -> usize {
        self.monitors.len()
    }

    fn geometry(&self, index: usize) -> Option<Rect> {
        self.monitors.get(index).copied()
    }

    fn refresh(&mut self) {
        if self.randr {
            match self.query_monitors() {
                Ok((monitors, primary)) if !monitors.is_empty() => {
                    debug!(count = monitors.len(), primary, "RandR monitors");
                    self.monitors = monitors;
                    self.primary = primary;
                    return;
                }
                Ok(_) => warn!("RandR reported no active monitors, using the root window"),
                Err(e) => warn!(error = ?e, "RandR monitor query failed, using the root window"),
            }
        }
        match self.query_root() {
            Ok(rect) => {
                self.monitors = vec![rect];
                self.primary = 0;
            }
            Err(e) => warn!(error = ?e, "Keeping previous display geometry"),
        }
    }
}

/// Subscribe to monitor changes; false when RandR 1.5 is unavailable
fn enable_randr(conn: &RustConnection, root: Window) -> bool {
    let version = conn
        .randr_query_version(1, 5)
        .context("Failed to query RandR version")
        .and_then(|cookie| cookie.reply().context("Failed to get RandR version reply"));
    let supported = match version {
        Ok(v) => (v.major_version, v.minor_version) >= (1, 5),
        Err(e) => {
            warn!(error = ?e, "RandR unavailable, treating the screen as one display");
            return false;
        }
    };
    if !supported {
        warn!("RandR older than 1.5, treating the screen as one display");
        return false;
    }

    let mask = NotifyMask::SCREEN_CHANGE | NotifyMask::CRTC_CHANGE | NotifyMask::OUTPUT_CHANGE;
    if let Err(e) = conn.randr_select_input(root, mask) {
        warn!(error = %e, "Failed to subscribe to RandR notifications");
    }
    true
}

/// Forward topology changes and exposures of `window` until the connection dies
fn spawn_event_pump(
    conn: Arc<RustConnection>,
    window: Window,
    events: UnboundedSender<DisplayEvent>,
) -> Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("x11-events".to_string())
        .spawn(move || {
            loop {
                let event = match conn.wait_for_event() {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "X11 connection lost, display events stopped");
                        break;
                    }
                };
                let forwarded = match event {
                    Event::RandrScreenChangeNotify(_) | Event::RandrNotify(_) => Some(DisplayEvent::TopologyChanged),
                    Event::Expose(e) if e.window == window && e.count == 0 => Some(DisplayEvent::Exposed),
                    Event::Error(e) => {
                        debug!(error = ?e, "X11 error event");
                        None
                    }
                    _ => None,
                };
                if let Some(forwarded) = forwarded
                    && events.send(forwarded).is_err()
                {
                    break;
                }
            }
        })
        .context("Failed to spawn X11 event thread")
}

/// Everything the daemon needs from a live X server
pub struct X11Backend {
    pub surface: X11Surface,
    pub displays: RandrDisplays,
    pub events: UnboundedReceiver<DisplayEvent>,
}

/// Connect to `$DISPLAY` and create the (hidden) badge window
///
/// The label font is resolved here once; changing it takes a restart.
pub fn connect(config: &Config) -> Result<X11Backend> {
    let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11 server")?;
    let conn = Arc::new(conn);
    let screen = ScreenInfo::from_screen(&conn.setup().roots[screen_num]);
    info!(
        screen = screen_num,
        width = screen.width,
        height = screen.height,
        argb = screen.argb_visual.is_some(),
        "Connected to X11"
    );

    let atoms = CachedAtoms::new(&conn)?;
    let randr = enable_randr(&conn, screen.root);

    let font = TextRenderer::from_family(&config.font_family, &config.font_style)
        .inspect_err(|e| warn!(error = ?e, "No label font, labels will not be drawn"))
        .ok();

    let metrics = Metrics::from_config(config);
    let surface = X11Surface::new(Arc::clone(&conn), &screen, atoms, metrics, font)?;
    let displays = RandrDisplays::new(Arc::clone(&conn), &screen, randr);

    let (tx, events) = unbounded_channel();
    spawn_event_pump(Arc::clone(&conn), surface.window(), tx)?;
    conn.flush().context("Failed to flush X11 connection after setup")?;

    Ok(X11Backend {
        surface,
        displays,
        events,
    })
}
