//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// Config file location and hot-reload constants
pub mod config {
    /// Directory name under the XDG config dir
    pub const APP_DIR: &str = "ai-overlay";

    /// Config file name
    pub const FILENAME: &str = "config.json";

    /// Quiet window that collapses a burst of file events into one reload
    pub const DEBOUNCE_MS: u64 = 150;

    /// Poll interval for the fallback watcher backend
    pub const POLL_INTERVAL_MS: u64 = 500;
}

/// Validation limits applied after merging the user document
pub mod validation {
    pub const MIN_DOT_SIZE: f64 = 1.0;
    pub const MIN_FONT_SIZE: f64 = 1.0;
    pub const MAX_FONT_SIZE: f64 = 200.0;
    pub const MIN_PULSE_SCALE: f64 = 1.0;
    pub const MIN_PULSE_PERIOD_MS: u64 = 100;
}

/// Status transition timings (milliseconds)
pub mod timing {
    /// Duration of the power-on self-test `listening` pulse
    pub const SELF_TEST_MS: u64 = 700;

    /// Fade-in when the badge is shown
    pub const FADE_IN_MS: u64 = 150;

    /// Fade-out before the badge is hidden
    pub const FADE_OUT_MS: u64 = 120;

    /// Secondary opacity flash on `error`
    pub const ERROR_FLASH_MS: u64 = 220;

    /// Starting opacity of the error flash, as a fraction of full opacity
    pub const ERROR_FLASH_START: f64 = 180.0 / 255.0;

    /// Lower bound for each half of a pulse
    pub const MIN_PULSE_PHASE_MS: u64 = 150;
}

/// Label text per status
pub mod labels {
    pub const LISTENING: &str = "Listening…";
    pub const THINKING: &str = "Thinking…";
    pub const ERROR: &str = "Error";
}

/// Control surface (IPC) constants
pub mod control {
    /// Directory under XDG_RUNTIME_DIR (or the cache dir) holding the socket
    pub const RUNTIME_DIR: &str = "ai-overlay";

    /// Well-known socket file name; owning it means owning the control surface
    pub const SOCKET_NAME: &str = "control.sock";

    /// Constant reply to `Ping`
    pub const PING_REPLY: &str = "ok";

    /// Maximum frame size accepted from a peer
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

    /// Queue depth between the listener thread and the event loop
    pub const CALL_QUEUE_DEPTH: usize = 16;

    /// Connections served at once; further peers get a `Busy` reply
    pub const MAX_CONNECTIONS: usize = 8;

    /// How long a refused peer gets to send the request answered with `Busy`
    pub const REFUSE_READ_TIMEOUT_MS: u64 = 250;
}

/// X11 backend constants
pub mod x11 {
    /// ARGB color depth (32-bit: 8 bits each for Alpha, Red, Green, Blue)
    pub const ARGB_DEPTH: u8 = 32;

    /// Override redirect flag for unmanaged windows
    pub const OVERRIDE_REDIRECT: u32 = 1;

    /// WM_CLASS value (instance and class, NUL separated)
    pub const WM_CLASS: &[u8] = b"ai-overlay\0ai-overlay\0";

    /// Animation frame interval while a tween is running
    pub const FRAME_INTERVAL_MS: u64 = 16;
}

/// Label font selection
pub mod font {
    /// fontconfig family; generic names resolve to the system's preferred face
    pub const DEFAULT_FONT_FAMILY: &str = "Sans";

    /// fontconfig style; empty for the family default
    pub const DEFAULT_FONT_STYLE: &str = "Bold";
}

/// Badge layout constants
pub mod layout {
    /// Horizontal gap between the dot and the label
    pub const LABEL_GAP: f64 = 8.0;

    /// Font size points to pixels (96 DPI)
    pub const PX_PER_PT: f64 = 96.0 / 72.0;

    /// Average advance used by the headless surface to estimate label width
    pub const HEADLESS_ADVANCE_EM: f64 = 0.6;

    /// Display assumed when running without a display server
    pub const HEADLESS_DISPLAY_WIDTH: i32 = 1920;
    pub const HEADLESS_DISPLAY_HEIGHT: i32 = 1080;
}
