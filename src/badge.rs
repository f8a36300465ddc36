//! Badge state machine
//!
//! Owns the current [`Status`] and turns every transition into an ordered set
//! of surface side effects: label, pulse, palette, visibility, placement and
//! stacking. Nothing here draws or sleeps; timers surface as deadlines that the
//! event loop feeds back through [`Badge::advance`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ColorRole, Config};
use crate::constants::{labels, timing};
use crate::display::DisplayTopology;
use crate::placement::{place, select_display};
use crate::pulse::PulseScheduler;
use crate::surface::{AfterEase, Metrics, Palette, Surface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Listening,
    Thinking,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status {0:?}, expected one of idle, listening, thinking, error")]
pub struct InvalidStatus(pub String);

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Listening => "listening",
            Status::Thinking => "thinking",
            Status::Error => "error",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Idle => "",
            Status::Listening => labels::LISTENING,
            Status::Thinking => labels::THINKING,
            Status::Error => labels::ERROR,
        }
    }

    fn dot_role(self) -> ColorRole {
        match self {
            Status::Idle => ColorRole::DotIdle,
            Status::Listening => ColorRole::DotListening,
            Status::Thinking => ColorRole::DotThinking,
            Status::Error => ColorRole::DotError,
        }
    }

    fn background_role(self) -> ColorRole {
        match self {
            Status::Error => ColorRole::BackgroundError,
            _ => ColorRole::Background,
        }
    }
}

impl FromStr for Status {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(Status::Idle),
            "listening" => Ok(Status::Listening),
            "thinking" => Ok(Status::Thinking),
            "error" => Ok(Status::Error),
            _ => Err(InvalidStatus(s.to_string())),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pulse parameters that matter for `status`; None when the status does not pulse
fn pulse_params(config: &Config, status: Status) -> Option<(Duration, f64, bool)> {
    let period_ms = match status {
        Status::Listening => config.pulse.period_listening,
        Status::Thinking => config.pulse.period_thinking,
        Status::Idle | Status::Error => return None,
    };
    Some((Duration::from_millis(period_ms), config.pulse.scale, config.pulse.enabled))
}

fn palette_for(config: &Config, status: Status) -> Palette {
    Palette {
        background: config.colors.resolve(status.background_role()),
        dot: config.colors.resolve(status.dot_role()),
        text: config.colors.resolve(ColorRole::Text),
    }
}

pub struct Badge {
    config: Arc<Config>,
    surface: Box<dyn Surface>,
    displays: Box<dyn DisplayTopology>,
    pulse: PulseScheduler,
    status: Status,
    /// Pending return to idle after the power-on self-test
    self_test_until: Option<Instant>,
    shut_down: bool,
}

impl Badge {
    /// Style and place the (hidden) badge for `idle`
    pub fn new(config: Arc<Config>, surface: Box<dyn Surface>, displays: Box<dyn DisplayTopology>) -> Self {
        let mut badge = Self {
            config,
            surface,
            displays,
            pulse: PulseScheduler::new(),
            status: Status::Idle,
            self_test_until: None,
            shut_down: false,
        };
        badge.surface.set_metrics(Metrics::from_config(&badge.config));
        badge.apply_label();
        badge.apply_palette();
        badge.reposition();
        badge
    }

    pub fn get_state(&self) -> Status {
        self.status
    }

    #[cfg(test)]
    pub fn pulse(&self) -> &PulseScheduler {
        &self.pulse
    }

    /// Transition to the status named by `raw`
    ///
    /// Unknown names are logged and change nothing. Cancels a pending
    /// self-test return to idle. Returns the status in effect afterwards,
    /// which after shutdown is the last one shown.
    pub fn set_state(&mut self, raw: &str, now: Instant) -> Result<Status, InvalidStatus> {
        let status = raw.parse::<Status>().inspect_err(|e| {
            warn!(requested = %raw, error = %e, "Ignoring invalid status");
        })?;
        if self.shut_down {
            debug!(status = %status, "Badge shut down, ignoring status change");
            return Ok(self.status);
        }
        if self.self_test_until.take().is_some() {
            debug!("Self-test superseded by external status change");
        }
        self.transition(status, now);
        Ok(status)
    }

    fn transition(&mut self, status: Status, now: Instant) {
        if self.shut_down {
            debug!(status = %status, "Badge shut down, ignoring transition");
            return;
        }
        info!(from = %self.status, to = %status, "Status changed");
        self.status = status;

        self.apply_label();

        match pulse_params(&self.config, status) {
            Some((period, scale, enabled)) => {
                self.pulse.start(period, scale, enabled, now, self.surface.as_mut());
            }
            None => self.pulse.stop(self.surface.as_mut()),
        }

        self.apply_palette();

        if status == Status::Idle {
            self.fade_out();
        } else {
            self.fade_in();
            if status == Status::Error {
                let opacity = self.config.opacity;
                self.surface.set_opacity(opacity * timing::ERROR_FLASH_START);
                self.surface.ease_opacity(
                    opacity,
                    Duration::from_millis(timing::ERROR_FLASH_MS),
                    AfterEase::Nothing,
                );
            }
        }

        self.reposition();
        self.surface.raise();
    }

    /// Forced fade-in, independent of status
    pub fn show(&mut self) {
        if !self.shut_down {
            self.fade_in();
        }
    }

    /// Forced fade-out then hide, independent of status
    pub fn hide(&mut self) {
        if !self.shut_down {
            self.fade_out();
        }
    }

    fn fade_in(&mut self) {
        self.surface.set_opacity(0.0);
        self.surface.show();
        self.surface.raise();
        self.surface.ease_opacity(
            self.config.opacity,
            Duration::from_millis(timing::FADE_IN_MS),
            AfterEase::Nothing,
        );
    }

    fn fade_out(&mut self) {
        self.surface
            .ease_opacity(0.0, Duration::from_millis(timing::FADE_OUT_MS), AfterEase::Hide);
    }

    fn apply_label(&mut self) {
        self.surface.set_label(self.status.label(), self.config.show_label);
    }

    fn apply_palette(&mut self) {
        self.surface.set_palette(palette_for(&self.config, self.status));
    }

    /// Recompute the position from the current config, size and topology
    fn reposition(&mut self) {
        if self.displays.count() == 0 {
            warn!("No displays reported, keeping previous badge position");
            return;
        }
        let index = select_display(self.config.monitor, self.displays.as_ref());
        let Some(rect) = self.displays.geometry(index) else {
            warn!(index, "Display vanished during placement, keeping previous position");
            return;
        };
        let size = self.surface.measure();
        let position = place(rect, size, self.config.corner, self.config.offset);
        debug!(
            display = index,
            x = position.x,
            y = position.y,
            width = size.width,
            height = size.height,
            "Badge placed"
        );
        self.surface.set_position(position);
    }

    /// Swap in a freshly loaded config and reapply styling and placement
    ///
    /// The status is kept. A running pulse restarts only when its own
    /// parameters changed.
    pub fn replace_config(&mut self, config: Arc<Config>, now: Instant) {
        if self.shut_down {
            return;
        }
        let previous = std::mem::replace(&mut self.config, config);
        info!(status = %self.status, "Applying reloaded config");

        self.apply_label();
        self.surface.set_metrics(Metrics::from_config(&self.config));
        self.apply_palette();

        let old_pulse = pulse_params(&previous, self.status);
        let new_pulse = pulse_params(&self.config, self.status);
        if old_pulse != new_pulse
            && let Some((period, scale, enabled)) = new_pulse
        {
            debug!(enabled, period_ms = period.as_millis() as u64, scale, "Pulse settings changed, restarting");
            self.pulse.restart(period, scale, enabled, now, self.surface.as_mut());
        }

        if self.status != Status::Idle && previous.opacity != self.config.opacity {
            self.surface.set_opacity(self.config.opacity);
        }

        self.reposition();
    }

    /// Displays were added, removed or rearranged
    pub fn on_topology_changed(&mut self) {
        if self.shut_down {
            return;
        }
        self.displays.refresh();
        debug!(count = self.displays.count(), primary = self.displays.primary_index(), "Display topology changed");
        self.reposition();
    }

    /// The platform discarded the badge contents
    pub fn on_exposed(&mut self) {
        if !self.shut_down {
            self.surface.repaint();
        }
    }

    /// Show `listening` now and return to `idle` after a short while
    pub fn power_on_self_test(&mut self, now: Instant) {
        self.transition(Status::Listening, now);
        self.self_test_until = Some(now + Duration::from_millis(timing::SELF_TEST_MS));
    }

    /// Earliest instant at which [`Badge::advance`] has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.shut_down {
            return None;
        }
        [self.pulse.next_deadline(), self.self_test_until, self.surface.next_frame()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Run everything that came due at `now`
    pub fn advance(&mut self, now: Instant) {
        if self.shut_down {
            return;
        }
        if let Some(until) = self.self_test_until
            && until <= now
        {
            self.self_test_until = None;
            debug!("Self-test finished");
            self.transition(Status::Idle, now);
        }
        self.pulse.fire_due(now, self.surface.as_mut());
        self.surface.advance(now);
    }

    /// Stop the pulse and snap back to neutral scale
    pub fn stop_pulse(&mut self) {
        if self.pulse.is_running() {
            self.pulse.stop(self.surface.as_mut());
        }
    }

    /// Stop the pulse and release the surface. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.pulse.stop(self.surface.as_mut());
        self.self_test_until = None;
        self.surface.release();
        self.shut_down = true;
        info!("Badge shut down");
    }
}
