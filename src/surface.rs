//! Rendering surface seam
//!
//! The state machine drives a [`Surface`]; it never draws. Concrete surfaces:
//! the X11 window in `crate::x11` and [`HeadlessSurface`], the no-op fallback
//! used when no display server is reachable.

use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::color::Rgba;
use crate::config::Config;
use crate::constants::layout::{HEADLESS_ADVANCE_EM, LABEL_GAP, PX_PER_PT};
use crate::placement::{Position, Size};

/// One eased step toward `target` over `duration`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ease {
    pub target: f64,
    pub duration: Duration,
}

/// What happens when an opacity ease completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterEase {
    Nothing,
    Hide,
}

/// Colors for the current status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Rgba,
    pub dot: Rgba,
    pub text: Rgba,
}

/// Size-related styling, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub dot_size: f64,
    pub font_px: f64,
    pub padding_vertical: f64,
    pub padding_horizontal: f64,
    pub radius: f64,
    pub pivot_x: f64,
    pub pivot_y: f64,
}

impl Metrics {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dot_size: config.dot_size,
            font_px: config.font_size * PX_PER_PT,
            padding_vertical: config.padding.vertical,
            padding_horizontal: config.padding.horizontal,
            radius: config.radius,
            pivot_x: config.pivot.x,
            pivot_y: config.pivot.y,
        }
    }
}

/// Unscaled badge size for the given label extent (None when no label is drawn)
pub fn badge_extent(metrics: &Metrics, label: Option<(f64, f64)>) -> Size {
    let (label_width, label_height) = match label {
        Some((w, h)) if w > 0.0 => (LABEL_GAP + w, h),
        _ => (0.0, 0.0),
    };
    let width = 2.0 * metrics.padding_horizontal + metrics.dot_size + label_width;
    let height = 2.0 * metrics.padding_vertical + metrics.dot_size.max(label_height);
    Size::new(width.ceil() as i32, height.ceil() as i32)
}

/// The badge as drawn by some toolkit
pub trait Surface {
    /// Current laid-out size at scale 1.0
    fn measure(&self) -> Size;

    fn set_position(&mut self, position: Position);

    /// `visible == false` suppresses the label entirely
    fn set_label(&mut self, text: &str, visible: bool);

    fn set_palette(&mut self, palette: Palette);

    fn set_metrics(&mut self, metrics: Metrics);

    /// Map immediately, at whatever opacity is current
    fn show(&mut self);

    /// Unmap immediately
    fn hide(&mut self);

    fn set_opacity(&mut self, opacity: f64);

    /// Replaces any running opacity ease
    fn ease_opacity(&mut self, target: f64, duration: Duration, then: AfterEase);

    /// Immediate, cancels any running scale ease
    fn set_scale(&mut self, scale: f64);

    /// Run `phases` back to back, replacing any running scale ease
    fn ease_scale(&mut self, phases: &[Ease]);

    /// Stack above every other surface
    fn raise(&mut self);

    /// Destroy the underlying resources; further calls are no-ops
    fn release(&mut self);

    /// Redraw after the platform discarded the contents
    fn repaint(&mut self) {}

    /// When the surface next needs [`Surface::advance`], if animating
    fn next_frame(&self) -> Option<Instant> {
        None
    }

    fn advance(&mut self, _now: Instant) {}
}

/// Surface that renders nothing
///
/// Eases complete instantly. The label width is estimated from the character
/// count so placement still moves with label changes.
#[derive(Debug)]
pub struct HeadlessSurface {
    metrics: Metrics,
    label: String,
    label_visible: bool,
    position: Option<Position>,
    mapped: bool,
    opacity: f64,
    scale: f64,
    released: bool,
}

impl HeadlessSurface {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            metrics,
            label: String::new(),
            label_visible: true,
            position: None,
            mapped: false,
            opacity: 0.0,
            scale: 1.0,
            released: false,
        }
    }

    #[cfg(test)]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}

impl Surface for HeadlessSurface {
    fn measure(&self) -> Size {
        let label = (self.label_visible && !self.label.is_empty()).then(|| {
            let chars = self.label.chars().count() as f64;
            (chars * self.metrics.font_px * HEADLESS_ADVANCE_EM, self.metrics.font_px * 1.2)
        });
        badge_extent(&self.metrics, label)
    }

    fn set_position(&mut self, position: Position) {
        if self.position != Some(position) {
            debug!(x = position.x, y = position.y, "Headless badge moved");
            self.position = Some(position);
        }
    }

    fn set_label(&mut self, text: &str, visible: bool) {
        self.label = text.to_string();
        self.label_visible = visible;
    }

    fn set_palette(&mut self, _palette: Palette) {}

    fn set_metrics(&mut self, metrics: Metrics) {
        self.metrics = metrics;
    }

    fn show(&mut self) {
        if !self.released {
            self.mapped = true;
        }
    }

    fn hide(&mut self) {
        self.mapped = false;
    }

    fn set_opacity(&mut self, opacity: f64) {
        self.opacity = opacity;
    }

    fn ease_opacity(&mut self, target: f64, _duration: Duration, then: AfterEase) {
        self.opacity = target;
        if then == AfterEase::Hide {
            self.hide();
        }
    }

    fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    fn ease_scale(&mut self, phases: &[Ease]) {
        if let Some(last) = phases.last() {
            trace!(phases = phases.len(), "Headless pulse");
            self.scale = last.target;
        }
    }

    fn raise(&mut self) {}

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.mapped = false;
            debug!("Headless surface released");
        }
    }
}

#[cfg(test)]
pub mod testing {
    //! Surface double that records every call

    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Position(Position),
        Label(String, bool),
        Palette(Palette),
        Metrics(Metrics),
        Show,
        Hide,
        Opacity(f64),
        EaseOpacity(f64, Duration, AfterEase),
        Scale(f64),
        EaseScale(Vec<Ease>),
        Raise,
        Release,
    }

    /// Width grows 10px per label character so placement tracks label changes
    #[derive(Debug, Clone, Default)]
    pub struct RecordingSurface {
        pub calls: Rc<RefCell<Vec<Call>>>,
        label_len: usize,
    }

    impl RecordingSurface {
        pub fn new() -> (Self, Rc<RefCell<Vec<Call>>>) {
            let surface = Self::default();
            let calls = Rc::clone(&surface.calls);
            (surface, calls)
        }

        fn push(&self, call: Call) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl Surface for RecordingSurface {
        fn measure(&self) -> Size {
            Size::new(40 + 10 * self.label_len as i32, 24)
        }

        fn set_position(&mut self, position: Position) {
            self.push(Call::Position(position));
        }

        fn set_label(&mut self, text: &str, visible: bool) {
            self.label_len = if visible { text.chars().count() } else { 0 };
            self.push(Call::Label(text.to_string(), visible));
        }

        fn set_palette(&mut self, palette: Palette) {
            self.push(Call::Palette(palette));
        }

        fn set_metrics(&mut self, metrics: Metrics) {
            self.push(Call::Metrics(metrics));
        }

        fn show(&mut self) {
            self.push(Call::Show);
        }

        fn hide(&mut self) {
            self.push(Call::Hide);
        }

        fn set_opacity(&mut self, opacity: f64) {
            self.push(Call::Opacity(opacity));
        }

        fn ease_opacity(&mut self, target: f64, duration: Duration, then: AfterEase) {
            self.push(Call::EaseOpacity(target, duration, then));
        }

        fn set_scale(&mut self, scale: f64) {
            self.push(Call::Scale(scale));
        }

        fn ease_scale(&mut self, phases: &[Ease]) {
            self.push(Call::EaseScale(phases.to_vec()));
        }

        fn raise(&mut self) {
            self.push(Call::Raise);
        }

        fn release(&mut self) {
            self.push(Call::Release);
        }
    }
}
