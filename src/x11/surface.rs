//! Badge window on X11
//!
//! An override-redirect ARGB window whose contents are rasterized in software
//! and uploaded with `put_image`. Opacity goes through `_NET_WM_WINDOW_OPACITY`
//! (honored by compositing managers); scale re-renders the badge at the scaled
//! size, kept anchored on the configured pivot.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::shape::{ConnectionExt as ShapeExt, SK, SO};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as WrapperExt;

use super::font::TextRenderer;
use super::raster::Canvas;
use super::{CachedAtoms, ScreenInfo};
use crate::color::Rgba;
use crate::constants::layout::{HEADLESS_ADVANCE_EM, LABEL_GAP};
use crate::constants::x11;
use crate::placement::{Position, Size};
use crate::surface::{AfterEase, Ease, Metrics, Palette, Surface, badge_extent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Curve {
    EaseOutQuad,
    EaseInOutQuad,
}

impl Curve {
    fn apply(self, t: f64) -> f64 {
        match self {
            Curve::EaseOutQuad => t * (2.0 - t),
            Curve::EaseInOutQuad if t < 0.5 => 2.0 * t * t,
            Curve::EaseInOutQuad => 1.0 - (-2.0 * t + 2.0).powi(2) / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    from: f64,
    to: f64,
    start: Instant,
    duration: Duration,
}

/// One animated value: a chain of eases, stepped by the caller's clock
#[derive(Debug, Clone)]
pub(crate) struct Tween {
    value: f64,
    curve: Curve,
    active: Option<Segment>,
    queued: VecDeque<Ease>,
}

impl Tween {
    pub(crate) fn new(value: f64, curve: Curve) -> Self {
        Self {
            value,
            curve,
            active: None,
            queued: VecDeque::new(),
        }
    }

    pub(crate) fn value(&self) -> f64 {
        self.value
    }

    pub(crate) fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Jump to `value`, dropping any running ease
    pub(crate) fn set(&mut self, value: f64) {
        self.value = value;
        self.active = None;
        self.queued.clear();
    }

    /// Replace any running ease with `phases`, starting at `now`
    pub(crate) fn ease(&mut self, phases: &[Ease], now: Instant) {
        self.active = None;
        self.queued = phases.iter().copied().collect();
        self.begin_next(now);
    }

    fn begin_next(&mut self, start: Instant) {
        self.active = self.queued.pop_front().map(|ease| Segment {
            from: self.value,
            to: ease.target,
            start,
            duration: ease.duration,
        });
    }

    /// Advance to `now`; true when the last phase completed during this step
    pub(crate) fn step(&mut self, now: Instant) -> bool {
        while let Some(segment) = self.active {
            let elapsed = now.saturating_duration_since(segment.start);
            if elapsed < segment.duration {
                let t = elapsed.as_secs_f64() / segment.duration.as_secs_f64();
                self.value = segment.from + (segment.to - segment.from) * self.curve.apply(t);
                return false;
            }
            self.value = segment.to;
            // Chain from the scheduled end so phases keep their length under jitter
            self.begin_next(segment.start + segment.duration);
            if self.active.is_none() {
                return true;
            }
        }
        false
    }
}

/// Scaled window rect around the pivot of an unscaled badge at `anchor`
fn scaled_geometry(anchor: Position, base: Size, scale: f64, pivot: (f64, f64)) -> (Position, Size) {
    let width = ((base.width as f64 * scale).round() as i32).max(1);
    let height = ((base.height as f64 * scale).round() as i32).max(1);
    let dx = ((width - base.width) as f64 * pivot.0).round() as i32;
    let dy = ((height - base.height) as f64 * pivot.1).round() as i32;
    (Position::new(anchor.x - dx, anchor.y - dy), Size::new(width, height))
}

fn opacity_cardinal(opacity: f64) -> u32 {
    (opacity.clamp(0.0, 1.0) * u32::MAX as f64).round() as u32
}

pub struct X11Surface {
    conn: Arc<RustConnection>,
    window: Window,
    gc: Gcontext,
    colormap: Option<Colormap>,
    depth: u8,
    atoms: CachedAtoms,
    font: Option<TextRenderer>,

    metrics: Metrics,
    palette: Palette,
    label: String,
    label_visible: bool,
    /// Measured label box at scale 1.0
    label_extent: Option<(f64, f64)>,

    anchor: Position,
    window_geometry: Option<(Position, Size)>,
    mapped: bool,
    released: bool,

    opacity: Tween,
    after_opacity: AfterEase,
    scale: Tween,
    next_frame: Option<Instant>,
}

impl X11Surface {
    /// Create the (unmapped) badge window
    pub fn new(
        conn: Arc<RustConnection>,
        screen: &ScreenInfo,
        atoms: CachedAtoms,
        metrics: Metrics,
        font: Option<TextRenderer>,
    ) -> Result<Self> {
        let window = conn.generate_id().context("Failed to generate X11 window ID")?;

        let (depth, visual, colormap) = match screen.argb_visual {
            Some(visual) => {
                let colormap = conn.generate_id().context("Failed to generate colormap ID")?;
                conn.create_colormap(ColormapAlloc::NONE, colormap, screen.root, visual)
                    .context("Failed to create ARGB colormap")?;
                (x11::ARGB_DEPTH, visual, Some(colormap))
            }
            None => {
                warn!("No 32-bit visual, badge corners will not be transparent");
                (screen.root_depth, screen.root_visual, None)
            }
        };

        let mut aux = CreateWindowAux::new()
            .override_redirect(x11::OVERRIDE_REDIRECT)
            .background_pixel(0)
            .border_pixel(0)
            .event_mask(EventMask::EXPOSURE);
        if let Some(colormap) = colormap {
            aux = aux.colormap(colormap);
        }
        conn.create_window(depth, window, screen.root, 0, 0, 1, 1, 0, WindowClass::INPUT_OUTPUT, visual, &aux)
            .context("Failed to create badge window")?;

        // Destroys the window if anything below fails
        struct WindowGuard<'a> {
            conn: &'a RustConnection,
            window: Window,
            colormap: Option<Colormap>,
            should_cleanup: bool,
        }

        impl Drop for WindowGuard<'_> {
            fn drop(&mut self) {
                if self.should_cleanup {
                    if let Err(e) = self.conn.destroy_window(self.window) {
                        error!(window = self.window, error = %e, "Failed to clean up badge window after initialization failure");
                    }
                    if let Some(colormap) = self.colormap {
                        let _ = self.conn.free_colormap(colormap);
                    }
                    let _ = self.conn.flush();
                }
            }
        }

        let mut guard = WindowGuard {
            conn: &conn,
            window,
            colormap,
            should_cleanup: true,
        };

        Self::setup_window_properties(&conn, window, &atoms)?;

        let gc = conn.generate_id().context("Failed to generate ID for graphics context")?;
        conn.create_gc(gc, window, &CreateGCAux::new())
            .context("Failed to create graphics context for badge window")?;

        guard.should_cleanup = false;
        drop(guard);

        info!(window, depth, "Created badge window");

        let mut surface = Self {
            conn,
            window,
            gc,
            colormap,
            depth,
            atoms,
            font,
            metrics,
            palette: Palette {
                background: Rgba::new(0, 0, 0, 0),
                dot: Rgba::new(0, 0, 0, 0),
                text: Rgba::new(0, 0, 0, 0),
            },
            label: String::new(),
            label_visible: true,
            label_extent: None,
            anchor: Position::new(0, 0),
            window_geometry: None,
            mapped: false,
            released: false,
            opacity: Tween::new(0.0, Curve::EaseOutQuad),
            after_opacity: AfterEase::Nothing,
            scale: Tween::new(1.0, Curve::EaseInOutQuad),
            next_frame: None,
        };
        surface.push_opacity();
        Ok(surface)
    }

    /// Window type, class, stacking hint and click-through input region
    fn setup_window_properties(conn: &RustConnection, window: Window, atoms: &CachedAtoms) -> Result<()> {
        conn.change_property8(PropMode::REPLACE, window, AtomEnum::WM_CLASS, AtomEnum::STRING, x11::WM_CLASS)
            .context("Failed to set WM_CLASS on badge window")?;

        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.net_wm_window_type,
            AtomEnum::ATOM,
            &[atoms.net_wm_window_type_notification],
        )
        .context("Failed to set badge window type")?;

        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.net_wm_state,
            AtomEnum::ATOM,
            &[atoms.net_wm_state_above],
        )
        .context("Failed to set badge window always-on-top")?;

        // Empty input region: pointer events fall through to whatever is below
        if let Err(e) = conn.shape_rectangles(SO::SET, SK::INPUT, ClipOrdering::UNSORTED, window, 0, 0, &[]) {
            warn!(error = %e, "SHAPE unavailable, badge will intercept clicks");
        }

        Ok(())
    }

    fn label_extent_for(&self, px: f64) -> Option<(f64, f64)> {
        if !self.label_visible || self.label.is_empty() {
            return None;
        }
        Some(match &self.font {
            Some(font) => font.measure(&self.label, px as f32),
            None => {
                let chars = self.label.chars().count() as f64;
                (chars * px * HEADLESS_ADVANCE_EM, px * 1.2)
            }
        })
    }

    fn remeasure(&mut self) {
        self.label_extent = self.label_extent_for(self.metrics.font_px);
    }

    /// Log and drop an X request failure
    fn report(&self, what: &str, result: Result<()>) {
        if let Err(e) = result {
            warn!(window = self.window, error = ?e, "{what}");
        }
    }

    fn flush(&self) {
        if let Err(e) = self.conn.flush() {
            error!(error = %e, "Failed to flush X11 connection");
        }
    }

    fn push_opacity(&mut self) {
        let value = opacity_cardinal(self.opacity.value());
        let result = self
            .conn
            .change_property32(
                PropMode::REPLACE,
                self.window,
                self.atoms.net_wm_window_opacity,
                AtomEnum::CARDINAL,
                &[value],
            )
            .map(|_| ())
            .context("Failed to set _NET_WM_WINDOW_OPACITY");
        self.report("Opacity update failed", result);
    }

    /// Rasterize at the current scale and upload, resizing the window if needed
    fn redraw(&mut self) {
        if self.released {
            return;
        }
        let result = self.try_redraw();
        self.report("Badge redraw failed", result);
    }

    fn try_redraw(&mut self) -> Result<()> {
        let scale = self.scale.value();
        let base = self.measure();
        let pivot = (self.metrics.pivot_x, self.metrics.pivot_y);
        let (position, size) = scaled_geometry(self.anchor, base, scale, pivot);

        if self.window_geometry != Some((position, size)) {
            self.conn
                .configure_window(
                    self.window,
                    &ConfigureWindowAux::new()
                        .x(position.x)
                        .y(position.y)
                        .width(size.width as u32)
                        .height(size.height as u32),
                )
                .context(format!("Failed to move badge window to ({}, {})", position.x, position.y))?;
            self.window_geometry = Some((position, size));
        }

        let canvas = self.paint(size, scale);
        self.conn
            .put_image(
                ImageFormat::Z_PIXMAP,
                self.window,
                self.gc,
                size.width as u16,
                size.height as u16,
                0,
                0,
                0,
                self.depth,
                &canvas.to_bgra_bytes(),
            )
            .context("Failed to upload badge image")?;
        Ok(())
    }

    fn paint(&self, size: Size, scale: f64) -> Canvas {
        let m = &self.metrics;
        let (w, h) = (size.width as f64, size.height as f64);
        let mut canvas = Canvas::new(size.width as usize, size.height as usize);

        canvas.fill_rounded_rect(0.0, 0.0, w, h, m.radius * scale, self.palette.background);

        let dot = m.dot_size * scale;
        let dot_x = m.padding_horizontal * scale;
        canvas.fill_circle(dot_x + dot / 2.0, h / 2.0, dot / 2.0, self.palette.dot);

        if self.label_extent.is_some()
            && let Some(font) = &self.font
        {
            let text = font.render(&self.label, (m.font_px * scale) as f32, self.palette.text);
            let x = (dot_x + dot + LABEL_GAP * scale).round() as i32;
            let y = ((h - text.height as f64) / 2.0).round() as i32;
            canvas.blit(&text, x, y);
        }
        canvas
    }

    fn schedule_frame(&mut self, now: Instant) {
        self.next_frame = (self.opacity.is_running() || self.scale.is_running())
            .then(|| now + Duration::from_millis(x11::FRAME_INTERVAL_MS));
    }

    pub fn window(&self) -> Window {
        self.window
    }
}

impl Surface for X11Surface {
    fn measure(&self) -> Size {
        badge_extent(&self.metrics, self.label_extent)
    }

    fn set_position(&mut self, position: Position) {
        if self.anchor != position {
            debug!(x = position.x, y = position.y, "Moving badge");
            self.anchor = position;
            self.redraw();
            self.flush();
        }
    }

    fn set_label(&mut self, text: &str, visible: bool) {
        self.label = text.to_string();
        self.label_visible = visible;
        self.remeasure();
        self.redraw();
    }

    fn set_palette(&mut self, palette: Palette) {
        if self.palette != palette {
            self.palette = palette;
            self.redraw();
            self.flush();
        }
    }

    fn set_metrics(&mut self, metrics: Metrics) {
        self.metrics = metrics;
        self.remeasure();
        self.redraw();
    }

    fn show(&mut self) {
        if self.released || self.mapped {
            return;
        }
        let result = self
            .conn
            .map_window(self.window)
            .map(|_| ())
            .context(format!("Failed to map badge window {}", self.window));
        self.report("Show failed", result);
        self.mapped = true;
        self.redraw();
        self.flush();
    }

    fn hide(&mut self) {
        if self.released || !self.mapped {
            return;
        }
        let result = self
            .conn
            .unmap_window(self.window)
            .map(|_| ())
            .context(format!("Failed to unmap badge window {}", self.window));
        self.report("Hide failed", result);
        self.mapped = false;
        self.flush();
    }

    fn set_opacity(&mut self, opacity: f64) {
        self.opacity.set(opacity);
        self.after_opacity = AfterEase::Nothing;
        self.push_opacity();
        self.schedule_frame(Instant::now());
        self.flush();
    }

    fn ease_opacity(&mut self, target: f64, duration: Duration, then: AfterEase) {
        let now = Instant::now();
        self.opacity.ease(&[Ease { target, duration }], now);
        self.after_opacity = then;
        self.schedule_frame(now);
    }

    fn set_scale(&mut self, scale: f64) {
        let changed = self.scale.value() != scale || self.scale.is_running();
        self.scale.set(scale);
        if changed {
            self.redraw();
            self.flush();
        }
        self.schedule_frame(Instant::now());
    }

    fn ease_scale(&mut self, phases: &[Ease]) {
        let now = Instant::now();
        self.scale.ease(phases, now);
        self.schedule_frame(now);
    }

    fn raise(&mut self) {
        if self.released {
            return;
        }
        let result = self
            .conn
            .configure_window(self.window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))
            .map(|_| ())
            .context("Failed to raise badge window");
        self.report("Raise failed", result);
        self.flush();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.mapped = false;
        self.next_frame = None;

        // Each resource independently
        if let Err(e) = self.conn.free_gc(self.gc) {
            error!(gc = self.gc, error = %e, "Failed to free GC");
        }
        if let Err(e) = self.conn.destroy_window(self.window) {
            error!(window = self.window, error = %e, "Failed to destroy badge window");
        }
        if let Some(colormap) = self.colormap
            && let Err(e) = self.conn.free_colormap(colormap)
        {
            error!(colormap, error = %e, "Failed to free colormap");
        }
        self.flush();
        info!(window = self.window, "Released badge window");
    }

    fn repaint(&mut self) {
        self.redraw();
        self.flush();
    }

    fn next_frame(&self) -> Option<Instant> {
        self.next_frame
    }

    fn advance(&mut self, now: Instant) {
        if self.released {
            return;
        }
        if self.next_frame.is_some_and(|at| at > now) {
            return;
        }

        if self.opacity.is_running() {
            let finished = self.opacity.step(now);
            self.push_opacity();
            if finished && self.after_opacity == AfterEase::Hide {
                self.after_opacity = AfterEase::Nothing;
                self.hide();
            }
        }

        if self.scale.is_running() {
            self.scale.step(now);
            self.redraw();
        }

        self.schedule_frame(now);
        self.flush();
    }
}

impl Drop for X11Surface {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_curves_hit_endpoints() {
        for curve in [Curve::EaseOutQuad, Curve::EaseInOutQuad] {
            assert_eq!(curve.apply(0.0), 0.0);
            assert_eq!(curve.apply(1.0), 1.0);
        }
        assert_eq!(Curve::EaseInOutQuad.apply(0.5), 0.5);
        assert!(Curve::EaseOutQuad.apply(0.5) > 0.5);
    }

    #[test]
    fn test_tween_chains_phases() {
        let t0 = Instant::now();
        let mut tween = Tween::new(1.0, Curve::EaseInOutQuad);
        tween.ease(
            &[Ease { target: 1.1, duration: ms(100) }, Ease { target: 1.0, duration: ms(100) }],
            t0,
        );

        assert!(!tween.step(t0 + ms(50)));
        assert!((tween.value() - 1.05).abs() < 1e-9);

        // Past the first phase: second phase starts at its scheduled time
        assert!(!tween.step(t0 + ms(150)));
        assert!((tween.value() - 1.05).abs() < 1e-9);

        assert!(tween.step(t0 + ms(250)));
        assert_eq!(tween.value(), 1.0);
        assert!(!tween.is_running());
    }

    #[test]
    fn test_tween_set_cancels_running_ease() {
        let t0 = Instant::now();
        let mut tween = Tween::new(0.0, Curve::EaseOutQuad);
        tween.ease(&[Ease { target: 1.0, duration: ms(150) }], t0);

        tween.set(0.3);

        assert!(!tween.is_running());
        assert!(!tween.step(t0 + ms(500)));
        assert_eq!(tween.value(), 0.3);
    }

    #[test]
    fn test_zero_duration_ease_completes_on_first_step() {
        let t0 = Instant::now();
        let mut tween = Tween::new(0.0, Curve::EaseOutQuad);
        tween.ease(&[Ease { target: 0.8, duration: Duration::ZERO }], t0);
        assert!(tween.step(t0));
        assert_eq!(tween.value(), 0.8);
    }

    #[test]
    fn test_scaled_geometry_keeps_pivot_fixed() {
        let anchor = Position::new(100, 50);
        let base = Size::new(100, 20);

        let (pos, size) = scaled_geometry(anchor, base, 1.1, (0.5, 0.5));
        assert_eq!(size, Size::new(110, 22));
        assert_eq!(pos, Position::new(95, 49));

        let (pos, _) = scaled_geometry(anchor, base, 1.1, (0.0, 1.0));
        assert_eq!(pos, Position::new(100, 48));

        assert_eq!(scaled_geometry(anchor, base, 1.0, (0.5, 0.5)), (anchor, base));
    }

    #[test]
    fn test_opacity_cardinal_range() {
        assert_eq!(opacity_cardinal(0.0), 0);
        assert_eq!(opacity_cardinal(1.0), u32::MAX);
        assert_eq!(opacity_cardinal(7.0), u32::MAX);
    }
}
