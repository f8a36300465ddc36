//! Periodic pulse trigger
//!
//! Deadline-driven: the owner's event loop sleeps until [`PulseScheduler::next_deadline`]
//! and then calls [`PulseScheduler::fire_due`]. At most one pulse runs at a time;
//! every start replaces the previous handle, and a replaced handle never ticks.

use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::constants::timing::MIN_PULSE_PHASE_MS;
use crate::surface::{Ease, Surface};

/// Whatever the pulse animates
pub trait PulseTarget {
    /// Ease to `scale` over `phase`, then back to 1.0 over `phase`
    fn pulse(&mut self, scale: f64, phase: Duration);

    /// Snap back to scale 1.0 without animating
    fn reset_scale(&mut self);
}

impl<S: Surface + ?Sized> PulseTarget for S {
    fn pulse(&mut self, scale: f64, phase: Duration) {
        self.ease_scale(&[
            Ease { target: scale, duration: phase },
            Ease { target: 1.0, duration: phase },
        ]);
    }

    fn reset_scale(&mut self) {
        self.set_scale(1.0);
    }
}

/// Length of each half of a pulse: half the period, at least 150ms
pub fn phase_duration(period: Duration) -> Duration {
    let half = Duration::from_millis((period.as_millis() / 2) as u64);
    half.max(Duration::from_millis(MIN_PULSE_PHASE_MS))
}

/// Identity of one running pulse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseHandle {
    generation: u64,
    period: Duration,
    scale: f64,
    next_tick: Instant,
}

#[cfg(test)]
impl PulseHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

#[derive(Debug, Default)]
pub struct PulseScheduler {
    active: Option<PulseHandle>,
    generations: u64,
}

impl PulseScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn active(&self) -> Option<&PulseHandle> {
        self.active.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Stop any running pulse, then start a new one unless `enabled` is false
    ///
    /// The first tick fires before this returns.
    pub fn start(
        &mut self,
        period: Duration,
        scale: f64,
        enabled: bool,
        now: Instant,
        target: &mut (impl PulseTarget + ?Sized),
    ) {
        self.stop(target);
        if !enabled {
            trace!("Pulse disabled, not starting");
            return;
        }

        self.generations += 1;
        let handle = PulseHandle {
            generation: self.generations,
            period,
            scale,
            next_tick: now + period,
        };
        debug!(generation = handle.generation, period_ms = period.as_millis() as u64, scale, "Pulse started");
        self.active = Some(handle);
        target.pulse(scale, phase_duration(period));
    }

    /// Same as `start`; named for call sites replacing a running pulse
    pub fn restart(
        &mut self,
        period: Duration,
        scale: f64,
        enabled: bool,
        now: Instant,
        target: &mut (impl PulseTarget + ?Sized),
    ) {
        self.start(period, scale, enabled, now, target);
    }

    /// Cancel the running pulse (if any) and snap the target to neutral scale
    pub fn stop(&mut self, target: &mut (impl PulseTarget + ?Sized)) {
        if let Some(handle) = self.active.take() {
            debug!(generation = handle.generation, "Pulse stopped");
        }
        target.reset_scale();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.map(|h| h.next_tick)
    }

    /// Fire one tick if the deadline has passed
    ///
    /// Ticks missed while the loop was busy are skipped, not replayed.
    pub fn fire_due(&mut self, now: Instant, target: &mut (impl PulseTarget + ?Sized)) -> bool {
        let Some(handle) = self.active.as_mut() else {
            return false;
        };
        if now < handle.next_tick {
            return false;
        }

        handle.next_tick += handle.period;
        if handle.next_tick <= now {
            handle.next_tick = now + handle.period;
        }
        trace!(generation = handle.generation, "Pulse tick");
        target.pulse(handle.scale, phase_duration(handle.period));
        true
    }
}
