//! Display topology: which monitors exist and where they are

use crate::placement::Rect;

/// Query interface over the set of active displays
///
/// Change notifications are delivered separately (see `x11::DisplayEvent`);
/// on notification the owner calls [`DisplayTopology::refresh`].
pub trait DisplayTopology {
    /// Index of the system-designated primary display
    fn primary_index(&self) -> usize;

    fn count(&self) -> usize;

    fn geometry(&self, index: usize) -> Option<Rect>;

    /// Re-query the platform after a topology change
    fn refresh(&mut self) {}
}

/// Fixed list of displays: the headless fallback and the test double
#[derive(Debug, Clone)]
pub struct StaticDisplays {
    monitors: Vec<Rect>,
    primary: usize,
}

impl StaticDisplays {
    pub fn new(monitors: Vec<Rect>, primary: usize) -> Self {
        let primary = if primary < monitors.len() { primary } else { 0 };
        Self { monitors, primary }
    }

    /// A single display of the given size at the origin
    pub fn single(width: i32, height: i32) -> Self {
        Self::new(vec![Rect::new(0, 0, width, height)], 0)
    }
}

impl DisplayTopology for StaticDisplays {
    fn primary_index(&self) -> usize {
        self.primary
    }

    fn count(&self) -> usize {
        self.monitors.len()
    }

    fn geometry(&self, index: usize) -> Option<Rect> {
        self.monitors.get(index).copied()
    }
}
