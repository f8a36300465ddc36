//! Badge placement on a display
//!
//! [`place`] is pure: the same display rect, badge size, corner and offset
//! always give the same position. [`select_display`] resolves the configured
//! monitor against the live topology, falling back to the primary display.

use crate::config::{Corner, MonitorSelector, Offset};
use crate::display::DisplayTopology;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    #[cfg(test)]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    #[cfg(test)]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Start,
    End,
    Center,
}

fn alignment(corner: Corner) -> (Align, Align) {
    match corner {
        Corner::TopLeft => (Align::Start, Align::Start),
        Corner::TopRight => (Align::End, Align::Start),
        Corner::BottomLeft => (Align::Start, Align::End),
        Corner::BottomRight => (Align::End, Align::End),
        Corner::TopCenter => (Align::Center, Align::Start),
        Corner::BottomCenter => (Align::Center, Align::End),
        Corner::LeftCenter => (Align::Start, Align::Center),
        Corner::RightCenter => (Align::End, Align::Center),
        Corner::Center => (Align::Center, Align::Center),
    }
}

/// Position along one axis; centering floors, also for a badge wider than the display
fn axis(origin: i32, extent: i32, badge: i32, offset: i32, align: Align) -> i32 {
    match align {
        Align::Start => origin + offset,
        Align::End => origin + extent - badge - offset,
        Align::Center => origin + (extent - badge).div_euclid(2),
    }
}

/// Absolute position of a badge of `badge` size anchored at `corner` of `display`
pub fn place(display: Rect, badge: Size, corner: Corner, offset: Offset) -> Position {
    let (horizontal, vertical) = alignment(corner);
    Position {
        x: axis(display.x, display.width, badge.width, offset.x, horizontal),
        y: axis(display.y, display.height, badge.height, offset.y, vertical),
    }
}

/// Resolve the configured monitor to a valid display index
pub fn select_display(monitor: MonitorSelector, topology: &dyn DisplayTopology) -> usize {
    let primary = topology.primary_index();
    match monitor {
        MonitorSelector::Primary => primary,
        MonitorSelector::Index(index) if index < topology.count() => index,
        MonitorSelector::Index(index) => {
            tracing::debug!(index, count = topology.count(), primary, "Monitor index out of range, using primary");
            primary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::StaticDisplays;

    const DISPLAY: Rect = Rect::new(0, 0, 1920, 1080);
    const BADGE: Size = Size::new(200, 40);
    const OFFSET: Offset = Offset { x: 24, y: 24 };

    #[test]
    fn test_top_right_example() {
        assert_eq!(place(DISPLAY, BADGE, Corner::TopRight, OFFSET), Position::new(1696, 24));
    }

    #[test]
    fn test_all_corners_touch_expected_edges() {
        let display = Rect::new(100, -50, 1280, 720);
        let badge = Size::new(150, 31);
        let offset = Offset { x: 10, y: 7 };

        for corner in Corner::ALL {
            let pos = place(display, badge, corner, offset);
            let (h, v) = alignment(corner);

            match h {
                Align::Start => assert_eq!(pos.x - display.x, offset.x, "{corner:?}"),
                Align::End => assert_eq!(display.right() - (pos.x + badge.width), offset.x, "{corner:?}"),
                Align::Center => {
                    let left_gap = pos.x - display.x;
                    let right_gap = display.right() - (pos.x + badge.width);
                    assert!((left_gap - right_gap).abs() <= 1, "{corner:?}");
                }
            }
            match v {
                Align::Start => assert_eq!(pos.y - display.y, offset.y, "{corner:?}"),
                Align::End => assert_eq!(display.bottom() - (pos.y + badge.height), offset.y, "{corner:?}"),
                Align::Center => {
                    let top_gap = pos.y - display.y;
                    let bottom_gap = display.bottom() - (pos.y + badge.height);
                    assert!((top_gap - bottom_gap).abs() <= 1, "{corner:?}");
                }
            }
        }
    }

    #[test]
    fn test_center_ignores_offset_and_floors() {
        let pos = place(Rect::new(0, 0, 101, 51), Size::new(10, 10), Corner::Center, Offset { x: 99, y: 99 });
        assert_eq!(pos, Position::new(45, 20));
    }

    #[test]
    fn test_center_floors_negative_difference() {
        let pos = place(Rect::new(0, 0, 100, 100), Size::new(105, 10), Corner::TopCenter, OFFSET);
        assert_eq!(pos.x, -3);
    }

    #[test]
    fn test_second_display_origin_is_respected() {
        let right_display = Rect::new(1920, 0, 2560, 1440);
        let pos = place(right_display, BADGE, Corner::BottomLeft, OFFSET);
        assert_eq!(pos, Position::new(1944, 1440 - 40 - 24));
    }

    #[test]
    fn test_place_is_deterministic() {
        let a = place(DISPLAY, BADGE, Corner::BottomRight, OFFSET);
        let b = place(DISPLAY, BADGE, Corner::BottomRight, OFFSET);
        assert_eq!(a, b);
    }

    #[test]
    fn test_select_display_out_of_range_uses_primary() {
        let displays = StaticDisplays::new(
            vec![Rect::new(0, 0, 1920, 1080), Rect::new(1920, 0, 1920, 1080)],
            1,
        );
        assert_eq!(select_display(MonitorSelector::Index(5), &displays), 1);
        assert_eq!(select_display(MonitorSelector::Index(0), &displays), 0);
        assert_eq!(select_display(MonitorSelector::Primary, &displays), 1);
    }
}
