//! Software rasterizer for the badge
//!
//! Pixels are premultiplied ARGB (`0xAARRGGBB`), the layout `put_image`
//! expects on a little-endian 32-bit visual once converted to bytes.

use crate::color::Rgba;

/// Text bitmap produced by the font renderer
#[derive(Debug, Clone, Default)]
pub struct RenderedText {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u32>, // ARGB pixels (premultiplied alpha)
}

#[derive(Debug, Clone)]
pub struct Canvas {
    width: usize,
    height: usize,
    data: Vec<u32>,
}

impl Canvas {
    /// Fully transparent canvas
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    #[cfg(test)]
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        self.data[y * self.width + x]
    }

    /// Filled rounded rectangle covering `[x, x+w) x [y, y+h)`, antialiased edges
    pub fn fill_rounded_rect(&mut self, x: f64, y: f64, w: f64, h: f64, radius: f64, color: Rgba) {
        let radius = radius.clamp(0.0, w.min(h) / 2.0);
        let (cx, cy) = (x + w / 2.0, y + h / 2.0);
        let (half_w, half_h) = (w / 2.0 - radius, h / 2.0 - radius);

        self.fill_by_coverage(color, |px, py| {
            // Signed distance to a rounded box centered at (cx, cy)
            let qx = (px - cx).abs() - half_w;
            let qy = (py - cy).abs() - half_h;
            let outside = (qx.max(0.0).powi(2) + qy.max(0.0).powi(2)).sqrt();
            let inside = qx.max(qy).min(0.0);
            outside + inside - radius
        });
    }

    /// Filled circle, antialiased edge
    pub fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Rgba) {
        self.fill_by_coverage(color, |px, py| ((px - cx).powi(2) + (py - cy).powi(2)).sqrt() - radius);
    }

    /// Composite `color` over every pixel, weighted by the signed distance at the pixel center
    fn fill_by_coverage(&mut self, color: Rgba, distance: impl Fn(f64, f64) -> f64) {
        let src = color.premultiplied_argb32();
        if src >> 24 == 0 {
            return;
        }
        for y in 0..self.height {
            for x in 0..self.width {
                let d = distance(x as f64 + 0.5, y as f64 + 0.5);
                let coverage = (0.5 - d).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    let idx = y * self.width + x;
                    self.data[idx] = over(scale_pixel(src, coverage), self.data[idx]);
                }
            }
        }
    }

    /// Composite a text bitmap with its top-left corner at (x, y)
    pub fn blit(&mut self, text: &RenderedText, x: i32, y: i32) {
        for ty in 0..text.height {
            let py = y + ty as i32;
            if py < 0 || py >= self.height as i32 {
                continue;
            }
            for tx in 0..text.width {
                let px = x + tx as i32;
                if px < 0 || px >= self.width as i32 {
                    continue;
                }
                let src = text.data[ty * text.width + tx];
                if src >> 24 == 0 {
                    continue;
                }
                let idx = py as usize * self.width + px as usize;
                self.data[idx] = over(src, self.data[idx]);
            }
        }
    }

    /// X11 native byte order (little-endian BGRA)
    pub fn to_bgra_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data.len() * 4);
        for pixel in &self.data {
            bytes.extend_from_slice(&pixel.to_le_bytes());
        }
        bytes
    }
}

fn scale_pixel(pixel: u32, factor: f64) -> u32 {
    let channel = |shift: u32| ((((pixel >> shift) & 0xFF) as f64 * factor).round() as u32) << shift;
    channel(24) | channel(16) | channel(8) | channel(0)
}

/// Porter-Duff OVER on premultiplied pixels
fn over(src: u32, dst: u32) -> u32 {
    let inv = 255 - (src >> 24);
    let channel = |shift: u32| {
        let s = (src >> shift) & 0xFF;
        let d = (dst >> shift) & 0xFF;
        ((s + (d * inv + 127) / 255).min(255)) << shift
    };
    channel(24) | channel(16) | channel(8) | channel(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba = Rgba::new(255, 0, 0, 255);

    #[test]
    fn test_rounded_rect_corners_are_cut() {
        let mut canvas = Canvas::new(40, 20);
        canvas.fill_rounded_rect(0.0, 0.0, 40.0, 20.0, 10.0, RED);

        assert_eq!(canvas.pixel(20, 10), 0xFFFF0000);
        assert_eq!(canvas.pixel(0, 0), 0);
        assert_eq!(canvas.pixel(39, 19), 0);
        // Straight edge midpoint is fully covered
        assert_eq!(canvas.pixel(20, 0), 0xFFFF0000);
    }

    #[test]
    fn test_circle_is_antialiased() {
        let mut canvas = Canvas::new(21, 21);
        canvas.fill_circle(10.5, 10.5, 8.0, RED);

        assert_eq!(canvas.pixel(10, 10), 0xFFFF0000);
        assert_eq!(canvas.pixel(0, 0), 0);
        let edge_alpha = canvas.pixel(10, 2) >> 24;
        assert!(edge_alpha > 0 && edge_alpha < 255, "edge alpha {edge_alpha}");
    }

    #[test]
    fn test_translucent_fill_is_premultiplied() {
        let mut canvas = Canvas::new(1, 1);
        canvas.fill_rounded_rect(0.0, 0.0, 1.0, 1.0, 0.0, Rgba::new(255, 255, 255, 128));
        assert_eq!(canvas.pixel(0, 0), 0x80808080);
    }

    #[test]
    fn test_blit_composites_over_and_clips() {
        let mut canvas = Canvas::new(4, 4);
        canvas.fill_rounded_rect(0.0, 0.0, 4.0, 4.0, 0.0, Rgba::new(0, 0, 255, 255));
        let text = RenderedText {
            width: 2,
            height: 2,
            data: vec![0xFFFFFFFF, 0, 0, 0xFFFFFFFF],
        };

        canvas.blit(&text, 3, 3);

        assert_eq!(canvas.pixel(3, 3), 0xFFFFFFFF);
        assert_eq!(canvas.pixel(2, 2), 0xFF0000FF);
    }

    #[test]
    fn test_bgra_byte_order() {
        let mut canvas = Canvas::new(1, 1);
        canvas.fill_rounded_rect(0.0, 0.0, 1.0, 1.0, 0.0, Rgba::new(0x11, 0x22, 0x33, 0xFF));
        assert_eq!(canvas.to_bgra_bytes(), vec![0x33, 0x22, 0x11, 0xFF]);
    }
}
