//! Color parsing for config color strings
//!
//! Accepts `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)` and `rgba(r, g, b, a)`
//! (alpha in 0.0-1.0). The leading `#` is optional for hex forms.

/// Straight (non-premultiplied) RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse a color string, returning None if the format is not recognized
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        let lower = s.to_ascii_lowercase();

        if let Some(body) = lower.strip_prefix("rgba(").and_then(|b| b.strip_suffix(')')) {
            return Self::parse_functional(body, true);
        }
        if let Some(body) = lower.strip_prefix("rgb(").and_then(|b| b.strip_suffix(')')) {
            return Self::parse_functional(body, false);
        }

        let hex = s.strip_prefix('#').unwrap_or(s);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            3 => {
                let nib = |i: usize| {
                    u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17)
                };
                Some(Self::new(nib(0)?, nib(1)?, nib(2)?, 255))
            }
            6 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, 255)),
            8 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    fn parse_functional(body: &str, with_alpha: bool) -> Option<Self> {
        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        let expected = if with_alpha { 4 } else { 3 };
        if parts.len() != expected {
            return None;
        }

        let channel = |p: &str| p.parse::<u16>().ok().filter(|v| *v <= 255).map(|v| v as u8);
        let r = channel(parts[0])?;
        let g = channel(parts[1])?;
        let b = channel(parts[2])?;
        let a = if with_alpha {
            let alpha = parts[3].parse::<f32>().ok()?;
            if !(0.0..=1.0).contains(&alpha) {
                return None;
            }
            (alpha * 255.0).round() as u8
        } else {
            255
        };
        Some(Self::new(r, g, b, a))
    }

    /// Same color with alpha multiplied by `factor` (0.0-1.0)
    pub fn with_alpha_factor(self, factor: f64) -> Self {
        let a = (self.a as f64 * factor.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }

    /// Premultiplied ARGB32, the pixel layout of a 32-bit X11 visual
    pub fn premultiplied_argb32(self) -> u32 {
        let a = self.a as u32;
        let pm = |c: u8| (c as u32 * a + 127) / 255;
        (a << 24) | (pm(self.r) << 16) | (pm(self.g) << 8) | pm(self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(Rgba::parse("#ff0000"), Some(Rgba::new(255, 0, 0, 255)));
        assert_eq!(Rgba::parse("00ff0080"), Some(Rgba::new(0, 255, 0, 128)));
        assert_eq!(Rgba::parse("#fff"), Some(Rgba::new(255, 255, 255, 255)));
    }

    #[test]
    fn test_parse_functional_forms() {
        assert_eq!(Rgba::parse("rgb(1, 2, 3)"), Some(Rgba::new(1, 2, 3, 255)));
        assert_eq!(
            Rgba::parse("RGBA(24, 24, 27, 0.5)"),
            Some(Rgba::new(24, 24, 27, 128))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Rgba::parse("red"), None);
        assert_eq!(Rgba::parse("#12345"), None);
        assert_eq!(Rgba::parse("rgba(1, 2, 3)"), None);
        assert_eq!(Rgba::parse("rgb(300, 0, 0)"), None);
        assert_eq!(Rgba::parse("rgba(0, 0, 0, 1.5)"), None);
    }

    #[test]
    fn test_premultiplied_argb32() {
        assert_eq!(Rgba::new(255, 0, 0, 255).premultiplied_argb32(), 0xFFFF0000);
        assert_eq!(Rgba::new(255, 255, 255, 0).premultiplied_argb32(), 0x00000000);
        assert_eq!(Rgba::new(255, 0, 0, 128).premultiplied_argb32(), 0x80800000);
    }
}
