//! TrueType label rendering using fontdue (pure Rust)

use anyhow::{Context, Result};
use fontconfig::{Fontconfig, Pattern};
use fontdue::{Font, FontSettings};
use std::ffi::CString;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::raster::RenderedText;
use crate::color::Rgba;

const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
];

/// Resolve a family (and optional style) to a font file via fontconfig
///
/// Unknown families resolve to fontconfig's substitute face.
pub fn find_font_path(family: &str, style: &str) -> Result<PathBuf> {
    let fc = Fontconfig::new().context("Failed to initialize fontconfig")?;

    let mut pattern = Pattern::new(&fc);
    let family_cstr = CString::new(family).with_context(|| format!("Invalid family name: {}", family))?;
    pattern.add_string(fontconfig::FC_FAMILY, &family_cstr);
    if !style.is_empty() {
        let style_cstr = CString::new(style).with_context(|| format!("Invalid style name: {}", style))?;
        pattern.add_string(fontconfig::FC_STYLE, &style_cstr);
    }

    let matched = pattern.font_match();
    let path = matched
        .filename()
        .map(PathBuf::from)
        .with_context(|| format!("No font file found for '{} {}'", family, style))?;

    if !path.exists() {
        return Err(anyhow::anyhow!("Font file path '{}' does not exist", path.display()));
    }

    debug!(
        family,
        style,
        matched_family = ?matched.get_string(fontconfig::FC_FAMILY),
        path = %path.display(),
        "Resolved label font via fontconfig"
    );
    Ok(path)
}

/// Label font; the pixel size is chosen per call so the pulse can scale text
#[derive(Debug)]
pub struct TextRenderer {
    font: Font,
}

impl TextRenderer {
    /// Load a TrueType font from a file path
    pub fn from_path(path: PathBuf) -> Result<Self> {
        let font_data = fs::read(&path)
            .with_context(|| format!("Failed to read font file: {}", path.display()))?;

        let font = Font::from_bytes(font_data, FontSettings::default())
            .map_err(|e| anyhow::anyhow!("Failed to parse font {}: {}", path.display(), e))?;

        debug!(path = %path.display(), "Loaded label font");
        Ok(Self { font })
    }

    /// The configured face, falling back to any known system font
    pub fn from_family(family: &str, style: &str) -> Result<Self> {
        match find_font_path(family, style).and_then(Self::from_path) {
            Ok(renderer) => Ok(renderer),
            Err(e) => {
                warn!(family, style, error = ?e, "Configured font unavailable, trying system fonts");
                Self::from_system_font()
            }
        }
    }

    /// Try the compile-time FONT_PATH, then common distribution locations
    pub fn from_system_font() -> Result<Self> {
        const FONT_PATH: Option<&str> = option_env!("FONT_PATH");
        if let Some(build_font_path) = FONT_PATH
            && let Ok(renderer) = Self::from_path(PathBuf::from(build_font_path))
        {
            return Ok(renderer);
        }

        for path in SYSTEM_FONT_PATHS {
            if let Ok(renderer) = Self::from_path(PathBuf::from(path)) {
                return Ok(renderer);
            }
        }

        Err(anyhow::anyhow!(
            "Could not find any system fonts. Tried FONT_PATH ({:?}) and {:?}",
            FONT_PATH,
            SYSTEM_FONT_PATHS
        ))
    }

    /// Ascent and descent (positive, pixels) of the font's line box
    fn line_extent(&self, px: f32) -> (f32, f32) {
        match self.font.horizontal_line_metrics(px) {
            Some(line) => (line.ascent, -line.descent),
            None => (px * 0.8, px * 0.2),
        }
    }

    /// Width and line height of `text` at `px` without rasterizing
    pub fn measure(&self, text: &str, px: f32) -> (f64, f64) {
        if text.is_empty() {
            return (0.0, 0.0);
        }
        let width: f32 = text.chars().map(|ch| self.font.metrics(ch, px).advance_width).sum();
        let (ascent, descent) = self.line_extent(px);
        (width.ceil() as f64, (ascent + descent).ceil() as f64)
    }

    /// Render text in `color` onto a transparent bitmap one line box tall
    pub fn render(&self, text: &str, px: f32, color: Rgba) -> RenderedText {
        let (width, height) = self.measure(text, px);
        let (width, height) = (width as usize, height as usize);
        if width == 0 || height == 0 {
            return RenderedText::default();
        }

        let (ascent, _) = self.line_extent(px);
        let baseline = ascent.round() as i32;
        let mut data = vec![0u32; width * height];

        let fg_a = color.a as f32 / 255.0;
        let (fg_r, fg_g, fg_b) = (color.r as f32, color.g as f32, color.b as f32);

        let mut pen_x = 0.0f32;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, px);
            let x_offset = (pen_x + metrics.xmin as f32).round() as i32;
            // Glyph top relative to the line box top
            let top = baseline - (metrics.height as i32 + metrics.ymin);

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let px_x = x_offset + gx as i32;
                    let px_y = top + gy as i32;
                    if px_x < 0 || px_y < 0 || px_x >= width as i32 || px_y >= height as i32 {
                        continue;
                    }

                    let coverage = bitmap[gy * metrics.width + gx] as f32 / 255.0;
                    if coverage > 0.0 {
                        // Premultiply: alpha = fg_alpha * coverage, RGB scaled by the same
                        let alpha = fg_a * coverage;
                        let a = (alpha * 255.0) as u32;
                        let r = (fg_r * alpha) as u32;
                        let g = (fg_g * alpha) as u32;
                        let b = (fg_b * alpha) as u32;
                        data[(px_y as usize) * width + (px_x as usize)] = (a << 24) | (r << 16) | (g << 8) | b;
                    }
                }
            }
            pen_x += metrics.advance_width;
        }

        RenderedText { width, height, data }
    }
}
