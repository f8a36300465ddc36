//! Typed config document
//!
//! The on-disk JSON document maps onto [`Config`]. Every field always has a
//! value: the user document is deep-merged onto [`Config::default`] before it is
//! deserialized here, then [`Config::validate_and_clamp`] normalizes ranges.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::color::Rgba;
use crate::constants::font::{DEFAULT_FONT_FAMILY, DEFAULT_FONT_STYLE};
use crate::constants::validation::*;

/// Anchor point on the selected display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Corner {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
    TopCenter,
    BottomCenter,
    LeftCenter,
    RightCenter,
    Center,
}

impl Corner {
    pub const ALL: [Corner; 9] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
        Corner::TopCenter,
        Corner::BottomCenter,
        Corner::LeftCenter,
        Corner::RightCenter,
        Corner::Center,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Corner::TopLeft => "top-left",
            Corner::TopRight => "top-right",
            Corner::BottomLeft => "bottom-left",
            Corner::BottomRight => "bottom-right",
            Corner::TopCenter => "top-center",
            Corner::BottomCenter => "bottom-center",
            Corner::LeftCenter => "left-center",
            Corner::RightCenter => "right-center",
            Corner::Center => "center",
        }
    }

    /// Parse an anchor name; anything unrecognized is `top-right`
    pub fn parse_or_default(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .unwrap_or_else(|| {
                warn!(corner = %name, fallback = Corner::default().as_str(), "Unknown corner, using fallback");
                Corner::default()
            })
    }
}

impl Serialize for Corner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Corner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value.as_str() {
            Some(name) => Corner::parse_or_default(name),
            None => {
                warn!(corner = %value, "Corner is not a string, using fallback");
                Corner::default()
            }
        })
    }
}

/// Which display the badge lives on
///
/// Only the shape of the value is checked here; whether an index exists is
/// decided against the live topology at placement time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorSelector {
    #[default]
    Primary,
    Index(usize),
}

impl Serialize for MonitorSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MonitorSelector::Primary => serializer.serialize_str("primary"),
            MonitorSelector::Index(i) => serializer.serialize_u64(*i as u64),
        }
    }
}

impl<'de> Deserialize<'de> for MonitorSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let index = match &value {
            Value::String(s) if s == "primary" => return Ok(MonitorSelector::Primary),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        };
        Ok(match index {
            Some(i) => MonitorSelector::Index(i as usize),
            None => {
                warn!(monitor = %value, "Monitor is not 'primary' or a display index, using primary");
                MonitorSelector::Primary
            }
        })
    }
}

/// Pixel margins applied at the anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    #[serde(deserialize_with = "deserialize_pixels")]
    pub x: i32,
    #[serde(deserialize_with = "deserialize_pixels")]
    pub y: i32,
}

/// Any finite JSON number, rounded to the nearest pixel
fn deserialize_pixels<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() {
        return Err(serde::de::Error::custom("offset must be a finite number"));
    }
    Ok(value.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32)
}

/// Inner padding of the badge: `[vertical, horizontal]` on disk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Padding {
    pub vertical: f64,
    pub horizontal: f64,
}

impl Serialize for Padding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.vertical, self.horizontal].serialize(serializer)
    }
}

/// Accepts a single number (both axes) or `[vertical, horizontal]`
impl<'de> Deserialize<'de> for Padding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Uniform(f64),
            Pair(Vec<f64>),
        }

        match Shape::deserialize(deserializer)? {
            Shape::Uniform(v) => Ok(Padding { vertical: v, horizontal: v }),
            Shape::Pair(values) => match values.as_slice() {
                [v] => Ok(Padding { vertical: *v, horizontal: *v }),
                [v, h] => Ok(Padding { vertical: *v, horizontal: *h }),
                _ => Err(serde::de::Error::invalid_length(
                    values.len(),
                    &"one or two padding values",
                )),
            },
        }
    }
}

/// Scale pivot, each axis in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseSettings {
    pub enabled: bool,
    pub scale: f64,
    /// Milliseconds
    pub period_listening: u64,
    /// Milliseconds
    pub period_thinking: u64,
}

/// Semantic color roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRole {
    Background,
    BackgroundError,
    Text,
    DotListening,
    DotThinking,
    DotError,
    DotIdle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorSettings {
    pub bg: String,
    pub bg_error: String,
    pub text: String,
    pub dot_listening: String,
    pub dot_thinking: String,
    pub dot_error: String,
    pub dot_idle: String,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            bg: "rgba(24, 24, 27, 0.88)".to_string(),
            bg_error: "rgba(127, 29, 29, 0.92)".to_string(),
            text: "#f4f4f5".to_string(),
            dot_listening: "#22c55e".to_string(),
            dot_thinking: "#f59e0b".to_string(),
            dot_error: "#ef4444".to_string(),
            dot_idle: "#a1a1aa".to_string(),
        }
    }
}

impl ColorSettings {
    fn raw(&self, role: ColorRole) -> &str {
        match role {
            ColorRole::Background => &self.bg,
            ColorRole::BackgroundError => &self.bg_error,
            ColorRole::Text => &self.text,
            ColorRole::DotListening => &self.dot_listening,
            ColorRole::DotThinking => &self.dot_thinking,
            ColorRole::DotError => &self.dot_error,
            ColorRole::DotIdle => &self.dot_idle,
        }
    }

    /// Parse the color for `role`, falling back to the built-in color
    pub fn resolve(&self, role: ColorRole) -> Rgba {
        let raw = self.raw(role);
        Rgba::parse(raw).unwrap_or_else(|| {
            error!(role = ?role, color = %raw, "Invalid color, using default");
            Rgba::parse(ColorSettings::default().raw(role)).unwrap_or(Rgba::new(255, 255, 255, 255))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub corner: Corner,
    pub offset: Offset,
    pub monitor: MonitorSelector,
    pub show_label: bool,
    pub dot_size: f64,
    /// fontconfig family for the label, e.g. "Sans" or "DejaVu Sans"
    pub font_family: String,
    /// fontconfig style, e.g. "Bold"; empty means the family's default
    pub font_style: String,
    /// Points
    pub font_size: f64,
    pub padding: Padding,
    pub radius: f64,
    pub opacity: f64,
    pub pivot: Pivot,
    pub pulse: PulseSettings,
    pub colors: ColorSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            corner: Corner::TopRight,
            offset: Offset { x: 24, y: 24 },
            monitor: MonitorSelector::Primary,
            show_label: true,
            dot_size: 12.0,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_style: DEFAULT_FONT_STYLE.to_string(),
            font_size: 11.0,
            padding: Padding { vertical: 6.0, horizontal: 10.0 },
            radius: 14.0,
            opacity: 1.0,
            pivot: Pivot { x: 0.5, y: 0.5 },
            pulse: PulseSettings {
                enabled: true,
                scale: 1.06,
                period_listening: 700,
                period_thinking: 1100,
            },
            colors: ColorSettings::default(),
        }
    }
}

impl Config {
    /// The defaults as a JSON document, the base of every merge
    pub fn default_document() -> Value {
        // Serializing plain structs of numbers/strings/bools cannot fail
        serde_json::to_value(Config::default()).unwrap_or(Value::Null)
    }

    /// Clamp values to safe ranges after loading
    pub fn validate_and_clamp(&mut self) {
        if !(0.0..=1.0).contains(&self.opacity) {
            warn!(opacity = self.opacity, "opacity outside 0-1, clamping");
            self.opacity = clamp_unit(self.opacity);
        }

        if !(0.0..=1.0).contains(&self.pivot.x) || !(0.0..=1.0).contains(&self.pivot.y) {
            warn!(pivot_x = self.pivot.x, pivot_y = self.pivot.y, "pivot outside 0-1, clamping");
            self.pivot.x = clamp_unit(self.pivot.x);
            self.pivot.y = clamp_unit(self.pivot.y);
        }

        if below(self.pulse.scale, MIN_PULSE_SCALE) {
            warn!(scale = self.pulse.scale, min = MIN_PULSE_SCALE, "pulse.scale below minimum, clamping");
            self.pulse.scale = MIN_PULSE_SCALE;
        }

        if self.pulse.period_listening < MIN_PULSE_PERIOD_MS {
            warn!(period = self.pulse.period_listening, min = MIN_PULSE_PERIOD_MS, "pulse.periodListening below minimum, clamping");
            self.pulse.period_listening = MIN_PULSE_PERIOD_MS;
        }
        if self.pulse.period_thinking < MIN_PULSE_PERIOD_MS {
            warn!(period = self.pulse.period_thinking, min = MIN_PULSE_PERIOD_MS, "pulse.periodThinking below minimum, clamping");
            self.pulse.period_thinking = MIN_PULSE_PERIOD_MS;
        }

        if below(self.dot_size, MIN_DOT_SIZE) {
            warn!(dot_size = self.dot_size, min = MIN_DOT_SIZE, "dotSize below minimum, clamping");
            self.dot_size = MIN_DOT_SIZE;
        }

        if below(self.font_size, MIN_FONT_SIZE) {
            warn!(font_size = self.font_size, min = MIN_FONT_SIZE, "fontSize below minimum, clamping");
            self.font_size = MIN_FONT_SIZE;
        } else if self.font_size > MAX_FONT_SIZE {
            warn!(font_size = self.font_size, max = MAX_FONT_SIZE, "fontSize exceeds maximum, clamping");
            self.font_size = MAX_FONT_SIZE;
        }

        if self.font_family.trim().is_empty() {
            warn!(default = DEFAULT_FONT_FAMILY, "empty fontFamily, using default");
            self.font_family = DEFAULT_FONT_FAMILY.to_string();
        }

        if below(self.padding.vertical, 0.0) || below(self.padding.horizontal, 0.0) {
            warn!(vertical = self.padding.vertical, horizontal = self.padding.horizontal, "negative padding, clamping to 0");
            self.padding.vertical = self.padding.vertical.max(0.0);
            self.padding.horizontal = self.padding.horizontal.max(0.0);
        }

        if below(self.radius, 0.0) {
            warn!(radius = self.radius, "negative radius, clamping to 0");
            self.radius = 0.0;
        }
    }
}

/// NaN counts as below
fn below(v: f64, min: f64) -> bool {
    v.is_nan() || v < min
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 1.0 } else { v.clamp(0.0, 1.0) }
}
