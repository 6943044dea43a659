use anyhow::{anyhow, bail, Result};
use image::Rgba;
use serde::Deserialize;

const HIGHLIGHT_COLOR: [u8; 4] = [76, 175, 80, 77];
const VALUE_COLOR: [u8; 4] = [0, 0, 0, 255];
const MAX_VALUE_SIZE: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderStyle {
    pub highlight: Rgba<u8>,
    pub value_color: Rgba<u8>,
    /// Extra height added to the active highlight, in overlay pixels.
    pub height_pad: f64,
    /// Offset of a filled value from the field's top-left, in natural pixels.
    pub value_offset: f64,
    /// Filled-value text size in natural pixels.
    pub value_size: f64,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            highlight: Rgba(HIGHLIGHT_COLOR),
            value_color: Rgba(VALUE_COLOR),
            height_pad: 15.0,
            value_offset: 10.0,
            value_size: 25.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StyleOverrides {
    pub highlight: Option<String>,
    pub value_color: Option<String>,
    pub height_pad: Option<f64>,
    pub value_offset: Option<f64>,
    pub value_size: Option<f64>,
}

impl RenderStyle {
    pub fn with_overrides(mut self, overrides: &StyleOverrides) -> Result<Self> {
        if let Some(raw) = overrides.highlight.as_deref() {
            self.highlight =
                parse_color(raw).ok_or_else(|| anyhow!("invalid highlight color: {raw}"))?;
        }
        if let Some(raw) = overrides.value_color.as_deref() {
            self.value_color =
                parse_color(raw).ok_or_else(|| anyhow!("invalid value color: {raw}"))?;
        }
        for (key, value) in [
            ("height_pad", overrides.height_pad),
            ("value_offset", overrides.value_offset),
            ("value_size", overrides.value_size),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                bail!("style.{key} must be a finite number");
            }
        }
        if let Some(pad) = overrides.height_pad {
            self.height_pad = pad;
        }
        if let Some(offset) = overrides.value_offset {
            self.value_offset = offset;
        }
        if let Some(size) = overrides.value_size {
            self.value_size = size.clamp(1.0, MAX_VALUE_SIZE);
        }
        Ok(self)
    }
}

/// Accepts `#rrggbb`, `#rrggbbaa` and `rgba(r, g, b, a)` with `a` as a
/// fraction or a 0-255 value.
pub fn parse_color(raw: &str) -> Option<Rgba<u8>> {
    let s = raw.trim();
    if let Some(hex) = s.strip_prefix('#') {
        let channel =
            |i: usize| -> Option<u8> { u8::from_str_radix(hex.get(i..i + 2)?, 16).ok() };
        return match hex.len() {
            6 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255])),
            8 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
            _ => None,
        };
    }

    let lower = s.to_ascii_lowercase();
    let body = lower.strip_prefix("rgba(")?.strip_suffix(')')?;
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return None;
    }
    let channel = |p: &str| -> Option<u8> {
        Some(p.parse::<f64>().ok()?.round().clamp(0.0, 255.0) as u8)
    };
    let alpha_value = parts[3].parse::<f64>().ok()?;
    let a = if alpha_value <= 1.0 {
        (alpha_value * 255.0).round().clamp(0.0, 255.0) as u8
    } else {
        alpha_value.round().clamp(0.0, 255.0) as u8
    };
    Some(Rgba([
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        a,
    ]))
}
