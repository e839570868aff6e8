//! Colors and role-derived drawing attributes.

use std::fmt;
use std::str::FromStr;

use pm_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// RGBA color. Serialized as `#rrggbb` (or `rgba(...)` when translucent).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn with_alpha(mut self, a: f64) -> Self {
        self.a = a;
        self
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn hex(s: &str) -> Result<Self> {
        let digits = s.trim().strip_prefix('#').unwrap_or(s.trim());
        let bad = || Error::Configuration(format!("invalid color '{s}': expected #rrggbb"));
        if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
            return Err(bad());
        }
        let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| bad());
        let mut c = Color::rgb(byte(0)?, byte(2)?, byte(4)?);
        if digits.len() == 8 {
            c.a = byte(6)? as f64 / 255.0;
        }
        Ok(c)
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// CSS-style fill string.
    pub fn to_css(&self) -> String {
        if (self.a - 1.0).abs() < 1e-6 {
            self.to_hex()
        } else {
            format!("rgba({},{},{},{:.3})", self.r, self.g, self.b, self.a)
        }
    }

    /// `i`-th color of the default categorical palette (wraps around).
    pub fn palette(i: usize) -> Color {
        let [r, g, b] = TABLEAU10[i % TABLEAU10.len()];
        Color::rgb(r, g, b)
    }
}

const TABLEAU10: [[u8; 3]; 10] = [
    [0x4e, 0x79, 0xa7],
    [0xf2, 0x8e, 0x2b],
    [0xe1, 0x57, 0x59],
    [0x76, 0xb7, 0xb2],
    [0x59, 0xa1, 0x4f],
    [0xed, 0xc9, 0x48],
    [0xb0, 0x7a, 0xa1],
    [0xff, 0x9d, 0xa7],
    [0x9c, 0x75, 0x5f],
    [0xba, 0xb0, 0xab],
];

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}

impl FromStr for Color {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Color::hex(s)
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_css())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Color::hex(&s).map_err(serde::de::Error::custom)
    }
}

/// What a category represents in a plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Observed data: drawn as markers, never stacked.
    Data,
    /// Expected background: filled and stacked.
    Background,
    /// Hypothetical signal: outlined, drawn on top of the stack.
    Signal,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Data => "data",
            Role::Background => "background",
            Role::Signal => "signal",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "data" => Ok(Role::Data),
            "background" | "bkg" => Ok(Role::Background),
            "signal" | "sig" => Ok(Role::Signal),
            other => Err(Error::Configuration(format!(
                "unknown role '{other}' (expected data, background or signal)"
            ))),
        }
    }
}

/// Drawing attributes of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStyle {
    pub color: Color,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<Color>,
    pub line_color: Color,
    pub line_width: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_style: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_size: Option<f64>,
    pub stacked: bool,
}

impl CategoryStyle {
    /// Deterministic style for `role` drawn in `color`.
    pub fn for_role(role: Role, color: Color) -> Self {
        match role {
            Role::Data => Self {
                color: Color::BLACK,
                fill_color: None,
                line_color: Color::BLACK,
                line_width: 1.0,
                marker_style: Some(20),
                marker_size: Some(1.0),
                stacked: false,
            },
            Role::Background => Self {
                color,
                fill_color: Some(color),
                line_color: Color::BLACK,
                line_width: 1.0,
                marker_style: None,
                marker_size: None,
                stacked: true,
            },
            Role::Signal => Self {
                color,
                fill_color: None,
                line_color: color,
                line_width: 3.0,
                marker_style: None,
                marker_size: None,
                stacked: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        let c = Color::hex("#1f77b4").unwrap();
        assert_eq!((c.r, c.g, c.b), (0x1f, 0x77, 0xb4));
        assert_eq!(c.to_hex(), "#1f77b4");
        assert_eq!(Color::hex("ff000080").unwrap().to_css(), "rgba(255,0,0,0.502)");
        assert!(Color::hex("#12345").is_err());
        assert!(Color::hex("#gg0000").is_err());
    }

    #[test]
    fn role_styles() {
        let c = Color::palette(1);
        let data = CategoryStyle::for_role(Role::Data, c);
        assert_eq!(data.marker_style, Some(20));
        assert!(data.fill_color.is_none() && !data.stacked);
        assert_eq!(data.color, Color::BLACK);

        let bkg = CategoryStyle::for_role(Role::Background, c);
        assert_eq!(bkg.fill_color, Some(c));
        assert_eq!((bkg.line_color, bkg.line_width), (Color::BLACK, 1.0));
        assert!(bkg.stacked);

        let sig = CategoryStyle::for_role(Role::Signal, c);
        assert_eq!((sig.line_color, sig.line_width), (c, 3.0));
        assert!(sig.fill_color.is_none() && !sig.stacked);
    }

    #[test]
    fn role_from_str() {
        assert_eq!("Background".parse::<Role>().unwrap(), Role::Background);
        assert!("ghost".parse::<Role>().is_err());
    }
}
