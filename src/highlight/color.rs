use serde::{Serialize, Serializer};
use std::fmt;

use crate::config::DEFAULT_HIGHLIGHT_COLOR;

/// Decoration color in CSS `rgba()` form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: f32,
}

impl HighlightColor {
    /// Parse `rgba(r, g, b, a)` or `rgb(r, g, b)`. Whitespace is ignored and alpha
    /// must lie in `0.0..=1.0`.
    pub fn parse(raw: &str) -> Option<Self> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let lower = compact.to_ascii_lowercase();
        let (body, expects_alpha) = if let Some(rest) = lower.strip_prefix("rgba(") {
            (rest.strip_suffix(')')?, true)
        } else if let Some(rest) = lower.strip_prefix("rgb(") {
            (rest.strip_suffix(')')?, false)
        } else {
            return None;
        };

        let parts: Vec<&str> = body.split(',').collect();
        let expected = if expects_alpha { 4 } else { 3 };
        if parts.len() != expected {
            return None;
        }

        let red = parts[0].parse::<u8>().ok()?;
        let green = parts[1].parse::<u8>().ok()?;
        let blue = parts[2].parse::<u8>().ok()?;
        let alpha = if expects_alpha {
            parts[3].parse::<f32>().ok()?
        } else {
            1.0
        };
        if !(0.0..=1.0).contains(&alpha) {
            return None;
        }

        Some(HighlightColor {
            red,
            green,
            blue,
            alpha,
        })
    }
}

impl Default for HighlightColor {
    fn default() -> Self {
        HighlightColor::parse(DEFAULT_HIGHLIGHT_COLOR).unwrap_or(HighlightColor {
            red: 79,
            green: 190,
            blue: 255,
            alpha: 0.15,
        })
    }
}

impl fmt::Display for HighlightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rgba({}, {}, {}, {})",
            self.red, self.green, self.blue, self.alpha
        )
    }
}

impl Serialize for HighlightColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rgba() {
        let color = HighlightColor::parse("rgba(79, 190, 255, 0.15)").unwrap();
        assert_eq!((color.red, color.green, color.blue), (79, 190, 255));
        assert!((color.alpha - 0.15).abs() < f32::EPSILON);
        assert_eq!(color.to_string(), "rgba(79, 190, 255, 0.15)");
    }

    #[test]
    fn test_parse_rgb_defaults_to_opaque() {
        let color = HighlightColor::parse("RGB(1,2,3)").unwrap();
        assert_eq!(color.alpha, 1.0);
        assert_eq!(color.to_string(), "rgba(1, 2, 3, 1)");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(HighlightColor::parse("#4fbeff").is_none());
        assert!(HighlightColor::parse("rgba(300, 0, 0, 0.5)").is_none());
        assert!(HighlightColor::parse("rgba(0, 0, 0, 1.5)").is_none());
        assert!(HighlightColor::parse("rgba(0, 0, 0)").is_none());
        assert!(HighlightColor::parse("rgb(0, 0, 0").is_none());
    }

    #[test]
    fn test_serializes_as_css_string() {
        let json = serde_json::to_string(&HighlightColor::default()).unwrap();
        assert_eq!(json, "\"rgba(79, 190, 255, 0.15)\"");
    }
}
