// ── IntelliBrite colors ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Fixed palette an IntelliBrite light accepts through `ACT`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum Color {
    White,
    Red,
    Green,
    Blue,
    Magenta,
}

impl Color {
    /// Code written to `ACT`.
    pub fn code(self) -> &'static str {
        match self {
            Self::White => "WHITER",
            Self::Red => "REDR",
            Self::Green => "GREENR",
            Self::Blue => "BLUER",
            Self::Magenta => "MAGNTAR",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "WHITER" => Some(Self::White),
            "REDR" => Some(Self::Red),
            "GREENR" => Some(Self::Green),
            "BLUER" => Some(Self::Blue),
            "MAGNTAR" => Some(Self::Magenta),
            _ => None,
        }
    }

    /// Hue in degrees.
    pub fn hue(self) -> f64 {
        match self {
            Self::White | Self::Red => 0.0,
            Self::Green => 120.0,
            Self::Blue => 240.0,
            Self::Magenta => 300.0,
        }
    }

    /// Saturation in percent.
    pub fn saturation(self) -> f64 {
        match self {
            Self::White => 0.0,
            _ => 100.0,
        }
    }

    /// Nearest palette entry for an arbitrary hue/saturation.
    ///
    /// Anything at or below half of Red's saturation is White. Otherwise
    /// the hue is bucketed at the midpoints between adjacent palette hues.
    pub fn from_hue_saturation(hue: f64, saturation: f64) -> Self {
        let midpoint = |a: Self, b: Self| (b.hue() - a.hue()) / 2.0 + a.hue();

        if saturation <= (Self::Red.saturation() - Self::White.saturation()) / 2.0 {
            Self::White
        } else if hue < midpoint(Self::Red, Self::Green) {
            Self::Red
        } else if hue < midpoint(Self::Green, Self::Blue) {
            Self::Green
        } else if hue < midpoint(Self::Blue, Self::Magenta) {
            Self::Blue
        } else {
            Self::Magenta
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn low_saturation_is_white() {
        assert_eq!(Color::from_hue_saturation(240.0, 50.0), Color::White);
        assert_eq!(Color::from_hue_saturation(0.0, 0.0), Color::White);
    }

    #[test]
    fn hue_buckets() {
        assert_eq!(Color::from_hue_saturation(59.0, 100.0), Color::Red);
        assert_eq!(Color::from_hue_saturation(60.0, 100.0), Color::Green);
        assert_eq!(Color::from_hue_saturation(179.0, 80.0), Color::Green);
        assert_eq!(Color::from_hue_saturation(180.0, 80.0), Color::Blue);
        assert_eq!(Color::from_hue_saturation(269.9, 51.0), Color::Blue);
        assert_eq!(Color::from_hue_saturation(270.0, 51.0), Color::Magenta);
        assert_eq!(Color::from_hue_saturation(359.0, 100.0), Color::Magenta);
    }

    #[test]
    fn palette_entries_map_to_themselves() {
        for color in Color::iter().filter(|c| *c != Color::White) {
            assert_eq!(Color::from_hue_saturation(color.hue(), color.saturation()), color);
            assert_eq!(Color::from_code(color.code()), Some(color));
        }
    }

    #[test]
    fn parses_names() {
        assert_eq!("Magenta".parse::<Color>().ok(), Some(Color::Magenta));
        assert_eq!(Color::Blue.to_string(), "blue");
    }
}
