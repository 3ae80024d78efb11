use std::fmt;

use rand::Rng;
use serde::Serialize;

/// Marker stored in the registry for a color re-rolled on every load.
pub const RANDOM_COLOR_MARKER: &str = "!random";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        Self::new(rng.r#gen(), rng.r#gen(), rng.r#gen())
    }

    pub fn from_packed(value: u32) -> Self {
        Self::new((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    /// Parse `#RRGGBB`, `#RGB`, `0xRRGGBB`, a decimal integer, or a basic CSS color name.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if let Some(hex) = trimmed.strip_prefix('#') {
            return parse_hex(hex);
        }
        if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            return u32::from_str_radix(hex, 16)
                .ok()
                .filter(|packed| *packed <= 0xFF_FFFF)
                .map(Self::from_packed);
        }
        if !trimmed.is_empty() && trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            return trimmed
                .parse::<u32>()
                .ok()
                .filter(|packed| *packed <= 0xFF_FFFF)
                .map(Self::from_packed);
        }
        named_color(trimmed)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Result of resolving a stored `displaycolor` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedColor {
    Literal(Rgb),
    Random(Rgb),
    Malformed(Rgb),
}

impl ResolvedColor {
    pub fn resolve(raw: &str) -> Self {
        if raw == RANDOM_COLOR_MARKER {
            return Self::Random(Rgb::random());
        }
        match Rgb::parse(raw) {
            Some(color) => Self::Literal(color),
            None => Self::Malformed(Rgb::random()),
        }
    }

    pub fn rgb(self) -> Rgb {
        match self {
            Self::Literal(color) | Self::Random(color) | Self::Malformed(color) => color,
        }
    }
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    if !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => u32::from_str_radix(hex, 16).ok().map(Rgb::from_packed),
        3 => {
            let mut channels = hex
                .chars()
                .map(|ch| ch.to_digit(16).map(|digit| (digit * 17) as u8));
            Some(Rgb::new(
                channels.next()??,
                channels.next()??,
                channels.next()??,
            ))
        }
        _ => None,
    }
}

fn named_color(name: &str) -> Option<Rgb> {
    let packed = match name.to_ascii_lowercase().as_str() {
        "black" => 0x000000,
        "silver" => 0xC0C0C0,
        "gray" | "grey" => 0x808080,
        "white" => 0xFFFFFF,
        "maroon" => 0x800000,
        "red" => 0xFF0000,
        "purple" => 0x800080,
        "fuchsia" | "magenta" => 0xFF00FF,
        "green" => 0x008000,
        "lime" => 0x00FF00,
        "olive" => 0x808000,
        "yellow" => 0xFFFF00,
        "navy" => 0x000080,
        "blue" => 0x0000FF,
        "teal" => 0x008080,
        "aqua" | "cyan" => 0x00FFFF,
        _ => return None,
    };
    Some(Rgb::from_packed(packed))
}
