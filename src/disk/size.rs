//! Byte-exact size type with unit parsing and sector conversion
//!
//! All arithmetic is done on integer bytes. Parsing is locale independent:
//! `K`, `M`, `G`, `T` and their `KiB`/`KB` spellings are all binary units.

use crate::utils::error::{LayoutError, Result};
use once_cell::sync::Lazy;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};
use std::str::FromStr;

pub const KIB: u64 = 1 << 10;
pub const MIB: u64 = 1 << 20;
pub const GIB: u64 = 1 << 30;
pub const TIB: u64 = 1 << 40;
pub const PIB: u64 = 1 << 50;

/// Units tried when rendering, largest first.
const UNITS: [(u64, &str); 6] = [
    (PIB, "PiB"),
    (TIB, "TiB"),
    (GIB, "GiB"),
    (MIB, "MiB"),
    (KIB, "KiB"),
    (1, "B"),
];

static SIZE_RE: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"^\s*(\d+)(?:\.(\d+))?\s*([A-Za-z]*)\s*$").expect("size pattern is valid")
});

/// A non-negative byte count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Size(u64);

/// Rounding direction for [`Size::round_to_nearest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundMode {
    Down,
    Up,
    HalfUp,
}

impl Size {
    pub const ZERO: Size = Size(0);

    pub const fn from_bytes(bytes: u64) -> Self {
        Size(bytes)
    }

    pub const fn kib(n: u64) -> Self {
        Size(n * KIB)
    }

    pub const fn mib(n: u64) -> Self {
        Size(n * MIB)
    }

    pub const fn gib(n: u64) -> Self {
        Size(n * GIB)
    }

    pub const fn tib(n: u64) -> Self {
        Size(n * TIB)
    }

    pub const fn bytes(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Whole MiB, truncated.
    pub const fn to_mib(self) -> u64 {
        self.0 / MIB
    }

    pub fn checked_sub(self, rhs: Size) -> Option<Size> {
        self.0.checked_sub(rhs.0).map(Size)
    }

    pub fn saturating_sub(self, rhs: Size) -> Size {
        Size(self.0.saturating_sub(rhs.0))
    }

    /// `self * num / den` without intermediate overflow; truncates.
    pub fn mul_ratio(self, num: u64, den: u64) -> Size {
        if den == 0 {
            return Size::ZERO;
        }
        Size(((self.0 as u128 * num as u128) / den as u128) as u64)
    }

    /// Round to a multiple of `unit`.
    pub fn round_to_nearest(self, unit: Size, mode: RoundMode) -> Size {
        if unit.0 == 0 {
            return self;
        }
        let rem = self.0 % unit.0;
        if rem == 0 {
            return self;
        }
        let down = self.0 - rem;
        match mode {
            RoundMode::Down => Size(down),
            RoundMode::Up => Size(down + unit.0),
            RoundMode::HalfUp => {
                if rem * 2 >= unit.0 {
                    Size(down + unit.0)
                } else {
                    Size(down)
                }
            }
        }
    }

    /// Render with the largest binary unit that divides the value exactly.
    ///
    /// Unlike `Display` this never loses precision, so it is what gets
    /// serialized.
    pub fn to_exact_string(self) -> String {
        if self.0 == 0 {
            return "0 B".to_string();
        }
        for (unit, name) in UNITS {
            if self.0 % unit == 0 {
                return format!("{} {}", self.0 / unit, name);
            }
        }
        format!("{} B", self.0)
    }

    /// Parse `"2 GiB"`, `"500m"`, `"1.5G"` or a bare byte count.
    pub fn parse(input: &str) -> Result<Self> {
        let caps = SIZE_RE
            .captures(input)
            .ok_or_else(|| LayoutError::InvalidSize(input.to_string()))?;
        let whole: u128 = caps[1]
            .parse()
            .map_err(|_| LayoutError::InvalidSize(input.to_string()))?;
        let unit = unit_multiplier(&caps[3])
            .ok_or_else(|| LayoutError::InvalidSize(input.to_string()))? as u128;

        let mut bytes = whole * unit;
        if let Some(frac) = caps.get(2) {
            let digits = frac.as_str();
            if digits.len() > 18 {
                return Err(LayoutError::InvalidSize(input.to_string()));
            }
            let numerator: u128 = digits
                .parse()
                .map_err(|_| LayoutError::InvalidSize(input.to_string()))?;
            bytes += numerator * unit / 10u128.pow(digits.len() as u32);
        }

        u64::try_from(bytes)
            .map(Size)
            .map_err(|_| LayoutError::InvalidSize(input.to_string()))
    }
}

fn unit_multiplier(suffix: &str) -> Option<u64> {
    match suffix.to_ascii_lowercase().as_str() {
        "" | "b" => Some(1),
        "k" | "kb" | "kib" => Some(KIB),
        "m" | "mb" | "mib" => Some(MIB),
        "g" | "gb" | "gib" => Some(GIB),
        "t" | "tb" | "tib" => Some(TIB),
        "p" | "pb" | "pib" => Some(PIB),
        _ => None,
    }
}

/// Number of whole sectors in `size`. Truncates; callers pick the rounding
/// direction when aligning.
pub fn size_to_sectors(size: Size, sector_size: u64) -> u64 {
    size.0 / sector_size
}

pub fn sectors_to_size(sectors: u64, sector_size: u64) -> Size {
    Size(sectors * sector_size)
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (unit, name) = UNITS
            .iter()
            .copied()
            .find(|(unit, _)| self.0 >= *unit)
            .unwrap_or((1, "B"));
        let hundredths = (self.0 as u128 * 100) / unit as u128;
        let whole = hundredths / 100;
        let frac = hundredths % 100;
        if frac == 0 {
            write!(f, "{} {}", whole, name)
        } else if frac % 10 == 0 {
            write!(f, "{}.{} {}", whole, frac / 10, name)
        } else {
            write!(f, "{}.{:02} {}", whole, frac, name)
        }
    }
}

impl FromStr for Size {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self> {
        Size::parse(s)
    }
}

impl Add for Size {
    type Output = Size;
    fn add(self, rhs: Size) -> Size {
        Size(self.0 + rhs.0)
    }
}

impl AddAssign for Size {
    fn add_assign(&mut self, rhs: Size) {
        self.0 += rhs.0;
    }
}

impl Sub for Size {
    type Output = Size;
    fn sub(self, rhs: Size) -> Size {
        Size(self.0 - rhs.0)
    }
}

impl SubAssign for Size {
    fn sub_assign(&mut self, rhs: Size) {
        self.0 -= rhs.0;
    }
}

impl Mul<u64> for Size {
    type Output = Size;
    fn mul(self, rhs: u64) -> Size {
        Size(self.0 * rhs)
    }
}

impl Div<u64> for Size {
    type Output = Size;
    fn div(self, rhs: u64) -> Size {
        Size(self.0 / rhs)
    }
}

/// How many whole `rhs` fit in `self`.
impl Div<Size> for Size {
    type Output = u64;
    fn div(self, rhs: Size) -> u64 {
        self.0 / rhs.0
    }
}

impl Sum for Size {
    fn sum<I: Iterator<Item = Size>>(iter: I) -> Size {
        iter.fold(Size::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Size> for Size {
    fn sum<I: Iterator<Item = &'a Size>>(iter: I) -> Size {
        iter.copied().sum()
    }
}

impl Serialize for Size {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_exact_string())
    }
}

struct SizeVisitor;

impl<'de> Visitor<'de> for SizeVisitor {
    type Value = Size;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a byte count or a size string such as \"2 GiB\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Size, E> {
        Ok(Size(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Size, E> {
        u64::try_from(v)
            .map(Size)
            .map_err(|_| E::custom("size must not be negative"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Size, E> {
        Size::parse(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Size {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Size, D::Error> {
        deserializer.deserialize_any(SizeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binary_and_shorthand_units() {
        assert_eq!(Size::parse("2 GiB").unwrap(), Size::gib(2));
        assert_eq!(Size::parse("500m").unwrap(), Size::mib(500));
        assert_eq!(Size::parse("1K").unwrap(), Size::kib(1));
        assert_eq!(Size::parse("3 TB").unwrap(), Size::tib(3));
        assert_eq!(Size::parse("4096").unwrap(), Size::from_bytes(4096));
    }

    #[test]
    fn parses_fractions_without_floats() {
        assert_eq!(Size::parse("1.5 GiB").unwrap(), Size::mib(1536));
        assert_eq!(Size::parse("0.25M").unwrap(), Size::kib(256));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Size::parse("").is_err());
        assert!(Size::parse("12 parsecs").is_err());
        assert!(Size::parse("-1 GiB").is_err());
        assert!(Size::parse("99999999999 PiB").is_err());
    }

    #[test]
    fn display_picks_largest_unit() {
        assert_eq!(Size::gib(1).to_string(), "1 GiB");
        assert_eq!(Size::mib(500).to_string(), "500 MiB");
        assert_eq!(Size::mib(1536).to_string(), "1.5 GiB");
        assert_eq!((Size::gib(14) - Size::mib(10)).to_string(), "13.99 GiB");
        assert_eq!(Size::from_bytes(12).to_string(), "12 B");
    }

    #[test]
    fn exact_string_round_trips() {
        for size in [Size::gib(2), Size::mib(700), Size::from_bytes(513), Size::ZERO] {
            assert_eq!(Size::parse(&size.to_exact_string()).unwrap(), size);
        }
    }

    #[test]
    fn rounding_modes() {
        let unit = Size::mib(4);
        assert_eq!(Size::mib(5).round_to_nearest(unit, RoundMode::Down), Size::mib(4));
        assert_eq!(Size::mib(5).round_to_nearest(unit, RoundMode::Up), Size::mib(8));
        assert_eq!(Size::mib(5).round_to_nearest(unit, RoundMode::HalfUp), Size::mib(4));
        assert_eq!(Size::mib(6).round_to_nearest(unit, RoundMode::HalfUp), Size::mib(8));
        assert_eq!(Size::mib(8).round_to_nearest(unit, RoundMode::Up), Size::mib(8));
    }

    #[test]
    fn sector_conversion_truncates() {
        assert_eq!(size_to_sectors(Size::mib(1), 512), 2048);
        assert_eq!(size_to_sectors(Size::from_bytes(1023), 512), 1);
        assert_eq!(sectors_to_size(2048, 4096), Size::mib(8));
    }

    #[test]
    fn deserializes_from_string_or_integer() {
        #[derive(Deserialize)]
        struct Holder {
            a: Size,
            b: Size,
        }
        let h: Holder = toml::from_str("a = \"2 GiB\"\nb = 1024").unwrap();
        assert_eq!(h.a, Size::gib(2));
        assert_eq!(h.b, Size::kib(1));
    }
}
