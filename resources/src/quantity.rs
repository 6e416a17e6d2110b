//! Fixed-scale decimal quantities, modeled on Kubernetes' `resource.Quantity`.
//!
//! Internally every [`Quantity`] is an `i64` at milli-scale (1 unit = 1000
//! milli-units), which is precise enough for both CPU millicores and byte
//! counts and lets accumulation (`+=`) stay exact integer arithmetic. The
//! [`Format`] a value was parsed with is preserved so round-tripping a
//! human string through the evaluator doesn't change its suffix.

use std::cmp::Ordering;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Suffix family a quantity was expressed in, kept only for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Plain decimal, optionally with a `m`/`k`/`M`/`G`/... SI suffix.
    #[default]
    DecimalSI,
    /// Power-of-two suffix: `Ki`, `Mi`, `Gi`, `Ti`, `Pi`, `Ei`.
    BinarySI,
    /// Scientific notation, e.g. `1.5e3`.
    DecimalExponent,
}

/// A milli-scale fixed-point quantity with a preserved display format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quantity {
    milli: i64,
    format: Format,
}

impl Quantity {
    pub const fn from_milli(milli: i64) -> Self {
        Quantity {
            milli,
            format: Format::DecimalSI,
        }
    }

    pub const fn from_milli_with_format(milli: i64, format: Format) -> Self {
        Quantity { milli, format }
    }

    pub fn zero() -> Self {
        Quantity::default()
    }

    pub fn is_zero(&self) -> bool {
        self.milli == 0
    }

    pub fn milli_value(&self) -> i64 {
        self.milli
    }

    /// Value scaled to whole units (floor division), e.g. bytes rather than milli-bytes.
    pub fn unscaled_value(&self) -> i64 {
        self.milli / 1000
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn add(self, other: Quantity) -> Quantity {
        Quantity {
            milli: self.milli + other.milli,
            format: merge_format(self.format, other.format),
        }
    }

    pub fn saturating_add(self, other: Quantity) -> Quantity {
        Quantity {
            milli: self.milli.saturating_add(other.milli),
            format: merge_format(self.format, other.format),
        }
    }

    pub fn sub(self, other: Quantity) -> Quantity {
        Quantity {
            milli: self.milli - other.milli,
            format: merge_format(self.format, other.format),
        }
    }

    /// Multiply by a rational `num/den`, e.g. `slope * rounded / per`.
    pub fn mul_div(self, num: i64, den: i64) -> Quantity {
        let den = if den < 1 { 1 } else { den };
        Quantity {
            milli: (self.milli * num) / den,
            format: self.format,
        }
    }

    pub fn cmp_value(&self, other: &Quantity) -> Ordering {
        self.milli.cmp(&other.milli)
    }

    pub fn min(self, other: Quantity) -> Quantity {
        if self.milli <= other.milli {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Quantity) -> Quantity {
        if self.milli >= other.milli {
            self
        } else {
            other
        }
    }

    /// Parse a human string such as `"100Mi"`, `"2000m"`, `"1.5"`.
    pub fn parse(s: &str) -> Result<Quantity, QuantityParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(QuantityParseError::Empty);
        }
        let (numeric, suffix) = split_suffix(s);
        let (multiplier, format) = suffix_multiplier(suffix)?;
        let value: f64 = numeric
            .parse()
            .map_err(|_| QuantityParseError::InvalidNumber(numeric.to_string()))?;
        let milli = (value * multiplier * 1000.0).round() as i64;
        Ok(Quantity { milli, format })
    }

    /// Render back to the original suffix family.
    pub fn to_display_string(&self) -> String {
        let units = self.milli as f64 / 1000.0;
        match self.format {
            Format::DecimalSI => {
                if self.milli % 1000 != 0 {
                    format!("{}m", self.milli)
                } else {
                    format!("{}", self.milli / 1000)
                }
            }
            Format::BinarySI => format_binary(units),
            Format::DecimalExponent => format!("{:e}", units),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

/// First non-empty format wins; mixing Decimal and Binary keeps the first seen.
fn merge_format(a: Format, b: Format) -> Format {
    if a == Format::DecimalSI {
        b
    } else {
        a
    }
}

fn split_suffix(s: &str) -> (&str, &str) {
    let split_at = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+' || c == 'e' || c == 'E'))
        .unwrap_or(s.len());
    s.split_at(split_at)
}

fn suffix_multiplier(suffix: &str) -> Result<(f64, Format), QuantityParseError> {
    Ok(match suffix {
        "" => (1.0, Format::DecimalSI),
        "n" => (1e-9, Format::DecimalSI),
        "u" => (1e-6, Format::DecimalSI),
        "m" => (1e-3, Format::DecimalSI),
        "k" => (1e3, Format::DecimalSI),
        "M" => (1e6, Format::DecimalSI),
        "G" => (1e9, Format::DecimalSI),
        "T" => (1e12, Format::DecimalSI),
        "Ki" => (2f64.powi(10), Format::BinarySI),
        "Mi" => (2f64.powi(20), Format::BinarySI),
        "Gi" => (2f64.powi(30), Format::BinarySI),
        "Ti" => (2f64.powi(40), Format::BinarySI),
        "Pi" => (2f64.powi(50), Format::BinarySI),
        "Ei" => (2f64.powi(60), Format::BinarySI),
        other => return Err(QuantityParseError::UnknownSuffix(other.to_string())),
    })
}

fn format_binary(units: f64) -> String {
    const SUFFIXES: [(f64, &str); 6] = [
        (2f64.powi(60), "Ei"),
        (2f64.powi(50), "Pi"),
        (2f64.powi(40), "Ti"),
        (2f64.powi(30), "Gi"),
        (2f64.powi(20), "Mi"),
        (2f64.powi(10), "Ki"),
    ];
    for (scale, suffix) in SUFFIXES {
        if units >= scale && (units / scale).fract().abs() < 1e-6 {
            return format!("{}{}", (units / scale) as i64, suffix);
        }
    }
    format!("{}", units as i64)
}

#[derive(Debug, thiserror::Error)]
pub enum QuantityParseError {
    #[error("empty quantity string")]
    Empty,
    #[error("invalid numeric component: {0}")]
    InvalidNumber(String),
    #[error("unknown quantity suffix: {0}")]
    UnknownSuffix(String),
}

impl Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_display_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct QuantityVisitor;
        impl<'de> Visitor<'de> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a quantity string like \"100Mi\" or \"500m\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Quantity, E>
            where
                E: de::Error,
            {
                Quantity::parse(v).map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(QuantityVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_milli() {
        let q = Quantity::parse("2000m").unwrap();
        assert_eq!(q.milli_value(), 2_000_000);
    }

    #[test]
    fn parses_binary_mebibyte() {
        let q = Quantity::parse("100Mi").unwrap();
        assert_eq!(q.milli_value(), 100 * 2i64.pow(20) * 1000);
    }

    #[test]
    fn add_merges_format_from_first_nonempty() {
        let a = Quantity::parse("10Mi").unwrap();
        let b = Quantity::parse("5000000").unwrap();
        let sum = a.add(b);
        assert_eq!(sum.format(), Format::BinarySI);
    }

    #[test]
    fn round_trip_plain_decimal() {
        let q = Quantity::parse("560m").unwrap();
        assert_eq!(q.to_display_string(), "560m");
    }

    #[test]
    fn unknown_suffix_errors() {
        assert!(Quantity::parse("5Qz").is_err());
    }
}
