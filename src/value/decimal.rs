//! Fixed-point decimal values and their 128-bit wire encoding.
//!
//! A decimal is stored on the wire as a two's-complement 128-bit integer equal to
//! `value * 10^scale`, split into a low and a high 64-bit word.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

use super::types::{Type, Value};

/// Largest precision the server accepts.
pub const MAX_PRECISION: u32 = 35;
/// Largest scale a [`Decimal`] can carry (digits of `i128::MAX`).
pub const MAX_SCALE: u32 = 38;

pub const DEFAULT_PRECISION: u32 = 22;
pub const DEFAULT_SCALE: u32 = 9;

/// Native decimal: `mantissa * 10^-scale`.
///
/// Equality is numeric, so `1.5` equals `1.500`.
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    pub fn new(mantissa: i128, scale: u32) -> Result<Self> {
        if scale > MAX_SCALE {
            return Err(Error::Argument(format!(
                "Decimal scale {} exceeds maximum of {}",
                scale, MAX_SCALE
            )));
        }
        Ok(Self { mantissa, scale })
    }

    #[inline]
    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    #[inline]
    pub fn scale(&self) -> u32 {
        self.scale
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.mantissa < 0
    }

    /// Number of significant digits in the mantissa (0 for zero).
    pub fn precision(&self) -> u32 {
        let mut magnitude = self.mantissa.unsigned_abs();
        let mut digits = 0;
        while magnitude != 0 {
            magnitude /= 10;
            digits += 1;
        }
        digits
    }

    /// Drop trailing fractional zeros.
    pub fn normalize(self) -> Self {
        let mut mantissa = self.mantissa;
        let mut scale = self.scale;
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        Self { mantissa, scale }
    }

    /// Pad the fraction with zeros up to `scale`.
    fn widen_to(self, scale: u32) -> Result<Self> {
        debug_assert!(scale >= self.scale);
        let factor = 10i128
            .checked_pow(scale - self.scale)
            .ok_or_else(|| Error::Argument(format!("Decimal scale {} is too large", scale)))?;
        let mantissa = self
            .mantissa
            .checked_mul(factor)
            .ok_or_else(|| Error::Argument(format!("Decimal {} overflows at scale {}", self, scale)))?;
        Ok(Self { mantissa, scale })
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        let a = self.normalize();
        let b = other.normalize();
        a.mantissa == b.mantissa && a.scale == b.scale
    }
}

impl Eq for Decimal {}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self {
            mantissa: value as i128,
            scale: 0,
        }
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Argument(format!("Invalid decimal literal: {:?}", s));

        let (negative, digits) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let mut mantissa: i128 = 0;
        for c in int_part.chars().chain(frac_part.chars()) {
            let digit = c.to_digit(10).ok_or_else(invalid)?;
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(digit as i128))
                .ok_or_else(|| Error::Argument(format!("Decimal literal out of range: {}", s)))?;
        }
        if negative {
            mantissa = -mantissa;
        }

        Self::new(mantissa, frac_part.len() as u32)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let sign = if self.mantissa < 0 { "-" } else { "" };

        if scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}

// ============================================================================
// Wire Encoding
// ============================================================================

/// Check the bounds of a `Decimal(precision, scale)` type.
pub(crate) fn check_type(precision: u32, scale: u32) -> Result<()> {
    if precision == 0 || precision > MAX_PRECISION {
        return Err(Error::Argument(format!(
            "Decimal precision must be between 1 and {}, got {}",
            MAX_PRECISION, precision
        )));
    }
    if scale > precision {
        return Err(Error::Argument(format!(
            "Decimal scale {} exceeds precision {}",
            scale, precision
        )));
    }
    Ok(())
}

/// Encode `value` as `Decimal(precision, scale)`.
///
/// Missing precision or scale default to the minimal ones of the value itself.
pub(crate) fn encode(value: Decimal, precision: Option<u32>, scale: Option<u32>) -> Result<(Type, Value)> {
    let value_precision = value.precision();
    let value_scale = value.scale();
    let scale = scale.unwrap_or(value_scale);
    let precision = precision.unwrap_or_else(|| value_precision.max(1));

    check_type(precision, scale)?;
    if value_precision as i64 - value_scale as i64 > precision as i64 - scale as i64 {
        return Err(Error::Argument(format!(
            "Decimal with precision ({}, {}) can't fit into ({}, {})",
            value_precision, value_scale, precision, scale
        )));
    }

    let scaled = if scale >= value_scale {
        value.widen_to(scale)?
    } else {
        let normalized = value.normalize();
        if normalized.scale() > scale {
            return Err(Error::Argument(format!(
                "Decimal {} has more fractional digits than scale {}",
                value, scale
            )));
        }
        normalized.widen_to(scale)?
    };

    let (low, high) = split_twos_complement(scaled.mantissa().unsigned_abs(), scaled.is_negative());
    Ok((Type::Decimal { precision, scale }, Value::int128(low, high)))
}

/// Split a magnitude into (low, high) words, negating in two's complement when
/// `negative`: both words are inverted and 1 is added across the 128 bits.
pub(crate) fn split_twos_complement(magnitude: u128, negative: bool) -> (u64, u64) {
    let mut low = magnitude as u64;
    let mut high = (magnitude >> 64) as u64;

    if negative {
        low = !low;
        high = !high;
        if low == u64::MAX {
            high = high.wrapping_add(1);
        }
        low = low.wrapping_add(1);
    }

    (low, high)
}

pub(crate) fn decode(low: u64, high: u64, scale: u32) -> Result<Decimal> {
    let raw = (((high as u128) << 64) | low as u128) as i128;
    Decimal::new(raw, scale)
}
