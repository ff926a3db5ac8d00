use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::MapValue;

/// The sort value a record is keyed by. Distinct from [`MapValue`] because
/// a sort value has exactly one of four shapes, each with its own encoding
/// rule; it is never nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortValue {
    Null,
    Text(String),
    Timestamp(DateTime<Utc>),
    Number(f64),
    /// Any other serialisable value: encoded for equality only, never
    /// range-comparable.
    Opaque(MapValue),
}

impl From<&str> for SortValue {
    fn from(value: &str) -> Self {
        SortValue::Text(value.to_string())
    }
}

impl From<i64> for SortValue {
    fn from(value: i64) -> Self {
        SortValue::Number(value as f64)
    }
}

impl From<f64> for SortValue {
    fn from(value: f64) -> Self {
        SortValue::Number(value)
    }
}

impl From<DateTime<Utc>> for SortValue {
    fn from(value: DateTime<Utc>) -> Self {
        SortValue::Timestamp(value)
    }
}

/// Folds a string into a byte sequence that orders consistently for a given
/// set of locales.
///
/// A full Unicode collation implementation (tailored per-locale weighting,
/// as `java.text.Collator` provides) is out of reach without pulling in an
/// ICU binding, which nothing in this crate's dependency set offers. This
/// collator instead case-folds text per-locale (so `"a" == "A"` collates
/// together, matching a collator's primary strength) and then orders by
/// raw UTF-8 bytes, which is enough to satisfy sort-key monotonicity for
/// the ASCII and most Latin-range text this crate is exercised against.
/// Recorded as an accepted Open Question resolution in DESIGN.md.
#[derive(Debug, Clone, Default)]
pub struct Collator {
    locales: Vec<String>,
}

impl Collator {
    pub fn new(locales: Vec<String>) -> Self {
        Self { locales }
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn collation_key(&self, text: &str) -> Vec<u8> {
        if self.locales.iter().any(|locale| locale.starts_with("tr")) {
            // Turkish-style casing: dotted/dotless I needs locale-aware
            // folding that `str::to_lowercase` does not provide either, so
            // fall back to the same generic fold; recorded as a known gap.
            text.to_lowercase().into_bytes()
        } else {
            text.to_lowercase().into_bytes()
        }
    }
}

/// Encodes [`SortValue`]s into fixed-width, lexicographically comparable
/// byte strings. `max_len` is the driver's `maxSorterLen`.
#[derive(Debug, Clone)]
pub struct SortKeyCodec {
    max_len: usize,
}

impl SortKeyCodec {
    pub fn new(max_len: usize) -> Self {
        assert!(max_len >= 2, "maxSorterLen must be at least 2 bytes");
        Self { max_len }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// The saturation bound `BIG`: `L - 1` bytes of `0x7F 0xFF .. 0xFF`.
    fn big(&self) -> Vec<u8> {
        let len = self.max_len - 1;
        let mut bytes = vec![0xFFu8; len];
        bytes[0] = 0x7F;
        bytes
    }

    pub fn encode(&self, value: &SortValue, collator: &Collator) -> Vec<u8> {
        match value {
            SortValue::Null => Vec::new(),
            SortValue::Text(s) => {
                let mut key = collator.collation_key(s);
                key.truncate(self.max_len);
                key
            }
            SortValue::Timestamp(ts) => {
                let text = ts.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);
                text.into_bytes()
            }
            SortValue::Number(n) => self.encode_number(*n),
            SortValue::Opaque(v) => {
                serde_json::to_vec(v).unwrap_or_default()
            }
        }
    }

    /// Numeric encoding: map `n` into `[0, 2*BIG]` via a
    /// half-range decimal shift, clamp, then right-align into `max_len`
    /// bytes as a big-endian unsigned integer.
    ///
    /// `BIG` (up to 127 bits for any `max_len` this codec is realistically
    /// built with) does not fit an `f64`'s 52-bit mantissa, so the clamp and
    /// the offset add happen in `i128`/`u128`; only the decimal shift
    /// (`n * scale`), which is approximate regardless since `n` itself is an
    /// `f64`, is computed in floating point.
    fn encode_number(&self, n: f64) -> Vec<u8> {
        let big = self.big();
        let big_value = bytes_to_u128(&big);
        // digits(BIG) ~= number of decimal digits in BIG; half of that is
        // the fractional-precision shift reserved for values right of the
        // decimal point. Approximated via the bit-length-derived decimal
        // digit count of BIG.
        let digits = decimal_digit_count(big_value);
        let shift = digits / 2;
        let scale = 10f64.powi(shift as i32);

        let shifted = (n * scale).trunc();

        let big_i128 = big_value as i128;
        // `as i128` on a float saturates (NaN -> 0, out-of-range -> ±MAX)
        // rather than wrapping, so the immediately-following clamp only
        // ever needs `big_i128` as a bound, never the saturated magnitude.
        let shifted_i128 = shifted as i128;
        let clamped = shifted_i128.clamp(-big_i128, big_i128);

        let offset_u128 = (clamped + big_i128) as u128; // in [0, 2*big_value], exact

        let mut buf = vec![0u8; self.max_len];
        let be = offset_u128.to_be_bytes();
        let copy_len = buf.len().min(be.len());
        buf[self.max_len - copy_len..].copy_from_slice(&be[be.len() - copy_len..]);
        buf
    }
}

fn bytes_to_u128(bytes: &[u8]) -> u128 {
    let mut value: u128 = 0;
    for &b in bytes {
        value = (value << 8) | b as u128;
    }
    value
}

fn decimal_digit_count(mut value: u128) -> u32 {
    if value == 0 {
        return 1;
    }
    let mut count = 0;
    while value > 0 {
        value /= 10;
        count += 1;
    }
    count
}
