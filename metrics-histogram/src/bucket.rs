//! Bucket codec.
//!
//! A bucket is a sample value with the low-order bits of its mantissa cleared.  Only the sign,
//! the exponent, and the top `precision` bits of the mantissa survive, so every value that
//! shares those bits collapses onto the same bucket.  For positive values the truncated value is
//! the lower edge of the bucket; for negative values it is the edge closest to zero, which is the
//! upper edge in numeric order.
//!
//! Buckets can also be packed into a compact integer key by dropping the cleared bits entirely.
//! Packing is lossless with respect to the truncated value, but the precision is not encoded in
//! the key: unpacking with a different precision than the one used for packing silently yields a
//! different, finite value.

/// Number of explicit mantissa bits in an IEEE 754 double.
const MANTISSA_BITS: u8 = 52;

/// Sign bit plus the eleven exponent bits, left-aligned.
const SIGN_EXPONENT_MASK: u64 = 0xFFF0_0000_0000_0000;

/// The largest supported precision, at which truncation keeps every mantissa bit.
pub const MAX_PRECISION: u8 = MANTISSA_BITS;

/// The precision used when none is specified.
///
/// Ten mantissa bits bound the relative error of a bucket to roughly 0.1%.
pub const DEFAULT_PRECISION: u8 = 10;

#[inline]
fn clamp(precision: u8) -> u8 {
    precision.min(MAX_PRECISION)
}

#[inline]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn mask(precision: u8) -> u64 {
    // Arithmetic shift, so the sign and exponent bits stay set and `precision` more follow.
    ((SIGN_EXPONENT_MASK as i64) >> clamp(precision)) as u64
}

/// Truncates `value` to the bucket it falls into at the given precision.
///
/// Zero, negative zero and the infinities are their own buckets.  NaN stays NaN as long as one of
/// its payload bits survives; at precision zero it collapses onto the infinity of the same sign.
///
/// Precisions above [`MAX_PRECISION`] are treated as [`MAX_PRECISION`].
pub fn truncate(value: f64, precision: u8) -> f64 {
    f64::from_bits(value.to_bits() & mask(precision))
}

/// Packs the bucket of `value` into a compact integer key.
///
/// The key holds exactly `precision + 12` significant bits.
pub fn pack(value: f64, precision: u8) -> u64 {
    let precision = clamp(precision);
    let shift = MANTISSA_BITS - precision;
    (value.to_bits() & mask(precision)) >> shift
}

/// Restores the bucket value from a key created by [`pack`] with the same precision.
pub fn unpack(packed: u64, precision: u8) -> f64 {
    let precision = clamp(precision);
    let shift = MANTISSA_BITS - precision;
    f64::from_bits(packed << shift)
}

/// Gets the successor bucket of the bucket `value` falls into.
///
/// This is the next representable truncated value away from zero: for positive values it is the
/// exclusive upper edge of the bucket, for negative values the exclusive lower edge.  Non-finite
/// values are returned as-is.
pub fn bucket_upper_bound(value: f64, precision: u8) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let precision = clamp(precision);
    let step = 1u64 << (MANTISSA_BITS - precision);
    let truncated = value.to_bits() & mask(precision);
    f64::from_bits(truncated + step)
}

/// Gets the `(lower, upper)` edges of the bucket `value` falls into.
///
/// The edges are ordered numerically regardless of sign, so `lower <= value <= upper` holds for
/// every finite value.
pub fn bucket_edges(value: f64, precision: u8) -> (f64, f64) {
    if !value.is_finite() {
        return (value, value);
    }

    let truncated = truncate(value, precision);
    let successor = bucket_upper_bound(value, precision);
    if value.is_sign_negative() {
        (successor, truncated)
    } else {
        (truncated, successor)
    }
}
