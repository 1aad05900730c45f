//! Utility functions for serde serialization.
//!
//! Helpers used with serde's `skip_serializing_if` attribute by the exporter
//! document models.

/// Returns `true` if the boolean value is `false`.
///
/// Used with `#[serde(skip_serializing_if = "is_false")]` to omit false values.
#[inline]
pub fn is_false(b: &bool) -> bool {
    !*b
}

/// Returns `true` if the u32 value is zero.
///
/// Used with `#[serde(skip_serializing_if = "is_zero_u32")]` to omit zero values.
#[inline]
pub fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
