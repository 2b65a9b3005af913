//! # Geometry Utilities
//!
//! Planar helpers shared by the segmenter and the similarity engine.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`round_to_digits`] | Round a coordinate to a number of decimal digits |
//! | [`line_bounds`] | Bounding box of a (multi-part) line |
//! | [`part_endpoints`] | First and last coordinate of every line part |
//!
//! ## Coordinate System
//!
//! Distances and angles are computed in the plane of the dataset coordinates.
//! For lon/lat data this is an equirectangular approximation, which is what
//! the matching tolerances are calibrated against: rounding to 5 digits
//! shifts a coordinate by at most ~2m, 4 digits by ~23m at mid latitudes.

use geo::{BoundingRect, Coord, MultiLineString};
use crate::BoundingBox;

// =============================================================================
// Rounding
// =============================================================================

/// Round `value` to `digits` decimal places (half away from zero).
///
/// Negative `digits` round to tens, hundreds, and so on.
///
/// # Example
///
/// ```rust
/// use street_matcher::geo_utils::round_to_digits;
///
/// assert_eq!(round_to_digits(16.512345, 4), 16.5123);
/// assert_eq!(round_to_digits(16.51235, 2), 16.51);
/// ```
#[inline]
pub fn round_to_digits(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

// =============================================================================
// Bounds
// =============================================================================

/// Bounding box of a multi-part line, `None` if it has no coordinates.
pub fn line_bounds(lines: &MultiLineString<f64>) -> Option<BoundingBox> {
    lines
        .bounding_rect()
        .map(|rect| BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y))
}

/// First and last coordinate of every part that has at least two coordinates.
pub fn part_endpoints(lines: &MultiLineString<f64>) -> Vec<(Coord<f64>, Coord<f64>)> {
    lines
        .iter()
        .filter(|part| part.0.len() >= 2)
        .map(|part| (part.0[0], part.0[part.0.len() - 1]))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
