//! # Line Similarity
//!
//! Scores that decide whether two (possibly multi-part) lines describe the
//! same street.
//!
//! ## Strategies
//!
//! | Strategy | Score |
//! |----------|-------|
//! | [`EllipseOverlap`] | IoU of rotated ellipses inscribed in the rounded bounds (default) |
//! | [`BoxOverlap`] | IoU of the rounded bounding boxes |
//! | [`RoundedOverlap`] | 1.0 if rounded endpoint segments overlap, else 0.0 |
//!
//! Every strategy takes the number of decimal digits kept when rounding:
//! fewer digits snap nearby coordinates together and make matching more
//! tolerant.
//!
//! ## Angle
//!
//! [`angle_between`] compares the bounding-box diagonals, not the lines'
//! own directions. Reversing a line does not change its bounds, so the angle
//! is direction-invariant, and the result is folded modulo 90°.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{
    Area, BooleanOps, BoundingRect, Coord, Line, LineString, MultiLineString, Polygon, Rect,
};

use crate::geo_utils::{line_bounds, part_endpoints, round_to_digits};
use crate::BoundingBox;

/// Vertices used to approximate an ellipse.
pub const ELLIPSE_SEGMENTS: usize = 64;

/// Bounds of the unit X axis, used to measure a line's own orientation.
const X_AXIS: BoundingBox = BoundingBox {
    min_x: 0.0,
    min_y: 0.0,
    max_x: 1.0,
    max_y: 0.0,
};

/// A pluggable similarity score between a target line and a candidate.
///
/// Scores are in `[0, 1]`; zero means "unrelated" and never qualifies as a
/// match.
pub trait LineSimilarity {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Similarity of `candidate` to `target` with coordinates rounded to
    /// `round_digits` decimals.
    fn score(
        &self,
        target: &MultiLineString<f64>,
        candidate: &MultiLineString<f64>,
        round_digits: i32,
    ) -> f64;
}

/// Intersection-over-union of bounding ellipses. Production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct EllipseOverlap;

impl LineSimilarity for EllipseOverlap {
    fn name(&self) -> &'static str {
        "ellipse_overlap"
    }

    fn score(
        &self,
        target: &MultiLineString<f64>,
        candidate: &MultiLineString<f64>,
        round_digits: i32,
    ) -> f64 {
        ellipse_iou(target, candidate, round_digits)
    }
}

/// Intersection-over-union of rounded bounding boxes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxOverlap;

impl LineSimilarity for BoxOverlap {
    fn name(&self) -> &'static str {
        "box_overlap"
    }

    fn score(
        &self,
        target: &MultiLineString<f64>,
        candidate: &MultiLineString<f64>,
        round_digits: i32,
    ) -> f64 {
        box_iou(target, candidate, round_digits)
    }
}

/// Binary score from [`lines_overlap`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundedOverlap;

impl LineSimilarity for RoundedOverlap {
    fn name(&self) -> &'static str {
        "rounded_overlap"
    }

    fn score(
        &self,
        target: &MultiLineString<f64>,
        candidate: &MultiLineString<f64>,
        round_digits: i32,
    ) -> f64 {
        if lines_overlap(target, candidate, round_digits) {
            1.0
        } else {
            0.0
        }
    }
}

// =============================================================================
// Angle
// =============================================================================

/// Angle in degrees, in `[0, 90)`, between the bounding-box diagonals of two
/// lines.
///
/// Returns `None` when either line collapses to a single point.
///
/// # Example
///
/// ```rust
/// use street_matcher::{angle_between, Geometry};
///
/// let diagonal = Geometry::line(&[(0.0, 0.0), (1.0, 1.0)]);
/// let flat = Geometry::line(&[(0.0, 0.0), (2.0, 0.0)]);
/// let angle = angle_between(diagonal.as_lines().unwrap(), flat.as_lines().unwrap()).unwrap();
/// assert!((angle - 45.0).abs() < 1e-9);
/// ```
pub fn angle_between(a: &MultiLineString<f64>, b: &MultiLineString<f64>) -> Option<f64> {
    diagonal_angle(&line_bounds(a)?, &line_bounds(b)?)
}

/// Angle between the diagonals of two boxes; see [`angle_between`].
pub fn diagonal_angle(a: &BoundingBox, b: &BoundingBox) -> Option<f64> {
    let v1 = (a.min_x - a.max_x, a.min_y - a.max_y);
    let v2 = (b.min_x - b.max_x, b.min_y - b.max_y);
    let (n1, n2) = (v1.0.hypot(v1.1), v2.0.hypot(v2.1));
    if !(n1 > 0.0 && n2 > 0.0) {
        return None;
    }

    let cos = ((v1.0 * v2.0 + v1.1 * v2.1) / (n1 * n2)).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees() % 90.0)
}

// =============================================================================
// Buffers
// =============================================================================

/// Ellipse inscribed in the line's rounded bounds: centred in the box, with
/// semi-axes of half the box width and half the box height, rotated
/// counter-clockwise by the angle between the line's diagonal and the X axis.
///
/// Returns `None` when the rounded bounds have zero width or height.
pub fn ellipse_buffer(line: &MultiLineString<f64>, round_digits: i32) -> Option<Polygon<f64>> {
    let bounds = line_bounds(line)?;
    let rounded = bounds.rounded(round_digits);
    let (semi_x, semi_y) = (rounded.width() / 2.0, rounded.height() / 2.0);
    if !(semi_x > 0.0 && semi_y > 0.0) {
        return None;
    }

    let rotation = diagonal_angle(&bounds, &X_AXIS)?.to_radians();
    let (sin, cos) = rotation.sin_cos();
    let (cx, cy) = rounded.center();

    let ring: Vec<Coord<f64>> = (0..ELLIPSE_SEGMENTS)
        .map(|i| {
            let t = std::f64::consts::TAU * i as f64 / ELLIPSE_SEGMENTS as f64;
            let (x, y) = (semi_x * t.cos(), semi_y * t.sin());
            Coord {
                x: cx + x * cos - y * sin,
                y: cy + x * sin + y * cos,
            }
        })
        .collect();

    Some(Polygon::new(LineString::new(ring), vec![]))
}

/// The line's bounds rounded to `round_digits`, as a polygon.
///
/// Returns `None` when the rounded bounds have zero width or height.
pub fn box_buffer(line: &MultiLineString<f64>, round_digits: i32) -> Option<Polygon<f64>> {
    let rounded = line_bounds(line)?.rounded(round_digits);
    if !(rounded.width() > 0.0 && rounded.height() > 0.0) {
        return None;
    }
    Some(
        Rect::new(
            Coord { x: rounded.min_x, y: rounded.min_y },
            Coord { x: rounded.max_x, y: rounded.max_y },
        )
        .to_polygon(),
    )
}

// =============================================================================
// Overlap Scores
// =============================================================================

/// Intersection-over-union of the two lines' [`ellipse_buffer`]s, in `[0, 1]`.
///
/// Degenerate buffers (zero union area) score 0 instead of failing.
pub fn ellipse_iou(a: &MultiLineString<f64>, b: &MultiLineString<f64>, round_digits: i32) -> f64 {
    match (ellipse_buffer(a, round_digits), ellipse_buffer(b, round_digits)) {
        (Some(pa), Some(pb)) => polygon_iou(&pa, &pb),
        _ => 0.0,
    }
}

/// Intersection-over-union of the two lines' [`box_buffer`]s, in `[0, 1]`.
pub fn box_iou(a: &MultiLineString<f64>, b: &MultiLineString<f64>, round_digits: i32) -> f64 {
    match (box_buffer(a, round_digits), box_buffer(b, round_digits)) {
        (Some(pa), Some(pb)) => polygon_iou(&pa, &pb),
        _ => 0.0,
    }
}

fn polygon_iou(a: &Polygon<f64>, b: &Polygon<f64>) -> f64 {
    // Disjoint extents cannot intersect; skip the boolean ops
    match (a.bounding_rect(), b.bounding_rect()) {
        (Some(ra), Some(rb))
            if ra.max().x < rb.min().x
                || rb.max().x < ra.min().x
                || ra.max().y < rb.min().y
                || rb.max().y < ra.min().y =>
        {
            return 0.0;
        }
        (None, _) | (_, None) => return 0.0,
        _ => {}
    }

    let union = a.union(b).unsigned_area();
    if !(union > 0.0) {
        return 0.0;
    }
    let intersection = a.intersection(b).unsigned_area();
    (intersection / union).clamp(0.0, 1.0)
}

/// Whether any part of `a` overlaps any part of `b` once endpoints are
/// rounded to `round_digits`.
///
/// Each part is reduced to the segment between its first and last
/// coordinate. Two such segments overlap when they are collinear and share a
/// stretch of positive length. This is looser than the DE-9IM `overlaps`
/// predicate: identical segments and a segment lying inside the other also
/// count. Segments that merely cross or touch at a point do not.
pub fn lines_overlap(
    a: &MultiLineString<f64>,
    b: &MultiLineString<f64>,
    round_digits: i32,
) -> bool {
    let parts_b: Vec<Line<f64>> = part_endpoints(b)
        .into_iter()
        .map(|(start, end)| rounded_segment(start, end, round_digits))
        .collect();

    part_endpoints(a)
        .into_iter()
        .map(|(start, end)| rounded_segment(start, end, round_digits))
        .any(|seg_a| parts_b.iter().any(|seg_b| segments_overlap(seg_a, *seg_b)))
}

fn rounded_segment(start: Coord<f64>, end: Coord<f64>, digits: i32) -> Line<f64> {
    let round = |c: Coord<f64>| Coord {
        x: round_to_digits(c.x, digits),
        y: round_to_digits(c.y, digits),
    };
    Line::new(round(start), round(end))
}

fn segments_overlap(a: Line<f64>, b: Line<f64>) -> bool {
    if a.start == a.end || b.start == b.end {
        return false;
    }
    match line_intersection(a, b) {
        Some(LineIntersection::Collinear { intersection }) => {
            intersection.start != intersection.end
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Geometry;

    fn line(coords: &[(f64, f64)]) -> MultiLineString<f64> {
        match Geometry::line(coords) {
            Geometry::Lines(lines) => lines,
            Geometry::Point(_) => unreachable!(),
        }
    }

    fn reversed(lines: &MultiLineString<f64>) -> MultiLineString<f64> {
        MultiLineString::new(
            lines
                .0
                .iter()
                .rev()
                .map(|part| LineString::new(part.0.iter().rev().copied().collect()))
                .collect(),
        )
    }

    #[test]
    fn test_angle_identity_and_reversal() {
        let street = line(&[(16.60, 49.19), (16.6012, 49.1907), (16.6031, 49.1911)]);
        let self_angle = angle_between(&street, &street).unwrap();
        assert!(self_angle.abs() < 1e-6);

        let back = angle_between(&street, &reversed(&street)).unwrap();
        assert!(back.abs() < 1e-6);
    }

    #[test]
    fn test_angle_folds_modulo_90() {
        let vertical = line(&[(0.0, 0.0), (0.0, 1.0)]);
        let horizontal = line(&[(0.0, 0.0), (1.0, 0.0)]);
        let angle = angle_between(&vertical, &horizontal).unwrap();
        // 90 degrees folds to 0 (up to floating point on either side)
        assert!(angle < 1e-9 || angle > 90.0 - 1e-9);

        let steep = line(&[(0.0, 0.0), (1.0, 3.0)]);
        let shallow = line(&[(0.0, 0.0), (3.0, 1.0)]);
        let angle = angle_between(&steep, &shallow).unwrap();
        assert!((0.0..90.0).contains(&angle));
        assert!((angle - 53.130_102).abs() < 1e-4);
    }

    #[test]
    fn test_angle_of_point_like_line_is_none() {
        let point_like = line(&[(1.0, 1.0), (1.0, 1.0)]);
        let street = line(&[(0.0, 0.0), (1.0, 1.0)]);
        assert_eq!(angle_between(&point_like, &street), None);
    }

    #[test]
    fn test_ellipse_iou_identical_lines() {
        let street = line(&[(16.6000, 49.1900), (16.6020, 49.1915)]);
        let iou = ellipse_iou(&street, &street, 5);
        assert!((iou - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ellipse_iou_is_symmetric_and_bounded() {
        let a = line(&[(16.6000, 49.1900), (16.6020, 49.1915)]);
        let b = line(&[(16.6005, 49.1902), (16.6026, 49.1916)]);
        let ab = ellipse_iou(&a, &b, 5);
        let ba = ellipse_iou(&b, &a, 5);
        assert!(ab > 0.0 && ab < 1.0);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_ellipse_iou_disjoint_and_degenerate() {
        let a = line(&[(0.0, 0.0), (1.0, 1.0)]);
        let far = line(&[(10.0, 10.0), (11.0, 11.0)]);
        assert_eq!(ellipse_iou(&a, &far, 5), 0.0);

        // Axis-aligned lines have a flat buffer and zero union area
        let flat = line(&[(0.0, 0.5), (1.0, 0.5)]);
        assert_eq!(ellipse_iou(&flat, &flat, 5), 0.0);
        assert_eq!(ellipse_iou(&a, &flat, 5), 0.0);
        assert!(ellipse_buffer(&flat, 5).is_none());
    }

    #[test]
    fn test_ellipse_is_inscribed_in_bounds() {
        let street = line(&[(16.6000, 49.1900), (16.6020, 49.1915)]);
        let ellipse = ellipse_buffer(&street, 5).unwrap();

        // Polygonal ellipse area: (n/2)·sin(2π/n)·a·b with a, b the half extents
        let (a, b) = (0.0020 / 2.0, 0.0015 / 2.0);
        let n = ELLIPSE_SEGMENTS as f64;
        let expected = n / 2.0 * (std::f64::consts::TAU / n).sin() * a * b;
        assert!((ellipse.unsigned_area() - expected).abs() < expected * 1e-6);

        let center = ellipse.bounding_rect().unwrap().center();
        assert!((center.x - 16.6010).abs() < 1e-9);
        assert!((center.y - 49.19075).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_street_one_width_away_does_not_overlap() {
        let street = line(&[(0.0, 0.0), (4.0, 1.0)]);
        let beside = line(&[(4.0, 0.0), (8.0, 1.0)]);
        assert_eq!(ellipse_iou(&street, &beside, 5), 0.0);
    }

    #[test]
    fn test_box_iou_half_shift() {
        let a = line(&[(0.0, 0.0), (2.0, 2.0)]);
        let b = line(&[(1.0, 0.0), (3.0, 2.0)]);
        let iou = box_iou(&a, &b, 5);
        assert!((iou - 1.0 / 3.0).abs() < 1e-6);
        assert!((BoxOverlap.score(&a, &b, 5) - iou).abs() < 1e-12);
    }

    #[test]
    fn test_lines_overlap_collinear_only() {
        let a = line(&[(0.0, 0.0), (2.0, 0.0)]);
        let shifted = line(&[(1.0, 0.0), (3.0, 0.0)]);
        let parallel = line(&[(0.0, 1.0), (2.0, 1.0)]);
        let crossing = line(&[(1.0, -1.0), (1.0, 1.0)]);
        let touching = line(&[(2.0, 0.0), (4.0, 0.0)]);

        assert!(lines_overlap(&a, &shifted, 5));
        assert!(lines_overlap(&a, &a, 5));
        // A segment inside the other counts as overlap
        assert!(lines_overlap(&a, &line(&[(0.5, 0.0), (1.5, 0.0)]), 5));
        assert!(!lines_overlap(&a, &parallel, 5));
        assert!(!lines_overlap(&a, &crossing, 5));
        assert!(!lines_overlap(&a, &touching, 5));
    }

    #[test]
    fn test_lines_overlap_rounding_tolerance() {
        let a = line(&[(0.0, 0.0), (2.0, 0.00001)]);
        let b = line(&[(1.0, 0.0), (3.0, 0.00002)]);
        assert!(!lines_overlap(&a, &b, 7));
        assert!(lines_overlap(&a, &b, 4));
    }

    #[test]
    fn test_lines_overlap_multi_part_any() {
        let multi = match Geometry::multi_line(&[
            vec![(10.0, 10.0), (11.0, 12.0)],
            vec![(0.0, 0.0), (2.0, 0.0)],
        ]) {
            Geometry::Lines(lines) => lines,
            Geometry::Point(_) => unreachable!(),
        };
        let single = line(&[(1.0, 0.0), (5.0, 0.0)]);
        assert!(lines_overlap(&multi, &single, 5));
        assert!(lines_overlap(&single, &multi, 5));
        assert_eq!(RoundedOverlap.score(&multi, &single, 5), 1.0);
        assert_eq!(RoundedOverlap.score(&multi, &line(&[(0.0, 3.0), (1.0, 4.0)]), 5), 0.0);
    }
}
