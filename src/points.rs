//! # Point Matching
//!
//! Assigns point datasets (traffic counters, sensors) to the nearest basemap
//! line.
//!
//! Every basemap line is split into its straight pieces, which are
//! bulk-loaded into an R-tree. A point query walks the tree in order of exact
//! point-to-segment distance, so the first hit is the global minimum and the
//! walk stops as soon as distances grow past it.
//!
//! ## Tie-breaks
//! - Several lines equally close to one point: the line that appears first in
//!   the basemap wins.
//! - Several points resolving to one line: the closest point wins, then the
//!   point that appears first in the dataset.

use std::collections::HashMap;
use std::time::Instant;

use geo::{Distance, Euclidean, Line, Point};
use log::{debug, info, warn};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::model::MatchTable;
use crate::{dedup_by_id, Record};

/// Relative slack when comparing squared distances for ties.
const TIE_EPSILON: f64 = 1e-12;

// =============================================================================
// R-tree Indexed Edge
// =============================================================================

/// One straight piece of a basemap line.
#[derive(Debug, Clone, Copy)]
struct IndexedEdge {
    line: usize,
    segment: Line<f64>,
}

impl RTreeObject for IndexedEdge {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let (start, end) = (self.segment.start, self.segment.end);
        AABB::from_corners([start.x, start.y], [end.x, end.y])
    }
}

impl PointDistance for IndexedEdge {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        Euclidean::distance(&Point::from(*point), &self.segment).powi(2)
    }
}

/// Spatial index over the pieces of a set of lines.
///
/// Line numbers returned by queries are positions in the slice the index was
/// built from.
pub struct EdgeIndex {
    tree: RTree<IndexedEdge>,
    lines: usize,
}

impl EdgeIndex {
    /// Index every line record; point records are ignored.
    pub fn build(records: &[&Record]) -> Self {
        let edges: Vec<IndexedEdge> = records
            .iter()
            .enumerate()
            .filter_map(|(line, record)| record.geometry.as_lines().map(|lines| (line, lines)))
            .flat_map(|(line, lines)| {
                lines
                    .iter()
                    .flat_map(|part| part.lines())
                    .map(move |segment| IndexedEdge { line, segment })
            })
            .collect();

        debug!(
            "[StreetMatcher] Indexed {} edges from {} records",
            edges.len(),
            records.len()
        );

        Self {
            tree: RTree::bulk_load(edges),
            lines: records.len(),
        }
    }

    /// Number of indexed edges.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Number of records the index was built from.
    pub fn line_count(&self) -> usize {
        self.lines
    }

    /// Lines at the minimum distance from `point`, in ascending position
    /// order, and that distance. `None` for an empty index.
    pub fn nearest_lines(&self, point: [f64; 2]) -> Option<(Vec<usize>, f64)> {
        let mut hits = self.tree.nearest_neighbor_iter_with_distance_2(&point);
        let (first, best) = hits.next()?;
        let limit = best + best * TIE_EPSILON;

        let mut lines = vec![first.line];
        lines.extend(hits.take_while(|(_, d2)| *d2 <= limit).map(|(edge, _)| edge.line));
        lines.sort_unstable();
        lines.dedup();

        Some((lines, best.sqrt()))
    }
}

// =============================================================================
// Point Assignment
// =============================================================================

/// Nearest basemap line(s) for one foreign point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointAssignment {
    pub point_id: String,
    /// Basemap ids at the minimum distance, in basemap order
    pub line_ids: Vec<String>,
    /// Planar distance to those lines
    pub distance: f64,
}

impl PointAssignment {
    /// The line the point is matched to: the first of the tied lines.
    pub fn nearest_line(&self) -> Option<&str> {
        self.line_ids.first().map(String::as_str)
    }
}

/// Find the nearest basemap line(s) for every point record.
///
/// Points are deduplicated by id (first wins). Records without point
/// geometry are skipped with a warning, as is everything when the basemap
/// has no lines.
pub fn assign_points_to_lines(basemap: &[Record], points: &[Record]) -> Vec<PointAssignment> {
    let lines = dedup_by_id(basemap);
    let index = EdgeIndex::build(&lines);
    if index.is_empty() {
        warn!("[StreetMatcher] Basemap has no line edges; {} points left unassigned", points.len());
        return Vec::new();
    }

    let unique = dedup_by_id(points);
    let mut skipped = 0;
    let assignments: Vec<PointAssignment> = unique
        .iter()
        .filter_map(|record| {
            let Some(point) = record.geometry.as_point() else {
                skipped += 1;
                return None;
            };
            let (positions, distance) = index.nearest_lines([point.x(), point.y()])?;
            Some(PointAssignment {
                point_id: record.id.clone(),
                line_ids: positions.into_iter().map(|pos| lines[pos].id.clone()).collect(),
                distance,
            })
        })
        .collect();

    if skipped > 0 {
        warn!("[StreetMatcher] Skipping {} records without point geometry", skipped);
    }
    assignments
}

/// Match a point dataset onto the basemap.
///
/// Every basemap line gets a row; it holds the id of the closest point that
/// chose this line as its nearest, or `None`.
///
/// # Example
/// ```
/// use street_matcher::{match_points_to_osm, Geometry, Record};
///
/// let basemap = vec![
///     Record::new("osm-1", Geometry::line(&[(0.0, 0.0), (10.0, 0.0)])),
///     Record::new("osm-2", Geometry::line(&[(0.0, 5.0), (10.0, 5.0)])),
/// ];
/// let counters = vec![Record::new("counter-1", Geometry::point(3.0, 4.0))];
///
/// let table = match_points_to_osm(&basemap, &counters);
/// assert_eq!(table.get("osm-2"), Some("counter-1"));
/// assert_eq!(table.get("osm-1"), None);
/// ```
pub fn match_points_to_osm(basemap: &[Record], points: &[Record]) -> MatchTable {
    let started = Instant::now();
    let assignments = assign_points_to_lines(basemap, points);

    // line id -> (distance, order, point id)
    let mut claims: HashMap<&str, (f64, usize, &str)> = HashMap::new();
    for (order, assignment) in assignments.iter().enumerate() {
        let Some(line) = assignment.nearest_line() else { continue };
        let claim = (assignment.distance, order, assignment.point_id.as_str());
        claims
            .entry(line)
            .and_modify(|current| {
                if claim.0 < current.0 {
                    *current = claim;
                }
            })
            .or_insert(claim);
    }

    let mut table: MatchTable = dedup_by_id(basemap)
        .into_iter()
        .filter(|r| r.geometry.as_lines().is_some())
        .map(|r| (r.id.clone(), None))
        .collect();
    let displaced = assignments.len() - claims.len();
    table.extend(
        claims
            .into_iter()
            .map(|(line, (_, _, point))| (line.to_string(), Some(point.to_string()))),
    );

    info!(
        "[StreetMatcher] Assigned {} points to {} lines ({} lost to a closer point) in {:?}",
        assignments.len(),
        table.matched_count(),
        displaced,
        started.elapsed()
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Geometry;
    use geo::{Distance, Euclidean, Point};

    fn horizontal(id: &str, y: f64) -> Record {
        Record::new(id, Geometry::line(&[(0.0, y), (10.0, y)]))
    }

    fn point(id: &str, x: f64, y: f64) -> Record {
        Record::new(id, Geometry::point(x, y))
    }

    #[test]
    fn test_equidistant_point_goes_to_first_line() {
        let basemap = vec![horizontal("osm-b", 2.0), horizontal("osm-a", 0.0)];
        let points = vec![point("p-1", 5.0, 1.0)];

        let assignments = assign_points_to_lines(&basemap, &points);
        assert_eq!(assignments[0].line_ids, vec!["osm-b", "osm-a"]);
        assert!((assignments[0].distance - 1.0).abs() < 1e-12);

        let table = match_points_to_osm(&basemap, &points);
        assert_eq!(table.get("osm-b"), Some("p-1"));
        assert_eq!(table.get("osm-a"), None);
        assert!(table.contains("osm-a"));
    }

    #[test]
    fn test_closest_point_claims_line() {
        let basemap = vec![horizontal("osm-1", 0.0), horizontal("osm-2", 100.0)];
        let points = vec![
            point("far", 2.0, 3.0),
            point("near", 8.0, 0.5),
            point("tied", 5.0, 0.5),
        ];

        let table = match_points_to_osm(&basemap, &points);
        assert_eq!(table.get("osm-1"), Some("near"));
        assert_eq!(table.get("osm-2"), None);
        assert_eq!(table.matched_count(), 1);
    }

    #[test]
    fn test_multi_part_line_uses_nearest_part() {
        let basemap = vec![
            Record::new(
                "osm-1",
                Geometry::multi_line(&[
                    vec![(0.0, 10.0), (1.0, 10.0)],
                    vec![(5.0, 0.0), (5.0, 1.0)],
                ]),
            ),
            Record::new("osm-2", Geometry::line(&[(0.0, 3.0), (1.0, 3.0)])),
        ];
        let points = vec![point("p-1", 5.5, 0.5)];

        let assignments = assign_points_to_lines(&basemap, &points);
        assert_eq!(assignments[0].nearest_line(), Some("osm-1"));
        assert!((assignments[0].distance - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_duplicates_and_non_points_skipped() {
        let basemap = vec![horizontal("osm-1", 0.0)];
        let points = vec![
            point("p-1", 1.0, 1.0),
            point("p-1", 1.0, 0.1),
            Record::new("l-1", Geometry::line(&[(0.0, 0.0), (1.0, 1.0)])),
        ];

        let assignments = assign_points_to_lines(&basemap, &points);
        assert_eq!(assignments.len(), 1);
        assert!((assignments[0].distance - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_basemap_assigns_nothing() {
        let points = vec![point("p-1", 1.0, 1.0)];
        assert!(assign_points_to_lines(&[], &points).is_empty());
        assert!(match_points_to_osm(&[], &points).is_empty());
    }

    #[test]
    fn test_index_agrees_with_linear_scan() {
        // Small LCG keeps the test deterministic without extra dependencies
        let mut state: u64 = 42;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64 * 100.0
        };

        let basemap: Vec<Record> = (0..40)
            .map(|i| {
                let (x, y) = (next(), next());
                let bend = (x + next() / 10.0, y + next() / 10.0);
                Record::new(format!("osm-{i}"), Geometry::line(&[(x, y), bend, (next(), next())]))
            })
            .collect();
        let refs: Vec<&Record> = basemap.iter().collect();
        let index = EdgeIndex::build(&refs);
        assert_eq!(index.line_count(), 40);
        assert_eq!(index.len(), 80);

        for _ in 0..200 {
            let p = [next(), next()];
            let (lines, distance) = index.nearest_lines(p).unwrap();
            let query = Point::from(p);
            let brute = basemap
                .iter()
                .map(|r| Euclidean::distance(&query, r.geometry.as_lines().unwrap()))
                .fold(f64::INFINITY, f64::min);
            assert!((distance - brute).abs() < 1e-9);
            let chosen = basemap[lines[0]].geometry.as_lines().unwrap();
            assert!((Euclidean::distance(&query, chosen) - brute).abs() < 1e-9);
        }
    }
}
