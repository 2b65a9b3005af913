//! # Street Matching
//!
//! Matches lines of a foreign street network to basemap lines.
//!
//! ## Algorithm
//! 1. Start from a strict angle tolerance (15°) and 5-digit rounding
//! 2. Each round widens the angle by 5°; the round reaching 45° also drops
//!    one rounding digit (~2m → ~23m)
//! 3. In a round, the candidate with the highest similarity among those
//!    within the angle tolerance wins (first seen on ties)
//! 4. The first round with any qualifying candidate decides; a looser round
//!    is never consulted once a tighter one has produced a match
//!
//! Whole networks are matched segment by segment: a basemap line is only
//! compared with foreign lines assigned to the same grid segment.

use std::time::Instant;

use geo::MultiLineString;
use log::{debug, info, warn};

use crate::model::MatchTable;
use crate::segmentation::{assign_segments_to_dataset, SegmentAssignment, SegmentGrid};
use crate::similarity::{angle_between, EllipseOverlap, LineSimilarity};
use crate::{dedup_by_id, MatchConfig, Record, MAX_TOLERANCE_ROUNDS};

/// One step of the tolerance-escalation schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceRound {
    /// Candidates must be strictly below this angle (degrees).
    pub max_angle: f64,
    /// Decimal digits kept when rounding bounds in this round.
    pub round_digits: i32,
}

/// Result of matching one target line against a candidate list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMatch {
    /// Position of the winning candidate in the candidate list
    pub index: usize,
    /// Similarity score of the winner (0-1)
    pub score: f64,
    /// Angle between target and winner in degrees
    pub angle: f64,
    /// Zero-based round in which the match was accepted
    pub round_index: usize,
    /// Tolerances of that round
    pub round: ToleranceRound,
}

/// Options for matching a whole network.
#[derive(Debug, Clone, Default)]
pub struct NetworkMatchOptions {
    /// Segments to process; every segment of the grid when `None`.
    pub segment_ids: Option<Vec<usize>>,
    /// Tolerance schedule parameters.
    pub config: MatchConfig,
}

/// The rounds tried by [`match_line_with`], from strictest to loosest.
///
/// With the default configuration: (20°, 5) (25°, 5) (30°, 5) (35°, 5)
/// (40°, 5) (45°, 4). A configuration that would never reach the ceiling
/// yields only the ceiling round, and a step too small to move the angle
/// jumps straight to the ceiling round. No more than
/// [`MAX_TOLERANCE_ROUNDS`] rounds precede the ceiling round.
pub fn tolerance_schedule(config: &MatchConfig) -> Vec<ToleranceRound> {
    let ceiling_round = ToleranceRound {
        max_angle: config.angle_ceiling,
        round_digits: config.round_digits - 1,
    };
    if !(config.angle_step > 0.0)
        || !config.angle_offset_limit.is_finite()
        || !config.angle_ceiling.is_finite()
    {
        return vec![ceiling_round];
    }

    let mut rounds = Vec::new();
    let mut max_angle = config.angle_offset_limit;
    loop {
        let next = max_angle + config.angle_step;
        if next <= max_angle || rounds.len() >= MAX_TOLERANCE_ROUNDS {
            rounds.push(ceiling_round);
            return rounds;
        }
        max_angle = next;
        if max_angle >= config.angle_ceiling {
            rounds.push(ToleranceRound {
                max_angle,
                round_digits: config.round_digits - 1,
            });
            return rounds;
        }
        rounds.push(ToleranceRound {
            max_angle,
            round_digits: config.round_digits,
        });
    }
}

/// Find the best match for `target` among `candidates` using bounding
/// ellipse overlap and the default tolerance schedule.
///
/// Returns `None` when nothing qualifies up to the 45° ceiling, including
/// for an empty candidate list.
///
/// # Example
/// ```
/// use street_matcher::{match_lines_by_bbox_overlap, Geometry};
///
/// let osm = Geometry::line(&[(16.6000, 49.1900), (16.6020, 49.1915)]);
/// let census = Geometry::line(&[(16.6001, 49.1901), (16.6021, 49.1914)]);
/// let elsewhere = Geometry::line(&[(16.7000, 49.2000), (16.7020, 49.2015)]);
///
/// let target = osm.as_lines().unwrap();
/// let candidates = [elsewhere.as_lines().unwrap(), census.as_lines().unwrap()];
///
/// let found = match_lines_by_bbox_overlap(target, &candidates).unwrap();
/// assert_eq!(found.index, 1);
/// assert_eq!(found.round_index, 0);
/// ```
pub fn match_lines_by_bbox_overlap(
    target: &MultiLineString<f64>,
    candidates: &[&MultiLineString<f64>],
) -> Option<LineMatch> {
    match_line_with(target, candidates, &EllipseOverlap, &MatchConfig::default())
}

/// Tolerance-escalation search with an explicit similarity and config.
///
/// Scores only depend on the rounding, so they are computed once per
/// distinct digit count; angles are computed once per candidate.
pub fn match_line_with<S>(
    target: &MultiLineString<f64>,
    candidates: &[&MultiLineString<f64>],
    similarity: &S,
    config: &MatchConfig,
) -> Option<LineMatch>
where
    S: LineSimilarity + ?Sized,
{
    if candidates.is_empty() {
        return None;
    }

    let angles: Vec<Option<f64>> = candidates
        .iter()
        .map(|candidate| angle_between(target, candidate))
        .collect();

    let mut scored_digits = None;
    let mut scores: Vec<f64> = Vec::new();

    for (round_index, round) in tolerance_schedule(config).into_iter().enumerate() {
        if scored_digits != Some(round.round_digits) {
            scores = candidates
                .iter()
                .map(|candidate| similarity.score(target, candidate, round.round_digits))
                .collect();
            scored_digits = Some(round.round_digits);
        }

        let mut best: Option<LineMatch> = None;
        for (index, (&score, angle)) in scores.iter().zip(&angles).enumerate() {
            let Some(angle) = *angle else { continue };
            let best_score = best.map_or(0.0, |b| b.score);
            if angle < round.max_angle && score > best_score {
                best = Some(LineMatch {
                    index,
                    score,
                    angle,
                    round_index,
                    round,
                });
            }
        }

        if best.is_some() {
            return best;
        }
    }

    None
}

/// Alternative search: accept any candidate that scores above zero at some
/// rounding between `overlap_digits_max` and `overlap_digits_min` and lies
/// within `angle_offset_limit`, then pick the smallest angle (lowest index on
/// ties).
///
/// Intended for use with [`RoundedOverlap`](crate::RoundedOverlap), which
/// only detects collinear overlap.
pub fn match_line_to_set<S>(
    target: &MultiLineString<f64>,
    candidates: &[&MultiLineString<f64>],
    similarity: &S,
    config: &MatchConfig,
) -> Option<LineMatch>
where
    S: LineSimilarity + ?Sized,
{
    let mut best: Option<LineMatch> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let Some(angle) = angle_between(target, candidate) else {
            continue;
        };
        if !(angle < config.angle_offset_limit) {
            continue;
        }
        if best.is_some_and(|b| angle >= b.angle) {
            continue;
        }

        // Finest rounding first; report the first rounding that sees overlap
        let hit = (config.overlap_digits_min..=config.overlap_digits_max)
            .rev()
            .find_map(|digits| {
                let score = similarity.score(target, candidate, digits);
                (score > 0.0).then_some((digits, score))
            });

        if let Some((round_digits, score)) = hit {
            best = Some(LineMatch {
                index,
                score,
                angle,
                round_index: (config.overlap_digits_max - round_digits) as usize,
                round: ToleranceRound {
                    max_angle: config.angle_offset_limit,
                    round_digits,
                },
            });
        }
    }

    best
}

// ============================================================================
// Network Matching
// ============================================================================

/// Foreign lines deduplicated by id and segmented with the shared grid.
struct ForeignNetwork<'a> {
    lines: Vec<&'a Record>,
    segments: SegmentAssignment,
}

impl<'a> ForeignNetwork<'a> {
    fn prepare(foreign: &'a [Record], grid: &SegmentGrid) -> Self {
        let unique = dedup_by_id(foreign);
        let total = unique.len();
        let lines: Vec<&Record> = unique
            .into_iter()
            .filter(|r| r.geometry.as_lines().is_some())
            .collect();

        if lines.len() < total {
            warn!(
                "[StreetMatcher] Skipping {} foreign records without line geometry",
                total - lines.len()
            );
        }
        debug!(
            "[StreetMatcher] Foreign network: {} records, {} unique lines",
            foreign.len(),
            lines.len()
        );

        let segments = assign_segments_to_dataset(lines.iter().copied(), grid);
        Self { lines, segments }
    }
}

fn requested_segments(grid: &SegmentGrid, options: &NetworkMatchOptions) -> Vec<usize> {
    match &options.segment_ids {
        Some(ids) => {
            let (valid, invalid): (Vec<usize>, Vec<usize>) =
                ids.iter().partition(|&&id| id < grid.len());
            if !invalid.is_empty() {
                warn!(
                    "[StreetMatcher] Ignoring segment ids outside the {}-cell grid: {:?}",
                    grid.len(),
                    invalid
                );
            }
            valid
        }
        None => grid.segment_ids().collect(),
    }
}

/// Match every basemap line of one segment against that segment's foreign lines.
fn match_segment<S>(
    segment: usize,
    basemap: &[Record],
    basemap_segments: &SegmentAssignment,
    foreign: &ForeignNetwork<'_>,
    similarity: &S,
    config: &MatchConfig,
) -> Vec<(String, Option<String>)>
where
    S: LineSimilarity + ?Sized,
{
    let (candidate_ids, candidate_lines): (Vec<&str>, Vec<&MultiLineString<f64>>) = foreign
        .segments
        .members(segment)
        .iter()
        .filter_map(|&pos| {
            let record = foreign.lines[pos];
            record.geometry.as_lines().map(|lines| (record.id.as_str(), lines))
        })
        .unzip();

    let rows: Vec<(String, Option<String>)> = basemap_segments
        .members(segment)
        .iter()
        .filter_map(|&pos| {
            let record = basemap.get(pos)?;
            let lines = record.geometry.as_lines()?;
            let matched = match_line_with(lines, &candidate_lines, similarity, config)
                .map(|m| candidate_ids[m.index].to_string());
            Some((record.id.clone(), matched))
        })
        .collect();

    if !rows.is_empty() {
        debug!(
            "[StreetMatcher] Segment {}: {} basemap lines vs {} candidates, {} matched",
            segment,
            rows.len(),
            candidate_lines.len(),
            rows.iter().filter(|(_, m)| m.is_some()).count()
        );
    }
    rows
}

fn log_network_summary(table: &MatchTable, basemap_segments: &SegmentAssignment, started: Instant) {
    let unassigned = basemap_segments.len() - basemap_segments.assigned_count();
    info!(
        "[StreetMatcher] Examined {} basemap lines, matched {} in {:?}",
        table.len(),
        table.matched_count(),
        started.elapsed()
    );
    if unassigned > 0 {
        warn!(
            "[StreetMatcher] {} basemap lines have no segment and were not examined",
            unassigned
        );
    }
}

/// Match a foreign street network onto the basemap, segment by segment.
///
/// `basemap_segments` must come from segmenting `basemap` (same slice, same
/// order) with `grid`. The foreign network is deduplicated by id (first
/// wins), reduced to line geometries and segmented with the same grid.
///
/// Every basemap line in a processed segment gets a row: `Some(foreign id)`
/// or `None`. Basemap lines without a segment get no row.
pub fn match_street_network_to_osm(
    basemap: &[Record],
    basemap_segments: &SegmentAssignment,
    foreign: &[Record],
    grid: &SegmentGrid,
    options: &NetworkMatchOptions,
) -> MatchTable {
    match_street_network_with(basemap, basemap_segments, foreign, grid, options, &EllipseOverlap)
}

/// [`match_street_network_to_osm`] with an explicit similarity strategy.
pub fn match_street_network_with<S>(
    basemap: &[Record],
    basemap_segments: &SegmentAssignment,
    foreign: &[Record],
    grid: &SegmentGrid,
    options: &NetworkMatchOptions,
    similarity: &S,
) -> MatchTable
where
    S: LineSimilarity + ?Sized,
{
    let started = Instant::now();
    info!(
        "[StreetMatcher] Matching {} foreign records onto {} basemap lines ({})",
        foreign.len(),
        basemap.len(),
        similarity.name()
    );

    let network = ForeignNetwork::prepare(foreign, grid);
    let table: MatchTable = requested_segments(grid, options)
        .into_iter()
        .flat_map(|segment| {
            match_segment(segment, basemap, basemap_segments, &network, similarity, &options.config)
        })
        .collect();

    log_network_summary(&table, basemap_segments, started);
    table
}

/// Match a foreign street network using parallel processing.
///
/// This is the same as `match_street_network_to_osm` but processes segments
/// concurrently with rayon. Segments share no mutable state, so the merged
/// table is identical to the sequential result.
#[cfg(feature = "parallel")]
pub fn match_street_network_to_osm_parallel(
    basemap: &[Record],
    basemap_segments: &SegmentAssignment,
    foreign: &[Record],
    grid: &SegmentGrid,
    options: &NetworkMatchOptions,
) -> MatchTable {
    use rayon::prelude::*;

    let started = Instant::now();
    info!(
        "[StreetMatcher] Matching {} foreign records onto {} basemap lines (parallel)",
        foreign.len(),
        basemap.len()
    );

    let network = ForeignNetwork::prepare(foreign, grid);
    let rows: Vec<(String, Option<String>)> = requested_segments(grid, options)
        .par_iter()
        .flat_map(|&segment| {
            match_segment(
                segment,
                basemap,
                basemap_segments,
                &network,
                &EllipseOverlap,
                &options.config,
            )
        })
        .collect();

    let table: MatchTable = rows.into_iter().collect();
    log_network_summary(&table, basemap_segments, started);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::generate_segments;
    use crate::{BoundingBox, Geometry, RoundedOverlap};
    use std::cell::RefCell;

    fn line(coords: &[(f64, f64)]) -> MultiLineString<f64> {
        match Geometry::line(coords) {
            Geometry::Lines(lines) => lines,
            Geometry::Point(_) => unreachable!(),
        }
    }

    /// Meters to degrees of longitude at `latitude`.
    fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
        meters / (111_320.0 * latitude.to_radians().cos())
    }

    /// A 45° street in Brno, ~150m long.
    fn street() -> MultiLineString<f64> {
        line(&[(16.6000, 49.1900), (16.6020, 49.1920)])
    }

    /// Similarity that scores nothing but records every rounding it was asked for.
    struct RecordingSimilarity {
        digits: RefCell<Vec<i32>>,
    }

    impl LineSimilarity for RecordingSimilarity {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn score(
            &self,
            _: &MultiLineString<f64>,
            _: &MultiLineString<f64>,
            round_digits: i32,
        ) -> f64 {
            self.digits.borrow_mut().push(round_digits);
            0.0
        }
    }

    #[test]
    fn test_default_schedule() {
        let rounds = tolerance_schedule(&MatchConfig::default());
        let expected = [(20.0, 5), (25.0, 5), (30.0, 5), (35.0, 5), (40.0, 5), (45.0, 4)];
        assert_eq!(rounds.len(), expected.len());
        for (round, (angle, digits)) in rounds.iter().zip(expected) {
            assert_eq!(round.max_angle, angle);
            assert_eq!(round.round_digits, digits);
        }
    }

    #[test]
    fn test_schedule_loosens_monotonically() {
        let configs = [
            MatchConfig::default(),
            MatchConfig { angle_step: 7.0, ..MatchConfig::default() },
            MatchConfig { angle_offset_limit: 0.0, angle_step: 1.0, ..MatchConfig::default() },
        ];
        for config in configs {
            let rounds = tolerance_schedule(&config);
            assert!(!rounds.is_empty());
            for pair in rounds.windows(2) {
                assert!(pair[1].max_angle > pair[0].max_angle);
                assert!(pair[1].round_digits <= pair[0].round_digits);
            }
            let last = rounds.last().unwrap();
            assert!(last.max_angle >= config.angle_ceiling);
            assert_eq!(last.round_digits, config.round_digits - 1);
        }

        let stuck = MatchConfig { angle_step: 0.0, ..MatchConfig::default() };
        assert_eq!(tolerance_schedule(&stuck).len(), 1);
    }

    #[test]
    fn test_schedule_is_capped_for_tiny_steps() {
        let config = MatchConfig {
            angle_step: 2e-15,
            ..MatchConfig::default()
        };
        let rounds = tolerance_schedule(&config);
        assert_eq!(rounds.len(), MAX_TOLERANCE_ROUNDS + 1);
        let last = rounds.last().unwrap();
        assert_eq!(last.max_angle, 45.0);
        assert_eq!(last.round_digits, 4);
    }

    #[test]
    fn test_schedule_with_vanishing_step_terminates() {
        let config = MatchConfig {
            angle_step: 1e-16,
            ..MatchConfig::default()
        };
        assert!(config.validate().is_err());

        let rounds = tolerance_schedule(&config);
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].max_angle, 45.0);
        assert_eq!(rounds[0].round_digits, 4);
    }

    #[test]
    fn test_exact_duplicate_matches_in_first_round() {
        let target = street();
        let found = match_lines_by_bbox_overlap(&target, &[&target]).unwrap();
        assert_eq!(found.index, 0);
        assert_eq!(found.round_index, 0);
        assert_eq!(found.round.max_angle, 20.0);
        assert!((found.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_candidates_no_match() {
        assert_eq!(match_lines_by_bbox_overlap(&street(), &[]), None);
    }

    #[test]
    fn test_ties_keep_first_candidate() {
        let target = street();
        let copy = street();
        let found = match_lines_by_bbox_overlap(&target, &[&copy, &target]).unwrap();
        assert_eq!(found.index, 0);
    }

    #[test]
    fn test_angle_accepted_only_after_escalation() {
        let target = street();
        // ~8° to the X axis: 37° off the 45° target
        let skewed = line(&[(16.6000, 49.1905), (16.6025, 49.190_851_35)]);
        let angle = angle_between(&target, &skewed).unwrap();
        assert!(angle > 35.0 && angle < 40.0);

        let found = match_lines_by_bbox_overlap(&target, &[&skewed]).unwrap();
        assert_eq!(found.round_index, 4);
        assert_eq!(found.round.max_angle, 40.0);
        assert_eq!(found.round.round_digits, 5);
    }

    #[test]
    fn test_tighter_round_wins_over_looser() {
        let target = street();
        let skewed = line(&[(16.6000, 49.1905), (16.6025, 49.190_851_35)]);
        let shifted = line(&[(16.6008, 49.1908), (16.6028, 49.1928)]);

        let found = match_lines_by_bbox_overlap(&target, &[&skewed, &shifted]).unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.round_index, 0);
    }

    #[test]
    fn test_parallel_lines_far_apart_never_match() {
        let target = street();
        let offset = meters_to_degrees(200.0, 49.19);
        let parallel = line(&[(16.6000 + offset, 49.1900), (16.6020 + offset, 49.1920)]);

        assert_eq!(angle_between(&target, &parallel).map(|a| a < 1e-6), Some(true));
        assert_eq!(match_lines_by_bbox_overlap(&target, &[&parallel]), None);
        assert_eq!(
            match_line_with(&target, &[&parallel], &RoundedOverlap, &MatchConfig::default()),
            None
        );
    }

    #[test]
    fn test_fallback_round_is_evaluated() {
        let target = street();
        let candidate = line(&[(16.6001, 49.1901), (16.6021, 49.1921)]);
        let recording = RecordingSimilarity { digits: RefCell::new(Vec::new()) };

        let found = match_line_with(&target, &[&candidate], &recording, &MatchConfig::default());
        assert_eq!(found, None);
        // One scoring pass per distinct rounding: strict digits, then the fallback
        assert_eq!(*recording.digits.borrow(), vec![5, 4]);
    }

    #[test]
    fn test_point_like_candidates_never_qualify() {
        let target = street();
        let dot = line(&[(16.6010, 49.1910), (16.6010, 49.1910)]);
        assert_eq!(match_lines_by_bbox_overlap(&target, &[&dot]), None);
    }

    #[test]
    fn test_match_line_to_set_requires_collinear_overlap() {
        let target = line(&[(0.0, 0.0), (4.0, 4.0)]);
        let crossing = line(&[(0.0, 4.0), (4.0, 0.0)]);
        let nested = line(&[(1.0, 1.0), (2.0, 2.0)]);
        let extended = line(&[(2.0, 2.0), (6.0, 6.0)]);

        let config = MatchConfig::default();
        for overlapping in [&nested, &extended] {
            let candidates = [&crossing, overlapping];
            let found = match_line_to_set(&target, &candidates, &RoundedOverlap, &config).unwrap();
            assert_eq!(found.index, 1);
            assert_eq!(found.round.round_digits, 7);
        }

        let off_axis = line(&[(0.0, 1.0), (4.0, 1.5)]);
        assert_eq!(match_line_to_set(&target, &[&off_axis], &RoundedOverlap, &config), None);
    }

    fn city_grid() -> SegmentGrid {
        generate_segments(BoundingBox::new(16.60, 49.19, 16.62, 49.21), 2).unwrap()
    }

    fn city_basemap() -> Vec<Record> {
        vec![
            // Segment 0
            Record::new("osm-1", Geometry::line(&[(16.6010, 49.1910), (16.6030, 49.1925)])),
            Record::new("osm-2", Geometry::line(&[(16.6050, 49.1950), (16.6058, 49.1975)])),
            // Segment 3
            Record::new("osm-3", Geometry::line(&[(16.6150, 49.2050), (16.6170, 49.2062)])),
            // Starts on the vertical grid line: never examined
            Record::new("osm-4", Geometry::line(&[(16.6100, 49.1930), (16.6120, 49.1940)])),
        ]
    }

    fn city_census() -> Vec<Record> {
        vec![
            Record::new("c-1", Geometry::line(&[(16.60101, 49.19102), (16.60302, 49.19251)])),
            Record::new("c-3", Geometry::line(&[(16.61502, 49.20501), (16.61699, 49.20622)])),
            // Duplicate id: the first record wins
            Record::new("c-1", Geometry::line(&[(16.6150, 49.2050), (16.6170, 49.2062)])),
            Record::new("c-9", Geometry::point(16.6051, 49.1951)),
        ]
    }

    #[test]
    fn test_match_street_network_per_segment() {
        let grid = city_grid();
        let basemap = city_basemap();
        let segments = assign_segments_to_dataset(&basemap, &grid);
        assert_eq!(segments.segment_of_id("osm-4"), None);

        let table = match_street_network_to_osm(
            &basemap,
            &segments,
            &city_census(),
            &grid,
            &NetworkMatchOptions::default(),
        );

        assert_eq!(table.get("osm-1"), Some("c-1"));
        assert_eq!(table.get("osm-3"), Some("c-3"));
        assert!(table.contains("osm-2"));
        assert_eq!(table.get("osm-2"), None);
        assert!(!table.contains("osm-4"));
        assert_eq!(table.len(), 3);
        assert_eq!(table.matched_count(), 2);
    }

    #[test]
    fn test_match_street_network_segment_subset() {
        let grid = city_grid();
        let basemap = city_basemap();
        let segments = assign_segments_to_dataset(&basemap, &grid);
        let options = NetworkMatchOptions {
            segment_ids: Some(vec![3, 99]),
            ..NetworkMatchOptions::default()
        };

        let census = city_census();
        let table = match_street_network_to_osm(&basemap, &segments, &census, &grid, &options);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("osm-3"), Some("c-3"));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let grid = city_grid();
        let basemap = city_basemap();
        let segments = assign_segments_to_dataset(&basemap, &grid);
        let options = NetworkMatchOptions::default();

        let census = city_census();
        let sequential = match_street_network_to_osm(&basemap, &segments, &census, &grid, &options);
        let parallel =
            match_street_network_to_osm_parallel(&basemap, &segments, &census, &grid, &options);
        assert_eq!(sequential, parallel);
    }
}
