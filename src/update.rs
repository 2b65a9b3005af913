//! # Incremental Updates
//!
//! Merges a newer snapshot of a foreign dataset into an already matched
//! model without rerunning the full match.
//!
//! Only records whose id does not yet appear in the column are considered.
//! Street records are matched in the foreign → basemap direction against the
//! basemap lines of their own segment, using the grid stored in the model.
//! A hit overwrites the row of the matched basemap line; rows are never
//! removed.

use std::time::Instant;

use geo::MultiLineString;
use log::{debug, info, warn};

use crate::model::{MatchTable, StreetModel};
use crate::points::match_points_to_osm;
use crate::segmentation::assign_segments_to_dataset;
use crate::similarity::EllipseOverlap;
use crate::street::match_line_with;
use crate::{dedup_by_id, MatchConfig, MatchError, Record, Result};

/// Result of an incremental update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// The column after the update
    pub table: MatchTable,
    /// Records whose id was not yet in the column
    pub new_records: usize,
    /// New records that produced a row
    pub matched: usize,
    /// New records outside every segment (streets) or without a nearest line (points)
    pub unassigned: usize,
}

fn existing_column<'m>(model: &'m StreetModel, column: &str) -> Result<&'m MatchTable> {
    model
        .column(column)
        .ok_or_else(|| MatchError::UnknownColumn(column.to_string()))
}

/// Records of `dataset` (deduplicated by id) whose id is not yet a value of `table`.
fn new_records<'a>(table: &MatchTable, dataset: &'a [Record]) -> Vec<&'a Record> {
    let known = table.foreign_ids();
    dedup_by_id(dataset)
        .into_iter()
        .filter(|r| !known.contains(r.id.as_str()))
        .collect()
}

/// Add the lines of a newer street snapshot to `column`.
///
/// When several new records match the same basemap line, the last one in
/// dataset order is kept.
pub fn update_street_network(
    model: &StreetModel,
    column: &str,
    new_dataset: &[Record],
    config: &MatchConfig,
) -> Result<UpdateOutcome> {
    let started = Instant::now();
    let mut table = existing_column(model, column)?.clone();

    let fresh: Vec<&Record> = new_records(&table, new_dataset)
        .into_iter()
        .filter(|r| r.geometry.as_lines().is_some())
        .collect();
    let segments = assign_segments_to_dataset(fresh.iter().copied(), model.grid());

    let basemap = model.basemap();
    let mut matched = 0;
    for segment in segments.occupied_segments() {
        let (basemap_ids, basemap_lines): (Vec<&str>, Vec<&MultiLineString<f64>>) = model
            .segments()
            .members(segment)
            .iter()
            .filter_map(|&pos| {
                let record = basemap.get(pos)?;
                record.geometry.as_lines().map(|lines| (record.id.as_str(), lines))
            })
            .unzip();

        for &pos in segments.members(segment) {
            let record = fresh[pos];
            let Some(lines) = record.geometry.as_lines() else { continue };
            if let Some(hit) = match_line_with(lines, &basemap_lines, &EllipseOverlap, config) {
                table.insert(basemap_ids[hit.index], Some(record.id.clone()));
                matched += 1;
            }
        }
        debug!(
            "[StreetMatcher] Update segment {}: {} new lines vs {} basemap lines",
            segment,
            segments.members(segment).len(),
            basemap_lines.len()
        );
    }

    let unassigned = segments.len() - segments.assigned_count();
    if unassigned > 0 {
        warn!("[StreetMatcher] {} new lines have no segment and were not matched", unassigned);
    }
    info!(
        "[StreetMatcher] Updated column '{}': {} new lines, {} matched in {:?}",
        column,
        fresh.len(),
        matched,
        started.elapsed()
    );

    Ok(UpdateOutcome {
        table,
        new_records: fresh.len(),
        matched,
        unassigned,
    })
}

/// Add the points of a newer snapshot to `column`.
///
/// New points are matched with the same rules as
/// [`match_points_to_osm`]; their matches overwrite existing rows.
pub fn update_point_system(
    model: &StreetModel,
    column: &str,
    new_points: &[Record],
) -> Result<UpdateOutcome> {
    let mut table = existing_column(model, column)?.clone();

    let fresh: Vec<Record> = new_records(&table, new_points)
        .into_iter()
        .filter(|r| r.geometry.as_point().is_some())
        .cloned()
        .collect();

    let additions = match_points_to_osm(model.basemap(), &fresh);
    let matched = additions.matched_count();
    // Points that chose no line or lost their line to a closer new point
    let unassigned = fresh.len() - matched;
    table.merge(additions);

    info!(
        "[StreetMatcher] Updated column '{}': {} new points, {} matched",
        column,
        fresh.len(),
        matched
    );

    Ok(UpdateOutcome {
        table,
        new_records: fresh.len(),
        matched,
        unassigned,
    })
}
