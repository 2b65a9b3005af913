//! # Spatial Segmentation
//!
//! Splits a bounding box into a uniform N×N grid of cells ("segments") and
//! assigns every record to one cell by the minimum corner of its bounds.
//! Matching only compares records that share a segment.
//!
//! ## Cell order
//!
//! Cells are row-major: rows from the bottom (`min_y`) upward, and within a
//! row columns from left (`min_x`) to right. Cell `row * n + col` therefore
//! has its lower-left corner at `(min_x + col * w, min_y + row * h)`. Segment
//! indices are used as join keys between datasets, so this order is fixed.
//!
//! ## Boundary policy
//!
//! [`BoundaryPolicy::StrictInterior`] (the default) requires the corner to lie
//! strictly inside a cell, so a record starting exactly on a grid line is left
//! unassigned. [`BoundaryPolicy::HalfOpen`] closes the lower edges instead, so
//! every point inside the grid lands in exactly one cell.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use log::{debug, info};

use crate::{BoundingBox, MatchError, Record, Result};

/// How a point lying on a cell edge is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BoundaryPolicy {
    /// Open interval on all four sides; points on grid lines belong nowhere.
    #[default]
    StrictInterior,
    /// Closed lower edges, open upper edges, except the last row and column
    /// which are also closed on their upper edge.
    HalfOpen,
}

/// Uniform grid of cells covering a root bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentGrid {
    root: BoundingBox,
    per_side: usize,
    cells: Vec<BoundingBox>,
    policy: BoundaryPolicy,
}

impl SegmentGrid {
    /// The box the grid was generated from.
    pub fn root(&self) -> BoundingBox {
        self.root
    }

    /// Number of rows (and of columns).
    pub fn per_side(&self) -> usize {
        self.per_side
    }

    /// Total number of cells (`per_side²`).
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All cells in grid order.
    pub fn cells(&self) -> &[BoundingBox] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&BoundingBox> {
        self.cells.get(index)
    }

    /// Every segment id, in grid order.
    pub fn segment_ids(&self) -> Range<usize> {
        0..self.cells.len()
    }

    pub fn policy(&self) -> BoundaryPolicy {
        self.policy
    }

    /// Same grid with a different boundary policy.
    pub fn with_boundary_policy(mut self, policy: BoundaryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether `(x, y)` belongs to cell `index` under the grid's policy.
    pub fn contains(&self, index: usize, x: f64, y: f64) -> bool {
        let Some(cell) = self.cells.get(index) else {
            return false;
        };
        match self.policy {
            BoundaryPolicy::StrictInterior => {
                x > cell.min_x && x < cell.max_x && y > cell.min_y && y < cell.max_y
            }
            BoundaryPolicy::HalfOpen => {
                let last = self.per_side - 1;
                let (row, col) = (index / self.per_side, index % self.per_side);
                let below_max_x = x < cell.max_x || (col == last && x <= cell.max_x);
                let below_max_y = y < cell.max_y || (row == last && y <= cell.max_y);
                x >= cell.min_x && y >= cell.min_y && below_max_x && below_max_y
            }
        }
    }

    /// Find the cell containing `(x, y)`.
    ///
    /// The candidate cell is computed arithmetically and then verified together
    /// with its neighbours in grid order, so the answer is the same as scanning
    /// every cell and taking the first one that contains the point.
    pub fn locate(&self, x: f64, y: f64) -> Option<usize> {
        let (first, last) = (self.cells.first()?, self.cells.last()?);
        if !(x >= first.min_x && x <= last.max_x && y >= first.min_y && y <= last.max_y) {
            return None;
        }

        let n = self.per_side as i64;
        let col = ((x - self.root.min_x) / (self.root.width() / n as f64)).floor() as i64;
        let row = ((y - self.root.min_y) / (self.root.height() / n as f64)).floor() as i64;

        for r in (row - 1)..=(row + 1) {
            if r < 0 || r >= n {
                continue;
            }
            for c in (col - 1)..=(col + 1) {
                if c < 0 || c >= n {
                    continue;
                }
                let index = (r * n + c) as usize;
                if self.contains(index, x, y) {
                    return Some(index);
                }
            }
        }
        None
    }
}

/// Split `bbox` into `n` columns and `n` rows of equal size.
///
/// Returns `n²` cells in row-major order (bottom row first, left to right).
/// Fails if the box is not strictly increasing on both axes or `n == 0`.
///
/// # Example
/// ```
/// use street_matcher::{generate_segments, BoundingBox};
///
/// let grid = generate_segments(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 2).unwrap();
/// assert_eq!(grid.cells()[1], BoundingBox::new(5.0, 0.0, 10.0, 5.0));
/// assert_eq!(grid.locate(1.0, 1.0), Some(0));
/// assert_eq!(grid.locate(5.0, 5.0), None); // on a grid line
/// ```
pub fn generate_segments(bbox: BoundingBox, n: usize) -> Result<SegmentGrid> {
    let root = bbox.validated()?;
    if n == 0 {
        return Err(MatchError::InvalidSegmentCount(n));
    }

    let segment_width = root.width() / n as f64;
    let segment_height = root.height() / n as f64;
    let xs: Vec<f64> = (0..=n).map(|k| root.min_x + segment_width * k as f64).collect();
    let ys: Vec<f64> = (0..=n).map(|k| root.min_y + segment_height * k as f64).collect();

    let mut cells = Vec::with_capacity(n * n);
    for y_limits in ys.windows(2) {
        for x_limits in xs.windows(2) {
            cells.push(BoundingBox::new(x_limits[0], y_limits[0], x_limits[1], y_limits[1]));
        }
    }

    debug!(
        "[StreetMatcher] Generated {} segments ({}x{}) of {:.6} x {:.6}",
        cells.len(),
        n,
        n,
        segment_width,
        segment_height
    );

    Ok(SegmentGrid {
        root,
        per_side: n,
        cells,
        policy: BoundaryPolicy::default(),
    })
}

/// Whether the minimum corner of `record_bounds` lies strictly inside `cell`.
///
/// Only the start corner is tested, so a long street is placed in the cell
/// where its bounds begin even if it runs on through other cells.
pub fn is_in_segment(record_bounds: &BoundingBox, cell: &BoundingBox) -> bool {
    record_bounds.min_x > cell.min_x
        && record_bounds.min_x < cell.max_x
        && record_bounds.min_y > cell.min_y
        && record_bounds.min_y < cell.max_y
}

/// Segment membership of one dataset, indexed by input position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentAssignment {
    segment_of: Vec<Option<usize>>,
    ids: Vec<String>,
    by_id: HashMap<String, usize>,
    members: BTreeMap<usize, Vec<usize>>,
}

impl SegmentAssignment {
    /// Number of records that were segmented (assigned or not).
    pub fn len(&self) -> usize {
        self.segment_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segment_of.is_empty()
    }

    /// Segment of the record at input position `position`.
    pub fn segment_of(&self, position: usize) -> Option<usize> {
        self.segment_of.get(position).copied().flatten()
    }

    /// Segment of the record with `id` (the first record, if ids repeat).
    pub fn segment_of_id(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).and_then(|&pos| self.segment_of(pos))
    }

    /// Input positions of the records in `segment`, in input order.
    pub fn members(&self, segment: usize) -> &[usize] {
        self.members.get(&segment).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Segments holding at least one record, ascending.
    pub fn occupied_segments(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.keys().copied()
    }

    pub fn assigned_count(&self) -> usize {
        self.segment_of.iter().filter(|s| s.is_some()).count()
    }

    /// Input positions of records that fell in no segment.
    pub fn unassigned(&self) -> Vec<usize> {
        self.segment_of
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Ids of records that fell in no segment.
    pub fn unassigned_ids(&self) -> Vec<&str> {
        self.unassigned().into_iter().map(|pos| self.ids[pos].as_str()).collect()
    }
}

/// Assign every record to the segment containing the minimum corner of its
/// bounds.
///
/// Records outside the grid, on a cell edge (under the strict policy) or with
/// empty geometry are kept in the result as unassigned rather than dropped.
pub fn assign_segments_to_dataset<'a, I>(records: I, grid: &SegmentGrid) -> SegmentAssignment
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut assignment = SegmentAssignment::default();

    for (position, record) in records.into_iter().enumerate() {
        let segment = record
            .geometry
            .bounds()
            .and_then(|bounds| grid.locate(bounds.min_x, bounds.min_y));

        assignment.segment_of.push(segment);
        assignment.ids.push(record.id.clone());
        assignment.by_id.entry(record.id.clone()).or_insert(position);
        if let Some(segment) = segment {
            assignment.members.entry(segment).or_default().push(position);
        }
    }

    let unassigned = assignment.len() - assignment.assigned_count();
    info!(
        "[StreetMatcher] Segmented {} records into {} occupied segments, {} unassigned",
        assignment.len(),
        assignment.members.len(),
        unassigned
    );
    if unassigned > 0 {
        debug!(
            "[StreetMatcher] Unassigned records: {:?}",
            assignment.unassigned_ids()
        );
    }

    assignment
}
