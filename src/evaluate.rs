//! Accuracy of a match column against hand-annotated samples.

use std::fmt;

use crate::geo_utils::round_to_digits;
use crate::model::MatchTable;

/// Hand annotation for one basemap line: the foreign ids a human accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub basemap_id: String,
    pub accepted: Vec<String>,
}

impl Annotation {
    pub fn new<I, S>(basemap_id: impl Into<String>, accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            basemap_id: basemap_id.into(),
            accepted: accepted.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a comma separated id list such as `"1042, 1043"`.
    pub fn from_list(basemap_id: impl Into<String>, accepted: &str) -> Self {
        Self::new(
            basemap_id,
            accepted.split(',').map(str::trim).filter(|id| !id.is_empty()),
        )
    }
}

/// Correct matches out of the annotated total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Accuracy {
    pub correct: usize,
    pub total: usize,
}

impl Accuracy {
    /// Share of correct matches in percent, rounded to two decimals. Zero
    /// when nothing was annotated.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        round_to_digits(self.correct as f64 / self.total as f64 * 100.0, 2)
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} matches, [{}%]", self.correct, self.percentage())
    }
}

/// Count annotated basemap lines whose matched foreign id is accepted.
///
/// Lines missing from the table, or examined without a match, count as
/// incorrect.
pub fn evaluate_matches(table: &MatchTable, annotations: &[Annotation]) -> Accuracy {
    let correct = annotations
        .iter()
        .filter(|a| {
            table
                .get(&a.basemap_id)
                .is_some_and(|matched| a.accepted.iter().any(|id| id == matched))
        })
        .count();

    Accuracy {
        correct,
        total: annotations.len(),
    }
}
