//! Error types for the street matcher.
//!
//! The matching functions themselves never fail: a missing match is `None`
//! and a degenerate geometry scores zero. Errors only come from building
//! grids, validating configuration, and reading or writing datasets.

use thiserror::Error;

/// Errors surfaced to callers of the library.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error(
        "invalid bounding box ({min_x}, {min_y}, {max_x}, {max_y}): \
         min must be below max on both axes"
    )]
    InvalidBoundingBox {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    },

    #[error("segment count must be at least 1, got {0}")]
    InvalidSegmentCount(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("model has no match column named '{0}'")]
    UnknownColumn(String),

    #[error("feature {feature} has no usable id in property '{column}'")]
    MissingId { feature: usize, column: String },

    #[error("feature {feature} has unsupported geometry type '{kind}'")]
    UnsupportedGeometry { feature: usize, kind: String },

    #[error("feature {feature} has invalid geometry: {reason}")]
    InvalidGeometry { feature: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde_json")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, MatchError>;
