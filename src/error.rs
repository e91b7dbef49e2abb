//! Error types for roadnet operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while ingesting sources or querying the built model.
///
/// Per-way and per-point failures (`DegenerateGeometry`, `OutOfBounds`,
/// `NoData`) are local: ingestion records them as warnings and batch
/// queries report them per element. Only an unreadable input fails the
/// whole call that named it.
#[derive(Debug, Error)]
pub enum Error {
    /// File kind could not be determined from the path.
    #[error("unsupported source format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// The parser collaborator reported geometry or tags it cannot use.
    #[error("malformed source '{name}': {detail}")]
    MalformedSource { name: String, detail: String },

    /// Query point lies outside every mosaic tile extent.
    #[error("coordinate ({x}, {y}) is outside of extents")]
    OutOfBounds { x: f64, y: f64 },

    /// Query point is covered by a tile but no valid sample is reachable.
    #[error("no elevation data at coordinate ({x}, {y})")]
    NoData { x: f64, y: f64 },

    /// Way with fewer than 2 distinct points.
    #[error("degenerate way {way_id}: fewer than 2 distinct points")]
    DegenerateGeometry { way_id: i64 },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// PBF parse error from the osmpbf collaborator.
    #[error("PBF parse error: {0}")]
    Pbf(#[from] osmpbf::Error),

    /// TIFF decode error from the tiff collaborator.
    #[error("TIFF decode error: {0}")]
    TiffDecode(#[from] tiff::TiffError),
}

/// Convenience result type for roadnet operations.
pub type Result<T> = std::result::Result<T, Error>;
