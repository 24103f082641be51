//! Error types for the raster crate.

use thiserror::Error;

/// Errors that can occur when working with raster grids.
#[derive(Debug, Error)]
pub enum RasterError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding or encoding error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Invalid GeoTIFF - missing or malformed georeferencing tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// Unsupported data type in the TIFF file.
    #[error("Unsupported TIFF data type: {0}")]
    UnsupportedDataType(String),

    /// Cell data does not match the declared dimensions.
    #[error("Grid data has {actual} cells, expected {width}x{height}")]
    InvalidDimensions {
        /// Declared width in cells.
        width: u32,
        /// Declared height in cells.
        height: u32,
        /// Number of values supplied.
        actual: usize,
    },

    /// Cell sizes must be positive and finite.
    #[error("Invalid cell size: {0}")]
    InvalidCellSize(f64),

    /// No raster with the given name is indexed.
    #[error("Raster not found: {0}")]
    NotFound(String),

    /// Invalid raster filename - cannot derive a dataset name.
    #[error("Invalid raster filename: {0}")]
    InvalidFilename(String),

    /// Cache lock was poisoned (a thread panicked while holding the lock).
    #[error("Raster cache lock was poisoned")]
    CacheLockPoisoned,
}
