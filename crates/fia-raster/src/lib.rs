//! # fia-raster
//!
//! Single-band GeoTIFF grids and the raster operations used by flood-impact
//! analysis.
//!
//! ## Overview
//!
//! - [`Grid`]: a north-up `f32` raster with no-data handling, read from and
//!   written to GeoTIFF (ModelPixelScale, ModelTiepoint, GeoKeyDirectory and
//!   GDAL_NODATA tags).
//! - [`RasterCatalog`]: a workspace directory of `.tif` files indexed by
//!   file stem and loaded lazily into an LRU cache.
//! - [`zonal`]: per-zone count, sum, mean, standard deviation, min, max,
//!   range and area of a value grid over a grid of integer zone ids.
//! - [`algebra`]: `minus` and `set_null_at_or_below`.
//! - [`footprint`]: circular buffering and resampling of zone grids.
//!
//! ## Example
//!
//! ```no_run
//! use fia_raster::{zonal, RasterCatalog};
//!
//! let catalog = RasterCatalog::open("depth")?;
//! let zones = fia_raster::Grid::from_file("buildings.tif")?;
//! let depth = catalog.get("depth_1")?;
//!
//! for (id, stats) in zonal::zonal_statistics(&zones, &depth) {
//!     println!("feature {}: mean depth {:.2}", id, stats.mean);
//! }
//! # Ok::<(), fia_raster::RasterError>(())
//! ```

pub mod algebra;
mod catalog;
mod error;
pub mod footprint;
mod grid;
pub mod zonal;

pub use catalog::{dataset_name, RasterCatalog};
pub use error::RasterError;
pub use grid::{GeoUnit, Grid, GridSpatialRef, GridTransform};
pub use zonal::ZonalResult;

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
