//! # fia-exposure
//!
//! Risk-level exposure bookkeeping for flood-impact analysis.
//!
//! Given a risk type (e.g. "NOAA Sea Level Rise") and workspaces of depth and
//! water surface datasets labelled by level, this crate:
//!
//! 1. loads the ordered levels of the risk type from the risk table,
//! 2. matches dataset names to levels to build processing lists,
//! 3. accumulates per-level depth statistics of each feature footprint into a
//!    wide table keyed by feature id,
//! 4. finds the least severe level at which each feature is exposed, and
//! 5. estimates loss potential from a depth-damage table.
//!
//! Raster algebra, zonal statistics, buffering and rasterization are reached
//! through the capability traits in [`engine`], so the bookkeeping can run
//! against any GIS engine, including in-memory fakes.
//!
//! ## Example
//!
//! ```no_run
//! use fia_exposure::{ExposureParams, ExposurePipeline, GisEngine, RunConfig};
//!
//! fn attribute<E: GisEngine>(engine: &mut E, params: &ExposureParams) -> fia_exposure::Result<()> {
//!     let report = ExposurePipeline::new(engine, RunConfig::default()).run(params)?;
//!     report.table.write_csv_path(&params.output_table)?;
//!     for warning in &report.warnings {
//!         println!("warning: {}", warning);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
mod error;
pub mod exposure;
pub mod loss;
pub mod name_sort;
pub mod pipeline;
pub mod processing;
pub mod risk_table;
pub mod summary;
pub mod table;

pub use config::{parse_buffer_distance, ExposureParams, FieldSelection, RunConfig};
pub use engine::{
    DatasetInfo, DatasetKind, EngineError, EngineResult, GeometryEngine, GisEngine, LinearUnit,
    RasterAlgebra, RasterStore, SpatialReference, ZonalStatsEngine, ZoneStats,
};
pub use error::{ErrorKind, ExposureError, Warning};
pub use exposure::{AccumulatorState, ExposureAccumulator, FinalizedExposure, LevelOutcome};
pub use loss::{find_closest, LossTable, LossTableRow};
pub use name_sort::{numeric_sort_descending, NameOrdering};
pub use pipeline::{ExposurePipeline, ExposureReport};
pub use processing::{ensure_matching_levels, ProcessingEntry, ProcessingList};
pub use risk_table::{RiskLevelSpec, RiskTable, SourceOrder};
pub use summary::{LevelSummary, LevelSummaryRow};
pub use table::{ExposureTable, FieldType};

/// Result type for exposure operations.
pub type Result<T> = std::result::Result<T, ExposureError>;
