//! Capabilities required from a GIS engine.
//!
//! Dataset paths are opaque strings. Outputs are written to paths chosen by
//! the caller, usually from [`RasterStore::scratch_path`].

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors reported by an engine implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The dataset does not exist.
    #[error("Dataset not found: {0}")]
    NotFound(String),

    /// The engine cannot perform this operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The operation failed.
    #[error("{0}")]
    Failed(String),
}

/// Result type for engine calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Kind of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DatasetKind {
    Raster,
    Polygon,
    Point,
    Polyline,
    Multipatch,
}

impl DatasetKind {
    /// Whether this is a vector feature class.
    pub fn is_feature_class(&self) -> bool {
        !matches!(self, DatasetKind::Raster)
    }
}

/// Linear unit of a coordinate system axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LinearUnit {
    Meter,
    Foot,
    FootUs,
    Other(String),
}

impl LinearUnit {
    /// Supported units collapse to meter or foot; anything else is unsupported.
    pub fn canonical(&self) -> Option<LinearUnit> {
        match self {
            LinearUnit::Meter => Some(LinearUnit::Meter),
            LinearUnit::Foot | LinearUnit::FootUs => Some(LinearUnit::Foot),
            LinearUnit::Other(_) => None,
        }
    }

    /// Length of one meter in this unit.
    pub fn one_meter(&self) -> f64 {
        match self {
            LinearUnit::Foot | LinearUnit::FootUs => 3.28084,
            _ => 1.0,
        }
    }

    /// Length of one foot in this unit.
    pub fn one_foot(&self) -> f64 {
        match self {
            LinearUnit::Meter => 0.3048,
            _ => 1.0,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LinearUnit::Meter => "Meter",
            LinearUnit::Foot => "Foot",
            LinearUnit::FootUs => "Foot_US",
            LinearUnit::Other(name) => name,
        }
    }
}

/// Coordinate system of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpatialReference {
    pub name: String,
    pub linear_unit: LinearUnit,
    /// Unit of the vertical coordinate system, if there is one.
    pub z_unit: Option<LinearUnit>,
    pub projected: bool,
}

impl SpatialReference {
    /// Same name and linear unit, and the same vertical unit when both have one.
    pub fn matches(&self, other: &SpatialReference) -> bool {
        let z_matches = match (&self.z_unit, &other.z_unit) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        self.name == other.name && self.linear_unit == other.linear_unit && z_matches
    }
}

/// Description of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub kind: DatasetKind,
    pub spatial_reference: Option<SpatialReference>,
}

/// Statistics of one zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneStats {
    /// Area of the cells with a value.
    pub area: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub mean: f64,
    pub std: f64,
    pub sum: f64,
    pub count: u64,
}

/// Storage and lookup of datasets.
pub trait RasterStore {
    /// Raster names in a workspace.
    fn list_rasters(&self, workspace: &str) -> EngineResult<Vec<String>>;

    /// Multipatch feature class names in a workspace.
    fn list_multipatches(&self, workspace: &str) -> EngineResult<Vec<String>>;

    fn exists(&self, path: &str) -> bool;

    fn describe(&self, path: &str) -> EngineResult<DatasetInfo>;

    /// Smallest cell value of a raster, `None` when it has no data.
    fn raster_minimum(&self, path: &str) -> EngineResult<Option<f64>>;

    /// Area of one cell of a raster.
    fn cell_area(&self, path: &str) -> EngineResult<f64>;

    fn delete(&mut self, path: &str) -> EngineResult<()>;

    /// Path for an intermediate dataset with the given name.
    fn scratch_path(&self, name: &str) -> String;
}

/// Per-zone statistics of a raster.
pub trait ZonalStatsEngine {
    /// Statistics of `values` for each feature of the zone raster, keyed by
    /// feature id. Zones without value cells may be absent.
    fn zonal_statistics(&self, zones: &str, values: &str) -> EngineResult<BTreeMap<String, ZoneStats>>;
}

/// Vector geometry operations.
pub trait GeometryEngine {
    /// Copy features unchanged.
    fn copy_features(&mut self, input: &str, output: &str) -> EngineResult<()>;

    /// Ground footprint polygons of multipatch features.
    fn footprints(&mut self, multipatch: &str, output: &str) -> EngineResult<()>;

    /// Buffer features by `distance` map units.
    fn buffer(&mut self, input: &str, distance: f64, output: &str) -> EngineResult<()>;

    /// Footprint area per feature id, in feature order.
    fn feature_areas(&self, features: &str, id_field: &str) -> EngineResult<Vec<(String, f64)>>;

    /// Zone raster of feature ids at the given cell size.
    fn rasterize_footprints(
        &mut self,
        features: &str,
        id_field: &str,
        cell_size: f64,
        output: &str,
    ) -> EngineResult<()>;

    /// Surface raster of a multipatch water surface.
    fn multipatch_to_raster(&mut self, multipatch: &str, cell_size: f64, output: &str) -> EngineResult<()>;
}

/// Cell-by-cell raster algebra.
pub trait RasterAlgebra {
    /// `a - b`.
    fn minus(&mut self, a: &str, b: &str, output: &str) -> EngineResult<()>;

    /// Copy with cells `<= threshold` set to no data.
    fn set_null_at_or_below(&mut self, input: &str, threshold: f64, output: &str) -> EngineResult<()>;
}

/// Everything an exposure run needs from the engine.
pub trait GisEngine: RasterStore + ZonalStatsEngine + GeometryEngine + RasterAlgebra {}

impl<T: RasterStore + ZonalStatsEngine + GeometryEngine + RasterAlgebra> GisEngine for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(LinearUnit::FootUs.canonical(), Some(LinearUnit::Foot));
        assert_eq!(LinearUnit::Other("Yard".into()).canonical(), None);
        assert_eq!(LinearUnit::Meter.one_foot(), 0.3048);
        assert_eq!(LinearUnit::Foot.one_meter(), 3.28084);
    }

    #[test]
    fn test_spatial_reference_match() {
        let a = SpatialReference {
            name: "EPSG:2248".into(),
            linear_unit: LinearUnit::FootUs,
            z_unit: Some(LinearUnit::FootUs),
            projected: true,
        };
        let mut b = a.clone();
        assert!(a.matches(&b));
        b.z_unit = None;
        assert!(a.matches(&b));
        b.z_unit = Some(LinearUnit::Meter);
        assert!(!a.matches(&b));
        b.z_unit = a.z_unit.clone();
        b.linear_unit = LinearUnit::Foot;
        assert!(!a.matches(&b));
    }
}
