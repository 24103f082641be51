//! Error and warning types for exposure analysis.

use crate::engine::EngineError;
use serde::Serialize;
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Broad classes of failure, used to pick how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// A required engine capability or configuration is missing.
    Configuration,
    /// The inputs are invalid for this run.
    Input,
    /// Anything else.
    Unexpected,
}

/// Errors that stop an exposure run.
#[derive(Debug, Error)]
pub enum ExposureError {
    /// No row of the risk table matches the requested risk type.
    #[error("No risk levels for risk type '{risk_type}'")]
    NoRiskTable { risk_type: String },

    /// The risk table row is malformed.
    #[error("Invalid risk table: {0}")]
    InvalidRiskTable(String),

    /// The loss-potential table is malformed.
    #[error("Invalid loss table: {0}")]
    InvalidLossTable(String),

    /// The loss-potential table lacks required columns.
    #[error("Loss table is missing fields: {}", .0.join(", "))]
    MissingLossFields(Vec<String>),

    /// Dataset names that match no risk level label.
    #[error("{dataset} names without a matching risk level: {}", .names.join(", "))]
    UnmatchedNames {
        /// Which input the names came from, e.g. "depth".
        dataset: String,
        names: Vec<String>,
    },

    /// Surface and depth processing lists carry different levels.
    #[error("Surface levels [{}] do not match depth levels [{}]", .surface.join(", "), .depth.join(", "))]
    LevelMismatch {
        surface: Vec<String>,
        depth: Vec<String>,
    },

    /// A depth raster holds negative values.
    #[error("Depth raster {raster} has negative values (minimum {minimum})")]
    NegativeDepth { raster: String, minimum: f64 },

    /// Neither depth rasters nor surface rasters plus a DEM are available.
    #[error("No depth data found")]
    NoDepthData,

    /// The input features are missing or have no footprints.
    #[error("No input features found: {0}")]
    NoFeatures(String),

    /// A dataset does not use a projected coordinate system.
    #[error("{dataset} is not in a projected coordinate system")]
    NotProjected { dataset: String },

    /// Two inputs use different coordinate systems or units.
    #[error("{first} and {second} use different spatial references")]
    MixedSpatialReference { first: String, second: String },

    /// Linear unit other than meter or foot.
    #[error("Unsupported linear unit: {0}")]
    UnsupportedUnit(String),

    /// A tool parameter could not be interpreted.
    #[error("Invalid parameter {name} = '{value}': {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// The engine lacks a capability required by this run.
    #[error("Missing engine capability for {operation}: {detail}")]
    MissingCapability {
        operation: &'static str,
        detail: String,
    },

    /// An engine call failed.
    #[error("{operation} failed at {file}:{line}: {source}")]
    Engine {
        operation: &'static str,
        file: &'static str,
        line: u32,
        #[source]
        source: EngineError,
    },

    /// The accumulator was driven out of order.
    #[error("Invalid accumulator state: {0}")]
    InvalidState(String),

    /// I/O error reading a table.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ExposureError {
    /// Wrap an engine failure with the operation name and the caller location.
    #[track_caller]
    pub fn engine(operation: &'static str, source: EngineError) -> Self {
        match source {
            EngineError::Unsupported(detail) => ExposureError::MissingCapability { operation, detail },
            source => {
                let location = Location::caller();
                ExposureError::Engine {
                    operation,
                    file: location.file(),
                    line: location.line(),
                    source,
                }
            }
        }
    }

    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExposureError::MissingCapability { .. } => ErrorKind::Configuration,
            ExposureError::Engine { .. } | ExposureError::InvalidState(_) => ErrorKind::Unexpected,
            _ => ErrorKind::Input,
        }
    }

    /// Message shown to the person running the tool.
    pub fn user_message(&self) -> String {
        match self {
            ExposureError::NoRiskTable { risk_type } => format!(
                "No risk level table found for '{}'. Add a row for it to the riskLevels table.",
                risk_type
            ),
            ExposureError::UnmatchedNames { dataset, names } => format!(
                "Some {} rasters could not be matched to a risk level: {}. \
                 Raster names must contain a level label from the riskLevels table.",
                dataset,
                names.join(", ")
            ),
            ExposureError::LevelMismatch { .. } => {
                "Water surface and depth data do not cover the same risk levels. \
                 Make sure both inputs have a raster for every level."
                    .to_string()
            }
            ExposureError::NegativeDepth { raster, .. } => format!(
                "Negative values found in depth raster {}. Depth rasters must not contain negative values.",
                raster
            ),
            ExposureError::NoDepthData => {
                "No depth rasters found. Provide depth rasters, or water surface rasters and a DEM."
                    .to_string()
            }
            ExposureError::NotProjected { dataset } => format!(
                "{} must use a projected coordinate system.",
                dataset
            ),
            ExposureError::MixedSpatialReference { first, second } => format!(
                "{} and {} must use the same coordinate system and units.",
                first, second
            ),
            ExposureError::UnsupportedUnit(unit) => format!(
                "Only meter and foot based coordinate systems are supported (found {}).",
                unit
            ),
            ExposureError::MissingCapability { operation, .. } => format!(
                "The GIS engine does not support {}. Check the engine installation and licenses.",
                operation
            ),
            ExposureError::Engine { operation, .. } => format!(
                "Error in {}. Check the log for details.",
                operation
            ),
            other => other.to_string(),
        }
    }
}

/// Conditions that reduce the output of a run without stopping it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum Warning {
    /// The loss table could not be used; loss fields are omitted.
    LossTableUnavailable { reason: String },
    /// No usable water surface data; WSEL fields are omitted.
    NoSurfaceData { reason: String },
    /// Surface names without a matching level.
    UnmatchedSurfaceNames { names: Vec<String> },
    /// Names that lost their level label to an earlier name.
    DuplicateLevelNames { dataset: String, names: Vec<String> },
    /// Risk levels were not authored in monotonic order and were sorted.
    UnorderedRiskLevels { risk_type: String },
    /// Depth was derived from surface and DEM.
    RelativeDepth,
    /// A dataset has no vertical coordinate system.
    NoVerticalUnits { dataset: String },
    /// A feature class was given where a raster is expected.
    FeatureClassInput { dataset: String },
    /// A level had no footprint cell with water.
    DryLevel { level: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::LossTableUnavailable { reason } => {
                write!(f, "Loss table not used, loss potential will not be calculated: {}", reason)
            }
            Warning::NoSurfaceData { reason } => {
                write!(f, "No water surface data, water surface elevation will not be calculated: {}", reason)
            }
            Warning::UnmatchedSurfaceNames { names } => {
                write!(f, "Water surface rasters without a matching risk level: {}", names.join(", "))
            }
            Warning::DuplicateLevelNames { dataset, names } => {
                write!(f, "Ignored {} datasets whose risk level was already taken: {}", dataset, names.join(", "))
            }
            Warning::UnorderedRiskLevels { risk_type } => {
                write!(f, "Risk levels for '{}' are not in order and were sorted", risk_type)
            }
            Warning::RelativeDepth => write!(
                f,
                "Depth derived from water surface and DEM; results are relative to the DEM"
            ),
            Warning::NoVerticalUnits { dataset } => {
                write!(f, "{} has no vertical coordinate system", dataset)
            }
            Warning::FeatureClassInput { dataset } => {
                write!(f, "{} is a feature class; convert flood polygons to rasters first", dataset)
            }
            Warning::DryLevel { level } => write!(f, "No feature is exposed at level {}", level),
        }
    }
}
