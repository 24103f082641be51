//! YAML job files: exposure parameters plus run configuration.
//!
//! ```yaml
//! params:
//!   risk_type: NOAA Sea Level Rise
//!   risk_table: tables/risk_levels.csv
//!   depth_workspace: data/depth
//!   features: data/buildings.tif
//!   output_table: out/exposure.csv
//! run:
//!   delete_intermediate: false
//!   fields:
//!     std: false
//! report: out/report.json
//! ```

use crate::Result;
use fia_exposure::{ExposureParams, RunConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One exposure job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub params: ExposureParams,
    #[serde(default)]
    pub run: RunConfig,
    /// Path of the JSON run report, if one is wanted.
    #[serde(default)]
    pub report: Option<String>,
}

impl Job {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}
