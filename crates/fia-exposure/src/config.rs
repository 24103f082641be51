//! Run configuration and tool parameters.

use crate::name_sort::NameOrdering;
use crate::{ExposureError, Result};
use serde::{Deserialize, Serialize};

/// Which output fields to keep. Everything is on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSelection {
    pub min: bool,
    pub max: bool,
    pub range: bool,
    pub mean: bool,
    pub std: bool,
    pub area: bool,
    /// Footprint area of each feature (`Shape_Area`).
    pub shape_area: bool,
    pub exposure: bool,
    pub volume: bool,
    /// Mean water surface elevation per level.
    pub wsel: bool,
    pub ground_min: bool,
    pub ground_max: bool,
    pub ground_range: bool,
    pub ground_mean: bool,
    pub ground_std: bool,
    pub loss: bool,
}

impl Default for FieldSelection {
    fn default() -> Self {
        Self {
            min: true,
            max: true,
            range: true,
            mean: true,
            std: true,
            area: true,
            shape_area: true,
            exposure: true,
            volume: true,
            wsel: true,
            ground_min: true,
            ground_max: true,
            ground_range: true,
            ground_mean: true,
            ground_std: true,
            loss: true,
        }
    }
}

impl FieldSelection {
    /// Whether any ground (DEM) statistic is requested.
    pub fn any_ground(&self) -> bool {
        self.ground_min || self.ground_max || self.ground_range || self.ground_mean || self.ground_std
    }
}

/// Settings that shape how a run executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Keep intermediate datasets in memory when the engine supports it.
    pub use_in_memory: bool,
    /// Delete intermediate datasets at the end of a run.
    pub delete_intermediate: bool,
    pub name_ordering: NameOrdering,
    /// Directory for intermediate datasets when not kept in memory.
    pub scratch_workspace: Option<String>,
    pub fields: FieldSelection,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            use_in_memory: true,
            delete_intermediate: true,
            name_ordering: NameOrdering::default(),
            scratch_workspace: None,
            fields: FieldSelection::default(),
        }
    }
}

/// Parameters of one exposure run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureParams {
    pub risk_type: String,
    /// Treat the levels as percent (annual chance) levels. Inferred from the
    /// level values when unset.
    #[serde(default)]
    pub percent_flood: Option<bool>,
    /// CSV form of the `riskLevels` sheet.
    pub risk_table: String,
    /// Workspace of water surface rasters or multipatches.
    #[serde(default)]
    pub surface_workspace: Option<String>,
    /// Workspace of depth rasters.
    #[serde(default)]
    pub depth_workspace: Option<String>,
    pub features: String,
    #[serde(default = "default_id_field")]
    pub feature_id_field: String,
    #[serde(default)]
    pub buffer_distance: f64,
    /// Cell size used to rasterize footprints.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default)]
    pub dem: Option<String>,
    #[serde(default)]
    pub loss_table: Option<String>,
    pub output_table: String,
}

fn default_id_field() -> String {
    "OBJECTID".to_string()
}

fn default_tolerance() -> f64 {
    1.0
}

/// Parse a buffer distance, accepting `,` as decimal separator. Empty is `0`.
pub fn parse_buffer_distance(text: &str) -> Result<f64> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0.0);
    }
    let normalized = text.replace(',', ".");
    normalized
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite())
        .ok_or_else(|| ExposureError::InvalidParameter {
            name: "buffer_distance",
            value: text.to_string(),
            reason: "not a number".to_string(),
        })
}
