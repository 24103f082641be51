//! Per-level exposure accumulation and first-exposure level.
//!
//! Levels are fed least severe first. Each level adds a field group named
//! `<base><label><STAT>` to the wide table:
//!
//! | suffix          | value                                            |
//! |-----------------|--------------------------------------------------|
//! | `AREA`          | `min(count * pixel_area, shape_area)`            |
//! | `MIN` .. `STD`  | depth statistics over the footprint              |
//! | `Exposure`      | percent of the footprint under water, `[0, 100]` |
//! | `Volume`        | `sum * pixel_area`                               |
//! | `LossPotential` | loss table lookup on the mean depth              |
//! | `WSEL`          | mean water surface elevation                     |
//!
//! A footprint with no depth cell above zero is dry at that level and its
//! field group stays null.

use crate::config::FieldSelection;
use crate::engine::ZoneStats;
use crate::summary::LevelSummary;
use crate::table::{ExposureTable, FieldType};
use crate::{ExposureError, LossTable, Result, RiskLevelSpec};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const SHAPE_AREA_FIELD: &str = "Shape_Area";

/// Depth statistics written for every level.
const DEPTH_STATS: [&str; 6] = ["AREA", "MIN", "MAX", "RANGE", "MEAN", "STD"];

/// Name of a per-level field.
pub fn level_field(base: &str, label: &str, stat: &str) -> String {
    format!("{}{}{}", base, label, stat)
}

/// Name of the first-exposure index field.
pub fn slider_field(base: &str) -> String {
    format!("{}Slider", base)
}

/// Name of the first-exposure level value field.
pub fn level_value_field(base: &str) -> String {
    format!("{}Level", base)
}

/// Round half away from zero to `decimals` places.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Percent of a footprint covered by water, clamped to `[0, 100]`.
///
/// Zero when the footprint has no area.
pub fn exposure_percent(area: f64, shape_area: f64) -> f64 {
    if !(shape_area > 0.0) {
        return 0.0;
    }
    round_to(100.0 * area / shape_area, 4).clamp(0.0, 100.0)
}

/// Whether zone statistics describe a wet footprint.
pub fn is_wet(stats: &ZoneStats) -> bool {
    stats.count > 0 && stats.max > 0.0
}

/// Stage of an [`ExposureAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    Init,
    /// At least one level added; holds the severity index of the last one.
    PerLevelPass(usize),
    Finalize,
    Done,
    Failed,
}

/// Result of adding one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelOutcome {
    pub level_index: usize,
    /// Footprints wet at this level.
    pub exposed: usize,
}

/// Final table and per-level summary of a run.
#[derive(Debug, Clone)]
pub struct FinalizedExposure {
    pub table: ExposureTable,
    pub summary: LevelSummary,
}

/// Builds the wide exposure table one level at a time.
#[derive(Debug)]
pub struct ExposureAccumulator<'a> {
    spec: &'a RiskLevelSpec,
    id_field: String,
    /// Feature id and footprint area, in output order.
    footprints: Vec<(String, f64)>,
    pixel_area: f64,
    fields: FieldSelection,
    loss_table: Option<&'a LossTable>,
    table: Option<ExposureTable>,
    processed: Vec<usize>,
    state: AccumulatorState,
}

impl<'a> ExposureAccumulator<'a> {
    pub fn new(
        spec: &'a RiskLevelSpec,
        id_field: impl Into<String>,
        footprints: Vec<(String, f64)>,
        pixel_area: f64,
        fields: FieldSelection,
    ) -> Self {
        Self {
            spec,
            id_field: id_field.into(),
            footprints,
            pixel_area,
            fields,
            loss_table: None,
            table: None,
            processed: Vec::new(),
            state: AccumulatorState::Init,
        }
    }

    /// Enable loss potential fields.
    pub fn with_loss_table(mut self, loss_table: Option<&'a LossTable>) -> Self {
        self.loss_table = loss_table;
        self
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Severity indexes of the levels added so far.
    pub fn processed_levels(&self) -> &[usize] {
        &self.processed
    }

    /// Mark the run as failed; later calls are rejected.
    pub fn fail(&mut self) {
        self.state = AccumulatorState::Failed;
    }

    fn invalid(&mut self, message: String) -> ExposureError {
        self.state = AccumulatorState::Failed;
        ExposureError::InvalidState(message)
    }

    /// Add the statistics of one level.
    ///
    /// `depth` holds depth statistics per feature id; `surface`, when given,
    /// water surface statistics for the WSEL field.
    pub fn add_level(
        &mut self,
        label: &str,
        depth: &BTreeMap<String, ZoneStats>,
        surface: Option<&BTreeMap<String, ZoneStats>>,
    ) -> Result<LevelOutcome> {
        let level_index = match (self.state, self.spec.label_index(label)) {
            (_, None) => return Err(self.invalid(format!("unknown level label {}", label))),
            (AccumulatorState::Init, Some(i)) => i,
            (AccumulatorState::PerLevelPass(last), Some(i)) if i > last => i,
            (AccumulatorState::PerLevelPass(_), Some(_)) => {
                return Err(self.invalid(format!("level {} added out of severity order", label)))
            }
            (state, _) => return Err(self.invalid(format!("cannot add level {} in state {:?}", label, state))),
        };

        let spec = self.spec;
        let base = spec.attribute_base_name.as_str();
        let field = |stat: &str| level_field(base, label, stat);
        let mut level_table = ExposureTable::new(self.id_field.as_str(), self.footprints.iter().map(|(id, _)| id.clone()));
        for stat in DEPTH_STATS {
            level_table.add_field(&field(stat), FieldType::Double);
        }
        level_table.add_field(&field("Exposure"), FieldType::Double);
        if self.fields.volume {
            level_table.add_field(&field("Volume"), FieldType::Double);
        }
        let loss_table = self.loss_table.filter(|_| self.fields.loss);
        if loss_table.is_some() {
            level_table.add_field(&field("LossPotential"), FieldType::Double);
        }
        if surface.is_some() && self.fields.wsel {
            level_table.add_field(&field("WSEL"), FieldType::Double);
        }

        let mut exposed = 0;
        for (id, shape_area) in &self.footprints {
            if let Some(wsel) = surface
                .filter(|_| self.fields.wsel)
                .and_then(|s| s.get(id))
                .filter(|s| s.count > 0)
            {
                level_table.set(id, &field("WSEL"), Some(wsel.mean));
            }

            let stats = match depth.get(id) {
                Some(stats) if is_wet(stats) => stats,
                _ => continue,
            };
            exposed += 1;

            let area = (stats.count as f64 * self.pixel_area).min(*shape_area);
            level_table.set(id, &field("AREA"), Some(area));
            level_table.set(id, &field("MIN"), Some(stats.min));
            level_table.set(id, &field("MAX"), Some(stats.max));
            level_table.set(id, &field("RANGE"), Some(stats.range));
            level_table.set(id, &field("MEAN"), Some(stats.mean));
            level_table.set(id, &field("STD"), Some(stats.std));
            level_table.set(id, &field("Exposure"), Some(exposure_percent(area, *shape_area)));
            if self.fields.volume {
                level_table.set(id, &field("Volume"), Some(round_to(stats.sum * self.pixel_area, 4)));
            }
            if let Some(loss) = loss_table.and_then(|t| t.lookup(stats.mean, area)) {
                level_table.set(id, &field("LossPotential"), Some(loss));
            }
        }

        match self.table.as_mut() {
            Some(table) => table.join(&level_table),
            None => {
                let mut table = level_table;
                table.add_field(SHAPE_AREA_FIELD, FieldType::Double);
                for (id, shape_area) in &self.footprints {
                    table.set(id, SHAPE_AREA_FIELD, Some(*shape_area));
                }
                self.table = Some(table);
            }
        }

        debug!("Level {} ({}): {} of {} features exposed", label, level_index, exposed, self.footprints.len());
        self.processed.push(level_index);
        self.state = AccumulatorState::PerLevelPass(level_index);
        Ok(LevelOutcome { level_index, exposed })
    }

    /// Compute `Slider` and `Level`, the level summary, then drop unselected fields.
    pub fn finalize(&mut self) -> Result<FinalizedExposure> {
        if !matches!(self.state, AccumulatorState::PerLevelPass(_)) {
            let state = self.state;
            return Err(self.invalid(format!("cannot finalize in state {:?}", state)));
        }
        self.state = AccumulatorState::Finalize;
        let Some(mut table) = self.table.take() else {
            return Err(self.invalid("no level table".to_string()));
        };

        let base = self.spec.attribute_base_name.clone();
        let slider_name = slider_field(&base);
        let level_name = level_value_field(&base);
        table.add_field(&slider_name, FieldType::Integer);
        table.add_field(&level_name, FieldType::Double);

        let exposure_fields: Vec<(usize, String)> = self
            .processed
            .iter()
            .map(|&i| (i, level_field(&base, &self.spec.level_labels[i], "Exposure")))
            .collect();

        let ids = table.ids().to_vec();
        let mut flooded = 0;
        for id in &ids {
            let first = exposure_fields
                .iter()
                .find(|(_, name)| table.get(id, name).is_some())
                .map(|(index, _)| *index);
            if let Some(slider) = first {
                flooded += 1;
                table.set(id, &slider_name, Some(slider as f64));
                table.set(id, &level_name, self.spec.level(slider));
            }
        }
        info!("{} of {} features exposed at one or more levels", flooded, ids.len());

        let summary = LevelSummary::from_table(&table, self.spec, &self.processed);
        self.drop_unselected(&mut table);
        self.state = AccumulatorState::Done;
        Ok(FinalizedExposure { table, summary })
    }

    fn drop_unselected(&self, table: &mut ExposureTable) {
        let base = self.spec.attribute_base_name.as_str();
        let flags = [
            ("AREA", self.fields.area),
            ("MIN", self.fields.min),
            ("MAX", self.fields.max),
            ("RANGE", self.fields.range),
            ("MEAN", self.fields.mean),
            ("STD", self.fields.std),
            ("Exposure", self.fields.exposure),
        ];
        for &index in &self.processed {
            let label = &self.spec.level_labels[index];
            for (stat, keep) in flags {
                if !keep {
                    table.drop_field(&level_field(base, label, stat));
                }
            }
        }
        if !self.fields.shape_area {
            table.drop_field(SHAPE_AREA_FIELD);
        }
    }
}

/// Ground elevation fields written from DEM statistics.
pub const GROUND_FIELDS: [&str; 5] = ["DEMMIN", "DEMMAX", "DEMRANGE", "DEMMEAN", "DEMSTD"];

/// Add the selected ground elevation statistics to the table.
pub fn add_ground_statistics(
    table: &mut ExposureTable,
    ground: &BTreeMap<String, ZoneStats>,
    fields: &FieldSelection,
) {
    let selected = [
        (GROUND_FIELDS[0], fields.ground_min),
        (GROUND_FIELDS[1], fields.ground_max),
        (GROUND_FIELDS[2], fields.ground_range),
        (GROUND_FIELDS[3], fields.ground_mean),
        (GROUND_FIELDS[4], fields.ground_std),
    ];
    for (name, keep) in selected {
        if keep {
            table.add_field(name, FieldType::Double);
        }
    }
    let ids = table.ids().to_vec();
    for id in &ids {
        let Some(stats) = ground.get(id).filter(|s| s.count > 0) else {
            continue;
        };
        let values = [stats.min, stats.max, stats.range, stats.mean, stats.std];
        for ((name, keep), value) in selected.iter().zip(values) {
            if *keep {
                table.set(id, name, Some(value));
            }
        }
    }
}
