//! End-to-end exposure run against a GIS engine.

use crate::config::{ExposureParams, RunConfig};
use crate::engine::{DatasetKind, GisEngine, LinearUnit, SpatialReference, ZoneStats};
use crate::exposure::{add_ground_statistics, ExposureAccumulator, FinalizedExposure};
use crate::processing::{self, ProcessingEntry, ProcessingList};
use crate::summary::LevelSummary;
use crate::table::ExposureTable;
use crate::{ExposureError, LossTable, Result, RiskLevelSpec, RiskTable, Warning};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct ExposureReport {
    pub risk_levels: RiskLevelSpec,
    pub depth_list: ProcessingList,
    /// Surface datasets used for WSEL and depth derivation.
    pub surface_list: Option<ProcessingList>,
    pub table: ExposureTable,
    pub summary: LevelSummary,
    pub warnings: Vec<Warning>,
    /// Area of one footprint zone cell.
    pub pixel_area: f64,
}

/// Water surface input found in the surface workspace.
#[derive(Debug, Clone)]
struct SurfaceInput {
    list: ProcessingList,
    multipatch: bool,
}

/// Runs the exposure analysis for one set of parameters.
///
/// The pipeline owns every intermediate dataset it creates and deletes them
/// at the end of a successful run when the configuration asks for it.
pub struct ExposurePipeline<'e, E: GisEngine> {
    engine: &'e mut E,
    config: RunConfig,
    scratch: Vec<String>,
    warnings: Vec<Warning>,
    /// Rasterized multipatch surfaces by level label.
    surface_rasters: BTreeMap<String, String>,
}

impl<'e, E: GisEngine> ExposurePipeline<'e, E> {
    pub fn new(engine: &'e mut E, config: RunConfig) -> Self {
        Self {
            engine,
            config,
            scratch: Vec::new(),
            warnings: Vec::new(),
            surface_rasters: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    fn push_warning(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Reserve a scratch dataset, deleting any leftover from an earlier run.
    fn scratch(&mut self, name: &str) -> Result<String> {
        let path = self.engine.scratch_path(name);
        if self.engine.exists(&path) {
            self.engine
                .delete(&path)
                .map_err(|e| ExposureError::engine("delete", e))?;
        }
        if !self.scratch.contains(&path) {
            self.scratch.push(path.clone());
        }
        Ok(path)
    }

    /// Run the analysis.
    pub fn run(&mut self, params: &ExposureParams) -> Result<ExposureReport> {
        self.warnings.clear();
        info!("Attributing exposure for '{}' to {}", params.risk_type, params.features);

        let (feature_kind, feature_sr) = self.check_features(params)?;
        self.check_spatial_references(params, &feature_sr)?;

        let mut spec = RiskTable::from_path(&params.risk_table)?.load(&params.risk_type)?;
        if let Some(percent) = params.percent_flood {
            spec = spec.with_percent(percent);
        }
        if spec.source_order == crate::SourceOrder::Unordered {
            self.push_warning(Warning::UnorderedRiskLevels {
                risk_type: spec.risk_type.clone(),
            });
        }
        info!("{} risk levels for '{}'", spec.len(), spec.risk_type);

        let loss_table = self.import_loss_table(params);
        let surface = self.discover_surface(params, &spec)?;
        let depth_list = self.discover_depth(params, &spec, surface.as_ref(), &feature_sr)?;

        let (zones, footprints) = self.prepare_footprints(params, feature_kind, &feature_sr)?;
        let pixel_area = self
            .engine
            .cell_area(&zones)
            .map_err(|e| ExposureError::engine("cell area", e))?;
        info!("{} features, zone cell area {}", footprints.len(), pixel_area);

        let mut accumulator = ExposureAccumulator::new(
            &spec,
            params.feature_id_field.as_str(),
            footprints,
            pixel_area,
            self.config.fields,
        )
        .with_loss_table(loss_table.as_ref());

        if let Err(e) = self.run_levels(&mut accumulator, &zones, &depth_list, surface.as_ref(), &feature_sr) {
            accumulator.fail();
            return Err(e);
        }
        let FinalizedExposure { mut table, summary } = accumulator.finalize()?;

        if let Some(dem) = params.dem.as_deref().filter(|_| self.config.fields.any_ground()) {
            debug!("Ground statistics from {}", dem);
            let ground = self.zonal(&zones, dem)?;
            add_ground_statistics(&mut table, &ground, &self.config.fields);
        }

        if self.config.delete_intermediate {
            self.delete_scratch();
        }

        Ok(ExposureReport {
            risk_levels: spec,
            depth_list,
            surface_list: surface.map(|s| s.list),
            table,
            summary,
            warnings: std::mem::take(&mut self.warnings),
            pixel_area,
        })
    }

    fn check_features(&mut self, params: &ExposureParams) -> Result<(DatasetKind, SpatialReference)> {
        if !self.engine.exists(&params.features) {
            return Err(ExposureError::NoFeatures(params.features.clone()));
        }
        let info = self
            .engine
            .describe(&params.features)
            .map_err(|e| ExposureError::engine("describe", e))?;
        if !info.kind.is_feature_class() {
            return Err(ExposureError::InvalidParameter {
                name: "features",
                value: params.features.clone(),
                reason: format!("{:?} is not a feature class", info.kind),
            });
        }
        let sr = info
            .spatial_reference
            .filter(|sr| sr.projected)
            .ok_or_else(|| ExposureError::NotProjected {
                dataset: params.features.clone(),
            })?;
        if sr.linear_unit.canonical().is_none() {
            return Err(ExposureError::UnsupportedUnit(sr.linear_unit.name().to_string()));
        }
        Ok((info.kind, sr))
    }

    /// Every raster in the surface and depth workspaces, and the DEM, must
    /// share the coordinate system of the features.
    fn check_spatial_references(&mut self, params: &ExposureParams, feature_sr: &SpatialReference) -> Result<()> {
        let mut datasets = Vec::new();
        for workspace in [&params.surface_workspace, &params.depth_workspace].into_iter().flatten() {
            if !self.engine.exists(workspace) {
                continue;
            }
            let names = self
                .engine
                .list_rasters(workspace)
                .map_err(|e| ExposureError::engine("list rasters", e))?;
            datasets.extend(names.into_iter().map(|n| processing::join_path(workspace, &n)));
        }
        if let Some(dem) = &params.dem {
            datasets.push(dem.clone());
        }

        for dataset in datasets {
            let info = self
                .engine
                .describe(&dataset)
                .map_err(|e| ExposureError::engine("describe", e))?;
            if info.kind.is_feature_class() && info.kind != DatasetKind::Multipatch {
                self.push_warning(Warning::FeatureClassInput {
                    dataset: dataset.clone(),
                });
            }
            match info.spatial_reference {
                Some(sr) if sr.matches(feature_sr) => {
                    if sr.z_unit.is_none() {
                        self.push_warning(Warning::NoVerticalUnits { dataset });
                    }
                }
                _ => {
                    return Err(ExposureError::MixedSpatialReference {
                        first: params.features.clone(),
                        second: dataset,
                    })
                }
            }
        }
        Ok(())
    }

    fn import_loss_table(&mut self, params: &ExposureParams) -> Option<LossTable> {
        let path = params.loss_table.as_deref().filter(|_| self.config.fields.loss)?;
        match LossTable::import(path) {
            Ok(table) if table.is_empty() => {
                self.push_warning(Warning::LossTableUnavailable {
                    reason: format!("{} has no rows", path),
                });
                None
            }
            Ok(table) => {
                debug!("Loss table {} with {} rows", path, table.rows().len());
                Some(table)
            }
            Err(e) => {
                self.push_warning(Warning::LossTableUnavailable { reason: e.to_string() });
                None
            }
        }
    }

    /// Multipatch surfaces take precedence over rasters.
    fn discover_surface(&mut self, params: &ExposureParams, spec: &RiskLevelSpec) -> Result<Option<SurfaceInput>> {
        let Some(workspace) = params.surface_workspace.as_deref().filter(|w| !w.is_empty()) else {
            return Ok(None);
        };
        if !self.engine.exists(workspace) {
            self.push_warning(Warning::NoSurfaceData {
                reason: format!("{} does not exist", workspace),
            });
            return Ok(None);
        }

        let multipatches = self
            .engine
            .list_multipatches(workspace)
            .map_err(|e| ExposureError::engine("list multipatches", e))?;
        let (names, multipatch) = if multipatches.is_empty() {
            let rasters = self
                .engine
                .list_rasters(workspace)
                .map_err(|e| ExposureError::engine("list rasters", e))?;
            (rasters, false)
        } else {
            (multipatches, true)
        };

        let list = processing::build(&names, spec, workspace, self.config.name_ordering);
        if !list.duplicates.is_empty() {
            self.push_warning(Warning::DuplicateLevelNames {
                dataset: "surface".to_string(),
                names: list.duplicates.clone(),
            });
        }
        if list.has_unmatched() {
            self.push_warning(Warning::UnmatchedSurfaceNames {
                names: list.unmatched.clone(),
            });
            self.push_warning(Warning::NoSurfaceData {
                reason: "surface names do not match the risk levels".to_string(),
            });
            return Ok(None);
        }
        if list.is_empty() {
            self.push_warning(Warning::NoSurfaceData {
                reason: format!("no surface datasets in {}", workspace),
            });
            return Ok(None);
        }
        debug!("Surface levels: {:?}", list.labels());
        Ok(Some(SurfaceInput { list, multipatch }))
    }

    fn discover_depth(
        &mut self,
        params: &ExposureParams,
        spec: &RiskLevelSpec,
        surface: Option<&SurfaceInput>,
        feature_sr: &SpatialReference,
    ) -> Result<ProcessingList> {
        let workspace = params
            .depth_workspace
            .as_deref()
            .filter(|w| !w.is_empty() && self.engine.exists(w));

        let Some(workspace) = workspace else {
            return match (surface, params.dem.as_deref()) {
                (Some(surface), Some(dem)) => self.derive_depth(surface, dem, feature_sr),
                _ => Err(ExposureError::NoDepthData),
            };
        };

        let names = self
            .engine
            .list_rasters(workspace)
            .map_err(|e| ExposureError::engine("list rasters", e))?;
        let list = processing::build(&names, spec, workspace, self.config.name_ordering);
        if list.has_unmatched() {
            return Err(ExposureError::UnmatchedNames {
                dataset: "depth".to_string(),
                names: list.unmatched,
            });
        }
        if list.is_empty() {
            return Err(ExposureError::NoDepthData);
        }
        if !list.duplicates.is_empty() {
            self.push_warning(Warning::DuplicateLevelNames {
                dataset: "depth".to_string(),
                names: list.duplicates.clone(),
            });
        }

        for entry in list.iter() {
            let minimum = self
                .engine
                .raster_minimum(&entry.full_path)
                .map_err(|e| ExposureError::engine("raster minimum", e))?;
            if let Some(minimum) = minimum.filter(|m| *m < 0.0) {
                return Err(ExposureError::NegativeDepth {
                    raster: entry.source_name.clone(),
                    minimum,
                });
            }
        }

        if let Some(surface) = surface {
            processing::ensure_matching_levels(&surface.list, &list)?;
        }
        debug!("Depth levels: {:?}", list.labels());
        Ok(list)
    }

    /// Depth as `surface - DEM`, cells at or below zero removed.
    fn derive_depth(&mut self, surface: &SurfaceInput, dem: &str, feature_sr: &SpatialReference) -> Result<ProcessingList> {
        info!("No depth rasters, deriving depth from water surface and {}", dem);
        self.push_warning(Warning::RelativeDepth);

        let mut entries = Vec::new();
        for entry in surface.list.iter() {
            let surface_raster = self.surface_raster(entry, surface.multipatch, feature_sr)?;
            let difference = self.scratch(&format!("surface_minus_dem_{}", entry.level_label))?;
            self.engine
                .minus(&surface_raster, dem, &difference)
                .map_err(|e| ExposureError::engine("minus", e))?;
            let depth = self.scratch(&format!("depth_{}", entry.level_label))?;
            self.engine
                .set_null_at_or_below(&difference, 0.0, &depth)
                .map_err(|e| ExposureError::engine("set null", e))?;
            entries.push(ProcessingEntry {
                level_label: entry.level_label.clone(),
                source_name: entry.source_name.clone(),
                full_path: depth,
            });
        }
        Ok(ProcessingList {
            entries,
            ..ProcessingList::default()
        })
    }

    /// Raster path of a surface entry; multipatches are rasterized at 1 m.
    fn surface_raster(&mut self, entry: &ProcessingEntry, multipatch: bool, feature_sr: &SpatialReference) -> Result<String> {
        if !multipatch {
            return Ok(entry.full_path.clone());
        }
        if let Some(path) = self.surface_rasters.get(&entry.level_label) {
            return Ok(path.clone());
        }
        let output = self.scratch(&format!("surface_{}", entry.level_label))?;
        let cell_size = feature_sr.linear_unit.one_meter();
        self.engine
            .multipatch_to_raster(&entry.full_path, cell_size, &output)
            .map_err(|e| ExposureError::engine("multipatch to raster", e))?;
        self.surface_rasters.insert(entry.level_label.clone(), output.clone());
        Ok(output)
    }

    /// Footprint polygons, buffered per feature type, rasterized into zones.
    fn prepare_footprints(
        &mut self,
        params: &ExposureParams,
        kind: DatasetKind,
        feature_sr: &SpatialReference,
    ) -> Result<(String, Vec<(String, f64)>)> {
        if !(params.tolerance.is_finite() && params.tolerance > 0.0) {
            return Err(ExposureError::InvalidParameter {
                name: "tolerance",
                value: params.tolerance.to_string(),
                reason: "must be a positive cell size".to_string(),
            });
        }
        let distance = params.buffer_distance;
        let footprints = match kind {
            DatasetKind::Multipatch => {
                let footprint = self.scratch("footprints")?;
                self.engine
                    .footprints(&params.features, &footprint)
                    .map_err(|e| ExposureError::engine("footprints", e))?;
                if distance > 0.0 {
                    self.buffered(&footprint, distance)?
                } else {
                    footprint
                }
            }
            DatasetKind::Polygon if distance > 0.0 => self.buffered(&params.features, distance)?,
            DatasetKind::Polygon => {
                let copy = self.scratch("footprints")?;
                self.engine
                    .copy_features(&params.features, &copy)
                    .map_err(|e| ExposureError::engine("copy features", e))?;
                copy
            }
            _ => {
                let distance = if distance > 0.0 {
                    distance
                } else {
                    default_point_buffer(&feature_sr.linear_unit)
                };
                self.buffered(&params.features, distance)?
            }
        };

        let areas = self
            .engine
            .feature_areas(&footprints, &params.feature_id_field)
            .map_err(|e| ExposureError::engine("feature areas", e))?;
        if areas.is_empty() {
            return Err(ExposureError::NoFeatures(params.features.clone()));
        }

        let zones = self.scratch("footprint_zones")?;
        self.engine
            .rasterize_footprints(&footprints, &params.feature_id_field, params.tolerance, &zones)
            .map_err(|e| ExposureError::engine("rasterize footprints", e))?;
        Ok((zones, areas))
    }

    fn buffered(&mut self, input: &str, distance: f64) -> Result<String> {
        debug!("Buffering {} by {}", input, distance);
        let output = self.scratch("footprints_buffered")?;
        self.engine
            .buffer(input, distance, &output)
            .map_err(|e| ExposureError::engine("buffer", e))?;
        Ok(output)
    }

    fn zonal(&self, zones: &str, values: &str) -> Result<BTreeMap<String, ZoneStats>> {
        self.engine
            .zonal_statistics(zones, values)
            .map_err(|e| ExposureError::engine("zonal statistics", e))
    }

    fn run_levels(
        &mut self,
        accumulator: &mut ExposureAccumulator<'_>,
        zones: &str,
        depth_list: &ProcessingList,
        surface: Option<&SurfaceInput>,
        feature_sr: &SpatialReference,
    ) -> Result<()> {
        let wsel = surface.filter(|_| self.config.fields.wsel);
        for entry in depth_list.iter() {
            info!("Processing level {} ({})", entry.level_label, entry.source_name);
            let depth = self.zonal(zones, &entry.full_path)?;

            let surface_stats = match wsel.and_then(|s| s.list.entry(&entry.level_label).map(|e| (e, s.multipatch))) {
                Some((surface_entry, multipatch)) => {
                    let raster = self.surface_raster(surface_entry, multipatch, feature_sr)?;
                    Some(self.zonal(zones, &raster)?)
                }
                None => None,
            };

            let outcome = accumulator.add_level(&entry.level_label, &depth, surface_stats.as_ref())?;
            if outcome.exposed == 0 {
                self.push_warning(Warning::DryLevel {
                    level: entry.level_label.clone(),
                });
            }
        }
        Ok(())
    }

    fn delete_scratch(&mut self) {
        for path in std::mem::take(&mut self.scratch) {
            if self.engine.exists(&path) {
                if let Err(e) = self.engine.delete(&path) {
                    warn!("Could not delete {}: {}", path, e);
                }
            }
        }
        self.surface_rasters.clear();
    }
}

/// Buffer for point and line features when none is given: one foot.
fn default_point_buffer(unit: &LinearUnit) -> f64 {
    unit.one_foot()
}
