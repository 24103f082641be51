//! End-to-end runs of the exposure pipeline against an in-memory engine.

use approx::assert_relative_eq;
use fia_exposure::{
    DatasetInfo, DatasetKind, EngineError, EngineResult, ExposureError, ExposureParams, ExposurePipeline,
    GeometryEngine, LinearUnit, RasterAlgebra, RasterStore, RunConfig, SpatialReference, Warning,
    ZonalStatsEngine, ZoneStats,
};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// In-memory engine
// ============================================================================

#[derive(Debug, Clone)]
struct FakeDataset {
    kind: DatasetKind,
    spatial_reference: Option<SpatialReference>,
    /// Statistics returned when this dataset is the value raster of a zonal query.
    stats: BTreeMap<String, ZoneStats>,
    minimum: Option<f64>,
}

/// Engine whose rasters are described only by their per-feature statistics.
struct FakeEngine {
    spatial_reference: SpatialReference,
    workspaces: BTreeMap<String, Vec<String>>,
    datasets: BTreeMap<String, FakeDataset>,
    areas: Vec<(String, f64)>,
    zonal_calls: Cell<usize>,
    buffers: Vec<f64>,
    deleted: Vec<String>,
}

fn state_plane() -> SpatialReference {
    SpatialReference {
        name: "EPSG:2248".to_string(),
        linear_unit: LinearUnit::FootUs,
        z_unit: Some(LinearUnit::FootUs),
        projected: true,
    }
}

fn wet(count: u64, min: f64, max: f64, mean: f64) -> ZoneStats {
    ZoneStats {
        area: count as f64,
        min,
        max,
        range: max - min,
        mean,
        std: 0.5,
        sum: mean * count as f64,
        count,
    }
}

impl FakeEngine {
    fn new(kind: DatasetKind) -> Self {
        let mut engine = Self {
            spatial_reference: state_plane(),
            workspaces: BTreeMap::new(),
            datasets: BTreeMap::new(),
            areas: vec![("1".to_string(), 10.0), ("2".to_string(), 10.0)],
            zonal_calls: Cell::new(0),
            buffers: Vec::new(),
            deleted: Vec::new(),
        };
        engine.insert("buildings", kind, BTreeMap::new());
        engine
    }

    fn insert(&mut self, path: &str, kind: DatasetKind, stats: BTreeMap<String, ZoneStats>) {
        let minimum = stats.values().map(|s| s.min).reduce(f64::min);
        self.datasets.insert(
            path.to_string(),
            FakeDataset {
                kind,
                spatial_reference: Some(self.spatial_reference.clone()),
                stats,
                minimum,
            },
        );
    }

    /// Add a raster to a workspace with the given per-feature statistics.
    fn raster(&mut self, workspace: &str, name: &str, stats: &[(&str, ZoneStats)]) {
        self.workspaces
            .entry(workspace.to_string())
            .or_default()
            .push(name.to_string());
        let stats = stats.iter().map(|(id, s)| (id.to_string(), *s)).collect();
        self.insert(&format!("{}/{}", workspace, name), DatasetKind::Raster, stats);
    }

    fn dataset(&self, path: &str) -> EngineResult<&FakeDataset> {
        self.datasets
            .get(path)
            .ok_or_else(|| EngineError::NotFound(path.to_string()))
    }
}

impl RasterStore for FakeEngine {
    fn list_rasters(&self, workspace: &str) -> EngineResult<Vec<String>> {
        Ok(self.workspaces.get(workspace).cloned().unwrap_or_default())
    }

    fn list_multipatches(&self, _workspace: &str) -> EngineResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn exists(&self, path: &str) -> bool {
        self.workspaces.contains_key(path) || self.datasets.contains_key(path)
    }

    fn describe(&self, path: &str) -> EngineResult<DatasetInfo> {
        let dataset = self.dataset(path)?;
        Ok(DatasetInfo {
            kind: dataset.kind,
            spatial_reference: dataset.spatial_reference.clone(),
        })
    }

    fn raster_minimum(&self, path: &str) -> EngineResult<Option<f64>> {
        Ok(self.dataset(path)?.minimum)
    }

    fn cell_area(&self, _path: &str) -> EngineResult<f64> {
        Ok(1.0)
    }

    fn delete(&mut self, path: &str) -> EngineResult<()> {
        self.datasets.remove(path);
        self.deleted.push(path.to_string());
        Ok(())
    }

    fn scratch_path(&self, name: &str) -> String {
        format!("memory/{}", name)
    }
}

impl ZonalStatsEngine for FakeEngine {
    fn zonal_statistics(&self, zones: &str, values: &str) -> EngineResult<BTreeMap<String, ZoneStats>> {
        self.dataset(zones)?;
        self.zonal_calls.set(self.zonal_calls.get() + 1);
        Ok(self.dataset(values)?.stats.clone())
    }
}

impl GeometryEngine for FakeEngine {
    fn copy_features(&mut self, input: &str, output: &str) -> EngineResult<()> {
        let copy = self.dataset(input)?.clone();
        self.datasets.insert(output.to_string(), copy);
        Ok(())
    }

    fn footprints(&mut self, multipatch: &str, _output: &str) -> EngineResult<()> {
        Err(EngineError::Unsupported(format!("footprints of {}", multipatch)))
    }

    fn buffer(&mut self, input: &str, distance: f64, output: &str) -> EngineResult<()> {
        self.buffers.push(distance);
        let mut buffered = self.dataset(input)?.clone();
        buffered.kind = DatasetKind::Polygon;
        self.datasets.insert(output.to_string(), buffered);
        Ok(())
    }

    fn feature_areas(&self, features: &str, _id_field: &str) -> EngineResult<Vec<(String, f64)>> {
        self.dataset(features)?;
        Ok(self.areas.clone())
    }

    fn rasterize_footprints(&mut self, features: &str, _id: &str, _cell: f64, output: &str) -> EngineResult<()> {
        self.dataset(features)?;
        self.insert(output, DatasetKind::Raster, BTreeMap::new());
        Ok(())
    }

    fn multipatch_to_raster(&mut self, multipatch: &str, _cell_size: f64, _output: &str) -> EngineResult<()> {
        Err(EngineError::Unsupported(format!("rasterize {}", multipatch)))
    }
}

impl RasterAlgebra for FakeEngine {
    /// Subtracts the mean of `b` from each zone of `a`.
    fn minus(&mut self, a: &str, b: &str, output: &str) -> EngineResult<()> {
        let b_stats = self.dataset(b)?.stats.clone();
        let stats = self
            .dataset(a)?
            .stats
            .iter()
            .filter_map(|(id, s)| {
                let offset = b_stats.get(id)?.mean;
                Some((id.clone(), wet(s.count, s.min - offset, s.max - offset, s.mean - offset)))
            })
            .collect();
        self.insert(output, DatasetKind::Raster, stats);
        Ok(())
    }

    /// Drops zones whose maximum is at or below the threshold.
    fn set_null_at_or_below(&mut self, input: &str, threshold: f64, output: &str) -> EngineResult<()> {
        let mut stats = self.dataset(input)?.stats.clone();
        stats.retain(|_, s| s.max > threshold);
        self.insert(output, DatasetKind::Raster, stats);
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn risk_table(dir: &Path) -> String {
    let path = dir.join("risk_levels.csv");
    std::fs::write(
        &path,
        "NOAA Sea Level Rise,SLR,10,9,8,7,6,5,4,3,2,1\nSynthetic,SYN,3,2,1\n",
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

fn params(dir: &Path) -> ExposureParams {
    ExposureParams {
        risk_type: "Synthetic".to_string(),
        percent_flood: None,
        risk_table: risk_table(dir),
        surface_workspace: None,
        depth_workspace: Some("depth".to_string()),
        features: "buildings".to_string(),
        feature_id_field: "OBJECTID".to_string(),
        buffer_distance: 0.0,
        tolerance: 1.0,
        dem: None,
        loss_table: None,
        output_table: dir.join("exposure.csv").to_string_lossy().into_owned(),
    }
}

/// Feature 2 is wet from level 2, feature 1 only at level 3; level 1 is dry.
fn three_level_engine() -> FakeEngine {
    let mut engine = FakeEngine::new(DatasetKind::Polygon);
    engine.raster("depth", "depth_1", &[]);
    engine.raster("depth", "depth_2", &[("2", wet(4, 0.5, 1.5, 1.0))]);
    engine.raster(
        "depth",
        "depth_3",
        &[("1", wet(2, 0.25, 0.75, 0.5)), ("2", wet(8, 1.0, 3.0, 2.0))],
    );
    engine
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_percent_levels_run_least_severe_first() {
    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("percent_levels.csv");
    std::fs::write(&table, "FEMA Flood Percent,FEMA,10,4,2,1,0.2\n").unwrap();

    // Feature 1 is wet from the 1% level, feature 2 from the 4% level.
    let mut engine = FakeEngine::new(DatasetKind::Polygon);
    engine.raster(
        "depth",
        "depth_0_2",
        &[("1", wet(6, 0.5, 2.5, 1.5)), ("2", wet(10, 1.0, 4.0, 2.5))],
    );
    engine.raster(
        "depth",
        "depth_1",
        &[("1", wet(2, 0.25, 0.75, 0.5)), ("2", wet(8, 0.75, 3.0, 2.0))],
    );
    engine.raster("depth", "depth_10", &[]);
    engine.raster("depth", "depth_2", &[("2", wet(6, 0.5, 2.0, 1.25))]);
    engine.raster("depth", "depth_4", &[("2", wet(3, 0.25, 1.0, 0.5))]);

    let params = ExposureParams {
        risk_type: "FEMA Flood Percent".to_string(),
        risk_table: table.to_string_lossy().into_owned(),
        ..params(dir.path())
    };
    let report = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params)
        .unwrap();

    assert!(report.risk_levels.is_percent);
    assert_eq!(report.risk_levels.level_labels, vec!["10", "4", "2", "1", "0_2"]);
    assert_eq!(report.depth_list.labels(), vec!["10", "4", "2", "1", "0_2"]);

    let table = &report.table;
    assert_eq!(table.get("1", "FEMASlider"), Some(3.0));
    assert_eq!(table.get("1", "FEMALevel"), Some(1.0));
    assert_eq!(table.get("2", "FEMASlider"), Some(1.0));
    assert_eq!(table.get("2", "FEMALevel"), Some(4.0));
    assert_eq!(table.get("1", "FEMA2AREA"), None);
    assert_relative_eq!(table.get("2", "FEMA4AREA").unwrap(), 3.0);

    let affected: Vec<usize> = report.summary.rows.iter().map(|r| r.number_affected).collect();
    assert_eq!(affected, vec![0, 0, 1, 1, 2, 2]);
}

#[test]
fn test_three_level_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = three_level_engine();
    let report = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params(dir.path()))
        .unwrap();

    assert_eq!(report.risk_levels.level_labels, vec!["1", "2", "3"]);
    assert_eq!(report.depth_list.labels(), vec!["1", "2", "3"]);

    let table = &report.table;
    assert_eq!(table.ids(), &["1".to_string(), "2".to_string()]);
    assert_eq!(table.get("1", "SYNSlider"), Some(2.0));
    assert_eq!(table.get("1", "SYNLevel"), Some(3.0));
    assert_eq!(table.get("2", "SYNSlider"), Some(1.0));
    assert_eq!(table.get("2", "SYNLevel"), Some(2.0));

    assert_eq!(table.get("1", "SYN1AREA"), None);
    assert_eq!(table.get("1", "SYN2Exposure"), None);
    assert_relative_eq!(table.get("2", "SYN2AREA").unwrap(), 4.0);
    assert_relative_eq!(table.get("2", "SYN2Exposure").unwrap(), 40.0);
    assert_relative_eq!(table.get("2", "SYN3Exposure").unwrap(), 80.0);
    assert_relative_eq!(table.get("2", "SYN3Volume").unwrap(), 16.0);
    assert_eq!(table.get("1", "Shape_Area"), Some(10.0));

    assert!(report
        .warnings
        .contains(&Warning::DryLevel { level: "1".to_string() }));

    let affected: Vec<usize> = report.summary.rows.iter().map(|r| r.number_affected).collect();
    assert_eq!(affected, vec![0, 0, 1, 2]);
    assert_eq!(report.summary.rows[0].level, None);
    assert_relative_eq!(report.summary.rows[3].damage_area, 10.0);

    // Zones of the footprints are gone once the run succeeds.
    assert!(!engine.exists("memory/footprint_zones"));
    assert!(engine.deleted.contains(&"memory/footprint_zones".to_string()));
}

#[test]
fn test_intermediates_kept_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = three_level_engine();
    let config = RunConfig {
        delete_intermediate: false,
        ..RunConfig::default()
    };
    ExposurePipeline::new(&mut engine, config)
        .run(&params(dir.path()))
        .unwrap();
    assert!(engine.exists("memory/footprint_zones"));
}

#[test]
fn test_unselected_fields_dropped_after_slider() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = three_level_engine();
    let mut config = RunConfig::default();
    config.fields.exposure = false;
    config.fields.std = false;
    config.fields.shape_area = false;

    let report = ExposurePipeline::new(&mut engine, config)
        .run(&params(dir.path()))
        .unwrap();
    let table = &report.table;
    assert!(!table.has_field("SYN3Exposure"));
    assert!(!table.has_field("SYN3STD"));
    assert!(!table.has_field("Shape_Area"));
    assert!(table.has_field("SYN3MEAN"));
    assert_eq!(table.get("1", "SYNSlider"), Some(2.0));
}

#[test]
fn test_level_mismatch_fails_before_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = three_level_engine();
    engine.raster("surface", "wse_1", &[]);
    engine.raster("surface", "wse_2", &[]);

    let mut params = params(dir.path());
    params.surface_workspace = Some("surface".to_string());
    let err = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params)
        .unwrap_err();

    assert!(matches!(err, ExposureError::LevelMismatch { .. }));
    assert_eq!(engine.zonal_calls.get(), 0);
}

#[test]
fn test_surface_adds_water_elevation() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = three_level_engine();
    for (name, mean) in [("wse_1", 5.0), ("wse_2", 6.0), ("wse_3", 7.0)] {
        engine.raster("surface", name, &[("2", wet(10, mean, mean, mean))]);
    }

    let mut params = params(dir.path());
    params.surface_workspace = Some("surface".to_string());
    let report = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params)
        .unwrap();

    assert!(report.surface_list.is_some());
    assert_eq!(report.table.get("2", "SYN1WSEL"), Some(5.0));
    assert_eq!(report.table.get("2", "SYN3WSEL"), Some(7.0));
    assert_eq!(report.table.get("1", "SYN3WSEL"), None);
}

#[test]
fn test_negative_depth_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new(DatasetKind::Polygon);
    engine.raster("depth", "depth_1", &[("1", wet(1, -0.5, 1.0, 0.25))]);

    let err = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params(dir.path()))
        .unwrap_err();
    match err {
        ExposureError::NegativeDepth { raster, minimum } => {
            assert_eq!(raster, "depth_1");
            assert_eq!(minimum, -0.5);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_unmatched_depth_name_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = three_level_engine();
    engine.raster("depth", "depth_final", &[]);

    let err = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params(dir.path()))
        .unwrap_err();
    match err {
        ExposureError::UnmatchedNames { names, .. } => assert_eq!(names, vec!["depth_final"]),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_unprojected_features_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = three_level_engine();
    if let Some(features) = engine.datasets.get_mut("buildings") {
        features.spatial_reference = Some(SpatialReference {
            projected: false,
            ..state_plane()
        });
    }

    let err = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params(dir.path()))
        .unwrap_err();
    assert!(matches!(err, ExposureError::NotProjected { .. }));
    assert_eq!(engine.zonal_calls.get(), 0);
}

#[test]
fn test_mixed_spatial_reference_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = three_level_engine();
    if let Some(depth) = engine.datasets.get_mut("depth/depth_2") {
        depth.spatial_reference = Some(SpatialReference {
            name: "EPSG:26918".to_string(),
            linear_unit: LinearUnit::Meter,
            z_unit: None,
            projected: true,
        });
    }

    let err = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params(dir.path()))
        .unwrap_err();
    match err {
        ExposureError::MixedSpatialReference { second, .. } => assert_eq!(second, "depth/depth_2"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_missing_loss_table_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = three_level_engine();
    let mut params = params(dir.path());
    params.loss_table = Some(dir.path().join("missing.csv").to_string_lossy().into_owned());

    let report = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params)
        .unwrap();
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::LossTableUnavailable { .. })));
    assert!(!report.table.has_field("SYN3LossPotential"));
}

#[test]
fn test_loss_potential_and_ground_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let loss_path = dir.path().join("loss.csv");
    std::fs::write(
        &loss_path,
        "Depth,PotentialLoss,Size,SpaceUse\n0.5,1000,0,Residential\n2,8000,4,Residential\n",
    )
    .unwrap();

    let mut engine = three_level_engine();
    engine.insert(
        "dem",
        DatasetKind::Raster,
        [("1".to_string(), wet(10, 2.0, 4.0, 3.0))].into_iter().collect(),
    );

    let mut params = params(dir.path());
    params.loss_table = Some(loss_path.to_string_lossy().into_owned());
    params.dem = Some("dem".to_string());
    let report = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params)
        .unwrap();

    let table = &report.table;
    assert_relative_eq!(table.get("1", "SYN3LossPotential").unwrap(), 1000.0);
    // 8 flooded cells against a reference size of 4.
    assert_relative_eq!(table.get("2", "SYN3LossPotential").unwrap(), 16000.0);
    assert_relative_eq!(report.summary.rows[3].loss_potential, 17000.0);
    assert_eq!(table.get("1", "DEMMEAN"), Some(3.0));
    assert_eq!(table.get("2", "DEMMEAN"), None);
}

#[test]
fn test_no_ground_statistics_without_dem() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = three_level_engine();
    let report = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params(dir.path()))
        .unwrap();
    assert!(!report.table.has_field("DEMMEAN"));
}

#[test]
fn test_depth_derived_from_surface_and_dem() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new(DatasetKind::Polygon);
    engine.raster("surface", "wse_1", &[("1", wet(4, 2.5, 3.5, 3.0)), ("2", wet(4, 5.0, 5.0, 5.0))]);
    engine.raster("surface", "wse_2", &[("1", wet(4, 4.0, 6.0, 5.0)), ("2", wet(4, 6.0, 6.0, 6.0))]);
    engine.insert(
        "dem",
        DatasetKind::Raster,
        [
            ("1".to_string(), wet(10, 3.0, 3.0, 3.0)),
            ("2".to_string(), wet(10, 7.0, 7.0, 7.0)),
        ]
        .into_iter()
        .collect(),
    );

    let mut params = params(dir.path());
    params.depth_workspace = None;
    params.surface_workspace = Some("surface".to_string());
    params.dem = Some("dem".to_string());
    let report = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params)
        .unwrap();

    assert!(report.warnings.contains(&Warning::RelativeDepth));
    assert_eq!(report.depth_list.labels(), vec!["1", "2"]);
    assert_eq!(report.table.get("1", "SYNSlider"), Some(0.0));
    assert_relative_eq!(report.table.get("1", "SYN2MEAN").unwrap(), 2.0);
    assert_eq!(report.table.get("2", "SYNSlider"), None);
    assert!(!engine.exists("memory/depth_1"));
}

#[test]
fn test_no_depth_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new(DatasetKind::Polygon);
    let err = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params(dir.path()))
        .unwrap_err();
    assert!(matches!(err, ExposureError::NoDepthData));
}

#[test]
fn test_point_features_get_default_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = three_level_engine();
    if let Some(features) = engine.datasets.get_mut("buildings") {
        features.kind = DatasetKind::Point;
    }
    ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params(dir.path()))
        .unwrap();
    assert_eq!(engine.buffers, vec![1.0]);
}

#[test]
fn test_multipatch_without_engine_support() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = three_level_engine();
    if let Some(features) = engine.datasets.get_mut("buildings") {
        features.kind = DatasetKind::Multipatch;
    }
    let err = ExposurePipeline::new(&mut engine, RunConfig::default())
        .run(&params(dir.path()))
        .unwrap_err();
    assert!(matches!(err, ExposureError::MissingCapability { .. }));
}
