//! GeoTIFF-backed implementation of the exposure engine traits.
//!
//! Workspaces are directories of `.tif` files, opened lazily as
//! [`RasterCatalog`]s, and a dataset path is `<workspace>/<stem>` or the path
//! of a GeoTIFF file. Feature classes are zone grids whose cell values are
//! feature ids; they must be registered with [`GridEngine::add_features`].
//!
//! Intermediate datasets live in memory under the `memory/` prefix, or as
//! GeoTIFF files in a scratch directory.

use fia_exposure::{
    DatasetInfo, DatasetKind, EngineError, EngineResult, GeometryEngine, LinearUnit, RasterAlgebra,
    RasterStore, SpatialReference, ZonalStatsEngine, ZoneStats,
};
use fia_raster::{algebra, footprint, zonal, GeoUnit, Grid, GridSpatialRef, RasterCatalog, RasterError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Path prefix of datasets held in memory.
pub const MEMORY_PREFIX: &str = "memory/";

/// Where intermediate datasets are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScratchStore {
    Memory,
    Directory(PathBuf),
}

/// Raster engine over GeoTIFF files.
#[derive(Debug)]
pub struct GridEngine {
    scratch: ScratchStore,
    memory: BTreeMap<String, Arc<Grid>>,
    /// Feature classes by path.
    features: BTreeMap<String, DatasetKind>,
    catalogs: RwLock<BTreeMap<PathBuf, Arc<RasterCatalog>>>,
}

fn raster_error(e: RasterError) -> EngineError {
    match e {
        RasterError::NotFound(name) => EngineError::NotFound(name),
        other => EngineError::Failed(other.to_string()),
    }
}

fn linear_unit(unit: GeoUnit) -> LinearUnit {
    match unit {
        GeoUnit::Meter => LinearUnit::Meter,
        GeoUnit::Foot => LinearUnit::Foot,
        GeoUnit::FootUs => LinearUnit::FootUs,
        GeoUnit::Other(code) => LinearUnit::Other(format!("EPSG:{}", code)),
    }
}

/// Coordinate system of a grid; `None` for grids without georeferencing keys.
pub fn spatial_reference(sr: &GridSpatialRef) -> Option<SpatialReference> {
    if !sr.projected && sr.projected_cs.is_none() && sr.linear_unit.is_none() {
        return None;
    }
    Some(SpatialReference {
        name: sr.name(),
        linear_unit: sr
            .linear_unit
            .map(linear_unit)
            .unwrap_or_else(|| LinearUnit::Other("unknown".to_string())),
        z_unit: sr.vertical_unit.map(linear_unit),
        projected: sr.projected,
    })
}

impl GridEngine {
    pub fn new(scratch: ScratchStore) -> Self {
        Self {
            scratch,
            memory: BTreeMap::new(),
            features: BTreeMap::new(),
            catalogs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Engine keeping intermediates in memory.
    pub fn in_memory() -> Self {
        Self::new(ScratchStore::Memory)
    }

    /// Register a zone GeoTIFF as a feature class of the given kind.
    pub fn add_features(&mut self, path: impl Into<String>, kind: DatasetKind) {
        self.features.insert(path.into(), kind);
    }

    /// Number of datasets held in memory.
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    fn catalog(&self, dir: &Path) -> EngineResult<Arc<RasterCatalog>> {
        {
            let catalogs = self
                .catalogs
                .read()
                .map_err(|_| raster_error(RasterError::CacheLockPoisoned))?;
            if let Some(catalog) = catalogs.get(dir) {
                return Ok(Arc::clone(catalog));
            }
        }
        debug!("Indexing workspace {}", dir.display());
        let catalog = Arc::new(RasterCatalog::open(dir).map_err(raster_error)?);
        let mut catalogs = self
            .catalogs
            .write()
            .map_err(|_| raster_error(RasterError::CacheLockPoisoned))?;
        catalogs.insert(dir.to_path_buf(), Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Catalog and dataset name of a `<workspace>/<stem>` path.
    fn catalog_entry(&self, path: &str) -> Option<(Arc<RasterCatalog>, String)> {
        let path = Path::new(path);
        let dir = path.parent().filter(|d| d.is_dir())?;
        let name = path.file_name()?.to_str()?;
        let catalog = self.catalog(dir).ok()?;
        catalog.contains(name).then(|| (catalog, name.to_string()))
    }

    fn load(&self, path: &str) -> EngineResult<Arc<Grid>> {
        if let Some(grid) = self.memory.get(path) {
            return Ok(Arc::clone(grid));
        }
        if Path::new(path).is_file() {
            return Grid::from_file(path).map(Arc::new).map_err(raster_error);
        }
        match self.catalog_entry(path) {
            Some((catalog, name)) => catalog.get(&name).map_err(raster_error),
            None => Err(EngineError::NotFound(path.to_string())),
        }
    }

    fn store(&mut self, output: &str, grid: Grid) -> EngineResult<()> {
        if output.starts_with(MEMORY_PREFIX) {
            self.memory.insert(output.to_string(), Arc::new(grid));
            return Ok(());
        }
        if let Some(dir) = Path::new(output).parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| EngineError::Failed(e.to_string()))?;
        }
        grid.write_file(output).map_err(raster_error)
    }

    fn feature_kind(&self, path: &str) -> Option<DatasetKind> {
        self.features.get(path).copied()
    }
}

impl RasterStore for GridEngine {
    fn list_rasters(&self, workspace: &str) -> EngineResult<Vec<String>> {
        Ok(self.catalog(Path::new(workspace))?.names())
    }

    fn list_multipatches(&self, _workspace: &str) -> EngineResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn exists(&self, path: &str) -> bool {
        self.memory.contains_key(path) || Path::new(path).exists() || self.catalog_entry(path).is_some()
    }

    fn describe(&self, path: &str) -> EngineResult<DatasetInfo> {
        let grid = self.load(path)?;
        Ok(DatasetInfo {
            kind: self.feature_kind(path).unwrap_or(DatasetKind::Raster),
            spatial_reference: spatial_reference(grid.spatial_ref()),
        })
    }

    fn raster_minimum(&self, path: &str) -> EngineResult<Option<f64>> {
        Ok(self.load(path)?.minimum().map(f64::from))
    }

    fn cell_area(&self, path: &str) -> EngineResult<f64> {
        Ok(self.load(path)?.cell_area())
    }

    fn delete(&mut self, path: &str) -> EngineResult<()> {
        self.features.remove(path);
        if self.memory.remove(path).is_some() {
            return Ok(());
        }
        if Path::new(path).is_file() {
            std::fs::remove_file(path).map_err(|e| EngineError::Failed(e.to_string()))?;
        }
        Ok(())
    }

    fn scratch_path(&self, name: &str) -> String {
        match &self.scratch {
            ScratchStore::Memory => format!("{}{}", MEMORY_PREFIX, name),
            ScratchStore::Directory(dir) => dir.join(format!("{}.tif", name)).to_string_lossy().into_owned(),
        }
    }
}

impl ZonalStatsEngine for GridEngine {
    fn zonal_statistics(&self, zones: &str, values: &str) -> EngineResult<BTreeMap<String, ZoneStats>> {
        let zones = self.load(zones)?;
        let values = self.load(values)?;
        Ok(zonal::zonal_statistics(&zones, &values)
            .into_iter()
            .map(|(id, r)| {
                let stats = ZoneStats {
                    area: r.area,
                    min: r.min,
                    max: r.max,
                    range: r.range,
                    mean: r.mean,
                    std: r.std_dev,
                    sum: r.sum,
                    count: r.count as u64,
                };
                (id.to_string(), stats)
            })
            .collect())
    }
}

impl GeometryEngine for GridEngine {
    fn copy_features(&mut self, input: &str, output: &str) -> EngineResult<()> {
        let grid = self.load(input)?;
        self.store(output, Grid::clone(&grid))?;
        let kind = self.feature_kind(input).unwrap_or(DatasetKind::Polygon);
        self.features.insert(output.to_string(), kind);
        Ok(())
    }

    fn footprints(&mut self, multipatch: &str, _output: &str) -> EngineResult<()> {
        Err(EngineError::Unsupported(format!(
            "multipatch footprints of {} need a 3D engine",
            multipatch
        )))
    }

    fn buffer(&mut self, input: &str, distance: f64, output: &str) -> EngineResult<()> {
        let grid = self.load(input)?;
        let buffered = footprint::dilate_zones(&grid, distance).map_err(raster_error)?;
        self.store(output, buffered)?;
        self.features.insert(output.to_string(), DatasetKind::Polygon);
        Ok(())
    }

    /// Areas come from zone cell counts; the zone value is the feature id, so
    /// `id_field` is not consulted.
    fn feature_areas(&self, features: &str, _id_field: &str) -> EngineResult<Vec<(String, f64)>> {
        let grid = self.load(features)?;
        let cell_area = grid.cell_area();
        Ok(zonal::zone_cell_counts(&grid)
            .into_iter()
            .map(|(id, count)| (id.to_string(), count as f64 * cell_area))
            .collect())
    }

    fn rasterize_footprints(
        &mut self,
        features: &str,
        _id_field: &str,
        cell_size: f64,
        output: &str,
    ) -> EngineResult<()> {
        let grid = self.load(features)?;
        let zones = footprint::resample_zones(&grid, cell_size).map_err(raster_error)?;
        self.store(output, zones)
    }

    fn multipatch_to_raster(&mut self, multipatch: &str, _cell_size: f64, _output: &str) -> EngineResult<()> {
        Err(EngineError::Unsupported(format!(
            "rasterizing multipatch {} needs a 3D engine",
            multipatch
        )))
    }
}

impl RasterAlgebra for GridEngine {
    fn minus(&mut self, a: &str, b: &str, output: &str) -> EngineResult<()> {
        let (a, b) = (self.load(a)?, self.load(b)?);
        let difference = algebra::minus(&a, &b);
        self.store(output, difference)
    }

    fn set_null_at_or_below(&mut self, input: &str, threshold: f64, output: &str) -> EngineResult<()> {
        let input = self.load(input)?;
        let grid = algebra::set_null_at_or_below(&input, threshold as f32);
        self.store(output, grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fia_raster::GridTransform;

    fn state_plane() -> GridSpatialRef {
        GridSpatialRef::projected(2248, GeoUnit::FootUs, Some(GeoUnit::FootUs))
    }

    fn write(dir: &Path, name: &str, data: Vec<f32>) -> String {
        let path = dir.join(format!("{}.tif", name));
        Grid::from_vec(data, 2, 2, GridTransform::new(0.0, 4.0, 2.0))
            .unwrap()
            .with_spatial_ref(state_plane())
            .write_file(&path)
            .unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_workspace_listing_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "depth_1", vec![0.5, 1.0, 0.0, 2.0]);
        write(dir.path(), "depth_2", vec![1.5, 2.0, 1.0, 3.0]);
        let workspace = dir.path().to_string_lossy().into_owned();

        let engine = GridEngine::in_memory();
        assert_eq!(engine.list_rasters(&workspace).unwrap(), vec!["depth_1", "depth_2"]);

        let dataset = format!("{}/depth_2", workspace);
        assert!(engine.exists(&dataset));
        assert!(!engine.exists(&format!("{}/depth_3", workspace)));
        assert_eq!(engine.raster_minimum(&dataset).unwrap(), Some(1.0));
        assert_relative_eq!(engine.cell_area(&dataset).unwrap(), 4.0);

        let info = engine.describe(&dataset).unwrap();
        assert_eq!(info.kind, DatasetKind::Raster);
        let sr = info.spatial_reference.unwrap();
        assert_eq!(sr.name, "EPSG:2248");
        assert_eq!(sr.linear_unit, LinearUnit::FootUs);
        assert!(sr.projected);
    }

    #[test]
    fn test_features_and_zonal_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let features = write(dir.path(), "buildings", vec![1.0, 1.0, 0.0, 2.0]);
        let depth = write(dir.path(), "depth", vec![0.5, 1.5, 3.0, 2.0]);

        let mut engine = GridEngine::in_memory();
        engine.add_features(features.clone(), DatasetKind::Polygon);
        assert_eq!(engine.describe(&features).unwrap().kind, DatasetKind::Polygon);

        let areas = engine.feature_areas(&features, "OBJECTID").unwrap();
        assert_eq!(areas, vec![("1".to_string(), 8.0), ("2".to_string(), 4.0)]);

        let zones = engine.scratch_path("zones");
        engine.rasterize_footprints(&features, "OBJECTID", 1.0, &zones).unwrap();
        assert_relative_eq!(engine.cell_area(&zones).unwrap(), 1.0);

        let stats = engine.zonal_statistics(&zones, &depth).unwrap();
        assert_eq!(stats["1"].count, 8);
        assert_relative_eq!(stats["1"].mean, 1.0);
        assert_relative_eq!(stats["2"].max, 2.0);

        engine.delete(&zones).unwrap();
        assert!(!engine.exists(&zones));
        assert_eq!(engine.memory_len(), 0);
    }

    #[test]
    fn test_scratch_directory() {
        let dir = tempfile::tempdir().unwrap();
        let surface = write(dir.path(), "wse_1", vec![5.0, 5.0, 5.0, 5.0]);
        let dem = write(dir.path(), "dem", vec![4.0, 6.0, 5.0, 3.0]);

        let scratch = dir.path().join("scratch");
        let mut engine = GridEngine::new(ScratchStore::Directory(scratch.clone()));
        let difference = engine.scratch_path("difference");
        let depth = engine.scratch_path("depth");
        assert!(difference.starts_with(scratch.to_str().unwrap()));

        engine.minus(&surface, &dem, &difference).unwrap();
        engine.set_null_at_or_below(&difference, 0.0, &depth).unwrap();
        assert!(Path::new(&depth).is_file());
        assert_eq!(engine.raster_minimum(&depth).unwrap(), Some(1.0));

        engine.delete(&depth).unwrap();
        assert!(!Path::new(&depth).exists());
    }

    #[test]
    fn test_algebra_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let surface = write(dir.path(), "wse_2", vec![3.0, 3.0, 3.0, 3.0]);
        let dem = write(dir.path(), "dem", vec![1.0, 3.5, 2.5, 3.0]);

        let mut engine = GridEngine::in_memory();
        let difference = engine.scratch_path("difference");
        let depth = engine.scratch_path("depth");
        engine.minus(&surface, &dem, &difference).unwrap();
        engine.set_null_at_or_below(&difference, 0.0, &depth).unwrap();

        assert_eq!(engine.memory_len(), 2);
        assert_eq!(engine.raster_minimum(&difference).unwrap(), Some(-0.5));
        assert_eq!(engine.raster_minimum(&depth).unwrap(), Some(0.5));
    }

    #[test]
    fn test_multipatch_unsupported() {
        let mut engine = GridEngine::in_memory();
        assert!(matches!(
            engine.footprints("buildings", "memory/out"),
            Err(EngineError::Unsupported(_))
        ));
    }

    #[test]
    fn test_spatial_reference_mapping() {
        assert_eq!(spatial_reference(&GridSpatialRef::default()), None);
        let sr = spatial_reference(&GridSpatialRef::projected(26918, GeoUnit::Meter, None)).unwrap();
        assert_eq!(sr.linear_unit, LinearUnit::Meter);
        assert_eq!(sr.z_unit, None);
    }
}
