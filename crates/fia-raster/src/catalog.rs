//! Raster catalog for a workspace of GeoTIFF files with lazy loading.

use crate::{Grid, RasterError, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Catalog of named rasters backed by GeoTIFF files.
///
/// The `RasterCatalog` indexes available rasters by scanning a directory, but
/// only loads cell data into memory when a raster is requested. Dataset names
/// are the file stems, so `depth_1.tif` is available as `depth_1`.
///
/// This type is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```no_run
/// use fia_raster::RasterCatalog;
///
/// let mut catalog = RasterCatalog::new();
/// catalog.add_directory("depth")?;  // Fast - just indexes files
///
/// let grid = catalog.get("depth_1")?;
/// println!("minimum depth: {:?}", grid.minimum());
/// # Ok::<(), fia_raster::RasterError>(())
/// ```
#[derive(Debug)]
pub struct RasterCatalog {
    /// Available raster files indexed by dataset name.
    paths: BTreeMap<String, PathBuf>,
    /// Cache of loaded grids.
    cache: RwLock<GridCache>,
    /// Maximum number of grids to keep in cache.
    max_cache_size: usize,
}

/// LRU cache for loaded grids.
#[derive(Debug)]
struct GridCache {
    grids: HashMap<String, Arc<Grid>>,
    /// Access order for LRU eviction (most recently used at the back).
    access_order: Vec<String>,
}

impl GridCache {
    fn new() -> Self {
        Self {
            grids: HashMap::new(),
            access_order: Vec::new(),
        }
    }

    /// Look up a grid and mark it as most recently used.
    fn get(&mut self, name: &str) -> Option<Arc<Grid>> {
        let grid = self.grids.get(name).cloned()?;
        self.touch(name);
        Some(grid)
    }

    /// Mark a name as recently used.
    fn touch(&mut self, name: &str) {
        if let Some(pos) = self.access_order.iter().position(|k| k == name) {
            let key = self.access_order.remove(pos);
            self.access_order.push(key);
        }
    }

    fn insert(&mut self, name: String, grid: Arc<Grid>, max_size: usize) {
        if self.grids.contains_key(&name) {
            self.touch(&name);
            return;
        }

        while self.grids.len() >= max_size && !self.access_order.is_empty() {
            let oldest = self.access_order.remove(0);
            self.grids.remove(&oldest);
        }

        self.grids.insert(name.clone(), grid);
        self.access_order.push(name);
    }

    fn remove(&mut self, name: &str) {
        self.grids.remove(name);
        self.access_order.retain(|k| k != name);
    }

    fn len(&self) -> usize {
        self.grids.len()
    }

    fn clear(&mut self) {
        self.grids.clear();
        self.access_order.clear();
    }
}

impl Default for RasterCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Default maximum number of grids to cache.
const DEFAULT_MAX_CACHE_SIZE: usize = 16;

impl RasterCatalog {
    /// Create a new empty catalog with default cache size.
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_MAX_CACHE_SIZE)
    }

    /// Create a new empty catalog with a specified cache size.
    pub fn with_cache_size(max_cache_size: usize) -> Self {
        Self {
            paths: BTreeMap::new(),
            cache: RwLock::new(GridCache::new()),
            max_cache_size: max_cache_size.max(1),
        }
    }

    /// Create a catalog indexing every GeoTIFF in `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.add_directory(dir)?;
        Ok(catalog)
    }

    /// Add all GeoTIFF files from a directory to the index.
    ///
    /// Files must have a `.tif` or `.tiff` extension. Returns the number of
    /// rasters indexed.
    pub fn add_directory<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize> {
        let dir = dir.as_ref();
        let mut count = 0;

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if is_geotiff(&path) && self.add_file(&path).is_ok() {
                count += 1;
            }
        }

        Ok(count)
    }

    /// Add a single GeoTIFF file to the index without loading it.
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P) -> Result<String> {
        let path = path.as_ref();
        let name = dataset_name(path)?;
        self.paths.insert(name.clone(), path.to_path_buf());
        Ok(name)
    }

    /// Names of all indexed rasters, sorted.
    pub fn names(&self) -> Vec<String> {
        self.paths.keys().cloned().collect()
    }

    /// Whether a raster with this name is indexed.
    pub fn contains(&self, name: &str) -> bool {
        self.paths.contains_key(name)
    }

    /// File path of an indexed raster.
    pub fn path(&self, name: &str) -> Option<&Path> {
        self.paths.get(name).map(PathBuf::as_path)
    }

    /// Get a raster by name, loading it on demand.
    pub fn get(&self, name: &str) -> Result<Arc<Grid>> {
        {
            let mut cache = self.cache.write().map_err(|_| RasterError::CacheLockPoisoned)?;
            if let Some(grid) = cache.get(name) {
                return Ok(grid);
            }
        }

        let path = self
            .paths
            .get(name)
            .ok_or_else(|| RasterError::NotFound(name.to_string()))?;
        let grid = Arc::new(Grid::from_file(path)?);

        let mut cache = self.cache.write().map_err(|_| RasterError::CacheLockPoisoned)?;
        cache.insert(name.to_string(), Arc::clone(&grid), self.max_cache_size);
        Ok(grid)
    }

    /// Drop a raster from the index and the cache, optionally deleting its file.
    ///
    /// Returns `false` when the name was not indexed.
    pub fn remove(&mut self, name: &str, delete_file: bool) -> Result<bool> {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(name);
        }
        match self.paths.remove(name) {
            Some(path) => {
                if delete_file && path.exists() {
                    std::fs::remove_file(&path)?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Number of indexed rasters.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the catalog indexes no rasters.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Number of grids currently held in memory.
    pub fn loaded_count(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Clear all loaded grids from memory; they remain indexed.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

fn is_geotiff(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
}

/// Dataset name of a raster file (its stem).
pub fn dataset_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RasterError::InvalidFilename(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GridTransform;

    fn write_grid(dir: &Path, name: &str, value: f32) {
        let grid = Grid::from_vec(vec![value; 4], 2, 2, GridTransform::new(0.0, 2.0, 1.0)).unwrap();
        grid.write_file(dir.join(format!("{}.tif", name))).unwrap();
    }

    #[test]
    fn test_dataset_name() {
        assert_eq!(dataset_name(Path::new("/a/depth_3d_1.tif")).unwrap(), "depth_3d_1");
        assert!(dataset_name(Path::new("/")).is_err());
    }

    #[test]
    fn test_index_and_lazy_load() {
        let dir = tempfile::tempdir().unwrap();
        write_grid(dir.path(), "depth_1", 1.0);
        write_grid(dir.path(), "depth_2", 2.0);
        std::fs::write(dir.path().join("notes.txt"), "not a raster").unwrap();

        let catalog = RasterCatalog::open(dir.path()).unwrap();
        assert_eq!(catalog.names(), vec!["depth_1", "depth_2"]);
        assert_eq!(catalog.loaded_count(), 0);

        let grid = catalog.get("depth_2").unwrap();
        assert_eq!(grid.get(0, 0), Some(2.0));
        assert_eq!(catalog.loaded_count(), 1);

        assert!(matches!(catalog.get("depth_9"), Err(RasterError::NotFound(_))));
    }

    #[test]
    fn test_cache_eviction() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            write_grid(dir.path(), &format!("g{}", i), i as f32);
        }
        let mut catalog = RasterCatalog::with_cache_size(2);
        assert_eq!(catalog.add_directory(dir.path()).unwrap(), 3);

        for name in ["g0", "g1", "g2"] {
            catalog.get(name).unwrap();
        }
        assert_eq!(catalog.loaded_count(), 2);

        catalog.clear_cache();
        assert_eq!(catalog.loaded_count(), 0);
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            write_grid(dir.path(), &format!("g{}", i), i as f32);
        }
        let mut catalog = RasterCatalog::with_cache_size(2);
        catalog.add_directory(dir.path()).unwrap();

        catalog.get("g0").unwrap();
        catalog.get("g1").unwrap();
        // A hit on g0 makes g1 the eviction candidate.
        catalog.get("g0").unwrap();
        catalog.get("g2").unwrap();

        let cache = catalog.cache.read().unwrap();
        assert!(cache.grids.contains_key("g0"));
        assert!(!cache.grids.contains_key("g1"));
        assert!(cache.grids.contains_key("g2"));
    }

    #[test]
    fn test_remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        write_grid(dir.path(), "scratch", 0.0);
        let mut catalog = RasterCatalog::open(dir.path()).unwrap();

        assert!(catalog.remove("scratch", true).unwrap());
        assert!(!dir.path().join("scratch.tif").exists());
        assert!(!catalog.remove("scratch", true).unwrap());
        assert!(catalog.is_empty());
    }
}
