//! Checks of flooding data before a run.
//!
//! A usable raster has a supported cell type, a projected coordinate system
//! in meters or feet, and ideally a vertical unit.

use crate::grid_engine::spatial_reference;
use crate::Result;
use fia_raster::{dataset_name, Grid, RasterError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result of checking one raster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetCheck {
    pub name: String,
    pub path: PathBuf,
    pub coordinate_system: Option<String>,
    pub linear_unit: Option<String>,
    pub vertical_unit: Option<String>,
    /// Problems that prevent using the dataset.
    pub errors: Vec<String>,
    /// Problems that limit the output.
    pub warnings: Vec<String>,
}

impl DatasetCheck {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a single GeoTIFF.
pub fn check_raster(path: &Path) -> Result<DatasetCheck> {
    let mut check = DatasetCheck {
        name: dataset_name(path)?,
        path: path.to_path_buf(),
        coordinate_system: None,
        linear_unit: None,
        vertical_unit: None,
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    let grid = match Grid::from_file(path) {
        Ok(grid) => grid,
        Err(RasterError::UnsupportedDataType(kind)) => {
            check.errors.push(format!("unsupported data type {}", kind));
            return Ok(check);
        }
        Err(e) => {
            check.errors.push(e.to_string());
            return Ok(check);
        }
    };

    match spatial_reference(grid.spatial_ref()) {
        Some(sr) => {
            check.coordinate_system = Some(sr.name.clone());
            check.linear_unit = Some(sr.linear_unit.name().to_string());
            check.vertical_unit = sr.z_unit.as_ref().map(|u| u.name().to_string());
            if !sr.projected {
                check.errors.push("coordinate system is not projected".to_string());
            }
            if sr.linear_unit.canonical().is_none() {
                check
                    .errors
                    .push(format!("linear unit {} is not meters or feet", sr.linear_unit.name()));
            }
            if sr.z_unit.is_none() {
                check.warnings.push("no vertical units".to_string());
            }
        }
        None => check.errors.push("no coordinate system".to_string()),
    }
    if grid.minimum().is_none() {
        check.warnings.push("no data cells".to_string());
    }
    debug!("Checked {}: {} error(s)", path.display(), check.errors.len());
    Ok(check)
}

/// Check files and every GeoTIFF of directories, in path order.
pub fn check_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<DatasetCheck>> {
    let mut files = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<_>>()?;
            entries.retain(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
            });
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.to_path_buf());
        }
    }
    files.iter().map(|f| check_raster(f)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fia_raster::{GeoUnit, GridSpatialRef, GridTransform};

    fn write(path: &Path, spatial_ref: GridSpatialRef) {
        Grid::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2, GridTransform::new(0.0, 2.0, 1.0))
            .unwrap()
            .with_spatial_ref(spatial_ref)
            .write_file(path)
            .unwrap();
    }

    #[test]
    fn test_projected_raster_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depth_1.tif");
        write(&path, GridSpatialRef::projected(2248, GeoUnit::FootUs, Some(GeoUnit::FootUs)));

        let check = check_raster(&path).unwrap();
        assert!(check.passed());
        assert!(check.warnings.is_empty());
        assert_eq!(check.coordinate_system.as_deref(), Some("EPSG:2248"));
        assert_eq!(check.vertical_unit.as_deref(), Some("Foot_US"));
    }

    #[test]
    fn test_directory_check() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("a.tif"), GridSpatialRef::projected(26918, GeoUnit::Meter, None));
        write(&dir.path().join("b.tif"), GridSpatialRef::default());
        std::fs::write(dir.path().join("notes.txt"), "not a raster").unwrap();

        let checks = check_paths(&[dir.path()]).unwrap();
        assert_eq!(checks.len(), 2);
        assert!(checks[0].passed());
        assert_eq!(checks[0].warnings, vec!["no vertical units"]);
        assert!(!checks[1].passed());
    }

    #[test]
    fn test_multi_band_raster_fails() {
        use tiff::encoder::{colortype, TiffEncoder};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.tif");
        let file = std::fs::File::create(&path).unwrap();
        TiffEncoder::new(file)
            .unwrap()
            .write_image::<colortype::RGB8>(2, 2, &[0u8; 12])
            .unwrap();

        let check = check_raster(&path).unwrap();
        assert!(!check.passed());
        assert!(check.errors[0].starts_with("unsupported data type"));
    }
}
