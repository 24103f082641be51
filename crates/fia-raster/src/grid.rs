//! Single-band georeferenced grid.

use crate::{RasterError, Result};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::ColorType;

const GEOKEY_MODEL_TYPE: u16 = 1024;
const GEOKEY_PROJECTED_CS: u16 = 3072;
const GEOKEY_PROJ_LINEAR_UNITS: u16 = 3076;
const GEOKEY_VERTICAL_CS: u16 = 4096;
const GEOKEY_VERTICAL_UNITS: u16 = 4099;

const MODEL_TYPE_PROJECTED: u16 = 1;

/// Linear unit of a grid axis, from the EPSG unit codes used in GeoKeys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoUnit {
    /// EPSG 9001.
    Meter,
    /// EPSG 9002, international foot.
    Foot,
    /// EPSG 9003, US survey foot.
    FootUs,
    /// Any other EPSG unit code.
    Other(u16),
}

impl GeoUnit {
    /// Map an EPSG unit code.
    pub fn from_epsg(code: u16) -> Self {
        match code {
            9001 => GeoUnit::Meter,
            9002 => GeoUnit::Foot,
            9003 => GeoUnit::FootUs,
            other => GeoUnit::Other(other),
        }
    }

    /// EPSG unit code.
    pub fn epsg(&self) -> u16 {
        match self {
            GeoUnit::Meter => 9001,
            GeoUnit::Foot => 9002,
            GeoUnit::FootUs => 9003,
            GeoUnit::Other(code) => *code,
        }
    }
}

/// Coordinate system information read from the GeoKey directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridSpatialRef {
    /// EPSG code of the projected coordinate system, if any.
    pub projected_cs: Option<u16>,
    /// Whether the model type is projected.
    pub projected: bool,
    /// Horizontal linear unit.
    pub linear_unit: Option<GeoUnit>,
    /// EPSG code of the vertical coordinate system, if any.
    pub vertical_cs: Option<u16>,
    /// Vertical (z) unit.
    pub vertical_unit: Option<GeoUnit>,
}

impl GridSpatialRef {
    /// A projected coordinate system with the given EPSG code and units.
    pub fn projected(epsg: u16, linear_unit: GeoUnit, vertical_unit: Option<GeoUnit>) -> Self {
        Self {
            projected_cs: Some(epsg),
            projected: true,
            linear_unit: Some(linear_unit),
            vertical_cs: None,
            vertical_unit,
        }
    }

    /// Human readable name, `EPSG:<code>` when known.
    pub fn name(&self) -> String {
        match self.projected_cs {
            Some(code) => format!("EPSG:{}", code),
            None if self.projected => "user-defined projected".to_string(),
            None => "unknown".to_string(),
        }
    }

    fn from_geo_keys(keys: &[u16]) -> Self {
        let mut sr = GridSpatialRef::default();
        if keys.len() < 4 {
            return sr;
        }
        let count = keys[3] as usize;
        for entry in keys[4..].chunks_exact(4).take(count) {
            let (key, location, value) = (entry[0], entry[1], entry[3]);
            // Only values stored inline in the directory are interpreted.
            if location != 0 {
                continue;
            }
            match key {
                GEOKEY_MODEL_TYPE => sr.projected = value == MODEL_TYPE_PROJECTED,
                GEOKEY_PROJECTED_CS => sr.projected_cs = Some(value),
                GEOKEY_PROJ_LINEAR_UNITS => sr.linear_unit = Some(GeoUnit::from_epsg(value)),
                GEOKEY_VERTICAL_CS => sr.vertical_cs = Some(value),
                GEOKEY_VERTICAL_UNITS => sr.vertical_unit = Some(GeoUnit::from_epsg(value)),
                _ => {}
            }
        }
        sr
    }

    fn to_geo_keys(&self) -> Vec<u16> {
        let mut entries: Vec<[u16; 4]> = Vec::new();
        let model_type = if self.projected { MODEL_TYPE_PROJECTED } else { 2 };
        entries.push([GEOKEY_MODEL_TYPE, 0, 1, model_type]);
        if let Some(code) = self.projected_cs {
            entries.push([GEOKEY_PROJECTED_CS, 0, 1, code]);
        }
        if let Some(unit) = self.linear_unit {
            entries.push([GEOKEY_PROJ_LINEAR_UNITS, 0, 1, unit.epsg()]);
        }
        if let Some(code) = self.vertical_cs {
            entries.push([GEOKEY_VERTICAL_CS, 0, 1, code]);
        }
        if let Some(unit) = self.vertical_unit {
            entries.push([GEOKEY_VERTICAL_UNITS, 0, 1, unit.epsg()]);
        }

        let mut keys = vec![1, 1, 0, entries.len() as u16];
        for entry in entries {
            keys.extend_from_slice(&entry);
        }
        keys
    }
}

/// Affine placement of a north-up grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridTransform {
    /// X coordinate of the upper-left corner.
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner.
    pub origin_y: f64,
    /// Cell width in map units.
    pub cell_width: f64,
    /// Cell height in map units (positive, rows increase southward).
    pub cell_height: f64,
}

impl GridTransform {
    /// Create a transform with square cells.
    pub fn new(origin_x: f64, origin_y: f64, cell_size: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            cell_width: cell_size,
            cell_height: cell_size,
        }
    }
}

/// A single-band raster loaded from a GeoTIFF file or built in memory.
///
/// Values are `f32` in row-major order (north to south, west to east).
/// Cells equal to the no-data value, and NaN cells, carry no data.
#[derive(Debug, Clone)]
pub struct Grid {
    data: Vec<f32>,
    width: u32,
    height: u32,
    transform: GridTransform,
    no_data_value: Option<f32>,
    spatial_ref: GridSpatialRef,
}

impl Grid {
    /// Build a grid from row-major values.
    pub fn from_vec(
        data: Vec<f32>,
        width: u32,
        height: u32,
        transform: GridTransform,
    ) -> Result<Self> {
        if data.len() != (width as usize) * (height as usize) {
            return Err(RasterError::InvalidDimensions {
                width,
                height,
                actual: data.len(),
            });
        }
        for size in [transform.cell_width, transform.cell_height] {
            if !(size.is_finite() && size > 0.0) {
                return Err(RasterError::InvalidCellSize(size));
            }
        }
        Ok(Self {
            data,
            width,
            height,
            transform,
            no_data_value: None,
            spatial_ref: GridSpatialRef::default(),
        })
    }

    /// Create a grid with the same placement and every cell set to `value`.
    pub fn like(&self, value: f32) -> Self {
        Self {
            data: vec![value; self.data.len()],
            width: self.width,
            height: self.height,
            transform: self.transform,
            no_data_value: self.no_data_value,
            spatial_ref: self.spatial_ref.clone(),
        }
    }

    /// Set the no-data value.
    pub fn with_no_data(mut self, no_data: Option<f32>) -> Self {
        self.no_data_value = no_data;
        self
    }

    /// Set the coordinate system.
    pub fn with_spatial_ref(mut self, spatial_ref: GridSpatialRef) -> Self {
        self.spatial_ref = spatial_ref;
        self
    }

    /// Load a grid from a GeoTIFF file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let mut decoder = Decoder::new(file)?;

        // Flood rasters are often large single strips.
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024; // 1 GB
        limits.intermediate_buffer_size = 1024 * 1024 * 1024; // 1 GB
        limits.ifd_value_size = 1024 * 1024 * 1024;
        decoder = decoder.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        // Multi-band images would interleave samples into the cell array.
        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => {
                return Err(RasterError::UnsupportedDataType(format!(
                    "{:?} in {} (expected a single band)",
                    other,
                    path.display()
                )))
            }
        }
        let transform = Self::read_transform(&mut decoder, path)?;
        let spatial_ref = Self::read_spatial_ref(&mut decoder);
        let data = Self::decode_cells(&mut decoder)?;
        if data.len() != (width as usize) * (height as usize) {
            return Err(RasterError::UnsupportedDataType(format!(
                "{} decodes to {} samples for {}x{} cells",
                path.display(),
                data.len(),
                width,
                height
            )));
        }
        let no_data_value = Self::read_nodata_value(&mut decoder);

        Ok(Self {
            data,
            width,
            height,
            transform,
            no_data_value,
            spatial_ref,
        })
    }

    /// Read the grid placement from ModelTiepoint and ModelPixelScale.
    fn read_transform<R: std::io::Read + std::io::Seek>(
        decoder: &mut Decoder<R>,
        path: &Path,
    ) -> Result<GridTransform> {
        let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag);
        let pixel_scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag);

        if let (Ok(tiepoint), Ok(scale)) = (tiepoint, pixel_scale) {
            if tiepoint.len() >= 6 && scale.len() >= 2 {
                // Tiepoint format: [i, j, k, x, y, z]; (i, j) is normally the upper-left pixel.
                let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
                let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
                if scale[0] > 0.0 && scale[1] > 0.0 {
                    return Ok(GridTransform {
                        origin_x,
                        origin_y,
                        cell_width: scale[0],
                        cell_height: scale[1],
                    });
                }
            }
        }

        Err(RasterError::InvalidGeoTiff(format!(
            "{} has no ModelTiepoint/ModelPixelScale tags",
            path.display()
        )))
    }

    fn read_spatial_ref<R: std::io::Read + std::io::Seek>(
        decoder: &mut Decoder<R>,
    ) -> GridSpatialRef {
        decoder
            .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
            .map(|keys| GridSpatialRef::from_geo_keys(&keys))
            .unwrap_or_default()
    }

    fn decode_cells<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<Vec<f32>> {
        let result = decoder.read_image()?;

        match result {
            DecodingResult::F32(data) => Ok(data),
            DecodingResult::F64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::I16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::I32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::U16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::U32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::U8(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::I8(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::U64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::I64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        }
    }

    fn read_nodata_value<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
        decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim().trim_end_matches('\0').parse().ok())
    }

    /// Write the grid as a single-band `f32` GeoTIFF.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        let mut encoder = TiffEncoder::new(file)?;
        let mut image = encoder.new_image::<colortype::Gray32Float>(self.width, self.height)?;

        let scale = [self.transform.cell_width, self.transform.cell_height, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, self.transform.origin_x, self.transform.origin_y, 0.0];
        let geo_keys = self.spatial_ref.to_geo_keys();
        image
            .encoder()
            .write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
        image
            .encoder()
            .write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
        image
            .encoder()
            .write_tag(Tag::GeoKeyDirectoryTag, &geo_keys[..])?;
        if let Some(no_data) = self.no_data_value {
            let text = no_data.to_string();
            image
                .encoder()
                .write_tag(Tag::GdalNodata, text.as_str())?;
        }

        image.write_data(&self.data)?;
        Ok(())
    }

    /// Value at a cell, or `None` for no-data, NaN or out-of-range cells.
    pub fn get(&self, col: u32, row: u32) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let value = self.data[(row as usize) * (self.width as usize) + col as usize];
        if value.is_nan() {
            return None;
        }
        if let Some(nodata) = self.no_data_value {
            if (value - nodata).abs() < 0.001 {
                return None;
            }
        }
        Some(value)
    }

    /// Overwrite a cell; `None` writes the no-data marker.
    pub fn set(&mut self, col: u32, row: u32, value: Option<f32>) {
        if col >= self.width || row >= self.height {
            return;
        }
        let marker = self.no_data_value.unwrap_or(f32::NAN);
        self.data[(row as usize) * (self.width as usize) + col as usize] = value.unwrap_or(marker);
    }

    /// Map coordinates of the center of a cell.
    pub fn cell_center(&self, col: u32, row: u32) -> (f64, f64) {
        let t = &self.transform;
        (
            t.origin_x + (col as f64 + 0.5) * t.cell_width,
            t.origin_y - (row as f64 + 0.5) * t.cell_height,
        )
    }

    /// Cell containing a map coordinate, if inside the grid.
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(u32, u32)> {
        let t = &self.transform;
        let col = ((x - t.origin_x) / t.cell_width).floor();
        let row = ((t.origin_y - y) / t.cell_height).floor();
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }
        Some((col as u32, row as u32))
    }

    /// Value at a map coordinate using nearest-cell sampling.
    pub fn sample(&self, x: f64, y: f64) -> Option<f32> {
        let (col, row) = self.cell_at(x, y)?;
        self.get(col, row)
    }

    /// Smallest data value, `None` when the grid has no data cells.
    pub fn minimum(&self) -> Option<f32> {
        self.values().reduce(f32::min)
    }

    /// Largest data value, `None` when the grid has no data cells.
    pub fn maximum(&self) -> Option<f32> {
        self.values().reduce(f32::max)
    }

    /// Iterate over data cells only.
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.height).flat_map(move |row| (0..self.width).filter_map(move |col| self.get(col, row)))
    }

    /// Area of one cell in squared map units.
    pub fn cell_area(&self) -> f64 {
        self.transform.cell_width * self.transform.cell_height
    }

    /// Grid dimensions in cells.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Grid placement.
    pub fn transform(&self) -> GridTransform {
        self.transform
    }

    /// No-data value, if declared.
    pub fn no_data_value(&self) -> Option<f32> {
        self.no_data_value
    }

    /// Coordinate system of the grid.
    pub fn spatial_ref(&self) -> &GridSpatialRef {
        &self.spatial_ref
    }
}
