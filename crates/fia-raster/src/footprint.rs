//! Footprint operations on zone grids: buffering and resampling.

use crate::zonal::zone_id;
use crate::{Grid, GridTransform, RasterError, Result};

/// Buffer every zone outward by `distance` map units.
///
/// The grid is padded so buffered zones are not clipped at the edge. An
/// unzoned cell takes the id of the nearest zone cell whose center lies
/// within `distance` of its center; ties go to the first neighbour in scan
/// order. Zoned cells keep their id.
pub fn dilate_zones(zones: &Grid, distance: f64) -> Result<Grid> {
    if !distance.is_finite() || distance < 0.0 {
        return Err(RasterError::InvalidCellSize(distance));
    }
    let t = zones.transform();
    let pad_x = (distance / t.cell_width).ceil() as i64;
    let pad_y = (distance / t.cell_height).ceil() as i64;
    if pad_x == 0 && pad_y == 0 {
        return Ok(zones.clone());
    }

    let offsets = disk_offsets(distance, t.cell_width, t.cell_height, pad_x, pad_y);
    let (width, height) = zones.dimensions();
    let out_width = width as i64 + 2 * pad_x;
    let out_height = height as i64 + 2 * pad_y;
    let transform = GridTransform {
        origin_x: t.origin_x - pad_x as f64 * t.cell_width,
        origin_y: t.origin_y + pad_y as f64 * t.cell_height,
        ..t
    };

    let source = |col: i64, row: i64| -> Option<i64> {
        let (c, r) = (col - pad_x, row - pad_y);
        if c < 0 || r < 0 || c >= width as i64 || r >= height as i64 {
            return None;
        }
        zone_id(zones, c as u32, r as u32)
    };

    let mut data = vec![0.0f32; (out_width * out_height) as usize];
    for row in 0..out_height {
        for col in 0..out_width {
            let id = offsets
                .iter()
                .find_map(|(dc, dr)| source(col + dc, row + dr));
            if let Some(id) = id {
                data[(row * out_width + col) as usize] = id as f32;
            }
        }
    }

    Ok(Grid::from_vec(data, out_width as u32, out_height as u32, transform)?
        .with_spatial_ref(zones.spatial_ref().clone()))
}

/// Cell offsets within `distance`, nearest first, starting with `(0, 0)`.
fn disk_offsets(
    distance: f64,
    cell_width: f64,
    cell_height: f64,
    pad_x: i64,
    pad_y: i64,
) -> Vec<(i64, i64)> {
    let mut offsets: Vec<(f64, (i64, i64))> = Vec::new();
    for dr in -pad_y..=pad_y {
        for dc in -pad_x..=pad_x {
            let dx = dc as f64 * cell_width;
            let dy = dr as f64 * cell_height;
            let d = (dx * dx + dy * dy).sqrt();
            if d <= distance + 1e-9 {
                offsets.push((d, (dc, dr)));
            }
        }
    }
    offsets.sort_by(|a, b| a.0.total_cmp(&b.0));
    offsets.into_iter().map(|(_, offset)| offset).collect()
}

/// Resample a zone grid to square cells of `cell_size` over the same extent
/// using nearest-cell sampling.
pub fn resample_zones(zones: &Grid, cell_size: f64) -> Result<Grid> {
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(RasterError::InvalidCellSize(cell_size));
    }
    let t = zones.transform();
    let (width, height) = zones.dimensions();
    let extent_x = width as f64 * t.cell_width;
    let extent_y = height as f64 * t.cell_height;
    let out_width = ((extent_x / cell_size).ceil() as u32).max(1);
    let out_height = ((extent_y / cell_size).ceil() as u32).max(1);

    let transform = GridTransform::new(t.origin_x, t.origin_y, cell_size);
    let mut data = vec![0.0f32; (out_width as usize) * (out_height as usize)];
    for row in 0..out_height {
        for col in 0..out_width {
            let x = t.origin_x + (col as f64 + 0.5) * cell_size;
            let y = t.origin_y - (row as f64 + 0.5) * cell_size;
            if let Some(id) = zones
                .cell_at(x, y)
                .and_then(|(c, r)| zone_id(zones, c, r))
            {
                data[(row as usize) * (out_width as usize) + col as usize] = id as f32;
            }
        }
    }

    Ok(Grid::from_vec(data, out_width, out_height, transform)?
        .with_spatial_ref(zones.spatial_ref().clone()))
}
