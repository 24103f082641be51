//! Zonal statistics over a zone grid of integer ids.
//!
//! Each cell of the zone grid whose value is a non-zero integer belongs to
//! that zone. The value grid is sampled at the zone cell centers, so the two
//! grids need not share a resolution or extent. Zone `0` and no-data cells
//! belong to no zone.

use crate::Grid;
use std::collections::BTreeMap;

/// Statistics of one zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonalResult {
    /// Number of zone cells with a value.
    pub count: usize,
    /// Sum of values.
    pub sum: f64,
    /// Mean value.
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// `max - min`.
    pub range: f64,
    /// `count` times the zone cell area.
    pub area: f64,
}

/// Zone id of a cell, if the cell belongs to a zone.
pub fn zone_id(zones: &Grid, col: u32, row: u32) -> Option<i64> {
    let value = zones.get(col, row)?;
    let id = value.round() as i64;
    (id != 0).then_some(id)
}

/// Number of cells of every zone present in the grid.
pub fn zone_cell_counts(zones: &Grid) -> BTreeMap<i64, usize> {
    let (width, height) = zones.dimensions();
    let mut counts = BTreeMap::new();
    for row in 0..height {
        for col in 0..width {
            if let Some(id) = zone_id(zones, col, row) {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Compute statistics of `values` for each zone of `zones`.
///
/// Zones without any value cell are absent from the result.
pub fn zonal_statistics(zones: &Grid, values: &Grid) -> BTreeMap<i64, ZonalResult> {
    let (width, height) = zones.dimensions();
    let mut zone_values: BTreeMap<i64, Vec<f64>> = BTreeMap::new();

    for row in 0..height {
        for col in 0..width {
            let Some(id) = zone_id(zones, col, row) else {
                continue;
            };
            let (x, y) = zones.cell_center(col, row);
            if let Some(value) = values.sample(x, y) {
                zone_values.entry(id).or_default().push(value as f64);
            }
        }
    }

    let cell_area = zones.cell_area();
    zone_values
        .into_iter()
        .map(|(id, vals)| (id, summarize(&vals, cell_area)))
        .collect()
}

fn summarize(vals: &[f64], cell_area: f64) -> ZonalResult {
    let count = vals.len();
    let sum: f64 = vals.iter().sum();
    let mean = sum / count as f64;
    let var = vals.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
    let min = vals.iter().copied().fold(f64::INFINITY, f64::min);
    let max = vals.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    ZonalResult {
        count,
        sum,
        mean,
        std_dev: var.sqrt(),
        min,
        max,
        range: max - min,
        area: count as f64 * cell_area,
    }
}
