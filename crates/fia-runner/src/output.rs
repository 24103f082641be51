//! Output files of a run: exposure table, level summary and JSON report.

use crate::Result;
use chrono::{DateTime, Utc};
use fia_exposure::{ExposureReport, LevelSummary, ProcessingEntry, Warning};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Path of the level summary table next to the exposure table:
/// `out/exposure.csv` becomes `out/exposure_stats.csv`.
pub fn stats_path(output_table: &Path) -> PathBuf {
    let stem = output_table
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match output_table.extension() {
        Some(ext) => format!("{}_stats.{}", stem, ext.to_string_lossy()),
        None => format!("{}_stats", stem),
    };
    output_table.with_file_name(file_name)
}

/// Machine-readable record of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub risk_type: String,
    pub attribute_base_name: String,
    pub levels: Vec<f64>,
    pub level_labels: Vec<String>,
    pub depth_datasets: Vec<ProcessingEntry>,
    pub surface_datasets: Vec<ProcessingEntry>,
    pub feature_count: usize,
    pub pixel_area: f64,
    pub exposed_count: usize,
    pub summary: LevelSummary,
    pub warnings: Vec<Warning>,
    pub output_table: PathBuf,
    pub summary_table: PathBuf,
}

impl RunReport {
    pub fn new(report: &ExposureReport, output_table: &Path) -> Self {
        let spec = &report.risk_levels;
        Self {
            generated_at: Utc::now(),
            risk_type: spec.risk_type.clone(),
            attribute_base_name: spec.attribute_base_name.clone(),
            levels: spec.levels.clone(),
            level_labels: spec.level_labels.clone(),
            depth_datasets: report.depth_list.entries.clone(),
            surface_datasets: report
                .surface_list
                .as_ref()
                .map(|l| l.entries.clone())
                .unwrap_or_default(),
            feature_count: report.table.len(),
            pixel_area: report.pixel_area,
            exposed_count: report.summary.rows.last().map(|r| r.number_affected).unwrap_or(0),
            summary: report.summary.clone(),
            warnings: report.warnings.clone(),
            output_table: output_table.to_path_buf(),
            summary_table: stats_path(output_table),
        }
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Write the exposure table, its summary and optionally the JSON report.
pub fn write_outputs(report: &ExposureReport, output_table: &Path, report_path: Option<&Path>) -> Result<RunReport> {
    if let Some(dir) = output_table.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    report.table.write_csv_path(output_table)?;
    let run_report = RunReport::new(report, output_table);
    report.summary.write_csv_path(&run_report.summary_table)?;
    info!(
        "Wrote {} and {}",
        output_table.display(),
        run_report.summary_table.display()
    );

    if let Some(path) = report_path {
        run_report.write_json(path)?;
        info!("Wrote report {}", path.display());
    }
    Ok(run_report)
}
