//! # fia-runner
//!
//! Runs exposure jobs against GeoTIFF data: builds a [`GridEngine`] from the
//! run configuration, drives the exposure pipeline and writes the outputs.

pub mod check;
mod error;
pub mod grid_engine;
pub mod job;
pub mod output;

pub use error::{Result, RunnerError};
pub use grid_engine::{GridEngine, ScratchStore};
pub use job::Job;
pub use output::{stats_path, write_outputs, RunReport};

use fia_exposure::{DatasetKind, ExposurePipeline, RunConfig};
use std::path::{Path, PathBuf};
use tracing::info;

/// Engine for a run: in memory, or writing intermediates to the scratch
/// workspace (the system temp directory when none is set).
pub fn engine_for(run: &RunConfig) -> GridEngine {
    if run.use_in_memory {
        return GridEngine::in_memory();
    }
    let dir = run
        .scratch_workspace
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("fia-scratch"));
    GridEngine::new(ScratchStore::Directory(dir))
}

/// Run one job and write its outputs.
pub fn run_job(job: &Job) -> Result<RunReport> {
    let mut engine = engine_for(&job.run);
    engine.add_features(job.params.features.clone(), DatasetKind::Polygon);

    let report = ExposurePipeline::new(&mut engine, job.run.clone()).run(&job.params)?;
    info!(
        "{} features, {} warning(s)",
        report.table.len(),
        report.warnings.len()
    );
    write_outputs(
        &report,
        Path::new(&job.params.output_table),
        job.report.as_deref().map(Path::new),
    )
}
