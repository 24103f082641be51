//! `fia` - flood impact exposure analysis from the command line.

use clap::{Args, Parser, Subcommand};
use fia_exposure::{parse_buffer_distance, ExposureParams, FieldSelection, NameOrdering, RiskTable};
use fia_runner::{check, run_job, Job, Result, RunnerError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// ============================================================================
// CLI structure
// ============================================================================

#[derive(Parser)]
#[command(name = "fia")]
#[command(author, version, about = "Flood impact exposure analysis", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attribute per-level flood exposure to features
    Attribute(AttributeArgs),
    /// Show the levels of a risk type
    Levels {
        /// Risk level table (CSV)
        risk_table: PathBuf,
        /// Risk type; lists the risk types when omitted
        risk_type: Option<String>,
        /// Treat the levels as percent (annual chance) levels
        #[arg(long)]
        percent_flood: Option<bool>,
    },
    /// Check flooding rasters for a projected coordinate system and units
    Check {
        /// GeoTIFF files or directories of them
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct AttributeArgs {
    /// Risk type key in the risk level table
    #[arg(required_unless_present = "config")]
    risk_type: Option<String>,
    /// Zone GeoTIFF whose cell values are feature ids
    #[arg(required_unless_present = "config")]
    features: Option<String>,
    /// Output exposure table (CSV)
    #[arg(required_unless_present = "config")]
    output: Option<String>,

    /// YAML job file; command line values override it
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Risk level table (CSV)
    #[arg(long, required_unless_present = "config")]
    risk_table: Option<String>,
    /// Workspace of water surface rasters
    #[arg(long)]
    surface: Option<String>,
    /// Workspace of depth rasters
    #[arg(long)]
    depth: Option<String>,
    /// Feature id field
    #[arg(long)]
    id_field: Option<String>,
    /// Buffer distance in map units; `,` is accepted as decimal separator
    #[arg(long)]
    buffer: Option<String>,
    /// Cell size for rasterizing footprints
    #[arg(long)]
    tolerance: Option<f64>,
    /// Ground elevation raster
    #[arg(long)]
    dem: Option<String>,
    /// Depth-damage table (CSV)
    #[arg(long)]
    loss_table: Option<String>,
    /// Treat the levels as percent (annual chance) levels
    #[arg(long)]
    percent_flood: Option<bool>,
    /// Write a JSON run report
    #[arg(long)]
    report: Option<String>,
    /// Keep intermediate datasets
    #[arg(long)]
    keep_intermediate: bool,
    /// Write intermediate datasets to this directory instead of memory
    #[arg(long)]
    scratch: Option<String>,
    /// Compare digit runs numerically when ordering dataset names
    #[arg(long)]
    numeric_names: bool,

    #[command(flatten)]
    fields: FieldFlags,
}

/// Output fields that can be switched off.
#[derive(Args)]
struct FieldFlags {
    #[arg(long)]
    no_min: bool,
    #[arg(long)]
    no_max: bool,
    #[arg(long)]
    no_range: bool,
    #[arg(long)]
    no_mean: bool,
    #[arg(long)]
    no_std: bool,
    #[arg(long)]
    no_area: bool,
    #[arg(long)]
    no_shape_area: bool,
    #[arg(long)]
    no_exposure: bool,
    #[arg(long)]
    no_volume: bool,
    #[arg(long)]
    no_wsel: bool,
    #[arg(long)]
    no_ground_min: bool,
    #[arg(long)]
    no_ground_max: bool,
    #[arg(long)]
    no_ground_range: bool,
    #[arg(long)]
    no_ground_mean: bool,
    #[arg(long)]
    no_ground_std: bool,
    #[arg(long)]
    no_loss: bool,
}

impl FieldFlags {
    fn apply(&self, fields: &mut FieldSelection) {
        let switches = [
            (&mut fields.min, self.no_min),
            (&mut fields.max, self.no_max),
            (&mut fields.range, self.no_range),
            (&mut fields.mean, self.no_mean),
            (&mut fields.std, self.no_std),
            (&mut fields.area, self.no_area),
            (&mut fields.shape_area, self.no_shape_area),
            (&mut fields.exposure, self.no_exposure),
            (&mut fields.volume, self.no_volume),
            (&mut fields.wsel, self.no_wsel),
            (&mut fields.ground_min, self.no_ground_min),
            (&mut fields.ground_max, self.no_ground_max),
            (&mut fields.ground_range, self.no_ground_range),
            (&mut fields.ground_mean, self.no_ground_mean),
            (&mut fields.ground_std, self.no_ground_std),
            (&mut fields.loss, self.no_loss),
        ];
        for (field, off) in switches {
            if off {
                *field = false;
            }
        }
    }
}

impl AttributeArgs {
    fn into_job(self) -> Result<Job> {
        let mut job = match &self.config {
            Some(path) => Job::from_yaml_file(path)?,
            None => {
                let missing = |name: &str| RunnerError::InvalidArguments(format!("{} is required", name));
                Job {
                    params: ExposureParams {
                        risk_type: self.risk_type.clone().ok_or_else(|| missing("risk type"))?,
                        percent_flood: None,
                        risk_table: self.risk_table.clone().ok_or_else(|| missing("--risk-table"))?,
                        surface_workspace: None,
                        depth_workspace: None,
                        features: self.features.clone().ok_or_else(|| missing("features"))?,
                        feature_id_field: "OBJECTID".to_string(),
                        buffer_distance: 0.0,
                        tolerance: 1.0,
                        dem: None,
                        loss_table: None,
                        output_table: self.output.clone().ok_or_else(|| missing("output"))?,
                    },
                    run: Default::default(),
                    report: None,
                }
            }
        };

        let params = &mut job.params;
        if let Some(risk_type) = self.risk_type {
            params.risk_type = risk_type;
        }
        if let Some(features) = self.features {
            params.features = features;
        }
        if let Some(output) = self.output {
            params.output_table = output;
        }
        if let Some(risk_table) = self.risk_table {
            params.risk_table = risk_table;
        }
        if let Some(id_field) = self.id_field {
            params.feature_id_field = id_field;
        }
        if let Some(buffer) = self.buffer {
            params.buffer_distance = parse_buffer_distance(&buffer)?;
        }
        if let Some(tolerance) = self.tolerance {
            params.tolerance = tolerance;
        }
        params.percent_flood = self.percent_flood.or(params.percent_flood);
        params.surface_workspace = self.surface.or(params.surface_workspace.take());
        params.depth_workspace = self.depth.or(params.depth_workspace.take());
        params.dem = self.dem.or(params.dem.take());
        params.loss_table = self.loss_table.or(params.loss_table.take());

        let run = &mut job.run;
        if self.keep_intermediate {
            run.delete_intermediate = false;
        }
        if let Some(scratch) = self.scratch {
            run.use_in_memory = false;
            run.scratch_workspace = Some(scratch);
        }
        if self.numeric_names {
            run.name_ordering = NameOrdering::Numeric;
        }
        self.fields.apply(&mut run.fields);
        job.report = self.report.or(job.report);
        Ok(job)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Could not set up logging: {}", e);
    }
}

fn print_levels(risk_table: &Path, risk_type: Option<&str>, percent_flood: Option<bool>) -> Result<()> {
    let table = RiskTable::from_path(risk_table)?;
    let Some(risk_type) = risk_type else {
        for risk_type in table.risk_types() {
            println!("{}", risk_type);
        }
        return Ok(());
    };

    let mut spec = table.load(risk_type)?;
    if let Some(percent) = percent_flood {
        spec = spec.with_percent(percent);
    }
    println!("Risk type: {}", spec.risk_type);
    println!("Attribute base name: {}", spec.attribute_base_name);
    println!("Percent levels: {}", spec.is_percent);
    println!("Source order: {:?}", spec.source_order);
    println!("Levels (least severe first):");
    for (index, (level, label)) in spec.levels.iter().zip(&spec.level_labels).enumerate() {
        println!("  {:>3}  {:<8} {}", index, label, level);
    }
    Ok(())
}

fn run_check(paths: &[PathBuf]) -> Result<()> {
    let checks = check::check_paths(paths)?;
    let mut failed = 0;
    for check in &checks {
        let status = if check.passed() { "OK" } else { "FAILED" };
        println!(
            "{}: {} ({}, {}, vertical {})",
            check.name,
            status,
            check.coordinate_system.as_deref().unwrap_or("no coordinate system"),
            check.linear_unit.as_deref().unwrap_or("unknown unit"),
            check.vertical_unit.as_deref().unwrap_or("none"),
        );
        for message in &check.errors {
            println!("  error: {}", message);
        }
        for message in &check.warnings {
            println!("  warning: {}", message);
        }
        if !check.passed() {
            failed += 1;
        }
    }
    if failed > 0 {
        return Err(RunnerError::CheckFailed(failed));
    }
    Ok(())
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Attribute(args) => {
            let job = args.into_job()?;
            let report = run_job(&job)?;
            info!(
                "{} of {} features exposed",
                report.exposed_count, report.feature_count
            );
            println!("Exposure table saved to: {}", report.output_table.display());
            println!("Level summary saved to: {}", report.summary_table.display());
            Ok(())
        }
        Commands::Levels {
            risk_table,
            risk_type,
            percent_flood,
        } => print_levels(&risk_table, risk_type.as_deref(), percent_flood),
        Commands::Check { paths } => run_check(&paths),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.location() {
                Some((file, line)) => error!("{} ({}:{})", e.user_message(), file, line),
                None => error!("{}", e.user_message()),
            }
            ExitCode::FAILURE
        }
    }
}
