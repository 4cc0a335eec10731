//! geokrig CLI - uncertainty fields by external drift kriging

mod io;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use geokrig_algorithms::interpolation::{CovarianceFamily, Estimator, Loss, NormalizerKind};
use geokrig_algorithms::pipeline::{
    run_uncertainty_pipeline, validate_iterations, DriftColumns, TracingPlot, UncertaintyParams,
    DEFAULT_MASTER_SEED, DEFAULT_MEAN_COLUMN,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geokrig")]
#[command(author, version, about = "Uncertainty fields for sparsely observed areal data", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the units and numeric columns of a GeoJSON table
    Info {
        /// Input GeoJSON FeatureCollection
        input: PathBuf,
    },
    /// Krige a column and draw conditional realizations
    Run {
        /// Input GeoJSON FeatureCollection of polygons
        input: PathBuf,
        /// Output CSV of realizations (one row per realization)
        output: PathBuf,
        /// Column to interpolate
        #[arg(short, long)]
        target: String,
        /// Drift covariate columns (one or two, in drift order)
        #[arg(short, long, num_args = 1..=2, required = true)]
        drift: Vec<String>,
        /// Number of realizations
        #[arg(short = 'n', long, default_value = "1", allow_negative_numbers = true)]
        iterations: i64,
        /// Covariance family (see `geokrig families`)
        #[arg(short, long, default_value = "exponential")]
        family: String,
        /// Master seed for the realization seed sequence
        #[arg(short, long, default_value_t = DEFAULT_MASTER_SEED)]
        seed: u64,
        /// Normalizing transform
        #[arg(long, value_enum, default_value = "log-normal")]
        normalizer: NormalizerArg,
        /// Variogram estimator
        #[arg(long, value_enum, default_value = "cressie")]
        estimator: EstimatorArg,
        /// Robust fitting loss
        #[arg(long, value_enum, default_value = "cauchy")]
        loss: LossArg,
        /// Hold the family's shape parameter fixed
        #[arg(long)]
        shape: Option<f64>,
        /// Targets per kriging solve block
        #[arg(long, default_value = "100")]
        chunk_size: usize,
        /// Column receiving the kriging mean
        #[arg(long, default_value = DEFAULT_MEAN_COLUMN)]
        mean_column: String,
        /// Write the input table with the kriging mean column
        #[arg(long)]
        table_output: Option<PathBuf>,
        /// Write variogram and model diagnostics as JSON
        #[arg(long)]
        diagnostics: Option<PathBuf>,
    },
    /// List the covariance families
    Families,
}

#[derive(Clone, Copy, ValueEnum)]
enum NormalizerArg {
    LogNormal,
    BoxCox,
}

impl From<NormalizerArg> for NormalizerKind {
    fn from(a: NormalizerArg) -> Self {
        match a {
            NormalizerArg::LogNormal => NormalizerKind::LogNormal,
            NormalizerArg::BoxCox => NormalizerKind::BoxCox,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EstimatorArg {
    Cressie,
    Matheron,
}

impl From<EstimatorArg> for Estimator {
    fn from(a: EstimatorArg) -> Self {
        match a {
            EstimatorArg::Cressie => Estimator::Cressie,
            EstimatorArg::Matheron => Estimator::Matheron,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LossArg {
    Cauchy,
    SoftL1,
    Linear,
}

impl From<LossArg> for Loss {
    fn from(a: LossArg) -> Self {
        match a {
            LossArg::Cauchy => Loss::Cauchy,
            LossArg::SoftL1 => Loss::SoftL1,
            LossArg::Linear => Loss::Linear,
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn done(name: &str, path: &std::path::Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn drift_columns(names: &[String]) -> Result<DriftColumns> {
    match names {
        [a] => Ok(DriftColumns::one(a)),
        [a, b] => Ok(DriftColumns::two(a, b)),
        _ => anyhow::bail!("expected one or two drift columns, got {}", names.len()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => {
            let table = io::read_table(&input)?;
            let mut columns: Vec<&String> = table.iter().flat_map(|f| f.properties.keys()).collect();
            columns.sort();
            columns.dedup();

            println!("File: {}", input.display());
            println!("Units: {}", table.len());
            println!("\nNumeric columns:");
            for name in columns {
                if let Ok(values) = table.numeric_column(name) {
                    let missing = values.iter().filter(|v| v.is_none()).count();
                    println!("  {name}: {} observed, {missing} missing", values.len() - missing);
                }
            }
        }

        Commands::Families => {
            for family in CovarianceFamily::ALL {
                match family.shape_bounds() {
                    Some((lo, hi)) => println!("{family:<12} shape in [{lo}, {hi}]"),
                    None => println!("{family}"),
                }
            }
        }

        Commands::Run {
            input,
            output,
            target,
            drift,
            iterations,
            family,
            seed,
            normalizer,
            estimator,
            loss,
            shape,
            chunk_size,
            mean_column,
            table_output,
            diagnostics,
        } => {
            let mut params = UncertaintyParams::new(target, drift_columns(&drift)?)
                .with_iterations(validate_iterations(iterations)?)
                .with_family(family.parse()?)
                .with_seed(seed);
            params.normalizer = normalizer.into();
            params.variogram.estimator = estimator.into();
            params.fit.loss = loss.into();
            params.fit.fixed_shape = shape;
            params.kriging.chunk_size = chunk_size;
            params.mean_column = mean_column;

            let pb = spinner("Reading table...")?;
            let mut table = io::read_table(&input)?;
            pb.finish_and_clear();
            info!("Input: {} units", table.len());

            let start = Instant::now();
            let pb = spinner("Kriging and simulating...")?;
            let result = run_uncertainty_pipeline(&table, &params, &params.backend(), &TracingPlot);
            pb.finish_and_clear();
            let result = result.context("Uncertainty pipeline failed")?;
            let elapsed = start.elapsed();

            io::write_realizations(&result.fields, &result.seeds, &output)?;
            done("Realizations", &output, elapsed);

            if let Some(path) = table_output {
                result.attach_mean(&mut table, &params.mean_column)?;
                io::write_table(&table, &path)?;
                println!("Table with '{}' saved to: {}", params.mean_column, path.display());
            }
            if let Some(path) = diagnostics {
                io::write_diagnostics(&result, &path)?;
                println!("Diagnostics saved to: {}", path.display());
            }
        }
    }

    Ok(())
}
