//! Jeffries-Matusita separability between two classes of a cover raster,
//! measured over one or more base rasters.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use jm_core::{GrassEngine, MemoryEngine, RasterEngine, SeparabilityReport};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(
    name = "jm_distance",
    about = "Compute the Jeffries-Matusita distance between two classes of a cover raster"
)]
struct Args {
    /// Base raster layers (feature bands), comma separated.
    #[arg(short, long, value_delimiter = ',', required = true)]
    base: Vec<String>,

    /// Cover raster whose cell values are category codes.
    #[arg(short, long)]
    cover: String,

    /// The two category values to compare, comma separated.
    #[arg(long, value_delimiter = ',', required = true)]
    cats: Vec<String>,

    /// Raster engine to query.
    #[arg(short, long, value_enum, default_value_t = EngineKind::Grass)]
    engine: EngineKind,

    /// JSON scene file for `--engine scene`.
    #[arg(short, long)]
    scene: Option<PathBuf>,

    /// Print every distance term as JSON instead of the bare JM value.
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    /// GRASS GIS modules in the current session.
    Grass,
    /// In-memory grids loaded from a JSON scene.
    Scene,
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing log subscriber")?;
    Ok(())
}

fn compute<E: RasterEngine>(engine: &mut E, args: &Args) -> Result<SeparabilityReport> {
    Ok(jm_core::run_with_args(engine, args.base.as_slice(), &args.cover, args.cats.as_slice())?)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let report = match args.engine {
        EngineKind::Grass => compute(&mut GrassEngine::new(), &args)?,
        EngineKind::Scene => {
            let Some(path) = args.scene.as_deref() else {
                bail!("--scene is required with --engine scene");
            };
            let mut engine = MemoryEngine::load(path)
                .with_context(|| format!("loading scene {}", path.display()))?;
            compute(&mut engine, &args)?
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.jeffries_matusita());
    }
    Ok(())
}
