//! URBANLOS: particle-filter positioning aided by building-occlusion LOS/NLOS classification.
//!
//! Subcommands:
//! - `run`: drive the particle filter over a recorded route and export per-step errors
//! - `los`: report each satellite's visibility from a single observer position, including the
//!   extra height needed to clear the blocking wall
//! - `create-config`: write a template configuration file (TOML/JSON/YAML)
//!
//! Parameters come from a configuration file (`--config`), command-line flags, or both; flags
//! override the file.
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info};
use std::path::PathBuf;

use urbanlos::Point3D;
use urbanlos::los::ClassificationMode;
use urbanlos::sim::{
    SimulationConfig, UrbanDegradationConfig, WeightFunction, load_buildings, load_satellites,
    required_height_report, run_simulation,
};

/// Command line arguments
#[derive(Parser)]
#[command(
    author,
    version,
    about = "Particle-filter positioning aided by building-occlusion LOS/NLOS classification."
)]
struct Cli {
    /// Configuration file (TOML/JSON/YAML); command-line flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace); defaults to the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        about = "Run the particle filter over a route",
        long_about = "Run the LOS/NLOS particle filter over a recorded route. Buildings, satellites and the route are loaded from the configured inputs, every waypoint is processed in order, and per-step estimates and errors are written as CSV."
    )]
    Run(RunArgs),
    #[command(
        about = "Report satellite visibility from one position",
        long_about = "Classify every satellite geometrically from a single observer position and report, for blocked satellites, how much higher the observer would have to be to see it."
    )]
    Los(LosArgs),
    #[command(name = "create-config", about = "Write a template configuration file")]
    CreateConfig(CreateConfigArgs),
}

/// Classification modes as exposed on the command line
#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliMode {
    Geometric,
    Signal,
    Hybrid,
}
impl From<CliMode> for ClassificationMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Geometric => ClassificationMode::GeometricOnly,
            CliMode::Signal => ClassificationMode::SignalStrengthOnly,
            CliMode::Hybrid => ClassificationMode::Hybrid,
        }
    }
}

/// Input overrides shared by the subcommands
#[derive(Args, Clone, Debug)]
struct InputArgs {
    /// Route CSV (timestamp,x,y,z)
    #[arg(long)]
    route: Option<String>,
    /// Satellite CSV (name,azimuth,elevation,cn0)
    #[arg(long)]
    satellites: Option<String>,
    /// Building JSON
    #[arg(long)]
    buildings: Option<String>,
    /// Classification mode
    #[arg(long, value_enum)]
    mode: Option<CliMode>,
    /// Enable ray-shooting building culling (may miss occluders)
    #[arg(long)]
    ray_shooting: bool,
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Output CSV for per-step results
    #[arg(short, long)]
    output: Option<String>,
    /// Number of particles
    #[arg(long)]
    particles: Option<usize>,
    /// Half-width of the initial particle grid in meters
    #[arg(long)]
    grid_size: Option<f64>,
    /// Motion noise scale
    #[arg(long)]
    noise: Option<f64>,
    /// Use the Bayesian weight function instead of 2^matches
    #[arg(long)]
    bayesian: bool,
    /// Probability (percent) of flipping each LOS/NLOS label
    #[arg(long)]
    misclassification: Option<f64>,
    /// Attenuate random satellites before the run with this probability
    #[arg(long)]
    urban: Option<f64>,
    /// Random seed for the classifier and the filter
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Clone, Debug)]
struct LosArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Observer x (easting or longitude)
    #[arg(long, allow_hyphen_values = true)]
    x: f64,
    /// Observer y (northing or latitude)
    #[arg(long, allow_hyphen_values = true)]
    y: f64,
    /// Observer altitude in meters
    #[arg(long, default_value_t = 1.8, allow_hyphen_values = true)]
    z: f64,
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Destination path; the extension selects the format
    #[arg(default_value = "urbanlos.toml")]
    path: PathBuf,
}

/// Initialize the logger with the specified configuration
///
/// # Arguments
/// * `log_level` - Log level string (off, error, warn, info, debug, trace)
/// * `log_file` - Optional path to log file (logs to stderr if None)
fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<()> {
    use std::io::Write;

    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{log_level}', defaulting to 'info'");
        log::LevelFilter::Info
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .with_context(|| format!("opening log file {}", log_path.display()))?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

fn apply_input_args(config: &mut SimulationConfig, args: &InputArgs) {
    if let Some(route) = &args.route {
        config.input.route = route.clone();
    }
    if let Some(satellites) = &args.satellites {
        config.input.satellites = satellites.clone();
    }
    if let Some(buildings) = &args.buildings {
        config.input.buildings = buildings.clone();
    }
    if let Some(mode) = args.mode {
        config.los.mode = mode.into();
    }
    if args.ray_shooting {
        config.los.ray_shooting = true;
    }
}

fn apply_run_args(config: &mut SimulationConfig, args: &RunArgs) {
    apply_input_args(config, &args.input);
    if let Some(output) = &args.output {
        config.output = output.clone();
    }
    if let Some(particles) = args.particles {
        config.filter.num_particles = particles;
    }
    if let Some(grid_size) = args.grid_size {
        config.filter.grid_size_m = grid_size;
    }
    if let Some(noise) = args.noise {
        config.filter.movement_noise = noise;
    }
    if args.bayesian {
        config.filter.weight_function = WeightFunction::bayesian();
    }
    if let Some(percent) = args.misclassification {
        config.los.misclassification_percent = percent;
    }
    if let Some(probability) = args.urban {
        config.urban_degradation = Some(UrbanDegradationConfig {
            probability,
            ..Default::default()
        });
    }
    if let Some(seed) = args.seed {
        config.los.seed = seed;
        config.filter.seed = seed;
    }
}

fn run(config: &SimulationConfig) -> Result<()> {
    let result = run_simulation(config).context("particle filter run failed")?;
    match result.final_estimate() {
        Some(estimate) => println!(
            "{} steps, mean error {:.2} m, max error {:.2} m, final estimate {}",
            result.steps.len(),
            result.mean_error(),
            result.max_error(),
            estimate
        ),
        None => println!("No steps processed"),
    }
    Ok(())
}

fn los_report(config: &SimulationConfig, args: &LosArgs) -> Result<()> {
    let transform = config.coordinates.transform();
    let buildings = load_buildings(&config.input.buildings, transform.as_ref())
        .with_context(|| format!("loading buildings from {}", config.input.buildings))?;
    let satellites = load_satellites(&config.input.satellites)
        .with_context(|| format!("loading satellites from {}", config.input.satellites))?;
    if satellites.is_empty() {
        bail!("no satellites in {}", config.input.satellites);
    }
    let observer = transform.to_local(&Point3D::new(args.x, args.y, args.z));
    info!(
        "Observer at {} against {} buildings and {} satellites",
        observer,
        buildings.len(),
        satellites.len()
    );
    let report = required_height_report(&observer, &buildings, &satellites, &config.los);
    let blocked = report.iter().filter(|r| !r.is_los).count();
    for line in &report {
        println!("{line}");
    }
    println!("LOS {} / NLOS {}", report.len() - blocked, blocked);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.to_string());
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| config.logging.file.as_ref().map(PathBuf::from));
    init_logger(&log_level, log_file.as_ref())?;

    let outcome = match &cli.command {
        Command::Run(args) => {
            apply_run_args(&mut config, args);
            run(&config)
        }
        Command::Los(args) => {
            apply_input_args(&mut config, &args.input);
            los_report(&config, args)
        }
        Command::CreateConfig(args) => {
            config
                .to_file(&args.path)
                .with_context(|| format!("writing configuration {}", args.path.display()))?;
            info!("Configuration written to {}", args.path.display());
            Ok(())
        }
    };
    if let Err(err) = &outcome {
        error!("{err:#}");
    }
    outcome
}
