use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nes_sim::config::{AbsorberConfig, RunConfig};
use nes_sim::dynamics::NesModel;
use nes_sim::error::NesError;
use nes_sim::io::{write_summary_file, RunSummary};
use nes_sim::physics::ReducedVelocity;
use nes_sim::sim::{self, BatchMode, DisplacementResult, Objective};
use nes_sim::sweep::{SweepEngine, SweepGrid};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "nes-sim",
    version,
    about = "Wind-excited structure with nonlinear energy sinks"
)]
struct Cli {
    /// Log filter (e.g. `debug`, `nes_sim=trace`); RUST_LOG is used otherwise
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate one configuration and print its displacement statistics
    Run {
        #[command(flatten)]
        model: ModelArgs,
        /// single, 1m3u (three wind speeds) or 3m3u (three modes x three wind speeds)
        #[arg(long)]
        batch: Option<BatchMode>,
        /// max-avg, avg or max
        #[arg(long)]
        objective: Option<Objective>,
        /// Write the full trajectory here (single batch only)
        #[arg(long, value_name = "PATH")]
        trajectory: Option<PathBuf>,
        /// Write a JSON summary here
        #[arg(long, value_name = "PATH")]
        summary: Option<PathBuf>,
    },
    /// Evaluate every configuration of a sweep grid
    Sweep {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        grid: GridArgs,
        #[arg(long)]
        batch: Option<BatchMode>,
        #[arg(long)]
        objective: Option<Objective>,
        /// Result table path (stdout if omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// List the configurations of a sweep grid without running them
    Configs {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        grid: GridArgs,
    },
    /// Print the resolved model parameters
    Show {
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Args)]
struct GridArgs {
    /// Sweep grid file (`mr1 ...`, `kr1 ...`, `cr1 ...` lines)
    #[arg(long, value_name = "PATH")]
    grid: Option<PathBuf>,
    /// Total mass ratio shared by all absorbers
    #[arg(long = "total-mr")]
    total_mass_ratio: Option<f64>,
}

#[derive(Args)]
struct ModelArgs {
    /// TOML run configuration; flags below override it
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Number of absorbers
    #[arg(short = 'n', long)]
    absorbers: Option<usize>,
    /// Mass ratios, one per absorber
    #[arg(long = "mr", num_args = 1.., value_delimiter = ',')]
    mass_ratios: Vec<f64>,
    /// Stiffness ratios, one per absorber
    #[arg(long = "kr", num_args = 1.., value_delimiter = ',')]
    stiffness_ratios: Vec<f64>,
    /// Damping ratios, one per absorber
    #[arg(long = "cr", num_args = 1.., value_delimiter = ',')]
    damping_ratios: Vec<f64>,
    /// Initial amplitude A* of every body
    #[arg(long = "initial-a-star")]
    initial_a_star: Option<f64>,
    /// Time step in tao
    #[arg(long)]
    dtao: Option<f64>,
    /// Total duration in tao
    #[arg(long)]
    ctao: Option<f64>,
    /// Settling time in tao (statistics start here)
    #[arg(long)]
    rctao: Option<f64>,
    /// Natural frequency of the structure (Hz)
    #[arg(long = "fn")]
    natural_frequency: Option<f64>,
    /// Bridge mode 1..3 (sets the natural frequency)
    #[arg(long)]
    mode: Option<u8>,
    /// Structural damping ratio
    #[arg(long)]
    zeta: Option<f64>,
    /// Design frequency the absorber ratios refer to (Hz)
    #[arg(long = "fd")]
    design_frequency: Option<f64>,
    /// Design damping ratio
    #[arg(long = "zeta-design")]
    design_damping_ratio: Option<f64>,
    /// Reduced wind velocity: 1.6, 1.7 or 1.8
    #[arg(long)]
    ustar: Option<f64>,
    /// Aerodynamic coefficient table (A* U* H1* H4* rows)
    #[arg(long, value_name = "PATH")]
    aero_table: Option<PathBuf>,
}

impl ModelArgs {
    /// Config file (or defaults) with every given flag applied on top.
    fn resolve(&self) -> Result<RunConfig> {
        let mut cfg = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };

        if let Some(n) = self.absorbers {
            cfg.absorbers.resize(n, AbsorberConfig::default());
        }
        let n = cfg.absorbers.len();
        for (flag, values) in [
            ("--mr", &self.mass_ratios),
            ("--kr", &self.stiffness_ratios),
            ("--cr", &self.damping_ratios),
        ] {
            if values.len() > n {
                return Err(NesError::validation(format!(
                    "{flag} has {} values for {n} absorbers",
                    values.len()
                ))
                .into());
            }
        }
        for (a, &v) in cfg.absorbers.iter_mut().zip(&self.mass_ratios) {
            a.mass_ratio = v;
        }
        for (a, &v) in cfg.absorbers.iter_mut().zip(&self.stiffness_ratios) {
            a.stiffness_ratio = v;
        }
        for (a, &v) in cfg.absorbers.iter_mut().zip(&self.damping_ratios) {
            a.damping_ratio = v;
        }

        let overrides = [
            (&mut cfg.initial_a_star, self.initial_a_star),
            (&mut cfg.time.tao_step, self.dtao),
            (&mut cfg.time.total_tao, self.ctao),
            (&mut cfg.time.settling_tao, self.rctao),
            (&mut cfg.structure.natural_frequency, self.natural_frequency),
            (&mut cfg.structure.damping_ratio, self.zeta),
            (&mut cfg.structure.reduced_velocity, self.ustar),
            (&mut cfg.design.frequency, self.design_frequency),
            (&mut cfg.design.damping_ratio, self.design_damping_ratio),
        ];
        for (slot, value) in overrides {
            if let Some(v) = value {
                *slot = v;
            }
        }
        if self.natural_frequency.is_some() {
            cfg.structure.mode = None;
        }
        if self.mode.is_some() {
            cfg.structure.mode = self.mode;
        }
        if self.aero_table.is_some() {
            cfg.aero_table = self.aero_table.clone();
        }
        Ok(cfg)
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err.downcast_ref::<NesError>().map_or(1, NesError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Run { model, batch, objective, trajectory, summary } => {
            let cfg = model.resolve()?;
            let batch = batch.unwrap_or(cfg.batch);
            let objective = objective.unwrap_or(cfg.objective);
            run_command(&cfg, batch, objective, trajectory.as_deref(), summary.as_deref())
        }
        Command::Sweep { model, grid, batch, objective, output } => {
            let cfg = model.resolve()?;
            let batch = batch.unwrap_or(cfg.batch);
            let objective = objective.unwrap_or(cfg.objective);
            sweep_command(&cfg, &grid, batch, objective, output.as_deref())
        }
        Command::Configs { model, grid } => {
            let cfg = model.resolve()?;
            configs_command(&cfg, &grid)
        }
        Command::Show { model } => {
            let model = model.resolve()?.build_model()?;
            println!("{model}");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn run_command(
    cfg: &RunConfig,
    batch: BatchMode,
    objective: Objective,
    trajectory: Option<&Path>,
    summary: Option<&Path>,
) -> Result<()> {
    let mut model = cfg.build_model()?;
    if trajectory.is_some() && batch != BatchMode::Single {
        return Err(NesError::configuration("--trajectory needs --batch single").into());
    }

    let start = Instant::now();
    let runs = match trajectory {
        Some(path) => vec![sim::run_to_file(&model, path)
            .with_context(|| format!("writing trajectory {}", path.display()))?],
        None => sim::run_batch(&mut model, batch)?,
    };
    let result = objective.reduce(&runs, batch.group_size())?;
    let elapsed = start.elapsed().as_secs_f64();

    print_run_report(&model, batch, objective, &runs, &result, elapsed);

    if let Some(path) = summary {
        let s = RunSummary::new(&model, batch, objective, runs, result, elapsed);
        write_summary_file(path, &s)
            .map_err(NesError::from)
            .with_context(|| format!("writing summary {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }
    Ok(())
}

fn load_grid(grid: &GridArgs, cfg: &RunConfig) -> Result<(SweepGrid, f64)> {
    let path = grid
        .grid
        .as_ref()
        .or(cfg.sweep.grid.as_ref())
        .ok_or_else(|| NesError::configuration("No sweep grid given (--grid or sweep.grid)"))?;
    let total = grid.total_mass_ratio.unwrap_or(cfg.sweep.total_mass_ratio);
    let grid = SweepGrid::from_file(path, cfg.absorbers.len())?;
    Ok((grid, total))
}

fn sweep_command(
    cfg: &RunConfig,
    grid: &GridArgs,
    batch: BatchMode,
    objective: Objective,
    output: Option<&Path>,
) -> Result<()> {
    let mut model = cfg.build_model()?;
    let (grid, total) = load_grid(grid, cfg)?;
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(NesError::from)?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let start = Instant::now();
    let mut engine = SweepEngine::new(grid, total, sink)?;
    let count = engine.run(&mut model, batch, objective)?;
    info!(
        configs = count,
        seconds = start.elapsed().as_secs_f64(),
        "sweep finished"
    );
    Ok(())
}

fn configs_command(cfg: &RunConfig, grid: &GridArgs) -> Result<()> {
    let (grid, total) = load_grid(grid, cfg)?;
    let mut out = io::stdout().lock();
    grid.describe(&mut out).map_err(NesError::from)?;
    writeln!(out).map_err(NesError::from)?;
    let mut engine = SweepEngine::new(grid, total, out)?;
    engine.preview()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// (mode, U*) label of run `i` of a batch.
fn run_label(model: &NesModel, batch: BatchMode, i: usize) -> String {
    let winds = ReducedVelocity::ALL;
    match batch {
        BatchMode::Single => format!(
            "f_n {:.4} Hz  U* {:.1}",
            model.structure().natural_frequency(),
            model.structure().u_star()
        ),
        BatchMode::OneModeThreeWinds => format!(
            "f_n {:.4} Hz  U* {:.1}",
            model.structure().natural_frequency(),
            winds[i % winds.len()].value()
        ),
        BatchMode::ThreeModesThreeWinds => format!(
            "mode {}      U* {:.1}",
            i / winds.len() + 1,
            winds[i % winds.len()].value()
        ),
    }
}

fn print_run_report(
    model: &NesModel,
    batch: BatchMode,
    objective: Objective,
    runs: &[DisplacementResult],
    result: &DisplacementResult,
    elapsed: f64,
) {
    println!();
    println!("====================================================================");
    println!(
        "  NES SIMULATION: {} absorber(s), batch {}",
        model.absorber_count(),
        batch
    );
    println!("====================================================================");
    println!();
    println!("  Absorbers");
    println!("  ──────────────────────────────────────────────────────────────────");
    for (i, a) in model.absorbers().iter().enumerate() {
        println!(
            "  #{:<3} mr {:>9.5}   kr {:>9.5}   cr {:>9.5}",
            i + 1,
            a.mass_ratio(),
            a.stiffness_ratio(),
            a.damping_ratio()
        );
    }
    println!();
    println!("  Runs (displacement / D over settling window)");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!("  {:<26} {:>14} {:>14}", "", "RMS", "peak");
    for (i, r) in runs.iter().enumerate() {
        println!(
            "  {:<26} {:>14.6e} {:>14.6e}",
            run_label(model, batch, i),
            r.rms,
            r.peak
        );
    }
    println!();
    println!(
        "  Result ({objective}):  RMS {:.6e}   peak {:.6e}",
        result.rms, result.peak
    );
    println!();
    println!("  Time: {:.2} s", elapsed);
    println!("====================================================================");
    println!();
}
