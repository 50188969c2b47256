/// Command-line front end: score two terrains, synthesize a constrained
/// terrain, export the model, or check a terrain against its constraints.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use emd_core::io::{
    self, CONSTRAINT_FLAGS_FILE, CONSTRAINT_PARAMS_FILE, SOURCE_TERRAIN_FILE, TARGET_TERRAIN_FILE,
};
use emd_core::solver::lp_format;
use emd_core::{
    ConstraintGrids, ConstraintStats, EmdConfig, EmdError, EmdReport, EmdRunner, TransportMode,
};

#[derive(Parser, Debug)]
#[command(name = "emd", about = "Earth mover's distance between terrains")]
struct Cli {
    /// JSON config file; every field is optional.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the imbalance penalty rate.
    #[arg(long, global = true)]
    sigma: Option<f64>,

    /// Override the resolution whose vertex spacing is one distance unit.
    #[arg(long, global = true)]
    reference_size: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// EMD between a source and a target terrain.
    Score {
        #[arg(long, default_value = SOURCE_TERRAIN_FILE)]
        source: PathBuf,
        #[arg(long, default_value = TARGET_TERRAIN_FILE)]
        target: PathBuf,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Synthesize the terrain closest to the source under local constraints.
    Generate {
        #[arg(long, default_value = SOURCE_TERRAIN_FILE)]
        source: PathBuf,
        #[command(flatten)]
        constraints: ConstraintArgs,
        /// Where to write the synthesized terrain.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Write the assembled model as an LP file without solving it.
    Export {
        #[arg(long, default_value = SOURCE_TERRAIN_FILE)]
        source: PathBuf,
        /// Score against this terrain; without it the generative model is
        /// exported.
        #[arg(long)]
        target: Option<PathBuf>,
        #[command(flatten)]
        constraints: ConstraintArgs,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Constraint satisfaction statistics of a terrain.
    Stats {
        #[arg(long, default_value = TARGET_TERRAIN_FILE)]
        terrain: PathBuf,
        #[arg(long, default_value = CONSTRAINT_FLAGS_FILE)]
        flags: PathBuf,
        #[arg(long, default_value = CONSTRAINT_PARAMS_FILE)]
        params: PathBuf,
        /// Append the stats as one JSON line to this file.
        #[arg(long)]
        append: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ConstraintArgs {
    /// Constraint flag grid.
    #[arg(long, requires = "params")]
    flags: Option<PathBuf>,
    /// Constraint parameter grid.
    #[arg(long, requires = "flags")]
    params: Option<PathBuf>,
}

impl ConstraintArgs {
    fn load(&self) -> Result<Option<ConstraintGrids>> {
        match (&self.flags, &self.params) {
            (Some(f), Some(p)) => io::read_constraints(f, p)
                .map(Some)
                .with_context(|| format!("Cannot read constraints {} / {}", f.display(), p.display())),
            _ => Ok(None),
        }
    }
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Append the EMD (or `-` when there is none) as one line to this file.
    #[arg(long)]
    append: Option<PathBuf>,
    /// Write the full report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Fail unless the solver proves optimality.
    #[arg(long)]
    strict: bool,
}

fn load_config(cli: &Cli) -> Result<EmdConfig> {
    let mut config = match &cli.config {
        Some(p) => EmdConfig::load(p).with_context(|| format!("Cannot read config {}", p.display()))?,
        None => EmdConfig::default(),
    };
    if let Some(sigma) = cli.sigma {
        config.sigma = Some(sigma);
    }
    if let Some(reference) = cli.reference_size {
        config.reference_size = reference;
    }
    config.validate()?;
    Ok(config)
}

fn read_terrain(path: &Path) -> Result<emd_core::Terrain> {
    io::read_terrain(path).with_context(|| format!("Cannot read terrain {}", path.display()))
}

/// Record the outcome of a solve; a failed solve still leaves a `-` line so
/// result files stay aligned with the sample index.
fn finish(outcome: emd_core::Result<EmdReport>, out: &OutputArgs) -> Result<Option<EmdReport>> {
    let outcome = if out.strict {
        outcome.and_then(EmdReport::require_optimal)
    } else {
        outcome
    };

    let report = match outcome {
        Ok(report) => report,
        Err(e @ (EmdError::ModelInfeasible(_) | EmdError::ModelSuboptimal { .. })) => {
            log::error!("{e}");
            if let Some(path) = &out.append {
                io::append_line(path, io::MISSING)?;
            }
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(path) = &out.append {
        io::append_line(path, &io::format_scalar(report.emd))
            .with_context(|| format!("Cannot append to {}", path.display()))?;
    }
    if let Some(path) = &out.report {
        io::write_json(path, &report)?;
    }
    Ok(Some(report))
}

fn print_summary(report: &EmdReport) {
    println!("-- Cost = {}", report.cost);
    println!("-- Flow = {}", report.flow);
    println!("-- EMD  = {}", io::format_scalar(report.emd));
    if report.imbalance > 0.0 {
        println!("-- Imbalance = {}", report.imbalance);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Score { source, target, out } => {
            let l = read_terrain(&source)?;
            let h = read_terrain(&target)?;
            let runner = EmdRunner::new(config);
            match finish(runner.score(&l, &h), &out)? {
                Some(report) => print_summary(&report),
                None => bail!("no optimal transport found"),
            }
        }

        Command::Generate {
            source,
            constraints,
            output,
            out,
        } => {
            let l = read_terrain(&source)?;
            let grids = constraints.load()?;
            let runner = EmdRunner::new(config);
            let Some(mut report) = finish(runner.generate(&l, grids.as_ref()), &out)? else {
                bail!("no terrain satisfies the constraints");
            };
            print_summary(&report);
            if let (Some(path), Some(terrain)) = (output, report.terrain.take()) {
                io::write_json(&path, &terrain)
                    .with_context(|| format!("Cannot write {}", path.display()))?;
                log::info!("synthesized terrain written to {}", path.display());
            }
        }

        Command::Export {
            source,
            target,
            constraints,
            output,
        } => {
            let l = read_terrain(&source)?;
            let runner = EmdRunner::new(config);
            let prepared = match target {
                Some(path) => {
                    let h = read_terrain(&path)?;
                    runner.prepare(&l, TransportMode::Scoring { target: &h })?
                }
                None => {
                    let grids = constraints.load()?;
                    runner.prepare(
                        &l,
                        TransportMode::Generative {
                            constraints: grids.as_ref(),
                        },
                    )?
                }
            };
            let file = std::fs::File::create(&output)
                .with_context(|| format!("Cannot create {}", output.display()))?;
            lp_format::write_lp(&prepared.transport.model, std::io::BufWriter::new(file))?;
            println!("{}", serde_json::to_string_pretty(&prepared.transport.summary)?);
            log::info!("model written to {}", output.display());
        }

        Command::Stats {
            terrain,
            flags,
            params,
            append,
        } => {
            let t = read_terrain(&terrain)?;
            let grids = io::read_constraints(&flags, &params).with_context(|| {
                format!("Cannot read constraints {} / {}", flags.display(), params.display())
            })?;
            let stats =
                ConstraintStats::compute(&t, &grids, config.scale(t.size()), &config.thresholds)?;
            stats.log_summary();
            let line = serde_json::to_string(&stats.line())?;
            println!("{line}");
            if let Some(path) = append {
                io::append_line(&path, &line)?;
            }
        }
    }

    Ok(())
}
