/// Experiment harness: runs the terrain generator for a number of seeds,
/// scores every generated pair (and optionally the synthesized optimum), and
/// collects the per-run files into one results JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use clap::Parser;
use emd_core::io::{
    self, CONSTRAINT_FLAGS_FILE, CONSTRAINT_PARAMS_FILE, SOURCE_TERRAIN_FILE, TARGET_TERRAIN_FILE,
};
use emd_core::{EmdConfig, EmdError, EmdRunner, StatsLine};
use serde::Serialize;

// ── Per-run files ────────────────────────────────────────────────────────────

const EMD_FILE: &str = "emd_out.txt";
const ITERS_FILE: &str = "iter_out.txt";
const L_STATS_FILE: &str = "stats_out_l.txt";
const H_STATS_FILE: &str = "stats_out_h.txt";

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "results", about = "Run and aggregate terrain EMD experiments")]
struct Args {
    /// Terrain size N (N×N vertices).
    size: usize,

    /// Number of samples (seeds 1..=samples).
    samples: usize,

    /// Tag appended to the results file name.
    code: String,

    /// Score each generated pair.
    #[arg(long)]
    emd: bool,

    /// Also synthesize the constrained optimum and score it. Implies --emd.
    #[arg(long)]
    opt: bool,

    /// Generator command run once per sample; `{size}` and `{seed}` are
    /// substituted. Without it the per-run files must already exist.
    #[arg(long)]
    generator: Option<String>,

    /// Directory the generator writes into and results are read from.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    #[arg(short, long)]
    config: Option<PathBuf>,
}

// ── Output schema ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Results {
    samples: usize,
    emd: Vec<Option<f64>>,
    emd_opt: Vec<Option<f64>>,
    iterations: Vec<Option<u64>>,
    #[serde(rename = "stats_L")]
    stats_l: Vec<Option<StatsLine>>,
    #[serde(rename = "stats_H")]
    stats_h: Vec<Option<StatsLine>>,
}

fn truncate(path: &Path) -> Result<()> {
    fs::write(path, "").with_context(|| format!("Cannot truncate {}", path.display()))
}

/// Lines of an optional per-run file; a missing file reads as empty.
fn lines_or_empty<T>(path: &Path, read: impl Fn(&Path) -> emd_core::Result<Vec<T>>) -> Result<Vec<T>> {
    match read(path) {
        Ok(v) => Ok(v),
        Err(EmdError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("{} not found, leaving it empty", path.display());
            Ok(Vec::new())
        }
        Err(e) => Err(e).with_context(|| format!("Cannot read {}", path.display())),
    }
}

/// With `--opt` the EMD file alternates plain and optimum lines.
fn split_emds(emds: Vec<Option<f64>>, samples: usize, opt: bool) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    if !opt {
        return (emds.into_iter().take(samples).collect(), Vec::new());
    }
    let mut plain = Vec::with_capacity(samples);
    let mut optimum = Vec::with_capacity(samples);
    for pair in emds.chunks(2).take(samples) {
        plain.push(pair[0]);
        optimum.push(pair.get(1).copied().flatten());
    }
    (plain, optimum)
}

fn run_generator(template: &str, size: usize, seed: usize, dir: &Path) -> Result<()> {
    let cmd = template
        .replace("{size}", &size.to_string())
        .replace("{seed}", &seed.to_string());
    let mut parts = cmd.split_whitespace();
    let Some(program) = parts.next() else {
        bail!("empty generator command");
    };
    log::info!("running {cmd}");
    let status = Command::new(program)
        .args(parts)
        .current_dir(dir)
        .status()
        .with_context(|| format!("Cannot run {program}"))?;
    if !status.success() {
        log::warn!("generator exited with {status} for seed {seed}");
    }
    Ok(())
}

/// Record one sample, appending `-` when the model has no optimum so lines
/// stay aligned. A missing or broken solver aborts the run.
fn append_emd(dir: &Path, outcome: emd_core::Result<emd_core::EmdReport>) -> Result<()> {
    let line = match outcome {
        Ok(report) => io::format_scalar(report.emd),
        Err(e @ (EmdError::ModelInfeasible(_) | EmdError::ModelSuboptimal { .. })) => {
            log::warn!("{e}");
            io::MISSING.to_string()
        }
        Err(e) => return Err(e.into()),
    };
    io::append_line(dir.join(EMD_FILE), &line)?;
    Ok(())
}

fn score_sample(runner: &EmdRunner, dir: &Path, opt: bool) -> Result<()> {
    let l = io::read_terrain(dir.join(SOURCE_TERRAIN_FILE))?;
    let h = io::read_terrain(dir.join(TARGET_TERRAIN_FILE))?;
    append_emd(dir, runner.score(&l, &h))?;

    if opt {
        let grids = io::read_constraints(
            dir.join(CONSTRAINT_FLAGS_FILE),
            dir.join(CONSTRAINT_PARAMS_FILE),
        )?;
        append_emd(dir, runner.generate(&l, Some(&grids)))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let emd = args.emd || args.opt;
    let dir = args.dir.as_path();

    let config = match &args.config {
        Some(p) => EmdConfig::load(p).with_context(|| format!("Cannot read config {}", p.display()))?,
        None => EmdConfig::default(),
    };
    let runner = EmdRunner::new(config);

    if args.generator.is_some() {
        for f in [ITERS_FILE, L_STATS_FILE, H_STATS_FILE] {
            truncate(&dir.join(f))?;
        }
    }
    if emd {
        truncate(&dir.join(EMD_FILE))?;
    }

    for seed in 1..=args.samples {
        if let Some(template) = &args.generator {
            run_generator(template, args.size, seed, dir)?;
        }
        if emd {
            score_sample(&runner, dir, args.opt)
                .with_context(|| format!("Sample {seed} failed"))?;
        }
    }

    let (emds, emds_opt) = if emd {
        let lines = lines_or_empty(&dir.join(EMD_FILE), |p| io::read_scalar_lines(p))?;
        split_emds(lines, args.samples, args.opt)
    } else {
        (Vec::new(), Vec::new())
    };

    let results = Results {
        samples: args.samples,
        emd: emds,
        emd_opt: emds_opt,
        iterations: lines_or_empty(&dir.join(ITERS_FILE), |p| io::read_json_lines(p))?,
        stats_l: lines_or_empty(&dir.join(L_STATS_FILE), |p| io::read_json_lines(p))?,
        stats_h: lines_or_empty(&dir.join(H_STATS_FILE), |p| io::read_json_lines(p))?,
    };

    let out = dir.join(format!("results_{0}x{0}_{1}.json", args.size, args.code));
    io::write_json(&out, &results)?;
    println!("Results have been written to {}", out.display());
    Ok(())
}
