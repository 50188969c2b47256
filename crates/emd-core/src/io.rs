//! JSON grid files and the line-oriented result files a run appends to.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::constraints::ConstraintGrids;
use crate::error::{EmdError, Result};
use crate::terrain::Terrain;

// ── File names shared with the external terrain generator ────────────────────

pub const SOURCE_TERRAIN_FILE: &str = "terrain_out_l.json";
pub const TARGET_TERRAIN_FILE: &str = "terrain_out_h.json";
pub const CONSTRAINT_FLAGS_FILE: &str = "terrain_out_f.json";
pub const CONSTRAINT_PARAMS_FILE: &str = "terrain_out_c.json";

/// Written in place of a number when a run produced none.
pub const MISSING: &str = "-";

// ── JSON ─────────────────────────────────────────────────────────────────────

pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read a terrain stored as an array of columns.
pub fn read_terrain(path: impl AsRef<Path>) -> Result<Terrain> {
    let path = path.as_ref();
    let terrain: Terrain = read_json(path)?;
    log::debug!("read {}x{} terrain from {}", terrain.size(), terrain.size(), path.display());
    Ok(terrain)
}

pub fn read_constraints(
    flags: impl AsRef<Path>,
    params: impl AsRef<Path>,
) -> Result<ConstraintGrids> {
    ConstraintGrids::new(read_json(flags)?, read_json(params)?)
}

// ── Line files ───────────────────────────────────────────────────────────────

pub fn append_line(path: impl AsRef<Path>, line: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

pub fn format_scalar(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => MISSING.to_string(),
    }
}

/// One number (or `-`) per non-empty line.
pub fn read_scalar_lines(path: impl AsRef<Path>) -> Result<Vec<Option<f64>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == MISSING {
            out.push(None);
            continue;
        }
        let value = line.parse::<f64>().map_err(|e| {
            EmdError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("bad number {line:?}: {e}"),
            ))
        })?;
        out.push(Some(value));
    }
    Ok(out)
}

/// One JSON value per non-empty line; a `-` line reads as `None`.
pub fn read_json_lines<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<Option<T>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        match line {
            "" => {}
            MISSING => out.push(None),
            _ => out.push(Some(serde_json::from_str(line)?)),
        }
    }
    Ok(out)
}
