//! How well a terrain satisfies the local constraints attached to it.

use serde::{Deserialize, Serialize};

use crate::config::Thresholds;
use crate::constraints::{ConstraintFlags, ConstraintGrids, DirectionalBound, Quadrant, Region};
use crate::error::Result;
use crate::terrain::Terrain;

/// Tally for one constraint class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClassStats {
    pub count: usize,
    pub satisfied: usize,
    pub unsatisfied: usize,
    /// Mean distance from the goal value.
    pub distance: f64,
}

impl ClassStats {
    fn record(&mut self, ok: bool) {
        self.count += 1;
        if ok {
            self.satisfied += 1;
        } else {
            self.unsatisfied += 1;
        }
    }

    fn finish(mut self, divisor: usize) -> Self {
        if divisor > 0 {
            self.distance /= divisor as f64;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConstraintStats {
    pub points: usize,
    /// `Σ H`, the terrain's volume.
    pub total_supply: f64,
    /// Steepest single-axis slope at a gradient-constrained vertex.
    pub max_slope_1d: f64,
    /// Largest quadrant gradient magnitude at a gradient-constrained vertex.
    pub max_slope_2d: f64,
    pub gradient: ClassStats,
    pub derivative: ClassStats,
    pub roughness: ClassStats,
    pub position: ClassStats,
}

/// One line of a stats file. Field names are the keys downstream
/// aggregation expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsLine {
    pub n_s: usize,
    pub n_d: usize,
    pub n_r: usize,
    pub n_p: usize,
    pub s_s: usize,
    pub s_d: usize,
    pub s_r: usize,
    pub s_p: usize,
    pub u_s: usize,
    pub u_d: usize,
    pub u_r: usize,
    pub u_p: usize,
    pub d_s: f64,
    pub d_d: f64,
    pub d_r: f64,
    pub d_p: f64,
}

/// `sqrt(Σ (H[n] − H[x])²) / scale` over the boundary-aware neighbourhood.
pub fn roughness_at(heights: &[f64], index: usize, size: usize, scale: f64) -> f64 {
    let sum: f64 = Region::of(index, size)
        .neighbours(index, size)
        .map(|n| (heights[n] - heights[index]).powi(2))
        .sum();
    sum.sqrt() / scale
}

/// Per-quadrant slope `(s_col, s_row)` at `index`, signed so that it is a
/// gradient estimate.
fn quadrant_slopes(
    heights: &[f64],
    index: usize,
    size: usize,
    scale: f64,
) -> impl Iterator<Item = (f64, f64)> + '_ {
    Quadrant::ALL.into_iter().filter_map(move |q| {
        let nb = q.neighbours(index, size)?;
        let (sc, sr) = q.steps();
        Some((
            sc as f64 * (heights[nb.col] - heights[index]) / scale,
            sr as f64 * (heights[nb.row] - heights[index]) / scale,
        ))
    })
}

impl ConstraintStats {
    pub fn compute(
        terrain: &Terrain,
        grids: &ConstraintGrids,
        scale: f64,
        thresholds: &Thresholds,
    ) -> Result<Self> {
        let size = terrain.size();
        grids.flags.expect_size("constraint flags", size)?;
        let h = terrain.as_slice();

        let mut stats = Self {
            points: terrain.len(),
            total_supply: terrain.total(),
            ..Self::default()
        };

        let mut gradient = ClassStats::default();
        for (x, params) in grids.with_flag(ConstraintFlags::GRADIENT) {
            let bound = params[0];
            let mut ok = true;
            for (s_col, s_row) in quadrant_slopes(h, x, size, scale) {
                let g = s_col.hypot(s_row);
                gradient.distance += (g - bound).max(0.0);
                ok &= g <= bound + thresholds.slope;
                stats.max_slope_2d = stats.max_slope_2d.max(g);
            }
            gradient.record(ok);
        }
        stats.gradient = gradient.finish(gradient.count * 4);
        stats.max_slope_1d = max_slope_1d(h, grids, size, scale);

        let mut derivative = ClassStats::default();
        for (x, params) in grids.with_flag(ConstraintFlags::DERIVATIVE) {
            let mut ok = true;
            if let Some(db) = DirectionalBound::from_vector(params[0], params[1]) {
                let (dc, dr) = db.direction;
                for (s_col, s_row) in quadrant_slopes(h, x, size, scale) {
                    let d = (s_col * dc + s_row * dr).abs();
                    derivative.distance += (d - db.bound).max(0.0);
                    ok &= d <= db.bound + thresholds.slope;
                }
            }
            derivative.record(ok);
        }
        stats.derivative = derivative.finish(derivative.count * 4);

        let mut roughness = ClassStats::default();
        for (x, params) in grids.with_flag(ConstraintFlags::ROUGHNESS) {
            let dist = (roughness_at(h, x, size, scale) - params[0]).abs();
            roughness.distance += dist;
            roughness.record(dist <= thresholds.roughness);
        }
        stats.roughness = roughness.finish(roughness.count);

        let mut position = ClassStats::default();
        for (x, params) in grids.with_flag(ConstraintFlags::POSITION) {
            let dist = (h[x] - params[2]).abs();
            position.distance += dist;
            position.record(dist <= thresholds.position);
        }
        stats.position = position.finish(position.count);

        Ok(stats)
    }

    pub fn line(&self) -> StatsLine {
        let (g, d, r, p) = (&self.gradient, &self.derivative, &self.roughness, &self.position);
        StatsLine {
            n_s: g.count,
            n_d: d.count,
            n_r: r.count,
            n_p: p.count,
            s_s: g.satisfied,
            s_d: d.satisfied,
            s_r: r.satisfied,
            s_p: p.satisfied,
            u_s: g.unsatisfied,
            u_d: d.unsatisfied,
            u_r: r.unsatisfied,
            u_p: p.unsatisfied,
            d_s: g.distance,
            d_d: d.distance,
            d_r: r.distance,
            d_p: p.distance,
        }
    }

    pub fn log_summary(&self) {
        log::info!(
            "{} points, total supply {:.6}, max slope 1d {:.6}, 2d {:.6}",
            self.points,
            self.total_supply,
            self.max_slope_1d,
            self.max_slope_2d
        );
        for (name, c) in [
            ("gradient", &self.gradient),
            ("derivative", &self.derivative),
            ("roughness", &self.roughness),
            ("position", &self.position),
        ] {
            if c.count > 0 {
                log::info!(
                    "{name}: {}/{} satisfied, mean distance {:.6}",
                    c.satisfied,
                    c.count,
                    c.distance
                );
            }
        }
    }
}

/// Steepest forward difference along either axis, starting from a
/// gradient-constrained vertex.
fn max_slope_1d(h: &[f64], grids: &ConstraintGrids, size: usize, scale: f64) -> f64 {
    let flags = grids.flags.as_slice();
    let mut m = 0.0f64;
    for x in (0..h.len()).filter(|&x| flags[x].contains(ConstraintFlags::GRADIENT)) {
        let (col, row) = (x / size, x % size);
        if col + 1 < size {
            m = m.max(((h[x + size] - h[x]) / scale).abs());
        }
        if row + 1 < size {
            m = m.max(((h[x + 1] - h[x]) / scale).abs());
        }
    }
    m
}
