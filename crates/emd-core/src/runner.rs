//! Pipeline orchestrator: distances → model → solver → report.

use std::time::Instant;

use crate::config::EmdConfig;
use crate::constraints::ConstraintGrids;
use crate::distance::DistanceMatrix;
use crate::error::Result;
use crate::extract::{extract, EmdReport};
use crate::model::Solver;
use crate::solver;
use crate::terrain::Terrain;
use crate::transport::{TransportMode, TransportModel, TransportModelBuilder};

/// Absolute slack allowed when checking a returned solution.
const VIOLATION_TOLERANCE: f64 = 1e-6;

/// A model ready to hand to a solver, with the distances it was built on.
#[derive(Debug, Clone)]
pub struct PreparedModel {
    pub distances: DistanceMatrix,
    pub transport: TransportModel,
}

/// Runs scoring and synthesis under one configuration.
pub struct EmdRunner {
    config: EmdConfig,
    solver: Box<dyn Solver>,
}

impl EmdRunner {
    /// Use the back-end the config names.
    pub fn new(config: EmdConfig) -> Self {
        let solver = solver::from_config(&config.solver);
        Self { config, solver }
    }

    pub fn with_solver(config: EmdConfig, solver: Box<dyn Solver>) -> Self {
        Self { config, solver }
    }

    pub fn config(&self) -> &EmdConfig {
        &self.config
    }

    /// Build the model for `source` without solving it.
    ///
    /// Pipeline order:
    ///   1. Ground distances at the configured scale
    ///   2. Imbalance penalty rate
    ///   3. Transport model (plus local constraints in generative mode)
    pub fn prepare(&self, source: &Terrain, mode: TransportMode<'_>) -> Result<PreparedModel> {
        let size = source.size();
        let start = Instant::now();

        // ── 1. Distances ────────────────────────────────────────────────────
        let distances = DistanceMatrix::build(size, self.config.scale(size));

        // ── 2. Sigma ────────────────────────────────────────────────────────
        let sigma = self.config.sigma_for(&distances);

        // ── 3. Model ────────────────────────────────────────────────────────
        let transport = TransportModelBuilder::new(&distances, sigma)
            .explicit_nonnegativity(self.config.explicit_nonnegativity)
            .build(source, mode)?;

        log::debug!(
            "prepared {}x{} model in {:.1} ms (scale {}, sigma {})",
            size,
            size,
            start.elapsed().as_secs_f64() * 1e3,
            distances.scale(),
            sigma
        );
        Ok(PreparedModel {
            distances,
            transport,
        })
    }

    pub fn solve(&self, prepared: &PreparedModel) -> Result<EmdReport> {
        let start = Instant::now();
        let solution = self.solver.solve(&prepared.transport.model)?;
        log::info!(
            "{} finished in {:.1} ms",
            self.solver.name(),
            start.elapsed().as_secs_f64() * 1e3
        );
        let violated = prepared
            .transport
            .model
            .violations(&solution.values, VIOLATION_TOLERANCE);
        if !violated.is_empty() {
            log::warn!(
                "solution violates {} constraints, first: {}",
                violated.len(),
                violated[0]
            );
        }
        extract(&prepared.transport, &prepared.distances, &solution)
    }

    /// Earth mover's distance between two known terrains.
    pub fn score(&self, source: &Terrain, target: &Terrain) -> Result<EmdReport> {
        let prepared = self.prepare(source, TransportMode::Scoring { target })?;
        self.solve(&prepared)
    }

    /// Synthesize the terrain closest to `source` that meets `constraints`.
    pub fn generate(
        &self,
        source: &Terrain,
        constraints: Option<&ConstraintGrids>,
    ) -> Result<EmdReport> {
        let prepared = self.prepare(source, TransportMode::Generative { constraints })?;
        self.solve(&prepared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;
    use crate::constraints::ConstraintFlags;
    use crate::error::EmdError;
    use crate::model::SolveStatus;
    use crate::solver::LpSolver;
    use crate::stats::ConstraintStats;
    use crate::terrain::Grid;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn unit_scale() -> EmdConfig {
        EmdConfig {
            reference_size: 3,
            ..EmdConfig::default()
        }
    }

    #[test]
    fn identical_terrains_score_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        let l = Terrain::from_flat(3, (0..9).map(|_| rng.gen_range(0.0..1.0)).collect()).unwrap();
        let report = EmdRunner::new(EmdConfig::default()).score(&l, &l).unwrap();
        assert_eq!(report.status, SolveStatus::Optimal);
        assert_abs_diff_eq!(report.emd.unwrap(), 0.0, epsilon = 1e-6);
        assert_relative_eq!(report.flow, l.total(), epsilon = 1e-6);
        assert_abs_diff_eq!(report.objective, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn single_masses_score_their_distance() {
        let mut l = vec![0.0; 9];
        let mut h = vec![0.0; 9];
        l[0] = 1.0;
        h[8] = 1.0;
        let (l, h) = (Terrain::from_flat(3, l).unwrap(), Terrain::from_flat(3, h).unwrap());
        let report = EmdRunner::new(EmdConfig::default()).score(&l, &h).unwrap();
        // scale (129 - 1) / (3 - 1) = 64, two diagonal steps
        assert_relative_eq!(report.emd.unwrap(), 8.0f64.sqrt() * 64.0, epsilon = 1e-6);
    }

    #[test]
    fn corner_masses_swap_diagonals() {
        let l = Terrain::from_columns(&[
            vec![1.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ])
        .unwrap();
        let h = Terrain::from_columns(&[
            vec![0.0, 0.0, 1.0],
            vec![0.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
        ])
        .unwrap();
        let report = EmdRunner::new(unit_scale()).score(&l, &h).unwrap();
        assert_relative_eq!(report.flow, 2.0, epsilon = 1e-6);
        assert_relative_eq!(report.cost, 4.0, epsilon = 1e-6);
        assert_relative_eq!(report.emd.unwrap(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn unequal_totals_move_the_smaller_mass() {
        let l = Terrain::filled(2, 1.0).unwrap();
        let h = Terrain::filled(2, 3.0).unwrap();
        let runner = EmdRunner::new(unit_scale());
        let report = runner.score(&l, &h).unwrap();
        assert_relative_eq!(report.flow, 4.0, epsilon = 1e-6);
        assert_abs_diff_eq!(report.cost, 0.0, epsilon = 1e-6);
        assert_relative_eq!(report.imbalance, 8.0);

        let prepared = runner.prepare(&l, TransportMode::Scoring { target: &h }).unwrap();
        let sigma = prepared.distances.max();
        assert_relative_eq!(report.objective, 8.0 * sigma, epsilon = 1e-6);
    }

    #[test]
    fn generative_position_pins_hold() {
        let l = Terrain::filled(2, 1.0).unwrap();
        let mut flags = vec![ConstraintFlags::NONE; 4];
        let mut params = vec![[0.0; 3]; 4];
        flags[0] = ConstraintFlags::POSITION;
        params[0][2] = 0.25;
        let grids = ConstraintGrids::new(
            Grid::from_flat(2, flags).unwrap(),
            Grid::from_flat(2, params).unwrap(),
        )
        .unwrap();

        let report = EmdRunner::new(unit_scale()).generate(&l, Some(&grids)).unwrap();
        let terrain = report.terrain.unwrap();
        assert_abs_diff_eq!(terrain.as_slice()[0], 0.25, epsilon = 1e-6);
        assert!(report.flow <= l.total() + 1e-6);
        assert!(report.flow <= terrain.total() + 1e-6);
    }

    #[test]
    fn unconstrained_generation_reproduces_the_source() {
        let l = Terrain::from_flat(2, vec![0.5, 1.0, 2.0, 0.0]).unwrap();
        let report = EmdRunner::with_solver(unit_scale(), Box::new(LpSolver))
            .generate(&l, None)
            .unwrap();
        assert_abs_diff_eq!(report.objective, 0.0, epsilon = 1e-6);
        let terrain = report.terrain.unwrap();
        for (a, b) in terrain.as_slice().iter().zip(l.as_slice()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn derivative_bound_holds_after_solve() {
        // Ramp rising by one per column, capped at 0.3 along +col at the centre.
        let l = Terrain::from_flat(3, (0..9).map(|k| (k / 3 + 1) as f64).collect()).unwrap();
        let mut flags = vec![ConstraintFlags::NONE; 9];
        flags[4] = ConstraintFlags::DERIVATIVE;
        let grids = ConstraintGrids::new(
            Grid::from_flat(3, flags).unwrap(),
            Grid::from_flat(3, vec![[0.3, 0.0, 0.0]; 9]).unwrap(),
        )
        .unwrap();

        let report = EmdRunner::with_solver(unit_scale(), Box::new(LpSolver))
            .generate(&l, Some(&grids))
            .unwrap();
        assert_eq!(report.status, SolveStatus::Optimal);
        assert!(report.objective > 0.0);

        let terrain = report.terrain.unwrap();
        let h = terrain.as_slice();
        assert!((h[7] - h[4]).abs() <= 0.3 + 1e-6);
        assert!((h[4] - h[1]).abs() <= 0.3 + 1e-6);

        let stats = ConstraintStats::compute(&terrain, &grids, 1.0, &Thresholds::default()).unwrap();
        assert_eq!(stats.derivative.count, 1);
        assert_eq!(stats.derivative.satisfied, 1);
        assert_abs_diff_eq!(stats.derivative.distance, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn quadratic_generation_needs_another_solver() {
        let l = Terrain::filled(3, 1.0).unwrap();
        let mut flags = vec![ConstraintFlags::NONE; 9];
        flags[4] = ConstraintFlags::ROUGHNESS;
        let grids = ConstraintGrids::new(
            Grid::from_flat(3, flags).unwrap(),
            Grid::from_flat(3, vec![[0.5, 0.0, 0.0]; 9]).unwrap(),
        )
        .unwrap();
        let err = EmdRunner::new(unit_scale()).generate(&l, Some(&grids)).unwrap_err();
        assert!(matches!(err, EmdError::SolverUnavailable(_)));
    }

    #[test]
    fn mismatched_sizes_fail_before_solving() {
        let l = Terrain::filled(2, 1.0).unwrap();
        let h = Terrain::filled(3, 1.0).unwrap();
        let err = EmdRunner::new(EmdConfig::default()).score(&l, &h).unwrap_err();
        assert!(matches!(err, EmdError::DimensionMismatch { .. }));
    }
}
