use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::coords::{grid_spacing, REFERENCE_SIZE};
use crate::distance::DistanceMatrix;
use crate::error::{EmdError, Result};

/// Run configuration. Every field has a default, so a config file only needs
/// the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmdConfig {
    /// Resolution whose vertex spacing is the unit of physical distance.
    pub reference_size: usize,
    /// Cost per unit of created or destroyed mass. Defaults to the largest
    /// ground distance of the grid.
    pub sigma: Option<f64>,
    /// Also state `F >= 0` as explicit constraints, not only as variable bounds.
    pub explicit_nonnegativity: bool,
    pub thresholds: Thresholds,
    pub solver: SolverConfig,
}

impl Default for EmdConfig {
    fn default() -> Self {
        Self {
            reference_size: REFERENCE_SIZE,
            sigma: None,
            explicit_nonnegativity: true,
            thresholds: Thresholds::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl EmdConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make distances or penalties meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.reference_size < 2 {
            return Err(EmdError::InvalidConfig(format!(
                "reference_size must be at least 2 (got {})",
                self.reference_size
            )));
        }
        if let Some(sigma) = self.sigma {
            if !sigma.is_finite() || sigma < 0.0 {
                return Err(EmdError::InvalidConfig(format!(
                    "sigma must be a non-negative number (got {sigma})"
                )));
            }
        }
        Ok(())
    }

    /// Physical spacing between adjacent vertices of an N×N terrain.
    pub fn scale(&self, size: usize) -> f64 {
        grid_spacing(size, self.reference_size)
    }

    /// Imbalance penalty rate: the configured value, else the largest
    /// distance any unit of mass could travel.
    pub fn sigma_for(&self, distances: &DistanceMatrix) -> f64 {
        self.sigma.unwrap_or_else(|| distances.max())
    }
}

/// Tolerances used when judging whether a terrain satisfies its constraints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Slack on gradient and directional-derivative bounds.
    pub slope: f64,
    /// Allowed `|R − bound|` for roughness.
    pub roughness: f64,
    /// Allowed `|H − fixed|` for position pins.
    pub position: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            slope: 0.000_01,
            roughness: 0.04,
            position: 0.000_001,
        }
    }
}

/// Which back-end solves the assembled model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolverConfig {
    /// In-process linear solver; rejects quadratic constraints.
    #[default]
    Lp,
    /// External program fed an LP file. `{model}` and `{solution}` in `args`
    /// are replaced by the model and solution file paths.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: EmdConfig = serde_json::from_str(r#"{ "reference_size": 3 }"#).unwrap();
        assert_eq!(cfg.reference_size, 3);
        assert!(cfg.explicit_nonnegativity);
        assert_eq!(cfg.solver, SolverConfig::Lp);
        assert_eq!(cfg.thresholds.roughness, 0.04);
        assert_eq!(cfg.scale(3), 1.0);
    }

    #[test]
    fn command_solver_config() {
        let cfg: EmdConfig = serde_json::from_str(
            r#"{ "solver": { "kind": "command", "program": "gurobi_cl",
                 "args": ["ResultFile={solution}", "{model}"] } }"#,
        )
        .unwrap();
        match cfg.solver {
            SolverConfig::Command { program, args } => {
                assert_eq!(program, "gurobi_cl");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected solver config {other:?}"),
        }
    }

    #[test]
    fn degenerate_reference_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for size in [0, 1] {
            let path = dir.path().join(format!("ref{size}.json"));
            std::fs::write(&path, format!(r#"{{ "reference_size": {size} }}"#)).unwrap();
            assert!(matches!(EmdConfig::load(&path), Err(EmdError::InvalidConfig(_))));
        }

        let path = dir.path().join("ok.json");
        std::fs::write(&path, r#"{ "reference_size": 2 }"#).unwrap();
        assert_eq!(EmdConfig::load(&path).unwrap().scale(3), 0.5);
    }

    #[test]
    fn negative_sigma_is_rejected() {
        let cfg = EmdConfig { sigma: Some(-1.0), ..EmdConfig::default() };
        assert!(matches!(cfg.validate(), Err(EmdError::InvalidConfig(_))));
        assert!(EmdConfig::default().validate().is_ok());
    }

    #[test]
    fn sigma_defaults_to_longest_distance() {
        let cfg = EmdConfig::default();
        let d = DistanceMatrix::build(3, cfg.scale(3));
        assert_eq!(cfg.sigma_for(&d), d.max());
        let fixed = EmdConfig { sigma: Some(1000.0), ..EmdConfig::default() };
        assert_eq!(fixed.sigma_for(&d), 1000.0);
    }
}
