use thiserror::Error;

/// Errors raised while building, solving, or reading back a transport model.
#[derive(Debug, Error)]
pub enum EmdError {
    #[error("terrain must be at least 2x2 vertices (got size {0})")]
    GridTooSmall(usize),

    #[error("{what}: expected a {expected}x{expected} grid, found {found}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        found: String,
    },

    #[error("solver reported the model infeasible or unbounded: {0}")]
    ModelInfeasible(String),

    /// A usable point was found but optimality was not proven.
    #[error("solver returned a feasible but not provably optimal solution (objective {objective})")]
    ModelSuboptimal { objective: f64 },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("solver unavailable: {0}")]
    SolverUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EmdError {
    pub(crate) fn mismatch(what: impl Into<String>, expected: usize, found: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            found: found.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EmdError>;
