//! Earth mover's distance between terrains, and synthesis of the terrain
//! closest to a source under local geometric constraints.

pub mod config;
pub mod constraints;
pub mod coords;
pub mod distance;
pub mod error;
pub mod extract;
pub mod io;
pub mod model;
pub mod runner;
pub mod solver;
pub mod stats;
pub mod terrain;
pub mod transport;

pub use config::{EmdConfig, SolverConfig, Thresholds};
pub use constraints::{ConstraintFlags, ConstraintGrids, ConstraintParams};
pub use distance::DistanceMatrix;
pub use error::{EmdError, Result};
pub use extract::EmdReport;
pub use model::{Model, SolveStatus, Solution, Solver};
pub use runner::{EmdRunner, PreparedModel};
pub use stats::{ConstraintStats, StatsLine};
pub use terrain::{Grid, Terrain};
pub use transport::{ModelSummary, TransportMode, TransportModel, TransportModelBuilder};
