pub mod command;
pub mod lp;
pub mod lp_format;

pub use command::CommandSolver;
pub use lp::LpSolver;

use crate::config::SolverConfig;
use crate::model::Solver;

/// Instantiate the back-end a config names.
pub fn from_config(config: &SolverConfig) -> Box<dyn Solver> {
    match config {
        SolverConfig::Lp => Box::new(LpSolver),
        SolverConfig::Command { program, args } => {
            Box::new(CommandSolver::new(program.clone(), args.clone()))
        }
    }
}
