//! Hands the model to an external solver process through LP and solution
//! files. This is the route for quadratic (generative) models.

use std::path::Path;
use std::process::Command;

use crate::error::{EmdError, Result};
use crate::model::{Model, Solution, Solver};

use super::lp_format::{read_solution, write_lp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSolver {
    pub program: String,
    /// `{model}` and `{solution}` are replaced by the file paths.
    pub args: Vec<String>,
}

impl CommandSolver {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Gurobi's command-line front end.
    pub fn gurobi() -> Self {
        Self::new(
            "gurobi_cl",
            vec![
                "NonConvex=2".into(),
                "ResultFile={solution}".into(),
                "{model}".into(),
            ],
        )
    }

    fn expand_args(&self, model: &Path, solution: &Path) -> Vec<String> {
        let (model, solution) = (model.to_string_lossy(), solution.to_string_lossy());
        self.args
            .iter()
            .map(|a| a.replace("{model}", &model).replace("{solution}", &solution))
            .collect()
    }

    fn run_in(&self, dir: &Path, model: &Model) -> Result<Solution> {
        let model_path = dir.join("model.lp");
        let solution_path = dir.join("model.sol");
        write_lp(model, std::io::BufWriter::new(std::fs::File::create(&model_path)?))?;

        let args = self.expand_args(&model_path, &solution_path);
        log::debug!("running {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    EmdError::SolverUnavailable(format!("{} not found", self.program))
                }
                _ => EmdError::Io(e),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EmdError::SolverUnavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        // Most solvers write no solution file at all for infeasible models.
        match std::fs::read_to_string(&solution_path) {
            Ok(text) => read_solution(model, &text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                EmdError::ModelInfeasible(format!("{} produced no solution", self.program)),
            ),
            Err(e) => Err(e.into()),
        }
    }
}

impl Solver for CommandSolver {
    fn name(&self) -> &str {
        &self.program
    }

    fn solve(&self, model: &Model) -> Result<Solution> {
        // Fresh per solve, removed on drop.
        let dir = tempfile::Builder::new().prefix("emd-").tempdir()?;
        log::info!(
            "solving {} with {}: {} variables, {} constraints ({} quadratic)",
            model.name,
            self.program,
            model.num_variables(),
            model.num_constraints(),
            model.quadratic.len()
        );
        self.run_in(dir.path(), model)
    }
}
