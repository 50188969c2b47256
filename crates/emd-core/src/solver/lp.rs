//! In-process linear solver backed by `good_lp` (pure-Rust microlp back-end).

use good_lp::{
    default_solver, variable, Expression, ProblemVariables, ResolutionError,
    Solution as _, SolverModel, Variable as LpVariable,
};

use crate::error::{EmdError, Result};
use crate::model::{LinearExpr, Model, Sense, SolveStatus, Solution, Solver};

/// Solves linear models exactly; models with quadratic constraints are
/// rejected with `SolverUnavailable`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LpSolver;

fn expression(expr: &LinearExpr, vars: &[LpVariable]) -> Expression {
    let mut out = Expression::with_capacity(expr.terms.len());
    for &(v, coef) in &expr.terms {
        out.add_mul(coef, vars[v.0]);
    }
    out
}

impl Solver for LpSolver {
    fn name(&self) -> &str {
        "lp"
    }

    fn solve(&self, model: &Model) -> Result<Solution> {
        if !model.is_linear() {
            return Err(EmdError::SolverUnavailable(format!(
                "model has {} quadratic constraints; the in-process LP solver only handles linear models",
                model.quadratic.len()
            )));
        }

        let mut vars = ProblemVariables::new();
        let handles: Vec<LpVariable> = model
            .variables
            .iter()
            .map(|v| {
                let mut def = variable();
                if v.lower.is_finite() {
                    def = def.min(v.lower);
                }
                if v.upper.is_finite() {
                    def = def.max(v.upper);
                }
                vars.add(def)
            })
            .collect();

        // The objective constant does not move the optimum; it is added back
        // when the report evaluates the objective.
        let mut problem = vars
            .minimise(expression(&model.objective, &handles))
            .using(default_solver);

        for c in &model.linear {
            let lhs = expression(&c.expr, &handles);
            let rhs = c.rhs - c.expr.constant;
            let constraint = match c.sense {
                Sense::Le => lhs.leq(rhs),
                Sense::Ge => lhs.geq(rhs),
                Sense::Eq => lhs.eq(rhs),
            };
            problem = problem.with(constraint);
        }

        log::info!(
            "solving {} with {}: {} variables, {} constraints",
            model.name,
            self.name(),
            model.num_variables(),
            model.num_constraints()
        );
        let solution = problem.solve().map_err(|e| match e {
            ResolutionError::Infeasible => EmdError::ModelInfeasible("infeasible".into()),
            ResolutionError::Unbounded => EmdError::ModelInfeasible("unbounded".into()),
            other => EmdError::SolverUnavailable(other.to_string()),
        })?;

        Ok(Solution {
            status: SolveStatus::Optimal,
            values: handles.iter().map(|&h| solution.value(h)).collect(),
        })
    }
}
