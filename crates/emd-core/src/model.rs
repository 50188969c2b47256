//! Solver-neutral optimization model.
//!
//! The transport builder only talks to this representation; back-ends in
//! [`crate::solver`] translate it into whatever a concrete solver accepts.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Handle to a decision variable of one [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub lower: f64,
    /// `f64::INFINITY` when unbounded above.
    pub upper: f64,
}

/// `Σ coef · var + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            terms: Vec::with_capacity(n),
            constant: 0.0,
        }
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) -> &mut Self {
        self.terms.push((var, coef));
        self
    }

    /// Builder-style [`LinearExpr::add_term`].
    pub fn term(mut self, var: VarId, coef: f64) -> Self {
        self.terms.push((var, coef));
        self
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(v, c)| c * values[v.0])
            .sum::<f64>()
            + self.constant
    }
}

/// `Σ coef · a · b + linear`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuadExpr {
    pub quad: Vec<(VarId, VarId, f64)>,
    pub linear: LinearExpr,
}

impl QuadExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `(a − b)²` expanded as `a² − 2ab + b²`.
    pub fn add_squared_difference(&mut self, a: VarId, b: VarId) -> &mut Self {
        self.quad.push((a, a, 1.0));
        self.quad.push((a, b, -2.0));
        self.quad.push((b, b, 1.0));
        self
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.quad
            .iter()
            .map(|&(a, b, c)| c * values[a.0] * values[b.0])
            .sum::<f64>()
            + self.linear.evaluate(values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    /// `expr <= rhs`
    Le,
    /// `expr >= rhs`
    Ge,
    /// `expr == rhs`
    Eq,
}

impl Sense {
    /// Whether `lhs (sense) rhs` holds within `tolerance`.
    pub fn holds(self, lhs: f64, rhs: f64, tolerance: f64) -> bool {
        match self {
            Sense::Le => lhs <= rhs + tolerance,
            Sense::Ge => lhs >= rhs - tolerance,
            Sense::Eq => (lhs - rhs).abs() <= tolerance,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub name: String,
    pub expr: LinearExpr,
    pub sense: Sense,
    pub rhs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticConstraint {
    pub name: String,
    pub expr: QuadExpr,
    pub sense: Sense,
    pub rhs: f64,
}

/// A minimisation problem: bounded variables, a linear objective with an
/// optional constant, and linear / quadratic constraints.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub name: String,
    pub variables: Vec<Variable>,
    pub objective: LinearExpr,
    pub linear: Vec<LinearConstraint>,
    pub quadratic: Vec<QuadraticConstraint>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.variables.push(Variable {
            name: name.into(),
            lower,
            upper,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn add_linear_constraint(
        &mut self,
        name: impl Into<String>,
        expr: LinearExpr,
        sense: Sense,
        rhs: f64,
    ) {
        self.linear.push(LinearConstraint {
            name: name.into(),
            expr,
            sense,
            rhs,
        });
    }

    pub fn add_quadratic_constraint(
        &mut self,
        name: impl Into<String>,
        expr: QuadExpr,
        sense: Sense,
        rhs: f64,
    ) {
        self.quadratic.push(QuadraticConstraint {
            name: name.into(),
            expr,
            sense,
            rhs,
        });
    }

    /// Add `coef · var` to the (minimised) objective.
    pub fn set_objective_term(&mut self, var: VarId, coef: f64) {
        self.objective.add_term(var, coef);
    }

    /// Add a constant offset to the objective.
    pub fn add_objective_constant(&mut self, constant: f64) {
        self.objective.constant += constant;
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.linear.len() + self.quadratic.len()
    }

    pub fn is_linear(&self) -> bool {
        self.quadratic.is_empty()
    }

    /// Look up a variable handle by name.
    pub fn variable_by_name(&self, name: &str) -> Option<VarId> {
        self.variables.iter().position(|v| v.name == name).map(VarId)
    }

    /// Names of every constraint violated by `values` beyond `tolerance`.
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<&str> {
        let bounds = self
            .variables
            .iter()
            .zip(values)
            .filter(|&(v, &x)| x < v.lower - tolerance || x > v.upper + tolerance)
            .map(|(v, _)| v.name.as_str());
        let linear = self
            .linear
            .iter()
            .filter(|c| !c.sense.holds(c.expr.evaluate(values), c.rhs, tolerance))
            .map(|c| c.name.as_str());
        let quadratic = self
            .quadratic
            .iter()
            .filter(|c| !c.sense.holds(c.expr.evaluate(values), c.rhs, tolerance))
            .map(|c| c.name.as_str());
        bounds.chain(linear).chain(quadratic).collect()
    }
}

/// Terminal status of a successful solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    Optimal,
    /// A usable point, optimality not proven (time or resource limit).
    Feasible,
}

/// Primal values returned by a solver, one per model variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub status: SolveStatus,
    pub values: Vec<f64>,
}

impl Solution {
    #[inline]
    pub fn value(&self, var: VarId) -> f64 {
        self.values[var.0]
    }
}

/// An optimization back-end able to solve a [`Model`].
///
/// Infeasible or unbounded models fail with `ModelInfeasible`; back-ends that
/// cannot run (missing program, unsupported constraint kind) fail with
/// `SolverUnavailable`.
pub trait Solver {
    fn name(&self) -> &str;

    fn solve(&self, model: &Model) -> Result<Solution>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squared_difference_expands_correctly() {
        let mut m = Model::new("t");
        let a = m.add_variable("a", 0.0, f64::INFINITY);
        let b = m.add_variable("b", 0.0, f64::INFINITY);
        let mut q = QuadExpr::new();
        q.add_squared_difference(a, b);
        assert_eq!(q.evaluate(&[5.0, 2.0]), 9.0);
        assert_eq!(q.evaluate(&[2.0, 5.0]), 9.0);
    }

    #[test]
    fn violations_report_constraint_names() {
        let mut m = Model::new("t");
        let x = m.add_variable("x", 0.0, 10.0);
        m.add_linear_constraint("cap", LinearExpr::new().term(x, 1.0), Sense::Le, 3.0);
        m.add_linear_constraint("pin", LinearExpr::new().term(x, 1.0), Sense::Eq, 4.0);
        assert_eq!(m.violations(&[4.0], 1e-9), vec!["cap"]);
        assert_eq!(m.violations(&[11.0], 1e-9), vec!["x", "cap", "pin"]);
        assert!(m.violations(&[3.0], 1e-9).contains(&"pin"));
    }

    #[test]
    fn objective_includes_constant() {
        let mut m = Model::new("t");
        let x = m.add_variable("x", 0.0, f64::INFINITY);
        m.set_objective_term(x, 2.0);
        m.add_objective_constant(1.5);
        assert_eq!(m.objective.evaluate(&[3.0]), 7.5);
        assert_eq!(m.variable_by_name("x"), Some(x));
        assert!(m.is_linear());
    }
}
