//! Assembles the transportation model between a source terrain `L` and a
//! target `H`.
//!
//! Variables `F[i][j]` move mass from source vertex `i` to sink vertex `j` at
//! cost `d(i, j)` per unit. In scoring mode `H` is a known terrain; in
//! generative mode `H` is unknown and shaped by local geometric constraints.

use crate::constraints::{classify, ConstraintBuckets, ConstraintGrids, Quadrant, Region};
use crate::coords::GridCoord;
use crate::distance::DistanceMatrix;
use crate::error::Result;
use crate::model::{LinearExpr, Model, QuadExpr, Sense, VarId};
use crate::terrain::Terrain;

/// What the model is asked to do with the target terrain.
#[derive(Debug, Clone, Copy)]
pub enum TransportMode<'a> {
    /// Compare `L` against a fixed `H`.
    Scoring { target: &'a Terrain },
    /// Synthesize `H`; `None` means no local constraints.
    Generative {
        constraints: Option<&'a ConstraintGrids>,
    },
}

impl TransportMode<'_> {
    pub fn is_generative(&self) -> bool {
        matches!(self, TransportMode::Generative { .. })
    }
}

/// Sizes of the assembled model, for logging and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ModelSummary {
    pub variables: usize,
    pub linear_constraints: usize,
    pub quadratic_constraints: usize,
    pub gradient: usize,
    pub derivative: usize,
    pub roughness: usize,
    pub position: usize,
}

/// A built model plus the handles needed to read its solution back.
#[derive(Debug, Clone)]
pub struct TransportModel {
    pub model: Model,
    pub size: usize,
    /// `F[i][j]` lives at `flows[i * n + j]` with `n = size²`.
    pub flows: Vec<VarId>,
    /// Unknown terrain values, generative mode only.
    pub target: Option<Vec<VarId>>,
    /// `(S+, S-)`, generative mode only.
    pub slack: Option<(VarId, VarId)>,
    pub sigma: f64,
    /// `Σ L` and `Σ H` (the latter only when `H` is known).
    pub source_total: f64,
    pub target_total: Option<f64>,
    pub summary: ModelSummary,
}

impl TransportModel {
    #[inline]
    pub fn flow(&self, i: usize, j: usize) -> VarId {
        self.flows[i * self.size * self.size + j]
    }

    pub fn is_generative(&self) -> bool {
        self.target.is_some()
    }
}

/// Builds [`TransportModel`]s over one shared distance matrix.
#[derive(Debug, Clone)]
pub struct TransportModelBuilder<'a> {
    distances: &'a DistanceMatrix,
    sigma: f64,
    explicit_nonnegativity: bool,
}

impl<'a> TransportModelBuilder<'a> {
    pub fn new(distances: &'a DistanceMatrix, sigma: f64) -> Self {
        Self {
            distances,
            sigma,
            explicit_nonnegativity: true,
        }
    }

    /// Whether to restate `F >= 0` as constraints on top of the variable bounds.
    pub fn explicit_nonnegativity(mut self, on: bool) -> Self {
        self.explicit_nonnegativity = on;
        self
    }

    pub fn build(&self, source: &Terrain, mode: TransportMode<'_>) -> Result<TransportModel> {
        let size = self.distances.size();
        source.expect_size("source terrain", size)?;

        // Validate everything before any variable is created.
        let buckets = match mode {
            TransportMode::Scoring { target } => {
                target.expect_size("target terrain", size)?;
                None
            }
            TransportMode::Generative { constraints } => Some(classify(size, constraints)?),
        };

        let name = if mode.is_generative() { "EMD_generate" } else { "EMD" };
        let mut model = Model::new(name);
        let flows = self.add_flows(&mut model, source);

        let mut tm = TransportModel {
            model,
            size,
            flows,
            target: None,
            slack: None,
            sigma: self.sigma,
            source_total: source.total(),
            target_total: None,
            summary: ModelSummary::default(),
        };

        match mode {
            TransportMode::Scoring { target } => self.add_scoring(&mut tm, target),
            TransportMode::Generative { .. } => {
                let buckets = buckets.unwrap_or_default();
                self.add_generative(&mut tm);
                self.add_local_constraints(&mut tm, &buckets);
                let (g, d, r, p) = buckets.counts();
                tm.summary.gradient = g;
                tm.summary.derivative = d;
                tm.summary.roughness = r;
                tm.summary.position = p;
            }
        }

        tm.summary.variables = tm.model.num_variables();
        tm.summary.linear_constraints = tm.model.linear.len();
        tm.summary.quadratic_constraints = tm.model.quadratic.len();
        log::info!(
            "built {} model: {} variables, {} linear and {} quadratic constraints",
            tm.model.name,
            tm.summary.variables,
            tm.summary.linear_constraints,
            tm.summary.quadratic_constraints,
        );
        Ok(tm)
    }

    /// Flow variables, transport cost objective, non-negativity and outflow caps.
    fn add_flows(&self, model: &mut Model, source: &Terrain) -> Vec<VarId> {
        let size = self.distances.size();
        let n = self.distances.vertices();
        let mut flows = Vec::with_capacity(n * n);

        for i in 0..n {
            let from = GridCoord::from_index(i, size);
            for (j, &dist) in self.distances.row(i).iter().enumerate() {
                let to = GridCoord::from_index(j, size);
                let f = model.add_variable(
                    format!("F_{}_{}_{}_{}", from.col, from.row, to.col, to.row),
                    0.0,
                    f64::INFINITY,
                );
                model.set_objective_term(f, dist);
                flows.push(f);
            }
        }

        if self.explicit_nonnegativity {
            for (k, &f) in flows.iter().enumerate() {
                model.add_linear_constraint(
                    format!("nonneg_{}_{}", k / n, k % n),
                    LinearExpr::new().term(f, 1.0),
                    Sense::Ge,
                    0.0,
                );
            }
        }

        for (i, &supply) in source.as_slice().iter().enumerate() {
            let mut out = LinearExpr::with_capacity(n);
            for &f in &flows[i * n..(i + 1) * n] {
                out.add_term(f, 1.0);
            }
            model.add_linear_constraint(format!("out_{i}"), out, Sense::Le, supply);
        }

        flows
    }

    fn inflow(&self, flows: &[VarId], j: usize) -> LinearExpr {
        let n = self.distances.vertices();
        let mut inflow = LinearExpr::with_capacity(n + 1);
        for i in 0..n {
            inflow.add_term(flows[i * n + j], 1.0);
        }
        inflow
    }

    fn total_flow(flows: &[VarId]) -> LinearExpr {
        let mut total = LinearExpr::with_capacity(flows.len());
        for &f in flows {
            total.add_term(f, 1.0);
        }
        total
    }

    fn add_scoring(&self, tm: &mut TransportModel, target: &Terrain) {
        for (j, &demand) in target.as_slice().iter().enumerate() {
            let inflow = self.inflow(&tm.flows, j);
            tm.model.add_linear_constraint(format!("in_{j}"), inflow, Sense::Le, demand);
        }

        // Ship exactly the largest feasible amount of mass.
        let target_total = target.total();
        let shipped = tm.source_total.min(target_total);
        tm.model.add_linear_constraint(
            "total_flow",
            Self::total_flow(&tm.flows),
            Sense::Eq,
            shipped,
        );

        // L and H are both fixed, so the imbalance is a reporting offset only.
        tm.model
            .add_objective_constant(self.sigma * (tm.source_total - target_total).abs());
        tm.target_total = Some(target_total);
    }

    fn add_generative(&self, tm: &mut TransportModel) {
        let size = tm.size;
        let n = size * size;
        let model = &mut tm.model;

        let target: Vec<VarId> = (0..n)
            .map(|j| {
                let at = GridCoord::from_index(j, size);
                model.add_variable(format!("H_{}_{}", at.col, at.row), 0.0, f64::INFINITY)
            })
            .collect();

        // H is defined by what flows in: no net mass creation at a sink.
        for (j, &h) in target.iter().enumerate() {
            let inflow = self.inflow(&tm.flows, j).term(h, -1.0);
            model.add_linear_constraint(format!("in_{j}"), inflow, Sense::Eq, 0.0);
        }

        model.add_linear_constraint(
            "total_supply",
            Self::total_flow(&tm.flows),
            Sense::Le,
            tm.source_total,
        );
        let mut to_target = Self::total_flow(&tm.flows);
        for &h in &target {
            to_target.add_term(h, -1.0);
        }
        model.add_linear_constraint("total_target", to_target, Sense::Le, 0.0);

        // S+ >= ΣH − ΣL and S- >= ΣL − ΣH, both charged at sigma.
        let s_plus = model.add_variable("S_plus", 0.0, f64::INFINITY);
        let s_minus = model.add_variable("S_minus", 0.0, f64::INFINITY);
        let mut surplus = LinearExpr::with_capacity(n + 1);
        let mut deficit = LinearExpr::with_capacity(n + 1);
        for &h in &target {
            surplus.add_term(h, 1.0);
            deficit.add_term(h, -1.0);
        }
        model.add_linear_constraint(
            "imbalance_plus",
            surplus.term(s_plus, -1.0),
            Sense::Le,
            tm.source_total,
        );
        model.add_linear_constraint(
            "imbalance_minus",
            deficit.term(s_minus, -1.0),
            Sense::Le,
            -tm.source_total,
        );
        model.set_objective_term(s_plus, self.sigma);
        model.set_objective_term(s_minus, self.sigma);

        tm.target = Some(target);
        tm.slack = Some((s_plus, s_minus));
    }

    fn add_local_constraints(&self, tm: &mut TransportModel, buckets: &ConstraintBuckets) {
        let size = tm.size;
        let scale = self.distances.scale();
        let Some(h) = tm.target.as_deref() else {
            return;
        };
        let model = &mut tm.model;

        for q in Quadrant::ALL {
            for (&x, &bound) in buckets.gradient(q) {
                let Some(nb) = q.neighbours(x, size) else { continue };
                let mut expr = QuadExpr::new();
                expr.add_squared_difference(h[nb.col], h[x]);
                expr.add_squared_difference(h[nb.row], h[x]);
                let cap = scale * bound;
                model.add_quadratic_constraint(format!("grad_{q:?}_{x}"), expr, Sense::Le, cap * cap);
            }

            // D · (sc·(H[col] − H[x]), sr·(H[row] − H[x])) within ±scale·d.
            let (sc, sr) = q.steps();
            for (&x, db) in buckets.derivative(q) {
                let Some(nb) = q.neighbours(x, size) else { continue };
                let wc = db.direction.0 * sc as f64;
                let wr = db.direction.1 * sr as f64;
                let projection = LinearExpr::with_capacity(3)
                    .term(h[nb.col], wc)
                    .term(h[nb.row], wr)
                    .term(h[x], -(wc + wr));
                let limit = scale * db.bound;
                model.add_linear_constraint(
                    format!("deriv_{q:?}_{x}_lo"),
                    projection.clone(),
                    Sense::Ge,
                    -limit,
                );
                model.add_linear_constraint(format!("deriv_{q:?}_{x}_hi"), projection, Sense::Le, limit);
            }
        }

        for region in Region::ALL {
            for (&x, &bound) in buckets.roughness(region) {
                let mut expr = QuadExpr::new();
                for n in region.neighbours(x, size) {
                    expr.add_squared_difference(h[n], h[x]);
                }
                let target = scale * bound;
                model.add_quadratic_constraint(format!("rough_{x}"), expr, Sense::Eq, target * target);
            }
        }

        for (&x, &value) in buckets.position() {
            model.add_linear_constraint(
                format!("pos_{x}"),
                LinearExpr::new().term(h[x], 1.0),
                Sense::Eq,
                value,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintFlags;
    use crate::error::EmdError;
    use crate::terrain::Grid;

    fn flat(size: usize, v: f64) -> Terrain {
        Terrain::filled(size, v).unwrap()
    }

    #[test]
    fn scoring_model_shape() {
        let size = 2;
        let d = DistanceMatrix::build(size, 1.0);
        let l = flat(size, 1.0);
        let h = flat(size, 2.0);
        let tm = TransportModelBuilder::new(&d, 10.0)
            .build(&l, TransportMode::Scoring { target: &h })
            .unwrap();

        // 16 flows; 16 non-negativity + 4 out + 4 in + 1 total.
        assert_eq!(tm.model.num_variables(), 16);
        assert_eq!(tm.model.linear.len(), 25);
        assert!(tm.model.is_linear());
        assert_eq!(tm.target_total, Some(8.0));
        // |4 − 8| · sigma
        assert_eq!(tm.model.objective.constant, 40.0);

        let total = tm.model.linear.iter().find(|c| c.name == "total_flow").unwrap();
        assert_eq!(total.sense, Sense::Eq);
        assert_eq!(total.rhs, 4.0);
    }

    #[test]
    fn objective_coefficients_are_distances() {
        let size = 3;
        let d = DistanceMatrix::build(size, 2.0);
        let l = flat(size, 1.0);
        let tm = TransportModelBuilder::new(&d, 1.0)
            .explicit_nonnegativity(false)
            .build(&l, TransportMode::Scoring { target: &l })
            .unwrap();
        for &(var, coef) in &tm.model.objective.terms {
            let (i, j) = (var.0 / 9, var.0 % 9);
            assert_eq!(tm.flow(i, j), var);
            assert_eq!(coef, d.get(i, j));
        }
        assert!(tm.model.linear.iter().all(|c| !c.name.starts_with("nonneg")));
    }

    #[test]
    fn size_mismatch_fails_before_building() {
        let d = DistanceMatrix::build(3, 1.0);
        let l = flat(3, 1.0);
        let h = flat(4, 1.0);
        let err = TransportModelBuilder::new(&d, 1.0)
            .build(&l, TransportMode::Scoring { target: &h })
            .unwrap_err();
        assert!(matches!(err, EmdError::DimensionMismatch { .. }));

        let grids = ConstraintGrids::empty(4).unwrap();
        let err = TransportModelBuilder::new(&d, 1.0)
            .build(&l, TransportMode::Generative { constraints: Some(&grids) })
            .unwrap_err();
        assert!(matches!(err, EmdError::DimensionMismatch { .. }));
    }

    #[test]
    fn generative_model_adds_target_and_slack() {
        let size = 2;
        let d = DistanceMatrix::build(size, 1.0);
        let l = flat(size, 1.0);
        let tm = TransportModelBuilder::new(&d, 5.0)
            .explicit_nonnegativity(false)
            .build(&l, TransportMode::Generative { constraints: None })
            .unwrap();

        assert_eq!(tm.target.as_ref().map(Vec::len), Some(4));
        let (sp, sm) = tm.slack.unwrap();
        assert!(tm.model.objective.terms.contains(&(sp, 5.0)));
        assert!(tm.model.objective.terms.contains(&(sm, 5.0)));
        // 16 flows + 4 H + 2 slack
        assert_eq!(tm.model.num_variables(), 22);
        // 4 out + 4 in + 2 totals + 2 imbalance
        assert_eq!(tm.model.linear.len(), 12);
        let inflow = tm.model.linear.iter().find(|c| c.name == "in_0").unwrap();
        assert_eq!(inflow.sense, Sense::Eq);
    }

    #[test]
    fn local_constraints_follow_buckets() {
        let size = 3;
        let d = DistanceMatrix::build(size, 2.0);
        let l = flat(size, 1.0);
        let centre = GridCoord::new(1, 1);

        let mut flags = Grid::filled(size, ConstraintFlags::NONE).unwrap();
        flags.set(
            centre,
            ConstraintFlags::GRADIENT | ConstraintFlags::DERIVATIVE | ConstraintFlags::ROUGHNESS,
        );
        flags.set(GridCoord::new(0, 0), ConstraintFlags::POSITION);
        let params = Grid::filled(size, [0.5, 0.0, 3.0]).unwrap();
        let grids = ConstraintGrids::new(flags, params).unwrap();

        let tm = TransportModelBuilder::new(&d, 1.0)
            .explicit_nonnegativity(false)
            .build(&l, TransportMode::Generative { constraints: Some(&grids) })
            .unwrap();

        // 4 gradient quadrants + 1 roughness at the centre.
        assert_eq!(tm.model.quadratic.len(), 5);
        assert_eq!(tm.summary.gradient, 4);
        assert_eq!(tm.summary.derivative, 4);
        assert_eq!(tm.summary.position, 1);
        let grad = &tm.model.quadratic[0];
        assert_eq!(grad.rhs, 1.0); // (2 · 0.5)²

        let rough = tm.model.quadratic.iter().find(|c| c.name == "rough_4").unwrap();
        assert_eq!(rough.sense, Sense::Eq);
        assert_eq!(rough.expr.quad.len(), 8 * 3);

        let pos = tm.model.linear.iter().find(|c| c.name == "pos_0").unwrap();
        assert_eq!(pos.rhs, 3.0);

        // Direction (1, 0): the NE projection is H[col] − H[x].
        let h = tm.target.as_ref().unwrap();
        let hi = tm.model.linear.iter().find(|c| c.name == "deriv_NorthEast_4_hi").unwrap();
        let x = centre.index(size);
        assert_eq!(hi.rhs, 1.0);
        assert!(hi.expr.terms.contains(&(h[x + size], 1.0)));
        assert!(hi.expr.terms.contains(&(h[x], -1.0)));
        // And the SW projection flips the column sign.
        let sw = tm.model.linear.iter().find(|c| c.name == "deriv_SouthWest_4_lo").unwrap();
        assert!(sw.expr.terms.contains(&(h[x - size], -1.0)));
        assert_eq!(sw.rhs, -1.0);
    }

    #[test]
    fn gradient_and_roughness_checked_against_values() {
        let size = 3;
        let d = DistanceMatrix::build(size, 1.0);
        // Flat at 1 with a raised centre: every neighbour differs by 0.5, so
        // each quadrant gradient is √0.5 and the roughness is √2.
        let mut heights = vec![1.0; 9];
        heights[4] = 1.5;
        let l = Terrain::from_flat(size, heights.clone()).unwrap();

        let mut flags = Grid::filled(size, ConstraintFlags::NONE).unwrap();
        flags.set(GridCoord::new(1, 1), ConstraintFlags::GRADIENT | ConstraintFlags::ROUGHNESS);
        let params = Grid::filled(size, [2.0f64.sqrt(), 0.0, 0.0]).unwrap();
        let grids = ConstraintGrids::new(flags, params).unwrap();

        let tm = TransportModelBuilder::new(&d, 10.0)
            .build(&l, TransportMode::Generative { constraints: Some(&grids) })
            .unwrap();
        let h = tm.target.clone().unwrap();

        // Every vertex keeps its own mass: H = L and no slack.
        let mut values = vec![0.0; tm.model.num_variables()];
        for (i, &v) in heights.iter().enumerate() {
            values[tm.flow(i, i).0] = v;
            values[h[i].0] = v;
        }
        assert!(tm.model.violations(&values, 1e-9).is_empty());

        values[h[4].0] = 3.0;
        let violated = tm.model.violations(&values, 1e-9);
        assert!(violated.iter().any(|n| n.starts_with("grad_")));
        assert!(violated.iter().any(|n| *n == "rough_4"));
    }
}
