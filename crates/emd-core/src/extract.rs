use serde::Serialize;

use crate::distance::DistanceMatrix;
use crate::error::{EmdError, Result};
use crate::model::{SolveStatus, Solution};
use crate::terrain::Terrain;
use crate::transport::{ModelSummary, TransportModel};

/// Flow below this is treated as "nothing moved".
const MIN_FLOW: f64 = 1e-12;

/// Everything a run reports after the solver returns.
#[derive(Debug, Clone, Serialize)]
pub struct EmdReport {
    pub status: SolveStatus,
    /// `Σ F·d`, recomputed from the solved flows.
    pub cost: f64,
    /// `Σ F`.
    pub flow: f64,
    /// `cost / flow`; `None` when no mass moved.
    pub emd: Option<f64>,
    /// Model objective including imbalance penalties.
    pub objective: f64,
    /// `|Σ L − Σ H|` of the (solved) target.
    pub imbalance: f64,
    /// Synthesized terrain, generative mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terrain: Option<Terrain>,
    pub summary: ModelSummary,
}

impl EmdReport {
    /// Turn a feasible-but-unproven solution into a `ModelSuboptimal` error.
    pub fn require_optimal(self) -> Result<Self> {
        match self.status {
            SolveStatus::Optimal => Ok(self),
            SolveStatus::Feasible => Err(EmdError::ModelSuboptimal {
                objective: self.objective,
            }),
        }
    }
}

/// Read realized cost, flow, EMD and (generative mode) the synthesized terrain
/// out of a solution of `tm`.
pub fn extract(
    tm: &TransportModel,
    distances: &DistanceMatrix,
    solution: &Solution,
) -> Result<EmdReport> {
    if solution.values.len() != tm.model.num_variables() {
        return Err(EmdError::SolverUnavailable(format!(
            "solver returned {} values for {} variables",
            solution.values.len(),
            tm.model.num_variables()
        )));
    }

    let n = distances.vertices();
    let mut cost = 0.0;
    let mut flow = 0.0;
    for i in 0..n {
        for (j, &d) in distances.row(i).iter().enumerate() {
            let f = solution.value(tm.flow(i, j));
            cost += f * d;
            flow += f;
        }
    }
    let emd = (flow > MIN_FLOW).then(|| cost / flow);

    let terrain = match &tm.target {
        Some(vars) => {
            let values = vars.iter().map(|&v| solution.value(v)).collect();
            Some(Terrain::from_flat(tm.size, values)?)
        }
        None => None,
    };
    if let Some(t) = &terrain {
        let lowest = t.min_value();
        if lowest < -MIN_FLOW.sqrt() {
            log::warn!("synthesized terrain dips below zero ({lowest})");
        }
    }
    let target_total = terrain.as_ref().map(Terrain::total).or(tm.target_total).unwrap_or(0.0);

    let report = EmdReport {
        status: solution.status,
        cost,
        flow,
        emd,
        objective: tm.model.objective.evaluate(&solution.values),
        imbalance: (tm.source_total - target_total).abs(),
        terrain,
        summary: tm.summary,
    };

    match report.emd {
        Some(emd) => log::info!("cost {cost:.6}, flow {flow:.6}, emd {emd:.6}"),
        None => log::info!("no mass was moved, emd undefined"),
    }
    if report.status == SolveStatus::Feasible {
        log::warn!("solution is feasible but not proven optimal");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportMode, TransportModelBuilder};
    use approx::assert_relative_eq;

    #[test]
    fn cost_and_flow_come_from_flow_values() {
        let size = 2;
        let d = DistanceMatrix::build(size, 3.0);
        let l = Terrain::from_flat(size, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        let h = Terrain::from_flat(size, vec![0.0, 0.0, 0.0, 1.0]).unwrap();
        let tm = TransportModelBuilder::new(&d, 100.0)
            .build(&l, TransportMode::Scoring { target: &h })
            .unwrap();

        let mut values = vec![0.0; tm.model.num_variables()];
        values[tm.flow(0, 3).0] = 1.0;
        let report = extract(
            &tm,
            &d,
            &Solution {
                status: SolveStatus::Optimal,
                values,
            },
        )
        .unwrap();

        assert_relative_eq!(report.cost, 2.0f64.sqrt() * 3.0);
        assert_relative_eq!(report.flow, 1.0);
        assert_relative_eq!(report.emd.unwrap(), 2.0f64.sqrt() * 3.0);
        assert_eq!(report.imbalance, 0.0);
        assert!(report.terrain.is_none());
    }

    #[test]
    fn no_flow_means_undefined_emd() {
        let size = 2;
        let d = DistanceMatrix::build(size, 1.0);
        let empty = Terrain::filled(size, 0.0).unwrap();
        let tm = TransportModelBuilder::new(&d, 1.0)
            .build(&empty, TransportMode::Scoring { target: &empty })
            .unwrap();
        let solution = Solution {
            status: SolveStatus::Feasible,
            values: vec![0.0; tm.model.num_variables()],
        };
        let report = extract(&tm, &d, &solution).unwrap();
        assert!(report.emd.is_none());
        assert!(matches!(
            report.require_optimal(),
            Err(EmdError::ModelSuboptimal { .. })
        ));
    }

    #[test]
    fn wrong_value_count_is_rejected() {
        let d = DistanceMatrix::build(2, 1.0);
        let t = Terrain::filled(2, 1.0).unwrap();
        let tm = TransportModelBuilder::new(&d, 1.0)
            .build(&t, TransportMode::Scoring { target: &t })
            .unwrap();
        let solution = Solution {
            status: SolveStatus::Optimal,
            values: vec![0.0; 3],
        };
        assert!(extract(&tm, &d, &solution).is_err());
    }
}
