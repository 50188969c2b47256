//! CPLEX LP file writer (the dialect Gurobi and most QCP solvers read) and a
//! reader for `name value` solution files.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;

use crate::error::{EmdError, Result};
use crate::model::{LinearExpr, Model, QuadExpr, Sense, SolveStatus, Solution};

/// Terms per line before wrapping; LP readers cap line length.
const TERMS_PER_LINE: usize = 8;

fn push_coef(out: &mut String, coef: f64, first: bool) {
    if coef < 0.0 {
        let _ = write!(out, "{}{} ", if first { "-" } else { " - " }, -coef);
    } else {
        let _ = write!(out, "{}{} ", if first { "" } else { " + " }, coef);
    }
}

fn push_linear(out: &mut String, model: &Model, expr: &LinearExpr) -> usize {
    for (k, &(v, coef)) in expr.terms.iter().enumerate() {
        if k > 0 && k % TERMS_PER_LINE == 0 {
            out.push_str("\n  ");
        }
        push_coef(out, coef, k == 0);
        out.push_str(&model.variables[v.0].name);
    }
    expr.terms.len()
}

fn push_quadratic(out: &mut String, model: &Model, expr: &QuadExpr) {
    let written = push_linear(out, model, &expr.linear);
    if expr.quad.is_empty() {
        return;
    }
    out.push_str(if written > 0 { " + [ " } else { "[ " });
    for (k, &(a, b, coef)) in expr.quad.iter().enumerate() {
        if k > 0 && k % TERMS_PER_LINE == 0 {
            out.push_str("\n  ");
        }
        push_coef(out, coef, k == 0);
        let (na, nb) = (&model.variables[a.0].name, &model.variables[b.0].name);
        if a == b {
            let _ = write!(out, "{na} ^ 2");
        } else {
            let _ = write!(out, "{na} * {nb}");
        }
    }
    out.push_str(" ]");
}

fn sense_str(sense: Sense) -> &'static str {
    match sense {
        Sense::Le => "<=",
        Sense::Ge => ">=",
        Sense::Eq => "=",
    }
}

/// Render `model` as an LP file.
pub fn to_lp_string(model: &Model) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\\ Model {}", model.name);
    out.push_str("Minimize\n obj: ");
    push_linear(&mut out, model, &model.objective);
    if model.objective.constant != 0.0 {
        push_coef(&mut out, model.objective.constant, model.objective.terms.is_empty());
    }
    out.push_str("\nSubject To\n");

    for c in &model.linear {
        let _ = write!(out, " {}: ", c.name);
        if c.expr.terms.is_empty() {
            out.push_str("0 ");
            out.push_str(&model.variables[0].name);
        } else {
            push_linear(&mut out, model, &c.expr);
        }
        let _ = writeln!(out, " {} {}", sense_str(c.sense), c.rhs - c.expr.constant);
    }
    for c in &model.quadratic {
        let _ = write!(out, " {}: ", c.name);
        push_quadratic(&mut out, model, &c.expr);
        let _ = writeln!(out, " {} {}", sense_str(c.sense), c.rhs - c.expr.linear.constant);
    }

    out.push_str("Bounds\n");
    for v in &model.variables {
        match (v.lower.is_finite(), v.upper.is_finite()) {
            (true, false) if v.lower == 0.0 => {}
            (true, false) => {
                let _ = writeln!(out, " {} >= {}", v.name, v.lower);
            }
            (true, true) => {
                let _ = writeln!(out, " {} <= {} <= {}", v.lower, v.name, v.upper);
            }
            (false, true) => {
                let _ = writeln!(out, " -inf <= {} <= {}", v.name, v.upper);
            }
            (false, false) => {
                let _ = writeln!(out, " {} free", v.name);
            }
        }
    }
    out.push_str("End\n");
    out
}

/// Write `model` as an LP file to `writer`.
pub fn write_lp(model: &Model, mut writer: impl Write) -> Result<()> {
    writer.write_all(to_lp_string(model).as_bytes())?;
    Ok(())
}

/// Parse a solution file: `name value` per line, `#` comments.
///
/// A `# Status = ...` comment sets the status: `OPTIMAL` is optimal,
/// `INFEASIBLE` / `UNBOUNDED` / `INF_OR_UNBD` fail, anything else (or no
/// status line) is a feasible point.
pub fn read_solution(model: &Model, text: &str) -> Result<Solution> {
    let index: HashMap<&str, usize> = model
        .variables
        .iter()
        .enumerate()
        .map(|(i, v)| (v.name.as_str(), i))
        .collect();
    let mut values: Vec<Option<f64>> = vec![None; model.num_variables()];
    let mut status = SolveStatus::Feasible;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(comment) = line.strip_prefix('#') {
            let Some((key, value)) = comment.split_once('=') else { continue };
            if !key.trim().eq_ignore_ascii_case("status") {
                continue;
            }
            match value.trim().to_ascii_uppercase().as_str() {
                "OPTIMAL" => status = SolveStatus::Optimal,
                s @ ("INFEASIBLE" | "UNBOUNDED" | "INF_OR_UNBD") => {
                    return Err(EmdError::ModelInfeasible(s.to_ascii_lowercase()))
                }
                _ => {}
            }
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(name), Some(raw)) = (parts.next(), parts.next()) else { continue };
        let Some(&i) = index.get(name) else { continue };
        let value = raw.parse::<f64>().map_err(|e| {
            EmdError::SolverUnavailable(format!("bad value {raw:?} for {name}: {e}"))
        })?;
        values[i] = Some(value);
    }

    if values.iter().all(Option::is_none) {
        return Err(EmdError::ModelInfeasible("solution file holds no values".into()));
    }
    let values = values
        .into_iter()
        .zip(&model.variables)
        .map(|(v, var)| {
            v.ok_or_else(|| {
                EmdError::SolverUnavailable(format!("solution file lacks a value for {}", var.name))
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(Solution { status, values })
}
