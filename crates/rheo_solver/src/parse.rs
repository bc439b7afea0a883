//! Parsers for the native solution formats of the supported solvers.
//!
//! cbc and glpsol report columns positionally, in the order variables first
//! appear in the LP text, so both parsers take the [`LpLayout`] produced when
//! the model was written. Gurobi reports by name.

use crate::SolverError;
use rheo_milp::lp::LpLayout;
use rheo_milp::{Model, Status};

fn bad<T>(message: impl Into<String>) -> Result<T, SolverError> {
    Err(SolverError::MalformedSolution(message.into()))
}

fn parse_num(token: &str, what: &str) -> Result<f64, SolverError> {
    token
        .parse()
        .map_err(|_| SolverError::MalformedSolution(format!("{what}: `{token}` is not a number")))
}

/// Parses a cbc `gsolution` dump: a `rows cols` header, a status line whose
/// first token is the verdict code and whose last token is the objective,
/// one line per row, then one line per column (either a bare value or
/// `index value [cost]`).
pub fn parse_cbc_solution(
    text: &str,
    model: &mut Model,
    layout: &LpLayout,
) -> Result<Status, SolverError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or_else(|| {
        SolverError::MalformedSolution("empty cbc solution".to_string())
    })?;
    let counts: Vec<&str> = header.split_whitespace().collect();
    if counts.len() != 2 {
        return bad(format!("cbc header `{header}` is not `rows cols`"));
    }
    let nrows = parse_num(counts[0], "cbc row count")? as usize;
    let ncols = parse_num(counts[1], "cbc column count")? as usize;
    if ncols != layout.num_cols() {
        return bad(format!(
            "cbc reports {ncols} columns, the LP file had {}",
            layout.num_cols()
        ));
    }

    let status_line = lines
        .next()
        .ok_or_else(|| SolverError::MalformedSolution("cbc solution missing status".into()))?;
    let tokens: Vec<&str> = status_line.split_whitespace().collect();
    let code = parse_num(tokens[0], "cbc status code")? as i64;
    let status = match code {
        5 => Status::Optimal,
        2 => Status::Feasible,
        4 => Status::Infeasible,
        1 => Status::Unbounded,
        _ => Status::Unknown,
    };
    model.set_status(status);
    if !status.has_solution() {
        return Ok(status);
    }
    // A bare status code carries no objective value.
    if tokens.len() > 1 {
        model.set_objective_value(parse_num(tokens[tokens.len() - 1], "cbc objective")?);
    }

    // Row activities precede column values.
    for _ in 0..nrows {
        if lines.next().is_none() {
            return bad("cbc solution ended inside the row section");
        }
    }
    for col in 0..ncols {
        let line = lines
            .next()
            .ok_or_else(|| SolverError::MalformedSolution("cbc solution ended early".into()))?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let value = match tokens.len() {
            1 => parse_num(tokens[0], "cbc column value")?,
            _ => parse_num(tokens[1], "cbc column value")?,
        };
        model.set_value(layout.var_order[col], value)?;
    }
    Ok(status)
}

/// Parses a glpsol `-w` plain-text dump: comment (`c`) lines, an `s` line
/// carrying sizes, verdict, and objective, then `j <col> <value>` lines.
pub fn parse_glpsol_solution(
    text: &str,
    model: &mut Model,
    layout: &LpLayout,
) -> Result<Status, SolverError> {
    let mut status = Status::Unknown;
    let mut saw_status_line = false;
    for line in text.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.first() {
            Some(&"c") | None => {}
            Some(&"s") => {
                // e.g. `s mip 12 7 o 42` (rows, cols, verdict, objective)
                if tokens.len() < 6 {
                    return bad(format!("glpsol status line `{line}` is too short"));
                }
                let ncols = parse_num(tokens[3], "glpsol column count")? as usize;
                if ncols != layout.num_cols() {
                    return bad(format!(
                        "glpsol reports {ncols} columns, the LP file had {}",
                        layout.num_cols()
                    ));
                }
                status = match tokens[4] {
                    "o" => Status::Optimal,
                    "f" => Status::Feasible,
                    "n" => Status::Infeasible,
                    "u" => Status::Unknown,
                    _ => Status::Unknown,
                };
                model.set_status(status);
                saw_status_line = true;
                if status.has_solution() {
                    model.set_objective_value(parse_num(tokens[5], "glpsol objective")?);
                }
            }
            Some(&"j") if status.has_solution() => {
                if tokens.len() < 3 {
                    return bad(format!("glpsol column line `{line}` is too short"));
                }
                let col = parse_num(tokens[1], "glpsol column index")? as usize;
                if col == 0 || col > layout.num_cols() {
                    return bad(format!("glpsol column index {col} out of range"));
                }
                // MIP dumps carry `j col value`; LP dumps `j col stat prim dual`.
                let value = if tokens.len() == 3 {
                    parse_num(tokens[2], "glpsol column value")?
                } else {
                    parse_num(tokens[3], "glpsol column value")?
                };
                model.set_value(layout.var_order[col - 1], value)?;
            }
            _ => {}
        }
    }
    if !saw_status_line {
        return bad("glpsol solution has no `s` line");
    }
    Ok(status)
}

/// Parses a Gurobi `.sol` result file: `#` comment lines (the first carries
/// the objective), then `name value` pairs. Gurobi only writes the file when
/// it has a solution, so a parsed file implies feasibility.
pub fn parse_gurobi_solution(text: &str, model: &mut Model) -> Result<Status, SolverError> {
    model.set_status(Status::Optimal);
    let mut any = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            if let Some((_, obj)) = comment.split_once('=') {
                if let Ok(v) = obj.trim().parse() {
                    model.set_objective_value(v);
                }
            }
            continue;
        }
        let Some((name, value)) = trimmed.split_once(char::is_whitespace) else {
            return bad(format!("gurobi line `{trimmed}` is not `name value`"));
        };
        let Some(var) = model.find_var(name.trim()) else {
            return bad(format!("gurobi names unknown variable `{name}`"));
        };
        let value = parse_num(value.trim(), "gurobi value")?;
        model.set_value(var, value)?;
        any = true;
    }
    if !any {
        model.set_status(Status::Unknown);
        return Ok(Status::Unknown);
    }
    Ok(Status::Optimal)
}
