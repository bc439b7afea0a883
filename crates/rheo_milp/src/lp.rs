//! CPLEX-LP text serialization.
//!
//! Solvers that read LP text assign column indices by order of first
//! appearance in the file, and some report rows and columns positionally in
//! their solution dumps. [`write_lp`] therefore returns an [`LpLayout`]
//! capturing exactly what was written; the solution parsers take the layout
//! as input instead of relying on hidden state inside the model.

use crate::model::{Model, Rel, Sense, VarId, VarKind, DEFAULT_EPSILON};
use std::io::{self, Write};

/// How a model was laid out in LP text.
#[derive(Clone, Debug)]
pub struct LpLayout {
    /// Variables in order of first appearance in the text.
    pub var_order: Vec<VarId>,
    /// Number of constraint rows actually written (rows that normalized to
    /// zero terms are skipped).
    pub rows_written: usize,
}

impl LpLayout {
    /// Number of columns the solver will see.
    pub fn num_cols(&self) -> usize {
        self.var_order.len()
    }
}

struct Appearance {
    seen: Vec<bool>,
    order: Vec<VarId>,
}

impl Appearance {
    fn touch(&mut self, var: VarId) {
        let i = var.as_raw() as usize;
        if !self.seen[i] {
            self.seen[i] = true;
            self.order.push(var);
        }
    }
}

fn write_terms(
    out: &mut impl Write,
    model: &Model,
    terms: &[(f64, VarId)],
    app: &mut Appearance,
) -> io::Result<()> {
    for &(c, v) in terms {
        app.touch(v);
        let name = &model.var(v).name;
        if c < 0.0 {
            write!(out, " - {} {}", -c, name)?;
        } else {
            write!(out, " + {} {}", c, name)?;
        }
    }
    Ok(())
}

/// Normalizes the model and writes it as CPLEX-LP text.
///
/// The output is deterministic for a given model. Rows with no terms after
/// normalization are not emitted; the returned [`LpLayout`] reflects that.
pub fn write_lp(model: &mut Model, out: &mut impl Write) -> io::Result<LpLayout> {
    model.normalize(DEFAULT_EPSILON);
    let mut app = Appearance {
        seen: vec![false; model.num_vars()],
        order: Vec::new(),
    };

    match model.sense() {
        Sense::Minimize => writeln!(out, "Minimize")?,
        Sense::Maximize => writeln!(out, "Maximize")?,
    }
    write!(out, " obj:")?;
    if model.objective().is_empty() {
        // Solvers reject an empty objective; write a zero cost term.
        if let Some((first, _)) = model.vars().next() {
            app.touch(first);
            write!(out, " 0 {}", model.var(first).name)?;
        }
    } else {
        write_terms(out, model, model.objective(), &mut app)?;
    }
    writeln!(out)?;

    writeln!(out, "Subject To")?;
    let mut rows_written = 0;
    for row in model.rows() {
        if row.terms.is_empty() {
            continue;
        }
        write!(out, " {}:", row.name)?;
        write_terms(out, model, &row.terms, &mut app)?;
        let rel = match row.rel {
            Rel::Le => "<=",
            Rel::Ge => ">=",
            Rel::Eq => "=",
        };
        writeln!(out, " {} {}", rel, row.rhs)?;
        rows_written += 1;
    }

    let bounded: Vec<VarId> = model
        .vars()
        .filter(|(_, v)| v.kind != VarKind::Boolean && (v.hi.is_some() || v.lo != 0.0))
        .map(|(id, _)| id)
        .collect();
    if !bounded.is_empty() {
        writeln!(out, "Bounds")?;
        for id in bounded {
            app.touch(id);
            let v = model.var(id);
            match v.hi {
                Some(hi) => writeln!(out, " {} <= {} <= {}", v.lo, v.name, hi)?,
                None => writeln!(out, " {} >= {}", v.name, v.lo)?,
            }
        }
    }

    let integers: Vec<VarId> = model
        .vars()
        .filter(|(_, v)| v.kind == VarKind::Integer)
        .map(|(id, _)| id)
        .collect();
    if !integers.is_empty() {
        writeln!(out, "General")?;
        for id in integers {
            app.touch(id);
            writeln!(out, " {}", model.var(id).name)?;
        }
    }

    let booleans: Vec<VarId> = model
        .vars()
        .filter(|(_, v)| v.kind == VarKind::Boolean)
        .map(|(id, _)| id)
        .collect();
    if !booleans.is_empty() {
        writeln!(out, "Binary")?;
        for id in booleans {
            app.touch(id);
            writeln!(out, " {}", model.var(id).name)?;
        }
    }

    writeln!(out, "End")?;
    Ok(LpLayout {
        var_order: app.order,
        rows_written,
    })
}
