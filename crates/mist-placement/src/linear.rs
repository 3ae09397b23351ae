//! Linear model — variables, expressions, constraints and LP export.
//!
//! The model is owned by one optimization run and handed to a
//! [`SolverBackend`](crate::solver::SolverBackend) only when solving.
//! Constraint constants are folded into the right-hand side when added,
//! so every stored constraint reads `Σ coeff·var  op  rhs`.
//!
//! Names are unique within a model. Entity ids may contain `_`, so two
//! composed names like `z_{request}_{node}` can coincide; a repeated
//! name gets a `~{n}` suffix.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

use tracing::debug;

/// Handle to a variable inside a [`LinearModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub(crate) usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Domain of a variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VarKind {
    Binary,
    Continuous { lower: f64, upper: f64 },
}

impl VarKind {
    /// A continuous variable without bounds.
    pub const FREE: VarKind = VarKind::Continuous {
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
}

/// An affine expression `Σ coeff·var + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: BTreeMap<VarId, f64>,
    constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn term(var: VarId, coeff: f64) -> Self {
        let mut expr = Self::new();
        expr.add_term(var, coeff);
        expr
    }

    /// Add `coeff·var`, merging with an existing term on the same variable.
    pub fn add_term(&mut self, var: VarId, coeff: f64) {
        let entry = self.terms.entry(var).or_insert(0.0);
        *entry += coeff;
        if *entry == 0.0 {
            self.terms.remove(&var);
        }
    }

    pub fn terms(&self) -> impl Iterator<Item = (VarId, f64)> + '_ {
        self.terms.iter().map(|(v, c)| (*v, *c))
    }

    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms.get(&var).copied().unwrap_or(0.0)
    }

    pub fn constant_term(&self) -> f64 {
        self.constant
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluate with the given variable values (missing values count as 0).
    pub fn evaluate(&self, value_of: impl Fn(VarId) -> f64) -> f64 {
        self.constant + self.terms.iter().map(|(v, c)| c * value_of(*v)).sum::<f64>()
    }
}

impl From<VarId> for LinearExpr {
    fn from(var: VarId) -> Self {
        LinearExpr::term(var, 1.0)
    }
}

impl AddAssign for LinearExpr {
    fn add_assign(&mut self, rhs: LinearExpr) {
        for (var, coeff) in rhs.terms {
            self.add_term(var, coeff);
        }
        self.constant += rhs.constant;
    }
}

impl Add for LinearExpr {
    type Output = LinearExpr;

    fn add(mut self, rhs: LinearExpr) -> LinearExpr {
        self += rhs;
        self
    }
}

impl Sub for LinearExpr {
    type Output = LinearExpr;

    fn sub(self, rhs: LinearExpr) -> LinearExpr {
        self + rhs * -1.0
    }
}

impl Mul<f64> for LinearExpr {
    type Output = LinearExpr;

    fn mul(mut self, rhs: f64) -> LinearExpr {
        self.terms.retain(|_, c| {
            *c *= rhs;
            *c != 0.0
        });
        self.constant *= rhs;
        self
    }
}

impl Sum for LinearExpr {
    fn sum<I: Iterator<Item = LinearExpr>>(iter: I) -> LinearExpr {
        iter.fold(LinearExpr::new(), |acc, e| acc + e)
    }
}

/// Comparison operator of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Le,
    Ge,
    Eq,
}

impl Comparison {
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        const EPS: f64 = 1e-9;
        match self {
            Comparison::Le => lhs <= rhs + EPS,
            Comparison::Ge => lhs >= rhs - EPS,
            Comparison::Eq => (lhs - rhs).abs() <= EPS,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Comparison::Le => "<=",
            Comparison::Ge => ">=",
            Comparison::Eq => "=",
        })
    }
}

/// A named linear constraint. `expr` carries no constant term.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub expr: LinearExpr,
    pub cmp: Comparison,
    pub rhs: f64,
}

impl Constraint {
    pub fn is_satisfied(&self, value_of: impl Fn(VarId) -> f64) -> bool {
        self.cmp.holds(self.expr.evaluate(value_of), self.rhs)
    }
}

/// A mixed-integer linear program, always maximized.
#[derive(Debug, Clone, Default)]
pub struct LinearModel {
    name: String,
    vars: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: Option<LinearExpr>,
    names: BTreeSet<String>,
}

impl LinearModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_var(&mut self, name: impl Into<String>, kind: VarKind) -> VarId {
        let id = VarId(self.vars.len());
        let name = self.claim_name(name.into());
        self.vars.push(Variable { name, kind });
        id
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name, VarKind::Binary)
    }

    /// Add `expr op rhs`. The constant part of `expr` moves to the right.
    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        expr: LinearExpr,
        cmp: Comparison,
        rhs: f64,
    ) {
        let rhs = rhs - expr.constant;
        let expr = LinearExpr {
            terms: expr.terms,
            constant: 0.0,
        };
        let name = self.claim_name(name.into());
        self.constraints.push(Constraint {
            name,
            expr,
            cmp,
            rhs,
        });
    }

    fn claim_name(&mut self, name: String) -> String {
        let mut candidate = name.clone();
        let mut n = 1;
        while self.names.contains(&candidate) {
            candidate = format!("{name}~{n}");
            n += 1;
        }
        if candidate != name {
            debug!(name = %name, renamed = %candidate, "duplicate name in model");
        }
        self.names.insert(candidate.clone());
        candidate
    }

    pub fn set_objective(&mut self, objective: LinearExpr) {
        self.objective = Some(objective);
    }

    pub fn objective(&self) -> Option<&LinearExpr> {
        self.objective.as_ref()
    }

    pub fn vars(&self) -> &[Variable] {
        &self.vars
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.0]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Render the model in CPLEX LP text form.
    ///
    /// The objective constant has no LP representation and is written as
    /// a comment.
    pub fn to_lp_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\\ Model {}", self.name);
        out.push_str("Maximize\n");
        let objective = self.objective.clone().unwrap_or_default();
        if objective.constant != 0.0 {
            let _ = writeln!(out, "\\ objective constant: {}", objective.constant);
        }
        let _ = writeln!(out, " OBJROW: {}", self.format_terms(&objective));

        out.push_str("Subject To\n");
        for c in &self.constraints {
            let _ = writeln!(
                out,
                " {}: {} {} {}",
                c.name,
                self.format_terms(&c.expr),
                c.cmp,
                c.rhs
            );
        }

        let bounded: Vec<&Variable> = self
            .vars
            .iter()
            .filter(|v| matches!(v.kind, VarKind::Continuous { .. }))
            .collect();
        if !bounded.is_empty() {
            out.push_str("Bounds\n");
            for v in bounded {
                if let VarKind::Continuous { lower, upper } = v.kind {
                    if lower == f64::NEG_INFINITY && upper == f64::INFINITY {
                        let _ = writeln!(out, " {} free", v.name);
                    } else {
                        let _ = writeln!(
                            out,
                            " {} <= {} <= {}",
                            format_bound(lower),
                            v.name,
                            format_bound(upper)
                        );
                    }
                }
            }
        }

        let binaries: Vec<&str> = self
            .vars
            .iter()
            .filter(|v| v.kind == VarKind::Binary)
            .map(|v| v.name.as_str())
            .collect();
        if !binaries.is_empty() {
            out.push_str("Binaries\n");
            for name in binaries {
                let _ = writeln!(out, " {name}");
            }
        }
        out.push_str("End\n");
        out
    }

    fn format_terms(&self, expr: &LinearExpr) -> String {
        if expr.terms.is_empty() {
            return "0".to_string();
        }
        let mut out = String::new();
        for (i, (var, coeff)) in expr.terms.iter().enumerate() {
            let name = &self.vars[var.0].name;
            if i == 0 {
                if *coeff < 0.0 {
                    let _ = write!(out, "- {} {}", -coeff, name);
                } else {
                    let _ = write!(out, "{coeff} {name}");
                }
            } else if *coeff < 0.0 {
                let _ = write!(out, " - {} {}", -coeff, name);
            } else {
                let _ = write!(out, " + {coeff} {name}");
            }
        }
        out
    }
}

fn format_bound(value: f64) -> String {
    if value == f64::INFINITY {
        "+inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        value.to_string()
    }
}
