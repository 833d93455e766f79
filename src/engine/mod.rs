//! Contrat du moteur de résolution.
//!
//! Un [`Model`] déclare des variables entières bornées (les booléens sont des
//! entiers dans `[0, 1]`), des contraintes linéaires étiquetées par famille et
//! un objectif linéaire à minimiser. Le moteur est une boîte noire derrière
//! [`SolveEngine`] ; la crate fournit [`MilpEngine`] (relaxations `good_lp`).

mod milp;
mod propagate;

pub use milp::MilpEngine;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Priorité de branchement : les variables de décision passent avant les auxiliaires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Decision,
    Auxiliary,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub lo: i64,
    pub hi: i64,
    pub hint: Option<i64>,
    pub priority: Priority,
}

/// Expression `Σ coef·var + constant`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearExpr {
    terms: Vec<(VarId, i64)>,
    constant: i64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: i64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn term(var: VarId, coef: i64) -> Self {
        Self {
            terms: vec![(var, coef)],
            constant: 0,
        }
    }

    pub fn add_term(&mut self, var: VarId, coef: i64) {
        if coef != 0 {
            self.terms.push((var, coef));
        }
    }

    pub fn add_constant(&mut self, value: i64) {
        self.constant += value;
    }

    /// Ajoute `factor · other`.
    pub fn add_scaled(&mut self, other: &LinearExpr, factor: i64) {
        for (var, coef) in &other.terms {
            self.add_term(*var, coef * factor);
        }
        self.constant += other.constant * factor;
    }

    pub fn with_term(mut self, var: VarId, coef: i64) -> Self {
        self.add_term(var, coef);
        self
    }

    pub fn with_scaled(mut self, other: &LinearExpr, factor: i64) -> Self {
        self.add_scaled(other, factor);
        self
    }

    pub fn terms(&self) -> &[(VarId, i64)] {
        &self.terms
    }

    pub fn constant_part(&self) -> i64 {
        self.constant
    }

    pub fn has_vars(&self) -> bool {
        !self.terms.is_empty()
    }

    pub fn eval(&self, values: &[i64]) -> i64 {
        self.terms
            .iter()
            .map(|(v, c)| c * values[v.0])
            .sum::<i64>()
            + self.constant
    }

    /// Fusionne les doublons et retire les coefficients nuls.
    fn merged(&self) -> Vec<(VarId, i64)> {
        let mut terms = self.terms.clone();
        terms.sort_by_key(|(v, _)| *v);
        let mut out: Vec<(VarId, i64)> = Vec::with_capacity(terms.len());
        for (var, coef) in terms {
            match out.last_mut() {
                Some((last, acc)) if *last == var => *acc += coef,
                _ => out.push((var, coef)),
            }
        }
        out.retain(|(_, c)| *c != 0);
        out
    }
}

impl From<VarId> for LinearExpr {
    fn from(var: VarId) -> Self {
        LinearExpr::term(var, 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Le,
    Ge,
    Eq,
}

/// Famille de contrainte dure, utilisée par le diagnostic d'infaisabilité.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintFamily {
    Coverage,
    OneShiftPerDay,
    BlockLength,
    NightSpacing,
    BlockShape,
    FairnessBound,
    FairnessTolerance,
    ConsecutiveWork,
    WorkingHours,
    WeekendFrequency,
}

impl fmt::Display for ConstraintFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConstraintFamily::Coverage => "coverage",
            ConstraintFamily::OneShiftPerDay => "one_shift_per_day",
            ConstraintFamily::BlockLength => "block_length",
            ConstraintFamily::NightSpacing => "night_spacing",
            ConstraintFamily::BlockShape => "block_shape",
            ConstraintFamily::FairnessBound => "fairness_bound",
            ConstraintFamily::FairnessTolerance => "fairness_tolerance",
            ConstraintFamily::ConsecutiveWork => "consecutive_work",
            ConstraintFamily::WorkingHours => "working_hours",
            ConstraintFamily::WeekendFrequency => "weekend_frequency",
        })
    }
}

/// `expr relation rhs`
#[derive(Debug, Clone)]
pub struct Constraint {
    pub expr: LinearExpr,
    pub relation: Relation,
    pub rhs: i64,
    pub family: ConstraintFamily,
}

impl Constraint {
    pub fn is_satisfied(&self, values: &[i64]) -> bool {
        let lhs = self.expr.eval(values);
        match self.relation {
            Relation::Le => lhs <= self.rhs,
            Relation::Ge => lhs >= self.rhs,
            Relation::Eq => lhs == self.rhs,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    vars: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: LinearExpr,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_bool<N: Into<String>>(&mut self, name: N) -> VarId {
        self.new_int(name, 0, 1)
    }

    pub fn new_int<N: Into<String>>(&mut self, name: N, lo: i64, hi: i64) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(Variable {
            name: name.into(),
            lo,
            hi,
            hint: None,
            priority: Priority::Decision,
        });
        id
    }

    pub fn set_hint(&mut self, var: VarId, value: i64) {
        self.vars[var.0].hint = Some(value);
    }

    pub fn set_priority(&mut self, var: VarId, priority: Priority) {
        self.vars[var.0].priority = priority;
    }

    pub fn add_constraint(
        &mut self,
        expr: LinearExpr,
        relation: Relation,
        rhs: i64,
        family: ConstraintFamily,
    ) {
        self.constraints.push(Constraint {
            expr,
            relation,
            rhs,
            family,
        });
    }

    pub fn add_le(&mut self, expr: LinearExpr, rhs: i64, family: ConstraintFamily) {
        self.add_constraint(expr, Relation::Le, rhs, family);
    }

    pub fn add_ge(&mut self, expr: LinearExpr, rhs: i64, family: ConstraintFamily) {
        self.add_constraint(expr, Relation::Ge, rhs, family);
    }

    pub fn add_eq(&mut self, expr: LinearExpr, rhs: i64, family: ConstraintFamily) {
        self.add_constraint(expr, Relation::Eq, rhs, family);
    }

    pub fn add_objective_term(&mut self, var: VarId, coef: i64) {
        self.objective.add_term(var, coef);
    }

    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn families(&self) -> BTreeSet<ConstraintFamily> {
        self.constraints.iter().map(|c| c.family).collect()
    }

    /// Copie du modèle sans les contraintes d'une famille.
    pub fn without(&self, family: ConstraintFamily) -> Model {
        Model {
            vars: self.vars.clone(),
            constraints: self
                .constraints
                .iter()
                .filter(|c| c.family != family)
                .cloned()
                .collect(),
            objective: self.objective.clone(),
        }
    }

    /// Vérifie bornes et contraintes pour une affectation complète.
    pub fn is_feasible(&self, values: &[i64]) -> bool {
        values.len() == self.vars.len()
            && self
                .vars
                .iter()
                .zip(values)
                .all(|(v, x)| v.lo <= *x && *x <= v.hi)
            && self.constraints.iter().all(|c| c.is_satisfied(values))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveParams {
    pub time_budget: Duration,
    /// Arrêt anticipé quand (incumbent − borne) / |incumbent| ≤ relative_gap.
    pub relative_gap: f64,
    pub node_limit: Option<u64>,
}

impl Default for SolveParams {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(30),
            relative_gap: 0.0,
            node_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    TimeoutNoSolution,
}

impl SolveStatus {
    pub fn has_solution(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    values: Vec<i64>,
    objective: i64,
}

impl Solution {
    pub fn new(values: Vec<i64>, objective: i64) -> Self {
        Self { values, objective }
    }

    pub fn value(&self, var: VarId) -> i64 {
        self.values[var.0]
    }

    pub fn is_true(&self, var: VarId) -> bool {
        self.values[var.0] != 0
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn objective(&self) -> i64 {
        self.objective
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveStats {
    pub nodes: u64,
    pub solutions: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    pub solution: Option<Solution>,
    pub stats: SolveStats,
}

pub trait SolveEngine {
    fn solve(&self, model: &Model, params: &SolveParams) -> SolveOutcome;
}
