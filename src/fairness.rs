//! Modèle de charge pondérée par le temps de travail (WTE).

use crate::engine::{ConstraintFamily, LinearExpr, Model, Priority, VarId};
use crate::model::{Person, ShiftCategory};
use crate::state::RunningTotals;

/// Variables minimax ajoutées au modèle d'une étape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FairnessVars {
    pub max_load: VarId,
    pub min_load: VarId,
}

/// Charge = nombre de shifts × round(100 / WTE). Ne choisit jamais d'affectation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FairnessScorer;

impl FairnessScorer {
    pub fn weight(wte: f64) -> i64 {
        (100.0 / wte).round() as i64
    }

    pub fn load(wte: f64, committed: u32, proposed: u32) -> i64 {
        i64::from(committed + proposed) * Self::weight(wte)
    }

    /// Charge si la personne prend `extra` shifts de plus dans la catégorie.
    pub fn projected_load(
        person: &Person,
        index: usize,
        totals: &RunningTotals,
        category: ShiftCategory,
        extra: u32,
    ) -> i64 {
        Self::load(person.wte, totals.count(index, category), extra)
    }

    /// Écart max − min ; 0 pour une liste vide.
    pub fn spread(loads: &[i64]) -> i64 {
        match (loads.iter().max(), loads.iter().min()) {
            (Some(max), Some(min)) => max - min,
            _ => 0,
        }
    }

    /// Expression de charge : poids × (validé + Σ variables proposées).
    pub fn load_expr(wte: f64, committed: u32, proposed: &[VarId]) -> LinearExpr {
        let weight = Self::weight(wte);
        let mut expr = LinearExpr::constant(i64::from(committed) * weight);
        for var in proposed {
            expr.add_term(*var, weight);
        }
        expr
    }

    /// Ajoute `max_load ≥ charge` et `min_load ≤ charge` pour chaque expression,
    /// l'objectif `fairness_max·max − fairness_min·min`, et la tolérance si fournie.
    pub fn add_terms(
        model: &mut Model,
        loads: &[LinearExpr],
        fairness_max: i64,
        fairness_min: i64,
        tolerance: Option<i64>,
    ) -> Option<FairnessVars> {
        if loads.is_empty() {
            return None;
        }
        let upper = loads
            .iter()
            .map(|e| {
                e.constant_part() + e.terms().iter().map(|(_, c)| (*c).max(0)).sum::<i64>()
            })
            .max()
            .unwrap_or(0);
        let max_load = model.new_int("max_load", 0, upper);
        let min_load = model.new_int("min_load", 0, upper);
        model.set_priority(max_load, Priority::Auxiliary);
        model.set_priority(min_load, Priority::Auxiliary);

        for load in loads {
            let above = LinearExpr::from(max_load).with_scaled(load, -1);
            model.add_ge(above, 0, ConstraintFamily::FairnessBound);
            let below = LinearExpr::from(min_load).with_scaled(load, -1);
            model.add_le(below, 0, ConstraintFamily::FairnessBound);
        }
        model.add_objective_term(max_load, fairness_max);
        model.add_objective_term(min_load, -fairness_min);

        if let Some(tol) = tolerance {
            let spread = LinearExpr::from(max_load).with_term(min_load, -1);
            model.add_le(spread, tol, ConstraintFamily::FairnessTolerance);
        }
        Some(FairnessVars { max_load, min_load })
    }
}
