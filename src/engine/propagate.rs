use super::{Model, Priority, Relation};
use std::collections::VecDeque;

/// Ligne normalisée `Σ coef·x ≤ rhs`.
#[derive(Debug)]
pub(super) struct Row {
    pub(super) terms: Vec<(usize, i64)>,
    pub(super) rhs: i64,
}

/// Domaines entiers `[lo, hi]` resserrés par propagation de bornes, avec piste de retour arrière.
pub(super) struct Propagator<'m> {
    model: &'m Model,
    rows: Vec<Row>,
    watch: Vec<Vec<usize>>,
    lo: Vec<i64>,
    hi: Vec<i64>,
    trail: Vec<(usize, i64, i64)>,
    queue: VecDeque<usize>,
    queued: Vec<bool>,
    objective_coef: Vec<i64>,
}

impl<'m> Propagator<'m> {
    pub(super) fn new(model: &'m Model) -> Self {
        let n = model.num_vars();
        let mut objective_coef = vec![0; n];
        for (v, c) in model.objective().merged() {
            objective_coef[v.index()] = c;
        }
        Self {
            model,
            rows: Vec::new(),
            watch: vec![Vec::new(); n],
            lo: model.variables().iter().map(|v| v.lo).collect(),
            hi: model.variables().iter().map(|v| v.hi).collect(),
            trail: Vec::new(),
            queue: VecDeque::new(),
            queued: Vec::new(),
            objective_coef,
        }
    }

    /// Normalise les contraintes et propage à la racine. `false` si infaisable.
    pub(super) fn prepare(&mut self) -> bool {
        if self.lo.iter().zip(&self.hi).any(|(lo, hi)| lo > hi) {
            return false;
        }
        let model = self.model;
        for c in model.constraints() {
            let terms: Vec<(usize, i64)> = c
                .expr
                .merged()
                .into_iter()
                .map(|(v, coef)| (v.index(), coef))
                .collect();
            let rhs = c.rhs - c.expr.constant_part();
            let negated = || terms.iter().map(|(v, coef)| (*v, -coef)).collect();
            match c.relation {
                Relation::Le => self.push_row(terms.clone(), rhs),
                Relation::Ge => self.push_row(negated(), -rhs),
                Relation::Eq => {
                    self.push_row(terms.clone(), rhs);
                    self.push_row(negated(), -rhs);
                }
            }
        }
        if self.rows.iter().any(|r| r.terms.is_empty() && r.rhs < 0) {
            return false;
        }
        self.queued = vec![true; self.rows.len()];
        self.queue = (0..self.rows.len()).collect();
        self.propagate()
    }

    fn push_row(&mut self, terms: Vec<(usize, i64)>, rhs: i64) {
        let idx = self.rows.len();
        for (v, _) in &terms {
            self.watch[*v].push(idx);
        }
        self.rows.push(Row { terms, rhs });
    }

    pub(super) fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub(super) fn lo(&self) -> &[i64] {
        &self.lo
    }

    pub(super) fn hi(&self) -> &[i64] {
        &self.hi
    }

    pub(super) fn is_free(&self, var: usize) -> bool {
        self.lo[var] < self.hi[var]
    }

    pub(super) fn trail_len(&self) -> usize {
        self.trail.len()
    }

    /// Valeur tentée en premier : indice, sinon le sens favorable à l'objectif.
    pub(super) fn preferred(&self, var: usize) -> i64 {
        let (lo, hi) = (self.lo[var], self.hi[var]);
        let meta = &self.model.variables()[var];
        let coef = self.objective_coef[var];
        match meta.hint {
            Some(h) if meta.priority == Priority::Decision || coef == 0 => h.clamp(lo, hi),
            _ if coef < 0 => hi,
            _ => lo,
        }
    }

    /// Découpe du domaine : la valeur préférée, puis le reste de part et d'autre.
    pub(super) fn choices(&self, var: usize) -> Vec<(i64, i64)> {
        let (lo, hi) = (self.lo[var], self.hi[var]);
        let preferred = self.preferred(var);
        let mut out = vec![(preferred, preferred)];
        if preferred > lo {
            out.push((lo, preferred - 1));
        }
        if preferred < hi {
            out.push((preferred + 1, hi));
        }
        out
    }

    /// Plongée gloutonne : fixe chaque variable libre (dans `order`) à sa valeur préférée,
    /// à défaut à une borne, en propageant à chaque pas. Domaines restaurés au retour.
    pub(super) fn dive(&mut self, order: &[usize]) -> Option<Vec<i64>> {
        let base = self.trail.len();
        for &var in order {
            if !self.is_free(var) {
                continue;
            }
            let mut candidates = vec![self.preferred(var)];
            for bound in [self.lo[var], self.hi[var]] {
                if !candidates.contains(&bound) {
                    candidates.push(bound);
                }
            }
            let mut placed = false;
            for value in candidates {
                let mark = self.trail.len();
                if self.tighten(var, value, value) && self.propagate() {
                    placed = true;
                    break;
                }
                self.undo(mark);
            }
            if !placed {
                self.undo(base);
                return None;
            }
        }
        let values = self.lo.clone();
        self.undo(base);
        Some(values)
    }

    pub(super) fn tighten(&mut self, var: usize, lo: i64, hi: i64) -> bool {
        let new_lo = lo.max(self.lo[var]);
        let new_hi = hi.min(self.hi[var]);
        if new_lo == self.lo[var] && new_hi == self.hi[var] {
            return true;
        }
        self.trail.push((var, self.lo[var], self.hi[var]));
        self.lo[var] = new_lo;
        self.hi[var] = new_hi;
        if new_lo > new_hi {
            return false;
        }
        for &row in &self.watch[var] {
            if !self.queued[row] {
                self.queued[row] = true;
                self.queue.push_back(row);
            }
        }
        true
    }

    pub(super) fn propagate(&mut self) -> bool {
        while let Some(r) = self.queue.pop_front() {
            self.queued[r] = false;
            let row = &self.rows[r];
            let min_activity: i64 = row
                .terms
                .iter()
                .map(|(v, a)| if *a > 0 { a * self.lo[*v] } else { a * self.hi[*v] })
                .sum();
            let slack = row.rhs - min_activity;
            if slack < 0 {
                self.clear_queue();
                return false;
            }
            let updates: Vec<(usize, i64, i64)> = row
                .terms
                .iter()
                .filter_map(|(v, a)| {
                    let step = slack / a.abs();
                    if *a > 0 {
                        let bound = self.lo[*v] + step;
                        (bound < self.hi[*v]).then_some((*v, i64::MIN, bound))
                    } else {
                        let bound = self.hi[*v] - step;
                        (bound > self.lo[*v]).then_some((*v, bound, i64::MAX))
                    }
                })
                .collect();
            for (v, lo, hi) in updates {
                if !self.tighten(v, lo, hi) {
                    self.clear_queue();
                    return false;
                }
            }
        }
        true
    }

    fn clear_queue(&mut self) {
        for r in self.queue.drain(..) {
            self.queued[r] = false;
        }
    }

    pub(super) fn undo(&mut self, trail_len: usize) {
        while self.trail.len() > trail_len {
            if let Some((var, lo, hi)) = self.trail.pop() {
                self.lo[var] = lo;
                self.hi[var] = hi;
            }
        }
    }
}
