use super::propagate::Propagator;
use super::{
    Model, Priority, SolveEngine, SolveOutcome, SolveParams, SolveStats, SolveStatus, Solution,
};
use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError,
    Solution as _, SolverModel, Variable,
};
use std::time::Instant;
use tracing::{debug, trace};

const INTEGRALITY_TOLERANCE: f64 = 1e-6;

/// Séparation et évaluation sur relaxations linéaires.
///
/// Chaque nœud propage les bornes entières, puis résout la relaxation continue avec
/// `good_lp` (backend microlp) : borne inférieure pour l'élagage et choix de la variable
/// la plus fractionnaire. Budgets de temps et de nœuds vérifiés entre deux nœuds.
/// Déterministe à paramètres égaux, sauf quand l'arrêt vient du budget de temps.
#[derive(Debug, Clone, Copy, Default)]
pub struct MilpEngine;

impl MilpEngine {
    pub fn new() -> Self {
        Self
    }
}

impl SolveEngine for MilpEngine {
    fn solve(&self, model: &Model, params: &SolveParams) -> SolveOutcome {
        let started = Instant::now();
        let mut tree = Tree::new(model);
        let mut stats = SolveStats::default();

        let status = if tree.prop.prepare() {
            tree.run(params, started, &mut stats)
        } else {
            SolveStatus::Infeasible
        };
        stats.elapsed = started.elapsed();
        debug!(
            ?status,
            nodes = stats.nodes,
            solutions = stats.solutions,
            vars = model.num_vars(),
            rows = tree.prop.rows().len(),
            "branch and bound finished"
        );
        SolveOutcome {
            status,
            solution: tree.best,
            stats,
        }
    }
}

enum Relaxation {
    Infeasible,
    Solved { bound: f64, values: Vec<f64> },
    /// Échec numérique du solveur LP : on branche sans borne.
    Unavailable,
}

struct Frame {
    trail_len: usize,
    var: usize,
    choices: Vec<(i64, i64)>,
    next: usize,
}

struct Tree<'m> {
    model: &'m Model,
    prop: Propagator<'m>,
    order: Vec<usize>,
    objective: Vec<(usize, i64)>,
    objective_constant: i64,
    best: Option<Solution>,
}

impl<'m> Tree<'m> {
    fn new(model: &'m Model) -> Self {
        let mut order: Vec<usize> = (0..model.num_vars()).collect();
        order.sort_by_key(|&i| (model.variables()[i].priority, i));
        Self {
            model,
            prop: Propagator::new(model),
            order,
            objective: model
                .objective()
                .merged()
                .into_iter()
                .map(|(v, c)| (v.index(), c))
                .collect(),
            objective_constant: model.objective().constant_part(),
            best: None,
        }
    }

    fn run(
        &mut self,
        params: &SolveParams,
        started: Instant,
        stats: &mut SolveStats,
    ) -> SolveStatus {
        // la plongée sur les indices compte comme premier nœud
        stats.nodes += 1;
        if out_of_budget(params, started, stats) {
            return self.interrupted();
        }
        if let Some(values) = self.prop.dive(&self.order) {
            self.record(values, stats);
        }

        let mut root_bound: Option<f64> = None;
        let mut stack: Vec<Frame> = Vec::new();
        let mut descend = true;

        loop {
            if descend {
                stats.nodes += 1;
                if out_of_budget(params, started, stats) {
                    return self.interrupted();
                }
                if let Some(frame) = self.expand(&mut root_bound, stats) {
                    stack.push(frame);
                }
                if let Some(status) = self.early_stop(root_bound, params.relative_gap) {
                    return status;
                }
            }

            // avance au prochain choix ouvert
            descend = false;
            while let Some(frame) = stack.last_mut() {
                let trail_len = frame.trail_len;
                let var = frame.var;
                let choice = frame.choices.get(frame.next).copied();
                frame.next += 1;
                self.prop.undo(trail_len);
                match choice {
                    Some((lo, hi)) => {
                        if self.prop.tighten(var, lo, hi) && self.prop.propagate() {
                            descend = true;
                            break;
                        }
                    }
                    None => {
                        stack.pop();
                    }
                }
            }
            if !descend {
                return if self.best.is_some() {
                    SolveStatus::Optimal
                } else {
                    SolveStatus::Infeasible
                };
            }
        }
    }

    /// Évalue le nœud courant ; renvoie le branchement à explorer, `None` si le nœud est clos.
    fn expand(&mut self, root_bound: &mut Option<f64>, stats: &mut SolveStats) -> Option<Frame> {
        let values = match self.relax() {
            Relaxation::Infeasible => return None,
            Relaxation::Solved { bound, values } => {
                root_bound.get_or_insert(bound);
                if self
                    .best
                    .as_ref()
                    .is_some_and(|b| integral_bound(bound) >= b.objective())
                {
                    return None;
                }
                Some(values)
            }
            Relaxation::Unavailable => None,
        };

        if let Some(values) = values {
            if let Some((var, value)) = self.most_fractional(&values) {
                let floor = value.floor() as i64;
                let (lo, hi) = (self.prop.lo()[var], self.prop.hi()[var]);
                let down = (lo, floor);
                let up = (floor + 1, hi);
                let choices = if value - value.floor() >= 0.5 {
                    vec![up, down]
                } else {
                    vec![down, up]
                };
                return Some(self.frame(var, choices));
            }
            let rounded: Vec<i64> = values.iter().map(|v| v.round() as i64).collect();
            if self.model.is_feasible(&rounded) {
                self.record(rounded, stats);
                return None;
            }
        }

        match self.order.iter().copied().find(|&v| self.prop.is_free(v)) {
            Some(var) => {
                let choices = self.prop.choices(var);
                Some(self.frame(var, choices))
            }
            None => {
                let values = self.prop.lo().to_vec();
                if self.model.is_feasible(&values) {
                    self.record(values, stats);
                }
                None
            }
        }
    }

    fn frame(&self, var: usize, choices: Vec<(i64, i64)>) -> Frame {
        Frame {
            trail_len: self.prop.trail_len(),
            var,
            choices,
            next: 0,
        }
    }

    /// Relaxation continue du nœud : variables fixées substituées, lignes triviales omises.
    fn relax(&self) -> Relaxation {
        let (lo, hi) = (self.prop.lo(), self.prop.hi());
        let n = lo.len();
        let fixed_objective = |values: &[f64]| -> f64 {
            self.objective
                .iter()
                .map(|(v, c)| *c as f64 * values[*v])
                .sum::<f64>()
                + self.objective_constant as f64
        };
        if (0..n).all(|v| !self.prop.is_free(v)) {
            let values: Vec<f64> = lo.iter().map(|&x| x as f64).collect();
            return Relaxation::Solved {
                bound: fixed_objective(&values),
                values,
            };
        }

        let mut vars = ProblemVariables::new();
        let lp_vars: Vec<Option<Variable>> = (0..n)
            .map(|v| {
                self.prop
                    .is_free(v)
                    .then(|| vars.add(variable().min(lo[v] as f64).max(hi[v] as f64)))
            })
            .collect();

        let mut objective = Expression::from(0.0);
        for (v, c) in &self.objective {
            if let Some(var) = lp_vars[*v] {
                objective += (*c as f64) * var;
            }
        }
        let mut problem = vars.minimise(objective).using(default_solver);
        for row in self.prop.rows() {
            let mut rhs = row.rhs as f64;
            let mut expr = Expression::from(0.0);
            let mut free = 0;
            for (v, a) in &row.terms {
                match lp_vars[*v] {
                    Some(var) => {
                        expr += (*a as f64) * var;
                        free += 1;
                    }
                    None => rhs -= (*a * lo[*v]) as f64,
                }
            }
            // une ligne à une seule variable libre est déjà une borne propagée
            if free >= 2 {
                problem = problem.with(constraint!(expr <= rhs));
            }
        }

        match problem.solve() {
            Ok(solution) => {
                let values: Vec<f64> = (0..n)
                    .map(|v| match lp_vars[v] {
                        Some(var) => solution.value(var),
                        None => lo[v] as f64,
                    })
                    .collect();
                Relaxation::Solved {
                    bound: fixed_objective(&values),
                    values,
                }
            }
            Err(ResolutionError::Infeasible) => Relaxation::Infeasible,
            Err(err) => {
                trace!(%err, "relaxation unavailable");
                Relaxation::Unavailable
            }
        }
    }

    /// Variable libre la plus fractionnaire, décisions d'abord.
    fn most_fractional(&self, values: &[f64]) -> Option<(usize, f64)> {
        let mut best: Option<(Priority, f64, usize)> = None;
        for &v in &self.order {
            if !self.prop.is_free(v) {
                continue;
            }
            let frac = (values[v] - values[v].round()).abs();
            if frac <= INTEGRALITY_TOLERANCE {
                continue;
            }
            let priority = self.model.variables()[v].priority;
            let better = match best {
                None => true,
                Some((p, f, _)) => {
                    priority < p || (priority == p && frac > f + INTEGRALITY_TOLERANCE)
                }
            };
            if better {
                best = Some((priority, frac, v));
            }
        }
        best.map(|(_, _, v)| (v, values[v]))
    }

    fn early_stop(&self, root_bound: Option<f64>, relative_gap: f64) -> Option<SolveStatus> {
        let best = self.best.as_ref()?.objective();
        let bound = integral_bound(root_bound?);
        if best <= bound {
            return Some(SolveStatus::Optimal);
        }
        let denom = best.abs().max(1) as f64;
        (relative_gap > 0.0 && ((best - bound) as f64) / denom <= relative_gap)
            .then_some(SolveStatus::Feasible)
    }

    fn interrupted(&self) -> SolveStatus {
        if self.best.is_some() {
            SolveStatus::Feasible
        } else {
            SolveStatus::TimeoutNoSolution
        }
    }

    fn record(&mut self, values: Vec<i64>, stats: &mut SolveStats) {
        let objective = self
            .objective
            .iter()
            .map(|(v, c)| c * values[*v])
            .sum::<i64>()
            + self.objective_constant;
        if self.best.as_ref().is_some_and(|b| b.objective() <= objective) {
            return;
        }
        stats.solutions += 1;
        self.best = Some(Solution::new(values, objective));
    }
}

fn out_of_budget(params: &SolveParams, started: Instant, stats: &SolveStats) -> bool {
    params.node_limit.is_some_and(|limit| stats.nodes > limit)
        || started.elapsed() >= params.time_budget
}

/// Objectif entier : toute solution entière du sous-arbre vaut au moins `⌈bound⌉`.
fn integral_bound(bound: f64) -> i64 {
    (bound - INTEGRALITY_TOLERANCE).ceil() as i64
}
