use super::{greedy, util, SchedError, SolveOptions, StageSpec};
use crate::config::{CoverageCatalog, CoverageSlot};
use crate::engine::{ConstraintFamily, LinearExpr, Model, Priority, Solution, VarId};
use crate::fairness::{FairnessScorer, FairnessVars};
use crate::model::{Calendar, Person, ShiftCategory, ShiftKind};
use crate::rest::{
    weekends, RestPeriodEvaluator, HOURS_WINDOW_DAYS, MAX_BLOCK_NIGHTS,
    MAX_CONSECUTIVE_LONG_SHIFTS, MAX_CONSECUTIVE_SHIFTS, MAX_HOURS_IN_SEVEN_DAYS,
    MIN_NIGHT_GAP_DAYS, REST_DAYS_AFTER_RUN,
};
use crate::state::{Assignment, RosterState, RunningTotals};
use chrono::Weekday;
use std::collections::BTreeMap;

/// Besoins levés par créneau (jour, type) : effectif retiré de la couverture exigée.
pub type Waivers = BTreeMap<(usize, ShiftKind), u32>;

/// Plus petit bonus de forme non nul ; borne le bonus d'espacement à sa moitié.
const SMALLEST_SHAPE_REWARD: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Couverture exacte, tolérance d'équité appliquée.
    Strict,
    /// Couverture avec variables d'écart pénalisées ; contraintes de politique retirées.
    Elastic,
}

/// Traitement des nuits isolées créées par l'étape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Singletons {
    Penalised,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub var: VarId,
    pub day: usize,
    pub person: usize,
    pub kind: ShiftKind,
}

#[derive(Debug, Clone)]
pub struct StageModel {
    pub model: Model,
    pub mode: BuildMode,
    pub candidates: Vec<Candidate>,
    /// Variable d'écart par créneau (mode élastique).
    pub slack: Vec<(CoverageSlot, VarId)>,
    pub fairness: Option<FairnessVars>,
}

impl StageModel {
    pub fn decode(&self, solution: &Solution) -> Vec<Assignment> {
        let mut out: Vec<Assignment> = self
            .candidates
            .iter()
            .filter(|c| solution.is_true(c.var))
            .map(|c| Assignment {
                day: c.day,
                person: c.person,
                kind: c.kind,
            })
            .collect();
        out.sort();
        out
    }

    /// Créneaux laissés ouverts par une solution élastique, avec le manque.
    pub fn uncovered(&self, solution: &Solution) -> Vec<(CoverageSlot, u32)> {
        self.slack
            .iter()
            .filter_map(|(slot, var)| {
                let missing = u32::try_from(solution.value(*var)).ok()?;
                (missing > 0).then_some((*slot, missing))
            })
            .collect()
    }

    /// Oriente la première descente vers une affectation connue.
    pub fn hint_from(&mut self, assignments: &[Assignment]) {
        for c in &self.candidates {
            let chosen = assignments
                .iter()
                .any(|a| a.day == c.day && a.person == c.person && a.kind == c.kind);
            self.model.set_hint(c.var, i64::from(chosen));
        }
    }

    pub fn candidate_count(&self, day: usize, kind: ShiftKind) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.day == day && c.kind == kind)
            .count()
    }
}

/// Bonus de taille de bloc selon le temps de travail.
pub fn block_size_reward(wte: f64, length: usize) -> i64 {
    let table: [(usize, i64); 3] = if wte >= 1.0 {
        [(4, 40), (3, 30), (2, 20)]
    } else if wte >= 0.8 {
        [(3, 40), (4, 30), (2, 20)]
    } else if wte >= 0.6 {
        [(2, 40), (3, 30), (4, 20)]
    } else {
        [(2, 40), (3, 20), (4, 0)]
    };
    table
        .iter()
        .find(|(len, _)| *len == length)
        .map_or(0, |(_, reward)| *reward)
}

pub struct ConstraintBuilder<'a> {
    pub calendar: &'a Calendar,
    pub people: &'a [Person],
    pub stage: &'a StageSpec,
    pub catalog: &'a CoverageCatalog,
    pub state: &'a RosterState,
    pub totals: &'a RunningTotals,
    pub options: &'a SolveOptions,
}

impl<'a> ConstraintBuilder<'a> {
    /// Modèle de l'étape, indices posés depuis l'heuristique gloutonne.
    pub fn build(&self, mode: BuildMode, waived: &Waivers) -> Result<StageModel, SchedError> {
        self.assemble(mode, waived, Singletons::Penalised)
    }

    /// Variante stricte où une nuit isolée créée par l'étape est interdite, non pénalisée.
    pub fn build_without_singletons(&self, waived: &Waivers) -> Result<StageModel, SchedError> {
        self.assemble(BuildMode::Strict, waived, Singletons::Forbidden)
    }

    /// Affectation gloutonne de l'étape, sans garantie de couverture complète.
    pub fn seed(&self) -> Result<Vec<Assignment>, SchedError> {
        let (assignments, _) =
            greedy::assign(self.stage, self.people, self.catalog, self.state, self.totals)?;
        Ok(assignments)
    }

    fn assemble(
        &self,
        mode: BuildMode,
        waived: &Waivers,
        singletons: Singletons,
    ) -> Result<StageModel, SchedError> {
        let category = self.stage.category()?;
        let mut model = Model::new();
        let mut candidates = Vec::new();
        let mut slack = Vec::new();
        let weights = &self.options.weights;

        for slot in self.catalog.slots() {
            let mut cover = LinearExpr::new();
            for (idx, person) in self.people.iter().enumerate() {
                let excluded = util::exclusion_reason(
                    self.stage, person, idx, self.state, slot.day, slot.kind,
                );
                if excluded.is_some() {
                    continue;
                }
                let var = model.new_bool(format!("x[{},{},{}]", person.id, slot.day, slot.kind));
                cover.add_term(var, 1);
                candidates.push(Candidate {
                    var,
                    day: slot.day,
                    person: idx,
                    kind: slot.kind,
                });
            }
            let target = i64::from(
                slot.required
                    .saturating_sub(waived.get(&(slot.day, slot.kind)).copied().unwrap_or(0)),
            );
            match mode {
                BuildMode::Strict => model.add_eq(cover, target, ConstraintFamily::Coverage),
                BuildMode::Elastic => {
                    let name = format!("slack[{},{}]", slot.day, slot.kind);
                    let gap = model.new_int(name, 0, target);
                    model.set_priority(gap, Priority::Auxiliary);
                    model.set_hint(gap, 0);
                    model.add_objective_term(gap, weights.elastic_slack);
                    model.add_eq(cover.with_term(gap, 1), target, ConstraintFamily::Coverage);
                    slack.push((*slot, gap));
                }
            }
        }

        let mut by_person: BTreeMap<usize, Vec<&Candidate>> = BTreeMap::new();
        for c in &candidates {
            by_person.entry(c.person).or_default().push(c);
        }

        for (person, own) in &by_person {
            let mut per_day: BTreeMap<usize, Vec<VarId>> = BTreeMap::new();
            for c in own {
                per_day.entry(c.day).or_default().push(c.var);
            }
            for vars in per_day.values().filter(|v| v.len() > 1) {
                let expr = vars
                    .iter()
                    .fold(LinearExpr::new(), |e, v| e.with_term(*v, 1));
                model.add_le(expr, 1, ConstraintFamily::OneShiftPerDay);
            }
            if category == ShiftCategory::Night {
                self.add_night_rules(&mut model, *person, &per_day, singletons);
            }
            self.add_work_limits(&mut model, *person, own, category);
        }

        let loads: Vec<LinearExpr> = by_person
            .iter()
            .map(|(person, own)| {
                let vars: Vec<VarId> = own.iter().map(|c| c.var).collect();
                FairnessScorer::load_expr(
                    self.people[*person].wte,
                    self.totals.count(*person, category),
                    &vars,
                )
            })
            .collect();
        let tolerance = match mode {
            BuildMode::Strict => self.options.fairness_tolerance,
            BuildMode::Elastic => None,
        };
        let fairness = FairnessScorer::add_terms(
            &mut model,
            &loads,
            weights.fairness_max,
            weights.fairness_min,
            tolerance,
        );

        let mut stage_model = StageModel {
            model,
            mode,
            candidates,
            slack,
            fairness,
        };
        stage_model.hint_from(&self.seed()?);
        Ok(stage_model)
    }

    /// Suites de shifts, suites de shifts longs, heures sur 7 jours et week-ends consécutifs.
    ///
    /// En étape de nuits, les fenêtres sans shift de jour validé sont déjà couvertes par
    /// les règles de blocs (au plus 4 nuits sur 10 jours, 52 h sur 7 jours) et sont omises.
    fn add_work_limits(
        &self,
        model: &mut Model,
        person: usize,
        own: &[&Candidate],
        category: ShiftCategory,
    ) {
        let days = self.state.num_days();
        let committed: Vec<ShiftKind> = self.state.timeline(person);
        let mut work: Vec<LinearExpr> = Vec::with_capacity(days);
        let mut long: Vec<LinearExpr> = Vec::with_capacity(days);
        let mut hours: Vec<LinearExpr> = Vec::with_capacity(days);
        for kind in &committed {
            work.push(LinearExpr::constant(i64::from(kind.is_working())));
            long.push(LinearExpr::constant(i64::from(kind.is_long())));
            hours.push(LinearExpr::constant(i64::from(kind.hours())));
        }
        for c in own {
            work[c.day].add_term(c.var, 1);
            if c.kind.is_long() {
                long[c.day].add_term(c.var, 1);
            }
            hours[c.day].add_term(c.var, i64::from(c.kind.hours()));
        }
        let needed = |from: usize, to: usize| {
            category != ShiftCategory::Night
                || (from..=to).any(|d| committed[d].category() == ShiftCategory::Day)
        };
        let sum = |exprs: &[LinearExpr]| {
            exprs
                .iter()
                .fold(LinearExpr::new(), |acc, e| acc.with_scaled(e, 1))
        };

        for (max, series) in [
            (MAX_CONSECUTIVE_SHIFTS, &work),
            (MAX_CONSECUTIVE_LONG_SHIFTS, &long),
        ] {
            for start in 0..days {
                let run_end = start + max;
                if run_end > days {
                    break;
                }
                let run = sum(&series[start..run_end]);
                for next in run_end..(run_end + REST_DAYS_AFTER_RUN).min(days) {
                    if needed(start, next) {
                        let row = run.clone().with_scaled(&work[next], 1);
                        add_limit(model, row, max as i64, ConstraintFamily::ConsecutiveWork);
                    }
                }
            }
        }

        for start in 0..days.saturating_sub(HOURS_WINDOW_DAYS - 1) {
            let end = start + HOURS_WINDOW_DAYS - 1;
            if needed(start, end) {
                let row = sum(&hours[start..=end]);
                let cap = i64::from(MAX_HOURS_IN_SEVEN_DAYS);
                add_limit(model, row, cap, ConstraintFamily::WorkingHours);
            }
        }

        for pair in weekends(self.state.dates()).windows(2) {
            for a in &pair[0] {
                for b in &pair[1] {
                    let row = work[*a].clone().with_scaled(&work[*b], 1);
                    add_limit(model, row, 1, ConstraintFamily::WeekendFrequency);
                }
            }
        }
    }

    /// Fenêtre glissante, fin de bloc, isolés et bonus de forme pour une personne.
    fn add_night_rules(
        &self,
        model: &mut Model,
        person: usize,
        per_day: &BTreeMap<usize, Vec<VarId>>,
        singletons: Singletons,
    ) {
        let days = self.state.num_days();
        let weights = &self.options.weights;
        let pid = &self.people[person].id;
        let nights: Vec<LinearExpr> = (0..days)
            .map(|d| {
                let committed = RestPeriodEvaluator::is_night_category(self.state.get(d, person));
                let mut expr = LinearExpr::constant(i64::from(committed));
                for var in per_day.get(&d).map(Vec::as_slice).unwrap_or(&[]) {
                    expr.add_term(*var, 1);
                }
                expr
            })
            .collect();
        let can_work = |d: usize| nights[d].has_vars() || nights[d].constant_part() > 0;
        let surely_night = |d: usize| !nights[d].has_vars() && nights[d].constant_part() > 0;

        // au plus 4 nuits sur toute fenêtre de 10 jours : un bloc de 4 au plus, et la
        // fin d'un bloc plus le début du suivant ne dépassent pas 4 avec 7 jours d'écart
        let window = (MAX_BLOCK_NIGHTS + MIN_NIGHT_GAP_DAYS - 1).min(days);
        for start in 0..=days - window {
            let sum = (start..start + window)
                .fold(LinearExpr::new(), |acc, d| acc.with_scaled(&nights[d], 1));
            let cap = (MAX_BLOCK_NIGHTS as i64).max(sum.constant_part());
            add_limit(model, sum, cap, ConstraintFamily::BlockLength);
        }

        for d in (0..days).filter(|d| nights[*d].has_vars()) {
            let resume: Vec<usize> = (2..MIN_NIGHT_GAP_DAYS)
                .map(|j| d + j)
                .filter(|t| *t < days && can_work(*t))
                .collect();
            if !resume.is_empty() {
                let end = model.new_bool(format!("end[{pid},{d}]"));
                model.set_priority(end, Priority::Auxiliary);
                let mut ends = LinearExpr::from(end).with_scaled(&nights[d], -1);
                if d + 1 < days {
                    ends.add_scaled(&nights[d + 1], 1);
                }
                model.add_ge(ends, 0, ConstraintFamily::NightSpacing);
                // fin de bloc en d : aucune nuit de d+2 à d+6
                let k = resume.len() as i64;
                let forbid = resume
                    .iter()
                    .fold(LinearExpr::term(end, k), |acc, t| acc.with_scaled(&nights[*t], 1));
                model.add_le(forbid, k, ConstraintFamily::NightSpacing);
            }

            let mut neighbours = LinearExpr::new();
            if d > 0 {
                neighbours.add_scaled(&nights[d - 1], 1);
            }
            if d + 1 < days {
                neighbours.add_scaled(&nights[d + 1], 1);
            }
            match singletons {
                Singletons::Penalised => {
                    let single = model.new_bool(format!("single[{pid},{d}]"));
                    model.set_priority(single, Priority::Auxiliary);
                    model.add_objective_term(single, weights.singleton_penalty);
                    let isolated = LinearExpr::from(single)
                        .with_scaled(&nights[d], -1)
                        .with_scaled(&neighbours, 1);
                    model.add_ge(isolated, 0, ConstraintFamily::BlockShape);
                }
                Singletons::Forbidden => {
                    let isolated = nights[d].clone().with_scaled(&neighbours, -1);
                    model.add_le(isolated, 0, ConstraintFamily::BlockShape);
                }
            }
        }

        let evaluator = RestPeriodEvaluator::new(self.state);
        let spacing_cap = weights.spacing_cap.min(SMALLEST_SHAPE_REWARD / 2);
        for start in 0..days {
            for length in 2..=MAX_BLOCK_NIGHTS {
                let end = start + length;
                if end > days {
                    break;
                }
                let inside = start..end;
                if !inside.clone().all(can_work)
                    || !inside.clone().any(|d| nights[d].has_vars())
                    || (start > 0 && surely_night(start - 1))
                    || (end < days && surely_night(end))
                {
                    continue;
                }
                let spacing = match evaluator.previous_night(person, start) {
                    None => spacing_cap,
                    Some(prev) => {
                        let spare = (start - prev).saturating_sub(MIN_NIGHT_GAP_DAYS) as i64;
                        (spare * weights.spacing_step).min(spacing_cap)
                    }
                };
                let reward = block_size_reward(self.people[person].wte, length)
                    + self.weekend_reward(start, length)
                    + spacing;
                if reward <= 0 {
                    continue;
                }
                let block = model.new_bool(format!("block[{pid},{start},{length}]"));
                model.set_priority(block, Priority::Auxiliary);
                model.add_objective_term(block, -reward);
                // block = 1 : nuits sur tout l'intervalle, aucune juste avant ni juste après
                let within = inside.fold(LinearExpr::term(block, length as i64), |acc, d| {
                    acc.with_scaled(&nights[d], -1)
                });
                model.add_le(within, 0, ConstraintFamily::BlockShape);
                let edges: Vec<usize> = [start.checked_sub(1), (end < days).then_some(end)]
                    .into_iter()
                    .flatten()
                    .collect();
                if !edges.is_empty() {
                    let k = edges.len() as i64;
                    let outside = edges
                        .iter()
                        .fold(LinearExpr::term(block, k), |acc, d| acc.with_scaled(&nights[*d], 1));
                    model.add_le(outside, k, ConstraintFamily::BlockShape);
                }
            }
        }
    }

    /// Vendredi→dimanche (3 nuits) mieux noté que jeudi→dimanche (4 nuits).
    fn weekend_reward(&self, start: usize, length: usize) -> i64 {
        let weights = &self.options.weights;
        match (self.calendar.day(start).weekday(), length) {
            (Weekday::Fri, 3) => weights.weekend_fri_sun,
            (Weekday::Thu, 4) => weights.weekend_thu_sun,
            _ => 0,
        }
    }
}

/// Ajoute `expr ≤ rhs` sauf si la ligne ne peut pas être violée.
fn add_limit(model: &mut Model, expr: LinearExpr, rhs: i64, family: ConstraintFamily) {
    let upper = expr.constant_part() + expr.terms().iter().map(|(_, c)| (*c).max(0)).sum::<i64>();
    if expr.has_vars() && upper > rhs {
        model.add_le(expr, rhs, family);
    }
}
