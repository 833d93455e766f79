use super::builder::block_size_reward;
use super::{util, SchedError, StageSpec};
use crate::config::{CoverageCatalog, CoverageSlot};
use crate::fairness::FairnessScorer;
use crate::model::{Person, ShiftCategory, ShiftKind};
use crate::rest::MAX_BLOCK_NIGHTS;
use crate::state::{Assignment, CapacityGap, RosterState, RunningTotals};
use std::cmp::Reverse;

type Planned = (Vec<Assignment>, Vec<CapacityGap>);

/// Heuristique : chaque créneau va à la personne disponible dont la charge projetée
/// est la plus faible (égalité : ordre du rota). Les nuits sont posées par blocs.
/// N'échoue jamais ; un créneau sans candidat devient un trou de couverture.
pub(super) fn assign(
    stage: &StageSpec,
    people: &[Person],
    catalog: &CoverageCatalog,
    state: &RosterState,
    totals: &RunningTotals,
) -> Result<Planned, SchedError> {
    let mut plan = Plan {
        stage,
        people,
        catalog,
        totals,
        category: stage.category()?,
        working: state.clone(),
        extra: vec![0; people.len()],
        until: vec![None; people.len()],
        assignments: Vec::new(),
        gaps: Vec::new(),
    };
    for slot in catalog.slots() {
        if plan.category == ShiftCategory::Night {
            plan.fill_nights(slot);
        } else {
            plan.fill(slot);
        }
    }
    plan.assignments.sort();
    Ok((plan.assignments, plan.gaps))
}

struct Plan<'a> {
    stage: &'a StageSpec,
    people: &'a [Person],
    catalog: &'a CoverageCatalog,
    totals: &'a RunningTotals,
    category: ShiftCategory,
    working: RosterState,
    extra: Vec<u32>,
    /// Dernier jour prévu du bloc de nuits en cours, par personne.
    until: Vec<Option<usize>>,
    assignments: Vec<Assignment>,
    gaps: Vec<CapacityGap>,
}

impl<'a> Plan<'a> {
    fn available(&self, idx: usize, day: usize, kind: ShiftKind) -> bool {
        util::exclusion_reason(self.stage, &self.people[idx], idx, &self.working, day, kind)
            .is_none()
    }

    fn load(&self, idx: usize) -> i64 {
        FairnessScorer::projected_load(
            &self.people[idx],
            idx,
            self.totals,
            self.category,
            self.extra[idx] + 1,
        )
    }

    fn place(&mut self, slot: &CoverageSlot, idx: usize, covering: &mut Vec<usize>) {
        self.working.set(slot.day, idx, slot.kind);
        self.extra[idx] += 1;
        covering.push(idx);
        self.assignments.push(Assignment {
            day: slot.day,
            person: idx,
            kind: slot.kind,
        });
    }

    fn gap(&mut self, slot: &CoverageSlot, filled: usize, covering: &[usize]) {
        let filled = u32::try_from(filled).unwrap_or(u32::MAX);
        self.gaps.push(CapacityGap {
            date: self.working.dates()[slot.day],
            kind: slot.kind,
            shortfall: slot.required.saturating_sub(filled),
            stage: self.stage.name.clone(),
            exclusions: util::ranked_exclusions(
                self.stage,
                self.people,
                &self.working,
                slot.day,
                slot.kind,
                covering,
            ),
        });
    }

    fn fill(&mut self, slot: &CoverageSlot) {
        let mut covering = Vec::new();
        while covering.len() < slot.required as usize {
            let pick = (0..self.people.len())
                .filter(|idx| {
                    !covering.contains(idx) && self.available(*idx, slot.day, slot.kind)
                })
                .min_by_key(|idx| (self.load(*idx), *idx));
            match pick {
                Some(idx) => self.place(slot, idx, &mut covering),
                None => {
                    self.gap(slot, covering.len(), &covering);
                    break;
                }
            }
        }
    }

    /// Poursuit les blocs en cours, puis ouvre de nouveaux blocs chez les moins chargés,
    /// en préférant qui peut enchaîner au moins deux nuits.
    fn fill_nights(&mut self, slot: &CoverageSlot) {
        let (day, kind) = (slot.day, slot.kind);
        let required = slot.required as usize;
        let mut covering = Vec::new();

        for idx in 0..self.people.len() {
            let Some(until) = self.until[idx] else {
                continue;
            };
            let previous = day.checked_sub(1).map(|d| self.working.get(d, idx));
            if until < day || previous != Some(kind) {
                continue;
            }
            if covering.len() < required && self.available(idx, day, kind) {
                self.place(slot, idx, &mut covering);
            } else {
                self.until[idx] = None;
            }
        }

        while covering.len() < required {
            let pick = (0..self.people.len())
                .filter(|idx| {
                    !covering.contains(idx)
                        && !self.until[*idx].is_some_and(|until| until >= day)
                        && self.available(*idx, day, kind)
                })
                .map(|idx| (self.reach(idx, day, kind), idx))
                .min_by_key(|(reach, idx)| (*reach < 2, self.load(*idx), *idx));
            match pick {
                Some((reach, idx)) => {
                    let remaining = self.working.num_days() - day;
                    let length = block_length(self.people[idx].wte, reach, remaining);
                    self.until[idx] = Some(day + length - 1);
                    self.place(slot, idx, &mut covering);
                }
                None => {
                    self.gap(slot, covering.len(), &covering);
                    break;
                }
            }
        }
    }

    /// Nombre de nuits consécutives que la personne peut enchaîner à partir de `day`.
    fn reach(&self, idx: usize, day: usize, kind: ShiftKind) -> usize {
        let mut scratch = self.working.clone();
        scratch.set(day, idx, kind);
        let mut reach = 1;
        let last = (day + MAX_BLOCK_NIGHTS).min(scratch.num_days());
        for next in day + 1..last {
            let open = self.catalog.required(next, kind) > 0
                && util::exclusion_reason(self.stage, &self.people[idx], idx, &scratch, next, kind)
                    .is_none();
            if !open {
                break;
            }
            scratch.set(next, idx, kind);
            reach += 1;
        }
        reach
    }
}

/// Longueur du bloc : celle que le WTE préfère, bornée par `reach`, sans laisser
/// une nuit orpheline en fin d'horizon.
fn block_length(wte: f64, reach: usize, remaining: usize) -> usize {
    if reach < 2 {
        return 1;
    }
    let preferred = (2..=MAX_BLOCK_NIGHTS)
        .max_by_key(|len| (block_size_reward(wte, *len), Reverse(*len)))
        .unwrap_or(2);
    let mut length = preferred.min(reach);
    if remaining == length + 1 {
        if length < reach {
            length += 1;
        } else if length > 2 {
            length -= 1;
        }
    }
    length
}
