use super::builder::{BuildMode, ConstraintBuilder, StageModel, Waivers};
use super::{util, SchedError};
use crate::config::CoverageSlot;
use crate::engine::{ConstraintFamily, SolveEngine, SolveParams, SolveStatus};
use crate::model::ShiftKind;
use crate::state::{Assignment, CapacityGap, RosterState};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfeasibilityCause {
    Proven,
    Timeout,
}

impl fmt::Display for InfeasibilityCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InfeasibilityCause::Proven => "proven infeasible",
            InfeasibilityCause::Timeout => "no solution within the time budget",
        })
    }
}

/// Nombre de candidats par créneau, pour le diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCandidates {
    pub date: NaiveDate,
    pub kind: ShiftKind,
    pub required: u32,
    pub candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfeasibilityReport {
    pub stage: String,
    pub cause: InfeasibilityCause,
    pub slots: Vec<SlotCandidates>,
    /// Familles dont le retrait suffit à rendre l'étape faisable.
    pub tight_families: Vec<ConstraintFamily>,
}

impl fmt::Display for InfeasibilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} halted: {}", self.stage, self.cause)?;
        if !self.tight_families.is_empty() {
            let names: Vec<String> = self.tight_families.iter().map(|t| t.to_string()).collect();
            write!(f, "; tight constraints: {}", names.join(", "))?;
        }
        Ok(())
    }
}

/// Issue du diagnostic d'une étape en échec.
#[derive(Debug, Clone)]
pub enum Triage {
    /// L'étape continue : créneaux signalés, le reste affecté.
    CapacityGaps {
        gaps: Vec<CapacityGap>,
        assignments: Vec<Assignment>,
    },
    Hard(InfeasibilityReport),
}

pub struct GapReporter<'a, E> {
    builder: &'a ConstraintBuilder<'a>,
    engine: &'a E,
    params: SolveParams,
}

impl<'a, E: SolveEngine> GapReporter<'a, E> {
    pub fn new(builder: &'a ConstraintBuilder<'a>, engine: &'a E, params: SolveParams) -> Self {
        Self {
            builder,
            engine,
            params,
        }
    }

    /// Distingue manque de capacité (on continue) et infaisabilité dure (on s'arrête).
    pub fn triage(&self, status: SolveStatus) -> Result<Triage, SchedError> {
        match status {
            SolveStatus::Infeasible => self.after_proof(),
            SolveStatus::TimeoutNoSolution => {
                let gaps = self.static_gaps();
                if gaps.is_empty() {
                    return Ok(Triage::Hard(self.report(InfeasibilityCause::Timeout, None)));
                }
                info!(
                    stage = %self.builder.stage.name,
                    gaps = gaps.len(),
                    "static capacity gaps after timeout"
                );
                self.resolve_waiving(gaps, None)
            }
            SolveStatus::Optimal | SolveStatus::Feasible => Err(anyhow::anyhow!(
                "stage {} was solved, nothing to triage",
                self.builder.stage.name
            )
            .into()),
        }
    }

    /// Créneaux dont le nombre de candidats est inférieur au besoin, indépendamment du modèle.
    pub fn static_gaps(&self) -> Vec<CapacityGap> {
        let b = self.builder;
        b.catalog
            .slots()
            .iter()
            .filter_map(|slot| {
                let candidates: Vec<usize> = (0..b.people.len())
                    .filter(|idx| {
                        util::exclusion_reason(
                            b.stage,
                            &b.people[*idx],
                            *idx,
                            b.state,
                            slot.day,
                            slot.kind,
                        )
                        .is_none()
                    })
                    .collect();
                let have = u32::try_from(candidates.len()).unwrap_or(u32::MAX);
                (have < slot.required)
                    .then(|| self.gap(slot, slot.required - have, b.state, &candidates))
            })
            .collect()
    }

    fn gap(
        &self,
        slot: &CoverageSlot,
        shortfall: u32,
        state: &RosterState,
        covering: &[usize],
    ) -> CapacityGap {
        let b = self.builder;
        CapacityGap {
            date: state.dates()[slot.day],
            kind: slot.kind,
            shortfall,
            stage: b.stage.name.clone(),
            exclusions: util::ranked_exclusions(
                b.stage, b.people, state, slot.day, slot.kind, covering,
            ),
        }
    }

    fn after_proof(&self) -> Result<Triage, SchedError> {
        let elastic = self.builder.build(BuildMode::Elastic, &Waivers::new())?;
        let outcome = self.engine.solve(&elastic.model, &self.params);
        let Some(solution) = outcome.solution else {
            let cause = match outcome.status {
                SolveStatus::TimeoutNoSolution => InfeasibilityCause::Timeout,
                _ => InfeasibilityCause::Proven,
            };
            let strict = self.builder.build(BuildMode::Strict, &Waivers::new())?;
            return Ok(Triage::Hard(self.report(cause, Some(&strict))));
        };
        let uncovered = elastic.uncovered(&solution);
        if uncovered.is_empty() {
            debug!(stage = %self.builder.stage.name, "elastic model covers every slot");
            let strict = self.builder.build(BuildMode::Strict, &Waivers::new())?;
            return Ok(Triage::Hard(
                self.report(InfeasibilityCause::Proven, Some(&strict)),
            ));
        }

        let relaxed = elastic.decode(&solution);
        let mut trial = self.builder.state.clone();
        for a in &relaxed {
            trial.set(a.day, a.person, a.kind);
        }
        let gaps: Vec<CapacityGap> = uncovered
            .iter()
            .map(|(slot, missing)| {
                let covering: Vec<usize> = relaxed
                    .iter()
                    .filter(|a| a.day == slot.day && a.kind == slot.kind)
                    .map(|a| a.person)
                    .collect();
                self.gap(slot, *missing, &trial, &covering)
            })
            .collect();
        info!(
            stage = %self.builder.stage.name,
            gaps = gaps.len(),
            "capacity gaps from elastic pass"
        );
        self.resolve_waiving(gaps, Some(&relaxed))
    }

    fn resolve_waiving(
        &self,
        gaps: Vec<CapacityGap>,
        hints: Option<&[Assignment]>,
    ) -> Result<Triage, SchedError> {
        let waived = waivers(self.builder.state, &gaps);
        let mut strict = self.builder.build(BuildMode::Strict, &waived)?;
        if let Some(assignments) = hints {
            strict.hint_from(assignments);
        }
        let outcome = self.engine.solve(&strict.model, &self.params);
        match outcome.solution {
            Some(solution) => Ok(Triage::CapacityGaps {
                gaps,
                assignments: strict.decode(&solution),
            }),
            None => {
                let cause = match outcome.status {
                    SolveStatus::Infeasible => InfeasibilityCause::Proven,
                    _ => InfeasibilityCause::Timeout,
                };
                warn!(
                    stage = %self.builder.stage.name,
                    %cause,
                    "stage still fails after waiving gaps"
                );
                Ok(Triage::Hard(self.report(cause, Some(&strict))))
            }
        }
    }

    fn report(
        &self,
        cause: InfeasibilityCause,
        failed: Option<&StageModel>,
    ) -> InfeasibilityReport {
        let b = self.builder;
        let slots = b
            .catalog
            .slots()
            .iter()
            .map(|slot| SlotCandidates {
                date: b.state.dates()[slot.day],
                kind: slot.kind,
                required: slot.required,
                candidates: util::candidate_count(b.stage, b.people, b.state, slot.day, slot.kind),
            })
            .collect();
        let tight_families = match (cause, failed) {
            (InfeasibilityCause::Proven, Some(model)) => self.tight_families(model),
            _ => Vec::new(),
        };
        InfeasibilityReport {
            stage: b.stage.name.clone(),
            cause,
            slots,
            tight_families,
        }
    }

    /// Filtre par suppression : une famille est tendue si l'étape devient faisable sans elle.
    fn tight_families(&self, failed: &StageModel) -> Vec<ConstraintFamily> {
        let families = failed.model.families();
        let share = u32::try_from(families.len() + 1).unwrap_or(u32::MAX);
        let params = SolveParams {
            time_budget: self.params.time_budget / share,
            ..self.params
        };
        families
            .into_iter()
            .filter(|family| {
                let relaxed = failed.model.without(*family);
                self.engine.solve(&relaxed, &params).status.has_solution()
            })
            .collect()
    }
}

/// Besoins levés par créneau pour les trous signalés.
pub(super) fn waivers(state: &RosterState, gaps: &[CapacityGap]) -> Waivers {
    let mut waived = Waivers::new();
    for gap in gaps {
        if let Some(day) = state.day_index(gap.date) {
            *waived.entry((day, gap.kind)).or_insert(0) += gap.shortfall;
        }
    }
    waived
}
