mod builder;
mod conflicts;
mod gaps;
mod greedy;
mod types;
mod util;

pub use builder::{block_size_reward, BuildMode, Candidate, ConstraintBuilder, StageModel, Waivers};
pub use conflicts::{audit, Violation, ViolationKind};
pub use gaps::{GapReporter, InfeasibilityCause, InfeasibilityReport, SlotCandidates, Triage};
pub use types::{
    default_stages, Eligibility, ObjectiveWeights, SchedError, SolveOptions, StageSpec,
    StageStrategy, ValidationError,
};

use crate::config::{CoverageCatalog, CoverageRule, RotaConfig};
use crate::engine::{MilpEngine, SolveEngine, SolveParams, SolveStatus};
use crate::model::{validate_people, Calendar, Person, PersonId, ShiftCategory};
use crate::rest::RestPeriodEvaluator;
use crate::state::{Assignment, BlockException, CapacityGap, RosterState, RunningTotals};
use chrono::NaiveDate;
use tracing::{info, warn};

/// Résultat d'une étape avant validation.
#[derive(Default)]
struct Solved {
    assignments: Vec<Assignment>,
    gaps: Vec<CapacityGap>,
    exceptions: Vec<BlockException>,
    status: Option<SolveStatus>,
    objective: Option<i64>,
}

/// Bilan d'une étape validée.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: String,
    pub strategy: StageStrategy,
    /// Statut du dernier appel au moteur (absent pour le glouton ou une étape vide).
    pub status: Option<SolveStatus>,
    pub objective: Option<i64>,
    pub assignments: usize,
    pub gaps: usize,
    pub exceptions: usize,
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub state: RosterState,
    pub totals: RunningTotals,
    pub report: StageReport,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Dernier instantané validé.
    pub state: RosterState,
    pub totals: RunningTotals,
    pub stages: Vec<StageReport>,
    /// Diagnostic de l'étape qui a arrêté le pipeline.
    pub halted: Option<InfeasibilityReport>,
}

impl PipelineOutcome {
    pub fn is_complete(&self) -> bool {
        self.halted.is_none()
    }

    pub fn has_warnings(&self) -> bool {
        !self.state.gaps().is_empty() || !self.state.exceptions().is_empty()
    }
}

/// Pipeline séquentiel : chaque étape lit l'instantané précédent et en produit un nouveau.
#[derive(Debug, Clone)]
pub struct StagePipeline<E = MilpEngine> {
    calendar: Calendar,
    people: Vec<Person>,
    coverage: Vec<CoverageRule>,
    stages: Vec<StageSpec>,
    options: SolveOptions,
    engine: E,
}

impl StagePipeline<MilpEngine> {
    pub fn new(
        calendar: Calendar,
        people: Vec<Person>,
        coverage: Vec<CoverageRule>,
        stages: Vec<StageSpec>,
    ) -> Result<Self, SchedError> {
        validate_people(&people)?;
        for stage in &stages {
            stage.validate()?;
        }
        Ok(Self {
            calendar,
            people,
            coverage,
            stages,
            options: SolveOptions::default(),
            engine: MilpEngine::new(),
        })
    }

    pub fn from_config(config: &RotaConfig, people: Vec<Person>) -> Result<Self, SchedError> {
        config.validate()?;
        let pipeline = Self::new(
            config.calendar()?,
            people,
            config.coverage.clone(),
            config.stages(),
        )?;
        Ok(pipeline.with_options(config.solve_options()))
    }
}

impl<E: SolveEngine> StagePipeline<E> {
    pub fn with_engine<F: SolveEngine>(self, engine: F) -> StagePipeline<F> {
        StagePipeline {
            calendar: self.calendar,
            people: self.people,
            coverage: self.coverage,
            stages: self.stages,
            options: self.options,
            engine,
        }
    }

    pub fn with_options(mut self, options: SolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn people(&self) -> &[Person] {
        &self.people
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Result<&StageSpec, SchedError> {
        self.stages
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SchedError::UnknownStage(name.to_string()))
    }

    pub fn initial_state(&self) -> RosterState {
        RosterState::new(&self.calendar, &self.people)
    }

    pub fn run(&self) -> Result<PipelineOutcome, SchedError> {
        let state = self.initial_state();
        let totals = RunningTotals::new(self.people.len());
        self.run_from(state, totals)
    }

    /// Reprend depuis un instantané ; les étapes déjà validées sont sautées.
    pub fn run_from(
        &self,
        state: RosterState,
        totals: RunningTotals,
    ) -> Result<PipelineOutcome, SchedError> {
        self.check_snapshot(&state)?;
        let mut outcome = PipelineOutcome {
            state,
            totals,
            stages: Vec::new(),
            halted: None,
        };
        for stage in &self.stages {
            if outcome.state.stages().contains(&stage.name) {
                continue;
            }
            match self.run_stage(stage, &outcome.state, &outcome.totals) {
                Ok(result) => {
                    outcome.state = result.state;
                    outcome.totals = result.totals;
                    outcome.stages.push(result.report);
                }
                Err(SchedError::HardInfeasibility(report)) => {
                    warn!(stage = %stage.name, "{report}");
                    outcome.halted = Some(*report);
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(outcome)
    }

    /// Exécute une étape isolément sur un instantané donné.
    pub fn run_stage(
        &self,
        stage: &StageSpec,
        state: &RosterState,
        totals: &RunningTotals,
    ) -> Result<StageResult, SchedError> {
        self.check_snapshot(state)?;
        let catalog = CoverageCatalog::for_stage(&self.coverage, &self.calendar, stage);
        info!(
            stage = %stage.name,
            slots = catalog.slots().len(),
            required = catalog.total_required(),
            "stage started"
        );

        let solved = match stage.strategy {
            _ if catalog.is_empty() => Solved::default(),
            StageStrategy::GreedyAssign => {
                let (assignments, gaps) =
                    greedy::assign(stage, &self.people, &catalog, state, totals)?;
                let exceptions = single_nights(state, &assignments)
                    .into_iter()
                    .map(|single| single.exception(&stage.name, "left by greedy assignment"))
                    .collect();
                Solved {
                    assignments,
                    gaps,
                    exceptions,
                    ..Solved::default()
                }
            }
            StageStrategy::ConstraintSolve => self.solve(stage, &catalog, state, totals)?,
        };

        let Solved {
            assignments,
            gaps,
            exceptions,
            status,
            objective,
        } = solved;
        let report = StageReport {
            stage: stage.name.clone(),
            strategy: stage.strategy,
            status,
            objective,
            assignments: assignments.len(),
            gaps: gaps.len(),
            exceptions: exceptions.len(),
        };
        let next = state.commit(&stage.name, &assignments, gaps, exceptions)?;
        let totals = totals.after_commit(&assignments);
        info!(
            stage = %stage.name,
            assignments = report.assignments,
            gaps = report.gaps,
            version = next.version(),
            "stage committed"
        );
        Ok(StageResult {
            state: next,
            totals,
            report,
        })
    }

    fn solve(
        &self,
        stage: &StageSpec,
        catalog: &CoverageCatalog,
        state: &RosterState,
        totals: &RunningTotals,
    ) -> Result<Solved, SchedError> {
        let builder = ConstraintBuilder {
            calendar: &self.calendar,
            people: &self.people,
            stage,
            catalog,
            state,
            totals,
            options: &self.options,
        };
        let params = SolveParams {
            time_budget: self.options.time_budget,
            relative_gap: self.options.relative_gap,
            node_limit: self.options.node_limit,
        };
        let strict = builder.build(BuildMode::Strict, &Waivers::new())?;
        let outcome = self.engine.solve(&strict.model, &params);
        let mut solved = match &outcome.solution {
            Some(solution) => Solved {
                assignments: strict.decode(solution),
                status: Some(outcome.status),
                objective: Some(solution.objective()),
                ..Solved::default()
            },
            None => {
                warn!(
                    stage = %stage.name,
                    status = ?outcome.status,
                    "strict model has no solution, diagnosing"
                );
                let reporter = GapReporter::new(&builder, &self.engine, params);
                match reporter.triage(outcome.status)? {
                    Triage::CapacityGaps { gaps, assignments } => Solved {
                        assignments,
                        gaps,
                        status: Some(outcome.status),
                        ..Solved::default()
                    },
                    Triage::Hard(report) => {
                        return Err(SchedError::HardInfeasibility(Box::new(report)))
                    }
                }
            }
        };
        if stage.category()? == ShiftCategory::Night {
            self.settle_singles(&builder, &params, &mut solved)?;
        }
        Ok(solved)
    }

    /// Nuits isolées : nouvelle résolution qui les interdit, à trous égaux. Elles ne
    /// deviennent des exceptions que si cette résolution est prouvée infaisable.
    fn settle_singles(
        &self,
        builder: &ConstraintBuilder<'_>,
        params: &SolveParams,
        solved: &mut Solved,
    ) -> Result<(), SchedError> {
        let singles = single_nights(builder.state, &solved.assignments);
        if singles.is_empty() {
            return Ok(());
        }
        let stage = &builder.stage.name;
        let waived = gaps::waivers(builder.state, &solved.gaps);
        let strict = builder.build_without_singletons(&waived)?;
        let outcome = self.engine.solve(&strict.model, params);
        match (&outcome.solution, outcome.status) {
            (Some(solution), status) => {
                info!(%stage, singles = singles.len(), "single nights avoided by re-solving");
                solved.assignments = strict.decode(solution);
                solved.status = Some(status);
                solved.objective = Some(solution.objective());
            }
            (None, SolveStatus::Infeasible) => {
                solved.exceptions = singles
                    .into_iter()
                    .map(|single| single.exception(stage, "forced by coverage"))
                    .collect();
            }
            (None, status) => warn!(
                %stage,
                ?status,
                singles = singles.len(),
                "single nights kept, re-solve found no alternative in time"
            ),
        }
        Ok(())
    }

    fn check_snapshot(&self, state: &RosterState) -> Result<(), SchedError> {
        let same_people = state.people().len() == self.people.len()
            && state
                .people()
                .iter()
                .zip(&self.people)
                .all(|(id, p)| *id == p.id);
        if !same_people || state.dates() != self.calendar.dates().as_slice() {
            return Err(ValidationError::Config(
                "snapshot does not match the configured people and horizon".into(),
            )
            .into());
        }
        Ok(())
    }
}

/// Nuit isolée créée par une étape.
struct SingleNight {
    person: PersonId,
    date: NaiveDate,
}

impl SingleNight {
    fn exception(self, stage: &str, cause: &str) -> BlockException {
        BlockException {
            person: self.person,
            start: self.date,
            end: self.date,
            reason: format!("single night {cause} in stage {stage}"),
        }
    }
}

/// Blocs d'une seule nuit touchés par `assignments` et non encore couverts par une exception.
fn single_nights(state: &RosterState, assignments: &[Assignment]) -> Vec<SingleNight> {
    let mut trial = state.clone();
    for a in assignments {
        trial.set(a.day, a.person, a.kind);
    }
    let evaluator = RestPeriodEvaluator::new(&trial);
    let dates = trial.dates();
    let mut out = Vec::new();
    for (idx, person) in trial.people().iter().enumerate() {
        for (start, end) in evaluator.blocks(idx) {
            let touched = assignments
                .iter()
                .any(|a| a.person == idx && a.day == start);
            if start != end || !touched || trial.has_exception(person, dates[start], dates[end]) {
                continue;
            }
            out.push(SingleNight {
                person: person.clone(),
                date: dates[start],
            });
        }
    }
    out
}
