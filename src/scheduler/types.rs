use super::gaps::InfeasibilityReport;
use crate::config::DayFilter;
use crate::model::{Grade, LeavePeriod, Person, PersonId, ShiftCategory, ShiftKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Poids de la fonction objectif (minimisée ; les bonus sont négatifs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    pub singleton_penalty: i64,
    pub fairness_max: i64,
    pub fairness_min: i64,
    pub weekend_fri_sun: i64,
    pub weekend_thu_sun: i64,
    pub spacing_cap: i64,
    pub spacing_step: i64,
    pub elastic_slack: i64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            singleton_penalty: 10_000,
            fairness_max: 4,
            fairness_min: 1,
            weekend_fri_sun: 25,
            weekend_thu_sun: 10,
            spacing_cap: 10,
            spacing_step: 1,
            elastic_slack: 1_000_000,
        }
    }
}

/// Options de résolution d'une étape
#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    pub time_budget: Duration,
    pub relative_gap: f64,
    pub node_limit: Option<u64>,
    /// Écart max (en unités de charge) entre la charge la plus haute et la plus basse.
    pub fairness_tolerance: Option<i64>,
    pub weights: ObjectiveWeights,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(30),
            relative_gap: 0.0,
            node_limit: None,
            fairness_tolerance: None,
            weights: ObjectiveWeights::default(),
        }
    }
}

/// Stratégie d'une étape : solveur ou heuristique gloutonne.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStrategy {
    #[default]
    ConstraintSolve,
    GreedyAssign,
}

/// Filtre des personnes éligibles à une étape (en plus du grade exigé par le shift).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Eligibility {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grades: Vec<Grade>,
    #[serde(default)]
    pub high_intensity_only: bool,
}

impl Eligibility {
    pub fn admits(&self, person: &Person) -> bool {
        if !self.grades.is_empty() && !self.grades.contains(&person.grade) {
            return false;
        }
        !self.high_intensity_only || person.high_intensity_eligible
    }
}

/// Description d'une étape du pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub kinds: Vec<ShiftKind>,
    #[serde(default)]
    pub days: DayFilter,
    #[serde(default)]
    pub eligibility: Eligibility,
    #[serde(default)]
    pub strategy: StageStrategy,
}

impl StageSpec {
    pub fn new<N: Into<String>>(name: N, kinds: Vec<ShiftKind>) -> Self {
        Self {
            name: name.into(),
            kinds,
            days: DayFilter::All,
            eligibility: Eligibility::default(),
            strategy: StageStrategy::ConstraintSolve,
        }
    }

    pub fn on_days(mut self, days: DayFilter) -> Self {
        self.days = days;
        self
    }

    pub fn with_eligibility(mut self, eligibility: Eligibility) -> Self {
        self.eligibility = eligibility;
        self
    }

    pub fn with_strategy(mut self, strategy: StageStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Catégorie commune des shifts de l'étape.
    pub fn category(&self) -> Result<ShiftCategory, ValidationError> {
        let first = self.kinds.first().ok_or_else(|| ValidationError::Stage {
            stage: self.name.clone(),
            reason: "stage must list at least one shift kind".into(),
        })?;
        let category = first.category();
        if category == ShiftCategory::Rest {
            return Err(ValidationError::Stage {
                stage: self.name.clone(),
                reason: format!("{first} is not an assignable shift"),
            });
        }
        if let Some(other) = self.kinds.iter().find(|k| k.category() != category) {
            return Err(ValidationError::Stage {
                stage: self.name.clone(),
                reason: format!("{other} mixes shift categories with {first}"),
            });
        }
        Ok(category)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Stage {
                stage: self.name.clone(),
                reason: "stage name cannot be empty".into(),
            });
        }
        self.category().map(|_| ())
    }

    pub fn admits(&self, person: &Person) -> bool {
        self.eligibility.admits(person) && self.kinds.iter().any(|k| person.qualifies_for(*k))
    }
}

/// Étapes par défaut : nuits haute intensité, nuits, longues journées de week-end,
/// journées haute intensité, longues journées de semaine, journées courtes.
pub fn default_stages() -> Vec<StageSpec> {
    vec![
        StageSpec::new("high_intensity_nights", vec![ShiftKind::HighIntensityNight])
            .on_days(DayFilter::HighIntensity)
            .with_eligibility(Eligibility {
                grades: vec![Grade::Registrar],
                high_intensity_only: true,
            }),
        StageSpec::new(
            "nights",
            vec![ShiftKind::NightRegistrar, ShiftKind::NightSho],
        ),
        StageSpec::new(
            "weekend_long_days",
            vec![ShiftKind::LongDayRegistrar, ShiftKind::LongDaySho],
        )
        .on_days(DayFilter::WeekendsAndHolidays),
        StageSpec::new("high_intensity_days", vec![ShiftKind::HighIntensityDay])
            .on_days(DayFilter::HighIntensity)
            .with_eligibility(Eligibility {
                grades: vec![Grade::Registrar],
                high_intensity_only: true,
            }),
        StageSpec::new(
            "weekday_long_days",
            vec![ShiftKind::LongDayRegistrar, ShiftKind::LongDaySho],
        )
        .on_days(DayFilter::Weekdays),
        StageSpec::new("short_days", vec![ShiftKind::ShortDay, ShiftKind::Training])
            .on_days(DayFilter::Weekdays)
            .with_strategy(StageStrategy::GreedyAssign),
    ]
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("wte for {person} must be in (0, 1], got {wte}")]
    WteOutOfRange { person: PersonId, wte: f64 },
    #[error("leave for {person} overlaps: {first:?} and {second:?}")]
    OverlappingLeave {
        person: PersonId,
        first: LeavePeriod,
        second: LeavePeriod,
    },
    #[error("leave end {end} is before start {start}")]
    InvertedLeave { start: NaiveDate, end: NaiveDate },
    #[error("duplicate person id: {0}")]
    DuplicatePerson(PersonId),
    #[error("person {0} has an empty name")]
    EmptyName(PersonId),
    #[error("unknown person: {0}")]
    UnknownPerson(PersonId),
    #[error("unknown grade: {0}")]
    UnknownGrade(String),
    #[error("unknown shift code: {0}")]
    UnknownShiftCode(String),
    #[error("roster horizon is empty: {start} .. {end}")]
    EmptyHorizon { start: NaiveDate, end: NaiveDate },
    #[error("{0} is outside the roster horizon")]
    OutsideHorizon(NaiveDate),
    #[error("{person} cannot take leave on {date}: already committed to {kind}")]
    LeaveOnCommittedDay {
        person: PersonId,
        date: NaiveDate,
        kind: ShiftKind,
    },
    #[error("stage {stage}: {reason}")]
    Stage { stage: String, reason: String },
    #[error("invalid config: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum SchedError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    HardInfeasibility(Box<InfeasibilityReport>),
    #[error("cannot overwrite {date} for {person}: already {kind}")]
    Overwrite {
        person: PersonId,
        date: NaiveDate,
        kind: ShiftKind,
    },
    #[error("unknown stage: {0}")]
    UnknownStage(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
