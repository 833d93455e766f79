use crate::model::{Calendar, Day, ShiftKind};
use crate::scheduler::{default_stages, SolveOptions, StageSpec, ValidationError};
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Filtre de jours, partagé par les règles de couverture et les étapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayFilter {
    #[default]
    All,
    /// Lundi–vendredi hors jours fériés.
    Weekdays,
    WeekendsAndHolidays,
    HighIntensity,
    OutsideHighIntensity,
}

impl DayFilter {
    pub fn matches(self, day: &Day) -> bool {
        match self {
            DayFilter::All => true,
            DayFilter::Weekdays => !day.weekend_or_holiday(),
            DayFilter::WeekendsAndHolidays => day.weekend_or_holiday(),
            DayFilter::HighIntensity => day.high_intensity,
            DayFilter::OutsideHighIntensity => !day.high_intensity,
        }
    }
}

/// Besoin de couverture : `count` personnes sur `kind` chaque jour retenu par `days`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRule {
    pub kind: ShiftKind,
    pub count: u32,
    #[serde(default)]
    pub days: DayFilter,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rules {
    /// Écart maximal max−min des charges pondérées WTE.
    #[serde(default)]
    pub fairness_tolerance: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,
    #[serde(default)]
    pub relative_gap: f64,
    #[serde(default)]
    pub node_limit: Option<u64>,
}

fn default_time_budget_secs() -> u64 {
    30
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            time_budget_secs: default_time_budget_secs(),
            relative_gap: 0.0,
            node_limit: None,
        }
    }
}

/// Description complète d'un rota à générer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotaConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub bank_holidays: Vec<NaiveDate>,
    /// Lundis des semaines à haute intensité.
    #[serde(default)]
    pub high_intensity_weeks: Vec<NaiveDate>,
    #[serde(default)]
    pub coverage: Vec<CoverageRule>,
    #[serde(default)]
    pub rules: Option<Rules>,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub stages: Option<Vec<StageSpec>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl RotaConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::Config("rota id cannot be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::Config("rota name cannot be empty".into()));
        }
        if self.end_date < self.start_date {
            return Err(ValidationError::EmptyHorizon {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if let Some(monday) = self
            .high_intensity_weeks
            .iter()
            .find(|d| d.weekday() != Weekday::Mon)
        {
            return Err(ValidationError::Config(format!(
                "high intensity week {monday} does not start on a Monday"
            )));
        }
        for rule in &self.coverage {
            if !rule.kind.is_working() {
                return Err(ValidationError::Config(format!(
                    "coverage cannot require {}",
                    rule.kind
                )));
            }
        }
        if let Some(tol) = self.rules.as_ref().and_then(|r| r.fairness_tolerance) {
            if tol < 0 {
                return Err(ValidationError::Config("fairness_tolerance must be >= 0".into()));
            }
        }
        if !(0.0..1.0).contains(&self.solver.relative_gap) {
            return Err(ValidationError::Config("relative_gap must be in [0, 1)".into()));
        }
        for stage in self.stages() {
            stage.validate()?;
        }
        Ok(())
    }

    pub fn calendar(&self) -> Result<Calendar, ValidationError> {
        Calendar::new(
            self.start_date,
            self.end_date,
            &self.bank_holidays,
            &self.high_intensity_weeks,
        )
    }

    /// Étapes configurées, sinon l'ordre par défaut.
    pub fn stages(&self) -> Vec<StageSpec> {
        self.stages.clone().unwrap_or_else(default_stages)
    }

    pub fn solve_options(&self) -> SolveOptions {
        SolveOptions {
            time_budget: Duration::from_secs(self.solver.time_budget_secs),
            relative_gap: self.solver.relative_gap,
            node_limit: self.solver.node_limit,
            fairness_tolerance: self.rules.as_ref().and_then(|r| r.fairness_tolerance),
            ..SolveOptions::default()
        }
    }
}

/// Créneau à couvrir : (jour, type de shift) et effectif requis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSlot {
    pub day: usize,
    pub kind: ShiftKind,
    pub required: u32,
}

/// Besoins de couverture d'une étape, triés par jour puis par ordre des kinds de l'étape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageCatalog {
    slots: Vec<CoverageSlot>,
}

impl CoverageCatalog {
    pub fn for_stage(rules: &[CoverageRule], calendar: &Calendar, stage: &StageSpec) -> Self {
        let mut slots = Vec::new();
        for (idx, day) in calendar.days().iter().enumerate() {
            if !stage.days.matches(day) {
                continue;
            }
            for kind in &stage.kinds {
                let required: u32 = rules
                    .iter()
                    .filter(|r| r.kind == *kind && r.days.matches(day))
                    .map(|r| r.count)
                    .sum();
                if required > 0 {
                    slots.push(CoverageSlot {
                        day: idx,
                        kind: *kind,
                        required,
                    });
                }
            }
        }
        Self { slots }
    }

    pub fn from_slots(mut slots: Vec<CoverageSlot>) -> Self {
        slots.retain(|s| s.required > 0);
        slots.sort_by_key(|s| (s.day, s.kind));
        Self { slots }
    }

    pub fn slots(&self) -> &[CoverageSlot] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn required(&self, day: usize, kind: ShiftKind) -> u32 {
        self.slots
            .iter()
            .find(|s| s.day == day && s.kind == kind)
            .map_or(0, |s| s.required)
    }

    pub fn total_required(&self) -> u32 {
        self.slots.iter().map(|s| s.required).sum()
    }
}

pub fn export_config_json<P: AsRef<Path>>(path: P, config: &RotaConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&path, json)
        .with_context(|| format!("writing config {}", path.as_ref().display()))?;
    Ok(())
}

pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> Result<RotaConfig> {
    let data = fs::read(&path)
        .with_context(|| format!("reading config {}", path.as_ref().display()))?;
    let config: RotaConfig = serde_json::from_slice(&data)
        .with_context(|| format!("parsing config {}", path.as_ref().display()))?;
    config.validate()?;
    Ok(config)
}
