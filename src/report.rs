//! Synthèse par personne : volumes, charges pondérées, heures, week-ends et violations.

use crate::fairness::FairnessScorer;
use crate::model::{Calendar, Grade, Person, PersonId, ShiftCategory};
use crate::scheduler::{audit, Violation};
use crate::state::RosterState;
use serde::{Deserialize, Serialize};

/// Moyenne hebdomadaire attendue pour un temps plein, en heures ; proratisée au WTE.
pub const WEEKLY_HOURS_BAND: (f64, f64) = (42.0, 47.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonReport {
    pub id: PersonId,
    pub name: String,
    pub grade: Grade,
    pub wte: f64,
    pub nights: u32,
    pub days: u32,
    pub night_load: i64,
    pub day_load: i64,
    /// Jours de week-end ou fériés travaillés.
    pub weekend_days: u32,
    pub hours: u32,
    /// Heures ramenées à 7 jours sur l'horizon.
    pub weekly_hours: f64,
}

impl PersonReport {
    /// Moyenne hebdomadaire dans la bande 42–47 h proratisée au WTE.
    pub fn within_weekly_band(&self) -> bool {
        let (low, high) = WEEKLY_HOURS_BAND;
        (low * self.wte..=high * self.wte).contains(&self.weekly_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterReport {
    pub people: Vec<PersonReport>,
    pub night_spread: i64,
    pub day_spread: i64,
    pub gaps: usize,
    pub uncovered_shifts: u32,
    pub exceptions: usize,
    pub violations: Vec<Violation>,
}

impl RosterReport {
    pub fn build(calendar: &Calendar, people: &[Person], state: &RosterState) -> Self {
        let mut rows = Vec::with_capacity(people.len());
        for person in people {
            let Some(idx) = state.person_index(&person.id) else {
                continue;
            };
            let nights = state.count(idx, ShiftCategory::Night);
            let days = state.count(idx, ShiftCategory::Day);
            let weekend_days = calendar
                .days()
                .iter()
                .filter_map(|day| state.day_index(day.date).map(|d| (day, d)))
                .filter(|(day, d)| day.weekend_or_holiday() && state.get(*d, idx).is_working())
                .count() as u32;
            let hours: u32 = state.timeline(idx).iter().map(|k| k.hours()).sum();
            let weekly_hours = f64::from(hours) * 7.0 / state.num_days().max(1) as f64;
            rows.push(PersonReport {
                id: person.id.clone(),
                name: person.name.clone(),
                grade: person.grade,
                wte: person.wte,
                nights,
                days,
                night_load: FairnessScorer::load(person.wte, nights, 0),
                day_load: FairnessScorer::load(person.wte, days, 0),
                weekend_days,
                hours,
                weekly_hours,
            });
        }

        let night_loads: Vec<i64> = rows
            .iter()
            .filter(|r| r.grade != Grade::Supernumerary)
            .map(|r| r.night_load)
            .collect();
        let day_loads: Vec<i64> = rows.iter().map(|r| r.day_load).collect();
        Self {
            night_spread: FairnessScorer::spread(&night_loads),
            day_spread: FairnessScorer::spread(&day_loads),
            gaps: state.gaps().len(),
            uncovered_shifts: state.gaps().iter().map(|g| g.shortfall).sum(),
            exceptions: state.exceptions().len(),
            violations: audit(state),
            people: rows,
        }
    }
}
