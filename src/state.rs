//! Instantanés immuables du rota et compteurs cumulés.

use crate::fairness::FairnessScorer;
use crate::model::{Calendar, LeavePeriod, Person, PersonId, ShiftCategory, ShiftKind};
use crate::rest::RestDenial;
use crate::scheduler::{SchedError, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Affectation proposée par une étape (indices jour / personne du rota).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assignment {
    pub day: usize,
    pub person: usize,
    pub kind: ShiftKind,
}

/// Raison pour laquelle une personne n'a pas pu couvrir un créneau.
/// L'ordre des variantes est l'ordre de classement des exclusions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "code")]
pub enum ExclusionReason {
    NotEligible,
    BeforeStart,
    OnLeave,
    FixedDayOff,
    AlreadyCommitted { kind: ShiftKind },
    Rest { denial: RestDenial },
    CapacityLimit,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::NotEligible => f.write_str("not eligible"),
            ExclusionReason::BeforeStart => f.write_str("before start date"),
            ExclusionReason::OnLeave => f.write_str("on leave"),
            ExclusionReason::FixedDayOff => f.write_str("fixed day off"),
            ExclusionReason::AlreadyCommitted { kind } => write!(f, "already on {kind}"),
            ExclusionReason::Rest { denial } => write!(f, "rest rule: {denial}"),
            ExclusionReason::CapacityLimit => f.write_str("capacity limit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub person: PersonId,
    pub reason: ExclusionReason,
}

/// Créneau non couvert, à remplir par un locum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityGap {
    pub date: NaiveDate,
    pub kind: ShiftKind,
    pub shortfall: u32,
    pub stage: String,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
}

impl CapacityGap {
    /// Marqueur de la grille pour ce créneau.
    pub fn marker(&self) -> ShiftKind {
        ShiftKind::LocumGap
    }
}

/// Bloc de nuits hors règle (isolé ou trop long) accepté explicitement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockException {
    pub person: PersonId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub reason: String,
}

/// Grille complète (jour × personne), versionnée.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterState {
    version: u64,
    dates: Vec<NaiveDate>,
    people: Vec<PersonId>,
    /// Rangée par jour : `cells[day * people.len() + person]`.
    cells: Vec<ShiftKind>,
    #[serde(default)]
    gaps: Vec<CapacityGap>,
    #[serde(default)]
    exceptions: Vec<BlockException>,
    #[serde(default)]
    stages: Vec<String>,
}

impl RosterState {
    /// État initial : congés posés, tout le reste à `Off`.
    pub fn new(calendar: &Calendar, people: &[Person]) -> Self {
        let dates = calendar.dates();
        let mut cells = Vec::with_capacity(dates.len() * people.len());
        for date in &dates {
            for person in people {
                cells.push(if person.on_leave(*date) {
                    ShiftKind::Leave
                } else {
                    ShiftKind::Off
                });
            }
        }
        Self {
            version: 0,
            dates,
            people: people.iter().map(|p| p.id.clone()).collect(),
            cells,
            gaps: Vec::new(),
            exceptions: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn people(&self) -> &[PersonId] {
        &self.people
    }

    pub fn num_days(&self) -> usize {
        self.dates.len()
    }

    pub fn gaps(&self) -> &[CapacityGap] {
        &self.gaps
    }

    pub fn exceptions(&self) -> &[BlockException] {
        &self.exceptions
    }

    /// Noms des étapes déjà validées, dans l'ordre.
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    pub fn person_index(&self, id: &PersonId) -> Option<usize> {
        self.people.iter().position(|p| p == id)
    }

    pub fn day_index(&self, date: NaiveDate) -> Option<usize> {
        self.dates.iter().position(|d| *d == date)
    }

    pub fn get(&self, day: usize, person: usize) -> ShiftKind {
        self.cells[day * self.people.len() + person]
    }

    pub fn kind_at(&self, person: &PersonId, date: NaiveDate) -> Option<ShiftKind> {
        let p = self.person_index(person)?;
        let d = self.day_index(date)?;
        Some(self.get(d, p))
    }

    /// Ligne temporelle d'une personne.
    pub fn timeline(&self, person: usize) -> Vec<ShiftKind> {
        (0..self.num_days()).map(|d| self.get(d, person)).collect()
    }

    pub fn count(&self, person: usize, category: ShiftCategory) -> u32 {
        (0..self.num_days())
            .filter(|d| self.get(*d, person).category() == category)
            .count() as u32
    }

    /// Un trou de couverture de nuit existe-t-il strictement entre deux dates ?
    pub fn night_gap_between(&self, after: NaiveDate, before: NaiveDate) -> bool {
        self.gaps
            .iter()
            .any(|g| g.kind.is_night() && after < g.date && g.date < before)
    }

    pub fn has_exception(&self, person: &PersonId, start: NaiveDate, end: NaiveDate) -> bool {
        self.exceptions
            .iter()
            .any(|e| &e.person == person && e.start <= start && end <= e.end)
    }

    /// Nouvel instantané avec les affectations d'une étape. Seules les cases `Off` sont écrites.
    pub fn commit(
        &self,
        stage: &str,
        assignments: &[Assignment],
        gaps: Vec<CapacityGap>,
        exceptions: Vec<BlockException>,
    ) -> Result<RosterState, SchedError> {
        let mut next = self.clone();
        for a in assignments {
            if a.day >= next.num_days() || a.person >= next.people.len() {
                return Err(anyhow::anyhow!("assignment out of range: {a:?}").into());
            }
            let current = next.get(a.day, a.person);
            if current != ShiftKind::Off {
                return Err(SchedError::Overwrite {
                    person: next.people[a.person].clone(),
                    date: next.dates[a.day],
                    kind: current,
                });
            }
            next.set(a.day, a.person, a.kind);
        }
        next.gaps.extend(gaps);
        next.exceptions.extend(exceptions);
        next.stages.push(stage.to_string());
        next.version += 1;
        Ok(next)
    }

    /// Ajoute un congé ; refuse s'il tombe sur un jour déjà engagé.
    pub fn record_leave(
        &self,
        person: &PersonId,
        period: LeavePeriod,
    ) -> Result<RosterState, SchedError> {
        let p = self
            .person_index(person)
            .ok_or_else(|| ValidationError::UnknownPerson(person.clone()))?;
        let mut next = self.clone();
        for d in 0..self.num_days() {
            let date = self.dates[d];
            if !period.contains(date) {
                continue;
            }
            let current = self.get(d, p);
            if current.is_working() {
                return Err(ValidationError::LeaveOnCommittedDay {
                    person: person.clone(),
                    date,
                    kind: current,
                }
                .into());
            }
            next.set(d, p, ShiftKind::Leave);
        }
        next.version += 1;
        Ok(next)
    }

    /// Écriture brute, réservée aux états de travail internes (glouton, diagnostic).
    pub(crate) fn set(&mut self, day: usize, person: usize, kind: ShiftKind) {
        let width = self.people.len();
        self.cells[day * width + person] = kind;
    }
}

/// Compteurs par personne (ordre du rota).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub nights: u32,
    pub days: u32,
}

impl CategoryCounts {
    pub fn get(&self, category: ShiftCategory) -> u32 {
        match category {
            ShiftCategory::Night => self.nights,
            ShiftCategory::Day => self.days,
            ShiftCategory::Rest => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningTotals {
    counts: Vec<CategoryCounts>,
}

impl RunningTotals {
    pub fn new(people: usize) -> Self {
        Self {
            counts: vec![CategoryCounts::default(); people],
        }
    }

    /// Recalcule depuis un état (ex. instantané rechargé).
    pub fn from_state(state: &RosterState) -> Self {
        let counts = (0..state.people().len())
            .map(|p| CategoryCounts {
                nights: state.count(p, ShiftCategory::Night),
                days: state.count(p, ShiftCategory::Day),
            })
            .collect();
        Self { counts }
    }

    pub fn count(&self, person: usize, category: ShiftCategory) -> u32 {
        self.counts.get(person).map_or(0, |c| c.get(category))
    }

    pub fn counts(&self) -> &[CategoryCounts] {
        &self.counts
    }

    /// Charge pondérée WTE.
    pub fn load(&self, person: usize, wte: f64, category: ShiftCategory) -> i64 {
        FairnessScorer::load(wte, self.count(person, category), 0)
    }

    /// Compteurs après validation d'une étape ; ne décroît jamais.
    pub fn after_commit(&self, assignments: &[Assignment]) -> Self {
        let mut next = self.clone();
        for a in assignments {
            if next.counts.len() <= a.person {
                next.counts.resize(a.person + 1, CategoryCounts::default());
            }
            let entry = &mut next.counts[a.person];
            match a.kind.category() {
                ShiftCategory::Night => entry.nights += 1,
                ShiftCategory::Day => entry.days += 1,
                ShiftCategory::Rest => {}
            }
        }
        next
    }
}
