use crate::scheduler::ValidationError;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifiant fort pour Person
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonId(String);

impl PersonId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Grade du praticien
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    Registrar,
    #[serde(rename = "SHO")]
    Sho,
    Supernumerary,
}

impl FromStr for Grade {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registrar" | "reg" => Ok(Grade::Registrar),
            "sho" => Ok(Grade::Sho),
            "supernumerary" | "supernum" => Ok(Grade::Supernumerary),
            other => Err(ValidationError::UnknownGrade(other.to_string())),
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Grade::Registrar => "Registrar",
            Grade::Sho => "SHO",
            Grade::Supernumerary => "Supernumerary",
        })
    }
}

/// Période de congés, bornes incluses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl LeavePeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::InvertedLeave { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    fn overlaps(&self, other: &LeavePeriod) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Praticien inscrit au rota
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    pub grade: Grade,
    pub wte: f64,
    #[serde(default)]
    pub high_intensity_eligible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_day_off: Option<Weekday>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leave: Vec<LeavePeriod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
}

impl Person {
    pub fn new<N: Into<String>>(name: N, grade: Grade, wte: f64) -> Self {
        Self {
            id: PersonId::random(),
            name: name.into(),
            grade,
            wte,
            high_intensity_eligible: false,
            fixed_day_off: None,
            leave: Vec::new(),
            start_date: None,
        }
    }

    pub fn with_id<S: AsRef<str>>(mut self, id: S) -> Self {
        self.id = PersonId::new(id);
        self
    }

    pub fn on_leave(&self, day: NaiveDate) -> bool {
        self.leave.iter().any(|l| l.contains(day))
    }

    pub fn started_by(&self, day: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| start <= day)
    }

    pub fn has_fixed_day_off(&self, day: NaiveDate) -> bool {
        self.fixed_day_off == Some(day.weekday())
    }

    /// Vérifie grade et habilitations pour un type de shift.
    pub fn qualifies_for(&self, kind: ShiftKind) -> bool {
        if self.grade == Grade::Supernumerary {
            return matches!(kind, ShiftKind::ShortDay | ShiftKind::Training);
        }
        if kind.needs_high_intensity() && !self.high_intensity_eligible {
            return false;
        }
        kind.required_grade().map_or(true, |g| g == self.grade)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName(self.id.clone()));
        }
        if !self.wte.is_finite() || self.wte <= 0.0 || self.wte > 1.0 {
            return Err(ValidationError::WteOutOfRange {
                person: self.id.clone(),
                wte: self.wte,
            });
        }
        for (idx, a) in self.leave.iter().enumerate() {
            if a.end < a.start {
                return Err(ValidationError::InvertedLeave {
                    start: a.start,
                    end: a.end,
                });
            }
            if let Some(b) = self.leave.iter().skip(idx + 1).find(|b| a.overlaps(b)) {
                return Err(ValidationError::OverlappingLeave {
                    person: self.id.clone(),
                    first: *a,
                    second: *b,
                });
            }
        }
        Ok(())
    }
}

/// Valide une liste complète (ids uniques + règles individuelles).
pub fn validate_people(people: &[Person]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for person in people {
        person.validate()?;
        if !seen.insert(&person.id) {
            return Err(ValidationError::DuplicatePerson(person.id.clone()));
        }
    }
    Ok(())
}

/// Catégorie utilisée par les règles de repos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShiftCategory {
    Night,
    Day,
    Rest,
}

impl fmt::Display for ShiftCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShiftCategory::Night => "night",
            ShiftCategory::Day => "day",
            ShiftCategory::Rest => "rest",
        })
    }
}

/// Types de shift (ensemble fermé)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShiftKind {
    #[serde(rename = "HIN")]
    HighIntensityNight,
    #[serde(rename = "HID")]
    HighIntensityDay,
    #[serde(rename = "N_REG")]
    NightRegistrar,
    #[serde(rename = "N_SHO")]
    NightSho,
    #[serde(rename = "LD_REG")]
    LongDayRegistrar,
    #[serde(rename = "LD_SHO")]
    LongDaySho,
    #[serde(rename = "SD")]
    ShortDay,
    #[serde(rename = "TRN")]
    Training,
    #[serde(rename = "LEAVE")]
    Leave,
    #[serde(rename = "OFF")]
    Off,
    #[serde(rename = "LOC")]
    LocumGap,
}

impl ShiftKind {
    pub const ALL: [ShiftKind; 11] = [
        ShiftKind::HighIntensityNight,
        ShiftKind::HighIntensityDay,
        ShiftKind::NightRegistrar,
        ShiftKind::NightSho,
        ShiftKind::LongDayRegistrar,
        ShiftKind::LongDaySho,
        ShiftKind::ShortDay,
        ShiftKind::Training,
        ShiftKind::Leave,
        ShiftKind::Off,
        ShiftKind::LocumGap,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ShiftKind::HighIntensityNight => "HIN",
            ShiftKind::HighIntensityDay => "HID",
            ShiftKind::NightRegistrar => "N_REG",
            ShiftKind::NightSho => "N_SHO",
            ShiftKind::LongDayRegistrar => "LD_REG",
            ShiftKind::LongDaySho => "LD_SHO",
            ShiftKind::ShortDay => "SD",
            ShiftKind::Training => "TRN",
            ShiftKind::Leave => "LEAVE",
            ShiftKind::Off => "OFF",
            ShiftKind::LocumGap => "LOC",
        }
    }

    pub fn category(self) -> ShiftCategory {
        match self {
            ShiftKind::HighIntensityNight | ShiftKind::NightRegistrar | ShiftKind::NightSho => {
                ShiftCategory::Night
            }
            ShiftKind::HighIntensityDay
            | ShiftKind::LongDayRegistrar
            | ShiftKind::LongDaySho
            | ShiftKind::ShortDay
            | ShiftKind::Training => ShiftCategory::Day,
            ShiftKind::Leave | ShiftKind::Off | ShiftKind::LocumGap => ShiftCategory::Rest,
        }
    }

    pub fn is_night(self) -> bool {
        self.category() == ShiftCategory::Night
    }

    pub fn is_working(self) -> bool {
        self.category() != ShiftCategory::Rest
    }

    /// Durée nominale en heures (0 hors travail).
    pub fn hours(self) -> u32 {
        match self {
            ShiftKind::LongDayRegistrar
            | ShiftKind::LongDaySho
            | ShiftKind::NightRegistrar
            | ShiftKind::NightSho => 13,
            ShiftKind::HighIntensityNight | ShiftKind::HighIntensityDay => 12,
            ShiftKind::ShortDay | ShiftKind::Training => 9,
            ShiftKind::Leave | ShiftKind::Off | ShiftKind::LocumGap => 0,
        }
    }

    /// Shift de plus de 10 heures.
    pub fn is_long(self) -> bool {
        self.hours() > 10
    }

    pub fn required_grade(self) -> Option<Grade> {
        match self {
            ShiftKind::HighIntensityNight
            | ShiftKind::HighIntensityDay
            | ShiftKind::NightRegistrar
            | ShiftKind::LongDayRegistrar => Some(Grade::Registrar),
            ShiftKind::NightSho | ShiftKind::LongDaySho => Some(Grade::Sho),
            _ => None,
        }
    }

    pub fn needs_high_intensity(self) -> bool {
        matches!(
            self,
            ShiftKind::HighIntensityNight | ShiftKind::HighIntensityDay
        )
    }
}

impl fmt::Display for ShiftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ShiftKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        ShiftKind::ALL
            .iter()
            .copied()
            .find(|k| k.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| ValidationError::UnknownShiftCode(code.to_string()))
    }
}

/// Jour du calendrier avec ses attributs dérivés.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Day {
    pub date: NaiveDate,
    pub weekend: bool,
    pub holiday: bool,
    pub high_intensity: bool,
}

impl Day {
    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    pub fn weekend_or_holiday(&self) -> bool {
        self.weekend || self.holiday
    }
}

/// Horizon du rota : liste ordonnée de jours, calculée une fois.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    days: Vec<Day>,
}

impl Calendar {
    /// `high_intensity_weeks` : lundi de chaque semaine à haute intensité.
    pub fn new(
        start: NaiveDate,
        end: NaiveDate,
        holidays: &[NaiveDate],
        high_intensity_weeks: &[NaiveDate],
    ) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::EmptyHorizon { start, end });
        }
        let mut days = Vec::new();
        let mut current = start;
        while current <= end {
            let weekend = matches!(current.weekday(), Weekday::Sat | Weekday::Sun);
            let high_intensity = high_intensity_weeks
                .iter()
                .any(|monday| *monday <= current && current < *monday + Duration::days(7));
            days.push(Day {
                date: current,
                weekend,
                holiday: holidays.contains(&current),
                high_intensity,
            });
            current = current
                .succ_opt()
                .ok_or(ValidationError::EmptyHorizon { start, end })?;
        }
        Ok(Self { days })
    }

    pub fn days(&self) -> &[Day] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn day(&self, idx: usize) -> &Day {
        &self.days[idx]
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.days.iter().map(|d| d.date).collect()
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let first = self.days.first()?.date;
        let offset = usize::try_from((date - first).num_days()).ok()?;
        (offset < self.days.len()).then_some(offset)
    }
}
