//! Règles de repos, de blocs de nuits et de limites de travail.
//!
//! Un bloc est une suite maximale de nuits consécutives. L'écart entre deux
//! blocs d'une même personne se mesure `début suivant − fin précédente`.
//! Les limites de travail portent sur des fenêtres de jours : suites de shifts,
//! suites de shifts longs, heures sur 7 jours glissants, week-ends consécutifs.

use crate::model::{ShiftCategory, ShiftKind};
use crate::state::RosterState;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_BLOCK_NIGHTS: usize = 4;
pub const MIN_NIGHT_GAP_DAYS: usize = 7;
/// 46 h de repos après des nuits, arrondies à deux jours entiers.
pub const REST_DAYS_AFTER_NIGHTS: usize = 2;
pub const MAX_CONSECUTIVE_SHIFTS: usize = 7;
pub const MAX_CONSECUTIVE_LONG_SHIFTS: usize = 4;
/// 48 h libres après une suite maximale (shifts ou shifts longs).
pub const REST_DAYS_AFTER_RUN: usize = 2;
pub const MAX_HOURS_IN_SEVEN_DAYS: u32 = 72;
pub const HOURS_WINDOW_DAYS: usize = 7;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum RestDenial {
    #[error("needs 7 rest days after the block ending {previous_end}")]
    NightGapTooShort { previous_end: NaiveDate },
    #[error("next night block starts {next_start}, fewer than 7 days away")]
    UpcomingBlockTooClose { next_start: NaiveDate },
    #[error("block would reach {length} nights (max 4)")]
    BlockTooLong { length: usize },
    #[error("night on {last_night} leaves fewer than 2 free days")]
    RestAfterNights { last_night: NaiveDate },
    #[error("committed day shift on {date} follows the block too closely")]
    CommittedShiftTooSoon { date: NaiveDate },
    #[error("would make {length} consecutive working days (max 7)")]
    TooManyConsecutiveShifts { length: usize },
    #[error("would make {length} consecutive long shifts (max 4)")]
    TooManyConsecutiveLongShifts { length: usize },
    #[error("needs 2 free days after the run ending {run_end}")]
    RestAfterLongRun { run_end: NaiveDate },
    #[error("{hours} hours in the 7 days from {window_start} (max 72)")]
    WeeklyHoursExceeded { hours: u32, window_start: NaiveDate },
    #[error("already works the weekend of {other}")]
    ConsecutiveWeekends { other: NaiveDate },
}

/// Week-ends de l'horizon dans l'ordre, chacun avec ses jours (samedi, dimanche) présents.
/// Deux entrées voisines sont deux week-ends consécutifs.
pub fn weekends(dates: &[NaiveDate]) -> Vec<Vec<usize>> {
    let mut out: Vec<(NaiveDate, Vec<usize>)> = Vec::new();
    for (day, date) in dates.iter().enumerate() {
        let saturday = match date.weekday() {
            Weekday::Sat => *date,
            Weekday::Sun => date.pred_opt().unwrap_or(*date),
            _ => continue,
        };
        match out.last_mut() {
            Some((key, days)) if *key == saturday => days.push(day),
            _ => out.push((saturday, vec![day])),
        }
    }
    out.into_iter().map(|(_, days)| days).collect()
}

/// Suite maximale autour de `day` où `hit` est vrai (bornes incluses).
pub(crate) fn run_around(len: usize, day: usize, hit: impl Fn(usize) -> bool) -> (usize, usize) {
    let (mut start, mut end) = (day, day);
    while start > 0 && hit(start - 1) {
        start -= 1;
    }
    while end + 1 < len && hit(end + 1) {
        end += 1;
    }
    (start, end)
}

/// Évaluateur pur sur l'état validé ; ne modifie rien.
#[derive(Debug, Clone, Copy)]
pub struct RestPeriodEvaluator<'a> {
    state: &'a RosterState,
}

impl<'a> RestPeriodEvaluator<'a> {
    pub fn new(state: &'a RosterState) -> Self {
        Self { state }
    }

    pub fn is_night_category(kind: ShiftKind) -> bool {
        kind.category() == ShiftCategory::Night
    }

    fn night(&self, person: usize, day: usize) -> bool {
        Self::is_night_category(self.state.get(day, person))
    }

    /// Bornes (incluses) du bloc de nuits contenant `anchor`, s'il y en a un.
    pub fn find_block_boundaries(&self, person: usize, anchor: usize) -> Option<(usize, usize)> {
        if anchor >= self.state.num_days() || !self.night(person, anchor) {
            return None;
        }
        Some(self.extend_run(person, anchor))
    }

    fn extend_run(&self, person: usize, anchor: usize) -> (usize, usize) {
        run_around(self.state.num_days(), anchor, |d| self.night(person, d))
    }

    /// Dernière nuit validée strictement avant `day`.
    pub fn previous_night(&self, person: usize, day: usize) -> Option<usize> {
        (0..day).rev().find(|d| self.night(person, *d))
    }

    /// Première nuit validée strictement après `day`.
    pub fn next_night(&self, person: usize, day: usize) -> Option<usize> {
        (day + 1..self.state.num_days()).find(|d| self.night(person, *d))
    }

    /// Toutes les suites de nuits validées d'une personne.
    pub fn blocks(&self, person: usize) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        let mut day = 0;
        while day < self.state.num_days() {
            if self.night(person, day) {
                let (start, end) = self.extend_run(person, day);
                out.push((start, end));
                day = end + 1;
            } else {
                day += 1;
            }
        }
        out
    }

    /// Peut-on poser `kind` sur (personne, jour) compte tenu des shifts déjà validés ?
    pub fn can_assign(&self, person: usize, day: usize, kind: ShiftKind) -> Result<(), RestDenial> {
        match kind.category() {
            ShiftCategory::Rest => return Ok(()),
            ShiftCategory::Day => self.check_rest_after_nights(person, day)?,
            ShiftCategory::Night => self.check_night_block(person, day)?,
        }
        self.check_work_limits(person, day, kind)
    }

    fn check_rest_after_nights(&self, person: usize, day: usize) -> Result<(), RestDenial> {
        let window = day.saturating_sub(REST_DAYS_AFTER_NIGHTS)..day;
        match window.rev().find(|d| self.night(person, *d)) {
            Some(last) => Err(RestDenial::RestAfterNights {
                last_night: self.state.dates()[last],
            }),
            None => Ok(()),
        }
    }

    fn check_night_block(&self, person: usize, day: usize) -> Result<(), RestDenial> {
        let dates = self.state.dates();
        let (start, end) = self.extend_run(person, day);
        let length = end - start + 1;
        if length > MAX_BLOCK_NIGHTS {
            return Err(RestDenial::BlockTooLong { length });
        }
        if let Some(prev) = self.previous_night(person, start) {
            if start - prev < MIN_NIGHT_GAP_DAYS {
                return Err(RestDenial::NightGapTooShort {
                    previous_end: dates[prev],
                });
            }
        }
        if let Some(next) = self.next_night(person, end) {
            if next - end < MIN_NIGHT_GAP_DAYS {
                return Err(RestDenial::UpcomingBlockTooClose {
                    next_start: dates[next],
                });
            }
        }
        let last = (end + REST_DAYS_AFTER_NIGHTS).min(self.state.num_days() - 1);
        if let Some(d) = (end + 1..=last)
            .find(|d| self.state.get(*d, person).category() == ShiftCategory::Day)
        {
            return Err(RestDenial::CommittedShiftTooSoon { date: dates[d] });
        }
        Ok(())
    }

    /// Limites de travail sur les fenêtres qui contiennent `day`, avec `kind` posé ce jour-là.
    fn check_work_limits(
        &self,
        person: usize,
        day: usize,
        kind: ShiftKind,
    ) -> Result<(), RestDenial> {
        let n = self.state.num_days();
        let dates = self.state.dates();
        let at = |d: usize| if d == day { kind } else { self.state.get(d, person) };
        let works = |d: usize| at(d).is_working();
        let long = |d: usize| at(d).is_long();

        // suite pleine de `max` jours suivie d'un jour travaillé dans les 2 jours
        let run_limit = |max: usize, hit: &dyn Fn(usize) -> bool| -> Option<(usize, usize)> {
            let first = day.saturating_sub(max + REST_DAYS_AFTER_RUN - 1);
            for start in first..=day {
                let run_end = start + max;
                if run_end > n || !(start..run_end).all(hit) {
                    continue;
                }
                for next in run_end..(run_end + REST_DAYS_AFTER_RUN).min(n) {
                    let touches = (start..run_end).contains(&day) || next == day;
                    if touches && works(next) {
                        return Some((run_end - 1, next));
                    }
                }
            }
            None
        };

        if let Some((last, next)) = run_limit(MAX_CONSECUTIVE_SHIFTS, &works) {
            return Err(if next == last + 1 {
                let (start, end) = run_around(n, day, works);
                RestDenial::TooManyConsecutiveShifts {
                    length: end - start + 1,
                }
            } else {
                RestDenial::RestAfterLongRun {
                    run_end: dates[last],
                }
            });
        }
        if let Some((last, next)) = run_limit(MAX_CONSECUTIVE_LONG_SHIFTS, &long) {
            return Err(if next == last + 1 && long(next) {
                let (start, end) = run_around(n, day, long);
                RestDenial::TooManyConsecutiveLongShifts {
                    length: end - start + 1,
                }
            } else {
                RestDenial::RestAfterLongRun {
                    run_end: dates[last],
                }
            });
        }

        let first = day.saturating_sub(HOURS_WINDOW_DAYS - 1);
        for start in first..=day {
            if start + HOURS_WINDOW_DAYS > n {
                break;
            }
            let hours: u32 = (start..start + HOURS_WINDOW_DAYS).map(|d| at(d).hours()).sum();
            if hours > MAX_HOURS_IN_SEVEN_DAYS {
                return Err(RestDenial::WeeklyHoursExceeded {
                    hours,
                    window_start: dates[start],
                });
            }
        }

        let weekend_days = weekends(dates);
        if let Some(k) = weekend_days.iter().position(|w| w.contains(&day)) {
            let neighbours = [k.checked_sub(1), Some(k + 1)]
                .into_iter()
                .flatten()
                .filter_map(|i| weekend_days.get(i))
                .flatten()
                .copied();
            if let Some(other) = neighbours.filter(|d| works(*d)).min() {
                return Err(RestDenial::ConsecutiveWeekends {
                    other: dates[other],
                });
            }
        }
        Ok(())
    }
}
