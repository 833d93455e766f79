use crate::model::{PersonId, ShiftCategory};
use crate::rest::{
    run_around, weekends, RestPeriodEvaluator, HOURS_WINDOW_DAYS, MAX_BLOCK_NIGHTS,
    MAX_CONSECUTIVE_LONG_SHIFTS, MAX_CONSECUTIVE_SHIFTS, MAX_HOURS_IN_SEVEN_DAYS,
    MIN_NIGHT_GAP_DAYS, REST_DAYS_AFTER_NIGHTS, REST_DAYS_AFTER_RUN,
};
use crate::state::RosterState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum ViolationKind {
    BlockTooLong { length: usize },
    SingleNight,
    NightGapTooShort { gap: usize },
    RestAfterNights,
    TooManyConsecutiveShifts { length: usize },
    TooManyConsecutiveLongShifts { length: usize },
    RestAfterLongRun,
    WeeklyHoursExceeded { hours: u32 },
    ConsecutiveWeekends,
}

impl ViolationKind {
    pub fn code(&self) -> &'static str {
        match self {
            ViolationKind::BlockTooLong { .. } => "block_too_long",
            ViolationKind::SingleNight => "single_night",
            ViolationKind::NightGapTooShort { .. } => "night_gap_too_short",
            ViolationKind::RestAfterNights => "rest_after_nights",
            ViolationKind::TooManyConsecutiveShifts { .. } => "too_many_consecutive_shifts",
            ViolationKind::TooManyConsecutiveLongShifts { .. } => {
                "too_many_consecutive_long_shifts"
            }
            ViolationKind::RestAfterLongRun => "rest_after_long_run",
            ViolationKind::WeeklyHoursExceeded { .. } => "weekly_hours_exceeded",
            ViolationKind::ConsecutiveWeekends => "consecutive_weekends",
        }
    }
}

/// Règle enfreinte par une personne entre deux dates (incluses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub person: PersonId,
    pub kind: ViolationKind,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Contrôle a posteriori d'un état, qu'il vienne du pipeline ou d'un fichier.
pub fn audit(state: &RosterState) -> Vec<Violation> {
    let mut out = Vec::new();
    let evaluator = RestPeriodEvaluator::new(state);
    let dates = state.dates();

    for (idx, person) in state.people().iter().enumerate() {
        let blocks = evaluator.blocks(idx);
        for &(start, end) in &blocks {
            let length = end - start + 1;
            let excepted = state.has_exception(person, dates[start], dates[end]);
            if length > MAX_BLOCK_NIGHTS && !excepted {
                out.push(Violation {
                    person: person.clone(),
                    kind: ViolationKind::BlockTooLong { length },
                    start: dates[start],
                    end: dates[end],
                });
            }
            if length == 1 && !excepted {
                out.push(Violation {
                    person: person.clone(),
                    kind: ViolationKind::SingleNight,
                    start: dates[start],
                    end: dates[end],
                });
            }
            let rest_end = (end + REST_DAYS_AFTER_NIGHTS).min(state.num_days() - 1);
            if let Some(day) = (end + 1..=rest_end)
                .find(|d| state.get(*d, idx).category() == ShiftCategory::Day)
            {
                out.push(Violation {
                    person: person.clone(),
                    kind: ViolationKind::RestAfterNights,
                    start: dates[end],
                    end: dates[day],
                });
            }
        }
        for pair in blocks.windows(2) {
            let (prev_end, next_start) = (pair[0].1, pair[1].0);
            let gap = next_start - prev_end;
            if gap < MIN_NIGHT_GAP_DAYS
                && !state.night_gap_between(dates[prev_end], dates[next_start])
            {
                out.push(Violation {
                    person: person.clone(),
                    kind: ViolationKind::NightGapTooShort { gap },
                    start: dates[prev_end],
                    end: dates[next_start],
                });
            }
        }
        work_limits(state, idx, &mut out);
    }

    out
}

/// Suites de shifts, suites de shifts longs, heures sur 7 jours, week-ends consécutifs.
fn work_limits(state: &RosterState, idx: usize, out: &mut Vec<Violation>) {
    let n = state.num_days();
    let dates = state.dates();
    let person = &state.people()[idx];
    let timeline = state.timeline(idx);
    let works = |d: usize| timeline[d].is_working();
    let long = |d: usize| timeline[d].is_long();
    let mut push = |kind, start: usize, end: usize| {
        out.push(Violation {
            person: person.clone(),
            kind,
            start: dates[start],
            end: dates[end],
        })
    };

    let mut day = 0;
    while day < n {
        if !works(day) {
            day += 1;
            continue;
        }
        let (start, end) = run_around(n, day, works);
        let length = end - start + 1;
        if length > MAX_CONSECUTIVE_SHIFTS {
            push(ViolationKind::TooManyConsecutiveShifts { length }, start, end);
        } else if length == MAX_CONSECUTIVE_SHIFTS {
            if let Some(next) = work_after(end, n, works) {
                push(ViolationKind::RestAfterLongRun, end, next);
            }
        }
        day = end + 1;
    }

    // les suites faites uniquement de nuits relèvent des règles de blocs
    let mut day = 0;
    while day < n {
        if !long(day) {
            day += 1;
            continue;
        }
        let (start, end) = run_around(n, day, long);
        let length = end - start + 1;
        let nights_only = (start..=end).all(|d| timeline[d].category() == ShiftCategory::Night);
        if !nights_only {
            if length > MAX_CONSECUTIVE_LONG_SHIFTS {
                push(ViolationKind::TooManyConsecutiveLongShifts { length }, start, end);
            } else if length == MAX_CONSECUTIVE_LONG_SHIFTS {
                if let Some(next) = work_after(end, n, works) {
                    push(ViolationKind::RestAfterLongRun, end, next);
                }
            }
        }
        day = end + 1;
    }

    let mut previous_over = false;
    for start in 0..n.saturating_sub(HOURS_WINDOW_DAYS - 1) {
        let end = start + HOURS_WINDOW_DAYS - 1;
        let hours: u32 = timeline[start..=end].iter().map(|k| k.hours()).sum();
        let over = hours > MAX_HOURS_IN_SEVEN_DAYS;
        if over && !previous_over {
            push(ViolationKind::WeeklyHoursExceeded { hours }, start, end);
        }
        previous_over = over;
    }

    for pair in weekends(dates).windows(2) {
        let first = pair[0].iter().copied().find(|d| works(*d));
        let second = pair[1].iter().copied().find(|d| works(*d));
        if let (Some(a), Some(b)) = (first, second) {
            push(ViolationKind::ConsecutiveWeekends, a, b);
        }
    }
}

/// Premier jour travaillé dans les 2 jours qui suivent `end`.
fn work_after(end: usize, n: usize, works: impl Fn(usize) -> bool) -> Option<usize> {
    (end + 1..(end + 1 + REST_DAYS_AFTER_RUN).min(n)).find(|d| works(*d))
}
