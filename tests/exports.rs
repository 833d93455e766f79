#![forbid(unsafe_code)]
use chrono::NaiveDate;
use garde::{
    audit, io, Assignment, BlockException, Calendar, CapacityGap, Grade, LeavePeriod, Person,
    RosterReport, RosterState, ShiftKind, ViolationKind,
};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

fn gap(day: u32, kind: ShiftKind, shortfall: u32) -> CapacityGap {
    CapacityGap {
        date: date(day),
        kind,
        shortfall,
        stage: "nights".into(),
        exclusions: vec![],
    }
}

fn sample() -> (Calendar, Vec<Person>, RosterState) {
    let calendar = Calendar::new(date(10), date(12), &[], &[]).unwrap();
    let alice = Person::new("Alice", Grade::Registrar, 1.0).with_id("alice");
    let mut bob = Person::new("Bob", Grade::Sho, 0.5).with_id("bob");
    bob.leave = vec![LeavePeriod::single(date(11))];
    let people = vec![alice, bob];
    let night = |day| Assignment {
        day,
        person: 0,
        kind: ShiftKind::NightRegistrar,
    };
    let state = RosterState::new(&calendar, &people)
        .commit(
            "nights",
            &[night(0), night(1)],
            vec![
                gap(11, ShiftKind::NightSho, 1),
                gap(12, ShiftKind::LongDaySho, 2),
            ],
            vec![],
        )
        .unwrap();
    (calendar, people, state)
}

#[test]
fn grid_csv_layout() {
    let (_, people, state) = sample();
    let mut out = Vec::new();
    io::write_grid_csv(&mut out, &people, &state).unwrap();
    let csv = String::from_utf8(out).unwrap();
    insta::assert_snapshot!(csv, @r###"
    date,Alice,Bob,locum
    2025-01-10,N_REG,OFF,
    2025-01-11,N_REG,LEAVE,N_SHO
    2025-01-12,OFF,OFF,LD_SHO*2
    "###);
}

#[test]
fn summary_counts_loads_and_weekends() {
    let (calendar, people, state) = sample();
    let report = RosterReport::build(&calendar, &people, &state);
    assert_eq!(report.people.len(), 2);
    let alice = &report.people[0];
    assert_eq!((alice.nights, alice.days), (2, 0));
    assert_eq!(alice.night_load, 200);
    // samedi 11 janvier
    assert_eq!(alice.weekend_days, 1);
    // 26 h sur 3 jours : 60,7 h par semaine, au-dessus de 47 h
    assert_eq!(alice.hours, 26);
    assert!(!alice.within_weekly_band());
    assert!(!report.people[1].within_weekly_band());
    assert_eq!(report.night_spread, 200);
    assert_eq!(report.gaps, 2);
    assert_eq!(report.uncovered_shifts, 3);
    assert!(report.violations.is_empty());

    let mut out = Vec::new();
    io::write_report_csv(&mut out, &report).unwrap();
    let csv = String::from_utf8(out).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("id,name,grade,wte,nights,days,night_load,day_load,weekend_days,hours,weekly_hours")
    );
    assert_eq!(
        lines.next(),
        Some("alice,Alice,Registrar,1.00,2,0,200,0,1,26,60.7")
    );
    assert_eq!(lines.next(), Some("bob,Bob,SHO,0.50,0,0,0,0,0,0,0.0"));
}

#[test]
fn audit_flags_rule_breaks_unless_excepted() {
    let calendar = Calendar::new(date(6), date(19), &[], &[]).unwrap();
    let people = vec![Person::new("Alice", Grade::Registrar, 1.0).with_id("alice")];
    let at = |day, kind| Assignment {
        day,
        person: 0,
        kind,
    };
    let state = RosterState::new(&calendar, &people)
        .commit(
            "manual",
            &[
                at(0, ShiftKind::NightRegistrar),
                at(1, ShiftKind::NightRegistrar),
                at(2, ShiftKind::LongDayRegistrar),
                at(5, ShiftKind::NightRegistrar),
                at(8, ShiftKind::NightRegistrar),
                at(9, ShiftKind::NightRegistrar),
                at(10, ShiftKind::NightRegistrar),
                at(11, ShiftKind::NightRegistrar),
                at(12, ShiftKind::NightRegistrar),
            ],
            vec![],
            vec![],
        )
        .unwrap();
    let codes: Vec<&str> = audit(&state).iter().map(|v| v.kind.code()).collect();
    assert_eq!(
        codes,
        vec![
            "rest_after_nights",
            "single_night",
            "block_too_long",
            "night_gap_too_short",
            "night_gap_too_short",
            "consecutive_weekends",
        ]
    );

    let excepted = state
        .commit(
            "exceptions",
            &[],
            vec![],
            vec![
                BlockException {
                    person: people[0].id.clone(),
                    start: date(11),
                    end: date(11),
                    reason: "accepted".into(),
                },
                BlockException {
                    person: people[0].id.clone(),
                    start: date(14),
                    end: date(18),
                    reason: "accepted".into(),
                },
            ],
        )
        .unwrap();
    let remaining: Vec<ViolationKind> = audit(&excepted).iter().map(|v| v.kind).collect();
    assert_eq!(
        remaining,
        vec![
            ViolationKind::RestAfterNights,
            ViolationKind::NightGapTooShort { gap: 4 },
            ViolationKind::NightGapTooShort { gap: 3 },
            ViolationKind::ConsecutiveWeekends,
        ]
    );
}

#[test]
fn audit_flags_working_time_limits() {
    let calendar = Calendar::new(date(6), date(19), &[], &[]).unwrap();
    let people: Vec<Person> = ["a", "b", "c", "d"]
        .iter()
        .map(|id| Person::new(id.to_uppercase(), Grade::Registrar, 1.0).with_id(*id))
        .collect();
    let mut shifts = Vec::new();
    let mut put = |person, days: &[usize], kind| {
        for day in days {
            shifts.push(Assignment {
                day: *day,
                person,
                kind,
            });
        }
    };
    put(0, &[0, 1, 2, 3, 4], ShiftKind::LongDayRegistrar);
    put(1, &[0, 1, 2, 3, 4, 5, 6, 7], ShiftKind::ShortDay);
    put(2, &[0, 1, 2, 4, 5], ShiftKind::LongDayRegistrar);
    put(2, &[3], ShiftKind::Training);
    put(3, &[0, 1, 2, 3, 4, 5, 6, 8], ShiftKind::ShortDay);
    let state = RosterState::new(&calendar, &people)
        .commit("manual", &shifts, vec![], vec![])
        .unwrap();

    let violations = audit(&state);
    let found: Vec<(&str, ViolationKind, NaiveDate, NaiveDate)> = violations
        .iter()
        .map(|v| (v.person.as_str(), v.kind, v.start, v.end))
        .collect();
    assert_eq!(
        found,
        vec![
            (
                "a",
                ViolationKind::TooManyConsecutiveLongShifts { length: 5 },
                date(6),
                date(10)
            ),
            (
                "b",
                ViolationKind::TooManyConsecutiveShifts { length: 8 },
                date(6),
                date(13)
            ),
            (
                "c",
                ViolationKind::WeeklyHoursExceeded { hours: 74 },
                date(6),
                date(12)
            ),
            ("d", ViolationKind::RestAfterLongRun, date(12), date(14)),
        ]
    );
    let codes: Vec<&str> = audit(&state).iter().map(|v| v.kind.code()).collect();
    assert_eq!(
        codes,
        vec![
            "too_many_consecutive_long_shifts",
            "too_many_consecutive_shifts",
            "weekly_hours_exceeded",
            "rest_after_long_run",
        ]
    );
}
