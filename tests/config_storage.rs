#![forbid(unsafe_code)]
use chrono::{NaiveDate, Weekday};
use garde::model::validate_people;
use garde::{
    export_config_json, io, load_config_from_file, Assignment, Calendar, CoverageCatalog,
    DayFilter, Grade, JsonStorage, LeavePeriod, Person, RosterSnapshot, RosterState,
    RunningTotals, SchedError, ShiftCategory, ShiftKind, StagePipeline, Storage, ValidationError,
};
use std::fs;
use tempfile::tempdir;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

const CONFIG: &str = r#"{
  "id": "icu-jan",
  "name": "Réa janvier",
  "start_date": "2025-01-06",
  "end_date": "2025-01-19",
  "bank_holidays": ["2025-01-08"],
  "high_intensity_weeks": ["2025-01-13"],
  "coverage": [
    { "kind": "N_REG", "count": 1 },
    { "kind": "LD_REG", "count": 2, "days": "weekends_and_holidays" },
    { "kind": "SD", "count": 1, "days": "weekdays" }
  ],
  "rules": { "fairness_tolerance": 300 },
  "solver": { "time_budget_secs": 5, "node_limit": 1000 }
}"#;

#[test]
fn config_loads_and_drives_the_catalogs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rota.json");
    fs::write(&path, CONFIG).unwrap();

    let config = load_config_from_file(&path).unwrap();
    let calendar = config.calendar().unwrap();
    assert_eq!(calendar.len(), 14);
    assert!(calendar.day(2).holiday);
    assert!(!calendar.day(6).high_intensity);
    assert!(calendar.day(7).high_intensity);
    assert!(DayFilter::WeekendsAndHolidays.matches(calendar.day(2)));
    assert!(!DayFilter::Weekdays.matches(calendar.day(2)));

    let options = config.solve_options();
    assert_eq!(options.time_budget.as_secs(), 5);
    assert_eq!(options.node_limit, Some(1000));
    assert_eq!(options.fairness_tolerance, Some(300));

    let stages = config.stages();
    assert_eq!(stages.len(), 6);
    let nights = CoverageCatalog::for_stage(&config.coverage, &calendar, &stages[1]);
    assert_eq!(nights.slots().len(), 14);
    let weekend = CoverageCatalog::for_stage(&config.coverage, &calendar, &stages[2]);
    // 4 jours de week-end + 1 férié, 2 personnes chacun
    assert_eq!(weekend.slots().len(), 5);
    assert_eq!(weekend.total_required(), 10);
    assert_eq!(weekend.required(2, ShiftKind::LongDayRegistrar), 2);
    let weekday = CoverageCatalog::for_stage(&config.coverage, &calendar, &stages[4]);
    assert!(weekday.is_empty());
    let short = CoverageCatalog::for_stage(&config.coverage, &calendar, &stages[5]);
    assert_eq!(short.total_required(), 9);

    let copy = dir.path().join("copy.json");
    export_config_json(&copy, &config).unwrap();
    let again = load_config_from_file(&copy).unwrap();
    assert_eq!(again.coverage, config.coverage);
}

#[test]
fn invalid_configs_are_rejected() {
    let dir = tempdir().unwrap();
    let cases = [
        CONFIG.replace("\"2025-01-13\"", "\"2025-01-14\""),
        CONFIG.replace("\"SD\"", "\"OFF\""),
        CONFIG.replace("300", "-1"),
        CONFIG.replace("\"end_date\": \"2025-01-19\"", "\"end_date\": \"2025-01-01\""),
        CONFIG.replace("\"N_REG\"", "\"NIGHT\""),
    ];
    for (i, raw) in cases.iter().enumerate() {
        let path = dir.path().join(format!("bad{i}.json"));
        fs::write(&path, raw).unwrap();
        assert!(load_config_from_file(&path).is_err(), "case {i} accepted");
    }
}

#[test]
fn pipeline_from_invalid_config_reports_validation_error() {
    let raw = CONFIG.replace("300", "-1");
    let config: garde::RotaConfig = serde_json::from_str(&raw).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ValidationError::Config(reason)) if reason.contains("fairness_tolerance")
    ));
    let err = StagePipeline::from_config(&config, vec![]).unwrap_err();
    assert!(matches!(err, SchedError::Validation(ValidationError::Config(_))));

    let inverted = CONFIG.replace(
        "\"end_date\": \"2025-01-19\"",
        "\"end_date\": \"2025-01-01\"",
    );
    let config: garde::RotaConfig = serde_json::from_str(&inverted).unwrap();
    assert!(matches!(
        StagePipeline::from_config(&config, vec![]),
        Err(SchedError::Validation(ValidationError::EmptyHorizon { .. }))
    ));
}

#[test]
fn people_validation() {
    let mut bad = Person::new("A", Grade::Registrar, 1.2);
    assert!(matches!(
        bad.validate(),
        Err(ValidationError::WteOutOfRange { .. })
    ));
    bad.wte = 1.0;
    bad.leave = vec![
        LeavePeriod::new(date(6), date(9)).unwrap(),
        LeavePeriod::new(date(9), date(12)).unwrap(),
    ];
    assert!(matches!(
        bad.validate(),
        Err(ValidationError::OverlappingLeave { .. })
    ));
    assert!(LeavePeriod::new(date(9), date(6)).is_err());

    let a = Person::new("A", Grade::Registrar, 1.0).with_id("same");
    let b = Person::new("B", Grade::Sho, 0.5).with_id("same");
    assert_eq!(
        validate_people(&[a, b]),
        Err(ValidationError::DuplicatePerson(garde::PersonId::new("same")))
    );
    assert!("nurse".parse::<Grade>().is_err());
    assert_eq!("n_reg".parse::<ShiftKind>(), Ok(ShiftKind::NightRegistrar));
    assert_eq!(ShiftKind::Training.category(), ShiftCategory::Day);
    assert!(!ShiftKind::LocumGap.is_working());
}

#[test]
fn people_csv_import() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("people.csv");
    fs::write(
        &path,
        "id,name,grade,wte,high_intensity_eligible,fixed_day_off,leave,start_date\n\
         r1,Alice,Registrar,1.0,yes,,2025-01-06/2025-01-08;2025-01-20,\n\
         ,Bob,SHO,0.6,,Wed,,2025-01-13\n",
    )
    .unwrap();
    let people = io::import_people(&path).unwrap();
    assert_eq!(people.len(), 2);
    assert_eq!(people[0].id.as_str(), "r1");
    assert!(people[0].high_intensity_eligible);
    assert_eq!(people[0].leave.len(), 2);
    assert!(people[0].on_leave(date(7)));
    assert!(people[0].on_leave(date(20)));
    assert_eq!(people[1].grade, Grade::Sho);
    assert!(!people[1].id.as_str().is_empty());
    assert_eq!(people[1].fixed_day_off, Some(Weekday::Wed));
    assert_eq!(people[1].start_date, Some(date(13)));

    let json = dir.path().join("people.json");
    io::export_people_json(&json, &people).unwrap();
    assert_eq!(io::import_people(&json).unwrap(), people);

    let broken = dir.path().join("broken.csv");
    fs::write(&broken, "id,name,grade,wte\nx,Zed,Registrar,0\n").unwrap();
    assert!(io::import_people_csv(&broken).is_err());
}

#[test]
fn commits_never_overwrite_and_leave_respects_commitments() {
    let calendar = Calendar::new(date(6), date(12), &[], &[]).unwrap();
    let mut alice = Person::new("Alice", Grade::Registrar, 1.0).with_id("alice");
    alice.leave = vec![LeavePeriod::single(date(12))];
    let state = RosterState::new(&calendar, &[alice]);
    assert_eq!(state.get(6, 0), ShiftKind::Leave);

    let night = |day| Assignment {
        day,
        person: 0,
        kind: ShiftKind::NightRegistrar,
    };
    let next = state.commit("nights", &[night(0), night(1)], vec![], vec![]).unwrap();
    assert_eq!(next.version(), state.version() + 1);
    assert_eq!(next.stages(), ["nights".to_string()]);
    // l'instantané d'origine n'a pas bougé
    assert_eq!(state.get(0, 0), ShiftKind::Off);

    let err = next.commit("again", &[night(1)], vec![], vec![]).unwrap_err();
    assert!(matches!(err, SchedError::Overwrite { kind: ShiftKind::NightRegistrar, .. }));
    let err = next.commit("leave", &[night(6)], vec![], vec![]).unwrap_err();
    assert!(matches!(err, SchedError::Overwrite { kind: ShiftKind::Leave, .. }));

    let id = garde::PersonId::new("alice");
    let err = next
        .record_leave(&id, LeavePeriod::new(date(7), date(8)).unwrap())
        .unwrap_err();
    assert!(matches!(
        err,
        SchedError::Validation(ValidationError::LeaveOnCommittedDay { .. })
    ));
    let with_leave = next
        .record_leave(&id, LeavePeriod::new(date(9), date(10)).unwrap())
        .unwrap();
    assert_eq!(with_leave.kind_at(&id, date(9)), Some(ShiftKind::Leave));
    assert_eq!(with_leave.kind_at(&id, date(11)), Some(ShiftKind::Off));

    let totals = RunningTotals::new(1).after_commit(&[night(0), night(1)]);
    assert_eq!(totals, RunningTotals::from_state(&next));
    assert_eq!(totals.count(0, ShiftCategory::Night), 2);
    assert_eq!(totals.load(0, 0.5, ShiftCategory::Night), 400);
}

#[test]
fn snapshot_roundtrip_and_resume() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("rota.json");
    fs::write(
        &config_path,
        r#"{ "id": "r", "name": "R", "start_date": "2025-01-06", "end_date": "2025-01-12",
             "coverage": [{ "kind": "N_REG", "count": 1 }],
             "solver": { "time_budget_secs": 20, "node_limit": 20000 } }"#,
    )
    .unwrap();
    let config = load_config_from_file(&config_path).unwrap();
    let people = vec![
        Person::new("A", Grade::Registrar, 1.0).with_id("a"),
        Person::new("B", Grade::Registrar, 1.0).with_id("b"),
    ];
    let pipeline = StagePipeline::from_config(&config, people).unwrap();
    let outcome = pipeline.run().unwrap();
    assert!(outcome.is_complete());

    let storage = JsonStorage::open(dir.path().join("snapshot.json")).unwrap();
    let snapshot = RosterSnapshot::new(outcome.state.clone(), outcome.totals.clone());
    assert_eq!(snapshot.stage.as_deref(), Some("short_days"));
    storage.save(&snapshot).unwrap();
    assert!(storage.path().exists());

    let loaded = storage.load().unwrap();
    assert_eq!(loaded, snapshot);
    let resumed = pipeline.run_from(loaded.state, loaded.totals).unwrap();
    assert!(resumed.stages.is_empty());
    assert_eq!(resumed.state, outcome.state);
}
