#![forbid(unsafe_code)]
use chrono::NaiveDate;
use garde::engine::ConstraintFamily;
use garde::scheduler::InfeasibilityCause;
use garde::{
    audit, default_stages, Calendar, CoverageRule, DayFilter, ExclusionReason, Grade, LeavePeriod,
    ObjectiveWeights, Person, RestPeriodEvaluator, RosterReport, SchedError, ShiftCategory,
    ShiftKind, SolveOptions, SolveStatus, StagePipeline, StageSpec, StageStrategy,
};
use std::time::Duration;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

fn registrar(id: &str, wte: f64) -> Person {
    Person::new(id.to_uppercase(), Grade::Registrar, wte).with_id(id)
}

fn nights_every_day() -> Vec<CoverageRule> {
    vec![CoverageRule {
        kind: ShiftKind::NightRegistrar,
        count: 1,
        days: DayFilter::All,
    }]
}

fn bounded(nodes: u64) -> SolveOptions {
    SolveOptions {
        time_budget: Duration::from_secs(60),
        node_limit: Some(nodes),
        ..SolveOptions::default()
    }
}

#[test]
fn ineligible_person_stays_off_and_slots_become_gaps() {
    // 14 jours, un seul SHO, seuls des LD_REG sont demandés
    let calendar = Calendar::new(date(6), date(19), &[], &[]).unwrap();
    let people = vec![Person::new("Sam", Grade::Sho, 1.0).with_id("sam")];
    let coverage = vec![CoverageRule {
        kind: ShiftKind::LongDayRegistrar,
        count: 1,
        days: DayFilter::All,
    }];
    let pipeline = StagePipeline::new(calendar, people, coverage, default_stages()).unwrap();
    let outcome = pipeline.run().unwrap();

    assert!(outcome.is_complete());
    assert!((0..14).all(|d| outcome.state.get(d, 0) == ShiftKind::Off));
    assert_eq!(outcome.state.gaps().len(), 14);
    for gap in outcome.state.gaps() {
        assert_eq!(gap.kind, ShiftKind::LongDayRegistrar);
        assert_eq!(gap.shortfall, 1);
        assert_eq!(gap.exclusions.len(), 1);
        assert_eq!(gap.exclusions[0].reason, ExclusionReason::NotEligible);
    }
    let weekend_gaps = outcome
        .state
        .gaps()
        .iter()
        .filter(|g| g.stage == "weekend_long_days")
        .count();
    assert_eq!(weekend_gaps, 4);
    assert_eq!(outcome.state.stages().len(), default_stages().len());
}

#[test]
fn two_registrars_cannot_cover_ten_nights() {
    let calendar = Calendar::new(date(6), date(15), &[], &[]).unwrap();
    let people = vec![registrar("a", 1.0), registrar("b", 1.0)];
    let pipeline = StagePipeline::new(calendar, people, nights_every_day(), default_stages())
        .unwrap()
        .with_options(bounded(2_000));
    let outcome = pipeline.run().unwrap();
    assert!(outcome.is_complete());

    let state = &outcome.state;
    let gaps = state.gaps();
    let uncovered: u32 = gaps.iter().map(|g| g.shortfall).sum();
    let nights = state.count(0, ShiftCategory::Night) + state.count(1, ShiftCategory::Night);
    assert!(uncovered >= 2);
    assert_eq!(nights + uncovered, 10);

    for (d, day) in state.dates().iter().enumerate() {
        let worked = (0..2).filter(|p| state.get(d, *p).is_night()).count();
        let gap = gaps.iter().any(|g| g.date == *day);
        assert!(worked <= 1);
        assert_ne!(worked == 1, gap, "night {day} must be covered or reported");
    }
    for gap in gaps {
        assert_eq!(gap.stage, "nights");
        assert_eq!(gap.exclusions.len(), 2);
        assert!(gap.exclusions.iter().all(|e| matches!(
            e.reason,
            ExclusionReason::Rest { .. } | ExclusionReason::CapacityLimit
        )));
    }

    let eval = RestPeriodEvaluator::new(state);
    for person in 0..2 {
        let blocks = eval.blocks(person);
        for (start, end) in &blocks {
            assert!((2..=4).contains(&(end - start + 1)));
        }
        for pair in blocks.windows(2) {
            assert!(pair[1].0 - pair[0].1 >= 7);
        }
    }
    assert!(audit(state).is_empty());
    assert!(state.exceptions().is_empty());
    assert!(outcome.has_warnings());
}

#[test]
fn sole_candidate_on_leave_yields_gaps_for_those_nights() {
    // lundi 6 → dimanche 12 ; vendredi 10 férié : nuits demandées les jours 5 à 7
    let calendar = Calendar::new(date(6), date(12), &[date(10)], &[]).unwrap();
    let mut person = registrar("solo", 1.0);
    person.leave = vec![LeavePeriod::new(date(10), date(12)).unwrap()];
    let coverage = vec![CoverageRule {
        kind: ShiftKind::NightRegistrar,
        count: 1,
        days: DayFilter::WeekendsAndHolidays,
    }];
    let pipeline = StagePipeline::new(calendar, vec![person], coverage, default_stages()).unwrap();
    let outcome = pipeline.run().unwrap();

    assert!(outcome.is_complete());
    let gap_dates: Vec<NaiveDate> = outcome.state.gaps().iter().map(|g| g.date).collect();
    assert_eq!(gap_dates, vec![date(10), date(11), date(12)]);
    for gap in outcome.state.gaps() {
        assert_eq!(gap.exclusions[0].reason, ExclusionReason::OnLeave);
        assert_eq!(gap.exclusions[0].person.as_str(), "solo");
    }
    for d in 4..7 {
        assert_eq!(outcome.state.get(d, 0), ShiftKind::Leave);
    }
    assert_eq!(outcome.state.count(0, ShiftCategory::Night), 0);
}

#[test]
fn bounded_search_is_reproducible() {
    let calendar = Calendar::new(date(6), date(19), &[], &[]).unwrap();
    let people = vec![
        registrar("a", 1.0),
        registrar("b", 1.0),
        registrar("c", 0.8),
    ];
    let pipeline = StagePipeline::new(calendar, people, nights_every_day(), default_stages())
        .unwrap()
        .with_options(bounded(300));

    let first = pipeline.run().unwrap();
    let second = pipeline.run().unwrap();
    assert_eq!(first.state, second.state);
    assert_eq!(first.totals, second.totals);
    assert_eq!(first.stages, second.stages);
    assert!(first.state.gaps().is_empty());
    let nights: u32 = (0..3)
        .map(|p| first.state.count(p, ShiftCategory::Night))
        .sum();
    assert_eq!(nights, 14);
    assert!(audit(&first.state).is_empty());

    // rejouer l'étape sur le même instantané donne le même objectif
    let stage = pipeline.stage("nights").unwrap().clone();
    let base = pipeline.initial_state();
    let totals = garde::RunningTotals::new(3);
    let again = pipeline.run_stage(&stage, &base, &totals).unwrap();
    let once_more = pipeline.run_stage(&stage, &base, &totals).unwrap();
    assert_eq!(again.report.objective, once_more.report.objective);
    assert_eq!(again.state, once_more.state);
}

#[test]
fn fairness_tolerance_within_reach_is_respected() {
    let calendar = Calendar::new(date(6), date(13), &[], &[]).unwrap();
    let people = vec![registrar("a", 1.0), registrar("b", 1.0)];
    let options = SolveOptions {
        fairness_tolerance: Some(0),
        time_budget: Duration::from_secs(20),
        ..SolveOptions::default()
    };
    let pipeline = StagePipeline::new(
        calendar,
        people,
        nights_every_day(),
        vec![StageSpec::new("nights", vec![ShiftKind::NightRegistrar])],
    )
    .unwrap()
    .with_options(options);
    let outcome = pipeline.run().unwrap();

    assert!(outcome.is_complete());
    assert!(outcome.state.gaps().is_empty());
    let report = RosterReport::build(pipeline.calendar(), pipeline.people(), &outcome.state);
    assert_eq!(report.night_spread, 0);
    assert_eq!(report.people[0].nights, 4);
    assert_eq!(report.people[1].nights, 4);
}

#[test]
fn unreachable_fairness_tolerance_halts_the_pipeline() {
    // 8 nuits, 4 au plus chacun : charges 400 et 800, écart 400 > 100
    let calendar = Calendar::new(date(6), date(13), &[], &[]).unwrap();
    let people = vec![registrar("a", 1.0), registrar("b", 0.5)];
    let options = SolveOptions {
        fairness_tolerance: Some(100),
        time_budget: Duration::from_secs(10),
        ..SolveOptions::default()
    };
    let pipeline = StagePipeline::new(calendar, people, nights_every_day(), default_stages())
        .unwrap()
        .with_options(options);
    let outcome = pipeline.run().unwrap();

    let report = outcome.halted.as_ref().expect("pipeline should halt");
    assert!(!outcome.is_complete());
    assert_eq!(report.stage, "nights");
    assert_eq!(report.cause, InfeasibilityCause::Proven);
    assert!(report
        .tight_families
        .contains(&ConstraintFamily::FairnessTolerance));
    assert!(report.to_string().contains("fairness_tolerance"));
    assert_eq!(report.slots.len(), 8);
    assert!(report.slots.iter().all(|s| s.candidates == 2));

    assert!(!outcome.state.stages().iter().any(|s| s == "nights"));
    assert_eq!(outcome.state.count(0, ShiftCategory::Night), 0);
    assert_eq!(outcome.state.count(1, ShiftCategory::Night), 0);
}

#[test]
fn forced_single_night_is_recorded_as_an_exception() {
    let calendar = Calendar::new(date(6), date(6), &[], &[]).unwrap();
    let pipeline = StagePipeline::new(
        calendar,
        vec![registrar("a", 1.0)],
        nights_every_day(),
        default_stages(),
    )
    .unwrap();
    let outcome = pipeline.run().unwrap();

    assert_eq!(outcome.state.get(0, 0), ShiftKind::NightRegistrar);
    assert_eq!(outcome.state.exceptions().len(), 1);
    let exception = &outcome.state.exceptions()[0];
    assert_eq!(exception.person.as_str(), "a");
    assert_eq!(exception.start, date(6));
    assert!(exception.reason.contains("single night"));
    assert!(audit(&outcome.state).is_empty());
    assert!(outcome.has_warnings());
}

#[test]
fn avoidable_single_night_is_re_solved_away() {
    // sans pénalité, l'équité préfère 2 + 1 nuits ; la nuit isolée n'est pas imposée
    let calendar = Calendar::new(date(6), date(8), &[], &[]).unwrap();
    let people = vec![registrar("a", 1.0), registrar("b", 1.0)];
    let options = SolveOptions {
        weights: ObjectiveWeights {
            singleton_penalty: 0,
            ..ObjectiveWeights::default()
        },
        ..SolveOptions::default()
    };
    let pipeline = StagePipeline::new(
        calendar,
        people,
        nights_every_day(),
        vec![StageSpec::new("nights", vec![ShiftKind::NightRegistrar])],
    )
    .unwrap()
    .with_options(options);
    let outcome = pipeline.run().unwrap();

    assert!(outcome.is_complete());
    assert!(outcome.state.exceptions().is_empty());
    assert!(audit(&outcome.state).is_empty());
    let mut nights: Vec<u32> = (0..2)
        .map(|p| outcome.state.count(p, ShiftCategory::Night))
        .collect();
    nights.sort();
    assert_eq!(nights, vec![0, 3]);
    assert_eq!(outcome.stages[0].exceptions, 0);
    assert_eq!(outcome.stages[0].status, Some(SolveStatus::Optimal));
}

#[test]
fn four_week_night_rota_is_balanced_without_exceptions() {
    let end = NaiveDate::from_ymd_opt(2025, 2, 2).unwrap();
    let calendar = Calendar::new(date(6), end, &[], &[]).unwrap();
    let people: Vec<Person> = ["a", "b", "c", "d", "e", "f", "g"]
        .iter()
        .map(|id| registrar(id, 1.0))
        .collect();
    let options = SolveOptions {
        time_budget: Duration::from_secs(5),
        ..SolveOptions::default()
    };
    let pipeline = StagePipeline::new(calendar, people, nights_every_day(), default_stages())
        .unwrap()
        .with_options(options);
    let outcome = pipeline.run().unwrap();

    assert!(outcome.is_complete());
    let state = &outcome.state;
    assert!(state.gaps().is_empty());
    assert!(state.exceptions().is_empty());
    assert!(audit(state).is_empty());

    let report = RosterReport::build(pipeline.calendar(), pipeline.people(), state);
    let nights: u32 = report.people.iter().map(|p| p.nights).sum();
    assert_eq!(nights, 28);
    assert!(report.night_spread <= 100, "spread {}", report.night_spread);
    let eval = RestPeriodEvaluator::new(state);
    for person in 0..7 {
        for (start, end) in eval.blocks(person) {
            assert!((2..=4).contains(&(end - start + 1)));
        }
    }
}

#[test]
fn greedy_stage_spreads_short_days_by_weighted_load() {
    let calendar = Calendar::new(date(6), date(8), &[], &[]).unwrap();
    let people = vec![registrar("full", 1.0), registrar("half", 0.5)];
    let coverage = vec![CoverageRule {
        kind: ShiftKind::ShortDay,
        count: 1,
        days: DayFilter::Weekdays,
    }];
    let stage = StageSpec::new("short_days", vec![ShiftKind::ShortDay])
        .on_days(DayFilter::Weekdays)
        .with_strategy(StageStrategy::GreedyAssign);
    let pipeline = StagePipeline::new(calendar, people, coverage, vec![stage]).unwrap();
    let outcome = pipeline.run().unwrap();

    // charges projetées : 100 vs 200, puis 200 vs 200 (ordre du rota), puis 300 vs 200
    assert_eq!(outcome.state.get(0, 0), ShiftKind::ShortDay);
    assert_eq!(outcome.state.get(1, 0), ShiftKind::ShortDay);
    assert_eq!(outcome.state.get(2, 1), ShiftKind::ShortDay);
    assert_eq!(outcome.totals.count(0, ShiftCategory::Day), 2);
    assert_eq!(outcome.totals.count(1, ShiftCategory::Day), 1);
    assert_eq!(outcome.stages[0].status, None);
}

#[test]
fn greedy_reports_missing_candidates() {
    let calendar = Calendar::new(date(6), date(7), &[], &[]).unwrap();
    let mut person = registrar("a", 1.0);
    person.leave = vec![LeavePeriod::single(date(7))];
    let coverage = vec![CoverageRule {
        kind: ShiftKind::ShortDay,
        count: 2,
        days: DayFilter::All,
    }];
    let stage = StageSpec::new("short_days", vec![ShiftKind::ShortDay])
        .with_strategy(StageStrategy::GreedyAssign);
    let pipeline = StagePipeline::new(calendar, vec![person], coverage, vec![stage]).unwrap();
    let outcome = pipeline.run().unwrap();

    let gaps = outcome.state.gaps();
    assert_eq!(gaps.len(), 2);
    assert_eq!((gaps[0].date, gaps[0].shortfall), (date(6), 1));
    assert!(gaps[0].exclusions.is_empty());
    assert_eq!((gaps[1].date, gaps[1].shortfall), (date(7), 2));
    assert_eq!(gaps[1].exclusions[0].reason, ExclusionReason::OnLeave);
}

#[test]
fn rerun_skips_committed_stages() {
    let calendar = Calendar::new(date(6), date(12), &[], &[]).unwrap();
    let people = vec![registrar("a", 1.0), registrar("b", 1.0)];
    let pipeline = StagePipeline::new(calendar, people, nights_every_day(), default_stages())
        .unwrap()
        .with_options(bounded(2_000));
    let outcome = pipeline.run().unwrap();
    let resumed = pipeline
        .run_from(outcome.state.clone(), outcome.totals.clone())
        .unwrap();
    assert!(resumed.stages.is_empty());
    assert_eq!(resumed.state, outcome.state);
}

#[test]
fn snapshot_from_another_roster_is_rejected() {
    let calendar = Calendar::new(date(6), date(12), &[], &[]).unwrap();
    let pipeline = StagePipeline::new(
        calendar.clone(),
        vec![registrar("a", 1.0)],
        nights_every_day(),
        default_stages(),
    )
    .unwrap();
    let other = garde::RosterState::new(&calendar, &[registrar("z", 1.0)]);
    let err = pipeline
        .run_from(other, garde::RunningTotals::new(1))
        .unwrap_err();
    assert!(matches!(err, SchedError::Validation(_)));
    assert!(matches!(
        pipeline.stage("missing"),
        Err(SchedError::UnknownStage(_))
    ));
}

#[test]
fn invalid_stage_definitions_are_refused() {
    let calendar = Calendar::new(date(6), date(12), &[], &[]).unwrap();
    let mixed = StageSpec::new(
        "mixed",
        vec![ShiftKind::NightRegistrar, ShiftKind::LongDayRegistrar],
    );
    let err = StagePipeline::new(calendar, vec![], vec![], vec![mixed]).unwrap_err();
    assert!(matches!(err, SchedError::Validation(_)));
}
