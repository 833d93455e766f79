use super::StageSpec;
use crate::model::{Person, ShiftKind};
use crate::rest::RestPeriodEvaluator;
use crate::state::{Exclusion, ExclusionReason, RosterState};

/// Seul filtre d'éligibilité, partagé par le builder, le glouton et le diagnostic.
/// `None` : la personne peut prendre le créneau.
pub(super) fn exclusion_reason(
    stage: &StageSpec,
    person: &Person,
    index: usize,
    state: &RosterState,
    day: usize,
    kind: ShiftKind,
) -> Option<ExclusionReason> {
    let date = state.dates()[day];
    if !stage.eligibility.admits(person) || !person.qualifies_for(kind) {
        return Some(ExclusionReason::NotEligible);
    }
    if !person.started_by(date) {
        return Some(ExclusionReason::BeforeStart);
    }
    let current = state.get(day, index);
    if current == ShiftKind::Leave || person.on_leave(date) {
        return Some(ExclusionReason::OnLeave);
    }
    if person.has_fixed_day_off(date) {
        return Some(ExclusionReason::FixedDayOff);
    }
    if current != ShiftKind::Off {
        return Some(ExclusionReason::AlreadyCommitted { kind: current });
    }
    RestPeriodEvaluator::new(state)
        .can_assign(index, day, kind)
        .err()
        .map(|denial| ExclusionReason::Rest { denial })
}

/// Exclusions classées (raison puis id) pour un créneau ; `covering` = personnes affectées au créneau.
pub(super) fn ranked_exclusions(
    stage: &StageSpec,
    people: &[Person],
    state: &RosterState,
    day: usize,
    kind: ShiftKind,
    covering: &[usize],
) -> Vec<Exclusion> {
    let mut out: Vec<Exclusion> = people
        .iter()
        .enumerate()
        .filter(|(idx, _)| !covering.contains(idx))
        .map(|(idx, person)| Exclusion {
            person: person.id.clone(),
            reason: exclusion_reason(stage, person, idx, state, day, kind)
                .unwrap_or(ExclusionReason::CapacityLimit),
        })
        .collect();
    out.sort_by(|a, b| a.reason.cmp(&b.reason).then_with(|| a.person.cmp(&b.person)));
    out
}

/// Nombre de candidats d'un créneau sur l'état donné.
pub(super) fn candidate_count(
    stage: &StageSpec,
    people: &[Person],
    state: &RosterState,
    day: usize,
    kind: ShiftKind,
) -> usize {
    people
        .iter()
        .enumerate()
        .filter(|(idx, p)| exclusion_reason(stage, p, *idx, state, day, kind).is_none())
        .count()
}
