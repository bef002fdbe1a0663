//! Deterministic qualification stage machine.
//!
//! A conversation moves through a fixed stage graph:
//!
//! ```text
//! start -> consent -> personal_data -> bant -> requirements -> meeting -> completed
//! ```
//!
//! plus a terminal `abandoned` reachable from anywhere. The machine is a pure
//! function over a snapshot of the lead's persisted state; it never performs
//! I/O and never advances on assistant turns alone. The orchestrator persists
//! whatever this module decides.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A position in the qualification stage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Start,
    Consent,
    PersonalData,
    Bant,
    Requirements,
    Meeting,
    Completed,
    Abandoned,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Start => "start",
            Step::Consent => "consent",
            Step::PersonalData => "personal_data",
            Step::Bant => "bant",
            Step::Requirements => "requirements",
            Step::Meeting => "meeting",
            Step::Completed => "completed",
            Step::Abandoned => "abandoned",
        }
    }

    /// Every step, in graph order.
    pub const ALL: [Step; 8] = [
        Step::Start,
        Step::Consent,
        Step::PersonalData,
        Step::Bant,
        Step::Requirements,
        Step::Meeting,
        Step::Completed,
        Step::Abandoned,
    ];

    /// Terminal steps never advance again without an operator override.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Completed | Step::Abandoned)
    }

    /// Position along the forward path; terminals sort last.
    fn rank(&self) -> u8 {
        match self {
            Step::Start => 0,
            Step::Consent => 1,
            Step::PersonalData => 2,
            Step::Bant => 3,
            Step::Requirements => 4,
            Step::Meeting => 5,
            Step::Completed => 6,
            Step::Abandoned => 7,
        }
    }
}

impl std::str::FromStr for Step {
    type Err = UnknownStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| UnknownStep(s.to_string()))
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step name that is not part of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown qualification step: {0}")]
pub struct UnknownStep(pub String);

/// Snapshot of a lead's persisted state after the current turn's effects
/// have been applied. The orchestrator assembles this from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadView {
    /// The lead's persisted step before this turn.
    pub current: Step,
    /// The user turned the conversation over at least once.
    pub has_user_turn: bool,
    /// GDPR consent recorded as given.
    pub consent: bool,
    /// Consent recorded as explicitly refused this turn.
    pub consent_refused: bool,
    /// Consecutive consent refusals including this turn.
    pub refusal_count: u32,
    /// User row has a non-empty full name.
    pub has_full_name: bool,
    /// User row has at least one of email/phone.
    pub has_contact: bool,
    /// All four BANT fields populated (empty strings count as missing).
    pub bant_complete: bool,
    /// Requirements row has `app_type` set.
    pub has_app_type: bool,
    /// At least one feature recorded.
    pub feature_count: u32,
    /// A meeting in status `scheduled` exists for the lead.
    pub has_scheduled_meeting: bool,
    /// The agent ended the conversation with a decline reason this turn.
    pub declined: bool,
    /// No user message for the abandonment window (7 days).
    pub idle_expired: bool,
}

impl Default for Step {
    fn default() -> Self {
        Step::Start
    }
}

/// Number of consecutive consent refusals that abandon the lead.
pub const MAX_CONSENT_REFUSALS: u32 = 2;

/// Compute the next step for a lead from its post-effect state.
///
/// The result is idempotent (feeding the output back as `current` yields the
/// same step) and monotonic: it never moves backwards along the graph.
/// Assistant-only turns leave every predicate unchanged, so the step holds.
pub fn next_step(view: &LeadView) -> Step {
    if view.current.is_terminal() {
        return view.current;
    }

    if view.declined || view.idle_expired {
        return Step::Abandoned;
    }
    if view.consent_refused && view.refusal_count >= MAX_CONSENT_REFUSALS {
        return Step::Abandoned;
    }

    // Walk forward as far as the recorded data allows. Several stages can be
    // crossed in a single turn when one message carries everything.
    let mut step = view.current;
    loop {
        let advanced = match step {
            Step::Start if view.has_user_turn => Some(Step::Consent),
            Step::Consent if view.consent => Some(Step::PersonalData),
            Step::PersonalData if view.has_full_name && view.has_contact => Some(Step::Bant),
            Step::Bant if view.bant_complete => Some(Step::Requirements),
            Step::Requirements if view.has_app_type && view.feature_count > 0 => {
                Some(Step::Meeting)
            }
            Step::Meeting if view.has_scheduled_meeting => Some(Step::Completed),
            _ => None,
        };
        match advanced {
            Some(next) => step = next,
            None => break,
        }
    }
    step
}

/// Whether moving `from -> to` is legal without an operator override.
///
/// Forward moves along the graph and moves into `abandoned` are legal;
/// anything else requires an explicit override.
pub fn is_forward(from: Step, to: Step) -> bool {
    to == Step::Abandoned || to.rank() >= from.rank()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> LeadView {
        LeadView {
            has_user_turn: true,
            ..Default::default()
        }
    }

    #[test]
    fn step_round_trips_through_strings() {
        for step in Step::ALL {
            assert_eq!(step.as_str().parse::<Step>().unwrap(), step);
        }
        assert!("sideways".parse::<Step>().is_err());
    }

    #[test]
    fn first_user_turn_reaches_consent() {
        let view = base();
        assert_eq!(next_step(&view), Step::Consent);
    }

    #[test]
    fn no_advance_without_user_turn() {
        let view = LeadView::default();
        assert_eq!(next_step(&view), Step::Start);
    }

    #[test]
    fn consent_unlocks_personal_data() {
        let view = LeadView {
            current: Step::Consent,
            consent: true,
            ..base()
        };
        assert_eq!(next_step(&view), Step::PersonalData);
    }

    #[test]
    fn single_refusal_stays_on_consent() {
        let view = LeadView {
            current: Step::Consent,
            consent_refused: true,
            refusal_count: 1,
            ..base()
        };
        assert_eq!(next_step(&view), Step::Consent);
    }

    #[test]
    fn second_refusal_abandons() {
        let view = LeadView {
            current: Step::Consent,
            consent_refused: true,
            refusal_count: 2,
            ..base()
        };
        assert_eq!(next_step(&view), Step::Abandoned);
    }

    #[test]
    fn personal_data_requires_name_and_contact() {
        let mut view = LeadView {
            current: Step::PersonalData,
            consent: true,
            has_full_name: true,
            ..base()
        };
        assert_eq!(next_step(&view), Step::PersonalData);

        view.has_contact = true;
        assert_eq!(next_step(&view), Step::Bant);
    }

    #[test]
    fn one_rich_turn_can_cross_several_stages() {
        let view = LeadView {
            current: Step::Consent,
            consent: true,
            has_full_name: true,
            has_contact: true,
            bant_complete: true,
            ..base()
        };
        assert_eq!(next_step(&view), Step::Requirements);
    }

    #[test]
    fn requirements_need_app_type_and_a_feature() {
        let mut view = LeadView {
            current: Step::Requirements,
            consent: true,
            has_full_name: true,
            has_contact: true,
            bant_complete: true,
            has_app_type: true,
            ..base()
        };
        assert_eq!(next_step(&view), Step::Requirements);

        view.feature_count = 1;
        assert_eq!(next_step(&view), Step::Meeting);
    }

    #[test]
    fn scheduled_meeting_completes() {
        let view = LeadView {
            current: Step::Meeting,
            consent: true,
            has_full_name: true,
            has_contact: true,
            bant_complete: true,
            has_app_type: true,
            feature_count: 2,
            has_scheduled_meeting: true,
            ..base()
        };
        assert_eq!(next_step(&view), Step::Completed);
    }

    #[test]
    fn terminals_never_move() {
        for current in [Step::Completed, Step::Abandoned] {
            let view = LeadView {
                current,
                declined: true,
                idle_expired: true,
                ..base()
            };
            assert_eq!(next_step(&view), current);
        }
    }

    #[test]
    fn decline_and_idle_abandon_from_any_live_stage() {
        for current in [Step::Start, Step::Consent, Step::Bant, Step::Meeting] {
            let declined = LeadView {
                current,
                declined: true,
                ..base()
            };
            assert_eq!(next_step(&declined), Step::Abandoned);

            let idle = LeadView {
                current,
                idle_expired: true,
                ..base()
            };
            assert_eq!(next_step(&idle), Step::Abandoned);
        }
    }

    #[test]
    fn next_step_is_idempotent() {
        let view = LeadView {
            current: Step::Consent,
            consent: true,
            has_full_name: true,
            has_contact: true,
            ..base()
        };
        let once = next_step(&view);
        let again = next_step(&LeadView {
            current: once,
            ..view
        });
        assert_eq!(once, again);
    }

    #[test]
    fn forward_check() {
        assert!(is_forward(Step::Consent, Step::Bant));
        assert!(is_forward(Step::Bant, Step::Bant));
        assert!(is_forward(Step::Meeting, Step::Abandoned));
        assert!(!is_forward(Step::Bant, Step::Consent));
    }
}
