//! Submission workflow states.

use serde::{Deserialize, Serialize};

/// Where an employee is in the submission workflow.
///
/// Draft → Staged → PendingVerification → Submitted. Every state can be
/// reset back to Draft. The state is derived from the employee record and
/// the staging slot, never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Draft,
    Staged,
    PendingVerification,
    Submitted,
}

impl WorkflowState {
    /// Derive the state from the submission flag and staging contents.
    pub fn derive(is_submitted: bool, has_staging: bool, has_challenge: bool) -> Self {
        match (is_submitted, has_staging, has_challenge) {
            (true, _, _) => Self::Submitted,
            (false, false, _) => Self::Draft,
            (false, true, false) => Self::Staged,
            (false, true, true) => Self::PendingVerification,
        }
    }

    /// Check if a transition from `self` to `target` is valid.
    ///
    /// Self-loops cover restaging, resending a passcode, and a wrong code.
    /// PendingVerification → Staged happens when a passcode expires.
    pub fn can_transition_to(&self, target: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, target),
            (_, Draft)
                | (Draft, Staged)
                | (Staged, Staged)
                | (Staged, PendingVerification)
                | (PendingVerification, Staged)
                | (PendingVerification, PendingVerification)
                | (PendingVerification, Submitted)
        )
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Staged => "staged",
            Self::PendingVerification => "pending_verification",
            Self::Submitted => "submitted",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_covers_all_states() {
        use WorkflowState::*;
        assert_eq!(WorkflowState::derive(false, false, false), Draft);
        assert_eq!(WorkflowState::derive(false, true, false), Staged);
        assert_eq!(WorkflowState::derive(false, true, true), PendingVerification);
        assert_eq!(WorkflowState::derive(true, false, false), Submitted);
        assert_eq!(WorkflowState::derive(true, true, true), Submitted);
    }

    #[test]
    fn valid_transitions() {
        use WorkflowState::*;
        let transitions = [
            (Draft, Staged),
            (Staged, Staged),
            (Staged, PendingVerification),
            (PendingVerification, PendingVerification),
            (PendingVerification, Submitted),
            (PendingVerification, Staged),
        ];
        for (from, to) in transitions {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn reset_reachable_from_every_state() {
        use WorkflowState::*;
        for from in [Draft, Staged, PendingVerification, Submitted] {
            assert!(from.can_transition_to(Draft), "{from} should reset to draft");
        }
    }

    #[test]
    fn invalid_transitions() {
        use WorkflowState::*;
        assert!(!Draft.can_transition_to(PendingVerification));
        assert!(!Draft.can_transition_to(Submitted));
        assert!(!Staged.can_transition_to(Submitted));
        assert!(!Submitted.can_transition_to(Staged));
        assert!(!Submitted.can_transition_to(Submitted));
    }

    #[test]
    fn display_matches_serde() {
        use WorkflowState::*;
        for state in [Draft, Staged, PendingVerification, Submitted] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(format!("\"{state}\""), json, "Display and serde should match for {state:?}");
        }
    }
}
