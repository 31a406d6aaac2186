//! Onboarding submission workflow.
//!
//! An employee stages profile fields and files, confirms the submission with
//! an emailed passcode, and only then is the profile committed to the record
//! store. A reset returns the employee to an empty draft.

pub mod engine;
pub mod model;
pub mod passcode;
pub mod routes;
pub mod staging;
pub mod state;

pub use engine::{ChallengeIssued, OnboardingEngine, OnboardingStatus};
pub use model::{Document, Employee, ProfileForm, StagedDocument, StagedProfile};
pub use passcode::{CodeGenerator, PasscodeChallenge, RandomCodes};
pub use routes::{RouteState, onboarding_routes};
pub use staging::{StagingSession, StagingStore};
pub use state::WorkflowState;
