//! OnboardingEngine drives an employee from an empty profile through
//! staging, passcode verification, and the final commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{try_join, try_join_all};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::notify::{Notifier, passcode_message};
use crate::storage::{Attachment, ObjectStorage, UploadCategory};
use crate::store::Database;

use super::model::{Document, Employee, ProfileForm, StagedDocument, StagedProfile};
use super::passcode::{CodeGenerator, PasscodeChallenge};
use super::staging::{StagingSession, StagingSlot, StagingStore};
use super::state::WorkflowState;

/// Snapshot of an employee's onboarding progress.
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingStatus {
    pub state: WorkflowState,
    pub employee: Employee,
    pub documents: Vec<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged: Option<StagingSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u32>,
}

/// Result of issuing (or re-issuing) a passcode.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeIssued {
    pub sent_to: String,
    pub expires_at: DateTime<Utc>,
    /// True when a previous passcode was replaced.
    pub resend: bool,
}

/// Coordinates the submission workflow. One instance serves every employee;
/// operations for the same employee are serialised on their staging slot.
pub struct OnboardingEngine {
    db: Arc<dyn Database>,
    storage: Arc<dyn ObjectStorage>,
    notifier: Arc<dyn Notifier>,
    codes: Arc<dyn CodeGenerator>,
    staging: StagingStore,
    config: WorkflowConfig,
}

impl OnboardingEngine {
    pub fn new(
        db: Arc<dyn Database>,
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn Notifier>,
        codes: Arc<dyn CodeGenerator>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            db,
            storage,
            notifier,
            codes,
            staging: StagingStore::new(),
            config,
        }
    }

    /// Stage profile fields and upload attachments.
    ///
    /// Any previously staged content is discarded first, so a failed upload
    /// leaves the employee in `Draft` with nothing staged.
    pub async fn stage(
        &self,
        user_id: &str,
        form: ProfileForm,
        profile_image: Option<Attachment>,
        documents: Vec<Attachment>,
    ) -> Result<StagingSession, WorkflowError> {
        let slot = self.staging.slot(user_id).await;
        let result = self
            .stage_in(&slot, user_id, form, profile_image, documents)
            .await;
        self.release(slot, user_id).await;
        result
    }

    /// Issue a passcode for the staged profile and email it to the staged
    /// address. Calling again re-issues a fresh code and invalidates the
    /// previous one.
    ///
    /// A delivery failure still leaves the new challenge recorded so the
    /// employee can ask for a resend.
    pub async fn issue_challenge(&self, user_id: &str) -> Result<ChallengeIssued, WorkflowError> {
        let slot = self.staging.slot(user_id).await;
        let result = self.issue_challenge_in(&slot, user_id).await;
        self.release(slot, user_id).await;
        result
    }

    /// Check a passcode and, on a match, commit the staged profile.
    ///
    /// The attempt is counted before the comparison, so once the limit is
    /// passed even a correct code discards the staging session.
    pub async fn verify(&self, user_id: &str, code: &str) -> Result<Employee, WorkflowError> {
        let slot = self.staging.slot(user_id).await;
        let result = self.verify_in(&slot, user_id, code).await;
        self.release(slot, user_id).await;
        result
    }

    /// Return the employee to `Draft`: delete documents, clear profile
    /// fields and the submission flag, and drop any staged data.
    ///
    /// Staged data is only dropped once the durable reset has succeeded.
    pub async fn reset(&self, user_id: &str) -> Result<(), WorkflowError> {
        let slot = self.staging.slot(user_id).await;
        let result = self.reset_in(&slot, user_id).await;
        self.release(slot, user_id).await;
        result
    }

    async fn stage_in(
        &self,
        slot: &StagingSlot,
        user_id: &str,
        form: ProfileForm,
        profile_image: Option<Attachment>,
        documents: Vec<Attachment>,
    ) -> Result<StagingSession, WorkflowError> {
        let mut session = slot.lock().await;

        let employee = self.load_employee(user_id).await?;
        if employee.is_submitted {
            return Err(WorkflowError::AlreadySubmitted);
        }
        let form = form.validated()?;
        self.ensure_email_available(&employee, &form.email).await?;

        let from = current_state(&employee, session.as_ref());
        if session.take().is_some() {
            debug!(user_id = %user_id, "Discarding previously staged profile");
        }

        let (image_url, staged_docs) = self
            .upload_all(user_id, profile_image.as_ref(), &documents)
            .await
            .inspect_err(|_| log_transition(user_id, from, WorkflowState::Draft))?;

        let staged = StagingSession::new(StagedProfile::from_form(form, image_url), staged_docs);
        *session = Some(staged.clone());

        info!(
            user_id = %user_id,
            documents = staged.documents.len(),
            image = staged.profile.profile_image_url.is_some(),
            "Profile staged"
        );
        log_transition(user_id, from, WorkflowState::Staged);
        Ok(staged)
    }

    async fn issue_challenge_in(
        &self,
        slot: &StagingSlot,
        user_id: &str,
    ) -> Result<ChallengeIssued, WorkflowError> {
        let mut guard = slot.lock().await;

        let employee = self.load_employee(user_id).await?;
        if employee.is_submitted {
            return Err(WorkflowError::AlreadySubmitted);
        }
        let from = current_state(&employee, guard.as_ref());
        let session = guard.as_mut().ok_or(WorkflowError::NothingStaged)?;

        let code = self.codes.generate();
        let (subject, body) =
            passcode_message(&session.profile.name, &code, self.config.passcode_ttl);
        let challenge = PasscodeChallenge::new(code, self.config.passcode_ttl);
        let issued = ChallengeIssued {
            sent_to: session.profile.email.clone(),
            expires_at: challenge.expires_at,
            resend: session.challenge.is_some(),
        };
        session.challenge = Some(challenge);
        log_transition(user_id, from, WorkflowState::PendingVerification);

        if let Err(e) = self.notifier.send(&issued.sent_to, &subject, &body).await {
            warn!(user_id = %user_id, to = %issued.sent_to, "Passcode delivery failed: {e}");
            return Err(WorkflowError::DeliveryFailed {
                reason: e.to_string(),
            });
        }

        info!(user_id = %user_id, resend = issued.resend, "Passcode issued");
        Ok(issued)
    }

    async fn verify_in(
        &self,
        slot: &StagingSlot,
        user_id: &str,
        code: &str,
    ) -> Result<Employee, WorkflowError> {
        let mut guard = slot.lock().await;

        let employee = self.load_employee(user_id).await?;
        if employee.is_submitted {
            return Err(WorkflowError::AlreadySubmitted);
        }
        let session = guard.as_mut().ok_or(WorkflowError::NoChallenge)?;
        let challenge = session.challenge.as_mut().ok_or(WorkflowError::NoChallenge)?;

        if challenge.is_expired(Utc::now()) {
            session.challenge = None;
            warn!(user_id = %user_id, "Passcode expired");
            log_transition(user_id, WorkflowState::PendingVerification, WorkflowState::Staged);
            return Err(WorkflowError::ChallengeExpired);
        }

        let attempts = challenge.register_attempt();
        if attempts > self.config.max_attempts {
            *guard = None;
            warn!(user_id = %user_id, attempts, "Too many passcode attempts, staging discarded");
            log_transition(user_id, WorkflowState::PendingVerification, WorkflowState::Draft);
            return Err(WorkflowError::AttemptsExceeded);
        }

        if !challenge.matches(code) {
            let remaining = self.config.max_attempts.saturating_sub(attempts);
            warn!(user_id = %user_id, attempts, remaining, "Invalid passcode");
            return Err(WorkflowError::InvalidCode {
                attempts,
                remaining,
            });
        }

        let committed = self
            .db
            .commit_profile(employee.id, &session.profile, &session.documents, Utc::now())
            .await
            .map_err(|e| {
                warn!(user_id = %user_id, "Commit failed, staging kept for retry: {e}");
                WorkflowError::WriteError(e.to_string())
            })?;

        *guard = None;
        log_transition(user_id, WorkflowState::PendingVerification, WorkflowState::Submitted);
        Ok(committed)
    }

    async fn reset_in(&self, slot: &StagingSlot, user_id: &str) -> Result<(), WorkflowError> {
        let mut guard = slot.lock().await;

        let employee = self.load_employee(user_id).await?;
        let from = current_state(&employee, guard.as_ref());

        self.db.reset_profile(employee.id).await.map_err(|e| {
            warn!(user_id = %user_id, "Reset failed, staging kept: {e}");
            WorkflowError::WriteError(e.to_string())
        })?;
        *guard = None;

        info!(user_id = %user_id, "Profile reset");
        log_transition(user_id, from, WorkflowState::Draft);
        Ok(())
    }

    /// Current state, committed records, and staged preview for an employee.
    pub async fn status(&self, user_id: &str) -> Result<OnboardingStatus, WorkflowError> {
        let employee = self.load_employee(user_id).await?;
        let documents = self
            .db
            .list_documents(employee.id)
            .await
            .map_err(|e| WorkflowError::Database(e.to_string()))?;
        let staged = self.staging.peek(user_id).await;

        let attempts_remaining = staged
            .as_ref()
            .and_then(|s| s.challenge.as_ref())
            .map(|c| self.config.max_attempts.saturating_sub(c.attempts));

        Ok(OnboardingStatus {
            state: current_state(&employee, staged.as_ref()),
            employee,
            documents,
            staged,
            attempts_remaining,
        })
    }

    /// Number of employees with uncommitted staged data.
    pub async fn active_sessions(&self) -> usize {
        self.staging.active_sessions().await
    }

    /// Drop our handle on the slot and let the store forget it if it is
    /// empty and unused.
    async fn release(&self, slot: StagingSlot, user_id: &str) {
        drop(slot);
        self.staging.release(user_id).await;
    }

    /// Reject an email that is already registered to another employee;
    /// committing it would violate the unique address constraint.
    async fn ensure_email_available(
        &self,
        employee: &Employee,
        email: &str,
    ) -> Result<(), WorkflowError> {
        let owner = self
            .db
            .get_employee_by_email(email)
            .await
            .map_err(|e| WorkflowError::Database(e.to_string()))?;
        match owner {
            Some(other) if other.id != employee.id => {
                warn!(user_id = %employee.user_id, "Staged email belongs to another employee");
                Err(WorkflowError::Validation {
                    field: "email".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    async fn load_employee(&self, user_id: &str) -> Result<Employee, WorkflowError> {
        self.db
            .get_employee_by_user(user_id)
            .await
            .map_err(|e| WorkflowError::Database(e.to_string()))?
            .ok_or_else(|| WorkflowError::EmployeeNotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Upload the profile image and every document concurrently. Fails on
    /// the first upload error, naming the offending file.
    async fn upload_all(
        &self,
        user_id: &str,
        profile_image: Option<&Attachment>,
        documents: &[Attachment],
    ) -> Result<(Option<String>, Vec<StagedDocument>), WorkflowError> {
        let image = async {
            match profile_image {
                Some(image) => self
                    .upload(user_id, UploadCategory::Profile, image)
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };

        let docs = try_join_all(documents.iter().map(|doc| async move {
            let url = self.upload(user_id, UploadCategory::Document, doc).await?;
            Ok::<_, WorkflowError>(StagedDocument {
                url,
                name: doc.file_name.clone(),
                file_type: doc.extension(),
            })
        }));

        try_join(image, docs).await
    }

    async fn upload(
        &self,
        user_id: &str,
        category: UploadCategory,
        attachment: &Attachment,
    ) -> Result<String, WorkflowError> {
        self.storage
            .put(user_id, category, attachment)
            .await
            .map_err(|e| {
                warn!(user_id = %user_id, file = %attachment.file_name, "Upload failed: {e}");
                WorkflowError::UploadFailed {
                    file_name: attachment.file_name.clone(),
                    reason: e.to_string(),
                }
            })
    }
}

fn current_state(employee: &Employee, session: Option<&StagingSession>) -> WorkflowState {
    WorkflowState::derive(
        employee.is_submitted,
        session.is_some(),
        session.is_some_and(|s| s.challenge.is_some()),
    )
}

fn log_transition(user_id: &str, from: WorkflowState, to: WorkflowState) {
    debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
    debug!(user_id = %user_id, %from, %to, "Workflow transition");
}
