//! `Database` trait: the durable record store for employees and documents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::model::{Document, Employee, StagedDocument, StagedProfile};

/// Backend-agnostic database trait.
///
/// Only the workflow engine's commit and reset steps mutate profile state;
/// both run as a single transaction.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Employees ───────────────────────────────────────────────────

    /// Provision an employee record for a user identity.
    ///
    /// Fails with `DatabaseError::Constraint` if the user or email is
    /// already registered.
    async fn create_employee(&self, user_id: &str, email: &str) -> Result<Employee, DatabaseError>;

    /// Look up the employee owned by a user identity.
    async fn get_employee_by_user(&self, user_id: &str) -> Result<Option<Employee>, DatabaseError>;

    /// Look up the employee registered with an email address.
    async fn get_employee_by_email(&self, email: &str) -> Result<Option<Employee>, DatabaseError>;

    /// List all employees, oldest first.
    async fn list_employees(&self) -> Result<Vec<Employee>, DatabaseError>;

    // ── Documents ───────────────────────────────────────────────────

    /// List an employee's committed documents in upload order.
    async fn list_documents(&self, employee_id: Uuid) -> Result<Vec<Document>, DatabaseError>;

    // ── Workflow writes ─────────────────────────────────────────────

    /// Atomically write the staged profile and documents and mark the
    /// employee submitted at `submitted_at`. Nothing is written on error.
    async fn commit_profile(
        &self,
        employee_id: Uuid,
        profile: &StagedProfile,
        documents: &[StagedDocument],
        submitted_at: DateTime<Utc>,
    ) -> Result<Employee, DatabaseError>;

    /// Delete the employee's documents, clear profile fields and the
    /// submission flag.
    async fn reset_profile(&self, employee_id: Uuid) -> Result<(), DatabaseError>;
}
