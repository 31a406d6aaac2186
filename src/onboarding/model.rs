//! Employee, document, and staged-profile data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkflowError;

/// Durable employee record, owned by exactly one user identity.
///
/// Created at account provisioning with only `email` set; the profile
/// fields are written by the workflow's commit step and cleared on reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Employee {
    pub id: Uuid,
    /// Opaque identity supplied by the auth provider.
    pub user_id: String,
    pub name: Option<String>,
    pub email: String,
    pub department: Option<String>,
    pub profile_image_url: Option<String>,
    pub is_submitted: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Employee {
    pub fn new(user_id: &str, email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: None,
            email: email.to_string(),
            department: None,
            profile_image_url: None,
            is_submitted: false,
            submitted_at: None,
            created_at: Utc::now(),
        }
    }
}

/// A committed supporting document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub file_url: String,
    pub file_name: String,
    /// Lower-cased file extension, e.g. "pdf".
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Profile form fields as submitted by the employee.
#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub name: String,
    pub email: String,
    pub department: String,
}

impl ProfileForm {
    pub fn new(name: &str, email: &str, department: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            department: department.to_string(),
        }
    }

    /// Trim every field and reject empty values or a malformed email.
    pub fn validated(&self) -> Result<ProfileForm, WorkflowError> {
        let trimmed = ProfileForm {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            department: self.department.trim().to_string(),
        };

        for (field, value) in [
            ("name", &trimmed.name),
            ("email", &trimmed.email),
            ("department", &trimmed.department),
        ] {
            if value.is_empty() {
                return Err(WorkflowError::Validation {
                    field: field.to_string(),
                });
            }
        }

        if trimmed.email.parse::<lettre::Address>().is_err() {
            return Err(WorkflowError::Validation {
                field: "email".to_string(),
            });
        }

        Ok(trimmed)
    }
}

/// Profile values staged for commit but not yet durable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagedProfile {
    pub name: String,
    pub email: String,
    pub department: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
}

impl StagedProfile {
    pub fn from_form(form: ProfileForm, profile_image_url: Option<String>) -> Self {
        Self {
            name: form.name,
            email: form.email,
            department: form.department,
            profile_image_url,
        }
    }
}

/// An uploaded document awaiting commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagedDocument {
    pub url: String,
    /// Original filename as uploaded.
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: String,
}
