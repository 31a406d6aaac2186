//! Error types for the onboarding portal.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl DatabaseError {
    /// Classify a libsql error, surfacing UNIQUE/FOREIGN KEY failures as
    /// constraint violations.
    pub(crate) fn from_libsql(context: &str, err: libsql::Error) -> Self {
        let text = err.to_string();
        if text.contains("constraint failed") {
            Self::Constraint(format!("{context}: {text}"))
        } else {
            Self::Query(format!("{context}: {text}"))
        }
    }
}

/// Object storage gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload of {key} failed: {reason}")]
    Request { key: String, reason: String },

    #[error("Storage rejected {key} with status {status}: {body}")]
    Rejected {
        key: String,
        status: u16,
        body: String,
    },

    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),
}

/// Notification sink errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Transport failed: {0}")]
    Transport(String),
}

/// Caller-facing failures of the onboarding workflow.
///
/// Every workflow operation returns either its success payload or exactly
/// one of these kinds.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Invalid or missing field: {field}")]
    Validation { field: String },

    #[error("Error uploading {file_name}: {reason}")]
    UploadFailed { file_name: String, reason: String },

    #[error("Failed to send passcode: {reason}")]
    DeliveryFailed { reason: String },

    #[error("Invalid passcode ({attempts} attempts used, {remaining} remaining)")]
    InvalidCode { attempts: u32, remaining: u32 },

    #[error("Too many failed attempts, please restart the process")]
    AttemptsExceeded,

    #[error("Passcode expired, request a new one")]
    ChallengeExpired,

    #[error("Profile has already been submitted")]
    AlreadySubmitted,

    #[error("No staged profile, complete the profile form first")]
    NothingStaged,

    #[error("No passcode has been issued")]
    NoChallenge,

    #[error("Employee record not found for user {user_id}")]
    EmployeeNotFound { user_id: String },

    #[error("Error saving data: {0}")]
    WriteError(String),

    #[error("Record store unavailable: {0}")]
    Database(String),
}

impl WorkflowError {
    /// Stable snake_case identifier for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::UploadFailed { .. } => "upload_failed",
            Self::DeliveryFailed { .. } => "delivery_failed",
            Self::InvalidCode { .. } => "invalid_code",
            Self::AttemptsExceeded => "attempts_exceeded",
            Self::ChallengeExpired => "challenge_expired",
            Self::AlreadySubmitted => "already_submitted",
            Self::NothingStaged => "nothing_staged",
            Self::NoChallenge => "no_challenge",
            Self::EmployeeNotFound { .. } => "employee_not_found",
            Self::WriteError(_) => "write_error",
            Self::Database(_) => "database_error",
        }
    }

    /// Whether the employee can recover without restarting staging.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::AttemptsExceeded | Self::AlreadySubmitted)
    }
}
