//! Configuration types, built from environment variables.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Top-level portal configuration.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub server: ServerConfig,
    /// Path to the libSQL database file.
    pub database_path: String,
    pub storage: StorageConfig,
    pub mail: MailConfig,
    pub workflow: WorkflowConfig,
    /// Shared secret required on admin routes (open when unset).
    pub admin_token: Option<SecretString>,
}

impl PortalConfig {
    /// Load configuration, reading a `.env` file first if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let server = ServerConfig {
            host: env_or("PORTAL_HOST", "0.0.0.0"),
            port: parse_env("PORTAL_PORT", 8080)?,
        };

        Ok(Self {
            server,
            database_path: env_or("PORTAL_DB_PATH", "./data/onboarding.db"),
            storage: StorageConfig::from_env()?,
            mail: MailConfig::from_env()?,
            workflow: WorkflowConfig::from_env()?,
            admin_token: std::env::var("PORTAL_ADMIN_TOKEN")
                .ok()
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
        })
    }
}

/// HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Object storage settings (S3-compatible bucket).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// S3 service endpoint, without the bucket name.
    pub endpoint: String,
    /// Address the bucket as `{endpoint}/{bucket}` rather than as a
    /// subdomain of the endpoint.
    pub path_style: bool,
    /// Base URL objects are publicly served from.
    pub public_base_url: String,
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bucket = require_env("S3_BUCKET_NAME")?;
        let region = env_or("AWS_REGION", "us-east-1");
        let custom_endpoint = std::env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty());
        // Self-hosted S3 (MinIO and friends) usually only speaks path style.
        let path_style = parse_env("S3_PATH_STYLE", custom_endpoint.is_some())?;
        let endpoint =
            custom_endpoint.unwrap_or_else(|| format!("https://s3.{region}.amazonaws.com"));
        let public_base_url = std::env::var("S3_PUBLIC_URL")
            .unwrap_or_else(|_| format!("https://{bucket}.s3.amazonaws.com"));

        Ok(Self {
            bucket,
            region,
            endpoint,
            path_style,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            secret_access_key: SecretString::from(require_env("AWS_SECRET_ACCESS_KEY")?),
        })
    }
}

/// Outbound SMTP settings for passcode delivery.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl MailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = require_env("MAIL_USERNAME")?;
        let password = SecretString::from(require_env("MAIL_PASSWORD")?);
        let from_address = std::env::var("MAIL_FROM").unwrap_or_else(|_| username.clone());

        Ok(Self {
            smtp_host: env_or("MAIL_SERVER", "smtp.gmail.com"),
            smtp_port: parse_env("MAIL_PORT", 587)?,
            username,
            password,
            from_address,
        })
    }
}

/// Tunables for the submission workflow.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Verification attempts allowed per issued passcode.
    pub max_attempts: u32,
    /// How long an issued passcode stays valid.
    pub passcode_ttl: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            passcode_ttl: Duration::from_secs(600), // 10 minutes
        }
    }
}

impl WorkflowConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_attempts = parse_env("PORTAL_OTP_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PORTAL_OTP_MAX_ATTEMPTS".into(),
                message: "must be at least 1".into(),
            });
        }
        let ttl_secs = parse_env("PORTAL_OTP_TTL_SECS", defaults.passcode_ttl.as_secs())?;

        Ok(Self {
            max_attempts,
            passcode_ttl: Duration::from_secs(ttl_secs),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
