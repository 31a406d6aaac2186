//! Notification sink: delivers passcode messages to employees.

pub mod smtp;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DeliveryError;

pub use smtp::SmtpNotifier;

/// Outbound message contract.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Subject line for passcode emails.
pub const PASSCODE_SUBJECT: &str = "Your OTP Code - Candidate Onboarding";

/// Render the passcode email as `(subject, body)`.
pub fn passcode_message(name: &str, code: &str, valid_for: Duration) -> (String, String) {
    let minutes = (valid_for.as_secs() / 60).max(1);
    let unit = if minutes == 1 { "minute" } else { "minutes" };
    let body = format!(
        "Hello {name},\n\n\
         Your OTP for profile submission is: {code}\n\n\
         This OTP is valid for {minutes} {unit}.\n\n\
         If you didn't request this, please ignore this email.\n\n\
         Best regards,\n\
         Candidate Onboarding System\n"
    );
    (PASSCODE_SUBJECT.to_string(), body)
}
