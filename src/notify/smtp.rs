//! SMTP notifier via lettre.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use super::Notifier;
use crate::config::MailConfig;
use crate::error::DeliveryError;

/// SMTP notifier. The transport is built once at startup
/// and reused for every message.
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &MailConfig) -> Result<Self, DeliveryError> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| DeliveryError::InvalidAddress {
                address: config.from_address.clone(),
                reason: format!("{e}"),
            })?;

        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::starttls_relay(&config.smtp_host)
            .map_err(|e| DeliveryError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self { transport, from })
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, DeliveryError> {
        let to: Mailbox = to.parse().map_err(|e| DeliveryError::InvalidAddress {
            address: to.to_string(),
            reason: format!("{e}"),
        })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let email = self.build_message(to, subject, body)?;
        let transport = self.transport.clone();

        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| DeliveryError::Transport(format!("send task failed: {e}")))?
            .map_err(|e| DeliveryError::Transport(format!("SMTP send failed: {e}")))?;

        tracing::info!(to = %to, "Email sent");
        Ok(())
    }
}
