//! Outbound email delivery
//!
//! Fire-and-forget SMTP sender for verification and password-reset
//! mail. Delivery failures are logged, never surfaced to the request
//! that triggered them. When no SMTP relay is configured, delivery is
//! disabled and sends become log entries.

use crate::config::EmailConfig;
use crate::errors::{AppError, Result};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

/// Asynchronous SMTP mailer
#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl Mailer {
    /// Create a mailer from configuration
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| AppError::Configuration {
                message: format!("Invalid from address: {}", e),
            })?;

        let transport = match &config.smtp_host {
            Some(host) => {
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .map_err(|e| AppError::Configuration {
                        message: format!("Invalid SMTP relay: {}", e),
                    })?
                    .port(config.smtp_port);

                if let (Some(username), Some(password)) =
                    (&config.smtp_username, &config.smtp_password)
                {
                    builder =
                        builder.credentials(Credentials::new(username.clone(), password.clone()));
                }

                Some(builder.build())
            }
            None => None,
        };

        Ok(Self { transport, from })
    }

    /// Dispatch an email without blocking the calling request.
    ///
    /// Failure is logged only.
    pub fn send(&self, to: &str, subject: &str, html_body: String) {
        let Some(transport) = self.transport.clone() else {
            tracing::info!(to = %to, subject = %subject, "Email delivery disabled, skipping send");
            return;
        };

        let to_mailbox: Mailbox = match to.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                tracing::warn!(to = %to, error = %e, "Invalid recipient address, dropping email");
                return;
            }
        };

        let message = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body);

        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build email, dropping");
                return;
            }
        };

        let to = to.to_string();
        let subject = subject.to_string();

        tokio::spawn(async move {
            match transport.send(message).await {
                Ok(_) => {
                    crate::metrics::record_email(true);
                    tracing::info!(to = %to, subject = %subject, "Email dispatched");
                }
                Err(e) => {
                    crate::metrics::record_email(false);
                    tracing::error!(to = %to, subject = %subject, error = %e, "Email delivery failed");
                }
            }
        });
    }

    /// Send the account-verification OTP
    pub fn send_verification_otp(&self, to: &str, username: &str, otp: &str) {
        self.send(
            to,
            "Verify your Cortexify account",
            verification_body(username, otp),
        );
    }

    /// Send a password-reset OTP
    pub fn send_reset_otp(&self, to: &str, username: &str, otp: &str) {
        self.send(
            to,
            "Reset your Cortexify password",
            reset_body(username, otp),
        );
    }
}

fn verification_body(username: &str, otp: &str) -> String {
    format!(
        "<p>Hi {username},</p>\
         <p>Your Cortexify verification code is:</p>\
         <h2>{otp}</h2>\
         <p>The code expires in 10 minutes. If you did not create an \
         account, you can ignore this email.</p>"
    )
}

fn reset_body(username: &str, otp: &str) -> String {
    format!(
        "<p>Hi {username},</p>\
         <p>Your Cortexify password reset code is:</p>\
         <h2>{otp}</h2>\
         <p>The code expires in 10 minutes. If you did not request a \
         reset, you can ignore this email.</p>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmailConfig;

    fn disabled_config() -> EmailConfig {
        EmailConfig {
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from_address: "no-reply@cortexify.app".to_string(),
        }
    }

    #[test]
    fn test_mailer_without_relay_is_disabled() {
        let mailer = Mailer::new(&disabled_config()).unwrap();
        assert!(mailer.transport.is_none());
    }

    #[test]
    fn test_invalid_from_address_rejected() {
        let config = EmailConfig {
            from_address: "not an address".to_string(),
            ..disabled_config()
        };
        assert!(Mailer::new(&config).is_err());
    }

    #[test]
    fn test_bodies_contain_otp() {
        assert!(verification_body("alice", "123456").contains("123456"));
        assert!(reset_body("alice", "654321").contains("654321"));
    }
}
