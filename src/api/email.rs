//! Email delivery abstractions for the verification and reset flows.
//!
//! Handlers build an [`EmailMessage`] naming a frontend template and a JSON
//! payload (recipient name plus the link carrying the one-shot token), then
//! hand it to an [`EmailSender`]. The sender decides how to deliver (SMTP,
//! API, etc.) and returns `Ok`/`Err`; flows that tolerate delivery failure
//! log and move on, the rest surface the error.
//!
//! The default sender for local dev is `LogEmailSender`, which logs and
//! returns `Ok(())`.

use anyhow::Result;
use tracing::info;

pub const VERIFY_EMAIL_TEMPLATE: &str = "verify-email";
pub const RESET_PASSWORD_TEMPLATE: &str = "reset-password";

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

impl EmailMessage {
    /// Account-verification email pointing at the frontend verify page.
    #[must_use]
    pub fn verification(to_email: &str, username: &str, link: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: VERIFY_EMAIL_TEMPLATE.to_string(),
            payload_json: serde_json::json!({
                "username": username,
                "link": link,
            })
            .to_string(),
        }
    }

    /// Password-reset email pointing at the frontend reset page.
    #[must_use]
    pub fn password_reset(to_email: &str, username: &str, link: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: RESET_PASSWORD_TEMPLATE.to_string(),
            payload_json: serde_json::json!({
                "username": username,
                "link": link,
            })
            .to_string(),
        }
    }
}

/// Email delivery abstraction used by the auth flows.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error so the caller can decide
    /// whether the flow tolerates the failure.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn verification_message_carries_link() -> Result<()> {
        let message = EmailMessage::verification(
            "alice@example.com",
            "alice1",
            "http://localhost:5173/verify-email#token=abc",
        );
        assert_eq!(message.to_email, "alice@example.com");
        assert_eq!(message.template, VERIFY_EMAIL_TEMPLATE);
        let payload: serde_json::Value = serde_json::from_str(&message.payload_json)?;
        let link = payload
            .get("link")
            .and_then(serde_json::Value::as_str)
            .context("missing link")?;
        assert!(link.ends_with("#token=abc"));
        Ok(())
    }

    #[test]
    fn reset_message_uses_reset_template() -> Result<()> {
        let message = EmailMessage::password_reset(
            "bob@example.com",
            "bob42",
            "http://localhost:5173/reset-password#token=xyz",
        );
        assert_eq!(message.template, RESET_PASSWORD_TEMPLATE);
        let payload: serde_json::Value = serde_json::from_str(&message.payload_json)?;
        let username = payload
            .get("username")
            .and_then(serde_json::Value::as_str)
            .context("missing username")?;
        assert_eq!(username, "bob42");
        Ok(())
    }

    #[test]
    fn log_sender_accepts_messages() {
        let sender = LogEmailSender;
        let message = EmailMessage::verification("a@b.co", "abc", "http://x/verify-email#token=t");
        assert!(sender.send(&message).is_ok());
    }
}
