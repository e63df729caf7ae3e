//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::AuthError;
use super::store::UserRecord;
use super::utils::{valid_email, valid_username};

const NAME_RANGE: std::ops::RangeInclusive<usize> = 2..=20;
const PASSWORD_RANGE: std::ops::RangeInclusive<usize> = 8..=15;

fn check_name(name: &str, message: &'static str) -> Result<(), AuthError> {
    if NAME_RANGE.contains(&name.trim().chars().count()) {
        Ok(())
    } else {
        Err(AuthError::Validation(message))
    }
}

fn check_password(password: &str, confirmation: &str) -> Result<(), AuthError> {
    if !PASSWORD_RANGE.contains(&password.chars().count()) {
        return Err(AuthError::Validation(
            "Password must be between 8 and 15 characters.",
        ));
    }
    if password != confirmation {
        return Err(AuthError::Validation("Passwords do not match."));
    }
    Ok(())
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

impl SignupRequest {
    pub(super) fn validate(&self) -> Result<(), AuthError> {
        check_name(
            &self.first_name,
            "First name must be between 2 and 20 characters.",
        )?;
        check_name(
            &self.last_name,
            "Last name must be between 2 and 20 characters.",
        )?;
        if !valid_username(&self.username) {
            return Err(AuthError::Validation(
                "Username must be 3 to 8 lowercase letters or digits.",
            ));
        }
        if !valid_email(self.email.trim()) {
            return Err(AuthError::Validation("A valid email address is required."));
        }
        check_password(&self.password, &self.password_confirmation)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub password_confirmation: String,
}

impl ResetPasswordRequest {
    pub(super) fn validate(&self) -> Result<(), AuthError> {
        check_password(&self.password, &self.password_confirmation)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupResponse {
    pub message: String,
    pub email_sent: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
}

impl From<&UserRecord> for UserSummary {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.to_string(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user: UserSummary,
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    fn signup() -> SignupRequest {
        SignupRequest {
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            username: "alice1".to_string(),
            email: "alice@example.com".to_string(),
            password: "sup3rS3cret".to_string(),
            password_confirmation: "sup3rS3cret".to_string(),
        }
    }

    #[test]
    fn signup_request_round_trips() -> Result<()> {
        let value = serde_json::to_value(signup())?;
        let email = value
            .get("email")
            .and_then(serde_json::Value::as_str)
            .context("missing email")?;
        assert_eq!(email, "alice@example.com");
        let decoded: SignupRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.username, "alice1");
        Ok(())
    }

    #[test]
    fn signup_accepts_valid_payload() {
        assert!(signup().validate().is_ok());
    }

    #[test]
    fn signup_rejects_out_of_range_fields() {
        let mut request = signup();
        request.first_name = "A".to_string();
        assert!(request.validate().is_err());

        let mut request = signup();
        request.last_name = "x".repeat(21);
        assert!(request.validate().is_err());

        let mut request = signup();
        request.username = "Alice".to_string();
        assert!(request.validate().is_err());

        let mut request = signup();
        request.email = "not-an-email".to_string();
        assert!(request.validate().is_err());

        let mut request = signup();
        request.password = "short".to_string();
        request.password_confirmation = "short".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn signup_rejects_password_mismatch() {
        let mut request = signup();
        request.password_confirmation = "different1".to_string();
        match request.validate() {
            Err(AuthError::Validation(message)) => {
                assert_eq!(message, "Passwords do not match.");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn name_bounds_apply_after_trimming() {
        let mut request = signup();
        request.first_name = "  Jo  ".to_string();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn reset_password_request_validates_bounds() {
        let request = ResetPasswordRequest {
            password: "longEnough1".to_string(),
            password_confirmation: "longEnough1".to_string(),
        };
        assert!(request.validate().is_ok());

        let request = ResetPasswordRequest {
            password: "x".repeat(16),
            password_confirmation: "x".repeat(16),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn user_summary_borrows_from_record() -> Result<()> {
        let record = UserRecord {
            id: uuid::Uuid::new_v4(),
            first_name: "Bob".to_string(),
            last_name: "Jones".to_string(),
            username: "bob42".to_string(),
            email: "bob@example.com".to_string(),
            is_verified: true,
        };
        let summary = UserSummary::from(&record);
        assert_eq!(summary.id, record.id.to_string());
        let value = serde_json::to_value(&summary)?;
        let id = value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .context("missing id")?;
        assert_eq!(id, record.id.to_string());
        Ok(())
    }
}
