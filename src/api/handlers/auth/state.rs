//! Auth state and configuration.

use secrecy::SecretString;
use std::sync::Arc;

use super::store::UserStore;
use super::tokens::{TokenClass, TokenCodec};
use crate::api::email::EmailSender;

const DEFAULT_VERIFICATION_TOKEN_MINUTES: u64 = 15;
const DEFAULT_RESET_PASSWORD_TOKEN_MINUTES: u64 = 15;
const DEFAULT_ACCESS_TOKEN_MINUTES: u64 = 15;
const DEFAULT_REFRESH_TOKEN_MINUTES: u64 = 7 * 24 * 60;
const DEFAULT_REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Signing secrets, one per token class.
#[derive(Clone, Debug)]
pub struct TokenSecrets {
    pub verification: SecretString,
    pub reset_password: SecretString,
    pub access: SecretString,
    pub refresh: SecretString,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_origin: String,
    refresh_cookie_name: String,
    secrets: TokenSecrets,
    verification_token_minutes: u64,
    reset_password_token_minutes: u64,
    access_token_minutes: u64,
    refresh_token_minutes: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_origin: impl Into<String>, secrets: TokenSecrets) -> Self {
        Self {
            frontend_origin: frontend_origin.into(),
            refresh_cookie_name: DEFAULT_REFRESH_COOKIE_NAME.to_string(),
            secrets,
            verification_token_minutes: DEFAULT_VERIFICATION_TOKEN_MINUTES,
            reset_password_token_minutes: DEFAULT_RESET_PASSWORD_TOKEN_MINUTES,
            access_token_minutes: DEFAULT_ACCESS_TOKEN_MINUTES,
            refresh_token_minutes: DEFAULT_REFRESH_TOKEN_MINUTES,
        }
    }

    #[must_use]
    pub fn with_verification_token_minutes(mut self, minutes: u64) -> Self {
        self.verification_token_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_reset_password_token_minutes(mut self, minutes: u64) -> Self {
        self.reset_password_token_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_access_token_minutes(mut self, minutes: u64) -> Self {
        self.access_token_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_refresh_token_minutes(mut self, minutes: u64) -> Self {
        self.refresh_token_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_refresh_cookie_name(mut self, name: String) -> Self {
        self.refresh_cookie_name = name;
        self
    }

    pub(crate) fn frontend_origin(&self) -> &str {
        &self.frontend_origin
    }

    pub(super) fn refresh_cookie_name(&self) -> &str {
        &self.refresh_cookie_name
    }

    /// Cookies are `Secure` exactly when the frontend is served over https.
    pub(super) fn refresh_cookie_secure(&self) -> bool {
        self.frontend_origin.starts_with("https://")
    }

    pub(super) fn token_secret(&self, class: TokenClass) -> &SecretString {
        match class {
            TokenClass::Verification => &self.secrets.verification,
            TokenClass::ResetPassword => &self.secrets.reset_password,
            TokenClass::Access => &self.secrets.access,
            TokenClass::Refresh => &self.secrets.refresh,
        }
    }

    pub(super) fn token_minutes(&self, class: TokenClass) -> u64 {
        match class {
            TokenClass::Verification => self.verification_token_minutes,
            TokenClass::ResetPassword => self.reset_password_token_minutes,
            TokenClass::Access => self.access_token_minutes,
            TokenClass::Refresh => self.refresh_token_minutes,
        }
    }
}

pub struct AuthState {
    config: AuthConfig,
    codec: TokenCodec,
    store: Arc<dyn UserStore>,
    email: Arc<dyn EmailSender>,
}

impl AuthState {
    pub fn new(config: AuthConfig, store: Arc<dyn UserStore>, email: Arc<dyn EmailSender>) -> Self {
        let codec = TokenCodec::from_config(&config);
        Self {
            config,
            codec,
            store,
            email,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub(super) fn store(&self) -> &dyn UserStore {
        self.store.as_ref()
    }

    pub(super) fn email(&self) -> &dyn EmailSender {
        self.email.as_ref()
    }
}

#[cfg(test)]
pub(super) fn test_secrets() -> TokenSecrets {
    TokenSecrets {
        verification: "verification-secret".into(),
        reset_password: "reset-password-secret".into(),
        access: "access-secret".into(),
        refresh: "refresh-secret".into(),
    }
}
