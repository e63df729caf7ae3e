//! Token codec: four classes of signed, expiring JWTs.
//!
//! Each class carries its own secret, audience, issuer, and lifetime. Claims
//! shapes are disjoint per class and never co-mingled; presenting a token of
//! one class where another is expected fails on the audience check before the
//! payload shape is even considered.

use anyhow::{Context, Result};
use base64::Engine;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use rand::{RngCore, rngs::OsRng};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use super::state::AuthConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenClass {
    Verification,
    ResetPassword,
    Access,
    Refresh,
}

impl TokenClass {
    pub(crate) const ALL: [Self; 4] = [
        Self::Verification,
        Self::ResetPassword,
        Self::Access,
        Self::Refresh,
    ];

    /// Short name used in URNs and log fields.
    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Verification => "verification",
            Self::ResetPassword => "resetPassword",
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }

    pub(crate) const fn audience(self) -> &'static str {
        match self {
            Self::Verification => "urn:jwt:type:verification",
            Self::ResetPassword => "urn:jwt:type:resetPassword",
            Self::Access => "urn:jwt:type:access",
            Self::Refresh => "urn:jwt:type:refresh",
        }
    }

    pub(crate) const fn issuer(self) -> &'static str {
        match self {
            Self::Verification => "urn:system:token-issuer:type:verification",
            Self::ResetPassword => "urn:system:token-issuer:type:resetPassword",
            Self::Access => "urn:system:token-issuer:type:access",
            Self::Refresh => "urn:system:token-issuer:type:refresh",
        }
    }
}

/// Claims for verification and resetPassword tokens. The two classes share a
/// shape; the audience/issuer pair keeps them apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct EmailClaims {
    pub(crate) username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AccessClaims {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RefreshClaims {
    pub(crate) id: String,
}

/// Registered claims wrapped around every class-specific payload.
#[derive(Debug, Serialize, Deserialize)]
struct SignedClaims<C> {
    #[serde(flatten)]
    claims: C,
    exp: u64,
    iat: u64,
    nbf: u64,
    jti: String,
    aud: String,
    iss: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("invalid token")]
    Invalid,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            _ => Self::Invalid,
        }
    }
}

struct ClassKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_seconds: u64,
}

/// Signs and verifies tokens for all four classes.
///
/// Built once from [`AuthConfig`] at startup; key material never leaves it.
pub(crate) struct TokenCodec {
    verification: ClassKeys,
    reset_password: ClassKeys,
    access: ClassKeys,
    refresh: ClassKeys,
}

impl TokenCodec {
    #[must_use]
    pub(crate) fn from_config(config: &AuthConfig) -> Self {
        Self {
            verification: class_keys(config, TokenClass::Verification),
            reset_password: class_keys(config, TokenClass::ResetPassword),
            access: class_keys(config, TokenClass::Access),
            refresh: class_keys(config, TokenClass::Refresh),
        }
    }

    fn keys(&self, class: TokenClass) -> &ClassKeys {
        match class {
            TokenClass::Verification => &self.verification,
            TokenClass::ResetPassword => &self.reset_password,
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    /// Lifetime of tokens of `class`, in seconds.
    pub(crate) fn ttl_seconds(&self, class: TokenClass) -> u64 {
        self.keys(class).ttl_seconds
    }

    /// Sign `claims` as a token of `class`, valid from now.
    pub(crate) fn sign<C: Serialize>(&self, class: TokenClass, claims: &C) -> Result<String> {
        self.sign_at(class, claims, unix_now()?)
    }

    /// Sign with an explicit issue time. Tests mint expired or not-yet-valid
    /// tokens through this without sleeping.
    pub(super) fn sign_at<C: Serialize>(
        &self,
        class: TokenClass,
        claims: &C,
        issued_at: u64,
    ) -> Result<String> {
        let keys = self.keys(class);
        let envelope = SignedClaims {
            claims,
            exp: issued_at + keys.ttl_seconds,
            iat: issued_at,
            nbf: issued_at,
            jti: generate_jti()?,
            aud: class.audience().to_string(),
            iss: class.issuer().to_string(),
        };
        encode(&Header::default(), &envelope, &keys.encoding)
            .with_context(|| format!("failed to sign {} token", class.name()))
    }

    /// Verify a raw token of `class` against the real clock and return its
    /// class-specific claims.
    pub(crate) fn verify<C: DeserializeOwned>(
        &self,
        class: TokenClass,
        raw: &str,
    ) -> Result<C, TokenError> {
        let keys = self.keys(class);
        let data = decode::<SignedClaims<C>>(raw, &keys.decoding, &keys.validation)?;
        Ok(data.claims.claims)
    }
}

fn class_keys(config: &AuthConfig, class: TokenClass) -> ClassKeys {
    let secret = config.token_secret(class).expose_secret().as_bytes();

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[class.audience()]);
    validation.set_issuer(&[class.issuer()]);
    // Short-lived tokens; no clock slack between sign and verify.
    validation.leeway = 0;
    validation.validate_nbf = true;

    ClassKeys {
        encoding: EncodingKey::from_secret(secret),
        decoding: DecodingKey::from_secret(secret),
        validation,
        ttl_seconds: config.token_minutes(class) * 60,
    }
}

fn generate_jti() -> Result<String> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token id")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

pub(super) fn unix_now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the unix epoch")?
        .as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::{AuthConfig, test_secrets};
    use anyhow::Result;

    fn test_codec() -> TokenCodec {
        let config = AuthConfig::new("http://localhost:5173", test_secrets());
        TokenCodec::from_config(&config)
    }

    #[test]
    fn round_trip_per_class() -> Result<()> {
        let codec = test_codec();

        let email = EmailClaims {
            username: "alice1".to_string(),
        };
        let raw = codec.sign(TokenClass::Verification, &email)?;
        assert_eq!(raw.split('.').count(), 3);
        let decoded: EmailClaims = codec.verify(TokenClass::Verification, &raw)?;
        assert_eq!(decoded, email);

        let access = AccessClaims {
            id: "018f9b2e-0000-7000-8000-000000000000".to_string(),
            username: "alice1".to_string(),
            email: "alice@example.com".to_string(),
        };
        let raw = codec.sign(TokenClass::Access, &access)?;
        let decoded: AccessClaims = codec.verify(TokenClass::Access, &raw)?;
        assert_eq!(decoded, access);

        let refresh = RefreshClaims {
            id: access.id.clone(),
        };
        let raw = codec.sign(TokenClass::Refresh, &refresh)?;
        let decoded: RefreshClaims = codec.verify(TokenClass::Refresh, &raw)?;
        assert_eq!(decoded, refresh);

        Ok(())
    }

    #[test]
    fn expired_token_reports_expired() -> Result<()> {
        let codec = test_codec();
        let claims = EmailClaims {
            username: "alice1".to_string(),
        };
        let ttl = codec.ttl_seconds(TokenClass::Verification);
        let issued_at = unix_now()? - ttl - 10;
        let raw = codec.sign_at(TokenClass::Verification, &claims, issued_at)?;
        let result = codec.verify::<EmailClaims>(TokenClass::Verification, &raw);
        assert_eq!(result.unwrap_err(), TokenError::Expired);
        Ok(())
    }

    #[test]
    fn future_token_reports_not_yet_valid() -> Result<()> {
        let codec = test_codec();
        let claims = RefreshClaims {
            id: "018f9b2e-0000-7000-8000-000000000000".to_string(),
        };
        let issued_at = unix_now()? + 300;
        let raw = codec.sign_at(TokenClass::Refresh, &claims, issued_at)?;
        let result = codec.verify::<RefreshClaims>(TokenClass::Refresh, &raw);
        assert_eq!(result.unwrap_err(), TokenError::NotYetValid);
        Ok(())
    }

    #[test]
    fn cross_class_token_is_invalid() -> Result<()> {
        let codec = test_codec();
        let claims = EmailClaims {
            username: "alice1".to_string(),
        };
        // Same claims shape as resetPassword, signed for verification: the
        // audience/issuer pin must reject it.
        let raw = codec.sign(TokenClass::Verification, &claims)?;
        let result = codec.verify::<EmailClaims>(TokenClass::ResetPassword, &raw);
        assert_eq!(result.unwrap_err(), TokenError::Invalid);
        Ok(())
    }

    #[test]
    fn tampered_token_is_invalid() -> Result<()> {
        let codec = test_codec();
        let claims = EmailClaims {
            username: "alice1".to_string(),
        };
        let raw = codec.sign(TokenClass::Verification, &claims)?;
        let mut tampered = raw.into_bytes();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered)?;
        let result = codec.verify::<EmailClaims>(TokenClass::Verification, &tampered);
        assert_eq!(result.unwrap_err(), TokenError::Invalid);
        Ok(())
    }

    #[test]
    fn malformed_token_is_invalid() {
        let codec = test_codec();
        let result = codec.verify::<EmailClaims>(TokenClass::Access, "not-a-jwt");
        assert_eq!(result.unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn wrong_shape_is_invalid() -> Result<()> {
        let codec = test_codec();
        let claims = RefreshClaims {
            id: "018f9b2e-0000-7000-8000-000000000000".to_string(),
        };
        let raw = codec.sign(TokenClass::Refresh, &claims)?;
        // Right class, wrong expected payload shape.
        let result = codec.verify::<AccessClaims>(TokenClass::Refresh, &raw);
        assert_eq!(result.unwrap_err(), TokenError::Invalid);
        Ok(())
    }

    #[test]
    fn class_urns_are_distinct() {
        for (i, a) in TokenClass::ALL.iter().enumerate() {
            for b in &TokenClass::ALL[i + 1..] {
                assert_ne!(a.audience(), b.audience());
                assert_ne!(a.issuer(), b.issuer());
            }
        }
    }
}
