//! Credential store seam.
//!
//! The auth flows speak to persistence through [`UserStore`]. Reads come in
//! purpose-scoped shapes so secret columns (password hash, token digests) are
//! only fetched by the flow that needs them; writes go through a set/unset
//! document applied to one row at a time.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Login identifier, already validated and normalized by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdentifier {
    Username(String),
    Email(String),
}

/// Account data safe for general reads. No secret columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub is_verified: bool,
}

/// Login read: the record plus the stored password hash.
#[derive(Debug, Clone)]
pub struct LoginRecord {
    pub user: UserRecord,
    pub password_hash: String,
}

/// Verification read: the record plus the stored verification digest.
#[derive(Debug, Clone)]
pub struct VerificationRecord {
    pub user: UserRecord,
    pub verification_token_hash: Option<Vec<u8>>,
}

/// Password-reset read: reset digest plus the current password hash, so the
/// reuse check can run without a second query.
#[derive(Debug, Clone)]
pub struct ResetRecord {
    pub user: UserRecord,
    pub reset_password_token_hash: Option<Vec<u8>>,
    pub password_hash: String,
}

/// Refresh/logout read: the record plus the stored refresh digest.
#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub user: UserRecord,
    pub refresh_token_hash: Option<Vec<u8>>,
}

/// Input to [`UserStore::create`]. The password is already hashed and the
/// verification digest already derived; the store never sees raw secrets.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub verification_token_hash: Vec<u8>,
}

/// Tri-state for nullable columns in an update document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

/// Set/unset document applied to a single account row.
///
/// `Default` touches nothing; flows list only the fields they change. Every
/// application also bumps `updated_at`.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub is_verified: Option<bool>,
    pub password_hash: Option<String>,
    pub touch_last_login: bool,
    pub verification_token_hash: FieldUpdate<Vec<u8>>,
    pub reset_password_token_hash: FieldUpdate<Vec<u8>>,
    pub refresh_token_hash: FieldUpdate<Vec<u8>>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-constraint violation on create. `field` names the colliding
    /// column for logs; HTTP responses stay generic.
    #[error("duplicate {field}")]
    Conflict { field: &'static str },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_identifier(
        &self,
        identifier: &UserIdentifier,
    ) -> Result<Option<UserRecord>, StoreError>;

    async fn find_for_login(
        &self,
        identifier: &UserIdentifier,
    ) -> Result<Option<LoginRecord>, StoreError>;

    async fn find_for_verification(
        &self,
        username: &str,
    ) -> Result<Option<VerificationRecord>, StoreError>;

    async fn find_for_reset(&self, username: &str) -> Result<Option<ResetRecord>, StoreError>;

    async fn find_for_refresh(&self, id: Uuid) -> Result<Option<RefreshRecord>, StoreError>;

    async fn create(&self, new_user: NewUser) -> Result<UserRecord, StoreError>;

    /// Apply `update` to the account. Returns whether a row matched.
    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<bool, StoreError>;

    /// Apply `update` only while the stored refresh digest still equals
    /// `expected_hash`. Returns `false` when a concurrent rotation already
    /// replaced it; exactly one of two racing refreshes sees `true`.
    async fn update_if_refresh_hash(
        &self,
        id: Uuid,
        expected_hash: &[u8],
        update: UserUpdate,
    ) -> Result<bool, StoreError>;
}
