//! In-process [`UserStore`] with the same semantics as the PostgreSQL store:
//! unique-constraint conflicts, set/unset documents, and the conditional
//! refresh update. Flow tests and local demos run against this instead of a
//! database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::SystemTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{
    FieldUpdate, LoginRecord, NewUser, RefreshRecord, ResetRecord, StoreError, UserIdentifier,
    UserRecord, UserStore, UserUpdate, VerificationRecord,
};

#[derive(Debug, Clone)]
struct StoredUser {
    id: Uuid,
    first_name: String,
    last_name: String,
    username: String,
    email: String,
    password_hash: String,
    is_verified: bool,
    verification_token_hash: Option<Vec<u8>>,
    reset_password_token_hash: Option<Vec<u8>>,
    refresh_token_hash: Option<Vec<u8>>,
    last_login_at: Option<SystemTime>,
}

impl StoredUser {
    fn record(&self) -> UserRecord {
        UserRecord {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            is_verified: self.is_verified,
        }
    }

    fn matches(&self, identifier: &UserIdentifier) -> bool {
        match identifier {
            UserIdentifier::Username(username) => self.username == *username,
            UserIdentifier::Email(email) => self.email == *email,
        }
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, StoredUser>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last login timestamp for an account, if any. Test hook.
    pub async fn last_login_at(&self, id: Uuid) -> Option<SystemTime> {
        let users = self.users.lock().await;
        users.get(&id).and_then(|user| user.last_login_at)
    }
}

fn apply_field(slot: &mut Option<Vec<u8>>, update: &FieldUpdate<Vec<u8>>) {
    match update {
        FieldUpdate::Keep => {}
        FieldUpdate::Set(value) => *slot = Some(value.clone()),
        FieldUpdate::Clear => *slot = None,
    }
}

fn apply_update(user: &mut StoredUser, update: &UserUpdate) {
    if let Some(is_verified) = update.is_verified {
        user.is_verified = is_verified;
    }
    if let Some(password_hash) = &update.password_hash {
        user.password_hash = password_hash.clone();
    }
    if update.touch_last_login {
        user.last_login_at = Some(SystemTime::now());
    }
    apply_field(&mut user.verification_token_hash, &update.verification_token_hash);
    apply_field(
        &mut user.reset_password_token_hash,
        &update.reset_password_token_hash,
    );
    apply_field(&mut user.refresh_token_hash, &update.refresh_token_hash);
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_identifier(
        &self,
        identifier: &UserIdentifier,
    ) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|user| user.matches(identifier))
            .map(StoredUser::record))
    }

    async fn find_for_login(
        &self,
        identifier: &UserIdentifier,
    ) -> Result<Option<LoginRecord>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.values().find(|user| user.matches(identifier)).map(|user| {
            LoginRecord {
                user: user.record(),
                password_hash: user.password_hash.clone(),
            }
        }))
    }

    async fn find_for_verification(
        &self,
        username: &str,
    ) -> Result<Option<VerificationRecord>, StoreError> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|user| user.username == username)
            .map(|user| VerificationRecord {
                user: user.record(),
                verification_token_hash: user.verification_token_hash.clone(),
            }))
    }

    async fn find_for_reset(&self, username: &str) -> Result<Option<ResetRecord>, StoreError> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|user| user.username == username)
            .map(|user| ResetRecord {
                user: user.record(),
                reset_password_token_hash: user.reset_password_token_hash.clone(),
                password_hash: user.password_hash.clone(),
            }))
    }

    async fn find_for_refresh(&self, id: Uuid) -> Result<Option<RefreshRecord>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.get(&id).map(|user| RefreshRecord {
            user: user.record(),
            refresh_token_hash: user.refresh_token_hash.clone(),
        }))
    }

    async fn create(&self, new_user: NewUser) -> Result<UserRecord, StoreError> {
        let mut users = self.users.lock().await;
        if users.values().any(|user| user.username == new_user.username) {
            return Err(StoreError::Conflict { field: "username" });
        }
        if users.values().any(|user| user.email == new_user.email) {
            return Err(StoreError::Conflict { field: "email" });
        }
        let user = StoredUser {
            id: Uuid::new_v4(),
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            is_verified: false,
            verification_token_hash: Some(new_user.verification_token_hash),
            reset_password_token_hash: None,
            refresh_token_hash: None,
            last_login_at: None,
        };
        let record = user.record();
        users.insert(user.id, user);
        Ok(record)
    }

    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<bool, StoreError> {
        let mut users = self.users.lock().await;
        match users.get_mut(&id) {
            Some(user) => {
                apply_update(user, &update);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_if_refresh_hash(
        &self,
        id: Uuid,
        expected_hash: &[u8],
        update: UserUpdate,
    ) -> Result<bool, StoreError> {
        // Compare and apply under one lock, mirroring the single conditional
        // UPDATE the PostgreSQL store issues.
        let mut users = self.users.lock().await;
        match users.get_mut(&id) {
            Some(user) if user.refresh_token_hash.as_deref() == Some(expected_hash) => {
                apply_update(user, &update);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
