//! PostgreSQL-backed [`UserStore`].
//!
//! Every query runs inside a `db.query` span carrying the statement text.
//! Update documents compile to a single `UPDATE`; the conditional refresh
//! variant folds its precondition into the `WHERE` clause so rotation races
//! resolve inside the database, not in application code.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::store::{
    FieldUpdate, LoginRecord, NewUser, RefreshRecord, ResetRecord, StoreError, UserIdentifier,
    UserRecord, UserStore, UserUpdate, VerificationRecord,
};
use super::utils::is_unique_violation;

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_record(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        username: row.get("username"),
        email: row.get("email"),
        is_verified: row.get("is_verified"),
    }
}

fn identifier_value(identifier: &UserIdentifier) -> &str {
    match identifier {
        UserIdentifier::Username(username) => username,
        UserIdentifier::Email(email) => email,
    }
}

/// Column name on the violated unique constraint, for logs.
fn conflict_field(err: &sqlx::Error) -> &'static str {
    match err {
        sqlx::Error::Database(db_err) => match db_err.constraint() {
            Some(name) if name.contains("username") => "username",
            Some(name) if name.contains("email") => "email",
            _ => "account",
        },
        _ => "account",
    }
}

/// Build the `UPDATE` for a set/unset document. With `expected_refresh_hash`
/// the statement only matches while the stored refresh digest is unchanged.
fn update_builder(
    id: Uuid,
    update: UserUpdate,
    expected_refresh_hash: Option<&[u8]>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("UPDATE users SET updated_at = NOW()");

    if let Some(is_verified) = update.is_verified {
        builder.push(", is_verified = ");
        builder.push_bind(is_verified);
    }
    if let Some(password_hash) = update.password_hash {
        builder.push(", password_hash = ");
        builder.push_bind(password_hash);
    }
    if update.touch_last_login {
        builder.push(", last_login_at = NOW()");
    }
    push_field(
        &mut builder,
        "verification_token_hash",
        update.verification_token_hash,
    );
    push_field(
        &mut builder,
        "reset_password_token_hash",
        update.reset_password_token_hash,
    );
    push_field(&mut builder, "refresh_token_hash", update.refresh_token_hash);

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    if let Some(expected) = expected_refresh_hash {
        builder.push(" AND refresh_token_hash = ");
        builder.push_bind(expected.to_vec());
    }
    builder
}

fn push_field(
    builder: &mut QueryBuilder<'static, Postgres>,
    column: &str,
    update: FieldUpdate<Vec<u8>>,
) {
    match update {
        FieldUpdate::Keep => {}
        FieldUpdate::Set(value) => {
            builder.push(format!(", {column} = "));
            builder.push_bind(value);
        }
        FieldUpdate::Clear => {
            builder.push(format!(", {column} = NULL"));
        }
    }
}

impl PgUserStore {
    async fn fetch_record(
        &self,
        query: &'static str,
        bind: &str,
    ) -> Result<Option<PgRow>, StoreError> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to query user")?;
        Ok(row)
    }

    async fn run_update(
        &self,
        id: Uuid,
        update: UserUpdate,
        expected_refresh_hash: Option<&[u8]>,
    ) -> Result<bool, StoreError> {
        let mut builder = update_builder(id, update, expected_refresh_hash);
        let statement = builder.sql().to_string();
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = statement.as_str()
        );
        let result = builder
            .build()
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update user")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_identifier(
        &self,
        identifier: &UserIdentifier,
    ) -> Result<Option<UserRecord>, StoreError> {
        let query = match identifier {
            UserIdentifier::Username(_) => {
                "SELECT id, first_name, last_name, username, email, is_verified \
                 FROM users WHERE username = $1"
            }
            UserIdentifier::Email(_) => {
                "SELECT id, first_name, last_name, username, email, is_verified \
                 FROM users WHERE email = $1"
            }
        };
        let row = self.fetch_record(query, identifier_value(identifier)).await?;
        Ok(row.as_ref().map(user_record))
    }

    async fn find_for_login(
        &self,
        identifier: &UserIdentifier,
    ) -> Result<Option<LoginRecord>, StoreError> {
        let query = match identifier {
            UserIdentifier::Username(_) => {
                "SELECT id, first_name, last_name, username, email, is_verified, password_hash \
                 FROM users WHERE username = $1"
            }
            UserIdentifier::Email(_) => {
                "SELECT id, first_name, last_name, username, email, is_verified, password_hash \
                 FROM users WHERE email = $1"
            }
        };
        let row = self.fetch_record(query, identifier_value(identifier)).await?;
        Ok(row.map(|row| LoginRecord {
            user: user_record(&row),
            password_hash: row.get("password_hash"),
        }))
    }

    async fn find_for_verification(
        &self,
        username: &str,
    ) -> Result<Option<VerificationRecord>, StoreError> {
        let query = "SELECT id, first_name, last_name, username, email, is_verified, \
                     verification_token_hash FROM users WHERE username = $1";
        let row = self.fetch_record(query, username).await?;
        Ok(row.map(|row| VerificationRecord {
            user: user_record(&row),
            verification_token_hash: row.get("verification_token_hash"),
        }))
    }

    async fn find_for_reset(&self, username: &str) -> Result<Option<ResetRecord>, StoreError> {
        let query = "SELECT id, first_name, last_name, username, email, is_verified, \
                     reset_password_token_hash, password_hash FROM users WHERE username = $1";
        let row = self.fetch_record(query, username).await?;
        Ok(row.map(|row| ResetRecord {
            user: user_record(&row),
            reset_password_token_hash: row.get("reset_password_token_hash"),
            password_hash: row.get("password_hash"),
        }))
    }

    async fn find_for_refresh(&self, id: Uuid) -> Result<Option<RefreshRecord>, StoreError> {
        let query = "SELECT id, first_name, last_name, username, email, is_verified, \
                     refresh_token_hash FROM users WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to query user")?;
        Ok(row.map(|row| RefreshRecord {
            user: user_record(&row),
            refresh_token_hash: row.get("refresh_token_hash"),
        }))
    }

    async fn create(&self, new_user: NewUser) -> Result<UserRecord, StoreError> {
        let query = "INSERT INTO users \
                     (first_name, last_name, username, email, password_hash, verification_token_hash) \
                     VALUES ($1, $2, $3, $4, $5, $6) \
                     RETURNING id, first_name, last_name, username, email, is_verified";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&new_user.first_name)
            .bind(&new_user.last_name)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&new_user.verification_token_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(user_record(&row)),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict {
                field: conflict_field(&err),
            }),
            Err(err) => Err(StoreError::Backend(
                anyhow::Error::new(err).context("failed to insert user"),
            )),
        }
    }

    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<bool, StoreError> {
        self.run_update(id, update, None).await
    }

    async fn update_if_refresh_hash(
        &self,
        id: Uuid,
        expected_hash: &[u8],
        update: UserUpdate,
    ) -> Result<bool, StoreError> {
        self.run_update(id, update, Some(expected_hash)).await
    }
}
