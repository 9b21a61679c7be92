use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::{info_span, Instrument, Span};

use super::{
    ChallengeStore, CredentialStore, MfaMethod, MfaSettings, NewUser, UserRecord,
};
use crate::auth::role::Role;

const USER_COLUMNS: &str = r"
    u.id, u.email, u.password, u.name, u.phone, u.role::text AS role,
    u.organization_id, o.name AS organization_name,
    COALESCE(u.is_active, TRUE) AS is_active,
    u.email_verified, u.phone_verified,
    COALESCE(u.mfa_enabled, FALSE) AS mfa_enabled,
    u.mfa_method::text AS mfa_method, u.mfa_secret,
    u.last_login::timestamptz AS last_login,
    u.created_at::timestamptz AS created_at
";

fn db_span(operation: &'static str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord> {
    let role: String = row.try_get("role")?;
    let mfa_method: Option<String> = row.try_get("mfa_method")?;

    Ok(UserRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        role: role.parse::<Role>()?,
        organization_id: row.try_get("organization_id")?,
        organization_name: row.try_get("organization_name")?,
        is_active: row.try_get("is_active")?,
        email_verified: row.try_get("email_verified")?,
        phone_verified: row.try_get("phone_verified")?,
        mfa_enabled: row.try_get("mfa_enabled")?,
        mfa_method: mfa_method.as_deref().and_then(MfaMethod::from_db),
        mfa_secret: row.try_get("mfa_secret")?,
        last_login: row.try_get("last_login")?,
        created_at: row.try_get("created_at")?,
    })
}

/// PostgreSQL-backed store over the `users`, `mfa_tokens` and
/// `password_reset_tokens` tables.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_user_where(&self, clause: &str, bind: UserKey<'_>) -> Result<Option<UserRecord>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users u LEFT JOIN organizations o ON o.id = u.organization_id WHERE {clause}"
        );
        let q = sqlx::query(&query);
        let q = match bind {
            UserKey::Email(email) => q.bind(email),
            UserKey::Id(id) => q.bind(id),
        };
        let row = q
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup user")?;

        row.as_ref().map(user_from_row).transpose()
    }
}

enum UserKey<'a> {
    Email(&'a str),
    Id(i32),
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        self.find_user_where("u.email = $1", UserKey::Email(email))
            .await
    }

    async fn find_user_by_id(&self, id: i32) -> Result<Option<UserRecord>> {
        self.find_user_where("u.id = $1", UserKey::Id(id)).await
    }

    async fn create_user(&self, user: NewUser) -> Result<Option<UserRecord>> {
        let query = r"
            INSERT INTO users
                (email, password, name, phone, role, organization_id, created_by)
            VALUES ($1, $2, $3, $4, $5::user_role, $6, $7)
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(user.phone.as_deref())
            .bind(user.role.as_str())
            .bind(user.organization_id)
            .bind(user.created_by)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        let id: i32 = match row {
            Ok(row) => row.try_get("id")?,
            Err(err) if is_unique_violation(&err) => return Ok(None),
            Err(err) => return Err(err).context("failed to insert user"),
        };

        self.find_user_by_id(id)
            .await?
            .map(Some)
            .ok_or_else(|| anyhow!("user {id} vanished after insert"))
    }

    async fn update_password(&self, id: i32, password_hash: &str) -> Result<()> {
        let query = "UPDATE users SET password = $1, updated_at = NOW() WHERE id = $2";
        sqlx::query(query)
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update password")?;
        Ok(())
    }

    async fn update_last_login(&self, id: i32, at: DateTime<Utc>) -> Result<()> {
        let query = "UPDATE users SET last_login = $1 WHERE id = $2";
        sqlx::query(query)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update last login")?;
        Ok(())
    }

    async fn update_phone(&self, id: i32, phone: &str) -> Result<()> {
        let query = "UPDATE users SET phone = $1, updated_at = NOW() WHERE id = $2";
        sqlx::query(query)
            .bind(phone)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update phone")?;
        Ok(())
    }

    async fn update_mfa(&self, id: i32, settings: MfaSettings) -> Result<()> {
        let query = r"
            UPDATE users
            SET mfa_enabled = $1,
                mfa_method = $2::mfa_method,
                mfa_secret = $3,
                updated_at = NOW()
            WHERE id = $4
        ";
        sqlx::query(query)
            .bind(settings.enabled)
            .bind(settings.method.map(MfaMethod::as_str))
            .bind(settings.secret)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update MFA settings")?;
        Ok(())
    }

    async fn insert_reset_token(
        &self,
        user_id: i32,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
        ";
        sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert password reset token")?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>> {
        let query = r"
            UPDATE password_reset_tokens
            SET used = TRUE
            WHERE token_hash = $1 AND used = FALSE AND expires_at > $2
            RETURNING user_id
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to consume password reset token")?;

        row.map(|row| row.try_get::<i32, _>("user_id"))
            .transpose()
            .context("failed to decode password reset token owner")
    }
}

#[async_trait]
impl ChallengeStore for PgStore {
    async fn insert_challenge(
        &self,
        user_id: i32,
        code: &str,
        method: MfaMethod,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO mfa_tokens (user_id, token, method, expires_at)
            VALUES ($1, $2, $3::mfa_method, $4)
        ";
        sqlx::query(query)
            .bind(user_id)
            .bind(code)
            .bind(method.as_str())
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert MFA challenge")?;
        Ok(())
    }

    async fn consume_challenge(
        &self,
        user_id: i32,
        code: &str,
        method: MfaMethod,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        // single statement so two verifiers cannot both claim the same row
        let query = r"
            UPDATE mfa_tokens
            SET used = TRUE
            WHERE id = (
                SELECT id FROM mfa_tokens
                WHERE user_id = $1
                  AND token = $2
                  AND method = $3::mfa_method
                  AND used = FALSE
                  AND expires_at > $4
                ORDER BY created_at DESC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(code)
            .bind(method.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to consume MFA challenge")?;

        Ok(row.is_some())
    }
}
