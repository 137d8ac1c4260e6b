//! All database access for users, confirmation keys, sessions and the
//! email outbox. Queries follow the service-wide rule: every statement
//! runs inside a `db.query` span.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info_span, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Consecutive failures before an account locks.
pub const MAX_LOGIN_ATTEMPTS: i32 = 10;
/// Lock duration after too many failures: 2 hours.
pub const LOCK_SECONDS: i64 = 2 * 60 * 60;

const DEFAULT_AVATAR: &str = "/img/caps/avatarth.png";

/// Admin accounts carry a role of 10 or above.
const ROLE_ADMIN: i16 = 10;

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: Uuid,
    pub cid: i64,
    pub login: String,
    pub email: String,
    pub disp: String,
    pub avatar: Option<String>,
    pub password_hash: String,
    pub active: bool,
    pub role: i16,
    pub failed_attempts: i32,
    pub lock_until: Option<DateTime<Utc>>,
}

impl AuthUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role >= ROLE_ADMIN
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock_until.is_some_and(|until| until > Utc::now())
    }

    /// Avatar path served to clients, falling back to the stock thumbnail.
    #[must_use]
    pub fn avatar_path(&self) -> String {
        self.avatar
            .as_deref()
            .map_or_else(|| DEFAULT_AVATAR.to_string(), |a| format!("/_a/h/{a}"))
    }

    #[must_use]
    pub fn public(&self) -> PublicUser {
        PublicUser {
            cid: self.cid,
            login: self.login.clone(),
            disp: self.disp.clone(),
            avatar: self.avatar_path(),
            email: self.email.clone(),
            active: self.active,
            admin: self.is_admin(),
        }
    }
}

/// Profile shape handed out to clients. Never carries the password hash.
#[derive(ToSchema, Serialize, Clone, Debug)]
pub struct PublicUser {
    pub cid: i64,
    pub login: String,
    pub disp: String,
    pub avatar: String,
    pub email: String,
    pub active: bool,
    pub admin: bool,
}

/// A live (unexpired) confirmation key joined to its user.
#[derive(Debug)]
pub struct ConfirmRecord {
    pub key: String,
    pub user: AuthUser,
}

const USER_COLUMNS: &str = "id, cid, login, email, disp, avatar, password_hash, active, role, \
                            failed_attempts, lock_until";

// Same list, qualified for queries joining through `users u`.
const USER_COLUMNS_JOINED: &str = "u.id, u.cid, u.login, u.email, u.disp, u.avatar, \
                                   u.password_hash, u.active, u.role, u.failed_attempts, \
                                   u.lock_until";

fn user_from_row(row: &sqlx::postgres::PgRow) -> AuthUser {
    AuthUser {
        id: row.get("id"),
        cid: row.get("cid"),
        login: row.get("login"),
        email: row.get("email"),
        disp: row.get("disp"),
        avatar: row.get("avatar"),
        password_hash: row.get("password_hash"),
        active: row.get("active"),
        role: row.get("role"),
        failed_attempts: row.get("failed_attempts"),
        lock_until: row.get("lock_until"),
    }
}

/// Find a user by login (case-insensitive) or by e-mail.
pub async fn find_user(pool: &PgPool, login_or_email: &str) -> Result<Option<AuthUser>> {
    let query = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE lower(login) = lower($1) OR email = lower($1)"
    );
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(login_or_email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user")?;

    Ok(row.as_ref().map(user_from_row))
}

/// Existing login/email check ahead of registration, so the conflict
/// message can say which of the two collided.
pub async fn find_conflicting_user(
    pool: &PgPool,
    login: &str,
    email: &str,
) -> Result<Option<(String, String)>> {
    let query = "SELECT login, email FROM users WHERE lower(login) = lower($1) OR email = $2";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(login)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check for conflicting user")?;

    Ok(row.map(|row| (row.get("login"), row.get("email"))))
}

/// Insert an inactive user; `cid` comes from the sequence, display name
/// starts out as the login.
pub async fn insert_user(
    pool: &PgPool,
    login: &str,
    email: &str,
    password_hash: &str,
) -> Result<Uuid> {
    let query = r"
        INSERT INTO users (login, email, disp, password_hash)
        VALUES ($1, $2, $1, $3)
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(login)
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert user")?;

    Ok(row.get("id"))
}

/// Remove a user again when post-registration steps fail.
pub async fn delete_user(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = "DELETE FROM users WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete user")?;

    Ok(())
}

/// Bump the failure counter; the lock engages on the Nth failure.
pub async fn record_login_failure(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE users
        SET failed_attempts = failed_attempts + 1,
            lock_until = CASE
                WHEN failed_attempts + 1 >= $2
                THEN NOW() + ($3 * INTERVAL '1 second')
                ELSE lock_until
            END
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(MAX_LOGIN_ATTEMPTS)
        .bind(LOCK_SECONDS)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to record login failure")?;

    Ok(())
}

pub async fn reset_login_failures(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE users
        SET failed_attempts = 0, lock_until = NULL
        WHERE id = $1 AND (failed_attempts <> 0 OR lock_until IS NOT NULL)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to reset login failures")?;

    Ok(())
}

/// A user holds at most one confirmation key at a time.
pub async fn delete_confirms_for_user(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<()> {
    let query = "DELETE FROM user_confirms WHERE user_id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to delete confirmation keys")?;

    Ok(())
}

pub async fn insert_confirm(
    tx: &mut Transaction<'_, Postgres>,
    key: &str,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO user_confirms (key, user_id, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(key)
        .bind(user_id)
        .bind(ttl_seconds)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert confirmation key")?;

    Ok(())
}

/// Resolve a key into its user. Expired rows are invisible here; a
/// periodic cleanup can collect them at leisure.
pub async fn lookup_confirm(pool: &PgPool, key: &str) -> Result<Option<ConfirmRecord>> {
    let query = format!(
        "SELECT c.key AS confirm_key, {USER_COLUMNS_JOINED}
         FROM user_confirms c
         JOIN users u ON u.id = c.user_id
         WHERE c.key = $1 AND c.expires_at > NOW()"
    );
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(key)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup confirmation key")?;

    Ok(row.map(|row| ConfirmRecord {
        key: row.get("confirm_key"),
        user: user_from_row(&row),
    }))
}

pub async fn delete_confirm(tx: &mut Transaction<'_, Postgres>, key: &str) -> Result<()> {
    let query = "DELETE FROM user_confirms WHERE key = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(key)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to delete confirmation key")?;

    Ok(())
}

/// Registration confirmation: activate the user and burn the key.
pub async fn confirm_registration(pool: &PgPool, key: &str, user_id: Uuid) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to begin confirmation transaction")?;

    let query = r"
        UPDATE users
        SET active = TRUE, activated_at = COALESCE(activated_at, NOW())
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to activate user")?;

    delete_confirm(&mut tx, key).await?;

    tx.commit()
        .await
        .context("failed to commit confirmation transaction")?;

    Ok(())
}

/// Password reset via emailed key: store the new hash, activate an
/// inactive account along the way, burn the key.
pub async fn apply_password_recall(
    pool: &PgPool,
    key: &str,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to begin password recall transaction")?;

    let query = r"
        UPDATE users
        SET password_hash = $2,
            active = TRUE,
            activated_at = COALESCE(activated_at, NOW()),
            failed_attempts = 0,
            lock_until = NULL
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to set recalled password")?;

    delete_confirm(&mut tx, key).await?;

    tx.commit()
        .await
        .context("failed to commit password recall transaction")?;

    Ok(())
}

pub async fn set_password(pool: &PgPool, user_id: Uuid, password_hash: &str) -> Result<()> {
    let query = "UPDATE users SET password_hash = $2 WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to set password")?;

    Ok(())
}

pub async fn insert_session(pool: &PgPool, token_hash: &[u8], user_id: Uuid) -> Result<()> {
    let query = "INSERT INTO sessions (token_hash, user_id) VALUES ($1, $2)";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert session")?;

    Ok(())
}

pub async fn lookup_session(pool: &PgPool, token_hash: &[u8]) -> Result<Option<AuthUser>> {
    let query = format!(
        "SELECT {USER_COLUMNS_JOINED}
         FROM sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token_hash = $1"
    );
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    Ok(row.as_ref().map(user_from_row))
}

pub async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    let query = "DELETE FROM sessions WHERE token_hash = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;

    Ok(())
}

/// Queue an email; the outbox worker picks it up on the next poll.
pub async fn enqueue_email(
    tx: &mut Transaction<'_, Postgres>,
    to_email: &str,
    bcc_email: Option<&str>,
    template: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    let payload_text = serde_json::to_string(payload).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, bcc_email, template, payload_json)
        VALUES ($1, $2, $3, $4::jsonb)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(bcc_email)
        .bind(template)
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;

    Ok(())
}

#[must_use]
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(avatar: Option<&str>, role: i16) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            cid: 42,
            login: "kodak".to_string(),
            email: "kodak@example.com".to_string(),
            disp: "kodak".to_string(),
            avatar: avatar.map(str::to_string),
            password_hash: "$argon2id$stub".to_string(),
            active: true,
            role,
            failed_attempts: 0,
            lock_until: None,
        }
    }

    #[test]
    fn avatar_path_falls_back_to_stock_thumbnail() {
        assert_eq!(sample_user(None, 0).avatar_path(), "/img/caps/avatarth.png");
        assert_eq!(
            sample_user(Some("abc.jpg"), 0).avatar_path(),
            "/_a/h/abc.jpg"
        );
    }

    #[test]
    fn admin_starts_at_role_ten() {
        assert!(!sample_user(None, 9).is_admin());
        assert!(sample_user(None, 10).is_admin());
        assert!(sample_user(None, 11).is_admin());
    }

    #[test]
    fn lock_is_only_active_in_the_future() {
        let mut user = sample_user(None, 0);
        assert!(!user.is_locked());
        user.lock_until = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(!user.is_locked());
        user.lock_until = Some(Utc::now() + chrono::Duration::seconds(60));
        assert!(user.is_locked());
    }

    #[test]
    fn public_profile_has_no_password_hash() {
        let user = sample_user(Some("abc.jpg"), 10);
        let public = user.public();
        let value = serde_json::to_value(&public).unwrap();
        assert!(value.get("password_hash").is_none());
        assert_eq!(value["login"], "kodak");
        assert_eq!(value["admin"], true);
    }
}
