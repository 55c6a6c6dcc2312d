use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::DbPool;
use crate::modules::auth::interface::{
    BackupCodeRepository, DeviceSessionRepository, PasswordHistoryRepository, Repositories,
    Result, SecurityEventRepository, TokenRepository, UserRepository,
};
use crate::modules::auth::model::{
    BackupCode, DeviceSession, SecurityEvent, Token, User,
};

/// Wires every repository trait to the shared MySQL pool.
pub fn mysql_repositories(pool: DbPool) -> Repositories {
    Repositories {
        users: Arc::new(MySqlUserRepository { pool: pool.clone() }),
        tokens: Arc::new(MySqlTokenRepository { pool: pool.clone() }),
        devices: Arc::new(MySqlDeviceSessionRepository { pool: pool.clone() }),
        backup_codes: Arc::new(MySqlBackupCodeRepository { pool: pool.clone() }),
        password_history: Arc::new(MySqlPasswordHistoryRepository { pool: pool.clone() }),
        events: Arc::new(MySqlSecurityEventRepository { pool }),
    }
}

pub struct MySqlUserRepository {
    pool: DbPool,
}

#[async_trait]
impl UserRepository for MySqlUserRepository {
    async fn create(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, password_hash, role, email_verified,
                failed_login_attempts, lockout_until,
                two_factor_enabled, two_factor_secret,
                password_changed_at, force_password_change,
                is_active, is_locked, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.email_verified)
        .bind(user.failed_login_attempts)
        .bind(user.lockout_until)
        .bind(user.two_factor_enabled)
        .bind(&user.two_factor_secret)
        .bind(user.password_changed_at)
        .bind(user.force_password_change)
        .bind(user.is_active)
        .bind(user.is_locked)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0 > 0)
    }

    async fn record_login_failure(&self, user_id: &str) -> Result<i32> {
        let mut tx = self.pool.begin().await?;

        // The increment happens in the database, never read-modify-write in
        // application memory, so concurrent failures cannot under-count.
        sqlx::query(
            "UPDATE users SET failed_login_attempts = failed_login_attempts + 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let (attempts,): (i32,) =
            sqlx::query_as("SELECT failed_login_attempts FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(attempts)
    }

    async fn set_lockout(&self, user_id: &str, until: Option<DateTime<Utc>>) -> Result<()> {
        sqlx::query("UPDATE users SET lockout_until = ?, updated_at = ? WHERE id = ?")
            .bind(until)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_login_failures(&self, user_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET failed_login_attempts = 0, lockout_until = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_two_factor(
        &self,
        user_id: &str,
        enabled: bool,
        secret: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET two_factor_enabled = ?, two_factor_secret = ?, updated_at = ? WHERE id = ?",
        )
        .bind(enabled)
        .bind(secret)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_email_verified(&self, user_id: &str, verified: bool) -> Result<()> {
        sqlx::query("UPDATE users SET email_verified = ?, updated_at = ? WHERE id = ?")
            .bind(verified)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: &str,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, password_changed_at = ?,
                force_password_change = FALSE, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(password_hash)
        .bind(changed_at)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct MySqlTokenRepository {
    pool: DbPool,
}

#[async_trait]
impl TokenRepository for MySqlTokenRepository {
    async fn create(&self, token: &Token) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (
                id, user_id, token_hash, token_type, expires_at, blacklisted,
                device_id, device_name, ip_address, user_agent, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&token.id)
        .bind(&token.user_id)
        .bind(&token.token_hash)
        .bind(token.token_type)
        .bind(token.expires_at)
        .bind(token.blacklisted)
        .bind(&token.device_id)
        .bind(&token.device_name)
        .bind(&token.ip_address)
        .bind(&token.user_agent)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Token>> {
        Ok(
            sqlx::query_as::<_, Token>("SELECT * FROM tokens WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn blacklist(&self, id: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE tokens SET blacklisted = TRUE WHERE id = ? AND blacklisted = FALSE")
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn blacklist_for_device(&self, user_id: &str, device_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE tokens SET blacklisted = TRUE WHERE user_id = ? AND device_id = ? AND blacklisted = FALSE",
        )
        .bind(user_id)
        .bind(device_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn blacklist_all_for_user(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE tokens SET blacklisted = TRUE WHERE user_id = ? AND blacklisted = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

pub struct MySqlDeviceSessionRepository {
    pool: DbPool,
}

#[async_trait]
impl DeviceSessionRepository for MySqlDeviceSessionRepository {
    async fn create(&self, session: &DeviceSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO device_sessions (
                id, user_id, device_id, device_name, ip_address, user_agent,
                is_trusted, created_at, last_used
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.device_id)
        .bind(&session.device_name)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.is_trusted)
        .bind(session.created_at)
        .bind(session.last_used)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_device(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<DeviceSession>> {
        Ok(sqlx::query_as::<_, DeviceSession>(
            "SELECT * FROM device_sessions WHERE user_id = ? AND device_id = ?",
        )
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn touch(
        &self,
        id: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        last_used: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE device_sessions
            SET last_used = ?,
                ip_address = COALESCE(?, ip_address),
                user_agent = COALESCE(?, user_agent)
            WHERE id = ?
            "#,
        )
        .bind(last_used)
        .bind(ip_address)
        .bind(user_agent)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_for_user(&self, user_id: &str) -> Result<i64> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM device_sessions WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(result.0)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<DeviceSession>> {
        Ok(sqlx::query_as::<_, DeviceSession>(
            "SELECT * FROM device_sessions WHERE user_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn remove_oldest(&self, user_id: &str) -> Result<Option<DeviceSession>> {
        let mut tx = self.pool.begin().await?;

        // FOR UPDATE serializes concurrent claimants on the same row; the
        // rows_affected check below catches a row deleted in between.
        let Some(session) = sqlx::query_as::<_, DeviceSession>(
            r#"
            SELECT * FROM device_sessions
            WHERE user_id = ?
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let result = sqlx::query("DELETE FROM device_sessions WHERE id = ?")
            .bind(&session.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if result.rows_affected() == 1 {
            Ok(Some(session))
        } else {
            Ok(None)
        }
    }

    async fn remove(&self, user_id: &str, device_id: &str) -> Result<Option<DeviceSession>> {
        let mut tx = self.pool.begin().await?;

        let Some(session) = sqlx::query_as::<_, DeviceSession>(
            "SELECT * FROM device_sessions WHERE user_id = ? AND device_id = ? FOR UPDATE",
        )
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM device_sessions WHERE id = ?")
            .bind(&session.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(session))
    }

    async fn remove_all_except(
        &self,
        user_id: &str,
        keep_device_id: &str,
    ) -> Result<Vec<DeviceSession>> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query_as::<_, DeviceSession>(
            "SELECT * FROM device_sessions WHERE user_id = ? AND device_id <> ? FOR UPDATE",
        )
        .bind(user_id)
        .bind(keep_device_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM device_sessions WHERE user_id = ? AND device_id <> ?")
            .bind(user_id)
            .bind(keep_device_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(removed)
    }
}

pub struct MySqlBackupCodeRepository {
    pool: DbPool,
}

#[async_trait]
impl BackupCodeRepository for MySqlBackupCodeRepository {
    async fn replace_for_user(&self, user_id: &str, codes: &[BackupCode]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM backup_codes WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for code in codes {
            sqlx::query(
                r#"
                INSERT INTO backup_codes (id, user_id, code_hash, used, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&code.id)
            .bind(&code.user_id)
            .bind(&code.code_hash)
            .bind(code.used)
            .bind(code.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn consume(&self, user_id: &str, code_hash: &str) -> Result<bool> {
        // Remove-if-present: the row count says whether this call won.
        let result = sqlx::query(
            "UPDATE backup_codes SET used = TRUE WHERE user_id = ? AND code_hash = ? AND used = FALSE",
        )
        .bind(user_id)
        .bind(code_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_unused(&self, user_id: &str) -> Result<i64> {
        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM backup_codes WHERE user_id = ? AND used = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.0)
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM backup_codes WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct MySqlPasswordHistoryRepository {
    pool: DbPool,
}

#[async_trait]
impl PasswordHistoryRepository for MySqlPasswordHistoryRepository {
    async fn push(&self, user_id: &str, password_hash: &str, keep: usize) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO password_history (id, user_id, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM password_history
            WHERE user_id = ?
              AND id NOT IN (
                SELECT id FROM (
                    SELECT id FROM password_history
                    WHERE user_id = ?
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                ) recent
              )
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(keep as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT password_hash FROM password_history
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?)
    }
}

pub struct MySqlSecurityEventRepository {
    pool: DbPool,
}

#[async_trait]
impl SecurityEventRepository for MySqlSecurityEventRepository {
    async fn append(&self, event: &SecurityEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO security_events (
                id, user_id, email, event_type, outcome, metadata, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.user_id)
        .bind(&event.email)
        .bind(event.event_type)
        .bind(event.outcome)
        .bind(sqlx::types::Json(&event.metadata))
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM security_events WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn recent_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<SecurityEvent>> {
        Ok(sqlx::query_as::<_, SecurityEvent>(
            r#"
            SELECT * FROM security_events
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}
