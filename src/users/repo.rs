//! Persistence for [`User`] rows.
//!
//! Each operation is its own capability trait so a service function can ask
//! for exactly what it touches. [`PgUserStore`] implements all of them with
//! one SQL statement per call.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

use crate::users::repo_types::User;

/// Points granted every time a referrer is recorded.
pub const REFERRAL_BONUS: i64 = 5;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username already taken")]
    DuplicateUsername,
    #[error("no such user")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CreateUser: Send + Sync {
    async fn create(
        &self,
        username: &str,
        password_hash: &str,
        points: i64,
        referral_id: i64,
    ) -> StoreResult<i64>;
}

#[async_trait]
pub trait FindUserByName: Send + Sync {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait FindUserById: Send + Sync {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait RankUsers: Send + Sync {
    /// Highest `points` first. Equal scores come back in no particular order.
    async fn top_by_points(&self, limit: i64) -> StoreResult<Vec<User>>;
}

#[async_trait]
pub trait AwardPoints: Send + Sync {
    async fn add_points(&self, id: i64, delta: i64) -> StoreResult<()>;
}

#[async_trait]
pub trait RecordReferral: Send + Sync {
    /// Sets `referral_id` and adds [`REFERRAL_BONUS`] in the same statement.
    async fn set_referral(&self, id: i64, referral_id: i64) -> StoreResult<()>;
}

/// Everything the HTTP layer needs, behind one trait object.
pub trait UserStore:
    CreateUser + FindUserByName + FindUserById + RankUsers + AwardPoints + RecordReferral
{
}

impl<T> UserStore for T where
    T: CreateUser + FindUserByName + FindUserById + RankUsers + AwardPoints + RecordReferral
{
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_insert_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::DuplicateUsername
        }
        _ => StoreError::Database(e),
    }
}

fn expect_one_row(rows_affected: u64) -> StoreResult<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl CreateUser for PgUserStore {
    async fn create(
        &self,
        username: &str,
        password_hash: &str,
        points: i64,
        referral_id: i64,
    ) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (username, password, points, referral_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(points)
        .bind(referral_id)
        .fetch_one(&self.db)
        .await
        .map_err(map_insert_error)?;
        debug!(id, username, "user row inserted");
        Ok(id)
    }
}

#[async_trait]
impl FindUserByName for PgUserStore {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password, points, referral_id, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl FindUserById for PgUserStore {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password, points, referral_id, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl RankUsers for PgUserStore {
    async fn top_by_points(&self, limit: i64) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password, points, referral_id, created_at
            FROM users
            ORDER BY points DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl AwardPoints for PgUserStore {
    async fn add_points(&self, id: i64, delta: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET points = points + $1, updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(delta)
        .bind(id)
        .execute(&self.db)
        .await?;
        expect_one_row(result.rows_affected())
    }
}

#[async_trait]
impl RecordReferral for PgUserStore {
    async fn set_referral(&self, id: i64, referral_id: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET referral_id = $1, points = points + $2, updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(referral_id)
        .bind(REFERRAL_BONUS)
        .bind(id)
        .execute(&self.db)
        .await?;
        expect_one_row(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    #[test]
    fn zero_rows_affected_is_not_found() {
        assert!(matches!(expect_one_row(0), Err(StoreError::NotFound)));
        assert!(expect_one_row(1).is_ok());
    }

    #[derive(Debug, Error)]
    #[error("{message}")]
    struct PgError {
        code: &'static str,
        message: &'static str,
    }

    impl sqlx::error::DatabaseError for PgError {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn pg_error(code: &'static str, message: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(PgError { code, message }))
    }

    #[test]
    fn unique_violation_becomes_duplicate_username() {
        let err = pg_error(
            "23505",
            "duplicate key value violates unique constraint \"users_username_key\"",
        );
        assert!(matches!(map_insert_error(err), StoreError::DuplicateUsername));
    }

    #[test]
    fn other_constraint_violations_stay_storage_errors() {
        for code in ["23503", "23502", "22001"] {
            let mapped = map_insert_error(pg_error(code, "constraint violated"));
            match mapped {
                StoreError::Database(sqlx::Error::Database(db)) => {
                    assert_eq!(db.code().as_deref(), Some(code));
                }
                other => panic!("{code} mapped to {other:?}"),
            }
        }
    }

    #[test]
    fn non_database_errors_stay_storage_errors() {
        assert!(matches!(
            map_insert_error(sqlx::Error::PoolTimedOut),
            StoreError::Database(sqlx::Error::PoolTimedOut)
        ));
    }
}
