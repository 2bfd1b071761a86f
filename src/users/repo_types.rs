use sqlx::FromRow;
use time::OffsetDateTime;

/// Row of the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String, // argon2 hash
    pub points: i64,
    pub referral_id: i64, // 0 = no referrer
    pub created_at: OffsetDateTime,
}
