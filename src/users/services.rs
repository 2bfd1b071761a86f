use rand::Rng;
use tracing::{info, warn};

use crate::{
    auth::{
        jwt::JwtKeys,
        password::{hash_password_off_runtime, verify_password_off_runtime},
    },
    error::{AppError, AppResult},
    users::{
        dto::Profile,
        repo::{
            AwardPoints, CreateUser, FindUserById, FindUserByName, RankUsers, RecordReferral,
            StoreError,
        },
    },
};

pub const LEADERBOARD_SIZE: i64 = 5;

/// Registration input after validation. Zero means "not supplied".
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub points: i64,
    pub referral_id: i64,
}

/// Replaces zero `points` / `referral_id` with a value in `1..=10`.
pub fn fill_defaults<R: Rng>(points: i64, referral_id: i64, rng: &mut R) -> (i64, i64) {
    let points = if points == 0 { rng.gen_range(1..=10) } else { points };
    let referral_id = if referral_id == 0 {
        rng.gen_range(1..=10)
    } else {
        referral_id
    };
    (points, referral_id)
}

pub async fn register<S, R>(store: &S, rng: &mut R, account: NewAccount) -> AppResult<i64>
where
    S: CreateUser + ?Sized,
    R: Rng + Send,
{
    let (points, referral_id) = fill_defaults(account.points, account.referral_id, rng);
    let hash = hash_password_off_runtime(account.password.clone()).await?;
    let id = match store
        .create(&account.username, &hash, points, referral_id)
        .await
    {
        Ok(id) => id,
        Err(StoreError::DuplicateUsername) => {
            info!(username = %account.username, "user already exists");
            return Err(AppError::DuplicateUsername);
        }
        Err(e) => return Err(e.into()),
    };
    info!(id, username = %account.username, points, referral_id, "user registered");
    Ok(id)
}

/// Unknown usernames and wrong passwords are indistinguishable to the caller.
pub async fn login<S>(store: &S, keys: &JwtKeys, username: &str, password: &str) -> AppResult<String>
where
    S: FindUserByName + ?Sized,
{
    let Some(user) = store.find_by_username(username).await? else {
        warn!(username, "login for unknown user");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password_off_runtime(password.to_owned(), user.password.clone()).await? {
        warn!(username, user_id = user.id, "login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let token = keys.sign(&user.username)?;
    info!(user_id = user.id, username, "user logged in");
    Ok(token)
}

pub async fn get_profile<S>(store: &S, id: i64) -> AppResult<Profile>
where
    S: FindUserById + ?Sized,
{
    let user = store.find_by_id(id).await?.ok_or(AppError::NotFound)?;
    Ok(Profile::from(user))
}

pub async fn get_leaderboard<S>(store: &S) -> AppResult<Vec<Profile>>
where
    S: RankUsers + ?Sized,
{
    let users = store.top_by_points(LEADERBOARD_SIZE).await?;
    Ok(users.into_iter().map(Profile::from).collect())
}

pub async fn complete_task<S>(store: &S, user_id: i64, points: i64) -> AppResult<()>
where
    S: AwardPoints + ?Sized,
{
    store.add_points(user_id, points).await?;
    info!(user_id, points, "task completed");
    Ok(())
}

pub async fn set_referral<S>(store: &S, user_id: i64, referral_id: i64) -> AppResult<()>
where
    S: RecordReferral + ?Sized,
{
    store.set_referral(user_id, referral_id).await?;
    info!(user_id, referral_id, "referrer recorded");
    Ok(())
}
