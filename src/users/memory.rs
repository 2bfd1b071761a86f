use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::users::{
    repo::{
        AwardPoints, CreateUser, FindUserById, FindUserByName, RankUsers, RecordReferral,
        StoreError, StoreResult, REFERRAL_BONUS,
    },
    repo_types::User,
};

/// Vec-backed store with the same observable behavior as the SQL one.
#[derive(Default)]
pub struct MemoryUserStore {
    rows: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i64) -> Option<User> {
        self.rows.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    fn update<F: FnOnce(&mut User)>(&self, id: i64, f: F) -> StoreResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let user = rows.iter_mut().find(|u| u.id == id).ok_or(StoreError::NotFound)?;
        f(user);
        Ok(())
    }
}

#[async_trait]
impl CreateUser for MemoryUserStore {
    async fn create(
        &self,
        username: &str,
        password_hash: &str,
        points: i64,
        referral_id: i64,
    ) -> StoreResult<i64> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.username == username) {
            return Err(StoreError::DuplicateUsername);
        }
        let id = rows.len() as i64 + 1;
        rows.push(User {
            id,
            username: username.to_owned(),
            password: password_hash.to_owned(),
            points,
            referral_id,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(id)
    }
}

#[async_trait]
impl FindUserByName for MemoryUserStore {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.username == username).cloned())
    }
}

#[async_trait]
impl FindUserById for MemoryUserStore {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.get(id))
    }
}

#[async_trait]
impl RankUsers for MemoryUserStore {
    async fn top_by_points(&self, limit: i64) -> StoreResult<Vec<User>> {
        let mut rows = self.rows.lock().unwrap().clone();
        rows.sort_by(|a, b| b.points.cmp(&a.points));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

#[async_trait]
impl AwardPoints for MemoryUserStore {
    async fn add_points(&self, id: i64, delta: i64) -> StoreResult<()> {
        self.update(id, |u| u.points += delta)
    }
}

#[async_trait]
impl RecordReferral for MemoryUserStore {
    async fn set_referral(&self, id: i64, referral_id: i64) -> StoreResult<()> {
        self.update(id, |u| {
            u.referral_id = referral_id;
            u.points += REFERRAL_BONUS;
        })
    }
}
