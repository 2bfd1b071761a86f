use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{extract::Validate, users::repo_types::User};

const USERNAME_MAX_LEN: usize = 100;
const PASSWORD_MIN_LEN: usize = 5;

/// Request body for `POST /users/create`. Zero `points`/`referral_id` mean "pick for me".
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub referral_id: i64,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        check_username(&self.username, &mut errors);
        if self.password.is_empty() {
            errors.push("field password is required".into());
        } else if self.password.chars().count() < PASSWORD_MIN_LEN {
            errors.push(format!(
                "field password must be at least {PASSWORD_MIN_LEN} characters"
            ));
        }
        errors
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        check_username(&self.username, &mut errors);
        if self.password.is_empty() {
            errors.push("field password is required".into());
        }
        errors
    }
}

#[derive(Debug, Deserialize)]
pub struct CompleteTaskRequest {
    #[serde(default)]
    pub points: i64,
}

impl Validate for CompleteTaskRequest {
    fn validate(&self) -> Vec<String> {
        required_non_zero("points", self.points)
    }
}

#[derive(Debug, Deserialize)]
pub struct ReferralRequest {
    #[serde(default, rename = "referalId")]
    pub referral_id: i64,
}

impl Validate for ReferralRequest {
    fn validate(&self) -> Vec<String> {
        required_non_zero("referalId", self.referral_id)
    }
}

fn check_username(username: &str, errors: &mut Vec<String>) {
    if username.trim().is_empty() {
        errors.push("field username is required".into());
    } else if username.chars().count() > USERNAME_MAX_LEN {
        errors.push(format!(
            "field username must be at most {USERNAME_MAX_LEN} characters"
        ));
    }
}

fn required_non_zero(field: &str, value: i64) -> Vec<String> {
    if value == 0 {
        vec![format!("field {field} is required")]
    } else {
        Vec::new()
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Public projection of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Profile {
    pub username: String,
    pub points: i64,
    pub referral_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for Profile {
    fn from(u: User) -> Self {
        Self {
            username: u.username,
            points: u.points,
            referral_id: u.referral_id,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub users: Vec<Profile>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
