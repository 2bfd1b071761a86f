use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{info, instrument};

use crate::{
    auth::jwt::AuthUser,
    error::AppResult,
    extract::{UserId, ValidJson},
    response::{ok, Envelope},
    state::AppState,
    users::{
        dto::{
            CompleteTaskRequest, LeaderboardResponse, LoginRequest, LoginResponse,
            MessageResponse, Profile, ReferralRequest, RegisterRequest, RegisterResponse,
        },
        repo::REFERRAL_BONUS,
        services::{self, NewAccount},
    },
};

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/users/login", post(login))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/users/create", post(create_user))
        .route("/users/leaderboard", get(leaderboard))
        .route("/users/:id/status", get(user_status))
        .route("/users/:id/task/complete", post(complete_task))
        .route("/users/:id/task/referrer", post(set_referrer))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> AppResult<Json<Envelope<LoginResponse>>> {
    let token = services::login(
        state.users.as_ref(),
        &state.keys,
        &payload.username,
        &payload.password,
    )
    .await?;
    Ok(ok(LoginResponse { token }))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ValidJson(payload): ValidJson<RegisterRequest>,
) -> AppResult<Json<Envelope<RegisterResponse>>> {
    let mut rng = StdRng::from_entropy();
    let id = services::register(
        state.users.as_ref(),
        &mut rng,
        NewAccount {
            username: payload.username.clone(),
            password: payload.password,
            points: payload.points,
            referral_id: payload.referral_id,
        },
    )
    .await?;
    info!(%caller, id, "account created");
    Ok(ok(RegisterResponse {
        id,
        username: payload.username,
    }))
}

#[instrument(skip(state))]
pub async fn user_status(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    UserId(id): UserId,
) -> AppResult<Json<Envelope<Profile>>> {
    let profile = services::get_profile(state.users.as_ref(), id).await?;
    Ok(ok(profile))
}

#[instrument(skip(state))]
pub async fn leaderboard(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
) -> AppResult<Json<Envelope<LeaderboardResponse>>> {
    let users = services::get_leaderboard(state.users.as_ref()).await?;
    Ok(ok(LeaderboardResponse { users }))
}

#[instrument(skip(state))]
pub async fn complete_task(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    UserId(id): UserId,
    ValidJson(payload): ValidJson<CompleteTaskRequest>,
) -> AppResult<Json<Envelope<MessageResponse>>> {
    services::complete_task(state.users.as_ref(), id, payload.points).await?;
    Ok(ok(MessageResponse {
        message: format!("task completed, awarded {} points", payload.points),
    }))
}

#[instrument(skip(state))]
pub async fn set_referrer(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    UserId(id): UserId,
    ValidJson(payload): ValidJson<ReferralRequest>,
) -> AppResult<Json<Envelope<MessageResponse>>> {
    services::set_referral(state.users.as_ref(), id, payload.referral_id).await?;
    Ok(ok(MessageResponse {
        message: format!("referrer recorded, awarded {REFERRAL_BONUS} points"),
    }))
}
