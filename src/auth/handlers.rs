use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;

use super::dto::{
    AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, PublicUser,
    RegisterRequest, RequestVerificationRequest, ResetPasswordRequest, UpdateProfileRequest,
    VerificationStatus, VerifyEmailRequest,
};
use super::extractors::AuthUser;
use super::services::AccountService;
use crate::error::AppResult;
use crate::provisioning::ProvisionReport;
use crate::state::AppState;
use crate::validation::JsonBody;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/verify-email", post(verify_email))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).patch(update_me))
        .route("/me/password", post(change_password))
        .route(
            "/me/verification",
            post(request_verification).get(verification_status),
        )
        .route("/me/defaults", post(ensure_defaults))
}

#[instrument(skip(svc, payload))]
pub async fn register(
    State(svc): State<AccountService>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    Ok((StatusCode::CREATED, Json(svc.register(payload).await?)))
}

#[instrument(skip(svc, payload))]
pub async fn login(
    State(svc): State<AccountService>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(svc.login(payload).await?))
}

#[instrument(skip(svc, payload))]
pub async fn forgot_password(
    State(svc): State<AccountService>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> AppResult<Json<Value>> {
    svc.forgot_password(payload).await?;
    Ok(Json(json!({
        "message": "If the address belongs to an account, a reset link is on its way"
    })))
}

#[instrument(skip(svc, payload))]
pub async fn reset_password(
    State(svc): State<AccountService>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> AppResult<StatusCode> {
    svc.reset_password(payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(svc, payload))]
pub async fn verify_email(
    State(svc): State<AccountService>,
    JsonBody(payload): JsonBody<VerifyEmailRequest>,
) -> AppResult<Json<VerificationStatus>> {
    Ok(Json(svc.verify_email(payload).await?))
}

#[instrument(skip(svc))]
pub async fn get_me(
    State(svc): State<AccountService>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<PublicUser>> {
    Ok(Json(svc.me(user_id).await?))
}

#[instrument(skip(svc, payload))]
pub async fn update_me(
    State(svc): State<AccountService>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> AppResult<Json<PublicUser>> {
    Ok(Json(svc.update_profile(user_id, payload).await?))
}

#[instrument(skip(svc, payload))]
pub async fn change_password(
    State(svc): State<AccountService>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    svc.change_password(user_id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(svc, payload))]
pub async fn request_verification(
    State(svc): State<AccountService>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<RequestVerificationRequest>,
) -> AppResult<Json<VerificationStatus>> {
    Ok(Json(svc.request_verification(user_id, payload).await?))
}

#[instrument(skip(svc))]
pub async fn verification_status(
    State(svc): State<AccountService>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<VerificationStatus>> {
    Ok(Json(svc.verification_status(user_id).await?))
}

#[instrument(skip(svc))]
pub async fn ensure_defaults(
    State(svc): State<AccountService>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ProvisionReport>> {
    Ok(Json(svc.ensure_defaults(user_id).await?))
}
