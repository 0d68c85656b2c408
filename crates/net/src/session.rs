//! Wallet login: nonce issue, signature verification, current user.

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use voxen_chain::{login_message, normalize_address, verify_wallet_signature};
use voxen_database::SafeDatabase;
use voxen_service::parser::{LoginNonce, UserProfile};
use voxen_service::repo::{auth_state, users};
use voxen_service::rules::secrets;

use crate::auth::{issue_token, AuthUser};
use crate::error::{ok, ApiError, ApiResult};
use crate::extract::Json;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct NonceRequest {
    address: String,
}

#[derive(Serialize)]
pub struct NonceResponse {
    nonce: String,
    message: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    address: String,
    signature: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    user: UserProfile,
    is_new_user: bool,
}

pub async fn request_nonce<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    Json(req): Json<NonceRequest>,
) -> ApiResult<NonceResponse> {
    let address = normalize_address(&req.address)?;
    let now = Utc::now();
    let nonce = secrets::generate_nonce();
    let message = login_message(&address, &nonce, now, state.config.network);
    let expires_at = now + state.config.nonce_ttl;

    auth_state::put_nonce(
        &state.db,
        &address,
        &LoginNonce {
            nonce: nonce.clone(),
            message: message.clone(),
            issued_at: now,
            expires_at,
        },
    )?;

    ok(NonceResponse { nonce, message, expires_at })
}

pub async fn verify_login<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<LoginResponse> {
    let address = normalize_address(&req.address)?;
    let now = Utc::now();

    let nonce = auth_state::take_nonce(&state.db, &address, now)?
        .ok_or_else(|| ApiError::unauthorized("Nonce expired or not found, request a new one"))?;

    if !verify_wallet_signature(&address, &nonce.message, &req.signature)? {
        warn!(%address, "wallet signature mismatch");
        return Err(ApiError::unauthorized("Invalid signature"));
    }

    let (user, is_new_user) = users::get_or_create(&state.db, &address, now)?;
    let token = issue_token(&state.config.jwt_secret, &address, now, state.config.jwt_ttl)?;
    info!(%address, is_new_user, "wallet login");

    ok(LoginResponse { token, user, is_new_user })
}

pub async fn me<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
) -> ApiResult<UserProfile> {
    let (user, _) = users::get_or_create(&state.db, &auth.address, Utc::now())?;
    ok(user)
}
