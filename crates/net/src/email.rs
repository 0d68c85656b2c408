//! Email verification with one-time codes.

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use voxen_database::SafeDatabase;
use voxen_service::parser::{EmailOtp, UserProfile};
use voxen_service::repo::{auth_state, users};
use voxen_service::rules::{cooldown, secrets, validate};

use crate::auth::AuthUser;
use crate::error::{ok, ApiError, ApiResult};
use crate::extract::Json;
use crate::state::AppState;

pub const MAX_ATTEMPTS: u8 = 5;

#[derive(Deserialize)]
pub struct SendOtpRequest {
    email: String,
}

#[derive(Serialize)]
pub struct SendOtpResponse {
    email: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    otp: String,
}

pub async fn send_otp<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Json(req): Json<SendOtpRequest>,
) -> ApiResult<SendOtpResponse> {
    let email = validate::email(&req.email)?;
    let now = Utc::now();

    if users::email_in_use(&state.db, &email, &auth.address)? {
        return Err(ApiError::validation("This email is already linked to another account"));
    }
    if let Some(previous) = auth_state::get_otp(&state.db, &auth.address)? {
        if let Some(wait) = cooldown::remaining(previous.sent_at, now, state.config.otp_resend_cooldown) {
            return Err(ApiError::validation(format!(
                "Please wait {} before requesting another code",
                cooldown::describe(wait)
            )));
        }
    }

    let code = secrets::generate_otp();
    let expires_at = now + state.config.otp_ttl;
    auth_state::put_otp(
        &state.db,
        &auth.address,
        &EmailOtp {
            email: email.clone(),
            code_hash: secrets::hash_secret(&code),
            attempts_left: MAX_ATTEMPTS,
            sent_at: now,
            expires_at,
        },
    )?;

    let body = format!(
        "Your Voxen verification code is {}.\n\nIt expires in {} minutes.",
        code,
        state.config.otp_ttl.num_minutes()
    );
    if let Err(e) = state.mailer.send(&email, "Your Voxen verification code", &body).await {
        error!(address = %auth.address, "verification email failed: {}", e);
        auth_state::clear_otp(&state.db, &auth.address)?;
        return Err(ApiError::Internal(e.to_string()));
    }

    info!(address = %auth.address, "verification code sent");
    ok(SendOtpResponse { email, expires_at })
}

pub async fn verify_otp<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Json(req): Json<VerifyOtpRequest>,
) -> ApiResult<UserProfile> {
    let now = Utc::now();
    // A record with no attempts left is spent; it stays so `sent_at` keeps
    // gating resends.
    let mut pending = auth_state::get_otp(&state.db, &auth.address)?
        .filter(|otp| otp.attempts_left > 0)
        .ok_or_else(|| ApiError::validation("No verification code was requested"))?;

    if pending.expires_at <= now {
        pending.attempts_left = 0;
        auth_state::put_otp(&state.db, &auth.address, &pending)?;
        return Err(ApiError::validation("Verification code expired, request a new one"));
    }

    if !secrets::verify_secret(&req.otp, &pending.code_hash) {
        pending.attempts_left = pending.attempts_left.saturating_sub(1);
        auth_state::put_otp(&state.db, &auth.address, &pending)?;
        if pending.attempts_left == 0 {
            return Err(ApiError::validation("Too many failed attempts, request a new code"));
        }
        return Err(ApiError::validation(format!(
            "Invalid verification code, {} attempts left",
            pending.attempts_left
        )));
    }

    if users::email_in_use(&state.db, &pending.email, &auth.address)? {
        auth_state::clear_otp(&state.db, &auth.address)?;
        return Err(ApiError::validation("This email is already linked to another account"));
    }

    let (mut user, _) = users::get_or_create(&state.db, &auth.address, now)?;
    user.email = Some(pending.email);
    user.email_verified = true;
    user.updated_at = now;
    users::save(&state.db, &user)?;
    auth_state::clear_otp(&state.db, &auth.address)?;

    info!(address = %auth.address, "email verified");
    ok(user)
}

#[cfg(test)]
mod tests {
    use crate::test_support::{addr, TestApp};
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use voxen_service::repo::auth_state;

    fn code_from(body: &str) -> String {
        body.split_whitespace()
            .find(|w| w.trim_end_matches('.').len() == 6 && w.trim_end_matches('.').chars().all(|c| c.is_ascii_digit()))
            .map(|w| w.trim_end_matches('.').to_string())
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_and_verify() {
        let app = TestApp::new();
        let token = app.user(&addr(1));

        let (status, body) = app
            .call(Method::POST, "/api/auth/email/send-otp", Some(&token), Some(json!({ "email": "Me@Voxen.app" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "me@voxen.app");

        let sent = app.mailer.outbox();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "me@voxen.app");
        let code = code_from(&sent[0].body);

        // resend inside the cooldown
        let (status, _) = app
            .call(Method::POST, "/api/auth/email/send-otp", Some(&token), Some(json!({ "email": "me@voxen.app" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .call(Method::POST, "/api/auth/email/verify-otp", Some(&token), Some(json!({ "otp": code })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "me@voxen.app");
        assert_eq!(body["data"]["email_verified"], true);

        // the same address cannot be claimed by someone else
        let other = app.user(&addr(2));
        let (status, _) = app
            .call(Method::POST, "/api/auth/email/send-otp", Some(&other), Some(json!({ "email": "me@voxen.app" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_code_decrements_attempts() {
        let app = TestApp::new();
        let address = addr(1);
        let token = app.user(&address);
        app.call(Method::POST, "/api/auth/email/send-otp", Some(&token), Some(json!({ "email": "a@voxen.app" })))
            .await;
        let code = code_from(&app.mailer.outbox()[0].body);
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let (status, body) = app
            .call(Method::POST, "/api/auth/email/verify-otp", Some(&token), Some(json!({ "otp": wrong })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid verification code, 4 attempts left");
        assert_eq!(auth_state::get_otp(&app.state.db, &address).unwrap().unwrap().attempts_left, 4);

        for _ in 0..3 {
            app.call(Method::POST, "/api/auth/email/verify-otp", Some(&token), Some(json!({ "otp": wrong })))
                .await;
        }
        let (_, body) = app
            .call(Method::POST, "/api/auth/email/verify-otp", Some(&token), Some(json!({ "otp": wrong })))
            .await;
        assert_eq!(body["message"], "Too many failed attempts, request a new code");

        // the code is gone, even the right one fails now
        let (status, body) = app
            .call(Method::POST, "/api/auth/email/verify-otp", Some(&token), Some(json!({ "otp": code })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No verification code was requested");

        // burning the code does not reset the resend cooldown
        let (status, body) = app
            .call(Method::POST, "/api/auth/email/send-otp", Some(&token), Some(json!({ "email": "a@voxen.app" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("Please wait"));
        assert_eq!(app.mailer.outbox().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_code_keeps_cooldown() {
        let app = TestApp::new();
        let address = addr(1);
        let token = app.user(&address);
        app.call(Method::POST, "/api/auth/email/send-otp", Some(&token), Some(json!({ "email": "a@voxen.app" })))
            .await;
        let code = code_from(&app.mailer.outbox()[0].body);

        let mut pending = auth_state::get_otp(&app.state.db, &address).unwrap().unwrap();
        pending.expires_at = pending.sent_at;
        auth_state::put_otp(&app.state.db, &address, &pending).unwrap();

        let (_, body) = app
            .call(Method::POST, "/api/auth/email/verify-otp", Some(&token), Some(json!({ "otp": code })))
            .await;
        assert_eq!(body["message"], "Verification code expired, request a new one");

        let (status, body) = app
            .call(Method::POST, "/api/auth/email/send-otp", Some(&token), Some(json!({ "email": "a@voxen.app" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("Please wait"));
    }

    #[tokio::test]
    async fn test_invalid_email_rejected() {
        let app = TestApp::new();
        let token = app.user(&addr(1));
        let (status, body) = app
            .call(Method::POST, "/api/auth/email/send-otp", Some(&token), Some(json!({ "email": "nope" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid email address");
        assert!(app.mailer.outbox().is_empty());
    }
}
