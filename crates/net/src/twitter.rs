//! Twitter account linking through OAuth 2.0 with PKCE (S256).

use axum::extract::State;
use axum::response::Redirect;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use voxen_database::SafeDatabase;
use voxen_service::parser::{OAuthState, UserProfile};
use voxen_service::repo::{auth_state, users};
use voxen_service::rules::{secrets, social};

use crate::auth::AuthUser;
use crate::config::TwitterConfig;
use crate::error::{ok, ApiError, ApiResult};
use crate::extract::Query;
use crate::state::AppState;

const SCOPES: &str = "tweet.read users.read";

#[derive(Serialize)]
pub struct ConnectResponse {
    url: String,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct MeResponse {
    data: TwitterUser,
}

#[derive(Deserialize)]
struct TwitterUser {
    username: String,
}

fn configured(config: &Option<TwitterConfig>) -> Result<&TwitterConfig, ApiError> {
    config
        .as_ref()
        .ok_or_else(|| ApiError::validation("Twitter login is not configured"))
}

pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub async fn connect<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
) -> ApiResult<ConnectResponse> {
    let twitter = configured(&state.config.twitter)?;

    let verifier = format!("{}{}", secrets::generate_nonce(), secrets::generate_nonce());
    let oauth_state = secrets::generate_nonce();
    auth_state::put_oauth(
        &state.db,
        &oauth_state,
        &OAuthState {
            address: auth.address.clone(),
            code_verifier: verifier.clone(),
            expires_at: Utc::now() + state.config.nonce_ttl,
        },
    )?;

    let url = reqwest::Url::parse_with_params(
        &twitter.authorize_url,
        &[
            ("response_type", "code"),
            ("client_id", twitter.client_id.as_str()),
            ("redirect_uri", twitter.redirect_uri.as_str()),
            ("scope", SCOPES),
            ("state", oauth_state.as_str()),
            ("code_challenge", code_challenge(&verifier).as_str()),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| ApiError::Internal(format!("bad twitter authorize url: {}", e)))?;

    ok(ConnectResponse { url: url.to_string() })
}

async fn exchange_code(
    http: &reqwest::Client,
    twitter: &TwitterConfig,
    code: &str,
    verifier: &str,
) -> Result<String, ApiError> {
    let response = http
        .post(&twitter.token_url)
        .basic_auth(&twitter.client_id, Some(&twitter.client_secret))
        .form(&[
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", twitter.redirect_uri.as_str()),
            ("code_verifier", verifier),
            ("client_id", twitter.client_id.as_str()),
        ])
        .send()
        .await
        .map_err(|e| ApiError::Internal(format!("twitter token request failed: {}", e)))?;

    if !response.status().is_success() {
        warn!(status = %response.status(), "twitter rejected the authorization code");
        return Err(ApiError::validation("Twitter authorization failed"));
    }
    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| ApiError::Internal(format!("unexpected twitter token response: {}", e)))?;
    Ok(token.access_token)
}

async fn fetch_handle(http: &reqwest::Client, twitter: &TwitterConfig, access_token: &str) -> Result<String, ApiError> {
    let response = http
        .get(format!("{}/users/me", twitter.api_url))
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| ApiError::Internal(format!("twitter user request failed: {}", e)))?;

    if !response.status().is_success() {
        warn!(status = %response.status(), "twitter user lookup failed");
        return Err(ApiError::validation("Could not read the Twitter account"));
    }
    let me: MeResponse = response
        .json()
        .await
        .map_err(|e| ApiError::Internal(format!("unexpected twitter user response: {}", e)))?;
    Ok(me.data.username)
}

pub async fn callback<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ApiError> {
    let twitter = configured(&state.config.twitter)?;
    if let Some(error) = query.error {
        return Err(ApiError::validation(format!("Twitter authorization denied: {}", error)));
    }
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(ApiError::validation("Missing code or state"));
    };

    let now = Utc::now();
    let pending = auth_state::take_oauth(&state.db, &oauth_state, now)?
        .ok_or_else(|| ApiError::validation("Authorization expired, please try again"))?;

    let access_token = exchange_code(&state.http, twitter, &code, &pending.code_verifier).await?;
    let handle = social::normalize_handle(&fetch_handle(&state.http, twitter, &access_token).await?);

    let (mut user, _) = users::get_or_create(&state.db, &pending.address, now)?;
    social::check_link(&user, &handle, now, state.config.social_cooldown)?;
    social::link(&mut user, &handle, now);
    users::save(&state.db, &user)?;

    info!(address = %user.address, %handle, "twitter account linked");
    Ok(Redirect::to(&format!("{}/profile?twitter=connected", state.config.app_url)))
}

pub async fn disconnect<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
) -> ApiResult<UserProfile> {
    let mut user = users::require(&state.db, &auth.address)?;
    social::unlink(&mut user, Utc::now())?;
    users::save(&state.db, &user)?;
    ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{addr, test_config, TestApp};
    use axum::http::{HeaderMap, Method, StatusCode};
    use axum::routing::{get, post};
    use axum::{Form, Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    /// Fake Twitter: the access token echoes the code, and `/users/me`
    /// answers with the token as username.
    async fn fake_twitter() -> String {
        async fn token(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
            Json(json!({ "access_token": form.get("code").cloned().unwrap_or_default(), "token_type": "bearer" }))
        }
        async fn me(headers: HeaderMap) -> Json<Value> {
            let bearer = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .unwrap_or_default()
                .to_string();
            Json(json!({ "data": { "id": "1", "username": bearer } }))
        }

        let app = Router::new()
            .route("/oauth2/token", post(token))
            .route("/users/me", get(me));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", local)
    }

    async fn app_with_twitter() -> TestApp {
        let base = fake_twitter().await;
        let mut config = test_config();
        config.twitter = Some(TwitterConfig {
            client_id: "client".into(),
            client_secret: "secret".into(),
            redirect_uri: "http://app.test/api/auth/twitter/callback".into(),
            authorize_url: "https://twitter.test/i/oauth2/authorize".into(),
            token_url: format!("{}/oauth2/token", base),
            api_url: base,
        });
        TestApp::with_config(config)
    }

    async fn link(app: &TestApp, token: &str, handle: &str) -> (StatusCode, Value) {
        let (status, body) = app.call(Method::GET, "/api/auth/twitter/connect", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        let url = reqwest::Url::parse(body["data"]["url"].as_str().unwrap()).unwrap();
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["client_id"], "client");

        let uri = format!("/api/auth/twitter/callback?code={}&state={}", handle, params["state"]);
        app.call(Method::GET, &uri, None, None).await
    }

    #[test]
    fn test_code_challenge_matches_rfc7636_example() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mA92Q2T2wQ9u8QdJNaJxwOjTo7Ei3Y"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[tokio::test]
    async fn test_link_disconnect_and_cooldown() {
        let app = app_with_twitter().await;
        let address = addr(1);
        let token = app.user(&address);

        let (status, _) = link(&app, &token, "Alice").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let user = users::require(&app.state.db, &address).unwrap();
        assert_eq!(user.twitter_handle.as_deref(), Some("alice"));

        let (status, _) = app.call(Method::POST, "/api/auth/twitter/disconnect", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = link(&app, &token, "bob").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "You can connect a different Twitter account in 7 days");

        // the same handle comes back without waiting
        let (status, _) = link(&app, &token, "alice").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_unknown_state_rejected() {
        let app = app_with_twitter().await;
        let (status, _) = app
            .call(Method::GET, "/api/auth/twitter/callback?code=x&state=forged", None, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_not_configured() {
        let app = TestApp::new();
        let token = app.user(&addr(1));
        let (status, body) = app.call(Method::GET, "/api/auth/twitter/connect", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Twitter login is not configured");
    }
}
