use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use voxen_chain::normalize_address;
use voxen_database::SafeDatabase;
use voxen_service::parser::{Avatar, NotificationPreferences, UserProfile};
use voxen_service::repo::users;
use voxen_service::rules::{avatar, validate};

use crate::auth::{AuthUser, MaybeAuthUser};
use crate::error::{ok, ApiError, ApiResult};
use crate::extract::{Json, Path};
use crate::state::AppState;

// Response for the public profile lookup
#[derive(Serialize)]
pub struct ProfileResponse {
    exists: bool,
    profile: UserProfile,
}

#[derive(Deserialize)]
pub struct ProfileUpdate {
    username: Option<String>,
    display_name: Option<String>,
    bio: Option<String>,
}

#[derive(Deserialize)]
pub struct PreferencesUpdate {
    new_proposal: Option<bool>,
    proposal_closed: Option<bool>,
    discussion_reply: Option<bool>,
    email_enabled: Option<bool>,
}

pub async fn get_profile<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    viewer: MaybeAuthUser,
    Path(address): Path<String>,
) -> ApiResult<ProfileResponse> {
    let address = normalize_address(&address)?;

    let (exists, mut profile) = match users::get(&state.db, &address)? {
        Some(profile) => (true, profile),
        None => (false, UserProfile::new(&address, Utc::now())),
    };

    // email stays private to its owner
    if viewer.address() != Some(address.as_str()) {
        profile.email = None;
    }

    ok(ProfileResponse { exists, profile })
}

pub async fn update_profile<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<UserProfile> {
    let now = Utc::now();
    let (mut profile, _) = users::get_or_create(&state.db, &auth.address, now)?;

    if let Some(display_name) = update.display_name {
        profile.display_name = validate::bounded(&display_name, "Display name", validate::MAX_DISPLAY_NAME_LEN)?;
    }
    if let Some(bio) = update.bio {
        profile.bio = validate::bounded(&bio, "Bio", validate::MAX_BIO_LEN)?;
    }
    if let Some(username) = update.username {
        let username = validate::username(&username)?;
        users::claim_username(&state.db, &mut profile, &username)?;
    }

    profile.updated_at = now;
    users::save(&state.db, &profile)?;
    ok(profile)
}

pub async fn upload_avatar<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<UserProfile> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "avatar" => {
                let data = field.bytes().await?;
                if !data.is_empty() {
                    upload = Some(data.to_vec());
                }
            }
            _ => continue,
        }
    }

    let data = upload.ok_or_else(|| ApiError::validation("Avatar file is required"))?;
    // the stored type comes from the bytes, not from what the client claimed
    let content_type = avatar::inspect(&data)?;

    let now = Utc::now();
    let (mut profile, _) = users::get_or_create(&state.db, &auth.address, now)?;
    users::save_avatar(
        &state.db,
        &auth.address,
        &Avatar { data, content_type: content_type.to_string() },
    )?;
    profile.has_avatar = true;
    profile.updated_at = now;
    users::save(&state.db, &profile)?;

    ok(profile)
}

pub async fn get_avatar<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    Path(address): Path<String>,
) -> Result<Response, ApiError> {
    let address = normalize_address(&address)?;
    let avatar = users::avatar(&state.db, &address)?
        .ok_or_else(|| ApiError::not_found("Avatar not found"))?;

    Ok((
        [(CONTENT_TYPE, avatar.content_type), (CACHE_CONTROL, "public, max-age=300".to_string())],
        Body::from(avatar.data),
    )
        .into_response())
}

pub async fn get_preferences<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
) -> ApiResult<NotificationPreferences> {
    ok(users::preferences(&state.db, &auth.address)?)
}

pub async fn update_preferences<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Json(update): Json<PreferencesUpdate>,
) -> ApiResult<NotificationPreferences> {
    let mut prefs = users::preferences(&state.db, &auth.address)?;
    if let Some(value) = update.new_proposal {
        prefs.new_proposal = value;
    }
    if let Some(value) = update.proposal_closed {
        prefs.proposal_closed = value;
    }
    if let Some(value) = update.discussion_reply {
        prefs.discussion_reply = value;
    }
    if let Some(value) = update.email_enabled {
        prefs.email_enabled = value;
    }
    users::save_preferences(&state.db, &auth.address, &prefs)?;
    ok(prefs)
}

#[cfg(test)]
mod tests {
    use crate::test_support::{addr, TestApp};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::json;
    use std::io::Cursor;
    use tower::ServiceExt;

    fn png() -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::new_rgb8(4, 4)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    fn multipart(token: &str, field: &str, data: &[u8]) -> Request<Body> {
        let boundary = "voxen-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\n",
                b = boundary,
                f = field
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/api/profile/avatar")
            .header("authorization", format!("Bearer {}", token))
            .header("content-type", format!("multipart/form-data; boundary={}", boundary))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_profile_unknown_address() {
        let app = TestApp::new();
        let address = addr(7);

        let (status, body) = app.call(Method::GET, &format!("/api/profile/{}", address), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["exists"], false);
        assert_eq!(body["data"]["profile"]["address"], address);
        assert_eq!(body["data"]["profile"]["display_name"], "");

        let (status, _) = app.call(Method::GET, "/api/profile/0xnonexistent123", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_profile_and_username_clash() {
        let app = TestApp::new();
        let alice = app.user(&addr(1));
        let bob = app.user(&addr(2));

        let (status, body) = app
            .call(
                Method::PUT,
                "/api/profile",
                Some(&alice),
                Some(json!({ "username": "Alice", "display_name": "Alice A.", "bio": "gm" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["username"], "alice");

        let (status, body) = app
            .call(Method::PUT, "/api/profile", Some(&bob), Some(json!({ "username": "alice" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Username already taken");

        let (_, body) = app.call(Method::GET, &format!("/api/profile/{}", addr(1)), None, None).await;
        assert_eq!(body["data"]["exists"], true);
        assert_eq!(body["data"]["profile"]["bio"], "gm");
    }

    #[tokio::test]
    async fn test_avatar_upload_and_fetch() {
        let app = TestApp::new();
        let address = addr(3);
        let token = app.user(&address);

        let response = app.app.clone().oneshot(multipart(&token, "avatar", b"not an image")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let image = png();
        let response = app.app.clone().oneshot(multipart(&token, "avatar", &image)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .uri(format!("/api/profile/{}/avatar", address))
            .body(Body::empty())
            .unwrap();
        let response = app.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/png");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.to_vec(), image);

        let (status, _) = app.call(Method::GET, &format!("/api/profile/{}/avatar", addr(4)), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_notification_preferences() {
        let app = TestApp::new();
        let token = app.user(&addr(1));

        let (_, body) = app.call(Method::GET, "/api/profile/notifications", Some(&token), None).await;
        assert_eq!(body["data"]["email_enabled"], false);
        assert_eq!(body["data"]["new_proposal"], true);

        let (status, body) = app
            .call(
                Method::PUT,
                "/api/profile/notifications",
                Some(&token),
                Some(json!({ "email_enabled": true, "discussion_reply": false })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email_enabled"], true);
        assert_eq!(body["data"]["discussion_reply"], false);
        assert_eq!(body["data"]["proposal_closed"], true);

        let (status, _) = app.call(Method::GET, "/api/profile/notifications", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
