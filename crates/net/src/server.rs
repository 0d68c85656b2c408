use axum::http::{self, HeaderValue};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use voxen_database::{DbError, InnerDatabase, SafeDatabase};

use crate::activity::*;
use crate::config::{Config, MailerKind};
use crate::discussions::*;
use crate::email::*;
use crate::error::{ok, ApiResult};
use crate::mailer::{LogMailer, Mailer, SesMailer};
use crate::profile::*;
use crate::proposals::*;
use crate::relay::ws_handler;
use crate::router::*;
use crate::session::*;
use crate::spaces::*;
use crate::state::AppState;
use crate::twitter;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to open database at {path}: {source}")]
    Database { path: String, source: DbError },

    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

async fn health() -> ApiResult<Value> {
    ok(json!({ "status": "ok" }))
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let allow_origin = match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(e)) => {
            warn!("ignoring invalid CORS_ORIGIN: {}", e);
            AllowOrigin::from(Any)
        }
        None => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_credentials(false)
}

pub fn build_app<D: SafeDatabase>(state: AppState<D>) -> Router {
    let cors = cors_layer(state.config.cors_origin.as_deref());

    main_router(collect_components::<D>(), state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn build_server(config: Config) -> Result<(), ServerError> {
    let db = InnerDatabase::new(&config.db_path).map_err(|source| ServerError::Database {
        path: config.db_path.display().to_string(),
        source: source.into(),
    })?;

    let mailer: Arc<dyn Mailer> = match config.mailer {
        MailerKind::Ses => Arc::new(SesMailer::from_env(config.mail_from.clone()).await),
        MailerKind::Log => Arc::new(LogMailer::new()),
    };

    let bind = config.bind;
    let network = config.network;
    let app = build_app(AppState::new(db, config, mailer));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| ServerError::Bind { addr: bind.to_string(), source })?;
    info!(%bind, %network, "voxen listening");

    axum::serve(listener, app).await?;
    Ok(())
}

fn collect_components<D: SafeDatabase>() -> Vec<(String, Router<AppState<D>>)> {
    vec![
        get_router_builder("/health", health),
        get_router_builder("/ws", ws_handler::<D>),

        // 인증
        post_router_builder("/api/auth/nonce", request_nonce::<D>),
        post_router_builder("/api/auth/verify", verify_login::<D>),
        get_router_builder("/api/auth/me", me::<D>),
        post_router_builder("/api/auth/email/send-otp", send_otp::<D>),
        post_router_builder("/api/auth/email/verify-otp", verify_otp::<D>),
        get_router_builder("/api/auth/twitter/connect", twitter::connect::<D>),
        get_router_builder("/api/auth/twitter/callback", twitter::callback::<D>),
        post_router_builder("/api/auth/twitter/disconnect", twitter::disconnect::<D>),

        // 프로필
        put_router_builder("/api/profile", update_profile::<D>),
        post_router_builder("/api/profile/avatar", upload_avatar::<D>),
        get_router_builder("/api/profile/notifications", get_preferences::<D>),
        put_router_builder("/api/profile/notifications", update_preferences::<D>),
        get_router_builder("/api/profile/{address}", get_profile::<D>),
        get_router_builder("/api/profile/{address}/avatar", get_avatar::<D>),

        // 스페이스
        post_router_builder("/api/spaces", create_space::<D>),
        get_router_builder("/api/spaces", list_spaces::<D>),
        get_router_builder("/api/spaces/mine", my_spaces::<D>),
        get_router_builder("/api/spaces/{space}", get_space::<D>),
        put_router_builder("/api/spaces/{space}", update_space::<D>),
        delete_router_builder("/api/spaces/{space}", delete_space::<D>),
        post_router_builder("/api/spaces/{space}/join", join_space::<D>),
        post_router_builder("/api/spaces/{space}/leave", leave_space::<D>),
        get_router_builder("/api/spaces/{space}/members", list_members::<D>),
        post_router_builder("/api/spaces/{space}/members", add_member::<D>),
        put_router_builder("/api/spaces/{space}/members/{address}", change_role::<D>),
        delete_router_builder("/api/spaces/{space}/members/{address}", remove_member::<D>),
        get_router_builder("/api/spaces/{space}/proposals", list_space_proposals::<D>),
        post_router_builder("/api/spaces/{space}/proposals", create_proposal::<D>),
        get_router_builder("/api/spaces/{space}/activities", space_activities::<D>),

        // 제안
        get_router_builder("/api/proposals/{id}", get_proposal::<D>),
        put_router_builder("/api/proposals/{id}", update_proposal::<D>),
        delete_router_builder("/api/proposals/{id}", delete_proposal::<D>),
        post_router_builder("/api/proposals/{id}/publish", publish_proposal::<D>),
        post_router_builder("/api/proposals/{id}/close", close_proposal::<D>),
        post_router_builder("/api/proposals/{id}/cancel", cancel_proposal::<D>),
        post_router_builder("/api/proposals/{id}/vote", cast_vote::<D>),
        get_router_builder("/api/proposals/{id}/votes", list_votes::<D>),
        get_router_builder("/api/proposals/{id}/my-vote", my_vote::<D>),
        get_router_builder("/api/proposals/{id}/results", results::<D>),
        post_router_builder("/api/proposals/{id}/attestation", attest::<D>),
        get_router_builder("/api/proposals/{id}/discussions", list_messages::<D>),
        post_router_builder("/api/proposals/{id}/discussions", create_message::<D>),

        // 토론
        put_router_builder("/api/discussions/{id}", edit_message::<D>),
        delete_router_builder("/api/discussions/{id}", delete_message::<D>),

        get_router_builder("/api/activities/me", my_activities::<D>),
    ]
}
