//! Shared fixtures for handler tests: a temp store, test config and a
//! request helper that returns the decoded JSON envelope.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use voxen_chain::Network;
use voxen_database::{InnerDatabase, SafeDatabase};
use voxen_service::parser::NotificationPreferences;
use voxen_service::repo::users;

use crate::auth::issue_token;
use crate::config::{Config, MailerKind};
use crate::mailer::{LogMailer, SentMail};
use crate::server::build_app;
use crate::state::AppState;

pub const SECRET: &str = "test-secret-test-secret-test-secret";

pub fn test_config() -> Config {
    Config {
        bind: ([127, 0, 0, 1], 0).into(),
        db_path: "unused".into(),
        jwt_secret: SECRET.to_string(),
        jwt_ttl: Duration::hours(1),
        network: Network::BaseSepolia,
        cors_origin: None,
        social_cooldown: Duration::days(7),
        otp_ttl: Duration::minutes(10),
        otp_resend_cooldown: Duration::seconds(60),
        nonce_ttl: Duration::minutes(10),
        mailer: MailerKind::Log,
        mail_from: "no-reply@test".to_string(),
        app_url: "http://app.test".to_string(),
        twitter: None,
    }
}

pub struct TestApp {
    pub state: AppState<InnerDatabase>,
    pub app: Router,
    pub mailer: Arc<LogMailer>,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = InnerDatabase::new(dir.path().join("test_db")).expect("open test db");
        let mailer = Arc::new(LogMailer::new());
        let state = AppState::new(db, config, mailer.clone());
        let app = build_app(state.clone());
        Self { state, app, mailer, _dir: dir }
    }

    pub fn token(&self, address: &str) -> String {
        issue_token(SECRET, address, Utc::now(), Duration::hours(1)).expect("token")
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Logs `address` in implicitly by creating its profile.
    pub fn user(&self, address: &str) -> String {
        users::get_or_create(&self.state.db, address, Utc::now()).expect("user");
        self.token(address)
    }

    /// Gives `address` a verified email with mail turned on, then lets
    /// `tweak` adjust the per-event switches.
    pub fn subscribe(&self, address: &str, email: &str, tweak: impl FnOnce(&mut NotificationPreferences)) {
        let mut profile = users::require(&self.state.db, address).expect("profile");
        profile.email = Some(email.to_string());
        profile.email_verified = true;
        users::save(&self.state.db, &profile).expect("save profile");

        let mut prefs = NotificationPreferences { email_enabled: true, ..Default::default() };
        tweak(&mut prefs);
        users::save_preferences(&self.state.db, address, &prefs).expect("save preferences");
    }

    /// Notifications go out on spawned tasks; waits until `count` mails
    /// arrived (or a short deadline passed) and returns the outbox.
    pub async fn outbox_after(&self, count: usize) -> Vec<SentMail> {
        for _ in 0..50 {
            if self.mailer.outbox().len() >= count {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        // let any task still running finish before the caller counts
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        self.mailer.outbox()
    }
}

pub fn addr(n: u8) -> String {
    format!("0x{:040x}", n)
}
