//! Outgoing email: OTP codes and proposal notifications.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};
use voxen_database::SafeDatabase;
use voxen_service::parser::{NotificationPreferences, Space};
use voxen_service::repo::{members, users};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to send email: {0}")]
    Send(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

pub struct SesMailer {
    client: aws_sdk_sesv2::Client,
    from: String,
}

impl SesMailer {
    pub async fn from_env(from: String) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        info!("AWS SES client initialized");
        Self {
            client: aws_sdk_sesv2::Client::new(&config),
            from,
        }
    }
}

fn utf8(data: &str) -> Result<Content, MailError> {
    Content::builder()
        .data(data)
        .charset("UTF-8")
        .build()
        .map_err(|e| MailError::Build(e.to_string()))
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let message = Message::builder()
            .subject(utf8(subject)?)
            .body(Body::builder().text(utf8(body)?).build())
            .build()
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.client
            .send_email()
            .from_email_address(&self.from)
            .destination(Destination::builder().to_addresses(to).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .map_err(|e| MailError::Send(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Development mailer: logs each message and keeps it in memory.
#[derive(Default)]
pub struct LogMailer {
    outbox: Mutex<Vec<SentMail>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outbox(&self) -> Vec<SentMail> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        info!(to, subject, "email (log mailer): {}", body);
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.push(SentMail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        }
        Ok(())
    }
}

/// Who gets a notification and what it says.
pub struct Notice {
    pub subject: String,
    pub body: String,
    pub wants: fn(&NotificationPreferences) -> bool,
}

/// Emails every member of `space` except `except` (usually the actor).
/// Runs detached; failures are only logged.
pub fn notify_members<D: SafeDatabase>(db: D, mailer: Arc<dyn Mailer>, space: Space, except: String, notice: Notice) {
    tokio::spawn(async move {
        let recipients = match members::list(&db, &space.id) {
            Ok(memberships) => memberships
                .into_iter()
                .map(|m| m.address)
                .filter(|address| *address != except)
                .collect(),
            Err(e) => {
                warn!(space = %space.id, "could not load members for notification: {}", e);
                return;
            }
        };
        deliver(&db, mailer.as_ref(), recipients, &notice).await;
    });
}

pub fn notify_user<D: SafeDatabase>(db: D, mailer: Arc<dyn Mailer>, address: String, notice: Notice) {
    tokio::spawn(async move {
        deliver(&db, mailer.as_ref(), vec![address], &notice).await;
    });
}

async fn deliver<D: SafeDatabase>(db: &D, mailer: &dyn Mailer, recipients: Vec<String>, notice: &Notice) {
    for address in recipients {
        let recipient = match (users::get(db, &address), users::preferences(db, &address)) {
            (Ok(Some(user)), Ok(prefs)) if prefs.email_enabled && (notice.wants)(&prefs) => {
                user.deliverable_email().map(str::to_string)
            }
            _ => None,
        };

        if let Some(to) = recipient {
            if let Err(e) = mailer.send(&to, &notice.subject, &notice.body).await {
                warn!(to = %to, "notification not delivered: {}", e);
            }
        }
    }
}
