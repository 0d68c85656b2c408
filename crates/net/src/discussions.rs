use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use voxen_database::SafeDatabase;
use voxen_service::parser::{ActivityKind, DiscussionMessage};
use voxen_service::repo::activities::{self, NewActivity};
use voxen_service::repo::discussions;
use voxen_service::rules::validate;

use crate::access::{member_of, readable_proposal};
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::error::{created, ok, ApiError, ApiResult, CreatedResult};
use crate::extract::{Json, Path};
use crate::mailer::{notify_user, Notice};
use crate::relay::ServerEvent;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct MessageBody {
    text: String,
}

/// Stores a message from `author` and fans it out to the proposal's room.
/// Shared by the REST endpoint and the relay's `send_message` event.
pub fn post_message<D: SafeDatabase>(
    state: &AppState<D>,
    proposal_id: &str,
    author: &str,
    text: &str,
) -> Result<DiscussionMessage, ApiError> {
    let (proposal, space, _) = readable_proposal(&state.db, proposal_id, Some(author))?;
    member_of(&state.db, &space.id, author, "join the discussion")?;
    let text = validate::message_text(text)?;

    let now = Utc::now();
    let message = DiscussionMessage {
        id: Uuid::new_v4().to_string(),
        proposal_id: proposal.id.clone(),
        author: author.to_string(),
        text,
        edited: false,
        created_at: now,
        updated_at: now,
    };
    discussions::insert(&state.db, &message)?;

    activities::record(
        &state.db,
        NewActivity {
            space_id: Some(&space.id),
            actor: author,
            kind: ActivityKind::DiscussionPosted,
            description: format!("Commented on \"{}\"", proposal.title),
            metadata: json!({ "proposal_id": proposal.id, "message_id": message.id }),
        },
        now,
    )?;

    if proposal.author != author {
        notify_user(
            state.db.clone(),
            state.mailer.clone(),
            proposal.author.clone(),
            Notice {
                subject: format!("New comment on \"{}\"", proposal.title),
                body: format!("{} wrote:\n\n{}", author, message.text),
                wants: |prefs| prefs.discussion_reply,
            },
        );
    }

    state.relay.publish(&proposal.id, ServerEvent::NewMessage { message: message.clone() });
    info!(proposal = %proposal.id, %author, "discussion message posted");
    Ok(message)
}

pub async fn list_messages<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    viewer: MaybeAuthUser,
    Path(proposal_id): Path<String>,
) -> ApiResult<Vec<DiscussionMessage>> {
    let (proposal, _, _) = readable_proposal(&state.db, &proposal_id, viewer.address())?;
    ok(discussions::list(&state.db, &proposal.id)?)
}

pub async fn create_message<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(proposal_id): Path<String>,
    Json(body): Json<MessageBody>,
) -> CreatedResult<DiscussionMessage> {
    created(post_message(&state, &proposal_id, &auth.address, &body.text)?)
}

pub async fn edit_message<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<MessageBody>,
) -> ApiResult<DiscussionMessage> {
    let mut message = discussions::require(&state.db, &id)?;
    if message.author != auth.address {
        return Err(ApiError::forbidden("Only the author can edit this message"));
    }

    message.text = validate::message_text(&body.text)?;
    message.edited = true;
    message.updated_at = Utc::now();
    discussions::save(&state.db, &message)?;

    state
        .relay
        .publish(&message.proposal_id, ServerEvent::MessageUpdated { message: message.clone() });
    ok(message)
}

pub async fn delete_message<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let message = discussions::require(&state.db, &id)?;
    if message.author != auth.address {
        return Err(ApiError::forbidden("Only the author can delete this message"));
    }
    discussions::delete(&state.db, &message)?;

    state.relay.publish(
        &message.proposal_id,
        ServerEvent::MessageDeleted {
            proposal_id: message.proposal_id.clone(),
            id: message.id.clone(),
        },
    );
    ok(json!({ "id": message.id }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{addr, TestApp};
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    async fn proposal(app: &TestApp, owner_token: &str) -> String {
        let (_, space) = app
            .call(Method::POST, "/api/spaces", Some(owner_token), Some(json!({ "name": "Talk", "username": "talk" })))
            .await;
        let space_id = space["data"]["id"].as_str().unwrap().to_string();
        let (status, proposal) = app
            .call(
                Method::POST,
                &format!("/api/spaces/{}/proposals", space_id),
                Some(owner_token),
                Some(json!({
                    "title": "Topic",
                    "options": ["A", "B"],
                    "end_date": (chrono::Utc::now() + chrono::Duration::days(3)).to_rfc3339(),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        proposal["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_post_edit_delete_by_author_only() {
        let app = TestApp::new();
        let owner = app.user(&addr(1));
        let stranger = app.user(&addr(2));
        let id = proposal(&app, &owner).await;
        let uri = format!("/api/proposals/{}/discussions", id);

        let (status, _) = app.call(Method::POST, &uri, Some(&stranger), Some(json!({ "text": "hi" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.call(Method::POST, &uri, Some(&owner), Some(json!({ "text": "  first  " }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["text"], "first");
        let message_id = body["data"]["id"].as_str().unwrap().to_string();
        let message_uri = format!("/api/discussions/{}", message_id);

        let (status, body) = app
            .call(Method::PUT, &message_uri, Some(&stranger), Some(json!({ "text": "hijack" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Only the author can edit this message");

        let (status, body) = app
            .call(Method::PUT, &message_uri, Some(&owner), Some(json!({ "text": "edited" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["edited"], true);

        let (status, _) = app.call(Method::DELETE, &message_uri, Some(&stranger), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.call(Method::DELETE, &message_uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, list) = app.call(Method::GET, &uri, None, None).await;
        assert_eq!(list["data"], Value::Array(vec![]));
    }

    #[tokio::test]
    async fn test_reply_mails_the_proposal_author() {
        let app = TestApp::new();
        let owner = app.user(&addr(1));
        let member = app.user(&addr(2));
        app.subscribe(&addr(1), "author@voxen.app", |_| {});
        let id = proposal(&app, &owner).await;
        app.call(Method::POST, "/api/spaces/talk/join", Some(&member), None).await;
        let uri = format!("/api/proposals/{}/discussions", id);

        let (status, _) = app.call(Method::POST, &uri, Some(&member), Some(json!({ "text": "why B?" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let outbox = app.outbox_after(1).await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].to, "author@voxen.app");
        assert_eq!(outbox[0].subject, "New comment on \"Topic\"");
        assert!(outbox[0].body.ends_with("why B?"));

        // the author's own comments do not mail them
        app.call(Method::POST, &uri, Some(&owner), Some(json!({ "text": "because" }))).await;
        assert_eq!(app.outbox_after(2).await.len(), 1);

        let (status, _) = app
            .call(Method::PUT, "/api/profile/notifications", Some(&owner), Some(json!({ "discussion_reply": false })))
            .await;
        assert_eq!(status, StatusCode::OK);
        app.call(Method::POST, &uri, Some(&member), Some(json!({ "text": "fair" }))).await;
        assert_eq!(app.outbox_after(2).await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_and_oversized_messages_rejected() {
        let app = TestApp::new();
        let owner = app.user(&addr(1));
        let id = proposal(&app, &owner).await;
        let uri = format!("/api/proposals/{}/discussions", id);

        let (status, _) = app.call(Method::POST, &uri, Some(&owner), Some(json!({ "text": "   " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let long = "x".repeat(2001);
        let (status, _) = app.call(Method::POST, &uri, Some(&owner), Some(json!({ "text": long }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
