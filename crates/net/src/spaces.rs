//! Space CRUD, membership and the per-space activity feed.

use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use voxen_chain::normalize_address;
use voxen_database::SafeDatabase;
use voxen_service::parser::{Activity, ActivityKind, Membership, Role, Space, Visibility, VotingStrategy};
use voxen_service::repo::activities::{self, NewActivity};
use voxen_service::repo::{members, spaces, users};
use voxen_service::rules::{roles, validate};

use crate::access::{member_of, readable_space, PageQuery};
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::error::{created, ok, ApiError, ApiResult, CreatedResult};
use crate::extract::{Json, Path, Query};
use crate::state::AppState;

const MAX_NAME_LEN: usize = 100;
const MAX_SPACE_DESCRIPTION_LEN: usize = 2_000;
const MAX_URL_LEN: usize = 500;

#[derive(Deserialize)]
pub struct CreateSpace {
    name: String,
    username: String,
    #[serde(default)]
    description: String,
    avatar_url: Option<String>,
    website: Option<String>,
    visibility: Option<Visibility>,
    voting_strategy: Option<VotingStrategy>,
}

#[derive(Deserialize)]
pub struct UpdateSpace {
    name: Option<String>,
    username: Option<String>,
    description: Option<String>,
    avatar_url: Option<String>,
    website: Option<String>,
    visibility: Option<Visibility>,
    voting_strategy: Option<VotingStrategy>,
}

#[derive(Deserialize)]
pub struct SpaceQuery {
    search: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct AddMember {
    address: String,
    role: Option<Role>,
}

#[derive(Deserialize)]
pub struct ChangeRole {
    role: Role,
}

/// A space together with the caller's role in it, if any.
#[derive(Serialize)]
pub struct SpaceView {
    #[serde(flatten)]
    space: Space,
    role: Option<Role>,
}

fn optional_url(value: Option<String>, field: &str) -> Result<Option<String>, ApiError> {
    match value {
        Some(url) => {
            let url = validate::bounded(&url, field, MAX_URL_LEN)?;
            Ok(if url.is_empty() { None } else { Some(url) })
        }
        None => Ok(None),
    }
}

fn record<D: SafeDatabase>(
    db: &D,
    space: &Space,
    actor: &str,
    kind: ActivityKind,
    description: String,
    metadata: serde_json::Value,
) -> Result<Activity, ApiError> {
    Ok(activities::record(
        db,
        NewActivity { space_id: Some(&space.id), actor, kind, description, metadata },
        Utc::now(),
    )?)
}

pub async fn create_space<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Json(body): Json<CreateSpace>,
) -> CreatedResult<SpaceView> {
    let now = Utc::now();
    let space = Space {
        id: Uuid::new_v4().to_string(),
        name: validate::required(&body.name, "Name", MAX_NAME_LEN)?,
        username: validate::space_username(&body.username)?,
        description: validate::bounded(&body.description, "Description", MAX_SPACE_DESCRIPTION_LEN)?,
        avatar_url: optional_url(body.avatar_url, "Avatar URL")?,
        website: optional_url(body.website, "Website")?,
        visibility: body.visibility.unwrap_or(Visibility::Public),
        voting_strategy: body.voting_strategy.unwrap_or_default(),
        owner: auth.address.clone(),
        member_count: 1,
        proposal_count: 0,
        created_at: now,
        updated_at: now,
    };

    users::get_or_create(&state.db, &auth.address, now)?;
    spaces::insert(&state.db, &space)?;
    members::save(
        &state.db,
        &Membership {
            space_id: space.id.clone(),
            address: auth.address.clone(),
            role: Role::Owner,
            joined_at: now,
        },
    )?;
    record(
        &state.db,
        &space,
        &auth.address,
        ActivityKind::SpaceCreated,
        format!("Created space {}", space.name),
        json!({ "username": space.username }),
    )?;

    info!(space = %space.id, username = %space.username, owner = %auth.address, "space created");
    created(SpaceView { space, role: Some(Role::Owner) })
}

pub async fn list_spaces<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    viewer: MaybeAuthUser,
    Query(query): Query<SpaceQuery>,
) -> ApiResult<Vec<SpaceView>> {
    let (limit, offset) = PageQuery { limit: query.limit, offset: query.offset }.bounds();
    let search = query.search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());

    let mut visible = Vec::new();
    for space in spaces::list(&state.db)? {
        if let Some(term) = &search {
            if !space.name.to_lowercase().contains(term) && !space.username.contains(term.as_str()) {
                continue;
            }
        }
        let role = match viewer.address() {
            Some(address) => members::role_of(&state.db, &space.id, address)?,
            None => None,
        };
        if space.is_public() || role.is_some() {
            visible.push(SpaceView { space, role });
        }
    }

    visible.sort_by(|a, b| {
        b.space
            .member_count
            .cmp(&a.space.member_count)
            .then(b.space.created_at.cmp(&a.space.created_at))
    });
    ok(visible.into_iter().skip(offset).take(limit).collect())
}

pub async fn my_spaces<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
) -> ApiResult<Vec<SpaceView>> {
    let mut mine = Vec::new();
    for membership in members::of_user(&state.db, &auth.address)? {
        if let Some(space) = spaces::get(&state.db, &membership.space_id)? {
            mine.push(SpaceView { space, role: Some(membership.role) });
        }
    }
    mine.sort_by(|a, b| a.space.name.to_lowercase().cmp(&b.space.name.to_lowercase()));
    ok(mine)
}

pub async fn get_space<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    viewer: MaybeAuthUser,
    Path(space): Path<String>,
) -> ApiResult<SpaceView> {
    let (space, role) = readable_space(&state.db, &space, viewer.address())?;
    ok(SpaceView { space, role })
}

pub async fn update_space<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(space): Path<String>,
    Json(body): Json<UpdateSpace>,
) -> ApiResult<SpaceView> {
    let mut space = spaces::resolve(&state.db, &space)?;
    let role = members::role_of(&state.db, &space.id, &auth.address)?;
    if !roles::can_manage_space(role) {
        return Err(ApiError::forbidden("Only the owner or an admin can update this space"));
    }

    if let Some(name) = body.name {
        space.name = validate::required(&name, "Name", MAX_NAME_LEN)?;
    }
    if let Some(username) = body.username {
        let username = validate::space_username(&username)?;
        spaces::rename(&state.db, &mut space, &username)?;
    }
    if let Some(description) = body.description {
        space.description = validate::bounded(&description, "Description", MAX_SPACE_DESCRIPTION_LEN)?;
    }
    if body.avatar_url.is_some() {
        space.avatar_url = optional_url(body.avatar_url, "Avatar URL")?;
    }
    if body.website.is_some() {
        space.website = optional_url(body.website, "Website")?;
    }
    if let Some(visibility) = body.visibility {
        space.visibility = visibility;
    }
    if let Some(strategy) = body.voting_strategy {
        space.voting_strategy = strategy;
    }
    space.updated_at = Utc::now();
    spaces::save(&state.db, &space)?;

    record(
        &state.db,
        &space,
        &auth.address,
        ActivityKind::SpaceUpdated,
        format!("Updated space {}", space.name),
        json!({}),
    )?;
    ok(SpaceView { space, role })
}

pub async fn delete_space<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(space): Path<String>,
) -> ApiResult<serde_json::Value> {
    let space = spaces::resolve(&state.db, &space)?;
    let role = members::role_of(&state.db, &space.id, &auth.address)?;
    if !roles::can_delete_space(role) {
        return Err(ApiError::forbidden("Only the owner can delete this space"));
    }

    spaces::delete(&state.db, &space)?;
    info!(space = %space.id, by = %auth.address, "space deleted");
    ok(json!({ "id": space.id }))
}

pub async fn join_space<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(space): Path<String>,
) -> ApiResult<Membership> {
    let mut space = spaces::resolve(&state.db, &space)?;
    if !space.is_public() {
        return Err(ApiError::forbidden("This space is private"));
    }
    if members::get(&state.db, &space.id, &auth.address)?.is_some() {
        return Err(ApiError::validation("Already a member of this space"));
    }

    let now = Utc::now();
    users::get_or_create(&state.db, &auth.address, now)?;
    let membership = Membership {
        space_id: space.id.clone(),
        address: auth.address.clone(),
        role: Role::Member,
        joined_at: now,
    };
    members::save(&state.db, &membership)?;
    space.member_count += 1;
    spaces::save(&state.db, &space)?;

    record(
        &state.db,
        &space,
        &auth.address,
        ActivityKind::MemberJoined,
        format!("Joined {}", space.name),
        json!({}),
    )?;
    ok(membership)
}

pub async fn leave_space<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(space): Path<String>,
) -> ApiResult<serde_json::Value> {
    let mut space = spaces::resolve(&state.db, &space)?;
    let role = members::role_of(&state.db, &space.id, &auth.address)?
        .ok_or_else(|| ApiError::validation("Not a member of this space"))?;
    if role == Role::Owner {
        return Err(ApiError::validation("The owner cannot leave the space"));
    }

    members::remove(&state.db, &space.id, &auth.address)?;
    space.member_count = space.member_count.saturating_sub(1);
    spaces::save(&state.db, &space)?;

    record(
        &state.db,
        &space,
        &auth.address,
        ActivityKind::MemberLeft,
        format!("Left {}", space.name),
        json!({}),
    )?;
    ok(json!({ "space_id": space.id }))
}

pub async fn list_members<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    viewer: MaybeAuthUser,
    Path(space): Path<String>,
) -> ApiResult<Vec<Membership>> {
    let (space, _) = readable_space(&state.db, &space, viewer.address())?;
    let mut memberships = members::list(&state.db, &space.id)?;
    memberships.sort_by(|a, b| b.role.cmp(&a.role).then(a.joined_at.cmp(&b.joined_at)));
    ok(memberships)
}

/// Direct add by an owner or admin; the only way into a private space.
pub async fn add_member<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(space): Path<String>,
    Json(body): Json<AddMember>,
) -> CreatedResult<Membership> {
    let mut space = spaces::resolve(&state.db, &space)?;
    let actor = member_of(&state.db, &space.id, &auth.address, "add members")?;
    let role = body.role.unwrap_or(Role::Member);
    if !roles::can_manage_space(Some(actor)) || role >= actor {
        return Err(ApiError::forbidden("Not allowed to add members with this role"));
    }

    let address = normalize_address(&body.address)?;
    if members::get(&state.db, &space.id, &address)?.is_some() {
        return Err(ApiError::validation("Already a member of this space"));
    }

    let now = Utc::now();
    users::get_or_create(&state.db, &address, now)?;
    let membership = Membership {
        space_id: space.id.clone(),
        address: address.clone(),
        role,
        joined_at: now,
    };
    members::save(&state.db, &membership)?;
    space.member_count += 1;
    spaces::save(&state.db, &space)?;

    record(
        &state.db,
        &space,
        &auth.address,
        ActivityKind::MemberJoined,
        format!("Added {} to {}", address, space.name),
        json!({ "member": address, "role": role }),
    )?;
    created(membership)
}

pub async fn change_role<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path((space, address)): Path<(String, String)>,
    Json(body): Json<ChangeRole>,
) -> ApiResult<Membership> {
    let space = spaces::resolve(&state.db, &space)?;
    let address = normalize_address(&address)?;
    let actor = member_of(&state.db, &space.id, &auth.address, "change roles")?;
    let mut target = members::get(&state.db, &space.id, &address)?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;

    if !roles::can_change_role(actor, target.role, body.role) {
        return Err(ApiError::forbidden("Not allowed to change this member's role"));
    }

    let previous = target.role;
    target.role = body.role;
    members::save(&state.db, &target)?;

    record(
        &state.db,
        &space,
        &auth.address,
        ActivityKind::RoleChanged,
        format!("Changed role of {} from {} to {}", address, previous, body.role),
        json!({ "member": address, "from": previous, "to": body.role }),
    )?;
    ok(target)
}

pub async fn remove_member<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path((space, address)): Path<(String, String)>,
) -> ApiResult<serde_json::Value> {
    let mut space = spaces::resolve(&state.db, &space)?;
    let address = normalize_address(&address)?;
    let actor = member_of(&state.db, &space.id, &auth.address, "remove members")?;
    let target = members::role_of(&state.db, &space.id, &address)?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;

    if !roles::can_remove(actor, target) {
        return Err(ApiError::forbidden("Not allowed to remove this member"));
    }

    members::remove(&state.db, &space.id, &address)?;
    space.member_count = space.member_count.saturating_sub(1);
    spaces::save(&state.db, &space)?;

    record(
        &state.db,
        &space,
        &auth.address,
        ActivityKind::MemberRemoved,
        format!("Removed {} from {}", address, space.name),
        json!({ "member": address }),
    )?;
    ok(json!({ "space_id": space.id, "address": address }))
}

pub async fn space_activities<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    viewer: MaybeAuthUser,
    Path(space): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<Activity>> {
    let (space, _) = readable_space(&state.db, &space, viewer.address())?;
    let (limit, offset) = page.bounds();
    ok(activities::list_for_space(&state.db, &space.id, limit, offset)?)
}
