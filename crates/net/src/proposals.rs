//! Proposal lifecycle, voting and results.
//!
//! Stored status only moves through explicit calls (publish, close, cancel);
//! readers additionally get `effective_status`, which accounts for the clock.
//! Voting always checks the clock, whatever the stored status says.

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;
use voxen_chain::{parse_tx_hash, proposal_digest, vote_digest, B256};
use voxen_database::SafeDatabase;
use voxen_service::parser::{ActivityKind, EffectiveStatus, Proposal, ProposalStatus, Space, Vote, VotingType};
use voxen_service::repo::activities::{self, NewActivity};
use voxen_service::repo::{proposals, spaces, votes};
use voxen_service::rules::tally::{self, Tally};
use voxen_service::rules::{roles, status, validate};

use crate::access::{can_see_proposal, member_of, readable_proposal, readable_space};
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::error::{created, ok, ApiError, ApiResult, CreatedResult};
use crate::extract::{Json, Path, Query};
use crate::mailer::{notify_members, Notice};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateProposal {
    title: String,
    #[serde(default)]
    description: String,
    options: Vec<String>,
    voting_type: Option<VotingType>,
    start_date: Option<DateTime<Utc>>,
    end_date: DateTime<Utc>,
    /// `false` keeps the proposal as a draft.
    publish: Option<bool>,
}

#[derive(Deserialize)]
pub struct UpdateProposal {
    title: Option<String>,
    description: Option<String>,
    options: Option<Vec<String>>,
    voting_type: Option<VotingType>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    status: Option<ProposalStatus>,
}

#[derive(Deserialize)]
pub struct CastVote {
    choices: Vec<u32>,
    tx_hash: Option<String>,
}

#[derive(Deserialize)]
pub struct Attestation {
    tx_hash: String,
}

#[derive(Serialize)]
pub struct ProposalView {
    #[serde(flatten)]
    proposal: Proposal,
    effective_status: EffectiveStatus,
    tally: Tally,
    digest: String,
}

impl ProposalView {
    fn new(proposal: Proposal, now: DateTime<Utc>) -> Self {
        let effective_status = status::effective_status(&proposal, now);
        let tally = tally::summarize(&proposal);
        let digest = format!("{:#x}", digest_of(&proposal));
        Self { proposal, effective_status, tally, digest }
    }
}

#[derive(Serialize)]
pub struct VoteReceipt {
    vote: Vote,
    tally: Tally,
    digest: String,
}

#[derive(Serialize)]
pub struct AttestationReceipt {
    proposal_id: String,
    tx_hash: String,
    digest: String,
    explorer_url: String,
}

fn digest_of(proposal: &Proposal) -> B256 {
    proposal_digest(
        &proposal.id,
        &proposal.space_id,
        &proposal.title,
        &proposal.options,
        proposal.end_date.timestamp(),
    )
}

fn managed_proposal<D: SafeDatabase>(
    db: &D,
    proposal_id: &str,
    actor: &str,
) -> Result<(Proposal, Space), ApiError> {
    let (proposal, space, role) = readable_proposal(db, proposal_id, Some(actor))?;
    if !roles::can_manage_proposal(role, actor, &proposal.author) {
        return Err(ApiError::forbidden("Only the author or a space admin can manage this proposal"));
    }
    Ok((proposal, space))
}

fn record<D: SafeDatabase>(
    db: &D,
    proposal: &Proposal,
    actor: &str,
    kind: ActivityKind,
    description: String,
) -> Result<(), ApiError> {
    activities::record(
        db,
        NewActivity {
            space_id: Some(&proposal.space_id),
            actor,
            kind,
            description,
            metadata: json!({ "proposal_id": proposal.id }),
        },
        Utc::now(),
    )?;
    Ok(())
}

fn announce<D: SafeDatabase>(state: &AppState<D>, space: &Space, proposal: &Proposal, actor: &str) {
    notify_members(
        state.db.clone(),
        state.mailer.clone(),
        space.clone(),
        actor.to_string(),
        Notice {
            subject: format!("New proposal in {}: {}", space.name, proposal.title),
            body: format!(
                "Voting is open until {}.\n\n{}/proposals/{}",
                proposal.end_date.to_rfc2822(),
                state.config.app_url,
                proposal.id
            ),
            wants: |prefs| prefs.new_proposal,
        },
    );
}

pub async fn list_space_proposals<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    viewer: MaybeAuthUser,
    Path(space): Path<String>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Vec<ProposalView>> {
    let (space, role) = readable_space(&state.db, &space, viewer.address())?;
    let now = Utc::now();
    let listed = proposals::list_filtered(&state.db, &space.id, query.status)?
        .into_iter()
        .filter(|p| can_see_proposal(p, role, viewer.address()))
        .map(|p| ProposalView::new(p, now))
        .collect();
    ok(listed)
}

pub async fn create_proposal<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(space): Path<String>,
    Json(body): Json<CreateProposal>,
) -> CreatedResult<ProposalView> {
    let mut space = spaces::resolve(&state.db, &space)?;
    member_of(&state.db, &space.id, &auth.address, "create proposals")?;

    let now = Utc::now();
    let start_date = body.start_date.unwrap_or(now);
    validate::voting_window(start_date, body.end_date, now)?;
    let options = validate::options(&body.options)?;
    let status = if body.publish.unwrap_or(true) {
        ProposalStatus::Active
    } else {
        ProposalStatus::Draft
    };

    let proposal = Proposal {
        id: Uuid::new_v4().to_string(),
        space_id: space.id.clone(),
        author: auth.address.clone(),
        title: validate::required(&body.title, "Title", validate::MAX_TITLE_LEN)?,
        description: validate::bounded(&body.description, "Description", validate::MAX_DESCRIPTION_LEN)?,
        results: (0..options.len() as u32).map(|i| (i, 0)).collect::<BTreeMap<_, _>>(),
        options,
        voting_type: body.voting_type.unwrap_or(VotingType::SingleChoice),
        start_date,
        end_date: body.end_date,
        status,
        total_votes: 0,
        tx_hash: None,
        created_at: now,
        updated_at: now,
        closed_at: None,
    };
    proposals::save(&state.db, &proposal)?;
    space.proposal_count += 1;
    space.updated_at = now;
    spaces::save(&state.db, &space)?;

    record(
        &state.db,
        &proposal,
        &auth.address,
        ActivityKind::ProposalCreated,
        format!("Created proposal \"{}\"", proposal.title),
    )?;
    if proposal.status == ProposalStatus::Active {
        announce(&state, &space, &proposal, &auth.address);
    }

    info!(proposal = %proposal.id, space = %space.id, status = proposal.status.as_str(), "proposal created");
    created(ProposalView::new(proposal, now))
}

pub async fn get_proposal<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    viewer: MaybeAuthUser,
    Path(id): Path<String>,
) -> ApiResult<ProposalView> {
    let (proposal, _, _) = readable_proposal(&state.db, &id, viewer.address())?;
    ok(ProposalView::new(proposal, Utc::now()))
}

pub async fn update_proposal<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateProposal>,
) -> ApiResult<ProposalView> {
    let (mut proposal, _) = managed_proposal(&state.db, &id, &auth.address)?;
    if proposal.status.is_terminal() || proposal.total_votes > 0 {
        return Err(ApiError::validation("Proposal can no longer be edited"));
    }

    let now = Utc::now();
    if let Some(title) = body.title {
        proposal.title = validate::required(&title, "Title", validate::MAX_TITLE_LEN)?;
    }
    if let Some(description) = body.description {
        proposal.description = validate::bounded(&description, "Description", validate::MAX_DESCRIPTION_LEN)?;
    }
    if let Some(options) = body.options {
        proposal.options = validate::options(&options)?;
        proposal.results = (0..proposal.options.len() as u32).map(|i| (i, 0)).collect();
    }
    if let Some(voting_type) = body.voting_type {
        proposal.voting_type = voting_type;
    }
    if body.start_date.is_some() || body.end_date.is_some() {
        let start = body.start_date.unwrap_or(proposal.start_date);
        let end = body.end_date.unwrap_or(proposal.end_date);
        validate::voting_window(start, end, now)?;
        proposal.start_date = start;
        proposal.end_date = end;
    }
    proposal.updated_at = now;
    proposals::save(&state.db, &proposal)?;
    ok(ProposalView::new(proposal, now))
}

pub async fn delete_proposal<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let (proposal, mut space) = managed_proposal(&state.db, &id, &auth.address)?;
    proposals::delete(&state.db, &proposal.id)?;
    space.proposal_count = space.proposal_count.saturating_sub(1);
    spaces::save(&state.db, &space)?;

    info!(proposal = %proposal.id, by = %auth.address, "proposal deleted");
    ok(json!({ "id": proposal.id }))
}

pub async fn publish_proposal<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<ProposalView> {
    let (mut proposal, space) = managed_proposal(&state.db, &id, &auth.address)?;
    status::transition(proposal.status, ProposalStatus::Active)?;

    let now = Utc::now();
    if proposal.end_date <= now {
        return Err(ApiError::validation("End date must be in the future"));
    }
    proposal.status = ProposalStatus::Active;
    proposal.updated_at = now;
    proposals::save(&state.db, &proposal)?;

    record(
        &state.db,
        &proposal,
        &auth.address,
        ActivityKind::ProposalCreated,
        format!("Published proposal \"{}\"", proposal.title),
    )?;
    announce(&state, &space, &proposal, &auth.address);
    ok(ProposalView::new(proposal, now))
}

pub async fn close_proposal<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<ProposalView> {
    let (mut proposal, space) = managed_proposal(&state.db, &id, &auth.address)?;
    status::transition(proposal.status, ProposalStatus::Closed)?;

    let now = Utc::now();
    proposal.status = ProposalStatus::Closed;
    proposal.closed_at = Some(now);
    proposal.updated_at = now;
    proposals::save(&state.db, &proposal)?;

    record(
        &state.db,
        &proposal,
        &auth.address,
        ActivityKind::ProposalClosed,
        format!("Closed proposal \"{}\"", proposal.title),
    )?;

    let summary = tally::summarize(&proposal);
    let winners: Vec<&str> = summary
        .winning_options
        .iter()
        .filter_map(|i| proposal.options.get(*i as usize).map(String::as_str))
        .collect();
    notify_members(
        state.db.clone(),
        state.mailer.clone(),
        space,
        auth.address.clone(),
        Notice {
            subject: format!("Proposal closed: {}", proposal.title),
            body: format!(
                "{} votes were cast. Leading option: {}.\n\n{}/proposals/{}",
                summary.total_votes,
                if winners.is_empty() { "none".to_string() } else { winners.join(", ") },
                state.config.app_url,
                proposal.id
            ),
            wants: |prefs| prefs.proposal_closed,
        },
    );
    ok(ProposalView::new(proposal, now))
}

pub async fn cancel_proposal<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<ProposalView> {
    let (mut proposal, _) = managed_proposal(&state.db, &id, &auth.address)?;
    status::transition(proposal.status, ProposalStatus::Cancelled)?;

    let now = Utc::now();
    proposal.status = ProposalStatus::Cancelled;
    proposal.updated_at = now;
    proposals::save(&state.db, &proposal)?;

    record(
        &state.db,
        &proposal,
        &auth.address,
        ActivityKind::ProposalCancelled,
        format!("Cancelled proposal \"{}\"", proposal.title),
    )?;
    ok(ProposalView::new(proposal, now))
}

pub async fn cast_vote<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<CastVote>,
) -> ApiResult<VoteReceipt> {
    let (mut proposal, space, _) = readable_proposal(&state.db, &id, Some(&auth.address))?;
    member_of(&state.db, &space.id, &auth.address, "vote")?;

    let now = Utc::now();
    status::ensure_voting_open(&proposal, now)?;
    let choices = validate::choices(proposal.voting_type, &body.choices, proposal.options.len())?;
    let tx_hash = body.tx_hash.as_deref().map(parse_tx_hash).transpose()?;

    let vote = votes::cast(&state.db, &mut proposal, &auth.address, choices, tx_hash, now)?;
    record(
        &state.db,
        &proposal,
        &auth.address,
        ActivityKind::VoteCast,
        format!("Voted on \"{}\"", proposal.title),
    )?;

    let digest = format!("{:#x}", vote_digest(&proposal.id, &vote.voter, &vote.choices));
    ok(VoteReceipt { vote, tally: tally::summarize(&proposal), digest })
}

pub async fn list_votes<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    viewer: MaybeAuthUser,
    Path(id): Path<String>,
) -> ApiResult<Vec<Vote>> {
    let (proposal, _, _) = readable_proposal(&state.db, &id, viewer.address())?;
    let mut ballots = votes::list(&state.db, &proposal.id)?;
    ballots.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    ok(ballots)
}

pub async fn my_vote<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Option<Vote>> {
    let (proposal, _, _) = readable_proposal(&state.db, &id, Some(&auth.address))?;
    ok(votes::get(&state.db, &proposal.id, &auth.address)?)
}

pub async fn results<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    viewer: MaybeAuthUser,
    Path(id): Path<String>,
) -> ApiResult<Tally> {
    let (proposal, _, _) = readable_proposal(&state.db, &id, viewer.address())?;
    ok(tally::summarize(&proposal))
}

/// Records the hash of the transaction the author sent to the attestation
/// contract. The server does not check the chain.
pub async fn attest<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<Attestation>,
) -> ApiResult<AttestationReceipt> {
    let mut proposal = proposals::require(&state.db, &id)?;
    if proposal.author != auth.address {
        return Err(ApiError::forbidden("Only the author can attest this proposal"));
    }
    let tx_hash = parse_tx_hash(&body.tx_hash)?;

    proposal.tx_hash = Some(tx_hash.clone());
    proposal.updated_at = Utc::now();
    proposals::save(&state.db, &proposal)?;

    ok(AttestationReceipt {
        proposal_id: proposal.id.clone(),
        digest: format!("{:#x}", digest_of(&proposal)),
        explorer_url: state.config.network.explorer_tx_url(&tx_hash),
        tx_hash,
    })
}
