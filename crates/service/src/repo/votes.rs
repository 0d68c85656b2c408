use chrono::{DateTime, Utc};
use tracing::debug;
use voxen_database::typed::{get_json, put_json, remove, scan_json};
use voxen_database::{tables, SafeDatabase};

use crate::error::Result;
use crate::parser::{Proposal, Vote};
use crate::repo::proposals;
use crate::rules::tally;

pub fn get<D: SafeDatabase>(db: &D, proposal_id: &str, voter: &str) -> Result<Option<Vote>> {
    Ok(get_json(db, tables::VOTES, &tables::composite(proposal_id, voter))?)
}

pub fn list<D: SafeDatabase>(db: &D, proposal_id: &str) -> Result<Vec<Vote>> {
    Ok(scan_json(db, tables::VOTES, &tables::prefix(proposal_id))?)
}

/// Stores the ballot (replacing any earlier one by the same voter) and
/// rebuilds the proposal's results from all stored ballots.
pub fn cast<D: SafeDatabase>(
    db: &D,
    proposal: &mut Proposal,
    voter: &str,
    choices: Vec<u32>,
    tx_hash: Option<String>,
    now: DateTime<Utc>,
) -> Result<Vote> {
    let created_at = get(db, &proposal.id, voter)?.map_or(now, |previous| previous.created_at);
    let vote = Vote {
        proposal_id: proposal.id.clone(),
        voter: voter.to_string(),
        choices,
        vote_power: 1,
        tx_hash,
        created_at,
        updated_at: now,
    };
    put_json(db, tables::VOTES, &tables::composite(&proposal.id, voter), &vote)?;
    debug!(proposal = %proposal.id, voter, replaced = created_at != now, "ballot stored");

    retally(db, proposal, now)?;
    Ok(vote)
}

/// Recounts the ballots onto the stored proposal. Only the result fields are
/// written; status and edits made since `proposal` was loaded are kept, and
/// `proposal` is refreshed to what was saved.
pub fn retally<D: SafeDatabase>(db: &D, proposal: &mut Proposal, now: DateTime<Utc>) -> Result<()> {
    let ballots = list(db, &proposal.id)?;
    let mut current = proposals::require(db, &proposal.id)?;
    let (results, total_votes) = tally::count(&ballots, current.options.len());
    current.results = results;
    current.total_votes = total_votes;
    current.updated_at = now;
    proposals::save(db, &current)?;
    *proposal = current;
    Ok(())
}

pub fn delete_all<D: SafeDatabase>(db: &D, proposal_id: &str) -> Result<()> {
    for vote in list(db, proposal_id)? {
        remove(db, tables::VOTES, &tables::composite(proposal_id, &vote.voter))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ProposalStatus, VotingType};
    use chrono::Duration;
    use std::collections::BTreeMap;
    use tempfile::tempdir;
    use voxen_database::InnerDatabase;

    fn proposal(now: DateTime<Utc>) -> Proposal {
        Proposal {
            id: "p1".into(),
            space_id: "s1".into(),
            author: "0xa".into(),
            title: "Fund the grants round".into(),
            description: String::new(),
            options: vec!["Yes".into(), "No".into()],
            voting_type: VotingType::SingleChoice,
            start_date: now - Duration::hours(1),
            end_date: now + Duration::days(3),
            status: ProposalStatus::Active,
            results: BTreeMap::new(),
            total_votes: 0,
            tx_hash: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    #[test]
    fn test_cast_replaces_earlier_ballot() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let db = InnerDatabase::new(temp_dir.path().join("test_db"))?;
        let now = Utc::now();
        let mut stored = proposal(now);
        proposals::save(&db, &stored)?;

        let first = cast(&db, &mut stored, "0xb", vec![0], None, now)?;
        let later = now + Duration::minutes(5);
        let second = cast(&db, &mut stored, "0xb", vec![1], None, later)?;

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.updated_at, later);
        assert_eq!(stored.total_votes, 1);
        assert_eq!(stored.results.get(&1), Some(&1));
        assert_eq!(list(&db, "p1")?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_ballot_keeps_status_set_after_load() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let db = InnerDatabase::new(temp_dir.path().join("test_db"))?;
        let now = Utc::now();
        proposals::save(&db, &proposal(now))?;

        let mut loaded = proposals::require(&db, "p1")?;

        let mut closing = proposals::require(&db, "p1")?;
        closing.status = ProposalStatus::Closed;
        closing.closed_at = Some(now);
        closing.title = "Fund the grants round (final)".into();
        proposals::save(&db, &closing)?;

        cast(&db, &mut loaded, "0xb", vec![0], None, now + Duration::seconds(1))?;

        let stored = proposals::require(&db, "p1")?;
        assert_eq!(stored.status, ProposalStatus::Closed);
        assert_eq!(stored.closed_at, Some(now));
        assert_eq!(stored.title, "Fund the grants round (final)");
        assert_eq!(stored.total_votes, 1);
        assert_eq!(loaded.status, ProposalStatus::Closed);
        Ok(())
    }
}
