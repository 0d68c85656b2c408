//! Vote aggregation. Results are always rebuilt from the stored votes, so a
//! replaced vote never double counts.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::parser::{Proposal, Vote};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionResult {
    pub index: u32,
    pub label: String,
    pub votes: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tally {
    pub options: Vec<OptionResult>,
    pub total_votes: u64,
    pub total_power: u64,
    pub winning_options: Vec<u32>,
}

/// Sums vote power per option. Every option index is present, choices
/// outside the option range are ignored.
pub fn count(votes: &[Vote], option_count: usize) -> (BTreeMap<u32, u64>, u64) {
    let mut results: BTreeMap<u32, u64> = (0..option_count as u32).map(|i| (i, 0)).collect();
    for vote in votes {
        for choice in &vote.choices {
            if let Some(total) = results.get_mut(choice) {
                *total += vote.vote_power;
            }
        }
    }
    (results, votes.len() as u64)
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 * 10_000.0 / whole as f64).round() / 100.0
}

pub fn summarize(proposal: &Proposal) -> Tally {
    let total_power: u64 = proposal.results.values().sum();
    let options: Vec<OptionResult> = proposal
        .options
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let votes = proposal.results.get(&(i as u32)).copied().unwrap_or(0);
            OptionResult {
                index: i as u32,
                label: label.clone(),
                votes,
                percentage: percentage(votes, total_power),
            }
        })
        .collect();

    let top = options.iter().map(|o| o.votes).max().unwrap_or(0);
    let winning_options = if top == 0 {
        Vec::new()
    } else {
        options.iter().filter(|o| o.votes == top).map(|o| o.index).collect()
    };

    Tally {
        options,
        total_votes: proposal.total_votes,
        total_power,
        winning_options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ProposalStatus, VotingType};
    use chrono::Utc;

    fn vote(voter: &str, choices: &[u32]) -> Vote {
        Vote {
            proposal_id: "p".into(),
            voter: voter.into(),
            choices: choices.to_vec(),
            vote_power: 1,
            tx_hash: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn proposal_with(results: BTreeMap<u32, u64>, total_votes: u64) -> Proposal {
        let now = Utc::now();
        Proposal {
            id: "p".into(),
            space_id: "s".into(),
            author: "0xa".into(),
            title: "t".into(),
            description: String::new(),
            options: vec!["Yes".into(), "No".into(), "Abstain".into()],
            voting_type: VotingType::MultipleChoice,
            start_date: now,
            end_date: now,
            status: ProposalStatus::Active,
            results,
            total_votes,
            tx_hash: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    #[test]
    fn test_count_includes_every_option() {
        let (results, total) = count(&[vote("0x1", &[0]), vote("0x2", &[0, 2]), vote("0x3", &[7])], 3);
        assert_eq!(results, BTreeMap::from([(0, 2), (1, 0), (2, 1)]));
        assert_eq!(total, 3);
    }

    #[test]
    fn test_summarize_percentages_and_winner() {
        let (results, total) = count(&[vote("0x1", &[0]), vote("0x2", &[0]), vote("0x3", &[1])], 3);
        let tally = summarize(&proposal_with(results, total));

        assert_eq!(tally.total_votes, 3);
        assert_eq!(tally.total_power, 3);
        assert_eq!(tally.options[0].percentage, 66.67);
        assert_eq!(tally.options[1].percentage, 33.33);
        assert_eq!(tally.options[2].percentage, 0.0);
        assert_eq!(tally.winning_options, vec![0]);
    }

    #[test]
    fn test_summarize_without_votes() {
        let (results, total) = count(&[], 3);
        let tally = summarize(&proposal_with(results, total));
        assert!(tally.winning_options.is_empty());
        assert!(tally.options.iter().all(|o| o.percentage == 0.0));
    }

    #[test]
    fn test_summarize_tie() {
        let (results, total) = count(&[vote("0x1", &[0]), vote("0x2", &[2])], 3);
        assert_eq!(summarize(&proposal_with(results, total)).winning_options, vec![0, 2]);
    }
}
