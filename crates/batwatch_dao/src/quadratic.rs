//! Quadratic voting arithmetic
//!
//! Casting `n` votes costs `n²` tokens, so a holder of `t` tokens can cast at
//! most `floor(√t)` votes.

use crate::error::VoteError;
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_QUORUM_PERCENTAGE: f64 = 33.0;
pub const DEFAULT_SUPERMAJORITY_PERCENTAGE: f64 = 67.0;

pub fn votes_to_cost(votes: u64) -> u64 {
    votes.saturating_mul(votes)
}

/// Maximum votes a token balance can buy
pub fn tokens_to_votes(tokens: u64) -> u64 {
    integer_sqrt(tokens)
}

pub fn cost_to_votes(cost: u64) -> u64 {
    integer_sqrt(cost)
}

pub fn validate_vote(voter_tokens: u64, votes: u64) -> bool {
    votes <= tokens_to_votes(voter_tokens) && votes_to_cost(votes) <= voter_tokens
}

fn integer_sqrt(n: u64) -> u64 {
    // f64 is close but not exact above 2^52
    let mut root = (n as f64).sqrt() as u64;
    while root.checked_mul(root).map_or(true, |sq| sq > n) {
        root -= 1;
    }
    while (root + 1).checked_mul(root + 1).is_some_and(|sq| sq <= n) {
        root += 1;
    }
    root
}

/// A cast quadratic vote. `cost == votes²` holds for every constructed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vote {
    voter_id: String,
    proposal_id: String,
    votes: u64,
    cost: u64,
    support: bool,
}

impl Vote {
    /// Spend `votes²` of `voter_tokens` on a proposal
    pub fn cast(
        voter_id: impl Into<String>,
        proposal_id: impl Into<String>,
        votes: u64,
        support: bool,
        voter_tokens: u64,
    ) -> Result<Self, VoteError> {
        let cost = votes_to_cost(votes);
        if !validate_vote(voter_tokens, votes) {
            return Err(VoteError::InsufficientTokens {
                votes,
                cost,
                tokens: voter_tokens,
            });
        }

        let vote = Self {
            voter_id: voter_id.into(),
            proposal_id: proposal_id.into(),
            votes,
            cost,
            support,
        };
        debug!(
            "{} cast {} votes {} {} (cost {})",
            vote.voter_id,
            votes,
            if support { "for" } else { "against" },
            vote.proposal_id,
            cost
        );
        Ok(vote)
    }

    pub fn voter_id(&self) -> &str {
        &self.voter_id
    }

    pub fn proposal_id(&self) -> &str {
        &self.proposal_id
    }

    pub fn votes(&self) -> u64 {
        self.votes
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn support(&self) -> bool {
        self.support
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VotingPower {
    pub for_votes: u64,
    pub against_votes: u64,
    pub total_votes: u64,
}

pub fn calculate_voting_power(votes: &[Vote]) -> VotingPower {
    let (for_votes, against_votes) = votes.iter().fold((0u64, 0u64), |(yes, no), vote| {
        if vote.support {
            (yes + vote.votes, no)
        } else {
            (yes, no + vote.votes)
        }
    });
    VotingPower {
        for_votes,
        against_votes,
        total_votes: for_votes + against_votes,
    }
}

/// Share of votes in favour, 0.0-100.0. No votes counts as 0.0.
pub fn calculate_support_percentage(votes: &[Vote]) -> f64 {
    let power = calculate_voting_power(votes);
    if power.total_votes == 0 {
        return 0.0;
    }
    power.for_votes as f64 / power.total_votes as f64 * 100.0
}

/// Quorum is measured in votes: the votes `quorum_percentage` of the supply could buy
pub fn check_quorum(votes: &[Vote], total_supply: u64, quorum_percentage: f64) -> bool {
    let quorum_tokens = (total_supply as f64 * quorum_percentage / 100.0) as u64;
    calculate_voting_power(votes).total_votes >= tokens_to_votes(quorum_tokens)
}

/// Inclusive, unlike the strict threshold of the proposal tally
pub fn check_supermajority(votes: &[Vote], supermajority_percentage: f64) -> bool {
    calculate_support_percentage(votes) >= supermajority_percentage
}
