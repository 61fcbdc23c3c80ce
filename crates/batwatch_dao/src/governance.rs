//! Proposal lifecycle for the mesh DAO
//!
//! Proposals open as ACTIVE, collect one choice per voter, and are tallied
//! once their voting period is over. Time is always passed in by the caller.

use crate::error::GovernanceError;
use crate::tally::{tally, Ballot, TallyOutcome, VoteChoice};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{info, warn};

/// Weighted support a proposal must exceed
pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalState {
    Pending,
    Active,
    Passed,
    Rejected,
    Executed,
}

impl ProposalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalState::Pending => "pending",
            ProposalState::Active => "active",
            ProposalState::Passed => "passed",
            ProposalState::Rejected => "rejected",
            ProposalState::Executed => "executed",
        }
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub title: String,
    pub description: String,
    pub proposer: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub actions: Vec<serde_json::Value>,
    pub votes: BTreeMap<String, VoteChoice>,
    /// Tokens each voter staked, always non-negative
    pub voter_tokens: BTreeMap<String, f64>,
    pub state: ProposalState,
    pub threshold: f64,
}

impl Proposal {
    pub fn total_votes(&self) -> usize {
        self.votes.len()
    }

    pub fn vote_counts(&self) -> HashMap<VoteChoice, usize> {
        let mut counts = HashMap::from([
            (VoteChoice::Yes, 0),
            (VoteChoice::No, 0),
            (VoteChoice::Abstain, 0),
        ]);
        for choice in self.votes.values() {
            *counts.entry(*choice).or_insert(0) += 1;
        }
        counts
    }

    fn ballots(&self) -> Vec<Ballot> {
        self.votes
            .iter()
            .map(|(voter, choice)| Ballot {
                voter_id: voter.clone(),
                choice: *choice,
                tokens: self.voter_tokens.get(voter).copied(),
            })
            .collect()
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.end_time
    }
}

pub struct GovernanceEngine {
    node_id: String,
    proposals: HashMap<String, Proposal>,
    balances: HashMap<String, f64>,
    proposal_counter: u64,
}

impl GovernanceEngine {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            proposals: HashMap::new(),
            balances: HashMap::new(),
            proposal_counter: 0,
        }
    }

    /// Registered token balances, used when a vote carries no explicit tokens
    pub fn with_balances(mut self, balances: HashMap<String, f64>) -> Self {
        self.balances = balances;
        self
    }

    pub fn total_supply(&self) -> f64 {
        self.balances.values().sum()
    }

    pub fn proposal(&self, proposal_id: &str) -> Option<&Proposal> {
        self.proposals.get(proposal_id)
    }

    pub fn proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    pub fn create_proposal(
        &mut self,
        title: impl Into<String>,
        description: impl Into<String>,
        duration: Duration,
        actions: Vec<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Proposal {
        self.proposal_counter += 1;
        let proposal = Proposal {
            id: format!(
                "prop_{}_{}_{}",
                now.timestamp(),
                self.node_id,
                self.proposal_counter
            ),
            title: title.into(),
            description: description.into(),
            proposer: self.node_id.clone(),
            start_time: now,
            end_time: now + duration,
            actions,
            votes: BTreeMap::new(),
            voter_tokens: BTreeMap::new(),
            state: ProposalState::Active,
            threshold: DEFAULT_THRESHOLD,
        };

        info!("Created proposal {}: {}", proposal.id, proposal.title);
        self.proposals.insert(proposal.id.clone(), proposal.clone());
        proposal
    }

    /// Record `voter`'s choice, replacing any earlier one.
    ///
    /// A vote arriving after the end time closes the proposal.
    pub fn cast_vote(
        &mut self,
        proposal_id: &str,
        voter_id: &str,
        choice: VoteChoice,
        tokens: f64,
        now: DateTime<Utc>,
    ) -> Result<(), GovernanceError> {
        let balances = &self.balances;
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;

        if proposal.state != ProposalState::Active {
            warn!(
                "Voting closed for {} (state: {})",
                proposal_id, proposal.state
            );
            return Err(GovernanceError::NotActive {
                id: proposal_id.to_string(),
                state: proposal.state,
            });
        }

        if proposal.is_expired(now) {
            close(proposal, balances);
            warn!("Voting period ended for {}", proposal_id);
            return Err(GovernanceError::VotingPeriodEnded(proposal_id.to_string()));
        }

        let tokens = tokens.max(0.0);
        proposal.votes.insert(voter_id.to_string(), choice);
        proposal.voter_tokens.insert(voter_id.to_string(), tokens);
        info!(
            "Vote cast by {} on {}: {} (tokens={:.1}, voting_power={:.2})",
            voter_id,
            proposal_id,
            choice,
            tokens,
            crate::tally::voting_power(tokens)
        );
        Ok(())
    }

    /// Tally every ACTIVE proposal whose voting period is over
    pub fn check_proposals(&mut self, now: DateTime<Utc>) -> Vec<(String, ProposalState)> {
        let balances = &self.balances;
        let mut closed: Vec<(String, ProposalState)> = self
            .proposals
            .values_mut()
            .filter(|p| p.state == ProposalState::Active && p.is_expired(now))
            .map(|proposal| {
                close(proposal, balances);
                (proposal.id.clone(), proposal.state)
            })
            .collect();
        closed.sort();
        closed
    }

    /// Carry out a PASSED proposal, returning its actions
    pub fn execute_proposal(
        &mut self,
        proposal_id: &str,
    ) -> Result<Vec<serde_json::Value>, GovernanceError> {
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;

        if proposal.state != ProposalState::Passed {
            warn!(
                "Cannot execute {}: state is {}",
                proposal_id, proposal.state
            );
            return Err(GovernanceError::NotPassed {
                id: proposal_id.to_string(),
                state: proposal.state,
            });
        }

        info!("Executing actions for {}", proposal_id);
        for action in &proposal.actions {
            info!("Action: {}", action);
        }
        proposal.state = ProposalState::Executed;
        Ok(proposal.actions.clone())
    }
}

fn close(proposal: &mut Proposal, balances: &HashMap<String, f64>) -> TallyOutcome {
    let outcome = tally(&proposal.ballots(), balances, proposal.threshold);
    proposal.state = if outcome.passed {
        ProposalState::Passed
    } else {
        ProposalState::Rejected
    };

    if proposal.total_votes() == 0 {
        info!("Proposal {} rejected (no votes)", proposal.id);
    } else {
        info!(
            "Quadratic tally for {}: YES={:.2}, NO={:.2}, total={:.2}, support={:.1}% -> {}",
            proposal.id,
            outcome.yes_weighted,
            outcome.no_weighted,
            outcome.total_weighted,
            outcome.support * 100.0,
            proposal.state
        );
    }
    outcome
}
