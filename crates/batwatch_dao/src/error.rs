use crate::governance::ProposalState;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoteError {
    #[error("{votes} votes cost {cost} tokens, voter holds {tokens}")]
    InsufficientTokens { votes: u64, cost: u64, tokens: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("Unknown proposal: {0}")]
    ProposalNotFound(String),

    #[error("Voting closed for {id} (state: {state})")]
    NotActive { id: String, state: ProposalState },

    #[error("Voting period ended for {0}")]
    VotingPeriodEnded(String),

    #[error("Cannot execute {id}: state is {state}")]
    NotPassed { id: String, state: ProposalState },
}
