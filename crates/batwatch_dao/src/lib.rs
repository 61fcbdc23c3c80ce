//! Mesh DAO governance
//!
//! Quadratic voting arithmetic, the weighted proposal tally and the proposal
//! lifecycle. Independent of the MAPE-K loop.

pub mod error;
pub mod governance;
pub mod quadratic;
pub mod tally;

pub use error::{GovernanceError, VoteError};
pub use governance::{GovernanceEngine, Proposal, ProposalState};
pub use quadratic::{
    calculate_support_percentage, calculate_voting_power, check_quorum, check_supermajority,
    cost_to_votes, tokens_to_votes, validate_vote, votes_to_cost, Vote, VotingPower,
};
pub use tally::{tally, Ballot, TallyOutcome, VoteChoice};
