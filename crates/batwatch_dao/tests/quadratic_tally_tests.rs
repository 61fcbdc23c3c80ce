//! Quadratic voting properties and a full proposal round

use approx::assert_relative_eq;
use batwatch_dao::quadratic::{DEFAULT_QUORUM_PERCENTAGE, DEFAULT_SUPERMAJORITY_PERCENTAGE};
use batwatch_dao::{
    check_quorum, check_supermajority, cost_to_votes, tally, tokens_to_votes, validate_vote,
    votes_to_cost, Ballot, GovernanceEngine, GovernanceError, ProposalState, Vote, VoteChoice,
    VoteError,
};
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;

#[test]
fn test_max_votes_is_floor_sqrt() {
    for tokens in [0u64, 1, 3, 4, 15, 16, 17, 99, 100, 101, 10_000, 123_456_789] {
        let expected = (tokens as f64).sqrt().floor() as u64;
        assert_eq!(tokens_to_votes(tokens), expected, "tokens={}", tokens);
    }
}

#[test]
fn test_cost_is_square_and_inverts() {
    for votes in [0u64, 1, 2, 7, 10, 31, 1_000] {
        assert_eq!(votes_to_cost(votes), votes * votes);
        assert_eq!(cost_to_votes(votes_to_cost(votes)), votes);
    }
}

#[test]
fn test_validate_vote_at_the_boundary() {
    assert!(validate_vote(100, 10));
    assert!(!validate_vote(100, 11));
}

#[test]
fn test_tally_threshold_is_strict() {
    let ballots = vec![
        Ballot::new("a", VoteChoice::Yes).with_tokens(100.0),
        Ballot::new("b", VoteChoice::No).with_tokens(100.0),
    ];
    let balances = HashMap::new();

    let at_threshold = tally(&ballots, &balances, 0.5);
    assert_relative_eq!(at_threshold.support, 0.5);
    assert!(!at_threshold.passed);

    assert!(tally(&ballots, &balances, 0.49).passed);
    assert!(!tally(&[], &balances, 0.0).passed);
}

#[test]
fn test_quorum_and_supermajority_over_cast_votes() {
    let votes = vec![
        Vote::cast("node-1", "prop-1", 10, true, 100).unwrap(),
        Vote::cast("node-2", "prop-1", 12, true, 150).unwrap(),
        Vote::cast("node-4", "prop-1", 5, false, 200).unwrap(),
    ];

    // 33% of 530 tokens = 174 -> 13 votes; 27 cast
    assert!(check_quorum(&votes, 530, DEFAULT_QUORUM_PERCENTAGE));
    // 22 of 27 for = 81.5%
    assert!(check_supermajority(&votes, DEFAULT_SUPERMAJORITY_PERCENTAGE));

    assert!(matches!(
        Vote::cast("node-3", "prop-1", 9, true, 80),
        Err(VoteError::InsufficientTokens { cost: 81, .. })
    ));
}

#[test]
fn test_whale_is_dampened() {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    let balances = HashMap::from([
        ("node-1".to_string(), 100.0),
        ("node-2".to_string(), 150.0),
        ("node-3".to_string(), 80.0),
        ("node-4".to_string(), 200.0),
    ]);
    let mut engine = GovernanceEngine::new("node-1").with_balances(balances);
    let id = engine
        .create_proposal(
            "Enable gateway mode on node-3",
            "More uplinks",
            Duration::hours(24),
            vec![],
            start,
        )
        .id;

    // One holder with 10000 tokens against three small holders
    engine.cast_vote(&id, "whale", VoteChoice::No, 10_000.0, start).unwrap();
    for voter in ["node-1", "node-2", "node-3"] {
        engine.cast_vote(&id, voter, VoteChoice::Yes, 2_500.0, start).unwrap();
    }

    let closed = engine.check_proposals(start + Duration::hours(25));
    // 3 x 50 = 150 for, 100 against
    assert_eq!(closed, vec![(id.clone(), ProposalState::Passed)]);
    assert!(engine.execute_proposal(&id).is_ok());
    assert_eq!(
        engine.execute_proposal(&id),
        Err(GovernanceError::NotPassed {
            id,
            state: ProposalState::Executed
        })
    );
}
