//! Weighted proposal tally
//!
//! Each ballot weighs `√tokens`. Abstentions carry no weight on either side
//! and are left out of the denominator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Yes,
    No,
    Abstain,
}

impl VoteChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteChoice::Yes => "yes",
            VoteChoice::No => "no",
            VoteChoice::Abstain => "abstain",
        }
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter_id: String,
    pub choice: VoteChoice,
    /// Tokens staked with this ballot; falls back to the registered balance
    pub tokens: Option<f64>,
}

impl Ballot {
    pub fn new(voter_id: impl Into<String>, choice: VoteChoice) -> Self {
        Self {
            voter_id: voter_id.into(),
            choice,
            tokens: None,
        }
    }

    pub fn with_tokens(mut self, tokens: f64) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TallyOutcome {
    pub passed: bool,
    /// yes / (yes + no), 0.0 when nothing was weighed
    pub support: f64,
    pub yes_weighted: f64,
    pub no_weighted: f64,
    pub total_weighted: f64,
}

/// Quadratic weight of a token amount; non-finite amounts weigh nothing
pub fn voting_power(tokens: f64) -> f64 {
    if tokens.is_finite() && tokens > 0.0 {
        tokens.sqrt()
    } else {
        0.0
    }
}

/// Tally ballots. Passing needs support strictly above `threshold`.
pub fn tally(ballots: &[Ballot], balances: &HashMap<String, f64>, threshold: f64) -> TallyOutcome {
    let mut outcome = TallyOutcome::default();
    if ballots.is_empty() {
        return outcome;
    }

    for ballot in ballots {
        let tokens = ballot
            .tokens
            .or_else(|| balances.get(&ballot.voter_id).copied())
            .unwrap_or(0.0);
        let power = voting_power(tokens);

        match ballot.choice {
            VoteChoice::Yes => outcome.yes_weighted += power,
            VoteChoice::No => outcome.no_weighted += power,
            VoteChoice::Abstain => {}
        }
    }
    outcome.total_weighted = outcome.yes_weighted + outcome.no_weighted;

    if outcome.total_weighted == 0.0 {
        return outcome;
    }
    outcome.support = outcome.yes_weighted / outcome.total_weighted;
    outcome.passed = outcome.support > threshold;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn no_balances() -> HashMap<String, f64> {
        HashMap::new()
    }

    #[test]
    fn test_exactly_at_threshold_fails() {
        let ballots = vec![
            Ballot::new("a", VoteChoice::Yes).with_tokens(100.0),
            Ballot::new("b", VoteChoice::No).with_tokens(100.0),
        ];

        let outcome = tally(&ballots, &no_balances(), 0.5);
        assert_relative_eq!(outcome.support, 0.5);
        assert!(!outcome.passed);

        assert!(tally(&ballots, &no_balances(), 0.49).passed);
    }

    #[test]
    fn test_no_ballots_is_rejected() {
        let outcome = tally(&[], &no_balances(), 0.5);
        assert!(!outcome.passed);
        assert_eq!(outcome.support, 0.0);
    }

    #[test]
    fn test_zero_weight_is_rejected() {
        let ballots = vec![
            Ballot::new("ghost", VoteChoice::Yes),
            Ballot::new("broke", VoteChoice::Yes).with_tokens(-5.0),
        ];
        let outcome = tally(&ballots, &no_balances(), 0.0);
        assert!(!outcome.passed);
        assert_eq!(outcome.total_weighted, 0.0);
    }

    #[test]
    fn test_non_finite_tokens_weigh_nothing() {
        assert_eq!(voting_power(f64::INFINITY), 0.0);
        assert_eq!(voting_power(f64::NAN), 0.0);

        let ballots = vec![
            Ballot::new("a", VoteChoice::Yes).with_tokens(f64::INFINITY),
            Ballot::new("b", VoteChoice::Yes).with_tokens(100.0),
        ];
        let outcome = tally(&ballots, &no_balances(), 0.5);
        assert_relative_eq!(outcome.yes_weighted, 10.0);
        assert_relative_eq!(outcome.support, 1.0);
        assert!(outcome.passed);

        let lone = [Ballot::new("a", VoteChoice::Yes).with_tokens(f64::INFINITY)];
        let outcome = tally(&lone, &no_balances(), 0.5);
        assert!(!outcome.support.is_nan());
        assert!(!outcome.passed);
    }

    #[test]
    fn test_balance_fallback_and_quadratic_weight() {
        let balances: HashMap<String, f64> =
            [("whale".to_string(), 10_000.0), ("minnow".to_string(), 100.0)].into();
        let ballots = vec![
            Ballot::new("whale", VoteChoice::No),
            Ballot::new("minnow", VoteChoice::Yes),
            Ballot::new("minnow2", VoteChoice::Yes).with_tokens(8_100.0),
        ];

        // 100 against, 10 + 90 for
        let outcome = tally(&ballots, &balances, 0.49);
        assert_relative_eq!(outcome.no_weighted, 100.0);
        assert_relative_eq!(outcome.yes_weighted, 100.0);
        assert!(outcome.passed);
    }

    #[test]
    fn test_abstain_is_left_out() {
        let ballots = vec![
            Ballot::new("a", VoteChoice::Yes).with_tokens(100.0),
            Ballot::new("b", VoteChoice::Abstain).with_tokens(10_000.0),
        ];
        let outcome = tally(&ballots, &no_balances(), 0.5);
        assert_relative_eq!(outcome.total_weighted, 10.0);
        assert_relative_eq!(outcome.support, 1.0);
        assert!(outcome.passed);
    }
}
