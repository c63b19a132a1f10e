use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors that can occur while decoding a persisted answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnswerError {
    #[error("unknown answer state: {0}")]
    UnknownState(String),
}

//
// ─── ANSWER STATE ─────────────────────────────────────────────────────────────
//

/// Three-way answer given to a compliance question.
///
/// There is no "unanswered" variant: a question without an entry in the
/// response map has not been answered yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerState {
    /// The observed practice meets the requirement.
    Compliant,
    /// The observed practice violates the requirement.
    NonCompliant,
    /// The requirement does not apply to this facility or department.
    NotApplicable,
}

impl AnswerState {
    /// All states, in display order.
    pub const ALL: [AnswerState; 3] = [
        AnswerState::Compliant,
        AnswerState::NonCompliant,
        AnswerState::NotApplicable,
    ];

    /// Persisted string form of this state.
    ///
    /// This and the `FromStr` impl below are the only place the encoding lives;
    /// snapshots and reports both go through them.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerState::Compliant => "COMPLIANT",
            AnswerState::NonCompliant => "NON_COMPLIANT",
            AnswerState::NotApplicable => "NOT_APPLICABLE",
        }
    }
}

impl FromStr for AnswerState {
    type Err = AnswerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnswerState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| AnswerError::UnknownState(s.to_owned()))
    }
}

impl fmt::Display for AnswerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_every_state_to_a_distinct_name() {
        let names: Vec<_> = AnswerState::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["COMPLIANT", "NON_COMPLIANT", "NOT_APPLICABLE"]);
    }

    #[test]
    fn decodes_persisted_names() {
        assert_eq!(
            "NON_COMPLIANT".parse::<AnswerState>().unwrap(),
            AnswerState::NonCompliant
        );
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "MAYBE".parse::<AnswerState>().unwrap_err();
        assert_eq!(err, AnswerError::UnknownState("MAYBE".into()));
        assert!("compliant".parse::<AnswerState>().is_err());
    }
}
