use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::answer::AnswerState;
use crate::model::ids::QuestionId;

/// Per-state tallies over a response map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerCounts {
    pub compliant: u32,
    pub non_compliant: u32,
    pub not_applicable: u32,
}

impl AnswerCounts {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.compliant + self.non_compliant + self.not_applicable
    }
}

/// Result of decoding string-encoded responses.
///
/// Entries whose state name is unknown are dropped and reported in `skipped`
/// rather than failing the whole decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedResponses {
    pub responses: ResponseMap,
    pub skipped: Vec<(QuestionId, String)>,
}

/// Accumulated answers for one questionnaire session, keyed by question id.
///
/// Absence of an entry means the question is unanswered. Answers for ids that
/// are not part of the loaded question set are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMap {
    answers: BTreeMap<QuestionId, AnswerState>,
}

impl ResponseMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `state` for `question_id`, overwriting any earlier answer.
    pub fn answer(&mut self, question_id: QuestionId, state: AnswerState) {
        self.answers.insert(question_id, state);
    }

    #[must_use]
    pub fn has_answer(&self, question_id: &QuestionId) -> bool {
        self.answers.contains_key(question_id)
    }

    #[must_use]
    pub fn current_answer(&self, question_id: &QuestionId) -> Option<AnswerState> {
        self.answers.get(question_id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, AnswerState)> {
        self.answers.iter().map(|(id, state)| (id, *state))
    }

    #[must_use]
    pub fn counts(&self) -> AnswerCounts {
        let mut counts = AnswerCounts::default();
        for state in self.answers.values() {
            match state {
                AnswerState::Compliant => counts.compliant = counts.compliant.saturating_add(1),
                AnswerState::NonCompliant => {
                    counts.non_compliant = counts.non_compliant.saturating_add(1);
                }
                AnswerState::NotApplicable => {
                    counts.not_applicable = counts.not_applicable.saturating_add(1);
                }
            }
        }
        counts
    }

    /// String-encoded form used by snapshots and reports.
    #[must_use]
    pub fn encode(&self) -> BTreeMap<QuestionId, String> {
        self.answers
            .iter()
            .map(|(id, state)| (id.clone(), state.as_str().to_owned()))
            .collect()
    }

    /// Decodes a string-encoded map, skipping entries with unknown state names.
    #[must_use]
    pub fn decode(encoded: &BTreeMap<QuestionId, String>) -> DecodedResponses {
        let mut decoded = DecodedResponses::default();
        for (id, raw) in encoded {
            match raw.parse::<AnswerState>() {
                Ok(state) => decoded.responses.answer(id.clone(), state),
                Err(_) => decoded.skipped.push((id.clone(), raw.clone())),
            }
        }
        decoded
    }
}

impl FromIterator<(QuestionId, AnswerState)> for ResponseMap {
    fn from_iter<T: IntoIterator<Item = (QuestionId, AnswerState)>>(iter: T) -> Self {
        Self {
            answers: iter.into_iter().collect(),
        }
    }
}
