use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question id cannot be empty")]
    EmptyId,

    #[error("question text cannot be empty")]
    EmptyText,

    #[error("question ordinal must be >= 1")]
    InvalidOrdinal,

    #[error("duplicate question id: {0}")]
    DuplicateId(QuestionId),

    #[error("duplicate question ordinal: {0}")]
    DuplicateOrdinal(u32),
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single compliance question. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    text: String,
    ordinal: u32,
}

impl Question {
    /// Creates a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the id or text is blank, or the ordinal is zero.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        ordinal: u32,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if id.as_str().trim().is_empty() {
            return Err(QuestionError::EmptyId);
        }
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if ordinal == 0 {
            return Err(QuestionError::InvalidOrdinal);
        }
        Ok(Self { id, text, ordinal })
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// 1-based position within the owning assessment.
    #[must_use]
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }
}

//
// ─── QUESTION SET ──────────────────────────────────────────────────────────────
//

/// Ordered, finite list of questions for one assessment.
///
/// Questions are sorted by ordinal; ids and ordinals are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionSet {
    questions: Vec<Question>,
}

impl QuestionSet {
    /// Builds a set from questions in any order.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::DuplicateId` or `QuestionError::DuplicateOrdinal`
    /// when uniqueness is violated.
    pub fn new(mut questions: Vec<Question>) -> Result<Self, QuestionError> {
        questions.sort_by_key(Question::ordinal);

        let mut ids = HashSet::with_capacity(questions.len());
        let mut previous_ordinal = None;
        for question in &questions {
            if !ids.insert(question.id.clone()) {
                return Err(QuestionError::DuplicateId(question.id.clone()));
            }
            if previous_ordinal == Some(question.ordinal) {
                return Err(QuestionError::DuplicateOrdinal(question.ordinal));
            }
            previous_ordinal = Some(question.ordinal);
        }

        Ok(Self { questions })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Question at the given 0-based index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Question] {
        &self.questions
    }

    /// Denormalized question-id to text map, as cached in snapshots and reports.
    #[must_use]
    pub fn text_cache(&self) -> BTreeMap<QuestionId, String> {
        self.questions
            .iter()
            .map(|q| (q.id.clone(), q.text.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: &str, ordinal: u32) -> Question {
        Question::new(QuestionId::new(id), format!("Text {id}"), ordinal).unwrap()
    }

    #[test]
    fn rejects_blank_text_and_zero_ordinal() {
        assert_eq!(
            Question::new(QuestionId::new("a"), "  ", 1).unwrap_err(),
            QuestionError::EmptyText
        );
        assert_eq!(
            Question::new(QuestionId::new("a"), "ok", 0).unwrap_err(),
            QuestionError::InvalidOrdinal
        );
        assert_eq!(
            Question::new(QuestionId::new(""), "ok", 1).unwrap_err(),
            QuestionError::EmptyId
        );
    }

    #[test]
    fn set_orders_by_ordinal() {
        let set = QuestionSet::new(vec![q("c", 3), q("a", 1), q("b", 2)]).unwrap();
        let ids: Vec<_> = set.iter().map(|q| q.id().as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(set.get(1).unwrap().ordinal(), 2);
    }

    #[test]
    fn set_rejects_duplicates() {
        let err = QuestionSet::new(vec![q("a", 1), q("a", 2)]).unwrap_err();
        assert_eq!(err, QuestionError::DuplicateId(QuestionId::new("a")));

        let err = QuestionSet::new(vec![q("a", 1), q("b", 1)]).unwrap_err();
        assert_eq!(err, QuestionError::DuplicateOrdinal(1));
    }

    #[test]
    fn text_cache_maps_ids_to_text() {
        let set = QuestionSet::new(vec![q("a", 1), q("b", 2)]).unwrap();
        let cache = set.text_cache();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache[&QuestionId::new("b")], "Text b");
    }
}
