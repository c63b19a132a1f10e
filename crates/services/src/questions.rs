use std::sync::Arc;

use gxp_core::model::{AssessmentId, Question, QuestionSet};
use storage::repository::QuestionRepository;
use tracing::debug;

use crate::error::QuestionSetError;

/// Supplies the ordered question list for an assessment.
#[derive(Clone)]
pub struct QuestionSetProvider {
    questions: Arc<dyn QuestionRepository>,
}

impl QuestionSetProvider {
    #[must_use]
    pub fn new(questions: Arc<dyn QuestionRepository>) -> Self {
        Self { questions }
    }

    /// Load the questions for an assessment, ordered by ordinal.
    ///
    /// Each call returns a fresh set; nothing is cached between loads.
    ///
    /// # Errors
    ///
    /// Returns `QuestionSetError::NotFound` when no questions are stored for
    /// the assessment, `QuestionSetError::Invalid` if the stored list breaks
    /// ordinal or id uniqueness, and `QuestionSetError::Storage` on backend failure.
    pub async fn load(&self, assessment_id: &AssessmentId) -> Result<QuestionSet, QuestionSetError> {
        let questions = self
            .questions
            .get_questions(assessment_id)
            .await?
            .filter(|qs| !qs.is_empty())
            .ok_or_else(|| QuestionSetError::NotFound(assessment_id.clone()))?;
        let set = QuestionSet::new(questions)?;
        debug!(assessment_id = %assessment_id, count = set.len(), "loaded question set");
        Ok(set)
    }

    /// Store the question list for a custom assessment, replacing any previous list.
    ///
    /// # Errors
    ///
    /// Returns `QuestionSetError::Invalid` for duplicate ids or ordinals, or
    /// `QuestionSetError::Storage` on backend failure.
    pub async fn publish(
        &self,
        assessment_id: &AssessmentId,
        questions: Vec<Question>,
    ) -> Result<QuestionSet, QuestionSetError> {
        let set = QuestionSet::new(questions)?;
        self.questions.save_questions(assessment_id, &set).await?;
        debug!(assessment_id = %assessment_id, count = set.len(), "published question set");
        Ok(set)
    }
}
