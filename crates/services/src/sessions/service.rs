use chrono::{DateTime, Utc};
use std::fmt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use gxp_core::model::{
    AnswerState, AssessmentRef, ProgressSnapshot, Question, QuestionId, QuestionSet,
    ReportAuthor, ResponseMap, SnapshotId, UserId,
};

use super::progress::SessionProgress;
use super::restore::{RestoreGate, RestoreOutcome, RestoreReport};
use crate::error::SessionError;

//
// ─── NAVIGATION ────────────────────────────────────────────────────────────────
//

/// Result of asking the session to move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Position advanced to the given index.
    Moved(usize),
    /// The current question is unanswered, or there is nothing to move through.
    Blocked,
    /// The last question is answered; the caller should complete the questionnaire.
    Complete,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// In-memory state of one questionnaire being filled in.
///
/// Owns the loaded question set, the answers given so far and the current
/// position. A stored snapshot can be offered at any point; it is applied
/// once, as soon as questions are available.
pub struct QuestionnaireSession {
    author: ReportAuthor,
    assessment: AssessmentRef,
    questions: QuestionSet,
    questions_loaded: bool,
    responses: ResponseMap,
    current: usize,
    snapshot_id: Option<SnapshotId>,
    restore: RestoreGate,
    completed: bool,
    // newest background save; each save waits for the one before it
    pending_save: Option<JoinHandle<()>>,
}

impl QuestionnaireSession {
    /// Empty session for `assessment`, owned by the report author.
    #[must_use]
    pub fn new(author: ReportAuthor, assessment: AssessmentRef) -> Self {
        Self {
            author,
            assessment,
            questions: QuestionSet::empty(),
            questions_loaded: false,
            responses: ResponseMap::new(),
            current: 0,
            snapshot_id: None,
            restore: RestoreGate::default(),
            completed: false,
            pending_save: None,
        }
    }

    #[must_use]
    pub fn author(&self) -> &ReportAuthor {
        &self.author
    }

    #[must_use]
    pub fn owner(&self) -> &UserId {
        &self.author.user_id
    }

    #[must_use]
    pub fn assessment(&self) -> &AssessmentRef {
        &self.assessment
    }

    #[must_use]
    pub fn questions(&self) -> &QuestionSet {
        &self.questions
    }

    #[must_use]
    pub fn responses(&self) -> &ResponseMap {
        &self.responses
    }

    #[must_use]
    pub fn snapshot_id(&self) -> Option<&SnapshotId> {
        self.snapshot_id.as_ref()
    }

    #[must_use]
    pub fn questions_loaded(&self) -> bool {
        self.questions_loaded
    }

    #[must_use]
    pub fn is_restored(&self) -> bool {
        self.restore.is_applied()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    //
    // ─── LOADING AND RESTORE ───────────────────────────────────────────────────
    //

    /// Install the question set. Applies a pending snapshot if one was offered.
    pub fn load_questions(&mut self, questions: QuestionSet) -> RestoreOutcome {
        self.questions = questions;
        self.questions_loaded = true;
        self.current = clamp_index(self.current, self.questions.len());
        self.apply_pending()
    }

    /// Offer a stored snapshot for this session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SnapshotMismatch` if the snapshot belongs to a
    /// different owner or a different assessment.
    pub fn offer_snapshot(
        &mut self,
        snapshot: ProgressSnapshot,
    ) -> Result<RestoreOutcome, SessionError> {
        if !snapshot.resumes(self.owner(), &self.assessment) {
            return Err(SessionError::SnapshotMismatch);
        }
        if !self.restore.offer(snapshot) {
            return Ok(RestoreOutcome::AlreadyRestored);
        }
        Ok(self.apply_pending())
    }

    fn apply_pending(&mut self) -> RestoreOutcome {
        match self.restore.release(self.questions_loaded) {
            Some(snapshot) => RestoreOutcome::Applied(self.restore(&snapshot)),
            None if self.restore.is_applied() => RestoreOutcome::AlreadyRestored,
            None => RestoreOutcome::Waiting,
        }
    }

    /// Replace answers and position with the snapshot's contents.
    ///
    /// Applying the same snapshot twice leaves the session unchanged. The
    /// stored index is clamped into the loaded question set; before questions
    /// load it is kept as saved and clamped by `load_questions`.
    pub fn restore(&mut self, snapshot: &ProgressSnapshot) -> RestoreReport {
        let decoded = snapshot.decoded_responses();
        for (question_id, raw) in &decoded.skipped {
            warn!(question_id = %question_id, state = %raw, "skipping unknown answer state");
        }
        self.responses = decoded.responses;
        self.current = if self.questions_loaded {
            clamp_index(snapshot.current_index, self.questions.len())
        } else {
            snapshot.current_index
        };
        if let Some(id) = &snapshot.id {
            self.snapshot_id = Some(id.clone());
        }
        debug!(
            assessment_id = %self.assessment.assessment_id,
            index = self.current,
            answers = self.responses.len(),
            "restored questionnaire progress"
        );
        RestoreReport {
            index: self.current,
            answers: self.responses.len(),
            skipped: decoded.skipped,
        }
    }

    //
    // ─── ANSWERS ───────────────────────────────────────────────────────────────
    //

    /// Record an answer for the current question, overwriting any earlier one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` once the questionnaire is finished and
    /// `SessionError::NoCurrentQuestion` when no questions are loaded.
    pub fn answer(&mut self, state: AnswerState) -> Result<&QuestionId, SessionError> {
        if self.completed {
            return Err(SessionError::Completed);
        }
        let Some(question) = self.questions.get(self.current) else {
            return Err(SessionError::NoCurrentQuestion);
        };
        self.responses.answer(question.id().clone(), state);
        Ok(question.id())
    }

    /// Record an answer by question id. The id does not need to be in the loaded set.
    pub fn answer_question(&mut self, question_id: QuestionId, state: AnswerState) {
        self.responses.answer(question_id, state);
    }

    #[must_use]
    pub fn has_answer(&self, question_id: &QuestionId) -> bool {
        self.responses.has_answer(question_id)
    }

    #[must_use]
    pub fn current_answer(&self, question_id: &QuestionId) -> Option<AnswerState> {
        self.responses.current_answer(question_id)
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_last_question(&self) -> bool {
        !self.questions.is_empty() && self.current + 1 == self.questions.len()
    }

    /// Whether the current question has been answered.
    #[must_use]
    pub fn can_advance(&self) -> bool {
        !self.completed
            && self
                .current_question()
                .is_some_and(|q| self.responses.has_answer(q.id()))
    }

    #[must_use]
    pub fn can_go_back(&self) -> bool {
        !self.completed && self.current > 0
    }

    /// Move forward when the current question is answered.
    pub fn next(&mut self) -> Navigation {
        if !self.can_advance() {
            return Navigation::Blocked;
        }
        if self.is_last_question() {
            return Navigation::Complete;
        }
        self.current += 1;
        Navigation::Moved(self.current)
    }

    /// Step back one question. Answers are kept. Returns false at the first question.
    pub fn previous(&mut self) -> bool {
        if !self.can_go_back() {
            return false;
        }
        self.current -= 1;
        true
    }

    //
    // ─── SNAPSHOTS AND COMPLETION ──────────────────────────────────────────────
    //

    /// Capture the current progress for saving.
    #[must_use]
    pub fn capture_snapshot(&self, now: DateTime<Utc>) -> ProgressSnapshot {
        let snapshot = ProgressSnapshot::new(
            self.assessment.clone(),
            self.current,
            self.questions.len(),
            &self.responses,
            self.questions.text_cache(),
            now,
        )
        .with_owner(self.owner().clone());
        match &self.snapshot_id {
            Some(id) => snapshot.with_id(id.clone()),
            None => snapshot,
        }
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            total: self.questions.len(),
            answered: self
                .questions
                .iter()
                .filter(|q| self.responses.has_answer(q.id()))
                .count(),
            current_index: self.current,
            is_complete: self.completed,
        }
    }

    /// Checks the questionnaire can be completed from its current position.
    ///
    /// # Errors
    ///
    /// Returns `Completed`, `NoCurrentQuestion`, `NotAtLastQuestion` or
    /// `Unanswered` describing the first blocking condition.
    pub fn ensure_completable(&self) -> Result<(), SessionError> {
        if self.completed {
            return Err(SessionError::Completed);
        }
        let Some(question) = self.current_question() else {
            return Err(SessionError::NoCurrentQuestion);
        };
        if !self.is_last_question() {
            return Err(SessionError::NotAtLastQuestion);
        }
        if !self.responses.has_answer(question.id()) {
            return Err(SessionError::Unanswered);
        }
        Ok(())
    }

    /// Whether a background save of this session is still running.
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.pending_save
            .as_ref()
            .is_some_and(|save| !save.is_finished())
    }

    /// Wait until every background save issued so far has landed.
    pub async fn flush_saves(&mut self) {
        if let Some(save) = self.pending_save.take() {
            await_save(save).await;
        }
    }

    pub(crate) fn take_pending_save(&mut self) -> Option<JoinHandle<()>> {
        self.pending_save.take()
    }

    pub(crate) fn set_pending_save(&mut self, save: JoinHandle<()>) {
        self.pending_save = Some(save);
    }

    pub(crate) fn set_snapshot_id(&mut self, id: SnapshotId) {
        self.snapshot_id = Some(id);
    }

    pub(crate) fn finish(&mut self) {
        self.completed = true;
    }
}

impl fmt::Debug for QuestionnaireSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestionnaireSession")
            .field("owner", self.owner())
            .field("assessment_id", &self.assessment.assessment_id)
            .field("questions", &self.questions.len())
            .field("answers", &self.responses.len())
            .field("current", &self.current)
            .field("snapshot_id", &self.snapshot_id)
            .field("completed", &self.completed)
            .field("saving", &self.is_saving())
            .finish_non_exhaustive()
    }
}

pub(crate) async fn await_save(save: JoinHandle<()>) {
    if let Err(err) = save.await {
        warn!(error = %err, "background save task ended abnormally");
    }
}

fn clamp_index(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}
