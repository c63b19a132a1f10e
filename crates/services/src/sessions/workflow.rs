use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use gxp_core::model::{
    AnswerState, AssessmentRef, ComplianceReport, ProgressSnapshot, QuestionId, ReportAuthor,
    ResponseMap, SnapshotId, UserId,
};
use storage::repository::{ProgressRepository, ReportRepository, StorageError};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::restore::RestoreOutcome;
use super::service::{Navigation, QuestionnaireSession, await_save};
use crate::Clock;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::questions::QuestionSetProvider;

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Result of an explicit save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The backend confirmed the save and assigned this id.
    Confirmed(SnapshotId),
    /// No confirmation arrived within the polling budget. The save keeps
    /// running in the background and the caller may proceed.
    Unconfirmed,
}

/// A session operation and whether it queued a background save.
///
/// Queued saves are tracked on the session; see
/// `QuestionnaireSession::flush_saves`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step<T> {
    pub outcome: T,
    pub autosaved: bool,
}

/// Data handed to the report screen once a questionnaire is completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedAssessment {
    pub report: ComplianceReport,
    pub responses: ResponseMap,
    pub question_texts: BTreeMap<QuestionId, String>,
}

/// Completion result. `cleanup` waits for saves still in flight, stores the
/// report and removes the snapshot; callers do not need to wait for it.
#[derive(Debug)]
pub struct Completion {
    pub assessment: CompletedAssessment,
    pub cleanup: JoinHandle<()>,
}

//
// ─── COORDINATOR ───────────────────────────────────────────────────────────────
//

/// Starts, resumes, saves and completes questionnaire sessions.
#[derive(Clone)]
pub struct QuestionnaireLoopService {
    clock: Clock,
    config: SessionConfig,
    questions: QuestionSetProvider,
    progress: Arc<dyn ProgressRepository>,
    reports: Arc<dyn ReportRepository>,
}

impl QuestionnaireLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: QuestionSetProvider,
        progress: Arc<dyn ProgressRepository>,
        reports: Arc<dyn ReportRepository>,
    ) -> Self {
        Self {
            clock,
            config: SessionConfig::default(),
            questions,
            progress,
            reports,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a session for `assessment`, restoring saved progress if the
    /// author has any.
    ///
    /// Questions and the stored snapshot are fetched concurrently. A failed
    /// snapshot lookup is logged and the session starts fresh.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Questions` when the question set cannot be loaded.
    pub async fn start(
        &self,
        author: ReportAuthor,
        assessment: AssessmentRef,
    ) -> Result<(QuestionnaireSession, RestoreOutcome), SessionError> {
        let (questions, snapshot) = tokio::join!(
            self.questions.load(&assessment.assessment_id),
            self.progress.find_snapshot(&author.user_id, &assessment),
        );

        let mut session = QuestionnaireSession::new(author, assessment);
        match snapshot {
            Ok(Some(snapshot)) => {
                session.offer_snapshot(snapshot)?;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "could not look up saved progress; starting fresh");
            }
        }
        let outcome = session.load_questions(questions?);
        info!(
            assessment_id = %session.assessment().assessment_id,
            questions = session.total_questions(),
            restored = session.is_restored(),
            "questionnaire started"
        );
        Ok((session, outcome))
    }

    /// Reopen a session from a stored snapshot, e.g. from the in-progress list.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SnapshotNotFound` for an unknown id,
    /// `SessionError::SnapshotMismatch` if the snapshot belongs to another
    /// user, or `SessionError::Questions` if its question set is gone.
    pub async fn resume(
        &self,
        author: ReportAuthor,
        snapshot_id: &SnapshotId,
    ) -> Result<(QuestionnaireSession, RestoreOutcome), SessionError> {
        let snapshot = self
            .progress
            .get_snapshot(snapshot_id)
            .await?
            .ok_or_else(|| SessionError::SnapshotNotFound(snapshot_id.clone()))?;
        if snapshot.owner_id.as_ref() != Some(&author.user_id) {
            return Err(SessionError::SnapshotMismatch);
        }
        let questions = self.questions.load(&snapshot.assessment.assessment_id).await?;

        let mut session = QuestionnaireSession::new(author, snapshot.assessment.clone());
        session.offer_snapshot(snapshot)?;
        let outcome = session.load_questions(questions);
        Ok((session, outcome))
    }

    /// Saved questionnaires of `owner`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on backend failure.
    pub async fn in_progress(&self, owner: &UserId) -> Result<Vec<ProgressSnapshot>, SessionError> {
        Ok(self.progress.list_snapshots(owner).await?)
    }

    //
    // ─── ANSWERING AND MOVING ──────────────────────────────────────────────────
    //

    /// Answer the current question, then autosave.
    ///
    /// # Errors
    ///
    /// Propagates `QuestionnaireSession::answer` errors.
    pub fn answer(
        &self,
        session: &mut QuestionnaireSession,
        state: AnswerState,
    ) -> Result<Step<QuestionId>, SessionError> {
        let question_id = session.answer(state)?.clone();
        Ok(Step {
            outcome: question_id,
            autosaved: self.autosave(session),
        })
    }

    /// Advance, autosaving when the position changed.
    pub fn next(&self, session: &mut QuestionnaireSession) -> Step<Navigation> {
        let outcome = session.next();
        let autosaved = match outcome {
            Navigation::Moved(_) => self.autosave(session),
            Navigation::Blocked | Navigation::Complete => false,
        };
        Step { outcome, autosaved }
    }

    /// Step back, autosaving when the position changed.
    pub fn previous(&self, session: &mut QuestionnaireSession) -> Step<bool> {
        let moved = session.previous();
        Step {
            outcome: moved,
            autosaved: moved && self.autosave(session),
        }
    }

    /// Re-save progress in the background once the session has a stored snapshot.
    ///
    /// The save is queued behind any earlier save of the same session, so an
    /// older position never overwrites a newer one. Returns false when
    /// autosave is disabled, the session was never saved, or it is already
    /// complete. Failures are only logged.
    pub fn autosave(&self, session: &mut QuestionnaireSession) -> bool {
        if !self.config.autosave || session.is_complete() || session.snapshot_id().is_none() {
            return false;
        }
        let snapshot = session.capture_snapshot(self.clock.now());
        let progress = Arc::clone(&self.progress);
        queue_save(session, async move {
            match progress.save_snapshot(&snapshot).await {
                Ok(id) => debug!(snapshot_id = %id, "autosaved progress"),
                Err(err) => warn!(error = %err, "autosave failed"),
            }
        });
        true
    }

    //
    // ─── SAVE ──────────────────────────────────────────────────────────────────
    //

    /// Save progress and wait a bounded time for the backend to confirm.
    ///
    /// The save is queued behind earlier saves of the session. Confirmation is
    /// polled up to `save_poll_attempts` times, `save_poll_interval` apart. If
    /// the budget runs out the save stays tracked on the session and
    /// `SaveOutcome::Unconfirmed` is returned.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` for a finished session,
    /// `SessionError::Storage` if the backend reports a failure within the
    /// budget, and `SessionError::SaveAborted` if the save task dies.
    pub async fn persist(
        &self,
        session: &mut QuestionnaireSession,
    ) -> Result<SaveOutcome, SessionError> {
        if session.is_complete() {
            return Err(SessionError::Completed);
        }
        let snapshot = session.capture_snapshot(self.clock.now());
        let progress = Arc::clone(&self.progress);
        let (tx, mut rx) = oneshot::channel::<Result<SnapshotId, StorageError>>();
        queue_save(session, async move {
            let result = progress.save_snapshot(&snapshot).await;
            if let Err(unheard) = tx.send(result) {
                match unheard {
                    Ok(id) => info!(snapshot_id = %id, "snapshot saved after confirmation window"),
                    Err(err) => warn!(error = %err, "snapshot save failed after confirmation window"),
                }
            }
        });

        let mut polls = 0;
        loop {
            match rx.try_recv() {
                Ok(Ok(id)) => {
                    debug!(snapshot_id = %id, polls, "snapshot save confirmed");
                    session.set_snapshot_id(id.clone());
                    return Ok(SaveOutcome::Confirmed(id));
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(TryRecvError::Closed) => return Err(SessionError::SaveAborted),
                Err(TryRecvError::Empty) => {}
            }
            if polls >= self.config.save_poll_attempts {
                break;
            }
            polls += 1;
            sleep(self.config.save_poll_interval).await;
        }

        warn!(
            polls,
            budget_ms = u64::try_from(self.config.save_budget().as_millis()).unwrap_or(u64::MAX),
            "snapshot save not confirmed in time; continuing"
        );
        Ok(SaveOutcome::Unconfirmed)
    }

    //
    // ─── COMPLETION ────────────────────────────────────────────────────────────
    //

    /// Finish the questionnaire and hand back the data for the report screen.
    ///
    /// The session is marked complete immediately. Storing the report and
    /// deleting the snapshot happen on a detached task, after any save still
    /// in flight has landed. Failures there are logged and do not affect the
    /// returned result.
    ///
    /// # Errors
    ///
    /// Returns the first blocking condition from
    /// `QuestionnaireSession::ensure_completable`, or `SessionError::Report`
    /// if the report cannot be built.
    pub fn complete(&self, session: &mut QuestionnaireSession) -> Result<Completion, SessionError> {
        session.ensure_completable()?;

        let question_texts = session.questions().text_cache();
        let report = ComplianceReport::from_responses(
            session.author().clone(),
            session.assessment().clone(),
            session.responses(),
            question_texts.clone(),
            session.total_questions(),
            self.clock.now(),
        )?;
        session.finish();

        let assessment = CompletedAssessment {
            report: report.clone(),
            responses: session.responses().clone(),
            question_texts,
        };
        info!(
            assessment_id = %session.assessment().assessment_id,
            compliance = report.compliance_percentage(),
            "questionnaire completed"
        );

        let cleanup = tokio::spawn(cleanup_after_completion(
            Arc::clone(&self.progress),
            Arc::clone(&self.reports),
            report,
            session.owner().clone(),
            session.snapshot_id().cloned(),
            session.take_pending_save(),
        ));
        Ok(Completion { assessment, cleanup })
    }

    /// Delete a saved snapshot without completing it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SnapshotNotFound` if no snapshot has this id.
    pub async fn discard_snapshot(&self, id: &SnapshotId) -> Result<(), SessionError> {
        match self.progress.delete_snapshot(id).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => Err(SessionError::SnapshotNotFound(id.clone())),
            Err(err) => Err(err.into()),
        }
    }
}

async fn cleanup_after_completion(
    progress: Arc<dyn ProgressRepository>,
    reports: Arc<dyn ReportRepository>,
    report: ComplianceReport,
    owner: UserId,
    snapshot_id: Option<SnapshotId>,
    pending_save: Option<JoinHandle<()>>,
) {
    if let Some(save) = pending_save {
        await_save(save).await;
    }
    match reports.insert_report(&report).await {
        Ok(id) => debug!(report_id = %id, "stored compliance report"),
        Err(err) => warn!(error = %err, "failed to store compliance report"),
    }

    // An unconfirmed save may have created a snapshot without telling us its id.
    let snapshot_id = match snapshot_id {
        Some(id) => Some(id),
        None => match progress.find_snapshot(&owner, &report.assessment).await {
            Ok(found) => found.and_then(|s| s.id),
            Err(err) => {
                warn!(error = %err, "could not look up snapshot to clean up");
                None
            }
        },
    };
    let Some(id) = snapshot_id else {
        return;
    };
    match progress.delete_snapshot(&id).await {
        Ok(()) | Err(StorageError::NotFound) => debug!(snapshot_id = %id, "removed completed snapshot"),
        Err(err) => warn!(snapshot_id = %id, error = %err, "failed to remove completed snapshot"),
    }
}

/// Run `save` on its own task once the session's previous save has finished,
/// and track it as the session's newest save.
fn queue_save<F>(session: &mut QuestionnaireSession, save: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let previous = session.take_pending_save();
    session.set_pending_save(tokio::spawn(async move {
        if let Some(previous) = previous {
            await_save(previous).await;
        }
        save.await;
    }));
}
