use gxp_core::model::{ProgressSnapshot, QuestionId};

/// What a restore did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Position after clamping to the loaded question set.
    pub index: usize,
    pub answers: usize,
    /// Stored answers whose state name could not be decoded.
    pub skipped: Vec<(QuestionId, String)>,
}

/// Result of handing questions or a snapshot to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing to apply yet: either no snapshot was offered or questions
    /// have not loaded.
    Waiting,
    Applied(RestoreReport),
    /// A snapshot was already applied for this entry; the offer is ignored.
    AlreadyRestored,
}

/// Applies a pending snapshot exactly once, and only after questions have
/// loaded, whichever of the two arrives last.
#[derive(Debug, Default)]
pub(crate) struct RestoreGate {
    pending: Option<ProgressSnapshot>,
    applied: bool,
}

impl RestoreGate {
    /// Queues a snapshot. Returns false once a restore has already happened.
    pub(crate) fn offer(&mut self, snapshot: ProgressSnapshot) -> bool {
        if self.applied {
            return false;
        }
        self.pending = Some(snapshot);
        true
    }

    /// Releases the pending snapshot when questions are ready, closing the gate.
    pub(crate) fn release(&mut self, questions_loaded: bool) -> Option<ProgressSnapshot> {
        if self.applied || !questions_loaded {
            return None;
        }
        let snapshot = self.pending.take()?;
        self.applied = true;
        Some(snapshot)
    }

    pub(crate) fn is_applied(&self) -> bool {
        self.applied
    }
}
