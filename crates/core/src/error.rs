use thiserror::Error;

use crate::model::{
    AnswerError, DirectoryError, InvitationError, QuestionError, ReportError, SnapshotError,
};

/// Any validation failure raised by the domain layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Invitation(#[from] InvitationError),
    #[error(transparent)]
    Report(#[from] ReportError),
}
