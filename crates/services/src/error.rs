//! Shared error types for the services crate.

use thiserror::Error;

use gxp_core::model::{
    AssessmentId, DepartmentId, DirectoryError, EnterpriseId, FacilityId, InvitationError,
    QuestionError, ReportError, ReportId, SnapshotError, SnapshotId, UserId,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Coarse classification used by callers to decide how to surface an error.
///
/// `Validation` errors are raised before any remote call. `Transient` errors
/// can be retried by repeating the triggering action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Transient,
    Validation,
    Permission,
}

impl From<&StorageError> for ErrorKind {
    fn from(err: &StorageError) -> Self {
        match err {
            StorageError::NotFound => ErrorKind::NotFound,
            StorageError::PermissionDenied(_) => ErrorKind::Permission,
            _ => ErrorKind::Transient,
        }
    }
}

fn directory_kind(err: &DirectoryError) -> ErrorKind {
    match err {
        DirectoryError::UserLimitReached { .. } => ErrorKind::Permission,
        _ => ErrorKind::Validation,
    }
}

/// Errors emitted by `QuestionSetProvider`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionSetError {
    #[error("no questions found for assessment {0}")]
    NotFound(AssessmentId),
    #[error(transparent)]
    Invalid(#[from] QuestionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl QuestionSetError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuestionSetError::NotFound(_) => ErrorKind::NotFound,
            QuestionSetError::Invalid(_) => ErrorKind::Validation,
            QuestionSetError::Storage(err) => err.into(),
        }
    }
}

/// Errors emitted by questionnaire sessions and their coordinator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("questionnaire already completed")]
    Completed,
    #[error("no question at the current position")]
    NoCurrentQuestion,
    #[error("current question must be answered before completing")]
    Unanswered,
    #[error("only the last question can complete the questionnaire")]
    NotAtLastQuestion,
    #[error("snapshot belongs to a different user or assessment")]
    SnapshotMismatch,
    #[error("snapshot {0} not found")]
    SnapshotNotFound(SnapshotId),
    #[error("snapshot save task stopped before reporting a result")]
    SaveAborted,
    #[error(transparent)]
    Questions(#[from] QuestionSetError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Completed
            | SessionError::NoCurrentQuestion
            | SessionError::Unanswered
            | SessionError::NotAtLastQuestion
            | SessionError::Snapshot(_)
            | SessionError::Report(_) => ErrorKind::Validation,
            SessionError::SnapshotNotFound(_) => ErrorKind::NotFound,
            SessionError::SnapshotMismatch => ErrorKind::Permission,
            SessionError::SaveAborted => ErrorKind::Transient,
            SessionError::Questions(err) => err.kind(),
            SessionError::Storage(err) => err.into(),
        }
    }
}

/// Errors emitted by `DirectoryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DirectoryServiceError {
    #[error("enterprise {0} not found")]
    EnterpriseNotFound(EnterpriseId),
    #[error("facility {0} not found")]
    FacilityNotFound(FacilityId),
    #[error("department {0} not found")]
    DepartmentNotFound(DepartmentId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("user {0} already exists")]
    UserExists(UserId),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DirectoryServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DirectoryServiceError::EnterpriseNotFound(_)
            | DirectoryServiceError::FacilityNotFound(_)
            | DirectoryServiceError::DepartmentNotFound(_)
            | DirectoryServiceError::UserNotFound(_) => ErrorKind::NotFound,
            DirectoryServiceError::UserExists(_) => ErrorKind::Validation,
            DirectoryServiceError::Directory(err) => directory_kind(err),
            DirectoryServiceError::Storage(err) => err.into(),
        }
    }
}

/// Errors emitted by `InvitationService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InvitationServiceError {
    #[error("no pending invitation for this link")]
    NotFound,
    #[error("{0} already has an account")]
    AlreadyRegistered(String),
    #[error(transparent)]
    Invitation(#[from] InvitationError),
    #[error(transparent)]
    Directory(#[from] DirectoryServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl InvitationServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvitationServiceError::NotFound => ErrorKind::NotFound,
            InvitationServiceError::AlreadyRegistered(_)
            | InvitationServiceError::Invitation(_) => ErrorKind::Validation,
            InvitationServiceError::Directory(err) => err.kind(),
            InvitationServiceError::Storage(err) => err.into(),
        }
    }
}

/// Errors emitted by `ReportService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportServiceError {
    #[error("report {0} not found")]
    NotFound(ReportId),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ReportServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReportServiceError::NotFound(_) => ErrorKind::NotFound,
            ReportServiceError::Report(_) => ErrorKind::Validation,
            ReportServiceError::Storage(err) => err.into(),
        }
    }
}

/// Failures reported by the authentication backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("no user is signed in")]
    NotSignedIn,
    #[error("authentication service unavailable: {0}")]
    Unavailable(String),
}

/// Errors emitted by `AccountService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AccountError {
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl AccountError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccountError::EmptyField(_)
            | AccountError::PasswordTooShort { .. }
            | AccountError::PasswordMismatch => ErrorKind::Validation,
            AccountError::Auth(AuthError::Unavailable(_)) => ErrorKind::Transient,
            AccountError::Auth(_) => ErrorKind::Permission,
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_kinds() {
        assert_eq!(ErrorKind::from(&StorageError::NotFound), ErrorKind::NotFound);
        assert_eq!(
            ErrorKind::from(&StorageError::PermissionDenied("nope".into())),
            ErrorKind::Permission
        );
        assert_eq!(
            ErrorKind::from(&StorageError::Connection("offline".into())),
            ErrorKind::Transient
        );
        assert_eq!(ErrorKind::from(&StorageError::Conflict), ErrorKind::Transient);
    }

    #[test]
    fn seat_limit_is_a_permission_error() {
        let err = DirectoryServiceError::from(DirectoryError::UserLimitReached { limit: 5 });
        assert_eq!(err.kind(), ErrorKind::Permission);
        let err = DirectoryServiceError::from(DirectoryError::EmptyField("name"));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn nested_errors_keep_their_kind() {
        let err = SessionError::from(QuestionSetError::NotFound(AssessmentId::new("a1")));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = InvitationServiceError::from(DirectoryServiceError::EnterpriseNotFound(
            EnterpriseId::new("e1"),
        ));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            AccountError::Auth(AuthError::Unavailable("timeout".into())).kind(),
            ErrorKind::Transient
        );
    }
}
