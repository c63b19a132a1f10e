use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gxp_core::model::{
    AssessmentId, AssessmentRef, ComplianceReport, Department, DepartmentId, Enterprise,
    EnterpriseId, Facility, FacilityId, Invitation, InvitationId, ProgressSnapshot, Question,
    QuestionSet, ReportId, SnapshotId, UserId, UserProfile,
};
use std::sync::Arc;
use thiserror::Error;

pub use crate::memory::InMemoryRepository;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── QUESTIONNAIRE ─────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Replace the stored question list for an assessment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the questions cannot be stored.
    async fn save_questions(
        &self,
        assessment_id: &AssessmentId,
        questions: &QuestionSet,
    ) -> Result<(), StorageError>;

    /// Fetch the questions for an assessment, ordered by ordinal.
    ///
    /// Returns `None` when nothing is stored under that id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_questions(
        &self,
        assessment_id: &AssessmentId,
    ) -> Result<Option<Vec<Question>>, StorageError>;
}

/// Persistence for in-progress questionnaire snapshots.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Create or update a snapshot and return its stable id.
    ///
    /// A snapshot without an id is matched against the owner's existing
    /// snapshots for the same assessment and updates that record if one
    /// exists; otherwise a new id is assigned. A snapshot with an id updates
    /// that record in place, keeping its original `created_at`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PermissionDenied` if the snapshot has no owner,
    /// or other storage errors.
    async fn save_snapshot(&self, snapshot: &ProgressSnapshot) -> Result<SnapshotId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_snapshot(&self, id: &SnapshotId) -> Result<Option<ProgressSnapshot>, StorageError>;

    /// Most recently updated snapshot for `owner` that resumes `assessment`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn find_snapshot(
        &self,
        owner: &UserId,
        assessment: &AssessmentRef,
    ) -> Result<Option<ProgressSnapshot>, StorageError>;

    /// All snapshots for `owner`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_snapshots(&self, owner: &UserId) -> Result<Vec<ProgressSnapshot>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no snapshot has this id.
    async fn delete_snapshot(&self, id: &SnapshotId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Store a completed report and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the report cannot be stored.
    async fn insert_report(&self, report: &ComplianceReport) -> Result<ReportId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_report(&self, id: &ReportId) -> Result<Option<ComplianceReport>, StorageError>;

    /// Reports authored by `user`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_reports_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<ComplianceReport>, StorageError>;

    /// Reports filed under `enterprise`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_reports_for_enterprise(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<ComplianceReport>, StorageError>;
}

//
// ─── DIRECTORY ─────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait InvitationRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id or token is already taken.
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_invitation(&self, id: &InvitationId) -> Result<Option<Invitation>, StorageError>;

    /// Look up an invitation by its link token. Used invitations are not returned.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_invitation_by_token(&self, token: &str)
    -> Result<Option<Invitation>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no invitation has this id.
    async fn mark_invitation_used(
        &self,
        id: &InvitationId,
        used_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Invitations for an enterprise, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_invitations(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<Invitation>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no invitation has this id.
    async fn delete_invitation(&self, id: &InvitationId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait EnterpriseRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the enterprise cannot be stored.
    async fn upsert_enterprise(&self, enterprise: &Enterprise) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_enterprise(&self, id: &EnterpriseId) -> Result<Option<Enterprise>, StorageError>;

    /// All enterprises ordered by company name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_enterprises(&self) -> Result<Vec<Enterprise>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no enterprise has this id.
    async fn delete_enterprise(&self, id: &EnterpriseId) -> Result<(), StorageError>;

    /// Take one seat if the enterprise is below its user limit. The check and
    /// the increment happen as one step, so concurrent callers cannot both
    /// take the last seat.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no enterprise has this id.
    async fn reserve_seat(&self, id: &EnterpriseId) -> Result<SeatReservation, StorageError>;

    /// Give one seat back. The count stops at zero.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no enterprise has this id.
    async fn release_seat(&self, id: &EnterpriseId) -> Result<(), StorageError>;
}

/// Result of [`EnterpriseRepository::reserve_seat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatReservation {
    /// The seat was taken; carries the enterprise with its new count.
    Reserved(Enterprise),
    Full { limit: u32 },
}

#[async_trait]
pub trait FacilityRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the facility cannot be stored.
    async fn upsert_facility(&self, facility: &Facility) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_facility(&self, id: &FacilityId) -> Result<Option<Facility>, StorageError>;

    /// Facilities of an enterprise ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_facilities(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<Facility>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no facility has this id.
    async fn delete_facility(&self, id: &FacilityId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait DepartmentRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the department cannot be stored.
    async fn upsert_department(&self, department: &Department) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_department(&self, id: &DepartmentId)
    -> Result<Option<Department>, StorageError>;

    /// Departments of an enterprise ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_departments(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<Department>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no department has this id.
    async fn delete_department(&self, id: &DepartmentId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if another user already holds the email.
    async fn upsert_user(&self, user: &UserProfile) -> Result<(), StorageError>;

    /// Store a new user, refusing to overwrite an existing one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the uid exists or another user
    /// already holds the email.
    async fn insert_user(&self, user: &UserProfile) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_user(&self, uid: &UserId) -> Result<Option<UserProfile>, StorageError>;

    /// Case-insensitive lookup by email.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserProfile>, StorageError>;

    /// Users of an enterprise ordered by display name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_users(&self, enterprise: &EnterpriseId)
    -> Result<Vec<UserProfile>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no user has this id.
    async fn delete_user(&self, uid: &UserId) -> Result<(), StorageError>;
}

/// Aggregates every repository behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub invitations: Arc<dyn InvitationRepository>,
    pub enterprises: Arc<dyn EnterpriseRepository>,
    pub facilities: Arc<dyn FacilityRepository>,
    pub departments: Arc<dyn DepartmentRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Storage {
    /// Wires every repository to the same backend instance.
    #[must_use]
    pub fn from_backend<R>(repo: R) -> Self
    where
        R: QuestionRepository
            + ProgressRepository
            + ReportRepository
            + InvitationRepository
            + EnterpriseRepository
            + FacilityRepository
            + DepartmentRepository
            + UserRepository
            + 'static,
    {
        let repo = Arc::new(repo);
        Self {
            questions: repo.clone(),
            progress: repo.clone(),
            reports: repo.clone(),
            invitations: repo.clone(),
            enterprises: repo.clone(),
            facilities: repo.clone(),
            departments: repo.clone(),
            users: repo,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_backend(InMemoryRepository::new())
    }
}
