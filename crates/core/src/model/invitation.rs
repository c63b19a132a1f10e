use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::directory::{DirectoryError, validate_email};
use crate::model::ids::{EnterpriseId, InvitationId, UserId};
use crate::model::permissions::InvitationPermissionSet;

/// How long an invitation link stays valid unless configured otherwise.
pub const DEFAULT_INVITATION_TTL_DAYS: i64 = 7;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvitationError {
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("invitation has already been used")]
    AlreadyUsed,

    #[error("invitation expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("invitation lifetime must be positive")]
    InvalidTtl,
}

impl From<DirectoryError> for InvitationError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::InvalidEmail(email) => InvitationError::InvalidEmail(email),
            // the only other error email validation reports is a blank field
            _ => InvitationError::EmptyField("email"),
        }
    }
}

/// Form input for a new invitation.
///
/// Permission toggles go through the `InvitationPermissionSet` setters, so the
/// draft can never hold an invalid hierarchy.
#[derive(Debug, Clone, Default)]
pub struct InvitationDraft {
    pub email: String,
    pub display_name: String,
    pub department: String,
    pub job_title: String,
    pub permissions: InvitationPermissionSet,
}

impl InvitationDraft {
    /// Validates and issues an invitation with a fresh id and token.
    ///
    /// # Errors
    ///
    /// Returns `InvitationError` for a blank display name, malformed email, or
    /// a non-positive `ttl`.
    pub fn issue(
        self,
        enterprise_id: EnterpriseId,
        invited_by: UserId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Invitation, InvitationError> {
        if ttl <= Duration::zero() {
            return Err(InvitationError::InvalidTtl);
        }
        let email = validate_email(self.email)?;
        let display_name = self.display_name.trim().to_owned();
        if display_name.is_empty() {
            return Err(InvitationError::EmptyField("display name"));
        }

        Ok(Invitation {
            id: InvitationId::new(Uuid::new_v4().to_string()),
            token: Uuid::new_v4().to_string(),
            email,
            display_name,
            enterprise_id,
            department: self.department.trim().to_owned(),
            job_title: self.job_title.trim().to_owned(),
            permissions: self.permissions,
            invited_by,
            invited_at: now,
            expires_at: now + ttl,
            used_at: None,
        })
    }
}

/// A pending or accepted invitation to join an enterprise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    /// Opaque token carried by the invitation link.
    pub token: String,
    pub email: String,
    pub display_name: String,
    pub enterprise_id: EnterpriseId,
    pub department: String,
    pub job_title: String,
    pub permissions: InvitationPermissionSet,
    pub invited_by: UserId,
    pub invited_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl Invitation {
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Marks the invitation as accepted.
    ///
    /// # Errors
    ///
    /// Returns `InvitationError::AlreadyUsed` or `InvitationError::Expired`.
    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<(), InvitationError> {
        if self.is_used() {
            return Err(InvitationError::AlreadyUsed);
        }
        if self.is_expired(now) {
            return Err(InvitationError::Expired(self.expires_at));
        }
        self.used_at = Some(now);
        Ok(())
    }

    /// Deep link for this invitation under the given scheme prefix.
    #[must_use]
    pub fn link(&self, scheme: &str) -> String {
        format!("{scheme}?token={}", self.token)
    }
}
