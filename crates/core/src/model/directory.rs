use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{DepartmentId, EnterpriseId, FacilityId, UserId};
use crate::model::permissions::InvitationPermissionSet;

/// Seats granted to a new enterprise unless the draft says otherwise.
pub const DEFAULT_USER_LIMIT: u32 = 50;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DirectoryError {
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("user limit must be > 0")]
    InvalidUserLimit,

    #[error("user limit reached ({limit} max)")]
    UserLimitReached { limit: u32 },

    #[error("unknown user role: {0}")]
    UnknownRole(String),
}

fn required(field: &'static str, value: String) -> Result<String, DirectoryError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DirectoryError::EmptyField(field));
    }
    Ok(trimmed.to_owned())
}

fn optional(value: String) -> String {
    value.trim().to_owned()
}

pub(crate) fn validate_email(email: String) -> Result<String, DirectoryError> {
    let email = required("email", email)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(DirectoryError::InvalidEmail(email)),
    }
}

//
// ─── ENTERPRISE ────────────────────────────────────────────────────────────────
//

/// Tenant record holding facilities, departments, and users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enterprise {
    pub id: EnterpriseId,
    pub company_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub admin_email: String,
    pub admin_name: String,
    pub admin_uid: Option<UserId>,
    pub address: String,
    pub industry: String,
    pub user_limit: u32,
    pub current_user_count: u32,
    pub is_active: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    /// Subscription end; `None` means no expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Enterprise {
    #[must_use]
    pub fn can_add_user(&self) -> bool {
        self.current_user_count < self.user_limit
    }

    #[must_use]
    pub fn remaining_seats(&self) -> u32 {
        self.user_limit.saturating_sub(self.current_user_count)
    }

    /// Seat usage as a whole percentage, truncated. Zero when the limit is zero.
    #[must_use]
    pub fn capacity_percentage(&self) -> u32 {
        if self.user_limit == 0 {
            return 0;
        }
        let pct = u64::from(self.current_user_count) * 100 / u64::from(self.user_limit);
        u32::try_from(pct).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Reserves one seat for a new user.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::UserLimitReached` when no seats remain.
    pub fn reserve_seat(&mut self) -> Result<(), DirectoryError> {
        if !self.can_add_user() {
            return Err(DirectoryError::UserLimitReached {
                limit: self.user_limit,
            });
        }
        self.current_user_count += 1;
        Ok(())
    }

    /// Returns a seat after a user is removed.
    pub fn release_seat(&mut self) {
        self.current_user_count = self.current_user_count.saturating_sub(1);
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnterpriseDraft {
    pub company_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub admin_email: String,
    pub admin_name: String,
    pub address: String,
    pub industry: String,
    pub user_limit: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl EnterpriseDraft {
    /// Validate the draft into a new, active enterprise with no users.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError` for blank required fields, malformed emails, or a zero limit.
    pub fn validate(
        self,
        id: EnterpriseId,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Enterprise, DirectoryError> {
        let user_limit = self.user_limit.unwrap_or(DEFAULT_USER_LIMIT);
        if user_limit == 0 {
            return Err(DirectoryError::InvalidUserLimit);
        }
        Ok(Enterprise {
            id,
            company_name: required("company name", self.company_name)?,
            contact_email: validate_email(self.contact_email)?,
            contact_phone: optional(self.contact_phone),
            admin_email: validate_email(self.admin_email)?,
            admin_name: required("admin name", self.admin_name)?,
            admin_uid: None,
            address: optional(self.address),
            industry: optional(self.industry),
            user_limit,
            current_user_count: 0,
            is_active: true,
            created_by,
            created_at: now,
            expires_at: self.expires_at,
        })
    }
}

//
// ─── FACILITY ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub enterprise_id: EnterpriseId,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_by: UserId,
    pub updated_at: DateTime<Utc>,
}

impl Facility {
    /// Applies an edit, stamping who made it.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::EmptyField` if the new name is blank.
    pub fn apply_edit(
        &mut self,
        name: String,
        description: String,
        editor: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        self.name = required("facility name", name)?;
        self.description = optional(description);
        self.updated_by = editor;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FacilityDraft {
    pub name: String,
    pub description: String,
}

impl FacilityDraft {
    /// # Errors
    ///
    /// Returns `DirectoryError::EmptyField` if the name is blank.
    pub fn validate(
        self,
        id: FacilityId,
        enterprise_id: EnterpriseId,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Facility, DirectoryError> {
        Ok(Facility {
            id,
            enterprise_id,
            name: required("facility name", self.name)?,
            description: optional(self.description),
            is_active: true,
            updated_by: created_by.clone(),
            created_by,
            created_at: now,
            updated_at: now,
        })
    }
}

//
// ─── DEPARTMENT ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub enterprise_id: EnterpriseId,
    pub name: String,
    pub description: String,
    /// Template domain prefixes this department assesses by default.
    pub allowed_domains: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct DepartmentDraft {
    pub name: String,
    pub description: String,
    pub allowed_domains: Vec<String>,
}

impl DepartmentDraft {
    /// # Errors
    ///
    /// Returns `DirectoryError::EmptyField` if the name is blank.
    pub fn validate(
        self,
        id: DepartmentId,
        enterprise_id: EnterpriseId,
        now: DateTime<Utc>,
    ) -> Result<Department, DirectoryError> {
        let mut allowed_domains: Vec<String> = self
            .allowed_domains
            .into_iter()
            .map(optional)
            .filter(|d| !d.is_empty())
            .collect();
        allowed_domains.dedup();
        Ok(Department {
            id,
            enterprise_id,
            name: required("department name", self.name)?,
            description: optional(self.description),
            allowed_domains,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

//
// ─── USERS ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    SuperAdmin,
    EnterpriseAdmin,
    User,
}

impl UserRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::SuperAdmin => "SUPER_ADMIN",
            UserRole::EnterpriseAdmin => "ENTERPRISE_ADMIN",
            UserRole::User => "USER",
        }
    }
}

impl FromStr for UserRole {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPER_ADMIN" => Ok(UserRole::SuperAdmin),
            "ENTERPRISE_ADMIN" => Ok(UserRole::EnterpriseAdmin),
            "USER" => Ok(UserRole::User),
            other => Err(DirectoryError::UnknownRole(other.to_owned())),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: UserId,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub enterprise_id: Option<EnterpriseId>,
    pub department: String,
    pub job_title: String,
    /// Only enterprise users carry a permission set.
    pub permissions: Option<InvitationPermissionSet>,
    pub is_active: bool,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserDraft {
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub department: String,
    pub job_title: String,
    pub permissions: Option<InvitationPermissionSet>,
}

impl UserDraft {
    /// # Errors
    ///
    /// Returns `DirectoryError` for a blank display name or malformed email.
    pub fn validate(
        self,
        uid: UserId,
        enterprise_id: Option<EnterpriseId>,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, DirectoryError> {
        Ok(UserProfile {
            uid,
            email: validate_email(self.email)?,
            display_name: required("display name", self.display_name)?,
            role: self.role,
            enterprise_id,
            department: optional(self.department),
            job_title: optional(self.job_title),
            permissions: self.permissions,
            is_active: true,
            created_by,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn draft() -> EnterpriseDraft {
        EnterpriseDraft {
            company_name: " Acme Pharma ".into(),
            contact_email: "ops@acme.test".into(),
            admin_email: "admin@acme.test".into(),
            admin_name: "Pat".into(),
            ..EnterpriseDraft::default()
        }
    }

    fn enterprise(limit: u32, count: u32) -> Enterprise {
        let mut e = EnterpriseDraft {
            user_limit: Some(limit),
            ..draft()
        }
        .validate(EnterpriseId::new("e1"), UserId::new("root"), fixed_now())
        .unwrap();
        e.current_user_count = count;
        e
    }

    #[test]
    fn draft_trims_and_defaults_limit() {
        let e = draft()
            .validate(EnterpriseId::new("e1"), UserId::new("root"), fixed_now())
            .unwrap();
        assert_eq!(e.company_name, "Acme Pharma");
        assert_eq!(e.user_limit, DEFAULT_USER_LIMIT);
        assert_eq!(e.current_user_count, 0);
        assert!(e.is_active);
    }

    #[test]
    fn draft_rejects_bad_email_and_zero_limit() {
        let err = EnterpriseDraft {
            contact_email: "nope".into(),
            ..draft()
        }
        .validate(EnterpriseId::new("e1"), UserId::new("root"), fixed_now())
        .unwrap_err();
        assert_eq!(err, DirectoryError::InvalidEmail("nope".into()));

        let err = EnterpriseDraft {
            user_limit: Some(0),
            ..draft()
        }
        .validate(EnterpriseId::new("e1"), UserId::new("root"), fixed_now())
        .unwrap_err();
        assert_eq!(err, DirectoryError::InvalidUserLimit);
    }

    #[test]
    fn capacity_statistics() {
        let e = enterprise(50, 12);
        assert!(e.can_add_user());
        assert_eq!(e.remaining_seats(), 38);
        assert_eq!(e.capacity_percentage(), 24);

        let full = enterprise(3, 3);
        assert!(!full.can_add_user());
        assert_eq!(full.remaining_seats(), 0);
        assert_eq!(full.capacity_percentage(), 100);
    }

    #[test]
    fn capacity_percentage_truncates() {
        assert_eq!(enterprise(3, 2).capacity_percentage(), 66);
    }

    #[test]
    fn reserve_seat_stops_at_limit() {
        let mut e = enterprise(2, 1);
        e.reserve_seat().unwrap();
        assert_eq!(e.current_user_count, 2);
        assert_eq!(
            e.reserve_seat().unwrap_err(),
            DirectoryError::UserLimitReached { limit: 2 }
        );
        e.release_seat();
        assert_eq!(e.current_user_count, 1);
    }

    #[test]
    fn facility_edit_stamps_editor() {
        let mut f = FacilityDraft {
            name: "Plant A".into(),
            description: String::new(),
        }
        .validate(
            FacilityId::new("f1"),
            EnterpriseId::new("e1"),
            UserId::new("admin"),
            fixed_now(),
        )
        .unwrap();
        let later = fixed_now() + chrono::Duration::hours(1);
        f.apply_edit("Plant B".into(), "north".into(), UserId::new("admin2"), later)
            .unwrap();
        assert_eq!(f.name, "Plant B");
        assert_eq!(f.updated_by, UserId::new("admin2"));
        assert_eq!(f.updated_at, later);
        assert_eq!(f.created_by, UserId::new("admin"));
        assert!(f.apply_edit(" ".into(), String::new(), UserId::new("x"), later).is_err());
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [UserRole::SuperAdmin, UserRole::EnterpriseAdmin, UserRole::User] {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert!("ROOT".parse::<UserRole>().is_err());
    }
}
