use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gxp_core::model::{
    AssessmentId, AssessmentRef, ComplianceReport, Department, DepartmentId, Enterprise,
    EnterpriseId, Facility, FacilityId, Invitation, InvitationId, ProgressSnapshot, Question,
    QuestionSet, ReportId, SnapshotId, UserId, UserProfile,
};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::repository::{
    DepartmentRepository, EnterpriseRepository, FacilityRepository, InvitationRepository,
    ProgressRepository, QuestionRepository, ReportRepository, SeatReservation, StorageError,
    UserRepository,
};

type Table<K, V> = Arc<Mutex<HashMap<K, V>>>;

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    questions: Table<AssessmentId, Vec<Question>>,
    snapshots: Table<SnapshotId, ProgressSnapshot>,
    reports: Table<ReportId, ComplianceReport>,
    invitations: Table<InvitationId, Invitation>,
    enterprises: Table<EnterpriseId, Enterprise>,
    facilities: Table<FacilityId, Facility>,
    departments: Table<DepartmentId, Department>,
    users: Table<UserId, UserProfile>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<K, V>(table: &Table<K, V>) -> Result<MutexGuard<'_, HashMap<K, V>>, StorageError> {
    table
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

fn remove<K: Eq + Hash, V>(table: &Table<K, V>, key: &K) -> Result<(), StorageError> {
    lock(table)?
        .remove(key)
        .map(|_| ())
        .ok_or(StorageError::NotFound)
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn save_questions(
        &self,
        assessment_id: &AssessmentId,
        questions: &QuestionSet,
    ) -> Result<(), StorageError> {
        lock(&self.questions)?.insert(assessment_id.clone(), questions.as_slice().to_vec());
        Ok(())
    }

    async fn get_questions(
        &self,
        assessment_id: &AssessmentId,
    ) -> Result<Option<Vec<Question>>, StorageError> {
        Ok(lock(&self.questions)?.get(assessment_id).cloned())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn save_snapshot(&self, snapshot: &ProgressSnapshot) -> Result<SnapshotId, StorageError> {
        let owner = snapshot
            .owner_id
            .as_ref()
            .ok_or_else(|| StorageError::PermissionDenied("snapshot has no owner".into()))?;
        let mut guard = lock(&self.snapshots)?;

        let target = match &snapshot.id {
            Some(id) => Some(id.clone()),
            None => guard
                .values()
                .filter(|s| s.resumes(owner, &snapshot.assessment))
                .max_by_key(|s| s.updated_at)
                .and_then(|s| s.id.clone()),
        };

        let mut stored = snapshot.clone();
        let id = match target {
            Some(id) => {
                let previous = guard.get(&id).ok_or(StorageError::NotFound)?;
                if previous.owner_id.as_ref() != Some(owner) {
                    return Err(StorageError::PermissionDenied(format!(
                        "snapshot {id} belongs to another user"
                    )));
                }
                stored.created_at = previous.created_at;
                id
            }
            None => SnapshotId::new(fresh_id()),
        };
        stored.id = Some(id.clone());
        guard.insert(id.clone(), stored);
        Ok(id)
    }

    async fn get_snapshot(&self, id: &SnapshotId) -> Result<Option<ProgressSnapshot>, StorageError> {
        Ok(lock(&self.snapshots)?.get(id).cloned())
    }

    async fn find_snapshot(
        &self,
        owner: &UserId,
        assessment: &AssessmentRef,
    ) -> Result<Option<ProgressSnapshot>, StorageError> {
        Ok(lock(&self.snapshots)?
            .values()
            .filter(|s| s.resumes(owner, assessment))
            .max_by_key(|s| s.updated_at)
            .cloned())
    }

    async fn list_snapshots(&self, owner: &UserId) -> Result<Vec<ProgressSnapshot>, StorageError> {
        let mut found: Vec<ProgressSnapshot> = lock(&self.snapshots)?
            .values()
            .filter(|s| s.owner_id.as_ref() == Some(owner))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }

    async fn delete_snapshot(&self, id: &SnapshotId) -> Result<(), StorageError> {
        remove(&self.snapshots, id)
    }
}

#[async_trait]
impl ReportRepository for InMemoryRepository {
    async fn insert_report(&self, report: &ComplianceReport) -> Result<ReportId, StorageError> {
        let id = report
            .id
            .clone()
            .unwrap_or_else(|| ReportId::new(fresh_id()));
        let mut guard = lock(&self.reports)?;
        if guard.contains_key(&id) {
            return Err(StorageError::Conflict);
        }
        guard.insert(id.clone(), report.clone().with_id(id.clone()));
        Ok(id)
    }

    async fn get_report(&self, id: &ReportId) -> Result<Option<ComplianceReport>, StorageError> {
        Ok(lock(&self.reports)?.get(id).cloned())
    }

    async fn list_reports_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<ComplianceReport>, StorageError> {
        let mut found: Vec<ComplianceReport> = lock(&self.reports)?
            .values()
            .filter(|r| &r.author.user_id == user)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(found)
    }

    async fn list_reports_for_enterprise(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<ComplianceReport>, StorageError> {
        let mut found: Vec<ComplianceReport> = lock(&self.reports)?
            .values()
            .filter(|r| r.author.enterprise_id.as_ref() == Some(enterprise))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(found)
    }
}

#[async_trait]
impl InvitationRepository for InMemoryRepository {
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), StorageError> {
        let mut guard = lock(&self.invitations)?;
        let clash = guard.contains_key(&invitation.id)
            || guard.values().any(|i| i.token == invitation.token);
        if clash {
            return Err(StorageError::Conflict);
        }
        guard.insert(invitation.id.clone(), invitation.clone());
        Ok(())
    }

    async fn get_invitation(&self, id: &InvitationId) -> Result<Option<Invitation>, StorageError> {
        Ok(lock(&self.invitations)?.get(id).cloned())
    }

    async fn get_invitation_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Invitation>, StorageError> {
        Ok(lock(&self.invitations)?
            .values()
            .find(|i| i.token == token && !i.is_used())
            .cloned())
    }

    async fn mark_invitation_used(
        &self,
        id: &InvitationId,
        used_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = lock(&self.invitations)?;
        let invitation = guard.get_mut(id).ok_or(StorageError::NotFound)?;
        invitation.used_at = Some(used_at);
        Ok(())
    }

    async fn list_invitations(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<Invitation>, StorageError> {
        let mut found: Vec<Invitation> = lock(&self.invitations)?
            .values()
            .filter(|i| &i.enterprise_id == enterprise)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.invited_at.cmp(&a.invited_at));
        Ok(found)
    }

    async fn delete_invitation(&self, id: &InvitationId) -> Result<(), StorageError> {
        remove(&self.invitations, id)
    }
}

#[async_trait]
impl EnterpriseRepository for InMemoryRepository {
    async fn upsert_enterprise(&self, enterprise: &Enterprise) -> Result<(), StorageError> {
        lock(&self.enterprises)?.insert(enterprise.id.clone(), enterprise.clone());
        Ok(())
    }

    async fn get_enterprise(&self, id: &EnterpriseId) -> Result<Option<Enterprise>, StorageError> {
        Ok(lock(&self.enterprises)?.get(id).cloned())
    }

    async fn list_enterprises(&self) -> Result<Vec<Enterprise>, StorageError> {
        let mut found: Vec<Enterprise> = lock(&self.enterprises)?.values().cloned().collect();
        found.sort_by(|a, b| a.company_name.cmp(&b.company_name));
        Ok(found)
    }

    async fn delete_enterprise(&self, id: &EnterpriseId) -> Result<(), StorageError> {
        remove(&self.enterprises, id)
    }

    async fn reserve_seat(&self, id: &EnterpriseId) -> Result<SeatReservation, StorageError> {
        let mut guard = lock(&self.enterprises)?;
        let enterprise = guard.get_mut(id).ok_or(StorageError::NotFound)?;
        match enterprise.reserve_seat() {
            Ok(()) => Ok(SeatReservation::Reserved(enterprise.clone())),
            Err(_) => Ok(SeatReservation::Full {
                limit: enterprise.user_limit,
            }),
        }
    }

    async fn release_seat(&self, id: &EnterpriseId) -> Result<(), StorageError> {
        lock(&self.enterprises)?
            .get_mut(id)
            .ok_or(StorageError::NotFound)?
            .release_seat();
        Ok(())
    }
}

#[async_trait]
impl FacilityRepository for InMemoryRepository {
    async fn upsert_facility(&self, facility: &Facility) -> Result<(), StorageError> {
        lock(&self.facilities)?.insert(facility.id.clone(), facility.clone());
        Ok(())
    }

    async fn get_facility(&self, id: &FacilityId) -> Result<Option<Facility>, StorageError> {
        Ok(lock(&self.facilities)?.get(id).cloned())
    }

    async fn list_facilities(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<Facility>, StorageError> {
        let mut found: Vec<Facility> = lock(&self.facilities)?
            .values()
            .filter(|f| &f.enterprise_id == enterprise)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn delete_facility(&self, id: &FacilityId) -> Result<(), StorageError> {
        remove(&self.facilities, id)
    }
}

#[async_trait]
impl DepartmentRepository for InMemoryRepository {
    async fn upsert_department(&self, department: &Department) -> Result<(), StorageError> {
        lock(&self.departments)?.insert(department.id.clone(), department.clone());
        Ok(())
    }

    async fn get_department(
        &self,
        id: &DepartmentId,
    ) -> Result<Option<Department>, StorageError> {
        Ok(lock(&self.departments)?.get(id).cloned())
    }

    async fn list_departments(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<Department>, StorageError> {
        let mut found: Vec<Department> = lock(&self.departments)?
            .values()
            .filter(|d| &d.enterprise_id == enterprise)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn delete_department(&self, id: &DepartmentId) -> Result<(), StorageError> {
        remove(&self.departments, id)
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn upsert_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        let mut guard = lock(&self.users)?;
        let taken = guard
            .values()
            .any(|u| u.uid != user.uid && u.email.eq_ignore_ascii_case(&user.email));
        if taken {
            return Err(StorageError::Conflict);
        }
        guard.insert(user.uid.clone(), user.clone());
        Ok(())
    }

    async fn insert_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        let mut guard = lock(&self.users)?;
        let taken = guard.contains_key(&user.uid)
            || guard
                .values()
                .any(|u| u.email.eq_ignore_ascii_case(&user.email));
        if taken {
            return Err(StorageError::Conflict);
        }
        guard.insert(user.uid.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, uid: &UserId) -> Result<Option<UserProfile>, StorageError> {
        Ok(lock(&self.users)?.get(uid).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserProfile>, StorageError> {
        let email = email.trim();
        Ok(lock(&self.users)?
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<UserProfile>, StorageError> {
        let mut found: Vec<UserProfile> = lock(&self.users)?
            .values()
            .filter(|u| u.enterprise_id.as_ref() == Some(enterprise))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(found)
    }

    async fn delete_user(&self, uid: &UserId) -> Result<(), StorageError> {
        remove(&self.users, uid)
    }
}
