use std::sync::Arc;

use gxp_core::model::{
    Department, DepartmentDraft, DepartmentId, DirectoryError, Enterprise, EnterpriseDraft,
    EnterpriseId, Facility, FacilityDraft, FacilityId, InvitationPermissionSet, UserDraft, UserId,
    UserProfile,
};
use storage::repository::{
    DepartmentRepository, EnterpriseRepository, FacilityRepository, SeatReservation,
    StorageError, UserRepository,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::Clock;
use crate::error::DirectoryServiceError;

/// CRUD over the enterprise hierarchy with the per-enterprise seat limit.
#[derive(Clone)]
pub struct DirectoryService {
    clock: Clock,
    enterprises: Arc<dyn EnterpriseRepository>,
    facilities: Arc<dyn FacilityRepository>,
    departments: Arc<dyn DepartmentRepository>,
    users: Arc<dyn UserRepository>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl DirectoryService {
    #[must_use]
    pub fn new(
        clock: Clock,
        enterprises: Arc<dyn EnterpriseRepository>,
        facilities: Arc<dyn FacilityRepository>,
        departments: Arc<dyn DepartmentRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            clock,
            enterprises,
            facilities,
            departments,
            users,
        }
    }

    //
    // ─── ENTERPRISES ───────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::Directory` for invalid drafts and
    /// `DirectoryServiceError::Storage` if persistence fails.
    pub async fn create_enterprise(
        &self,
        draft: EnterpriseDraft,
        created_by: UserId,
    ) -> Result<Enterprise, DirectoryServiceError> {
        let enterprise = draft.validate(EnterpriseId::new(new_id()), created_by, self.clock.now())?;
        self.enterprises.upsert_enterprise(&enterprise).await?;
        info!(enterprise_id = %enterprise.id, user_limit = enterprise.user_limit, "created enterprise");
        Ok(enterprise)
    }

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::EnterpriseNotFound` for an unknown id.
    pub async fn get_enterprise(
        &self,
        id: &EnterpriseId,
    ) -> Result<Enterprise, DirectoryServiceError> {
        self.enterprises
            .get_enterprise(id)
            .await?
            .ok_or_else(|| DirectoryServiceError::EnterpriseNotFound(id.clone()))
    }

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::Storage` on backend failure.
    pub async fn list_enterprises(&self) -> Result<Vec<Enterprise>, DirectoryServiceError> {
        Ok(self.enterprises.list_enterprises().await?)
    }

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::EnterpriseNotFound` for an unknown id.
    pub async fn set_enterprise_active(
        &self,
        id: &EnterpriseId,
        active: bool,
    ) -> Result<Enterprise, DirectoryServiceError> {
        let mut enterprise = self.get_enterprise(id).await?;
        enterprise.is_active = active;
        self.enterprises.upsert_enterprise(&enterprise).await?;
        Ok(enterprise)
    }

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::EnterpriseNotFound` for an unknown id.
    pub async fn delete_enterprise(&self, id: &EnterpriseId) -> Result<(), DirectoryServiceError> {
        match self.enterprises.delete_enterprise(id).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => Err(DirectoryServiceError::EnterpriseNotFound(id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    //
    // ─── FACILITIES ────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::EnterpriseNotFound` if the enterprise
    /// does not exist, or `DirectoryServiceError::Directory` for a blank name.
    pub async fn create_facility(
        &self,
        enterprise: &EnterpriseId,
        draft: FacilityDraft,
        created_by: UserId,
    ) -> Result<Facility, DirectoryServiceError> {
        self.get_enterprise(enterprise).await?;
        let facility = draft.validate(
            FacilityId::new(new_id()),
            enterprise.clone(),
            created_by,
            self.clock.now(),
        )?;
        self.facilities.upsert_facility(&facility).await?;
        Ok(facility)
    }

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::FacilityNotFound` for an unknown id, or
    /// `DirectoryServiceError::Directory` for a blank name.
    pub async fn edit_facility(
        &self,
        id: &FacilityId,
        name: String,
        description: String,
        editor: UserId,
    ) -> Result<Facility, DirectoryServiceError> {
        let mut facility = self
            .facilities
            .get_facility(id)
            .await?
            .ok_or_else(|| DirectoryServiceError::FacilityNotFound(id.clone()))?;
        facility.apply_edit(name, description, editor, self.clock.now())?;
        self.facilities.upsert_facility(&facility).await?;
        Ok(facility)
    }

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::Storage` on backend failure.
    pub async fn list_facilities(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<Facility>, DirectoryServiceError> {
        Ok(self.facilities.list_facilities(enterprise).await?)
    }

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::FacilityNotFound` for an unknown id.
    pub async fn delete_facility(&self, id: &FacilityId) -> Result<(), DirectoryServiceError> {
        match self.facilities.delete_facility(id).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => Err(DirectoryServiceError::FacilityNotFound(id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    //
    // ─── DEPARTMENTS ───────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::EnterpriseNotFound` if the enterprise
    /// does not exist, or `DirectoryServiceError::Directory` for a blank name.
    pub async fn create_department(
        &self,
        enterprise: &EnterpriseId,
        draft: DepartmentDraft,
    ) -> Result<Department, DirectoryServiceError> {
        self.get_enterprise(enterprise).await?;
        let department =
            draft.validate(DepartmentId::new(new_id()), enterprise.clone(), self.clock.now())?;
        self.departments.upsert_department(&department).await?;
        Ok(department)
    }

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::Storage` on backend failure.
    pub async fn list_departments(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<Department>, DirectoryServiceError> {
        Ok(self.departments.list_departments(enterprise).await?)
    }

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::DepartmentNotFound` for an unknown id.
    pub async fn delete_department(&self, id: &DepartmentId) -> Result<(), DirectoryServiceError> {
        match self.departments.delete_department(id).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => {
                Err(DirectoryServiceError::DepartmentNotFound(id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    //
    // ─── USERS ─────────────────────────────────────────────────────────────────
    //

    /// Create a user profile, taking a seat in `enterprise` when one is given.
    ///
    /// The seat is taken in one conditional step in the repository and handed
    /// back if the profile cannot be stored.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryServiceError::UserExists` when `uid` already has a
    /// profile, `DirectoryServiceError::Directory(UserLimitReached)` when the
    /// enterprise is full, `DirectoryServiceError::EnterpriseNotFound` for an
    /// unknown enterprise, and `DirectoryServiceError::Storage(Conflict)` when
    /// the email is already registered.
    pub async fn add_user(
        &self,
        uid: UserId,
        enterprise: Option<&EnterpriseId>,
        draft: UserDraft,
        created_by: Option<UserId>,
    ) -> Result<UserProfile, DirectoryServiceError> {
        if self.users.get_user(&uid).await?.is_some() {
            return Err(DirectoryServiceError::UserExists(uid));
        }
        let user = draft.validate(uid, enterprise.cloned(), created_by, self.clock.now())?;
        let Some(enterprise_id) = enterprise else {
            self.store_new_user(&user).await?;
            return Ok(user);
        };

        let seat_holder = match self.enterprises.reserve_seat(enterprise_id).await {
            Ok(SeatReservation::Reserved(enterprise)) => enterprise,
            Ok(SeatReservation::Full { limit }) => {
                return Err(DirectoryError::UserLimitReached { limit }.into());
            }
            Err(StorageError::NotFound) => {
                return Err(DirectoryServiceError::EnterpriseNotFound(
                    enterprise_id.clone(),
                ));
            }
            Err(err) => return Err(err.into()),
        };
        if let Err(err) = self.store_new_user(&user).await {
            if let Err(release) = self.enterprises.release_seat(enterprise_id).await {
                warn!(
                    enterprise_id = %enterprise_id,
                    error = %release,
                    "failed to hand back seat of rejected user"
                );
            }
            return Err(err);
        }
        info!(
            enterprise_id = %seat_holder.id,
            seats_used = seat_holder.current_user_count,
            user_limit = seat_holder.user_limit,
            "added enterprise user"
        );
        Ok(user)
    }

    async fn store_new_user(&self, user: &UserProfile) -> Result<(), DirectoryServiceError> {
        match self.users.insert_user(user).await {
            Ok(()) => Ok(()),
            Err(StorageError::Conflict) => {
                // a uid added concurrently wins over the email clash
                if self.users.get_user(&user.uid).await?.is_some() {
                    return Err(DirectoryServiceError::UserExists(user.uid.clone()));
                }
                Err(StorageError::Conflict.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::UserNotFound` for an unknown id.
    pub async fn get_user(&self, uid: &UserId) -> Result<UserProfile, DirectoryServiceError> {
        self.users
            .get_user(uid)
            .await?
            .ok_or_else(|| DirectoryServiceError::UserNotFound(uid.clone()))
    }

    /// # Errors
    ///
    /// Returns `DirectoryServiceError::Storage` on backend failure.
    pub async fn list_users(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<UserProfile>, DirectoryServiceError> {
        Ok(self.users.list_users(enterprise).await?)
    }

    /// Delete a user and give their seat back.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryServiceError::UserNotFound` for an unknown id.
    pub async fn remove_user(&self, uid: &UserId) -> Result<(), DirectoryServiceError> {
        let user = self.get_user(uid).await?;
        self.users.delete_user(uid).await?;

        let Some(enterprise_id) = user.enterprise_id else {
            return Ok(());
        };
        match self.enterprises.release_seat(&enterprise_id).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => {
                warn!(enterprise_id = %enterprise_id, "removed user of a missing enterprise");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replace a user's permission set.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryServiceError::UserNotFound` for an unknown id.
    pub async fn set_user_permissions(
        &self,
        uid: &UserId,
        permissions: InvitationPermissionSet,
    ) -> Result<UserProfile, DirectoryServiceError> {
        let mut user = self.get_user(uid).await?;
        user.permissions = Some(permissions);
        self.users.upsert_user(&user).await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use gxp_core::model::UserRole;
    use gxp_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    fn service() -> DirectoryService {
        let repo = Arc::new(InMemoryRepository::new());
        DirectoryService::new(
            fixed_clock(),
            repo.clone(),
            repo.clone(),
            repo.clone(),
            repo,
        )
    }

    async fn enterprise(service: &DirectoryService, limit: u32) -> Enterprise {
        service
            .create_enterprise(
                EnterpriseDraft {
                    company_name: "Acme Pharma".into(),
                    contact_email: "ops@acme.test".into(),
                    admin_email: "admin@acme.test".into(),
                    admin_name: "Pat".into(),
                    user_limit: Some(limit),
                    ..EnterpriseDraft::default()
                },
                UserId::new("root"),
            )
            .await
            .unwrap()
    }

    fn user(email: &str) -> UserDraft {
        UserDraft {
            email: email.into(),
            display_name: "Inspector".into(),
            role: UserRole::User,
            department: "QA".into(),
            job_title: String::new(),
            permissions: Some(InvitationPermissionSet::new()),
        }
    }

    #[tokio::test]
    async fn adding_users_consumes_seats_until_full() {
        let service = service();
        let acme = enterprise(&service, 1).await;

        service
            .add_user(UserId::new("u1"), Some(&acme.id), user("a@acme.test"), None)
            .await
            .unwrap();
        let stored = service.get_enterprise(&acme.id).await.unwrap();
        assert_eq!(stored.current_user_count, 1);
        assert_eq!(stored.capacity_percentage(), 100);

        let err = service
            .add_user(UserId::new("u2"), Some(&acme.id), user("b@acme.test"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DirectoryServiceError::Directory(DirectoryError::UserLimitReached { limit: 1 })
        ));
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[tokio::test]
    async fn duplicate_email_does_not_take_a_seat() {
        let service = service();
        let acme = enterprise(&service, 5).await;
        service
            .add_user(UserId::new("u1"), Some(&acme.id), user("a@acme.test"), None)
            .await
            .unwrap();

        let err = service
            .add_user(UserId::new("u2"), Some(&acme.id), user("A@acme.test"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryServiceError::Storage(StorageError::Conflict)));
        assert_eq!(service.get_enterprise(&acme.id).await.unwrap().current_user_count, 1);
    }

    #[tokio::test]
    async fn re_adding_a_user_keeps_one_seat() {
        let service = service();
        let acme = enterprise(&service, 5).await;
        service
            .add_user(UserId::new("u1"), Some(&acme.id), user("a@acme.test"), None)
            .await
            .unwrap();

        let err = service
            .add_user(UserId::new("u1"), Some(&acme.id), user("a@acme.test"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryServiceError::UserExists(ref uid) if uid.as_str() == "u1"));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(service.get_enterprise(&acme.id).await.unwrap().current_user_count, 1);
        assert_eq!(service.list_users(&acme.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_adds_cannot_overfill_an_enterprise() {
        let service = service();
        let acme = enterprise(&service, 1).await;

        let (first, second) = tokio::join!(
            service.add_user(UserId::new("u1"), Some(&acme.id), user("a@acme.test"), None),
            service.add_user(UserId::new("u2"), Some(&acme.id), user("b@acme.test"), None),
        );
        assert_eq!(u8::from(first.is_ok()) + u8::from(second.is_ok()), 1);
        assert_eq!(service.get_enterprise(&acme.id).await.unwrap().current_user_count, 1);
        assert_eq!(service.list_users(&acme.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn removing_a_user_releases_the_seat() {
        let service = service();
        let acme = enterprise(&service, 2).await;
        service
            .add_user(UserId::new("u1"), Some(&acme.id), user("a@acme.test"), None)
            .await
            .unwrap();

        service.remove_user(&UserId::new("u1")).await.unwrap();
        assert_eq!(service.get_enterprise(&acme.id).await.unwrap().current_user_count, 0);
        assert_eq!(
            service.remove_user(&UserId::new("u1")).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn facilities_require_an_existing_enterprise() {
        let service = service();
        let err = service
            .create_facility(
                &EnterpriseId::new("ghost"),
                FacilityDraft {
                    name: "Plant 1".into(),
                    description: String::new(),
                },
                UserId::new("root"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn facility_edits_are_stamped() {
        let service = service();
        let acme = enterprise(&service, 2).await;
        let facility = service
            .create_facility(
                &acme.id,
                FacilityDraft {
                    name: "Plant 1".into(),
                    description: String::new(),
                },
                UserId::new("root"),
            )
            .await
            .unwrap();

        let edited = service
            .edit_facility(&facility.id, "Plant One".into(), "Sterile".into(), UserId::new("u9"))
            .await
            .unwrap();
        assert_eq!(edited.name, "Plant One");
        assert_eq!(edited.updated_by, UserId::new("u9"));
        assert_eq!(service.list_facilities(&acme.id).await.unwrap().len(), 1);

        let err = service
            .edit_facility(&facility.id, "  ".into(), String::new(), UserId::new("u9"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn departments_round_trip() {
        let service = service();
        let acme = enterprise(&service, 2).await;
        let dept = service
            .create_department(
                &acme.id,
                DepartmentDraft {
                    name: "Quality".into(),
                    description: String::new(),
                    allowed_domains: vec!["qu".into(), " ".into()],
                },
            )
            .await
            .unwrap();
        assert_eq!(dept.allowed_domains, vec!["qu".to_string()]);

        service.delete_department(&dept.id).await.unwrap();
        assert!(service.list_departments(&acme.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn permissions_are_replaced() {
        let service = service();
        let acme = enterprise(&service, 2).await;
        service
            .add_user(UserId::new("u1"), Some(&acme.id), user("a@acme.test"), None)
            .await
            .unwrap();

        let mut permissions = InvitationPermissionSet::new();
        permissions.set_view_all(true);
        let updated = service
            .set_user_permissions(&UserId::new("u1"), permissions)
            .await
            .unwrap();
        let stored = updated.permissions.unwrap();
        assert!(stored.can_view_all_assessments());
        assert!(stored.can_view_department_assessments());
    }
}
