use std::sync::Arc;

use chrono::Duration;
use gxp_core::model::{
    DirectoryError, EnterpriseId, Invitation, InvitationDraft, InvitationError, InvitationId,
    UserDraft, UserId, UserProfile, UserRole,
};
use storage::repository::{InvitationRepository, StorageError, UserRepository};
use tracing::info;

use crate::Clock;
use crate::config::InvitationConfig;
use crate::directory_service::DirectoryService;
use crate::error::{DirectoryServiceError, InvitationServiceError};

/// Issues invitation links and turns accepted invitations into enterprise users.
#[derive(Clone)]
pub struct InvitationService {
    clock: Clock,
    config: InvitationConfig,
    invitations: Arc<dyn InvitationRepository>,
    users: Arc<dyn UserRepository>,
    directory: Arc<DirectoryService>,
}

impl InvitationService {
    #[must_use]
    pub fn new(
        clock: Clock,
        invitations: Arc<dyn InvitationRepository>,
        users: Arc<dyn UserRepository>,
        directory: Arc<DirectoryService>,
    ) -> Self {
        Self {
            clock,
            config: InvitationConfig::default(),
            invitations,
            users,
            directory,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: InvitationConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and store a new invitation for `enterprise`.
    ///
    /// The draft is validated before any lookup. The enterprise must exist
    /// and have a free seat, and the email must not belong to an existing user.
    ///
    /// # Errors
    ///
    /// Returns `InvitationServiceError::Invitation` for an invalid draft,
    /// `InvitationServiceError::AlreadyRegistered` for a known email, and
    /// `InvitationServiceError::Directory` when the enterprise is missing or full.
    pub async fn create(
        &self,
        enterprise: &EnterpriseId,
        draft: InvitationDraft,
        invited_by: UserId,
    ) -> Result<Invitation, InvitationServiceError> {
        let ttl = Duration::from_std(self.config.ttl).map_err(|_| InvitationError::InvalidTtl)?;
        let invitation = draft.issue(enterprise.clone(), invited_by, self.clock.now(), ttl)?;

        let target = self.directory.get_enterprise(enterprise).await?;
        if !target.can_add_user() {
            return Err(DirectoryServiceError::from(DirectoryError::UserLimitReached {
                limit: target.user_limit,
            })
            .into());
        }
        if self.users.find_user_by_email(&invitation.email).await?.is_some() {
            return Err(InvitationServiceError::AlreadyRegistered(invitation.email));
        }

        self.invitations.insert_invitation(&invitation).await?;
        info!(
            invitation_id = %invitation.id,
            enterprise_id = %enterprise,
            expires_at = %invitation.expires_at,
            "created invitation"
        );
        Ok(invitation)
    }

    /// Deep link to send to the invitee.
    #[must_use]
    pub fn link(&self, invitation: &Invitation) -> String {
        invitation.link(&self.config.link_scheme)
    }

    /// Find the pending invitation behind a link token.
    ///
    /// # Errors
    ///
    /// Returns `InvitationServiceError::NotFound` for unknown or used tokens
    /// and `InvitationServiceError::Invitation(Expired)` past the expiry.
    pub async fn lookup(&self, token: &str) -> Result<Invitation, InvitationServiceError> {
        let invitation = self
            .invitations
            .get_invitation_by_token(token.trim())
            .await?
            .ok_or(InvitationServiceError::NotFound)?;
        if invitation.is_expired(self.clock.now()) {
            return Err(InvitationError::Expired(invitation.expires_at).into());
        }
        Ok(invitation)
    }

    /// Accept an invitation for the account `uid`, creating its user profile.
    ///
    /// # Errors
    ///
    /// Returns the `lookup` errors, `InvitationServiceError::Directory` if the
    /// user cannot be added (e.g. the enterprise filled up meanwhile), or
    /// `InvitationServiceError::Storage` on backend failure.
    pub async fn accept(
        &self,
        token: &str,
        uid: UserId,
    ) -> Result<UserProfile, InvitationServiceError> {
        let mut invitation = self.lookup(token).await?;
        let now = self.clock.now();
        invitation.accept(now)?;

        let draft = UserDraft {
            email: invitation.email.clone(),
            display_name: invitation.display_name.clone(),
            role: UserRole::User,
            department: invitation.department.clone(),
            job_title: invitation.job_title.clone(),
            permissions: Some(invitation.permissions),
        };
        let user = self
            .directory
            .add_user(
                uid,
                Some(&invitation.enterprise_id),
                draft,
                Some(invitation.invited_by.clone()),
            )
            .await?;
        self.invitations.mark_invitation_used(&invitation.id, now).await?;
        info!(invitation_id = %invitation.id, uid = %user.uid, "invitation accepted");
        Ok(user)
    }

    /// Invitations of an enterprise, newest first.
    ///
    /// # Errors
    ///
    /// Returns `InvitationServiceError::Storage` on backend failure.
    pub async fn list(
        &self,
        enterprise: &EnterpriseId,
    ) -> Result<Vec<Invitation>, InvitationServiceError> {
        Ok(self.invitations.list_invitations(enterprise).await?)
    }

    /// # Errors
    ///
    /// Returns `InvitationServiceError::NotFound` for an unknown id.
    pub async fn revoke(&self, id: &InvitationId) -> Result<(), InvitationServiceError> {
        match self.invitations.delete_invitation(id).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => Err(InvitationServiceError::NotFound),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use gxp_core::model::{EnterpriseDraft, InvitationPermissionSet};
    use gxp_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    struct Fixture {
        service: InvitationService,
        directory: Arc<DirectoryService>,
        enterprise: EnterpriseId,
    }

    async fn fixture(clock: Clock, limit: u32) -> Fixture {
        let repo = Arc::new(InMemoryRepository::new());
        let directory = Arc::new(DirectoryService::new(
            clock,
            repo.clone(),
            repo.clone(),
            repo.clone(),
            repo.clone(),
        ));
        let enterprise = directory
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
            .id;
        let service =
            InvitationService::new(clock, repo.clone(), repo, Arc::clone(&directory));
        Fixture {
            service,
            directory,
            enterprise,
        }
    }

    fn draft(email: &str) -> InvitationDraft {
        let mut permissions = InvitationPermissionSet::new();
        permissions.set_view_all(true);
        permissions.set_view_department(false);
        InvitationDraft {
            email: email.into(),
            display_name: "New Hire".into(),
            department: "QA".into(),
            job_title: "Inspector".into(),
            permissions,
        }
    }

    #[tokio::test]
    async fn accepted_invitation_creates_a_user_and_cannot_be_reused() {
        let f = fixture(fixed_clock(), 5).await;
        let invitation = f
            .service
            .create(&f.enterprise, draft("hire@acme.test"), UserId::new("admin"))
            .await
            .unwrap();
        assert!(f.service.link(&invitation).starts_with("validator://invite?token="));
        assert!(!invitation.permissions.can_view_all_assessments());

        let user = f
            .service
            .accept(&invitation.token, UserId::new("u-new"))
            .await
            .unwrap();
        assert_eq!(user.enterprise_id.as_ref(), Some(&f.enterprise));
        assert_eq!(user.created_by, Some(UserId::new("admin")));
        assert_eq!(
            f.directory.get_enterprise(&f.enterprise).await.unwrap().current_user_count,
            1
        );

        let err = f.service.lookup(&invitation.token).await.unwrap_err();
        assert!(matches!(err, InvitationServiceError::NotFound));
    }

    #[tokio::test]
    async fn expired_invitation_is_rejected() {
        let clock = fixed_clock();
        let f = fixture(clock, 5).await;
        let invitation = f
            .service
            .create(&f.enterprise, draft("hire@acme.test"), UserId::new("admin"))
            .await
            .unwrap();

        let later = InvitationService {
            clock: clock.advanced(Duration::days(8)),
            ..f.service.clone()
        };
        let err = later.lookup(&invitation.token).await.unwrap_err();
        assert!(matches!(
            err,
            InvitationServiceError::Invitation(InvitationError::Expired(_))
        ));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn existing_users_cannot_be_invited() {
        let f = fixture(fixed_clock(), 5).await;
        let invitation = f
            .service
            .create(&f.enterprise, draft("hire@acme.test"), UserId::new("admin"))
            .await
            .unwrap();
        f.service.accept(&invitation.token, UserId::new("u1")).await.unwrap();

        let err = f
            .service
            .create(&f.enterprise, draft("HIRE@acme.test"), UserId::new("admin"))
            .await
            .unwrap_err();
        assert!(matches!(err, InvitationServiceError::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn full_enterprise_cannot_invite() {
        let f = fixture(fixed_clock(), 1).await;
        let first = f
            .service
            .create(&f.enterprise, draft("one@acme.test"), UserId::new("admin"))
            .await
            .unwrap();
        f.service.accept(&first.token, UserId::new("u1")).await.unwrap();

        let err = f
            .service
            .create(&f.enterprise, draft("two@acme.test"), UserId::new("admin"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[tokio::test]
    async fn invalid_draft_fails_before_any_lookup() {
        let f = fixture(fixed_clock(), 5).await;
        let err = f
            .service
            .create(&EnterpriseId::new("ghost"), draft("not-an-email"), UserId::new("admin"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InvitationServiceError::Invitation(InvitationError::InvalidEmail(_))
        ));
    }

    #[tokio::test]
    async fn revoke_removes_from_listing() {
        let f = fixture(fixed_clock(), 5).await;
        let invitation = f
            .service
            .create(&f.enterprise, draft("hire@acme.test"), UserId::new("admin"))
            .await
            .unwrap();
        assert_eq!(f.service.list(&f.enterprise).await.unwrap().len(), 1);

        f.service.revoke(&invitation.id).await.unwrap();
        assert!(f.service.list(&f.enterprise).await.unwrap().is_empty());
        assert!(matches!(
            f.service.revoke(&invitation.id).await,
            Err(InvitationServiceError::NotFound)
        ));
    }
}
