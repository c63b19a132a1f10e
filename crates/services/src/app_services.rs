use std::sync::Arc;

use storage::repository::Storage;
use tracing::info;

use crate::Clock;
use crate::auth::{AccountService, AuthGateway, InMemoryAuthGateway};
use crate::config::AppConfig;
use crate::directory_service::DirectoryService;
use crate::error::AppServicesError;
use crate::invitation_service::InvitationService;
use crate::questions::QuestionSetProvider;
use crate::report_service::ReportService;
use crate::sessions::QuestionnaireLoopService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    questions: Arc<QuestionSetProvider>,
    questionnaires: Arc<QuestionnaireLoopService>,
    reports: Arc<ReportService>,
    directory: Arc<DirectoryService>,
    invitations: Arc<InvitationService>,
    accounts: Arc<AccountService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage at `config.db_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Sqlite` if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        config: &AppConfig,
        clock: Clock,
        auth: Arc<dyn AuthGateway>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(&config.db_url).await?;
        info!(db_url = %config.db_url, "opened sqlite storage");
        Ok(Self::from_storage(&storage, config, clock, auth))
    }

    /// Services over in-memory storage and a local auth gateway.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(
            &Storage::in_memory(),
            &AppConfig::default(),
            clock,
            Arc::new(InMemoryAuthGateway::new()),
        )
    }

    #[must_use]
    pub fn from_storage(
        storage: &Storage,
        config: &AppConfig,
        clock: Clock,
        auth: Arc<dyn AuthGateway>,
    ) -> Self {
        let questions = QuestionSetProvider::new(Arc::clone(&storage.questions));
        let questionnaires = Arc::new(
            QuestionnaireLoopService::new(
                clock,
                questions.clone(),
                Arc::clone(&storage.progress),
                Arc::clone(&storage.reports),
            )
            .with_config(config.session.clone()),
        );
        let reports = Arc::new(ReportService::new(clock, Arc::clone(&storage.reports)));
        let directory = Arc::new(DirectoryService::new(
            clock,
            Arc::clone(&storage.enterprises),
            Arc::clone(&storage.facilities),
            Arc::clone(&storage.departments),
            Arc::clone(&storage.users),
        ));
        let invitations = Arc::new(
            InvitationService::new(
                clock,
                Arc::clone(&storage.invitations),
                Arc::clone(&storage.users),
                Arc::clone(&directory),
            )
            .with_config(config.invitations.clone()),
        );
        let accounts = Arc::new(AccountService::new(auth));

        Self {
            questions: Arc::new(questions),
            questionnaires,
            reports,
            directory,
            invitations,
            accounts,
        }
    }

    #[must_use]
    pub fn questions(&self) -> Arc<QuestionSetProvider> {
        Arc::clone(&self.questions)
    }

    #[must_use]
    pub fn questionnaires(&self) -> Arc<QuestionnaireLoopService> {
        Arc::clone(&self.questionnaires)
    }

    #[must_use]
    pub fn reports(&self) -> Arc<ReportService> {
        Arc::clone(&self.reports)
    }

    #[must_use]
    pub fn directory(&self) -> Arc<DirectoryService> {
        Arc::clone(&self.directory)
    }

    #[must_use]
    pub fn invitations(&self) -> Arc<InvitationService> {
        Arc::clone(&self.invitations)
    }

    #[must_use]
    pub fn accounts(&self) -> Arc<AccountService> {
        Arc::clone(&self.accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gxp_core::model::{AssessmentId, Question, QuestionId};
    use gxp_core::time::fixed_clock;

    #[tokio::test]
    async fn services_share_one_backend() {
        let services = AppServices::in_memory(fixed_clock());
        let id = AssessmentId::new("custom_1");
        services
            .questions()
            .publish(&id, vec![Question::new(QuestionId::new("q1"), "Clean?", 1).unwrap()])
            .await
            .unwrap();

        let loaded = services.questions().load(&id).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(services.questionnaires().config().save_poll_attempts, 50);
    }

    #[tokio::test]
    async fn sqlite_backend_boots_from_config() {
        let config = AppConfig {
            db_url: "sqlite:file:app_services_boot?mode=memory&cache=shared".into(),
            ..AppConfig::default()
        };
        let services =
            AppServices::new_sqlite(&config, fixed_clock(), Arc::new(InMemoryAuthGateway::new()))
                .await
                .unwrap();
        assert!(services.directory().list_enterprises().await.unwrap().is_empty());
    }
}
