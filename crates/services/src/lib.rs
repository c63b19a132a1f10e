#![forbid(unsafe_code)]

pub mod app_services;
pub mod auth;
pub mod config;
pub mod directory_service;
pub mod error;
pub mod invitation_service;
pub mod questions;
pub mod report_service;
pub mod sessions;

pub use gxp_core::Clock;

pub use app_services::AppServices;
pub use auth::{AccountService, AuthGateway, InMemoryAuthGateway};
pub use config::{AppConfig, InvitationConfig, SessionConfig};
pub use directory_service::DirectoryService;
pub use error::{
    AccountError, AppServicesError, AuthError, DirectoryServiceError, ErrorKind,
    InvitationServiceError, QuestionSetError, ReportServiceError, SessionError,
};
pub use invitation_service::InvitationService;
pub use questions::QuestionSetProvider;
pub use report_service::{ReportService, ReportSummary};
pub use sessions::{
    CompletedAssessment, Completion, Navigation, QuestionnaireLoopService, QuestionnaireSession,
    RestoreOutcome, RestoreReport, SaveOutcome, SessionProgress, Step,
};
