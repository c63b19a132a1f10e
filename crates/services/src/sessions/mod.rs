mod progress;
mod restore;
mod service;
mod workflow;

// Public API of the questionnaire subsystem.
pub use crate::error::SessionError;
pub use progress::SessionProgress;
pub use restore::{RestoreOutcome, RestoreReport};
pub use service::{Navigation, QuestionnaireSession};
pub use workflow::{
    CompletedAssessment, Completion, QuestionnaireLoopService, SaveOutcome, Step,
};
