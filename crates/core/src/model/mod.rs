mod answer;
mod directory;
mod ids;
mod invitation;
mod permissions;
mod question;
mod report;
mod responses;
mod snapshot;

pub use ids::{
    AssessmentId, DepartmentId, EnterpriseId, FacilityId, InvitationId, ParseIdError, QuestionId,
    ReportId, SnapshotId, UserId,
};

pub use answer::{AnswerError, AnswerState};
pub use directory::{
    DEFAULT_USER_LIMIT, Department, DepartmentDraft, DirectoryError, Enterprise, EnterpriseDraft,
    Facility, FacilityDraft, UserDraft, UserProfile, UserRole,
};
pub use invitation::{DEFAULT_INVITATION_TTL_DAYS, Invitation, InvitationDraft, InvitationError};
pub use permissions::InvitationPermissionSet;
pub use question::{Question, QuestionError, QuestionSet};
pub use report::{ComplianceReport, ReportAuthor, ReportError};
pub use responses::{AnswerCounts, DecodedResponses, ResponseMap};
pub use snapshot::{AssessmentKind, AssessmentRef, ProgressSnapshot, SnapshotError};
