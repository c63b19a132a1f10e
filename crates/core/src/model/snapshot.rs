use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{AssessmentId, FacilityId, QuestionId, SnapshotId, UserId};
use crate::model::responses::{DecodedResponses, ResponseMap};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("assessment id cannot be empty")]
    EmptyAssessmentId,

    #[error("assessment name cannot be empty")]
    EmptyAssessmentName,

    #[error("unknown assessment kind: {0}")]
    UnknownKind(String),
}

//
// ─── ASSESSMENT IDENTITY ───────────────────────────────────────────────────────
//

/// Where the question set for an assessment comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    /// A user-authored question list.
    Custom,
    /// A built-in template (domain/sub-domain checklist).
    Template,
}

impl AssessmentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentKind::Custom => "custom",
            AssessmentKind::Template => "template",
        }
    }
}

impl FromStr for AssessmentKind {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "custom" => Ok(AssessmentKind::Custom),
            "template" => Ok(AssessmentKind::Template),
            other => Err(SnapshotError::UnknownKind(other.to_owned())),
        }
    }
}

impl fmt::Display for AssessmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the assessment a questionnaire session runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentRef {
    pub kind: AssessmentKind,
    pub assessment_id: AssessmentId,
    pub assessment_name: String,
    /// Absent for flows that are not scoped to an enterprise facility.
    pub facility_id: Option<FacilityId>,
    pub facility_name: String,
}

impl AssessmentRef {
    /// Creates a validated assessment reference without a facility.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the id or name is blank.
    pub fn new(
        kind: AssessmentKind,
        assessment_id: AssessmentId,
        assessment_name: impl Into<String>,
    ) -> Result<Self, SnapshotError> {
        let assessment_name = assessment_name.into();
        if assessment_id.as_str().trim().is_empty() {
            return Err(SnapshotError::EmptyAssessmentId);
        }
        if assessment_name.trim().is_empty() {
            return Err(SnapshotError::EmptyAssessmentName);
        }
        Ok(Self {
            kind,
            assessment_id,
            assessment_name,
            facility_id: None,
            facility_name: String::new(),
        })
    }

    #[must_use]
    pub fn with_facility(mut self, facility_id: FacilityId, facility_name: impl Into<String>) -> Self {
        self.facility_id = Some(facility_id);
        self.facility_name = facility_name.into();
        self
    }

    /// Whether two references point at the same resumable assessment.
    ///
    /// Custom assessments are matched regardless of facility; template
    /// assessments are scoped to the facility they were started in.
    #[must_use]
    pub fn same_assessment(&self, other: &AssessmentRef) -> bool {
        if self.kind != other.kind || self.assessment_id != other.assessment_id {
            return false;
        }
        match self.kind {
            AssessmentKind::Custom => true,
            AssessmentKind::Template => self.facility_id == other.facility_id,
        }
    }
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// Serializable capture of an in-progress questionnaire, used for save/resume.
///
/// `id` is `None` until the backend assigns one on first save; later saves
/// reuse it so the stored record is updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub id: Option<SnapshotId>,
    /// Set by the session or backend, never by the capture itself.
    pub owner_id: Option<UserId>,
    pub assessment: AssessmentRef,
    pub current_index: usize,
    pub total_questions: usize,
    /// Question id to string-encoded answer state.
    pub responses: BTreeMap<QuestionId, String>,
    /// Question id to display text, kept so a report can be shown even if
    /// the question definitions change later.
    pub question_texts: BTreeMap<QuestionId, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn new(
        assessment: AssessmentRef,
        current_index: usize,
        total_questions: usize,
        responses: &ResponseMap,
        question_texts: BTreeMap<QuestionId, String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            owner_id: None,
            assessment,
            current_index,
            total_questions,
            responses: responses.encode(),
            question_texts,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: SnapshotId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_owner(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Decodes the stored responses, skipping unknown state names.
    #[must_use]
    pub fn decoded_responses(&self) -> DecodedResponses {
        ResponseMap::decode(&self.responses)
    }

    /// Whether this snapshot belongs to `owner` and resumes `assessment`.
    #[must_use]
    pub fn resumes(&self, owner: &UserId, assessment: &AssessmentRef) -> bool {
        self.owner_id.as_ref() == Some(owner) && self.assessment.same_assessment(assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::answer::AnswerState;
    use crate::time::fixed_now;

    fn template(facility: &str) -> AssessmentRef {
        AssessmentRef::new(
            AssessmentKind::Template,
            AssessmentId::new("qu_sub_1"),
            "Quality Unit",
        )
        .unwrap()
        .with_facility(FacilityId::new(facility), format!("Plant {facility}"))
    }

    #[test]
    fn assessment_ref_rejects_blank_fields() {
        assert_eq!(
            AssessmentRef::new(AssessmentKind::Custom, AssessmentId::new(" "), "x").unwrap_err(),
            SnapshotError::EmptyAssessmentId
        );
        assert_eq!(
            AssessmentRef::new(AssessmentKind::Custom, AssessmentId::new("a"), "").unwrap_err(),
            SnapshotError::EmptyAssessmentName
        );
    }

    #[test]
    fn template_matching_is_facility_scoped() {
        assert!(template("f1").same_assessment(&template("f1")));
        assert!(!template("f1").same_assessment(&template("f2")));
    }

    #[test]
    fn custom_matching_ignores_facility() {
        let a = AssessmentRef::new(AssessmentKind::Custom, AssessmentId::new("c1"), "Mine")
            .unwrap()
            .with_facility(FacilityId::new("f1"), "Plant 1");
        let b = AssessmentRef::new(AssessmentKind::Custom, AssessmentId::new("c1"), "Mine").unwrap();
        assert!(a.same_assessment(&b));
    }

    #[test]
    fn snapshot_encodes_responses_as_names() {
        let mut responses = ResponseMap::new();
        responses.answer(QuestionId::new("q1"), AnswerState::Compliant);

        let snapshot =
            ProgressSnapshot::new(template("f1"), 1, 3, &responses, BTreeMap::new(), fixed_now());

        assert_eq!(snapshot.id, None);
        assert_eq!(snapshot.owner_id, None);
        assert_eq!(snapshot.responses[&QuestionId::new("q1")], "COMPLIANT");
        assert_eq!(snapshot.decoded_responses().responses, responses);
    }

    #[test]
    fn resumes_requires_owner_and_assessment() {
        let snapshot = ProgressSnapshot::new(
            template("f1"),
            0,
            3,
            &ResponseMap::new(),
            BTreeMap::new(),
            fixed_now(),
        )
        .with_owner(UserId::new("u1"));

        assert!(snapshot.resumes(&UserId::new("u1"), &template("f1")));
        assert!(!snapshot.resumes(&UserId::new("u2"), &template("f1")));
        assert!(!snapshot.resumes(&UserId::new("u1"), &template("f2")));
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [AssessmentKind::Custom, AssessmentKind::Template] {
            assert_eq!(kind.as_str().parse::<AssessmentKind>().unwrap(), kind);
        }
        assert!("other".parse::<AssessmentKind>().is_err());
    }
}
