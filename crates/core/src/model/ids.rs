use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an ID from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from blank string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

// Backend document ids are opaque strings. Each entity gets its own newtype so
// a facility id can never be passed where an assessment id is expected.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a new `", stringify!($name), "`")]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the underlying string value
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the id and returns the owned string
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError {
                        kind: stringify!($name),
                    });
                }
                Ok(Self(trimmed.to_owned()))
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a single question within a question set
    QuestionId
);
string_id!(
    /// Identifier of an assessment (custom assessment or template sub-domain)
    AssessmentId
);
string_id!(
    /// Identifier assigned by the backend to a saved progress snapshot
    SnapshotId
);
string_id!(
    /// Identifier of a facility
    FacilityId
);
string_id!(
    /// Identifier of an enterprise tenant
    EnterpriseId
);
string_id!(
    /// Identifier of a department within an enterprise
    DepartmentId
);
string_id!(
    /// Identifier of an authenticated user
    UserId
);
string_id!(
    /// Identifier of an invitation record
    InvitationId
);
string_id!(
    /// Identifier of a persisted compliance report
    ReportId
);

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_id_display() {
        let id = QuestionId::new("qu_1");
        assert_eq!(id.to_string(), "qu_1");
    }

    #[test]
    fn question_id_debug_names_the_kind() {
        let id = QuestionId::new("qu_1");
        assert_eq!(format!("{id:?}"), "QuestionId(qu_1)");
    }

    #[test]
    fn snapshot_id_from_str_trims() {
        let id: SnapshotId = "  abc  ".parse().unwrap();
        assert_eq!(id, SnapshotId::new("abc"));
    }

    #[test]
    fn blank_id_is_rejected() {
        let result = "   ".parse::<FacilityId>();
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "failed to parse FacilityId from blank string"
        );
    }

    #[test]
    fn into_inner_returns_owned_string() {
        let id = UserId::from("user-7");
        assert_eq!(id.as_str(), "user-7");
        assert_eq!(id.into_inner(), "user-7".to_string());
    }
}
