use gxp_core::model::{AssessmentId, AssessmentKind, AssessmentRef, FacilityId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps a failed query, surfacing unique-constraint violations as conflicts.
pub(crate) fn db(e: sqlx::Error) -> StorageError {
    if e.as_database_error()
        .is_some_and(|d| d.is_unique_violation())
    {
        return StorageError::Conflict;
    }
    StorageError::Connection(e.to_string())
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

pub(crate) fn from_json<T: DeserializeOwned>(field: &'static str, raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("invalid {field}: {e}")))
}

pub(crate) fn count_i64(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn usize_from_i64(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// Reads the `kind`, `assessment_*` and `facility_*` columns shared by
/// snapshots and reports.
pub(crate) fn assessment_from_row(row: &SqliteRow) -> Result<AssessmentRef, StorageError> {
    let kind: AssessmentKind = row
        .try_get::<String, _>("kind")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let mut assessment = AssessmentRef::new(
        kind,
        AssessmentId::new(row.try_get::<String, _>("assessment_id").map_err(ser)?),
        row.try_get::<String, _>("assessment_name").map_err(ser)?,
    )
    .map_err(ser)?;
    assessment.facility_id = row
        .try_get::<Option<String>, _>("facility_id")
        .map_err(ser)?
        .map(FacilityId::new);
    assessment.facility_name = row.try_get("facility_name").map_err(ser)?;
    Ok(assessment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_counts_are_rejected() {
        assert!(matches!(
            usize_from_i64("current_index", -1),
            Err(StorageError::Serialization(_))
        ));
        assert_eq!(u32_from_i64("user_limit", 50).unwrap(), 50);
    }

    #[test]
    fn malformed_json_names_the_field() {
        let err = from_json::<Vec<String>>("allowed_domains", "{not json").unwrap_err();
        assert!(err.to_string().contains("allowed_domains"));
    }
}
