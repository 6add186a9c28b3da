use sea_orm::DbErr;
use thiserror::Error;

use crate::merge::MergeStep;

pub type CrmResult<T> = Result<T, CrmError>;

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error(
        "pipeline \"{client_name}\" / \"{}\" already exists",
        .campaign.as_deref().unwrap_or("")
    )]
    Duplicate {
        client_name: String,
        campaign: Option<String>,
    },
    #[error("merge stopped after {} completed step(s): {source}", .completed.len())]
    PartialMerge {
        completed: Vec<MergeStep>,
        source: Box<CrmError>,
    },
}

impl CrmError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// True when the store may hold a partially applied mutation and any
    /// cached snapshot must be thrown away.
    pub fn requires_reload(&self) -> bool {
        matches!(self, CrmError::PartialMerge { .. } | CrmError::Db(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_merge_reports_progress_and_requires_reload() {
        let err = CrmError::PartialMerge {
            completed: vec![MergeStep::ReassignActions {
                from: "P-2".into(),
                to: "P-1".into(),
                moved: 3,
            }],
            source: Box::new(CrmError::Db(DbErr::Custom("connection reset".into()))),
        };
        assert!(err.requires_reload());
        assert_eq!(
            err.to_string(),
            "merge stopped after 1 completed step(s): database error: Custom Error: connection reset"
        );
    }

    #[test]
    fn validation_errors_keep_cached_state() {
        assert!(!CrmError::validation("client name is required").requires_reload());
        let dup = CrmError::Duplicate {
            client_name: "ABC".into(),
            campaign: None,
        };
        assert_eq!(dup.to_string(), "pipeline \"ABC\" / \"\" already exists");
        assert!(!dup.requires_reload());
    }
}
