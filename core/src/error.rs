/// Error taxonomy shared by the import and export pipelines
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::backup::BackupError;
use crate::build_service::BuildServiceError;
use crate::validator::ValidationIssue;
use crate::workbook::WorkbookError;

#[derive(Debug, Error)]
pub enum InterchangeError {
    /// Unrecognized or corrupt container. The user can pick another file.
    #[error("Unsupported or corrupt file: {0}")]
    Format(String),

    /// Unsafe archive entry. Never recoverable.
    #[error("Unsafe archive entry rejected: {0}")]
    Security(String),

    /// Structural or semantic rule violations, always reported as a batch.
    #[error("Configuration is invalid ({} error(s))", .0.len())]
    Validation(Vec<ValidationIssue>),

    /// Unresolved field or icon references, collected before any build call.
    #[error("Unresolved references: {}", .0.join("; "))]
    Reference(Vec<String>),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("Build service error: {0}")]
    BuildService(#[from] BuildServiceError),

    #[error("Workbook storage error: {0}")]
    Storage(#[from] WorkbookError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("File is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("File is {size} bytes, below the {floor} byte minimum")]
    TooSmall { size: u64, floor: u64 },

    #[error("Ran out of time during {stage} (budget {}s)", .budget.as_secs())]
    Timeout { stage: String, budget: Duration },

    #[error("Temporary storage failure: {0}")]
    TempStorage(String),

    #[error("Configuration has {count} entities, above the {limit} limit")]
    EntityBudget { count: usize, limit: usize },
}

impl InterchangeError {
    /// Stable machine-readable category, used in logs and outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            InterchangeError::Format(_) => "format",
            InterchangeError::Security(_) => "security",
            InterchangeError::Validation(_) => "validation",
            InterchangeError::Reference(_) => "reference",
            InterchangeError::Resource(ResourceError::Timeout { .. }) => "timeout",
            InterchangeError::Resource(_) => "resource",
            InterchangeError::BuildService(_) => "build_service",
            InterchangeError::Storage(_) => "storage",
            InterchangeError::Io(_) => "io",
            InterchangeError::Json(_) => "json",
        }
    }

    /// Whether the failure is an expected consequence of bad user input
    /// (as opposed to an internal fault).
    pub fn is_expected(&self) -> bool {
        !matches!(self, InterchangeError::Io(_) | InterchangeError::Storage(_))
    }

    /// Per-item detail lines for batch errors.
    pub fn details(&self) -> Option<Vec<String>> {
        match self {
            InterchangeError::Validation(issues) => {
                Some(issues.iter().map(|issue| issue.to_string()).collect())
            }
            InterchangeError::Reference(items) => Some(items.clone()),
            _ => None,
        }
    }
}

impl From<ArchiveError> for InterchangeError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::UnsafePath(path) => InterchangeError::Security(path),
            ArchiveError::Io(io) => InterchangeError::Io(io),
            other => InterchangeError::Format(other.to_string()),
        }
    }
}

impl From<BackupError> for InterchangeError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::Io(io) => InterchangeError::Io(io),
            other => InterchangeError::Resource(ResourceError::TempStorage(other.to_string())),
        }
    }
}

/// Structured result for expected failures, handed to the caller instead of
/// an error value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ImportOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        if !details.is_empty() {
            self.details = Some(details);
        }
        self
    }
}

impl From<&InterchangeError> for ImportOutcome {
    fn from(err: &InterchangeError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            details: err.details(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{IssueCode, ValidationIssue};

    #[test]
    fn validation_error_lists_every_issue() {
        let err = InterchangeError::Validation(vec![
            ValidationIssue::new(IssueCode::MissingFieldId, "fields[0]", "Field has no id"),
            ValidationIssue::new(
                IssueCode::EmptyOptions,
                "fields[1]",
                "Select field has no options",
            ),
        ]);
        let outcome = ImportOutcome::from(&err);
        assert!(!outcome.success);
        assert_eq!(outcome.details.as_ref().map(Vec::len), Some(2));
        assert!(outcome.message.contains("2 error(s)"));
    }

    #[test]
    fn unsafe_archive_paths_become_security_errors() {
        let err: InterchangeError = ArchiveError::UnsafePath("../etc/passwd".into()).into();
        assert_eq!(err.kind(), "security");
    }

    #[test]
    fn timeouts_have_their_own_kind() {
        let err = InterchangeError::Resource(ResourceError::Timeout {
            stage: "normalize".into(),
            budget: Duration::from_secs(30),
        });
        assert_eq!(err.kind(), "timeout");
        assert!(err.to_string().contains("normalize"));
    }
}
