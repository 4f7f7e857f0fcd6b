use serde::Serialize;
use thiserror::Error;

/// Failures that abort an ingestion call. Anything below file level degrades
/// instead of failing.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not process the file '{file_name}': {reason}")]
    Parse { file_name: String, reason: String },

    #[error("failed to render template: {0}")]
    Template(String),
}

impl IngestError {
    pub(crate) fn parse(file_name: &str, reason: impl ToString) -> Self {
        IngestError::Parse {
            file_name: file_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Non-fatal conditions surfaced to the uploader alongside the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestWarning {
    /// The file decoded but no sheet produced a data row.
    EmptyFile,
    /// A worksheet could not be read or had no header set.
    SheetSkipped { sheet: String, reason: String },
}

impl std::fmt::Display for IngestWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestWarning::EmptyFile => write!(f, "file appears to be empty"),
            IngestWarning::SheetSkipped { sheet, reason } => {
                write!(f, "sheet '{sheet}' skipped: {reason}")
            }
        }
    }
}
