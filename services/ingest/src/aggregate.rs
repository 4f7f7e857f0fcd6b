//! Sheet aggregator and the pipeline entry point.
//!
//! bytes -> tokenizer -> per sheet {header, rows, normalize, identity} -> IngestResult

use chrono::{Datelike, Local};
use std::collections::HashSet;

use crate::error::{IngestError, IngestWarning};
use crate::header::resolve_header;
use crate::identity::{apply_inconsistency_rule, assign_identity, IdentitySource};
use crate::model::{IngestResult, Ingestion, SheetResult, CASE_ID_COLUMN};
use crate::normalize::normalize_row;
use crate::rows::materialize;
use crate::tokenizer::{tokenize, RawGrid, Tokenized};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Year used in generated case ids.
    pub year: i32,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            year: Local::now().year(),
        }
    }
}

/// Source headers in order, unique, without the synthetic `Chamado` unless the
/// file had its own "chamado" column.
pub fn visible_headers(source: &[String]) -> Vec<String> {
    let has_own_case_column = source
        .iter()
        .any(|header| header.trim().to_lowercase() == CASE_ID_COLUMN.to_lowercase());

    let mut seen = HashSet::new();
    source
        .iter()
        .filter(|header| has_own_case_column || header.as_str() != CASE_ID_COLUMN)
        .filter(|header| seen.insert(header.as_str()))
        .cloned()
        .collect()
}

/// Run one grid through header resolution, materialization, normalization
/// and identity assignment. `None` when the sheet has no header at all.
pub fn process_sheet(grid: &RawGrid, options: &IngestOptions) -> Option<SheetResult> {
    let header = resolve_header(grid);
    if header.names.is_empty() {
        return None;
    }

    let mut rows = materialize(grid, &header);
    let first_column = header.names.first().map(String::as_str);

    let mut normalized_cells = 0;
    let mut generated_ids = 0;
    let mut flagged = 0;
    for (i, row) in rows.iter_mut().enumerate() {
        normalized_cells += normalize_row(row);
        if assign_identity(row, first_column, i + 1, options.year) == IdentitySource::Generated {
            generated_ids += 1;
        }
        if apply_inconsistency_rule(row) {
            flagged += 1;
        }
    }

    tracing::info!(
        sheet = %grid.name,
        header_row = header.index,
        columns = header.names.len(),
        rows = rows.len(),
        normalized_cells,
        generated_ids,
        flagged,
        "sheet ingested"
    );

    Some(SheetResult {
        name: grid.name.clone(),
        headers: visible_headers(&header.names),
        rows,
    })
}

/// Ingest an uploaded file with default options.
pub fn ingest(bytes: &[u8], file_name: &str, mime: Option<&str>) -> Result<Ingestion, IngestError> {
    ingest_with(bytes, file_name, mime, IngestOptions::default())
}

/// Ingest an uploaded file. Only an unreadable file is an error; empty sheets
/// and empty files come back as warnings.
pub fn ingest_with(
    bytes: &[u8],
    file_name: &str,
    mime: Option<&str>,
    options: IngestOptions,
) -> Result<Ingestion, IngestError> {
    let Tokenized { grids, mut warnings } = tokenize(bytes, file_name, mime)?;

    let mut sheets = IngestResult::new();
    for grid in &grids {
        match process_sheet(grid, &options) {
            Some(sheet) => {
                sheets.insert(sheet.name.clone(), sheet);
            }
            None => {
                tracing::debug!(sheet = %grid.name, "sheet has no header row, skipping");
                warnings.push(IngestWarning::SheetSkipped {
                    sheet: grid.name.clone(),
                    reason: "no header row found".to_string(),
                });
            }
        }
    }

    let mut ingestion = Ingestion {
        file_name: file_name.to_string(),
        size: bytes.len() as u64,
        sheets,
        warnings,
    };

    if ingestion.is_empty() {
        tracing::warn!(file = %file_name, "file appears to be empty");
        ingestion.warnings.push(IngestWarning::EmptyFile);
    }

    Ok(ingestion)
}
