//! Identity assigner: every row gets a `Chamado`, and rows carrying an
//! inconsistency note get status `Erro`.

use crate::fields::{resolve_column, resolve_value, SemanticRole};
use crate::model::{CellValue, DataRow, CASE_ID_COLUMN};

/// Status written on rows whose description/inconsistency field is filled.
pub const ERROR_STATUS: &str = "Erro";

/// Where a row's case identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    IdentifierColumn,
    FirstColumn,
    Generated,
}

/// `CS-{year}-{position}` with the position zero-padded to three digits.
pub fn generated_case_id(year: i32, position: usize) -> String {
    format!("CS-{year}-{position:03}")
}

/// Set `Chamado` from a Caso/Chamado column, else the first column, else a
/// generated id. `position` is the 1-based row position within the sheet.
pub fn assign_identity(
    row: &mut DataRow,
    first_column: Option<&str>,
    position: usize,
    year: i32,
) -> IdentitySource {
    let from_identifier = resolve_value(row, SemanticRole::Identifier).cloned();
    let from_first = || {
        first_column
            .and_then(|column| row.get(column))
            .filter(|value| !value.is_blank())
            .cloned()
    };

    let (value, source) = match from_identifier {
        Some(value) => (value, IdentitySource::IdentifierColumn),
        None => match from_first() {
            Some(value) => (value, IdentitySource::FirstColumn),
            None => (
                CellValue::Text(generated_case_id(year, position)),
                IdentitySource::Generated,
            ),
        },
    };

    row.insert(CASE_ID_COLUMN.to_string(), value);
    source
}

/// A filled inconsistency/description field overrides the resolved status
/// with `Erro`. Rows without a status column are left alone.
pub fn apply_inconsistency_rule(row: &mut DataRow) -> bool {
    if resolve_value(row, SemanticRole::Description).is_none() {
        return false;
    }
    let Some(status_column) = resolve_column(row, SemanticRole::Status).map(str::to_string) else {
        return false;
    };
    row.insert(status_column, CellValue::from(ERROR_STATUS));
    true
}
