//! Row and sheet model handed from the pipeline to persistence and to the
//! application's live view-model.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::error::IngestWarning;

/// Key holding the canonical case identifier on every materialized row.
pub const CASE_ID_COLUMN: &str = "Chamado";

/// A scalar cell value as stored and displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Null,
}

impl CellValue {
    /// True for null, empty and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Display text of the value; numbers print without a trailing `.0`.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Text(s) => Cow::Borrowed(s.as_str()),
            CellValue::Number(n) => Cow::Owned(format_number(*n)),
            CellValue::Null => Cow::Borrowed(""),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// Render a float the way a spreadsheet shows it: whole numbers without decimals.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// One case: column name -> value, in source column order.
pub type DataRow = IndexMap<String, CellValue>;

/// One worksheet after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetResult {
    pub name: String,
    /// Columns to render, unique and in display order.
    pub headers: Vec<String>,
    pub rows: Vec<DataRow>,
}

/// Sheet name -> sheet, in workbook order.
pub type IngestResult = IndexMap<String, SheetResult>;

/// Everything produced for one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ingestion {
    pub file_name: String,
    pub size: u64,
    pub sheets: IngestResult,
    pub warnings: Vec<IngestWarning>,
}

impl Ingestion {
    pub fn total_rows(&self) -> usize {
        self.sheets.values().map(|sheet| sheet.rows.len()).sum()
    }

    /// True when no sheet produced a data row; such files are not stored.
    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }
}

// =============================================================================
// Persistence payload
// =============================================================================

/// A row flattened out of its sheet, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedRow {
    pub sheet: String,
    pub data: DataRow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetHeaders {
    pub name: String,
    pub headers: Vec<String>,
}

/// Request to create (or overwrite) a stored file record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFileRecord {
    pub name: String,
    pub size: u64,
    pub sheets: Vec<SheetHeaders>,
    pub rows: Vec<TaggedRow>,
}

impl NewFileRecord {
    pub fn from_ingestion(ingestion: &Ingestion) -> Self {
        Self::from_sheets(&ingestion.file_name, ingestion.size, &ingestion.sheets)
    }

    /// Flatten all rows across sheets, preserving sheet then row order.
    pub fn from_sheets(name: &str, size: u64, sheets: &IngestResult) -> Self {
        let sheet_headers = sheets
            .values()
            .map(|sheet| SheetHeaders {
                name: sheet.name.clone(),
                headers: sheet.headers.clone(),
            })
            .collect();

        let rows = sheets
            .values()
            .flat_map(|sheet| {
                sheet.rows.iter().map(|row| TaggedRow {
                    sheet: sheet.name.clone(),
                    data: row.clone(),
                })
            })
            .collect();

        Self {
            name: name.to_string(),
            size,
            sheets: sheet_headers,
            rows,
        }
    }

    /// Rebuild the per-sheet structure from a stored record.
    ///
    /// Rows tagged with a sheet that has no stored header list get one derived
    /// from their own keys, minus the synthetic identifier.
    pub fn regroup(&self) -> IngestResult {
        let mut sheets: IngestResult = self
            .sheets
            .iter()
            .map(|sheet| {
                (
                    sheet.name.clone(),
                    SheetResult {
                        name: sheet.name.clone(),
                        headers: sheet.headers.clone(),
                        rows: Vec::new(),
                    },
                )
            })
            .collect();

        for tagged in &self.rows {
            let sheet = sheets
                .entry(tagged.sheet.clone())
                .or_insert_with(|| SheetResult {
                    name: tagged.sheet.clone(),
                    headers: tagged
                        .data
                        .keys()
                        .filter(|key| key.as_str() != CASE_ID_COLUMN)
                        .cloned()
                        .collect(),
                    rows: Vec::new(),
                });
            sheet.rows.push(tagged.data.clone());
        }

        sheets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, CellValue)]) -> DataRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_cell_value_blankness() {
        assert!(CellValue::Null.is_blank());
        assert!(CellValue::from("   ").is_blank());
        assert!(!CellValue::from("x").is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
    }

    #[test]
    fn test_number_text_drops_trailing_zero() {
        assert_eq!(CellValue::Number(42.0).as_text(), "42");
        assert_eq!(CellValue::Number(1.5).as_text(), "1.5");
    }

    #[test]
    fn test_cell_value_json_shape() {
        let r = row(&[
            ("a", CellValue::from("x")),
            ("b", CellValue::Number(2.5)),
            ("c", CellValue::Null),
        ]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json, serde_json::json!({"a": "x", "b": 2.5, "c": null}));

        let back: DataRow = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_record_flattens_and_regroups() {
        let mut sheets = IngestResult::new();
        for (name, ids) in [("Jan", vec!["1", "2"]), ("Fev", vec!["3"])] {
            sheets.insert(
                name.to_string(),
                SheetResult {
                    name: name.to_string(),
                    headers: vec!["Id".to_string()],
                    rows: ids
                        .iter()
                        .map(|id| {
                            row(&[
                                ("Id", CellValue::from(*id)),
                                ("Chamado", CellValue::from(*id)),
                            ])
                        })
                        .collect(),
                },
            );
        }

        let record = NewFileRecord::from_sheets("contas.xlsx", 100, &sheets);
        assert_eq!(record.rows.len(), 3);
        assert_eq!(record.rows[2].sheet, "Fev");

        let regrouped = record.regroup();
        assert_eq!(regrouped, sheets);
    }

    #[test]
    fn test_regroup_derives_headers_for_unknown_sheet() {
        let record = NewFileRecord {
            name: "x.csv".to_string(),
            size: 1,
            sheets: vec![],
            rows: vec![TaggedRow {
                sheet: "Sheet 1".to_string(),
                data: row(&[
                    ("Valor", CellValue::from("1,00")),
                    ("Chamado", CellValue::from("CS-2024-001")),
                ]),
            }],
        };

        let sheets = record.regroup();
        assert_eq!(sheets["Sheet 1"].headers, vec!["Valor".to_string()]);
    }
}
