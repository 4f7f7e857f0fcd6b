//! Row materializer: grid rows below the header -> `DataRow`s.

use crate::header::HeaderRow;
use crate::model::{CellValue, DataRow};
use crate::tokenizer::{RawGrid, RawValue};

fn to_cell_value(raw: &RawValue) -> CellValue {
    match raw {
        RawValue::Empty => CellValue::Null,
        RawValue::Text(s) if s.trim().is_empty() => CellValue::Null,
        RawValue::Text(s) => CellValue::Text(s.trim().to_string()),
        RawValue::Number(n) => CellValue::Number(*n),
    }
}

/// Zip each row strictly below the header with the header names.
///
/// Fully blank rows are dropped; every header key is present on every kept
/// row, and a repeated header name keeps the value of its last column.
pub fn materialize(grid: &RawGrid, header: &HeaderRow) -> Vec<DataRow> {
    grid.rows
        .iter()
        .skip(header.index)
        .filter(|cells| cells.iter().any(|cell| !cell.is_blank()))
        .map(|cells| {
            let mut row = DataRow::with_capacity(header.names.len());
            for (col, name) in header.names.iter().enumerate() {
                let value = cells.get(col).map_or(CellValue::Null, to_cell_value);
                row.insert(name.clone(), value);
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(v: &str) -> RawValue {
        RawValue::Text(v.to_string())
    }

    fn header(index: usize, names: &[&str]) -> HeaderRow {
        HeaderRow {
            index,
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    #[test]
    fn test_rows_below_header_only() {
        let grid = RawGrid {
            name: "S".to_string(),
            rows: vec![
                vec![text("Título")],
                vec![text("Id"), text("Valor")],
                vec![text("1"), RawValue::Number(2.5)],
            ],
        };

        let rows = materialize(&grid, &header(2, &["Id", "Valor"]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Id"], CellValue::from("1"));
        assert_eq!(rows[0]["Valor"], CellValue::Number(2.5));
    }

    #[test]
    fn test_blank_rows_dropped_partial_kept() {
        let grid = RawGrid {
            name: "S".to_string(),
            rows: vec![
                vec![text("Id"), text("Status")],
                vec![RawValue::Empty, text("  ")],
                vec![],
                vec![RawValue::Empty, text("Erro")],
            ],
        };

        let rows = materialize(&grid, &header(1, &["Id", "Status"]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Id"], CellValue::Null);
        assert_eq!(rows[0]["Status"], CellValue::from("Erro"));
    }

    #[test]
    fn test_duplicate_header_last_write_wins() {
        let grid = RawGrid {
            name: "S".to_string(),
            rows: vec![
                vec![text("Valor"), text("Valor")],
                vec![text("1"), text("2")],
            ],
        };

        let rows = materialize(&grid, &header(1, &["Valor", "Valor"]));
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[0]["Valor"], CellValue::from("2"));
    }

    #[test]
    fn test_short_rows_padded_with_null() {
        let grid = RawGrid {
            name: "S".to_string(),
            rows: vec![vec![text("A"), text("B"), text("C")], vec![text("x")]],
        };

        let rows = materialize(&grid, &header(1, &["A", "B", "C"]));
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(rows[0]["C"], CellValue::Null);
    }
}
