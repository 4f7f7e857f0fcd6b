//! Header resolver.
//!
//! Accounting exports often put titles, banners or blank rows above the real
//! header, so the header row is chosen by score instead of assumed to be row 1.

use crate::tokenizer::{RawGrid, RawValue};

/// Only the first rows are considered as header candidates.
const SCAN_LIMIT: usize = 50;
const HEADER_KEYWORDS: &[&str] = &["data", "date", "status", "valor"];
const KEYWORD_WEIGHT: usize = 2;

/// The resolved header: its 1-indexed row and one name per column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRow {
    pub index: usize,
    pub names: Vec<String>,
}

/// Non-empty cells, plus a bonus for each cell naming a domain keyword.
pub fn score_row(cells: &[RawValue]) -> usize {
    cells
        .iter()
        .filter(|cell| !cell.is_blank())
        .map(|cell| {
            let text = cell.text().to_lowercase();
            if HEADER_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
                1 + KEYWORD_WEIGHT
            } else {
                1
            }
        })
        .sum()
}

/// Number of columns up to the last non-blank cell.
fn populated_width(cells: &[RawValue]) -> usize {
    cells
        .iter()
        .rposition(|cell| !cell.is_blank())
        .map_or(0, |last| last + 1)
}

/// Pick the best-scoring row among the first 50; ties keep the earliest row
/// and an all-empty scan falls back to row 1.
pub fn resolve_header(grid: &RawGrid) -> HeaderRow {
    let limit = grid.row_count().min(SCAN_LIMIT);

    let mut best_index = 1;
    let mut best_score = 0;
    for index in 1..=limit {
        let score = score_row(grid.row(index));
        if score > best_score {
            best_index = index;
            best_score = score;
        }
    }

    let width = grid
        .rows
        .iter()
        .skip(best_index - 1)
        .map(|row| populated_width(row))
        .max()
        .unwrap_or(0);

    let names = (1..=width)
        .map(|col| match grid.cell(best_index, col) {
            Some(cell) if !cell.is_blank() => cell.text(),
            _ => format!("Column{col}"),
        })
        .collect();

    tracing::debug!(
        sheet = %grid.name,
        row = best_index,
        score = best_score,
        "header row resolved"
    );

    HeaderRow {
        index: best_index,
        names,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> RawGrid {
        RawGrid {
            name: "S".to_string(),
            rows: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|v| {
                            if v.is_empty() {
                                RawValue::Empty
                            } else {
                                RawValue::Text(v.to_string())
                            }
                        })
                        .collect()
                })
                .collect(),
        }
    }

    #[test]
    fn test_header_on_first_row() {
        let g = grid(&[&["Id", "Status"], &["1", "Pendente"]]);
        let header = resolve_header(&g);
        assert_eq!(header.index, 1);
        assert_eq!(header.names, vec!["Id", "Status"]);
    }

    #[test]
    fn test_title_row_above_header() {
        let g = grid(&[
            &["Relatório 2024", "", ""],
            &["Data", "Valor", "Status"],
            &["2024-01-28", "10,00", "Pendente"],
            &["2024-01-29", "20,00", "Erro"],
        ]);
        let header = resolve_header(&g);
        assert_eq!(header.index, 2);
        assert_eq!(header.names, vec!["Data", "Valor", "Status"]);
    }

    #[test]
    fn test_keywords_beat_dense_rows() {
        let g = grid(&[
            &["a", "b", "c", "d"],
            &["Data", "Status", ""],
        ]);
        // 4 plain cells vs 2 keyword cells worth 3 each
        assert_eq!(resolve_header(&g).index, 2);
    }

    #[test]
    fn test_tie_keeps_first_row() {
        let g = grid(&[&["x", "y"], &["p", "q"]]);
        assert_eq!(resolve_header(&g).index, 1);
    }

    #[test]
    fn test_empty_grid_falls_back_to_row_one() {
        let g = grid(&[&["", ""], &[""]]);
        let header = resolve_header(&g);
        assert_eq!(header.index, 1);
        assert!(header.names.is_empty());
    }

    #[test]
    fn test_blank_header_cells_get_placeholders() {
        let g = grid(&[&["Id", "", "Status"], &["1", "x", "Ok", "extra"]]);
        let header = resolve_header(&g);
        assert_eq!(header.names, vec!["Id", "Column2", "Status", "Column4"]);
    }

    #[test]
    fn test_rows_past_scan_limit_ignored() {
        let mut rows: Vec<Vec<&str>> = (0..60).map(|_| vec!["x"]).collect();
        rows.push(vec!["Data", "Valor", "Status"]);
        let refs: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();

        let header = resolve_header(&grid(&refs));
        assert_eq!(header.index, 1);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let g = grid(&[
            &["", "", ""],
            &["Relatório de Chamados"],
            &["Chamado", "", "Valor"],
            &["10", "a", "5,00"],
            &["11", "b", "6,00"],
        ]);
        let first = resolve_header(&g);

        let mut rebuilt: Vec<Vec<String>> = vec![first.names.clone()];
        for row in &g.rows[first.index..] {
            rebuilt.push(row.iter().map(RawValue::text).collect());
        }
        let rebuilt_refs: Vec<Vec<&str>> = rebuilt
            .iter()
            .map(|row| row.iter().map(String::as_str).collect())
            .collect();
        let slices: Vec<&[&str]> = rebuilt_refs.iter().map(Vec::as_slice).collect();

        let second = resolve_header(&grid(&slices));
        assert_eq!(second.index, 1);
        assert_eq!(second.names, first.names);
    }
}
