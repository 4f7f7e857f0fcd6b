//! Downloadable import template in the canonical column schema.

use rust_xlsxwriter::{Format, Workbook};

use crate::error::IngestError;

pub const TEMPLATE_HEADERS: [&str; 14] = [
    "Chamado",
    "Status",
    "Data de Abertura",
    "Data de Vencimento",
    "Responsável",
    "Cliente",
    "Valor Total",
    "Valor Líquido",
    "Forma de Pagamento",
    "PCC",
    "IR",
    "Base ISS",
    "Período",
    "Inconsistencias",
];

const EXAMPLE_ROW: [&str; 14] = [
    "CS-2024-001",
    "Pendente",
    "28/01/2024",
    "27/02/2024",
    "Ana Souza",
    "Empresa Exemplo Ltda",
    "1.500,00",
    "1.350,00",
    "Boleto",
    "69,75",
    "22,50",
    "1.500,00",
    "01/2024",
    "",
];

const SHEET_NAME: &str = "Modelo";

/// Template as semicolon-separated text with one example row, the layout
/// Brazilian spreadsheet exports use.
pub fn template_csv() -> Result<Vec<u8>, IngestError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(Vec::new());
    writer
        .write_record(TEMPLATE_HEADERS)
        .and_then(|_| writer.write_record(EXAMPLE_ROW))
        .map_err(|e| IngestError::Template(e.to_string()))?;
    writer
        .into_inner()
        .map_err(|e| IngestError::Template(e.to_string()))
}

/// Template as an XLSX workbook; every cell is written as text so amounts
/// keep their BRL formatting.
pub fn template_xlsx() -> Result<Vec<u8>, IngestError> {
    let bold = Format::new().set_bold();
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    let written = sheet.set_name(SHEET_NAME).and_then(|sheet| {
        for (col, (header, example)) in TEMPLATE_HEADERS.iter().zip(EXAMPLE_ROW).enumerate() {
            let col = col as u16;
            sheet.write_string_with_format(0, col, *header, &bold)?;
            if !example.is_empty() {
                sheet.write_string(1, col, example)?;
            }
            sheet.set_column_width(col, 18)?;
        }
        Ok(())
    });
    written.map_err(|e| IngestError::Template(e.to_string()))?;

    workbook
        .save_to_buffer()
        .map_err(|e| IngestError::Template(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{ingest_with, IngestOptions};
    use crate::fields::{resolve_column, SemanticRole};
    use crate::model::{CellValue, DataRow};
    use std::collections::BTreeSet;

    const OPTIONS: IngestOptions = IngestOptions { year: 2024 };

    #[test]
    fn test_every_header_resolves_to_a_role() {
        let row: DataRow = TEMPLATE_HEADERS
            .iter()
            .map(|h| (h.to_string(), CellValue::Null))
            .collect();

        let resolved: BTreeSet<&str> = SemanticRole::ALL
            .iter()
            .filter_map(|role| resolve_column(&row, *role))
            .collect();
        let expected: BTreeSet<&str> = TEMPLATE_HEADERS.into_iter().collect();
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_csv_template_ingests_back() {
        let bytes = template_csv().unwrap();
        let out = ingest_with(&bytes, "modelo.csv", None, OPTIONS).unwrap();
        let sheet = &out.sheets["Sheet 1"];

        assert_eq!(sheet.headers, TEMPLATE_HEADERS.map(String::from).to_vec());
        assert_eq!(sheet.rows.len(), 1);
        let row = &sheet.rows[0];
        assert_eq!(row["Chamado"], CellValue::from("CS-2024-001"));
        assert_eq!(row["Status"], CellValue::from("Pendente"));
        assert_eq!(row["Valor Total"], CellValue::from("1.500,00"));
        assert_eq!(row["Data de Abertura"], CellValue::from("28/01/2024"));
        assert_eq!(row["Inconsistencias"], CellValue::Null);
    }

    #[test]
    fn test_csv_template_is_semicolon_separated() {
        let text = String::from_utf8(template_csv().unwrap()).unwrap();
        let mut lines = text.lines();

        assert!(lines.next().unwrap().starts_with("Chamado;Status;Data de Abertura;"));
        let example = lines.next().unwrap();
        assert!(example.contains(";1.500,00;1.350,00;"));
        assert!(!example.contains('"'));
    }

    #[test]
    fn test_xlsx_template_ingests_back() {
        let bytes = template_xlsx().unwrap();
        let out = ingest_with(&bytes, "modelo.xlsx", None, OPTIONS).unwrap();
        let sheet = &out.sheets[SHEET_NAME];

        assert_eq!(sheet.headers.len(), TEMPLATE_HEADERS.len());
        assert_eq!(sheet.rows[0]["Valor Líquido"], CellValue::from("1.350,00"));
        assert_eq!(sheet.rows[0]["Período"], CellValue::from("01/2024"));
    }
}
