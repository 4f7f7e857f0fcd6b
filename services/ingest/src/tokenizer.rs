//! Tokenizer/parser: raw bytes of an uploaded file -> raw sheets.
//!
//! - CSV text, UTF-8 with a Windows-1252 fallback, `;` or `,` delimited
//! - Workbooks through calamine (xlsx, xlsm, xlsb, xls, ods)
//! - Worksheets that are really CSV text pasted into column A

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::{NaiveDateTime, Timelike};
use std::io::Cursor;

use crate::error::{IngestError, IngestWarning};
use crate::model::format_number;

/// Name given to the single grid produced from CSV input.
pub const CSV_SHEET_NAME: &str = "Sheet 1";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// A cell as read from the source, before any normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Empty,
    Text(String),
    Number(f64),
}

impl RawValue {
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Number(_) => false,
        }
    }

    /// Trimmed display text.
    pub fn text(&self) -> String {
        match self {
            RawValue::Empty => String::new(),
            RawValue::Text(s) => s.trim().to_string(),
            RawValue::Number(n) => format_number(*n),
        }
    }
}

fn text_or_empty(s: &str) -> RawValue {
    if s.is_empty() {
        RawValue::Empty
    } else {
        RawValue::Text(s.to_string())
    }
}

/// One sheet's cells. Rows and columns are addressed 1-indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawGrid {
    pub name: String,
    pub rows: Vec<Vec<RawValue>>,
}

impl RawGrid {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cells of row `index` (1-indexed); empty when out of range.
    pub fn row(&self, index: usize) -> &[RawValue] {
        index
            .checked_sub(1)
            .and_then(|i| self.rows.get(i))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&RawValue> {
        col.checked_sub(1).and_then(|c| self.row(row).get(c))
    }
}

/// Container format of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Workbook,
}

impl FileKind {
    /// Extension first, declared MIME type second, container signature last.
    pub fn detect(file_name: &str, mime: Option<&str>, bytes: &[u8]) -> Self {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" | "txt" => return FileKind::Csv,
            "xlsx" | "xlsm" | "xlsb" | "xls" | "xla" | "ods" => return FileKind::Workbook,
            _ => {}
        }

        if let Some(mime) = mime.map(str::to_ascii_lowercase) {
            if mime.contains("spreadsheet")
                || mime.contains("excel")
                || mime.contains("officedocument")
            {
                return FileKind::Workbook;
            }
            if mime.contains("csv") || mime.starts_with("text/") {
                return FileKind::Csv;
            }
        }

        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
            FileKind::Workbook
        } else {
            FileKind::Csv
        }
    }
}

/// Raw sheets of one file plus any sheet-level warnings.
#[derive(Debug, Default)]
pub struct Tokenized {
    pub grids: Vec<RawGrid>,
    pub warnings: Vec<IngestWarning>,
}

/// Split an uploaded file into raw grids.
pub fn tokenize(
    bytes: &[u8],
    file_name: &str,
    mime: Option<&str>,
) -> Result<Tokenized, IngestError> {
    match FileKind::detect(file_name, mime, bytes) {
        FileKind::Csv => {
            let text = decode_text(bytes);
            let grids = parse_csv_text(&text, CSV_SHEET_NAME)
                .map_err(|e| IngestError::parse(file_name, e))?
                .into_iter()
                .collect();
            Ok(Tokenized {
                grids,
                warnings: Vec::new(),
            })
        }
        FileKind::Workbook => read_workbook(bytes, file_name),
    }
}

// =============================================================================
// CSV
// =============================================================================

/// Decode as UTF-8 (BOM removed); fall back to Windows-1252 on invalid bytes.
pub fn decode_text(bytes: &[u8]) -> String {
    let (text, _, had_errors) = encoding_rs::UTF_8.decode(bytes);
    if !had_errors {
        return text.into_owned();
    }
    tracing::debug!("upload is not valid UTF-8, decoding as Windows-1252");
    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    text.into_owned()
}

/// Semicolon when the line has strictly more semicolons than commas.
pub fn detect_delimiter(line: &str) -> u8 {
    let semicolons = line.matches(';').count();
    let commas = line.matches(',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// Trim and strip one enclosing pair of double quotes.
fn clean_field(field: &str) -> String {
    let trimmed = field.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

/// Split delimited text into cleaned fields, dropping blank lines.
///
/// Quotes get no special treatment: every line is one record, and
/// `clean_field` removes the enclosing pair afterwards.
pub fn split_delimited(text: &str, delimiter: u8) -> Result<Vec<Vec<String>>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let fields: Vec<String> = record.iter().map(clean_field).collect();
        if fields.len() <= 1 && fields.iter().all(String::is_empty) {
            continue;
        }
        rows.push(fields);
    }
    Ok(rows)
}

/// Parse CSV text into a grid; `None` when there is no text at all.
pub fn parse_csv_text(text: &str, sheet_name: &str) -> Result<Option<RawGrid>, csv::Error> {
    let Some(first_line) = text.lines().find(|line| !line.trim().is_empty()) else {
        return Ok(None);
    };

    let delimiter = detect_delimiter(first_line);
    let rows = split_delimited(text, delimiter)?
        .into_iter()
        .map(|fields| fields.iter().map(|f| text_or_empty(f)).collect())
        .collect();

    Ok(Some(RawGrid {
        name: sheet_name.to_string(),
        rows,
    }))
}

// =============================================================================
// Workbooks
// =============================================================================

fn read_workbook(bytes: &[u8], file_name: &str) -> Result<Tokenized, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| IngestError::parse(file_name, e))?;

    let mut tokenized = Tokenized::default();
    for name in workbook.sheet_names() {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!(sheet = %name, error = %e, "skipping unreadable worksheet");
                tokenized.warnings.push(IngestWarning::SheetSkipped {
                    sheet: name.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let grid = range_to_grid(&name, &range);
        let grid = match embedded_csv_text(&grid) {
            Some(text) => {
                tracing::info!(sheet = %name, "worksheet holds CSV text in column A, re-splitting");
                let rows = split_delimited(&text, b';')
                    .map_err(|e| IngestError::parse(file_name, e))?
                    .into_iter()
                    .map(|fields| fields.iter().map(|f| text_or_empty(f)).collect())
                    .collect();
                RawGrid { name: name.clone(), rows }
            }
            None => grid,
        };
        tokenized.grids.push(grid);
    }

    Ok(tokenized)
}

/// Convert a calamine range, restoring the blank rows and columns calamine
/// trims off the top and left so cells keep their sheet coordinates.
fn range_to_grid(name: &str, range: &Range<Data>) -> RawGrid {
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut rows: Vec<Vec<RawValue>> = (0..start_row).map(|_| Vec::new()).collect();
    rows.extend(range.rows().map(|row| {
        (0..start_col)
            .map(|_| RawValue::Empty)
            .chain(row.iter().map(cell_to_raw))
            .collect()
    }));

    RawGrid {
        name: name.to_string(),
        rows,
    }
}

/// Column-A text of a sheet that is CSV pasted into one column.
///
/// Detected on the first non-blank row: its first cell holds at least three
/// semicolons, or at least one with the second cell empty.
fn embedded_csv_text(grid: &RawGrid) -> Option<String> {
    let first_row = grid
        .rows
        .iter()
        .find(|row| row.iter().any(|cell| !cell.is_blank()))?;

    let RawValue::Text(first_cell) = first_row.first()? else {
        return None;
    };
    let semicolons = first_cell.matches(';').count();
    let second_empty = first_row.get(1).map_or(true, RawValue::is_blank);

    if semicolons >= 3 || (semicolons >= 1 && second_empty) {
        let lines: Vec<String> = grid
            .rows
            .iter()
            .filter_map(|row| row.first())
            .map(RawValue::text)
            .filter(|line| !line.is_empty())
            .collect();
        Some(lines.join("\n"))
    } else {
        None
    }
}

/// Coerce a calamine cell. Formulas arrive as their cached result and rich
/// text already concatenated; typed dates become ISO strings.
pub fn cell_to_raw(cell: &Data) -> RawValue {
    match cell {
        Data::Empty => RawValue::Empty,
        Data::String(s) => text_or_empty(s),
        Data::Float(f) => RawValue::Number(*f),
        Data::Int(i) => RawValue::Number(*i as f64),
        Data::Bool(b) => RawValue::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if dt.is_datetime() => RawValue::Text(iso_string(&value)),
            _ => RawValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => text_or_empty(s),
        Data::Error(e) => RawValue::Text(e.to_string()),
    }
}

fn iso_string(value: &NaiveDateTime) -> String {
    if value.time().num_seconds_from_midnight() == 0 {
        value.format("%Y-%m-%d").to_string()
    } else {
        value.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}
