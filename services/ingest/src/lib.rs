//! Ingest - Turns uploaded accounting spreadsheets into normalized case rows
//!
//! Responsibilities:
//! - Read CSV and workbook uploads into raw sheets
//! - Find the real header row under titles and banners
//! - Resolve column names to semantic roles (status, dates, amounts, ...)
//! - Normalize dates to dd/mm/yyyy and money to BRL text
//! - Give every row a case identifier (`Chamado`)
//!
//! The pipeline is pure: same bytes + same options = same output.

pub mod aggregate;
pub mod error;
pub mod fields;
pub mod header;
pub mod identity;
pub mod model;
pub mod normalize;
pub mod rows;
pub mod template;
pub mod tokenizer;

#[cfg(test)]
mod test_support;

pub use aggregate::{ingest, ingest_with, process_sheet, IngestOptions};
pub use error::{IngestError, IngestWarning};
pub use fields::{resolve, resolve_value, SemanticFieldMap, SemanticRole};
pub use model::{
    CellValue, DataRow, IngestResult, Ingestion, NewFileRecord, SheetHeaders, SheetResult,
    TaggedRow, CASE_ID_COLUMN,
};
pub use template::{template_csv, template_xlsx, TEMPLATE_HEADERS};
