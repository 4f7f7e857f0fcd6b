//! Value normalizer: date cells to `dd/mm/yyyy`, money cells to BRL text.
//!
//! Anything that does not parse is returned unchanged.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::collections::HashSet;

use crate::fields::{is_currency_column, is_date_column, resolve_column, SemanticRole};
use crate::model::{CellValue, DataRow};

/// Days between the Excel epoch (1899-12-30) and 1970-01-01.
const EXCEL_UNIX_EPOCH_DAYS: i64 = 25569;
const MS_PER_DAY: i64 = 86_400_000;
const HALF_DAY_MS: i64 = 43_200_000;
/// Smaller numbers are not treated as serial dates (20000 is 1954-10-03).
const MIN_SERIAL: f64 = 20000.0;

const DATE_FORMAT: &str = "%d/%m/%Y";

// =============================================================================
// Dates
// =============================================================================

/// Serial, ISO date or ISO date-time to `dd/mm/yyyy`; other values unchanged.
pub fn normalize_date(value: &CellValue) -> CellValue {
    let normalized = match value {
        CellValue::Number(n) => serial_to_date(*n),
        CellValue::Text(s) => normalize_date_text(s),
        CellValue::Null => None,
    };
    normalized.map_or_else(|| value.clone(), CellValue::Text)
}

fn normalize_date_text(raw: &str) -> Option<String> {
    let s = raw.trim();

    // Serial check first: a serial is itself a numeric string.
    if is_plain_number(s) {
        return s.parse::<f64>().ok().and_then(serial_to_date);
    }
    if is_iso_date(s) {
        return Some(format!("{}/{}/{}", &s[8..10], &s[5..7], &s[0..4]));
    }
    if s.get(..10).is_some_and(is_iso_date) && s.as_bytes().get(10) == Some(&b'T') {
        return iso_datetime_to_local_date(s);
    }
    None
}

/// Excel serial day number to a UTC calendar date.
///
/// The day count is floored and shifted by half a day so float error in the
/// product never lands on the previous midnight.
pub fn serial_to_date(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial <= MIN_SERIAL {
        return None;
    }
    let days = serial.floor() as i64;
    let ms = (days - EXCEL_UNIX_EPOCH_DAYS) * MS_PER_DAY + HALF_DAY_MS;
    DateTime::<Utc>::from_timestamp_millis(ms).map(|date| date.format(DATE_FORMAT).to_string())
}

/// Date-times with an offset are shown in local time; naive ones are taken as
/// already local.
fn iso_datetime_to_local_date(s: &str) -> Option<String> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(s) {
        return Some(with_offset.with_timezone(&Local).format(DATE_FORMAT).to_string());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|pattern| NaiveDateTime::parse_from_str(s, pattern).ok())
        .map(|naive| naive.format(DATE_FORMAT).to_string())
}

/// Digits with an optional decimal part, nothing else.
fn is_plain_number(s: &str) -> bool {
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, "0"));
    !int_part.is_empty()
        && !frac_part.is_empty()
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.bytes().all(|b| b.is_ascii_digit())
}

fn is_iso_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

// =============================================================================
// Currency
// =============================================================================

/// Money to BRL text (`1.234,56`); codes and unparseable text unchanged.
pub fn normalize_currency(value: &CellValue) -> CellValue {
    match value {
        CellValue::Number(n) if n.is_finite() => CellValue::Text(format_brl(*n)),
        CellValue::Text(s) => parse_amount(s)
            .map_or_else(|| value.clone(), |n| CellValue::Text(format_brl(n))),
        _ => value.clone(),
    }
}

/// Read an amount written with either decimal convention.
///
/// With both separators present the dot is the thousands mark; a lone comma
/// is the decimal mark; a lone dot is left alone.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let unmarked = trimmed
        .strip_prefix("R$")
        .or_else(|| trimmed.strip_prefix("r$"))
        .unwrap_or(trimmed);

    if unmarked.chars().any(char::is_alphabetic) {
        return None;
    }

    let cleaned: String = unmarked
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();

    let canonical = match (cleaned.contains(','), cleaned.contains('.')) {
        (true, true) => cleaned.replace('.', "").replace(',', "."),
        (true, false) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    canonical.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Dot thousands separator, comma decimal separator, two decimals.
pub fn format_brl(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}{grouped},{:02}", cents % 100)
}

// =============================================================================
// Rows
// =============================================================================

/// Columns of this row holding money: resolved monetary roles plus the
/// name heuristic.
pub fn monetary_columns(row: &DataRow) -> HashSet<String> {
    let mut columns: HashSet<String> = SemanticRole::ALL
        .iter()
        .filter(|role| role.is_monetary())
        .filter_map(|role| resolve_column(row, *role))
        .map(str::to_string)
        .collect();
    columns.extend(row.keys().filter(|key| is_currency_column(key)).cloned());
    columns
}

/// Normalize date and money cells in place; returns how many cells changed.
pub fn normalize_row(row: &mut DataRow) -> usize {
    let money = monetary_columns(row);
    let mut changed = 0;

    for (column, value) in row.iter_mut() {
        let normalized = if is_date_column(column) {
            normalize_date(value)
        } else if money.contains(column) {
            normalize_currency(value)
        } else {
            continue;
        };

        if normalized != *value {
            *value = normalized;
            changed += 1;
        }
    }

    changed
}
