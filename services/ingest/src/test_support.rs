//! In-memory XLSX fixtures for tests.

use rust_xlsxwriter::{Format, Workbook};

pub enum Cell {
    Str(&'static str),
    Num(f64),
    Date(f64),
    /// Leaves the cell unwritten.
    Blank,
}

impl Cell {
    pub fn s(value: &'static str) -> Self {
        Cell::Str(value)
    }

    pub fn n(value: f64) -> Self {
        Cell::Num(value)
    }

    /// An Excel serial written with a date number format.
    pub fn date(serial: f64) -> Self {
        Cell::Date(serial)
    }
}

pub fn workbook_bytes(sheets: &[(&str, Vec<Vec<Cell>>)]) -> Vec<u8> {
    let date_format = Format::new().set_num_format("dd/mm/yyyy");
    let mut workbook = Workbook::new();

    for (name, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name).expect("valid sheet name");
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                match cell {
                    Cell::Str(value) => {
                        sheet.write_string(r, c, *value).expect("write string");
                    }
                    Cell::Num(value) => {
                        sheet.write_number(r, c, *value).expect("write number");
                    }
                    Cell::Date(serial) => {
                        sheet
                            .write_number_with_format(r, c, *serial, &date_format)
                            .expect("write date");
                    }
                    Cell::Blank => {}
                }
            }
        }
    }

    workbook.save_to_buffer().expect("workbook serializes")
}
