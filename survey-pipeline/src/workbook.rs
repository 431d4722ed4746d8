//! Spreadsheet I/O boundary.
//!
//! Reading goes through `calamine`, writing through `rust_xlsxwriter`. The
//! rest of the crate only sees [`Table`]s.

use std::path::Path;

use calamine::{Data, Range, Reader, open_workbook_auto};
use rust_xlsxwriter::{Format, Workbook};

use crate::domain::table::{Cell, Table};
use crate::{Error, Result};

/// Excel's hard row limit (header included).
const MAX_ROWS: usize = 1_048_576;
/// Excel's hard column limit.
const MAX_COLS: usize = 16_384;

fn cell_from(data: &Data) -> Cell {
    match data {
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) | Data::Empty => Cell::Empty,
    }
}

/// Column names from the header row: blanks become `Unnamed: N`, repeats get `.N`.
fn header_names(header: &[Cell]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(header.len());
    for (i, cell) in header.iter().enumerate() {
        let base = match cell {
            Cell::Empty => format!("Unnamed: {}", i),
            other => other.to_string(),
        };
        let mut name = base.clone();
        let mut n = 1;
        while names.contains(&name) {
            name = format!("{}.{}", base, n);
            n += 1;
        }
        names.push(name);
    }
    names
}

/// Convert a sheet range into a table, using its first row as the header.
pub fn range_to_table(range: &Range<Data>) -> Table {
    // Ranges start at the first used cell; restore leading blank columns.
    let col_offset = range.start().map(|(_, c)| c as usize).unwrap_or(0);
    let mut rows = range.rows().map(|r| {
        let mut cells = vec![Cell::Empty; col_offset];
        cells.extend(r.iter().map(cell_from));
        cells
    });

    let Some(header) = rows.next() else {
        return Table::default();
    };

    let mut body: Vec<Vec<Cell>> = rows.collect();
    while body
        .last()
        .is_some_and(|r| r.iter().all(Cell::is_missing))
    {
        body.pop();
    }

    Table::from_rows(header_names(&header), body)
}

/// Read every sheet of a workbook, in workbook order.
pub fn read_workbook(path: &Path) -> Result<Vec<(String, Table)>> {
    let mut workbook = open_workbook_auto(path)?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        sheets.push((name, range_to_table(&range)));
    }
    Ok(sheets)
}

/// Write `sheets` to a new workbook at `path`. Names must already be valid and unique.
pub fn write_workbook(path: &Path, sheets: &[(String, &Table)]) -> Result<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    for (name, table) in sheets {
        if table.len() + 1 > MAX_ROWS || table.width() > MAX_COLS {
            return Err(Error::step(format!(
                "table for sheet '{}' exceeds Excel limits ({} rows x {} columns)",
                name,
                table.len(),
                table.width()
            )));
        }

        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name.as_str())?;

        for (c, column) in table.columns().iter().enumerate() {
            worksheet.write_string_with_format(0, c as u16, column.as_str(), &header_format)?;
        }

        for (r, row) in table.rows().iter().enumerate() {
            let row_num = (r + 1) as u32;
            for (c, cell) in row.iter().enumerate() {
                let col_num = c as u16;
                match cell {
                    Cell::Number(n) if n.is_finite() => {
                        worksheet.write_number(row_num, col_num, *n)?;
                    }
                    Cell::Bool(b) => {
                        worksheet.write_boolean(row_num, col_num, *b)?;
                    }
                    Cell::Text(s) => {
                        worksheet.write_string(row_num, col_num, s.as_str())?;
                    }
                    _ => {}
                }
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_header_names_fill_blanks_and_dedupe() {
        let header = vec![
            Cell::text("School"),
            Cell::Empty,
            Cell::text("School"),
            Cell::Number(5.0),
        ];
        assert_eq!(
            header_names(&header),
            vec!["School", "Unnamed: 1", "School.1", "5"]
        );
    }

    #[test]
    fn test_write_then_read_preserves_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.xlsx");
        let table = Table::from_rows(
            vec!["Name".into(), "Score".into(), "Passed".into()],
            vec![
                vec!["Oak".into(), 12.5.into(), Cell::Bool(true)],
                vec!["Pine".into(), Cell::Empty, Cell::Bool(false)],
            ],
        );
        write_workbook(&path, &[("scores".to_string(), &table)]).unwrap();

        let sheets = read_workbook(&path).unwrap();
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].0, "scores");
        let read = &sheets[0].1;
        assert_eq!(read.columns(), table.columns());
        assert_eq!(read.len(), 2);
        assert_eq!(read.cell(0, 1).as_f64(), Some(12.5));
        assert!(read.cell(1, 1).is_missing());
        assert_eq!(read.cell(1, 2), &Cell::Bool(false));
    }

    #[test]
    fn test_empty_table_keeps_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.xlsx");
        let table = Table::with_columns(&["A", "B"]);
        write_workbook(&path, &[("empty".to_string(), &table)]).unwrap();

        let sheets = read_workbook(&path).unwrap();
        assert_eq!(sheets[0].1.columns(), &["A", "B"]);
        assert!(sheets[0].1.is_empty());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_workbook(&dir.path().join("absent.xlsx")).is_err());
    }
}
