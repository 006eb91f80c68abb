// Spreadsheet import: uploaded bytes into typed cell rows.
//
// Two formats are accepted. An xlsx workbook (detected by its zip signature)
// is read from its first worksheet with the cell types the file declares.
// Anything else is parsed as CSV, where every non-empty field is text.
//
// Row 0 carries the team tags and is returned like any other row. Rows may
// have differing lengths.

use std::io::Cursor;

use calamine::{Data, Range, Reader, Xlsx, XlsxError};
use tracing::debug;

use crate::roster::CellValue;

/// Local file header signature shared by every zip container, xlsx included.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("malformed spreadsheet at row {row}: {source}")]
    Csv { row: usize, source: csv::Error },

    #[error("unreadable workbook: {0}")]
    Workbook(#[from] XlsxError),

    #[error("workbook has no worksheets")]
    NoWorksheets,
}

/// Parse an uploaded spreadsheet into rows of cells.
pub fn parse_rows(bytes: &[u8]) -> Result<Vec<Vec<CellValue>>, ImportError> {
    if bytes.starts_with(ZIP_MAGIC) {
        debug!("Parsing upload as xlsx ({} bytes)", bytes.len());
        parse_xlsx(bytes)
    } else {
        debug!("Parsing upload as CSV ({} bytes)", bytes.len());
        parse_csv(bytes)
    }
}

// ---------------------------------------------------------------------------
// xlsx
// ---------------------------------------------------------------------------

fn parse_xlsx(bytes: &[u8]) -> Result<Vec<Vec<CellValue>>, ImportError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::NoWorksheets)??;
    Ok(range_rows(&range))
}

/// Rows of a worksheet range, anchored at A1.
///
/// The range only spans the used cells, so leading blank rows and columns
/// are restored as empty cells to keep tags in row 0 and members in
/// columns 0 and 1.
fn range_rows(range: &Range<Data>) -> Vec<Vec<CellValue>> {
    let Some((first_row, first_col)) = range.start() else {
        return Vec::new();
    };

    let mut rows: Vec<Vec<CellValue>> = (0..first_row).map(|_| Vec::new()).collect();
    for row in range.rows() {
        let mut cells: Vec<CellValue> = (0..first_col).map(|_| CellValue::Empty).collect();
        cells.extend(row.iter().map(xlsx_cell));
        rows.push(cells);
    }
    rows
}

fn xlsx_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Float(n) => CellValue::Number(*n),
        // Dates arrive as serial day numbers, as spreadsheet readers report them.
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            CellValue::from(s.as_str())
        }
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn parse_csv(bytes: &[u8]) -> Result<Vec<Vec<CellValue>>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(strip_bom(bytes));

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|source| ImportError::Csv { row: idx, source })?;
        rows.push(record.iter().map(csv_cell).collect());
    }
    Ok(rows)
}

/// CSV fields are untyped: every field is kept byte for byte as text, except
/// the empty field and a literal `0`, which are the absent values.
fn csv_cell(raw: &str) -> CellValue {
    match raw {
        "" => CellValue::Empty,
        "0" => CellValue::Number(0.0),
        _ => CellValue::Text(raw.to_string()),
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}
