//! CSV import file parsing
//!
//! Columns are positional:
//! `Artist, Album, Format, Year?, ExternalId?, CatalogNumber?, MediaCondition?, SleeveCondition?`
//!
//! Rows are numbered by their line offset from the header, so the first
//! data line is row 1 and skipped blank lines keep later rows at their
//! position in the file.
//!
//! Only the file's shape is checked here. Row contents (format token, year,
//! ids, grades) are validated per row by the Row Matcher so that one bad row
//! never rejects the whole file.

use thiserror::Error;

use crate::models::ImportRow;

/// Header names of the three required leading columns
pub const REQUIRED_HEADERS: [&str; 3] = ["artist", "album", "format"];

/// Upload rejected before any row is processed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("uploaded file is empty")]
    Empty,

    #[error("file is not valid UTF-8 text")]
    InvalidEncoding,

    #[error("malformed CSV: {0}")]
    Malformed(String),

    #[error("missing header row: expected columns Artist, Album, Format, found {found}")]
    MissingHeader { found: String },

    #[error("file contains no data rows")]
    NoRows,

    #[error("file has {rows} data rows, the limit is {limit}")]
    TooManyRows { rows: usize, limit: usize },
}

fn optional_cell(record: &csv::StringRecord, index: usize) -> Option<String> {
    record
        .get(index)
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
}

fn required_cell(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).map(str::trim).unwrap_or_default().to_string()
}

/// Parse an uploaded CSV file into rows numbered from 1
pub fn parse_import_csv(bytes: &[u8], max_rows: usize) -> Result<Vec<ImportRow>, ParseError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ParseError::Empty);
    }
    if std::str::from_utf8(bytes).is_err() {
        return Err(ParseError::InvalidEncoding);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| ParseError::Malformed(e.to_string()))?
        .clone();
    let header_matches = headers.len() >= REQUIRED_HEADERS.len()
        && REQUIRED_HEADERS
            .iter()
            .zip(headers.iter())
            .all(|(expected, found)| found.trim().eq_ignore_ascii_case(expected));
    if !header_matches {
        return Err(ParseError::MissingHeader {
            found: headers.iter().collect::<Vec<_>>().join(", "),
        });
    }

    let header_line = headers.position().map_or(1, |pos| pos.line());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ParseError::Malformed(e.to_string()))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        if rows.len() == max_rows {
            let remaining = reader.records().count();
            return Err(ParseError::TooManyRows {
                rows: max_rows + 1 + remaining,
                limit: max_rows,
            });
        }

        let line = record
            .position()
            .map_or(header_line + rows.len() as u64 + 1, |pos| pos.line());

        rows.push(ImportRow {
            row_index: line.saturating_sub(header_line) as u32,
            artist: required_cell(&record, 0),
            album: required_cell(&record, 1),
            format: required_cell(&record, 2),
            year: optional_cell(&record, 3),
            external_id: optional_cell(&record, 4),
            catalog_number: optional_cell(&record, 5),
            media_condition: optional_cell(&record, 6),
            sleeve_condition: optional_cell(&record, 7),
        });
    }

    if rows.is_empty() {
        return Err(ParseError::NoRows);
    }

    Ok(rows)
}
