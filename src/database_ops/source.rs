//! CSV exports of the production spreadsheets, read as raw rows.
//!
//! Sheets carry several metadata/header rows and ragged widths, so records are
//! read without header handling and with flexible widths; column offsets are
//! applied later by the mapping builder.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use csv::{ByteRecord, ReaderBuilder};
use tracing::{debug, warn};

/// One spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalRow {
    Cells(Vec<String>),
    /// The record could not be decoded as UTF-8.
    Malformed { line: u64 },
}

impl ExternalRow {
    pub fn cells<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExternalRow::Cells(cells.into_iter().map(Into::into).collect())
    }

    /// Cell at `idx`; out-of-range indexes and malformed rows read as empty.
    pub fn cell(&self, idx: usize) -> &str {
        match self {
            ExternalRow::Cells(cells) => cells.get(idx).map(String::as_str).unwrap_or(""),
            ExternalRow::Malformed { .. } => "",
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ExternalRow::Malformed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLoad {
    Loaded(Vec<ExternalRow>),
    /// The file does not exist; treated as a source with zero rows.
    Missing,
}

/// Read every record of the CSV at `path`.
///
/// A missing file is not an error. Other I/O or CSV failures are returned so the
/// caller can drop this source and carry on with the rest.
pub fn load_rows(path: &Path) -> Result<SourceLoad> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "source file not found; contributing zero rows");
            return Ok(SourceLoad::Missing);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to open {}", path.display()));
        }
    };
    let rows = read_rows(BufReader::with_capacity(1 << 20, file))
        .with_context(|| format!("failed to read {}", path.display()))?;
    debug!(path = %path.display(), rows = rows.len(), "source rows loaded");
    Ok(SourceLoad::Loaded(rows))
}

pub fn read_rows<R: Read>(reader: R) -> Result<Vec<ExternalRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(reader);

    let mut rec = ByteRecord::new();
    let mut rows = Vec::new();
    while rdr.read_byte_record(&mut rec)? {
        let line = rec.position().map(|p| p.line()).unwrap_or(0);
        rows.push(decode_record(&rec, line));
        rec.clear();
    }
    Ok(rows)
}

fn decode_record(rec: &ByteRecord, line: u64) -> ExternalRow {
    let mut cells = Vec::with_capacity(rec.len());
    for field in rec.iter() {
        match std::str::from_utf8(field) {
            Ok(s) => cells.push(s.to_string()),
            Err(_) => return ExternalRow::Malformed { line },
        }
    }
    ExternalRow::Cells(cells)
}
