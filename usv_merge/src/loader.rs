//! Primary track-log and overlay spreadsheet loaders.
//!
//! Loaders never abort on a bad row: rows that cannot be used are skipped
//! and listed in the file's [`ParseReport`]. Whole-file failures (unknown
//! format, corrupt workbook) surface as a [`MergeError`] from the parse
//! functions and as [`ParseReport::error`] from [`load_overlays`].

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{MergeError, OverlayRow, PrimaryRecord};

/// A file as handed over by the caller: display name plus raw bytes.
#[derive(Clone, Debug)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lowercase extension used as the format hint.
    pub fn ext(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowIssue {
    /// 1-based row in the source file, header included.
    pub row: usize,
    pub message: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParseReport {
    pub file: String,
    pub rows: usize,
    pub issues: Vec<RowIssue>,
    pub error: Option<String>,
}

impl ParseReport {
    fn new(file: &str) -> Self {
        Self {
            file: file.to_string(),
            ..Self::default()
        }
    }

    pub fn failed(file: &str, err: &MergeError) -> Self {
        Self {
            file: file.to_string(),
            error: Some(err.to_string()),
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.issues.is_empty()
    }

    fn issue(&mut self, row: usize, message: impl Into<String>) {
        self.issues.push(RowIssue {
            row,
            message: message.into(),
        });
    }
}

/// Parse the primary track log: header row, then latitude, longitude, depth, time.
///
/// Depth and time are optional per row. Cell text is kept verbatim. A file
/// that ends in a newline gets a trailing [`PrimaryRecord::blank`], so the
/// record the preview leaves out is that blank line rather than the last
/// data row. `report.rows` counts data rows only.
pub fn parse_primary(file: &InputFile) -> Result<(Vec<PrimaryRecord>, ParseReport), MergeError> {
    let mut report = ParseReport::new(&file.name);
    let mut records = Vec::new();
    let delimiter = sniff_delimiter(&file.bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(file.bytes.as_slice());

    for (idx, result) in reader.records().enumerate() {
        let fallback_row = idx + 2;
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let row = err
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_row);
                report.issue(row, err.to_string());
                continue;
            }
        };
        let row = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_row);
        let (Some(lat), Some(lon)) = (record.get(0), record.get(1)) else {
            report.issue(row, "expected at least latitude and longitude columns");
            continue;
        };
        records.push(PrimaryRecord {
            latitude: lat.to_string(),
            longitude: lon.to_string(),
            depth: record.get(2).map(str::to_string),
            time: record.get(3).map(str::to_string),
        });
    }

    report.rows = records.len();
    if report.rows > 0 && matches!(file.bytes.last(), Some(b'\n' | b'\r')) {
        records.push(PrimaryRecord::blank());
    }
    debug!(
        file = %file.name,
        rows = report.rows,
        issues = report.issues.len(),
        "parsed primary track log"
    );
    Ok((records, report))
}

/// Pick `,`, `;` or tab from the header line, whichever occurs most. Defaults to `,`.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let header = bytes.split(|&b| b == b'\n').next().unwrap_or(&[]);
    let mut best = (b',', 0usize);
    for candidate in [b',', b';', b'\t'] {
        let count = header.iter().filter(|&&b| b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

/// Rows of one overlay file together with where they came from.
#[derive(Clone, Debug)]
pub struct OverlayBatch {
    /// Position of the file in the caller's selection.
    pub file_index: usize,
    pub rows: Vec<OverlayRow>,
    pub report: ParseReport,
}

/// Parse one overlay file: first sheet only, first row dropped.
pub fn parse_overlay(file: &InputFile, file_index: usize) -> Result<OverlayBatch, MergeError> {
    let ext = file.ext();
    let (rows, report) = match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => parse_workbook(file)?,
        "csv" | "txt" => parse_delimited_overlay(file)?,
        _ => return Err(MergeError::UnsupportedFormat(file.name.clone())),
    };
    debug!(
        file = %file.name,
        rows = rows.len(),
        issues = report.issues.len(),
        "parsed overlay"
    );
    Ok(OverlayBatch {
        file_index,
        rows,
        report,
    })
}

fn parse_workbook(file: &InputFile) -> Result<(Vec<OverlayRow>, ParseReport), MergeError> {
    let mut report = ParseReport::new(&file.name);
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(file.bytes.clone()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| MergeError::EmptySheet(file.name.clone()))??;

    // calamine trims leading empty rows/columns; pad so cell positions match the sheet
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows = Vec::new();
    for (idx, cells) in range.rows().enumerate().skip(1) {
        let mut row: Vec<String> = vec![String::new(); col_offset];
        row.extend(cells.iter().map(cell_text));
        push_overlay_row(&mut rows, &mut report, row_offset + idx + 1, row);
    }
    report.rows = rows.len();
    Ok((rows, report))
}

fn parse_delimited_overlay(file: &InputFile) -> Result<(Vec<OverlayRow>, ParseReport), MergeError> {
    let mut report = ParseReport::new(&file.name);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(sniff_delimiter(&file.bytes))
        .from_reader(file.bytes.as_slice());

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                let row = record.position().map(|p| p.line() as usize).unwrap_or(idx + 2);
                push_overlay_row(
                    &mut rows,
                    &mut report,
                    row,
                    record.iter().map(str::to_string).collect(),
                );
            }
            Err(err) => {
                let row = err.position().map(|p| p.line() as usize).unwrap_or(idx + 2);
                report.issue(row, err.to_string());
            }
        }
    }
    report.rows = rows.len();
    Ok((rows, report))
}

fn push_overlay_row(
    rows: &mut Vec<OverlayRow>,
    report: &mut ParseReport,
    source_row: usize,
    cells: Vec<String>,
) {
    if cells.iter().all(|c| c.is_empty()) {
        return;
    }
    if cells.len() <= OverlayRow::LONGITUDE {
        report.issue(source_row, "missing latitude/longitude cells");
        return;
    }
    rows.push(OverlayRow { cells });
}

/// Text of a spreadsheet cell. Numbers use the shortest round-trip form, so `1.0` reads `1`.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(v) => v.to_string(),
        Data::Float(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(v) => v.as_f64().to_string(),
    }
}

/// Overlay rows of a whole selection, in selection order.
#[derive(Clone, Debug, Default)]
pub struct OverlaySet {
    pub rows: Vec<OverlayRow>,
    pub reports: Vec<ParseReport>,
}

impl OverlaySet {
    /// Concatenate batches by `file_index`, regardless of the order they finished in.
    pub fn from_batches(mut batches: Vec<OverlayBatch>) -> Self {
        batches.sort_by_key(|batch| batch.file_index);
        let mut set = OverlaySet::default();
        for batch in batches {
            set.rows.extend(batch.rows);
            set.reports.push(batch.report);
        }
        set
    }
}

/// Parse every overlay file in parallel and fold the results in selection order.
///
/// A file that fails to parse contributes no rows and an error report.
pub fn load_overlays(files: &[InputFile]) -> OverlaySet {
    let batches: Vec<OverlayBatch> = files
        .par_iter()
        .enumerate()
        .map(|(file_index, file)| match parse_overlay(file, file_index) {
            Ok(batch) => batch,
            Err(err) => {
                warn!(file = %file.name, error = %err, "overlay file skipped");
                OverlayBatch {
                    file_index,
                    rows: Vec::new(),
                    report: ParseReport::failed(&file.name, &err),
                }
            }
        })
        .collect();
    OverlaySet::from_batches(batches)
}
