//! Flat-file persistence of the benchmark rate table.
//!
//! Persisted columns:
//! `Calculation Date,SOFR,Daily Calculated Blended HIBOR,SOFR Date,Effective Blended HIBOR for SME`.
//! Dates are written as ISO `YYYY-MM-DD`; blank rate cells stay blank.

use crate::core::dates::{format_iso, parse_stored_date};
use crate::rates::table::{MergeOutcome, RateRecord, RateTable};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::info;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const CALCULATION_DATE: &str = "Calculation Date";
pub const SOFR: &str = "SOFR";
pub const HIBOR: &str = "Daily Calculated Blended HIBOR";
pub const SOFR_DATE: &str = "SOFR Date";
pub const EFFECTIVE_HIBOR_SME: &str = "Effective Blended HIBOR for SME";
pub const RECORD_DATE: &str = "Record Date";

/// Headers of the uploaded rate sheet that map onto persisted columns.
const UPLOAD_RENAMES: &[(&str, &str)] = &[("SOFR (SME)", SOFR), ("HIBOR (SME)", HIBOR)];

/// Errors arising from loading, importing or persisting rates.
#[derive(Debug, Error)]
pub enum RateError {
    #[error("I/O error on rate table: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error in rate table: {0}")]
    Csv(#[from] csv::Error),

    #[error("rate sheet is missing required column '{column}'")]
    MissingColumn { column: &'static str },

    #[error("row {row}: invalid date '{value}'")]
    InvalidDate { row: usize, value: String },

    #[error("row {row}: invalid rate '{value}' in column '{column}'")]
    InvalidRate {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("rate sheet contains no rows")]
    EmptyUpdate,
}

/// Positions of the known columns in a header row.
struct ColumnIndex {
    date: usize,
    sofr: usize,
    hibor: usize,
    sofr_date: Option<usize>,
    effective_hibor: Option<usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord, renames: &[(&str, &str)]) -> Result<Self, RateError> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| {
                let h = h.trim();
                renames
                    .iter()
                    .find(|(from, _)| *from == h)
                    .map(|(_, to)| to.to_string())
                    .unwrap_or_else(|| h.to_string())
            })
            .collect();
        let find = |column: &'static str| names.iter().position(|n| n == column);
        let require =
            |column: &'static str| find(column).ok_or(RateError::MissingColumn { column });

        Ok(Self {
            date: require(CALCULATION_DATE)?,
            sofr: require(SOFR)?,
            hibor: require(HIBOR)?,
            sofr_date: find(SOFR_DATE),
            effective_hibor: find(EFFECTIVE_HIBOR_SME),
        })
    }
}

fn cell(record: &StringRecord, index: usize) -> &str {
    record.get(index).map(str::trim).unwrap_or("")
}

fn parse_rate(
    record: &StringRecord,
    index: usize,
    row: usize,
    column: &'static str,
) -> Result<Option<Decimal>, RateError> {
    let raw = cell(record, index);
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map(Some)
        .map_err(|_| RateError::InvalidRate {
            row,
            column,
            value: raw.to_string(),
        })
}

fn parse_optional_date(record: &StringRecord, index: Option<usize>) -> Option<NaiveDate> {
    index.and_then(|i| parse_stored_date(cell(record, i)))
}

/// Read rate rows from any CSV source with a header row.
///
/// Rows whose calculation date is blank are dropped; a date that is present
/// but unreadable fails the whole read.
fn read_records<R: Read>(
    reader: R,
    renames: &[(&str, &str)],
) -> Result<Vec<RateRecord>, RateError> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns = ColumnIndex::from_headers(rdr.headers()?, renames)?;

    let mut records = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        let row = i + 2;
        let raw_date = cell(&record, columns.date);
        if raw_date.is_empty() {
            continue;
        }
        let calculation_date =
            parse_stored_date(raw_date).ok_or_else(|| RateError::InvalidDate {
                row,
                value: raw_date.to_string(),
            })?;
        records.push(RateRecord {
            calculation_date,
            sofr_rate: parse_rate(&record, columns.sofr, row, SOFR)?,
            hibor_rate: parse_rate(&record, columns.hibor, row, HIBOR)?,
            sofr_date: parse_optional_date(&record, columns.sofr_date),
            effective_hibor_sme: match columns.effective_hibor {
                Some(idx) => parse_rate(&record, idx, row, EFFECTIVE_HIBOR_SME)?,
                None => None,
            },
        });
    }
    Ok(records)
}

fn opt_decimal(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn opt_date(value: Option<NaiveDate>) -> String {
    value.map(format_iso).unwrap_or_default()
}

/// Write the full persisted table to any sink.
pub fn write_table<W: Write>(writer: W, table: &RateTable) -> Result<(), RateError> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record([CALCULATION_DATE, SOFR, HIBOR, SOFR_DATE, EFFECTIVE_HIBOR_SME])?;
    for r in table.records() {
        wtr.write_record([
            format_iso(r.calculation_date),
            opt_decimal(r.sofr_rate),
            opt_decimal(r.hibor_rate),
            opt_date(r.sofr_date),
            opt_decimal(r.effective_hibor_sme),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a persisted table from any source.
pub fn read_table<R: Read>(reader: R) -> Result<RateTable, RateError> {
    Ok(RateTable::from_records(read_records(reader, &[])?))
}

/// Read an uploaded rate sheet, accepting the `SOFR (SME)` / `HIBOR (SME)`
/// headers used by the treasury export.
pub fn read_update_sheet<R: Read>(reader: R) -> Result<Vec<RateRecord>, RateError> {
    let mut records = read_records(reader, UPLOAD_RENAMES)?;
    if records.is_empty() {
        return Err(RateError::EmptyUpdate);
    }
    records.sort_by_key(|r| r.calculation_date);
    Ok(records)
}

/// SOFR view: `Calculation Date,SOFR,SOFR Date`.
pub fn write_sofr_export<W: Write>(writer: W, table: &RateTable) -> Result<usize, RateError> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record([CALCULATION_DATE, SOFR, SOFR_DATE])?;
    let mut rows = 0;
    for r in table.records() {
        wtr.write_record([
            format_iso(r.calculation_date),
            opt_decimal(r.sofr_rate),
            opt_date(r.sofr_date),
        ])?;
        rows += 1;
    }
    wtr.flush()?;
    Ok(rows)
}

/// HIBOR view for dates strictly after `cutoff`, keyed by `Record Date`.
pub fn write_hibor_export<W: Write>(
    writer: W,
    table: &RateTable,
    cutoff: NaiveDate,
) -> Result<usize, RateError> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record([RECORD_DATE, HIBOR, EFFECTIVE_HIBOR_SME])?;
    let mut rows = 0;
    for r in table.records().filter(|r| r.calculation_date > cutoff) {
        wtr.write_record([
            format_iso(r.calculation_date),
            opt_decimal(r.hibor_rate),
            opt_decimal(r.effective_hibor_sme),
        ])?;
        rows += 1;
    }
    wtr.flush()?;
    Ok(rows)
}

/// The persisted rate table on disk.
///
/// Writes go to a sibling temporary file that is renamed over the target, so
/// a failed update leaves the previous file in place.
#[derive(Debug, Clone)]
pub struct RateStore {
    path: PathBuf,
}

impl RateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<RateTable, RateError> {
        let table = read_table(File::open(&self.path)?)?;
        info!(
            "loaded {} rate rows from {} (last date {})",
            table.len(),
            self.path.display(),
            table
                .max_date()
                .map(format_iso)
                .unwrap_or_else(|| "none".to_string())
        );
        Ok(table)
    }

    /// Replace the stored table with `table`.
    pub fn persist(&self, table: &RateTable) -> Result<(), RateError> {
        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        let written = File::create(&tmp)
            .map_err(RateError::from)
            .and_then(|file| write_table(file, table));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &self.path)?;
        info!("persisted {} rate rows to {}", table.len(), self.path.display());
        Ok(())
    }

    /// Merge an uploaded sheet into `current` and persist the result.
    ///
    /// On any error nothing is written and `current` stays authoritative.
    pub fn apply_update<R: Read>(
        &self,
        current: &RateTable,
        sheet: R,
    ) -> Result<MergeOutcome, RateError> {
        let update = read_update_sheet(sheet)?;
        let outcome = current.merge(update);
        self.persist(&outcome.table)?;
        info!(
            "rate update: {} new dates, {} stale rows ignored",
            outcome.added, outcome.skipped
        );
        Ok(outcome)
    }
}
