use super::decimal::{parse_decimal, ParseDecimalError};
use chrono::{NaiveDate, NaiveDateTime};
use fifotax_derive::CsvSchema;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{source_name}:{line}: {error}")]
    Parse {
        source_name: String,
        line: u64,
        error: ParseError,
    },
    #[error("{source_name}: malformed CSV: {error}")]
    Csv {
        source_name: String,
        error: csv::Error,
    },
    #[error("{path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Decimal(#[from] ParseDecimalError),
    #[error("invalid timestamp {0:?} (expected YYYY-MM-DD HH:MM:SS)")]
    Timestamp(String),
}

/// Column description produced by `#[derive(CsvSchema)]`
#[derive(Debug, Clone, Copy)]
pub struct CsvField {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

/// One row of an exported exchange ledger
#[derive(Debug, Clone, Serialize, Deserialize, CsvSchema)]
pub struct LedgerRecord {
    /// When the movement happened, UTC (YYYY-MM-DD HH:MM:SS)
    #[serde(rename = "Timestamp (UTC)")]
    pub timestamp: String,
    /// Asset symbol (e.g. XBT, ETH)
    #[serde(rename = "Currency")]
    pub currency: String,
    /// Free text; drives buy/sell/fee classification
    #[serde(rename = "Description")]
    pub description: String,
    /// Exchange reference, used as the lot reference for buys
    #[serde(rename = "Reference")]
    pub reference: Option<String>,
    /// Signed change in asset units
    #[serde(rename = "Balance delta")]
    pub balance_delta: String,
    /// Fiat value of the movement
    #[serde(rename = "Value amount")]
    pub value_amount: String,
}

/// A parsed ledger movement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub datetime: NaiveDateTime,
    pub asset: String,
    pub description: String,
    pub reference: String,
    pub quantity: Decimal,
    pub value: Decimal,
}

impl LedgerEntry {
    pub fn date(&self) -> NaiveDate {
        self.datetime.date()
    }

    pub fn timestamp(&self) -> String {
        self.datetime.format(TIMESTAMP_FORMAT).to_string()
    }
}

impl TryFrom<LedgerRecord> for LedgerEntry {
    type Error = ParseError;

    fn try_from(record: LedgerRecord) -> Result<Self, Self::Error> {
        let datetime = parse_timestamp(&record.timestamp)?;
        let quantity = parse_decimal("Balance delta", &record.balance_delta)?;
        let value = parse_decimal("Value amount", &record.value_amount)?;
        Ok(LedgerEntry {
            datetime,
            asset: record.currency.trim().to_string(),
            description: record.description,
            reference: record.reference.unwrap_or_default(),
            quantity,
            value,
        })
    }
}

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map_err(|_| ParseError::Timestamp(s.to_string()))
}

/// Read ledger rows from CSV in file order. `source_name` labels errors.
pub fn read_csv<R: Read>(reader: R, source_name: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
    let csv_err = |error| LedgerError::Csv {
        source_name: source_name.to_string(),
        error,
    };
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = rdr.headers().map_err(csv_err)?.clone();
    let mut entries = Vec::new();
    for result in rdr.records() {
        let raw = result.map_err(csv_err)?;
        let line = raw.position().map_or(0, |p| p.line());
        let record: LedgerRecord = raw.deserialize(Some(&headers)).map_err(csv_err)?;
        let entry = LedgerEntry::try_from(record).map_err(|error| LedgerError::Parse {
            source_name: source_name.to_string(),
            line,
            error,
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Load every ledger file reachable from `paths` and sort the combined rows
/// chronologically. Rows with equal timestamps keep their input order.
pub fn load_ledger(paths: &[PathBuf]) -> Result<Vec<LedgerEntry>, LedgerError> {
    let mut entries = Vec::new();
    for file in ledger_files(paths)? {
        let reader = File::open(&file).map_err(|error| LedgerError::Io {
            path: file.clone(),
            error,
        })?;
        let mut rows = read_csv(BufReader::new(reader), &file.display().to_string())?;
        log::debug!("Read {} rows from {}", rows.len(), file.display());
        entries.append(&mut rows);
    }
    sort_chronologically(&mut entries);
    Ok(entries)
}

pub fn sort_chronologically(entries: &mut [LedgerEntry]) {
    entries.sort_by_key(|e| e.datetime);
}

/// Expand directories to the `*.csv` files they contain, in name order.
fn ledger_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, LedgerError> {
    let mut files = Vec::new();
    for path in paths {
        let io_err = |error| LedgerError::Io {
            path: path.clone(),
            error,
        };
        if path.is_dir() {
            let mut dir_files = Vec::new();
            for entry in std::fs::read_dir(path).map_err(io_err)? {
                let entry_path = entry.map_err(io_err)?.path();
                if entry_path.is_file() && is_csv(&entry_path) {
                    dir_files.push(entry_path);
                }
            }
            dir_files.sort();
            files.append(&mut dir_files);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(io_err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file or directory",
            )));
        }
    }
    Ok(files)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}
