//! CSV report writers: one running ledger per asset, one sectioned report per
//! financial year, and an overview across years.

mod fy;
mod ledger;
mod overview;

pub use fy::write_fy_report;
pub use ledger::write_asset_ledger;
pub use overview::{write_overview, GainLossTotals, YearOverview};

use crate::core::FifoReport;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const OVERVIEW_FILE: &str = "overview_report.csv";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{path}: {error}")]
    File {
        path: PathBuf,
        error: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    /// Fiat label used in column headers, e.g. "Proceeds (ZAR)"
    pub currency: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            currency: "ZAR".to_string(),
        }
    }
}

impl ReportOptions {
    fn fiat(&self, label: &str) -> String {
        format!("{label} ({})", self.currency)
    }
}

pub fn asset_ledger_file(asset: &str) -> String {
    format!("{asset}_fifo.csv")
}

pub fn fy_report_file(year: crate::core::FinancialYear) -> String {
    format!("fy{}_report.csv", year.0)
}

/// Write every report for `report` into `dir`, returning the files written.
pub fn write_all(report: &FifoReport, options: &ReportOptions, dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
    std::fs::create_dir_all(dir).map_err(|error| ReportError::File {
        path: dir.to_path_buf(),
        error,
    })?;
    let mut written = Vec::new();

    for asset in report.assets() {
        let path = dir.join(asset_ledger_file(asset));
        let rows: Vec<_> = report.rows_for(asset).collect();
        with_file(&path, |out| write_asset_ledger(&rows, options, out))?;
        written.push(path);
    }

    for bucket in &report.years {
        let path = dir.join(fy_report_file(bucket.year));
        with_file(&path, |out| write_fy_report(bucket, options, out))?;
        written.push(path);
    }

    let overviews = YearOverview::from_report(report);
    let path = dir.join(OVERVIEW_FILE);
    with_file(&path, |out| write_overview(&overviews, options, out))?;
    written.push(path);

    for path in &written {
        log::info!("Wrote {}", path.display());
    }
    Ok(written)
}

fn with_file<F>(path: &Path, write: F) -> Result<(), ReportError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), ReportError>,
{
    let file = File::create(path).map_err(|error| ReportError::File {
        path: path.to_path_buf(),
        error,
    })?;
    let mut out = BufWriter::new(file);
    write(&mut out)?;
    out.flush().map_err(|error| ReportError::File {
        path: path.to_path_buf(),
        error,
    })
}

fn csv_writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().flexible(true).from_writer(out)
}

fn opt_fiat(value: Option<rust_decimal::Decimal>) -> String {
    value.map(crate::core::decimal::format_fiat).unwrap_or_default()
}
