//! Validate command - surface cost basis problems without writing reports

use crate::cmd::{process, year_filter, year_label, EngineArgs, InputArgs};
use crate::core::decimal::format_qty;
use crate::core::ledger::parse_timestamp;
use crate::core::{FinancialYear, Warning};
use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    engine: EngineArgs,

    /// Financial year to filter (e.g., 2025 for March 2024 to February 2025)
    #[arg(short, long)]
    year: Option<i32>,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// A validation issue for output
#[derive(Debug, Clone, Serialize)]
struct ValidationIssue {
    #[serde(rename = "type")]
    issue_type: &'static str,
    timestamp: String,
    asset: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ValidationOutput<'a> {
    financial_year: String,
    issue_count: usize,
    issues: &'a [ValidationIssue],
}

impl ValidateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (report, _) = process(&self.input, &self.engine)?;
        let year = year_filter(self.year);

        let issues: Vec<ValidationIssue> = report
            .warnings
            .iter()
            .filter(|w| year.is_none_or(|y| warning_date(w).is_some_and(|d| y.contains(d))))
            .map(|w| ValidationIssue {
                issue_type: warning_type_name(w),
                timestamp: w.timestamp().to_string(),
                asset: w.asset().to_string(),
                message: warning_message(w),
            })
            .collect();

        if self.json {
            let output = ValidationOutput {
                financial_year: year_label(year),
                issue_count: issues.len(),
                issues: &issues,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_text(&issues, year);
        }

        if !issues.is_empty() {
            std::process::exit(1);
        }
        Ok(())
    }
}

fn print_text(issues: &[ValidationIssue], year: Option<FinancialYear>) {
    println!();
    println!("VALIDATION RESULTS ({})", year_label(year));
    println!();

    if issues.is_empty() {
        println!("\u{2713} No issues found.");
        return;
    }

    println!("\u{26A0} {} issue(s) found:", issues.len());
    println!();
    for (i, issue) in issues.iter().enumerate() {
        println!(
            "  {}. [{}] {} {}",
            i + 1,
            issue.issue_type,
            issue.timestamp,
            issue.asset
        );
        println!("     {}", issue.message);
        println!();
    }
}

fn warning_date(warning: &Warning) -> Option<NaiveDate> {
    parse_timestamp(warning.timestamp()).ok().map(|dt| dt.date())
}

fn warning_type_name(warning: &Warning) -> &'static str {
    match warning {
        Warning::InsufficientCostBasis { available, .. } if available.is_zero() => "NoCostBasis",
        Warning::InsufficientCostBasis { .. } => "InsufficientCostBasis",
        Warning::MatchedLotMissing { .. } => "MatchedLotMissing",
    }
}

fn warning_message(warning: &Warning) -> String {
    match warning {
        Warning::InsufficientCostBasis {
            reference,
            available,
            required,
            ..
        } => {
            if available.is_zero() {
                format!(
                    "{reference}: no lots held for an outflow of {} - zero cost basis used",
                    format_qty(*required)
                )
            } else {
                format!(
                    "{reference}: lots only held {} of {} - excess has zero cost basis",
                    format_qty(*available),
                    format_qty(*required)
                )
            }
        }
        Warning::MatchedLotMissing { lot_reference, .. } => {
            format!("Matched buy {lot_reference} was already consumed - FIFO order used instead")
        }
    }
}
