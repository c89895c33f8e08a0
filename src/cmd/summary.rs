//! Summary command - gains, losses and closing value per financial year

use crate::cmd::{process, styled, year_filter, year_label, EngineArgs, InputArgs};
use crate::core::decimal::{format_fiat, format_qty};
use crate::report::YearOverview;
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{Table, Tabled};

#[derive(Args, Debug)]
pub struct SummaryCommand {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    engine: EngineArgs,

    /// Financial year to report (e.g., 2025 for March 2024 to February 2025)
    #[arg(short, long)]
    year: Option<i32>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Tabled)]
struct SummaryRow {
    #[tabled(rename = "FY")]
    year: String,
    #[tabled(rename = "Gains")]
    gains: String,
    #[tabled(rename = "Losses")]
    losses: String,
    #[tabled(rename = "Net")]
    net: String,
    #[tabled(rename = "Proceeds")]
    proceeds: String,
    #[tabled(rename = "Base Cost")]
    cost: String,
    #[tabled(rename = "Closing Value")]
    closing_value: String,
}

#[derive(Debug, Clone, Tabled)]
struct HoldingRow {
    #[tabled(rename = "FY")]
    year: String,
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Units")]
    units: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Debug, Serialize)]
struct SummaryOutput<'a> {
    financial_year: String,
    currency: &'a str,
    years: Vec<&'a YearOverview>,
    net_total: Decimal,
    warning_count: usize,
}

impl SummaryCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (report, _) = process(&self.input, &self.engine)?;
        let year = year_filter(self.year);
        let overviews = YearOverview::from_report(&report);
        let selected: Vec<&YearOverview> = overviews
            .iter()
            .filter(|o| year.is_none_or(|y| o.year == y))
            .collect();

        if self.json {
            let output = SummaryOutput {
                financial_year: year_label(year),
                currency: &self.engine.currency,
                net_total: selected.iter().map(|o| o.net()).sum(),
                years: selected,
                warning_count: report.warnings.len(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        println!();
        println!("GAINS SUMMARY ({}) - {}", year_label(year), self.engine.currency);
        println!();

        if selected.is_empty() {
            println!("No sales or holdings found");
            return Ok(());
        }

        let rows: Vec<SummaryRow> = selected
            .iter()
            .map(|o| SummaryRow {
                year: o.year.to_string(),
                gains: format_fiat(o.gains.profit),
                losses: format_fiat(o.losses.profit),
                net: format_fiat(o.net()),
                proceeds: format_fiat(o.gains.proceeds + o.losses.proceeds),
                cost: format_fiat(o.gains.cost + o.losses.cost),
                closing_value: format_fiat(o.total_value()),
            })
            .collect();
        println!("{}", styled(Table::new(rows)));

        let holdings: Vec<HoldingRow> = selected
            .iter()
            .flat_map(|o| {
                o.balances.iter().map(|(asset, (units, value))| HoldingRow {
                    year: o.year.to_string(),
                    asset: asset.clone(),
                    units: format_qty(*units),
                    value: format_fiat(*value),
                })
            })
            .collect();
        if !holdings.is_empty() {
            println!();
            println!("Holdings at year end");
            println!("{}", styled(Table::new(holdings)));
        }

        if selected.len() > 1 {
            let net: Decimal = selected.iter().map(|o| o.net()).sum();
            println!();
            println!("Net gain/loss across years: {}", format_fiat(net));
        }
        if !report.warnings.is_empty() {
            println!();
            println!(
                "Note: {} warning(s) affect these figures (see `fifotax validate`)",
                report.warnings.len()
            );
        }
        Ok(())
    }
}
