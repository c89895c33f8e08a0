//! Balances command - holdings and remaining lots at each year end

use crate::cmd::{process, styled, year_filter, year_label, EngineArgs, InputArgs};
use crate::core::decimal::{format_fiat, format_qty, ratio};
use crate::core::{AssetBalance, FinancialYear, FinancialYearBucket};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{Table, Tabled};

#[derive(Args, Debug)]
pub struct BalancesCommand {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    engine: EngineArgs,

    /// Financial year to show (e.g., 2025 for March 2024 to February 2025)
    #[arg(short, long)]
    year: Option<i32>,

    /// Filter by asset (e.g., XBT, ETH)
    #[arg(short, long)]
    asset: Option<String>,

    /// List each remaining lot instead of per-asset totals
    #[arg(long)]
    lots: bool,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Tabled)]
struct BalanceRow {
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Units")]
    units: String,
    #[tabled(rename = "Lot Units")]
    lot_units: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Avg Cost")]
    average_cost: String,
    #[tabled(rename = "Lots")]
    lots: usize,
}

#[derive(Debug, Clone, Tabled)]
struct LotRow {
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Lot Ref")]
    reference: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Unit Cost")]
    unit_cost: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Debug, Serialize)]
struct YearEndView<'a> {
    financial_year: FinancialYear,
    balances: Vec<&'a AssetBalance>,
}

impl BalancesCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (report, _) = process(&self.input, &self.engine)?;
        let year = year_filter(self.year);
        let buckets: Vec<&FinancialYearBucket> = match year {
            Some(y) => report.year(y).into_iter().collect(),
            None => report.years.iter().collect(),
        };
        let views = self.filter(&buckets);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&views)?);
            return Ok(());
        }

        if views.is_empty() {
            println!("No balances found matching filters ({})", year_label(year));
            return Ok(());
        }

        println!();
        println!("BALANCES AT YEAR END ({})", year_label(year));
        println!();
        for view in &views {
            println!(
                "{} ({} to {})",
                view.financial_year,
                view.financial_year.start_date().format("%Y-%m-%d"),
                view.financial_year.end_date().format("%Y-%m-%d")
            );
            let table = if self.lots {
                self.lot_table(view)
            } else {
                self.balance_table(view)
            };
            println!("{}", table);
            println!();
        }
        Ok(())
    }

    fn filter<'a>(&self, buckets: &[&'a FinancialYearBucket]) -> Vec<YearEndView<'a>> {
        let asset_filter = self.asset.as_deref();
        buckets
            .iter()
            .map(|&b| YearEndView {
                financial_year: b.year,
                balances: match asset_filter {
                    Some(asset) => b.balance(asset).into_iter().collect(),
                    None => b.balances.iter().collect(),
                },
            })
            .filter(|v| !v.balances.is_empty())
            .collect()
    }

    fn balance_table(&self, view: &YearEndView) -> String {
        let rows: Vec<BalanceRow> = view
            .balances
            .iter()
            .map(|b| {
                let lot_units: Decimal = b.lots.iter().map(|l| l.quantity).sum();
                BalanceRow {
                    asset: b.asset.clone(),
                    units: format_qty(b.units),
                    lot_units: format_qty(lot_units),
                    value: self.money(b.lot_value()),
                    average_cost: self.money(ratio(b.lot_value(), lot_units)),
                    lots: b.lots.len(),
                }
            })
            .collect();
        styled(Table::new(rows))
    }

    fn lot_table(&self, view: &YearEndView) -> String {
        let rows: Vec<LotRow> = view
            .balances
            .iter()
            .flat_map(|b| {
                b.lots.iter().map(|lot| LotRow {
                    asset: b.asset.clone(),
                    reference: lot.reference.clone(),
                    quantity: format_qty(lot.quantity),
                    unit_cost: self.money(lot.unit_cost),
                    value: self.money(lot.cost()),
                })
            })
            .collect();
        styled(Table::new(rows))
    }

    fn money(&self, amount: Decimal) -> String {
        format!("{} {}", format_fiat(amount), self.engine.currency)
    }
}
