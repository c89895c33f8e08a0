use super::{csv_writer, ReportError, ReportOptions};
use crate::core::decimal::{format_fiat, format_qty, round_fiat};
use crate::core::{FifoReport, FinancialYear, FinancialYearBucket};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

/// Proceeds, base cost and gain or loss over a set of sale splits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GainLossTotals {
    pub proceeds: Decimal,
    pub cost: Decimal,
    pub profit: Decimal,
}

impl GainLossTotals {
    fn add(&mut self, proceeds: Decimal, cost: Decimal, profit: Decimal) {
        self.proceeds += proceeds;
        self.cost += cost;
        self.profit += profit;
    }
}

/// One financial year of the overview. Figures are built from the rounded
/// amounts shown in the year's report so the two always agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearOverview {
    pub year: FinancialYear,
    pub losses: GainLossTotals,
    pub gains: GainLossTotals,
    /// Closing units and lot value per asset
    pub balances: BTreeMap<String, (Decimal, Decimal)>,
}

impl YearOverview {
    pub fn from_bucket(bucket: &FinancialYearBucket) -> Self {
        let mut losses = GainLossTotals::default();
        let mut gains = GainLossTotals::default();
        for sale in &bucket.sells {
            let proceeds = round_fiat(sale.proceeds.unwrap_or_default());
            let cost = round_fiat(sale.cost.unwrap_or_default().abs());
            let profit = round_fiat(sale.profit.unwrap_or_default());
            if profit < Decimal::ZERO {
                losses.add(proceeds, cost, profit);
            } else if profit > Decimal::ZERO {
                gains.add(proceeds, cost, profit);
            }
        }

        let balances = bucket
            .balances
            .iter()
            .map(|b| {
                let value: Decimal = b
                    .lots
                    .iter()
                    .map(|lot| lot.quantity * round_fiat(lot.unit_cost))
                    .sum();
                (b.asset.clone(), (b.units, round_fiat(value)))
            })
            .collect();

        YearOverview {
            year: bucket.year,
            losses,
            gains,
            balances,
        }
    }

    pub fn from_report(report: &FifoReport) -> Vec<Self> {
        report.years.iter().map(YearOverview::from_bucket).collect()
    }

    pub fn net(&self) -> Decimal {
        self.losses.profit + self.gains.profit
    }

    pub fn total_value(&self) -> Decimal {
        self.balances.values().map(|(_, value)| *value).sum()
    }
}

/// One row per financial year with gain and loss totals and closing balances.
/// Asset columns cover every asset seen in any year.
pub fn write_overview<W: Write>(
    overviews: &[YearOverview],
    options: &ReportOptions,
    out: W,
) -> Result<(), ReportError> {
    let assets: BTreeSet<&str> = overviews
        .iter()
        .flat_map(|o| o.balances.keys().map(String::as_str))
        .collect();

    let mut header = vec![
        "FY".to_string(),
        options.fiat("Losses Proceeds"),
        options.fiat("Losses Base Cost"),
        options.fiat("Losses Gain/Loss"),
        options.fiat("Gains Proceeds"),
        options.fiat("Gains Base Cost"),
        options.fiat("Gains Gain/Loss"),
        options.fiat("Net Gain/Loss"),
        options.fiat("Total Coin Value"),
    ];
    for asset in &assets {
        header.push(format!("{asset} Units"));
        header.push(options.fiat(&format!("{asset} Value")));
    }

    let mut wtr = csv_writer(out);
    wtr.write_record(&header)?;
    for overview in overviews {
        let mut record = vec![
            overview.year.0.to_string(),
            format_fiat(overview.losses.proceeds),
            format_fiat(overview.losses.cost),
            format_fiat(overview.losses.profit),
            format_fiat(overview.gains.proceeds),
            format_fiat(overview.gains.cost),
            format_fiat(overview.gains.profit),
            format_fiat(overview.net()),
            format_fiat(overview.total_value()),
        ];
        for asset in &assets {
            let (units, value) = overview
                .balances
                .get(*asset)
                .copied()
                .unwrap_or_default();
            record.push(format_qty(units));
            record.push(format_fiat(value));
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}
