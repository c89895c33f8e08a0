use super::{csv_writer, opt_fiat, ReportError, ReportOptions};
use crate::core::decimal::{format_fiat, format_qty, round_fiat};
use crate::core::ledger::TIMESTAMP_FORMAT;
use crate::core::{FinancialYearBucket, LedgerRow};
use rust_decimal::Decimal;
use std::io::Write;

/// Sectioned report for one financial year:
/// boughts, solds, buys for others, others, closing balances, then fees by
/// category. Sections are separated by blank lines.
pub fn write_fy_report<W: Write>(
    bucket: &FinancialYearBucket,
    options: &ReportOptions,
    mut out: W,
) -> Result<(), ReportError> {
    let year = bucket.year.0.to_string();

    activity_section(&mut out, "Boughts for FY", &year, "Qty Bought", &bucket.buys, options)?;
    writeln!(out)?;
    activity_section(&mut out, "Solds for FY", &year, "Qty Sold", &bucket.sells, options)?;
    writeln!(out)?;
    activity_section(
        &mut out,
        "Buys for Others FY",
        &year,
        "Qty Bought",
        &bucket.buys_for_others,
        options,
    )?;
    writeln!(out)?;
    let others: Vec<LedgerRow> = bucket.non_sales().into_iter().cloned().collect();
    activity_section(&mut out, "Others for FY", &year, "Qty Other", &others, options)?;
    writeln!(out)?;

    balances_section(&mut out, bucket, &year, options)?;
    fee_sections(&mut out, bucket, options)?;
    Ok(())
}

fn activity_section<W: Write>(
    out: &mut W,
    title: &str,
    year: &str,
    qty_header: &str,
    rows: &[LedgerRow],
    options: &ReportOptions,
) -> Result<(), ReportError> {
    let mut wtr = csv_writer(out);
    wtr.write_record([title, year])?;
    wtr.write_record([
        "Date".to_string(),
        "Currency".to_string(),
        "Description".to_string(),
        "Trans Ref".to_string(),
        "Lot Ref".to_string(),
        qty_header.to_string(),
        options.fiat("Unit Cost"),
        options.fiat("Total Cost"),
        options.fiat("Proceeds"),
        options.fiat("Profit"),
        options.fiat("Fee"),
    ])?;
    for row in rows {
        wtr.write_record([
            row.datetime.format(TIMESTAMP_FORMAT).to_string(),
            row.asset.clone(),
            row.description.clone(),
            row.trans_ref.clone(),
            row.lot_reference.clone(),
            format_qty(row.quantity),
            opt_fiat(row.unit_cost),
            opt_fiat(row.cost.map(|c| c.abs())),
            opt_fiat(row.proceeds),
            opt_fiat(row.profit),
            opt_fiat(row.fee),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// One total row per asset, then a row per remaining lot. Values use the
/// rounded unit cost so lot rows add up to the total row.
fn balances_section<W: Write>(
    out: &mut W,
    bucket: &FinancialYearBucket,
    year: &str,
    options: &ReportOptions,
) -> Result<(), ReportError> {
    let mut wtr = csv_writer(out);
    wtr.write_record(["Balances at end of FY", year])?;
    wtr.write_record([
        "Currency".to_string(),
        "Total Units".to_string(),
        options.fiat("Total Value"),
        "Lot Ref".to_string(),
        "Lot Qty".to_string(),
        options.fiat("Lot Unit Cost"),
        options.fiat("Lot Total Value"),
    ])?;
    for balance in &bucket.balances {
        let total_value: Decimal = balance
            .lots
            .iter()
            .map(|lot| lot.quantity * round_fiat(lot.unit_cost))
            .sum();
        wtr.write_record([
            balance.asset.clone(),
            format_qty(balance.units),
            format_fiat(total_value),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ])?;
        for lot in &balance.lots {
            wtr.write_record([
                balance.asset.clone(),
                String::new(),
                String::new(),
                lot.reference.clone(),
                format_qty(lot.quantity),
                format_fiat(lot.unit_cost),
                format_fiat(lot.quantity * round_fiat(lot.unit_cost)),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

fn fee_sections<W: Write>(
    out: &mut W,
    bucket: &FinancialYearBucket,
    options: &ReportOptions,
) -> Result<(), ReportError> {
    for (category, fees) in bucket.fees_by_category() {
        {
            let mut wtr = csv_writer(&mut *out);
            wtr.write_record([format!("{category} Fees")])?;
            wtr.write_record([
                "Date".to_string(),
                "Description".to_string(),
                "Trans Ref".to_string(),
                "Lot Ref".to_string(),
                options.fiat("Fee"),
            ])?;
            let mut total = Decimal::ZERO;
            for fee in &fees {
                // the total adds the amounts as printed
                total += round_fiat(fee.amount);
                wtr.write_record([
                    fee.datetime.format(TIMESTAMP_FORMAT).to_string(),
                    fee.description.clone(),
                    fee.trans_ref.clone(),
                    String::new(),
                    format_fiat(fee.amount),
                ])?;
            }
            wtr.write_record([
                format!("Total {category} Fees"),
                String::new(),
                String::new(),
                String::new(),
                format_fiat(total),
            ])?;
            wtr.flush()?;
        }
        writeln!(out)?;
    }
    Ok(())
}
