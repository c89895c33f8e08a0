use super::{csv_writer, opt_fiat, ReportError, ReportOptions};
use crate::core::decimal::{format_fiat, format_qty};
use crate::core::LedgerRow;
use std::io::Write;

/// Running ledger for one asset: every row with the balance after it.
pub fn write_asset_ledger<W: Write>(
    rows: &[&LedgerRow],
    options: &ReportOptions,
    out: W,
) -> Result<(), ReportError> {
    let mut wtr = csv_writer(out);
    wtr.write_record([
        "Financial Year".to_string(),
        "Trans Ref".to_string(),
        "Date".to_string(),
        "Description".to_string(),
        "Type".to_string(),
        "Lot Reference".to_string(),
        "Qty Change".to_string(),
        options.fiat("Unit Cost"),
        options.fiat("Total Cost"),
        options.fiat("Proceeds"),
        options.fiat("Profit"),
        options.fiat("Fee"),
        "Balance Units".to_string(),
        options.fiat("Balance Value"),
    ])?;
    for row in rows {
        wtr.write_record([
            row.financial_year.0.to_string(),
            row.trans_ref.clone(),
            row.datetime.format(crate::core::ledger::TIMESTAMP_FORMAT).to_string(),
            row.description.clone(),
            row.kind.display().to_string(),
            row.lot_reference.clone(),
            format_qty(row.quantity),
            opt_fiat(row.unit_cost),
            opt_fiat(row.cost.map(|c| c.abs())),
            opt_fiat(row.proceeds),
            opt_fiat(row.profit),
            opt_fiat(row.fee),
            format_qty(row.balance_units),
            format_fiat(row.balance_value),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
