use super::classify::{classify, ClassifierConfig, TxKind};
use super::decimal::EPSILON;
use super::disposal::{dispose, DisposalRequest, OtherProceeds, SplitSource, Treatment};
use super::fy::FinancialYear;
use super::inventory::{Inventory, Lot};
use super::ledger::LedgerEntry;
use super::matcher::BuyForOthersMapping;
use super::warnings::Warning;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub other_proceeds: OtherProceeds,
}

/// Fee grouping, taken from the transaction the fee follows.
/// Ordered the way fee sections appear in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FeeCategory {
    Buying,
    Other,
    Selling,
}

impl FeeCategory {
    fn after(kind: Option<TxKind>) -> Self {
        match kind {
            Some(TxKind::Buy) => FeeCategory::Buying,
            Some(TxKind::Sell) => FeeCategory::Selling,
            _ => FeeCategory::Other,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            FeeCategory::Buying => "Buying",
            FeeCategory::Other => "Other",
            FeeCategory::Selling => "Selling",
        }
    }
}

impl std::fmt::Display for FeeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// One line of an asset's running ledger. `None` fields render blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRow {
    pub financial_year: FinancialYear,
    pub asset: String,
    pub trans_ref: String,
    pub datetime: NaiveDateTime,
    pub description: String,
    pub kind: TxKind,
    pub lot_reference: String,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub proceeds: Option<Decimal>,
    pub profit: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub balance_units: Decimal,
    pub balance_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeRecord {
    pub category: FeeCategory,
    pub datetime: NaiveDateTime,
    pub asset: String,
    /// "Fee for <description of the preceding transaction>"
    pub description: String,
    /// Reference of the preceding transaction
    pub trans_ref: String,
    pub quantity: Decimal,
    pub amount: Decimal,
}

/// Holdings of one asset at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetBalance {
    pub asset: String,
    /// Lot units plus units held outside lots (fees, credits, shortfalls)
    pub units: Decimal,
    pub value: Decimal,
    pub lots: Vec<Lot>,
}

impl AssetBalance {
    /// Value of the remaining lots
    pub fn lot_value(&self) -> Decimal {
        self.lots.iter().map(Lot::cost).sum()
    }
}

/// Everything that happened in one financial year, plus the balances at its
/// close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinancialYearBucket {
    pub year: FinancialYear,
    pub buys: Vec<LedgerRow>,
    pub buys_for_others: Vec<LedgerRow>,
    pub sells: Vec<LedgerRow>,
    pub transfers: Vec<LedgerRow>,
    pub others: Vec<LedgerRow>,
    pub fees: Vec<FeeRecord>,
    pub balances: Vec<AssetBalance>,
}

impl FinancialYearBucket {
    fn new(year: FinancialYear) -> Self {
        FinancialYearBucket {
            year,
            buys: Vec::new(),
            buys_for_others: Vec::new(),
            sells: Vec::new(),
            transfers: Vec::new(),
            others: Vec::new(),
            fees: Vec::new(),
            balances: Vec::new(),
        }
    }

    /// Non-sale movements (credits, outflows, custodial transfers) in time
    /// order.
    pub fn non_sales(&self) -> Vec<&LedgerRow> {
        let mut rows: Vec<_> = self.transfers.iter().chain(self.others.iter()).collect();
        rows.sort_by_key(|r| r.datetime);
        rows
    }

    pub fn fees_by_category(&self) -> BTreeMap<FeeCategory, Vec<&FeeRecord>> {
        let mut categories: BTreeMap<FeeCategory, Vec<&FeeRecord>> = BTreeMap::new();
        for fee in &self.fees {
            categories.entry(fee.category).or_default().push(fee);
        }
        categories
    }

    /// Closing balance of `asset`, ignoring ASCII case
    pub fn balance(&self, asset: &str) -> Option<&AssetBalance> {
        self.balances.iter().find(|b| b.asset.eq_ignore_ascii_case(asset))
    }
}

/// Per-asset sequential transaction references: B_XBT_000, S_XBT_000, ...
#[derive(Debug, Clone, Default)]
struct TransactionIds {
    buys: u32,
    sells: u32,
    others: u32,
}

impl TransactionIds {
    fn next(&mut self, asset: &str, kind: TxKind) -> String {
        let (prefix, counter) = match kind {
            TxKind::Buy => ("B", &mut self.buys),
            TxKind::Sell => ("S", &mut self.sells),
            _ => ("O", &mut self.others),
        };
        let id = format!("{prefix}_{}_{:03}", asset.to_uppercase(), counter);
        *counter += 1;
        id
    }
}

/// The most recent non-fee transaction, which a following fee is charged for
#[derive(Debug, Clone, Default)]
struct LastTransaction {
    kind: Option<TxKind>,
    description: String,
    trans_ref: String,
}

#[derive(Debug, Clone)]
struct AssetState {
    inventory: Inventory,
    off_book_units: Decimal,
    off_book_value: Decimal,
    ids: TransactionIds,
    last: LastTransaction,
}

impl AssetState {
    fn new(asset: &str) -> Self {
        AssetState {
            inventory: Inventory::new(asset),
            off_book_units: Decimal::ZERO,
            off_book_value: Decimal::ZERO,
            ids: TransactionIds::default(),
            last: LastTransaction::default(),
        }
    }

    fn units(&self) -> Decimal {
        self.inventory.units() + self.off_book_units
    }

    fn value(&self) -> Decimal {
        self.inventory.value() + self.off_book_value
    }

    fn balance(&self) -> AssetBalance {
        debug_assert!((self.inventory.units() - self.inventory.lot_units()).abs() <= EPSILON);
        AssetBalance {
            asset: self.inventory.asset().to_string(),
            units: self.units(),
            value: self.value(),
            lots: self.inventory.snapshot(),
        }
    }

    fn remember(&mut self, kind: TxKind, description: &str, trans_ref: &str) {
        self.last = LastTransaction {
            kind: Some(kind),
            description: description.to_string(),
            trans_ref: trans_ref.to_string(),
        };
    }
}

/// Result of running a ledger through the lot inventory
#[derive(Debug, Clone, Default, Serialize)]
pub struct FifoReport {
    pub rows: Vec<LedgerRow>,
    pub years: Vec<FinancialYearBucket>,
    pub warnings: Vec<Warning>,
}

impl FifoReport {
    /// Assets in name order
    pub fn assets(&self) -> Vec<&str> {
        let mut assets: Vec<&str> = self.rows.iter().map(|r| r.asset.as_str()).collect();
        assets.sort_unstable();
        assets.dedup();
        assets
    }

    pub fn rows_for<'a>(&'a self, asset: &'a str) -> impl Iterator<Item = &'a LedgerRow> + 'a {
        self.rows.iter().filter(move |r| r.asset == asset)
    }

    pub fn year(&self, year: FinancialYear) -> Option<&FinancialYearBucket> {
        self.years.iter().find(|b| b.year == year)
    }

    /// Balances after the last processed entry
    pub fn closing_balances(&self) -> &[AssetBalance] {
        self.years
            .last()
            .map(|b| b.balances.as_slice())
            .unwrap_or_default()
    }
}

/// Run chronologically sorted ledger entries through per-asset FIFO
/// inventories, bucketing activity by financial year.
///
/// Inventories carry over between years. A bucket is closed, with a snapshot
/// of every asset's balance, whenever the financial year changes and after
/// the last entry.
pub fn run(entries: &[LedgerEntry], mapping: &BuyForOthersMapping, config: &EngineConfig) -> FifoReport {
    let mut states: BTreeMap<String, AssetState> = BTreeMap::new();
    let mut report = FifoReport::default();
    let mut bucket: Option<FinancialYearBucket> = None;

    for entry in entries {
        let Some(kind) = classify(entry, &config.classifier) else {
            log::trace!("Skipping zero-delta row {} {}", entry.timestamp(), entry.asset);
            continue;
        };

        let year = FinancialYear::from_date(entry.date());
        if bucket.as_ref().is_some_and(|b| b.year != year) {
            if let Some(closed) = bucket.take() {
                report.years.push(close_bucket(closed, &states));
            }
        }
        let current = bucket.get_or_insert_with(|| FinancialYearBucket::new(year));

        let state = states
            .entry(entry.asset.clone())
            .or_insert_with(|| AssetState::new(&entry.asset));

        match kind {
            TxKind::Fee => process_fee(entry, year, state, current, &mut report.rows),
            TxKind::Buy => process_buy(entry, year, state, current, mapping, &mut report.rows),
            TxKind::Other if entry.quantity.is_sign_positive() => {
                process_credit(entry, year, state, current, &mut report.rows)
            }
            TxKind::Sell | TxKind::CustodialTransfer | TxKind::Other => process_outflow(
                entry,
                kind,
                year,
                state,
                current,
                mapping,
                config,
                &mut report,
            ),
        }
    }

    if let Some(closed) = bucket.take() {
        report.years.push(close_bucket(closed, &states));
    }

    log::info!(
        "Processed {} rows for {} assets over {} financial years ({} warnings)",
        report.rows.len(),
        states.len(),
        report.years.len(),
        report.warnings.len()
    );
    report
}

fn close_bucket(mut bucket: FinancialYearBucket, states: &BTreeMap<String, AssetState>) -> FinancialYearBucket {
    bucket.balances = states.values().map(AssetState::balance).collect();
    log::debug!(
        "Closing {}: {} buys, {} sell splits, {} fees",
        bucket.year,
        bucket.buys.len() + bucket.buys_for_others.len(),
        bucket.sells.len(),
        bucket.fees.len()
    );
    bucket
}

fn process_fee(
    entry: &LedgerEntry,
    year: FinancialYear,
    state: &mut AssetState,
    bucket: &mut FinancialYearBucket,
    rows: &mut Vec<LedgerRow>,
) {
    // fees move units and value outside the lots
    state.off_book_units += entry.quantity;
    state.off_book_value -= entry.value;

    let description = format!("Fee for {}", state.last.description);
    let category = FeeCategory::after(state.last.kind);
    rows.push(LedgerRow {
        financial_year: year,
        asset: entry.asset.clone(),
        trans_ref: state.last.trans_ref.clone(),
        datetime: entry.datetime,
        description: description.clone(),
        kind: TxKind::Fee,
        lot_reference: String::new(),
        quantity: entry.quantity,
        unit_cost: None,
        cost: None,
        proceeds: None,
        profit: None,
        fee: Some(entry.value),
        balance_units: state.units(),
        balance_value: state.value(),
    });
    bucket.fees.push(FeeRecord {
        category,
        datetime: entry.datetime,
        asset: entry.asset.clone(),
        description,
        trans_ref: state.last.trans_ref.clone(),
        quantity: entry.quantity,
        amount: entry.value,
    });
}

fn process_buy(
    entry: &LedgerEntry,
    year: FinancialYear,
    state: &mut AssetState,
    bucket: &mut FinancialYearBucket,
    mapping: &BuyForOthersMapping,
    rows: &mut Vec<LedgerRow>,
) {
    let trans_ref = state.ids.next(&entry.asset, TxKind::Buy);
    let (unit_cost, cost) = {
        let lot = state
            .inventory
            .acquire(entry.quantity, entry.value, &entry.reference);
        (lot.unit_cost, lot.cost())
    };
    log::debug!(
        "{} {}: lot {} added, {} lots held",
        entry.asset,
        trans_ref,
        entry.reference,
        state.inventory.len()
    );
    state.remember(TxKind::Buy, &entry.description, &trans_ref);

    let row = LedgerRow {
        financial_year: year,
        asset: entry.asset.clone(),
        trans_ref,
        datetime: entry.datetime,
        description: entry.description.clone(),
        kind: TxKind::Buy,
        lot_reference: entry.reference.clone(),
        quantity: entry.quantity,
        unit_cost: Some(unit_cost),
        cost: Some(cost),
        proceeds: Some(Decimal::ZERO),
        profit: Some(Decimal::ZERO),
        fee: Some(Decimal::ZERO),
        balance_units: state.units(),
        balance_value: state.value(),
    };
    if !entry.reference.is_empty() && mapping.is_buy_for_others(&entry.asset, &entry.reference) {
        bucket.buys_for_others.push(row.clone());
    } else {
        bucket.buys.push(row.clone());
    }
    rows.push(row);
}

/// Incoming units that were not bought: no lot, no cost basis
fn process_credit(
    entry: &LedgerEntry,
    year: FinancialYear,
    state: &mut AssetState,
    bucket: &mut FinancialYearBucket,
    rows: &mut Vec<LedgerRow>,
) {
    state.off_book_units += entry.quantity;
    state.off_book_value += entry.value;
    state.remember(TxKind::Other, &entry.description, "");

    let row = LedgerRow {
        financial_year: year,
        asset: entry.asset.clone(),
        trans_ref: String::new(),
        datetime: entry.datetime,
        description: entry.description.clone(),
        kind: TxKind::Other,
        lot_reference: String::new(),
        quantity: entry.quantity,
        unit_cost: None,
        cost: None,
        proceeds: None,
        profit: None,
        fee: None,
        balance_units: state.units(),
        balance_value: state.value(),
    };
    bucket.others.push(row.clone());
    rows.push(row);
}

#[allow(clippy::too_many_arguments)]
fn process_outflow(
    entry: &LedgerEntry,
    kind: TxKind,
    year: FinancialYear,
    state: &mut AssetState,
    bucket: &mut FinancialYearBucket,
    mapping: &BuyForOthersMapping,
    config: &EngineConfig,
    report: &mut FifoReport,
) {
    let matched_lot = if kind.is_taxable() {
        None
    } else {
        mapping.matched_lot(&entry.asset, entry.datetime, &entry.description)
    };
    // an outflow paired with a buy is a hand-over, not a disposal
    let kind = if matched_lot.is_some() {
        TxKind::CustodialTransfer
    } else {
        kind
    };
    let treatment = if kind.is_taxable() {
        Treatment::Taxable
    } else {
        Treatment::NonTaxable(config.other_proceeds)
    };

    let trans_ref = state.ids.next(&entry.asset, kind);
    let quantity = -entry.quantity;
    let mut units = state.units();
    let mut value = state.value();

    let outcome = dispose(
        &mut state.inventory,
        &DisposalRequest {
            quantity,
            proceeds: entry.value,
            treatment,
            reference: &trans_ref,
            matched_lot,
        },
    );

    log::debug!(
        "{} {}: {} units out, proceeds {} against cost {}",
        entry.asset,
        trans_ref,
        quantity,
        outcome.total_proceeds(),
        outcome.total_cost()
    );

    if let Some(lot_reference) = &outcome.missing_matched_lot {
        report.warnings.push(Warning::MatchedLotMissing {
            asset: entry.asset.clone(),
            timestamp: entry.timestamp(),
            lot_reference: lot_reference.clone(),
        });
    }
    if let Some(shortfall) = outcome.shortfall {
        state.off_book_units -= shortfall;
        report.warnings.push(Warning::InsufficientCostBasis {
            asset: entry.asset.clone(),
            timestamp: entry.timestamp(),
            reference: trans_ref.clone(),
            available: outcome.available,
            required: quantity,
        });
    }

    for split in outcome.splits {
        units -= split.quantity;
        value -= split.cost;
        let row = LedgerRow {
            financial_year: year,
            asset: entry.asset.clone(),
            trans_ref: trans_ref.clone(),
            datetime: entry.datetime,
            description: entry.description.clone(),
            kind,
            lot_reference: split.lot_reference,
            quantity: -split.quantity,
            unit_cost: Some(split.unit_cost),
            cost: Some(split.cost),
            proceeds: Some(split.proceeds),
            profit: Some(split.profit),
            fee: Some(Decimal::ZERO),
            balance_units: units,
            balance_value: value,
        };
        match kind {
            TxKind::Sell => bucket.sells.push(row.clone()),
            TxKind::CustodialTransfer => bucket.transfers.push(row.clone()),
            _ => bucket.others.push(row.clone()),
        }
        if split.source == SplitSource::Shortfall {
            log::debug!("{} {}: {} units without cost basis", entry.asset, trans_ref, split.quantity);
        }
        report.rows.push(row);
    }

    state.remember(kind, &entry.description, &trans_ref);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inventory::NO_LOT;
    use crate::core::ledger::parse_timestamp;
    use crate::core::matcher::MatchedTransfer;
    use rust_decimal_macros::dec;

    fn entry(ts: &str, asset: &str, description: &str, reference: &str, quantity: Decimal, value: Decimal) -> LedgerEntry {
        LedgerEntry {
            datetime: parse_timestamp(ts).unwrap(),
            asset: asset.to_string(),
            description: description.to_string(),
            reference: reference.to_string(),
            quantity,
            value,
        }
    }

    fn run_default(entries: &[LedgerEntry]) -> FifoReport {
        run(entries, &BuyForOthersMapping::default(), &EngineConfig::default())
    }

    #[test]
    fn buy_then_partial_sell() {
        let entries = [
            entry("2024-04-01 10:00:00", "XBT", "Bought 10", "L1", dec!(10), dec!(1000)),
            entry("2024-04-05 10:00:00", "XBT", "Sold 6", "R2", dec!(-6), dec!(900)),
        ];
        let report = run_default(&entries);

        assert_eq!(report.rows.len(), 2);
        let buy = &report.rows[0];
        assert_eq!(buy.trans_ref, "B_XBT_000");
        assert_eq!(buy.unit_cost, Some(dec!(100)));

        let sell = &report.rows[1];
        assert_eq!(sell.trans_ref, "S_XBT_000");
        assert_eq!(sell.kind, TxKind::Sell);
        assert_eq!(sell.lot_reference, "L1");
        assert_eq!(sell.quantity, dec!(-6));
        assert_eq!(sell.cost, Some(dec!(600)));
        assert_eq!(sell.proceeds, Some(dec!(900)));
        assert_eq!(sell.profit, Some(dec!(300)));
        assert_eq!(sell.balance_units, dec!(4));
        assert_eq!(sell.balance_value, dec!(400));

        assert_eq!(report.years.len(), 1);
        let closing = &report.closing_balances()[0];
        assert_eq!(closing.units, dec!(4));
        assert_eq!(closing.lots.len(), 1);
        assert_eq!(closing.lots[0].quantity, dec!(4));
        assert_eq!(closing.lots[0].unit_cost, dec!(100));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn fee_category_follows_previous_transaction() {
        let entries = [
            entry("2024-04-01 00:00:00", "XBT", "Withdrawal fee", "", dec!(-0.01), dec!(1)),
            entry("2024-04-02 00:00:00", "XBT", "Bought 1", "L1", dec!(1), dec!(100)),
            entry("2024-04-02 00:00:01", "XBT", "Trading fee", "", dec!(-0.001), dec!(0.5)),
            entry("2024-04-03 00:00:00", "XBT", "Sold 0.5", "", dec!(-0.5), dec!(60)),
            entry("2024-04-03 00:00:01", "XBT", "Trading fee", "", dec!(-0.001), dec!(0.25)),
            entry("2024-04-04 00:00:00", "XBT", "Sent to wallet", "", dec!(-0.1), dec!(12)),
            entry("2024-04-04 00:00:01", "XBT", "Network fee", "", dec!(-0.001), dec!(0.1)),
        ];
        let report = run_default(&entries);
        let fees = &report.years[0].fees;
        let categories: Vec<_> = fees.iter().map(|f| f.category).collect();
        assert_eq!(
            categories,
            [
                FeeCategory::Other,
                FeeCategory::Buying,
                FeeCategory::Selling,
                FeeCategory::Other
            ]
        );
        assert_eq!(fees[1].description, "Fee for Bought 1");
        assert_eq!(fees[1].trans_ref, "B_XBT_000");
        assert_eq!(fees[2].trans_ref, "S_XBT_000");
        assert_eq!(fees[3].trans_ref, "O_XBT_000");
    }

    #[test]
    fn fees_adjust_balance_outside_lots() {
        let entries = [
            entry("2024-04-01 00:00:00", "XBT", "Bought 1", "L1", dec!(1), dec!(100)),
            entry("2024-04-01 00:00:01", "XBT", "Trading fee", "", dec!(-0.01), dec!(2)),
        ];
        let report = run_default(&entries);
        let fee_row = &report.rows[1];
        assert_eq!(fee_row.kind, TxKind::Fee);
        assert_eq!(fee_row.fee, Some(dec!(2)));
        assert_eq!(fee_row.balance_units, dec!(0.99));
        assert_eq!(fee_row.balance_value, dec!(98));

        let closing = &report.closing_balances()[0];
        assert_eq!(closing.units, dec!(0.99));
        // lots untouched
        assert_eq!(closing.lots[0].quantity, dec!(1));
    }

    #[test]
    fn inventory_carries_across_financial_years() {
        let entries = [
            entry("2024-01-15 00:00:00", "XBT", "Bought 2", "L1", dec!(2), dec!(200)),
            entry("2024-02-29 00:00:00", "ETH", "Bought 1", "E1", dec!(1), dec!(50)),
            entry("2024-03-01 00:00:00", "XBT", "Sold 1", "", dec!(-1), dec!(300)),
            entry("2025-06-01 00:00:00", "XBT", "Sold 1", "", dec!(-1), dec!(400)),
        ];
        let report = run_default(&entries);

        let years: Vec<_> = report.years.iter().map(|b| b.year).collect();
        assert_eq!(years, [FinancialYear(2024), FinancialYear(2025), FinancialYear(2026)]);

        let fy2024 = report.year(FinancialYear(2024)).unwrap();
        assert_eq!(fy2024.buys.len(), 2);
        assert!(fy2024.sells.is_empty());
        assert_eq!(fy2024.balance("XBT").unwrap().units, dec!(2));
        assert_eq!(fy2024.balance("ETH").unwrap().units, dec!(1));

        let fy2025 = report.year(FinancialYear(2025)).unwrap();
        assert_eq!(fy2025.sells[0].lot_reference, "L1");
        assert_eq!(fy2025.sells[0].profit, Some(dec!(200)));
        assert_eq!(fy2025.balance("XBT").unwrap().units, dec!(1));
        // untouched assets are still reported
        assert_eq!(fy2025.balance("ETH").unwrap().units, dec!(1));

        let fy2026 = report.year(FinancialYear(2026)).unwrap();
        assert_eq!(fy2026.sells[0].profit, Some(dec!(300)));
        assert!(fy2026.balance("XBT").unwrap().lots.is_empty());
    }

    #[test]
    fn shortfall_is_warned_and_reconciled() {
        let entries = [entry("2024-04-01 00:00:00", "XBT", "Sold 5", "", dec!(-5), dec!(500))];
        let report = run_default(&entries);

        assert_eq!(report.rows.len(), 1);
        let row = &report.rows[0];
        assert_eq!(row.lot_reference, NO_LOT);
        assert_eq!(row.cost, Some(Decimal::ZERO));
        assert_eq!(row.proceeds, Some(dec!(500)));
        assert_eq!(row.profit, Some(dec!(500)));
        assert_eq!(row.balance_units, dec!(-5));

        assert_eq!(
            report.warnings,
            [Warning::InsufficientCostBasis {
                asset: "XBT".to_string(),
                timestamp: "2024-04-01 00:00:00".to_string(),
                reference: "S_XBT_000".to_string(),
                available: Decimal::ZERO,
                required: dec!(5),
            }]
        );
        assert_eq!(report.closing_balances()[0].units, dec!(-5));
    }

    #[test]
    fn unlabelled_outflow_is_not_taxable() {
        let entries = [
            entry("2024-04-01 00:00:00", "XBT", "Bought", "L1", dec!(2), dec!(200)),
            entry("2024-04-02 00:00:00", "XBT", "Payment", "", dec!(-1), dec!(150)),
        ];
        let report = run_default(&entries);
        let bucket = &report.years[0];
        assert!(bucket.sells.is_empty());
        assert_eq!(bucket.others.len(), 1);
        assert_eq!(bucket.others[0].proceeds, Some(Decimal::ZERO));
        assert_eq!(bucket.others[0].profit, Some(Decimal::ZERO));
        assert_eq!(bucket.others[0].cost, Some(dec!(100)));

        let config = EngineConfig {
            other_proceeds: OtherProceeds::Allocate,
            ..EngineConfig::default()
        };
        let report = run(&entries, &BuyForOthersMapping::default(), &config);
        assert_eq!(report.years[0].others[0].proceeds, Some(dec!(150)));
        assert_eq!(report.years[0].others[0].profit, Some(Decimal::ZERO));
    }

    #[test]
    fn credit_adds_units_without_lot() {
        let entries = [
            entry("2024-04-01 00:00:00", "XBT", "Received", "", dec!(1), dec!(100)),
            entry("2024-04-02 00:00:00", "XBT", "Sold 1", "", dec!(-1), dec!(120)),
        ];
        let report = run_default(&entries);
        assert_eq!(report.rows[0].kind, TxKind::Other);
        assert_eq!(report.rows[0].balance_units, dec!(1));
        assert_eq!(report.rows[0].cost, None);
        // no lot backs the credit, so the sale has no cost basis
        assert_eq!(report.rows[1].lot_reference, NO_LOT);
        assert_eq!(report.closing_balances()[0].units, Decimal::ZERO);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn matched_outflow_consumes_its_buy() {
        let entries = [
            entry("2024-04-01 00:00:00", "XBT", "Bought", "OWN", dec!(1), dec!(100)),
            entry("2024-04-02 00:00:00", "XBT", "Bought", "FRIEND", dec!(0.5), dec!(60)),
            entry("2024-04-03 00:00:00", "XBT", "Payment to Sam", "", dec!(-0.5), dec!(65)),
            entry("2024-04-04 00:00:00", "XBT", "Sold", "", dec!(-1), dec!(130)),
        ];
        let mut mapping = BuyForOthersMapping::default();
        mapping.insert(
            "XBT",
            "FRIEND",
            MatchedTransfer {
                other_timestamp: "2024-04-03 00:00:00".to_string(),
                other_desc: "Payment to Sam".to_string(),
                buy_qty: dec!(0.5),
                other_qty: dec!(0.5),
            },
        );
        let config = EngineConfig {
            other_proceeds: OtherProceeds::Allocate,
            ..EngineConfig::default()
        };
        let report = run(&entries, &mapping, &config);
        let bucket = &report.years[0];

        assert_eq!(bucket.buys.len(), 1);
        assert_eq!(bucket.buys_for_others[0].lot_reference, "FRIEND");

        assert_eq!(bucket.transfers.len(), 1);
        let transfer = &bucket.transfers[0];
        assert_eq!(transfer.kind, TxKind::CustodialTransfer);
        assert_eq!(transfer.lot_reference, "FRIEND");
        assert_eq!(transfer.cost, Some(dec!(60)));
        assert_eq!(transfer.proceeds, Some(Decimal::ZERO));
        assert_eq!(transfer.profit, Some(Decimal::ZERO));

        // the sale gets the older lot
        assert_eq!(bucket.sells[0].lot_reference, "OWN");
        assert_eq!(bucket.sells[0].profit, Some(dec!(30)));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn matched_lot_already_consumed_falls_back() {
        let entries = [
            entry("2024-04-01 00:00:00", "XBT", "Bought", "B1", dec!(1), dec!(100)),
            entry("2024-04-02 00:00:00", "XBT", "Sold", "", dec!(-1), dec!(100)),
            entry("2024-04-02 00:00:00", "XBT", "Bought", "B2", dec!(1), dec!(100)),
            entry("2024-04-03 00:00:00", "XBT", "Sent", "", dec!(-1), dec!(100)),
        ];
        let mut mapping = BuyForOthersMapping::default();
        mapping.insert(
            "XBT",
            "B1",
            MatchedTransfer {
                other_timestamp: "2024-04-03 00:00:00".to_string(),
                other_desc: "Sent".to_string(),
                buy_qty: dec!(1),
                other_qty: dec!(1),
            },
        );
        let report = run(&entries, &mapping, &EngineConfig::default());
        assert_eq!(
            report.warnings,
            [Warning::MatchedLotMissing {
                asset: "XBT".to_string(),
                timestamp: "2024-04-03 00:00:00".to_string(),
                lot_reference: "B1".to_string(),
            }]
        );
        assert_eq!(report.years[0].transfers[0].lot_reference, "B2");
    }

    #[test]
    fn lot_units_match_balance_throughout() {
        let mut entries = Vec::new();
        let quantities = [dec!(1.5), dec!(-0.7), dec!(2.25), dec!(-1.8), dec!(0.3), dec!(-1.55)];
        for (i, q) in quantities.iter().enumerate() {
            let ts = format!("2024-05-{:02} 00:00:00", i + 1);
            let description = if q.is_sign_positive() { "Bought" } else { "Sold" };
            entries.push(entry(&ts, "ETH", description, &format!("L{i}"), *q, q.abs() * dec!(100)));
        }
        let report = run_default(&entries);

        // a sale spanning lots yields several rows; the last carries the balance
        let mut held = Decimal::ZERO;
        for e in &entries {
            held += e.quantity;
            let last = report.rows.iter().rfind(|r| r.datetime == e.datetime).unwrap();
            assert_eq!(last.balance_units, held);
        }
        assert!(report.rows.len() > entries.len());
        let closing = &report.closing_balances()[0];
        let lot_units: Decimal = closing.lots.iter().map(|l| l.quantity).sum();
        assert_eq!(closing.units, lot_units);
        assert!((closing.units - dec!(0)).abs() <= crate::core::decimal::EPSILON);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn zero_delta_rows_are_ignored() {
        let entries = [
            entry("2024-04-01 00:00:00", "XBT", "Bought", "L1", Decimal::ZERO, dec!(10)),
            entry("2025-04-01 00:00:00", "XBT", "Note", "", Decimal::ZERO, Decimal::ZERO),
        ];
        let report = run_default(&entries);
        assert!(report.rows.is_empty());
        assert!(report.years.is_empty());
    }

    #[test]
    fn transaction_ids_are_per_asset() {
        let entries = [
            entry("2024-04-01 00:00:00", "XBT", "Bought", "X1", dec!(1), dec!(1)),
            entry("2024-04-01 00:00:00", "eth", "Bought", "E1", dec!(1), dec!(1)),
            entry("2024-04-02 00:00:00", "XBT", "Bought", "X2", dec!(1), dec!(1)),
        ];
        let report = run_default(&entries);
        let refs: Vec<_> = report.rows.iter().map(|r| r.trans_ref.as_str()).collect();
        assert_eq!(refs, ["B_XBT_000", "B_ETH_000", "B_XBT_001"]);
        assert_eq!(report.assets(), ["XBT", "eth"]);
    }

    #[test]
    fn balance_lookup_ignores_case() {
        let entries = [entry("2024-04-01 00:00:00", "eth", "Bought", "E1", dec!(2), dec!(20))];
        let report = run_default(&entries);
        let bucket = &report.years[0];
        assert_eq!(bucket.balance("ETH").unwrap().units, dec!(2));
        assert_eq!(bucket.balance("eth").unwrap().asset, "eth");
    }

    #[test]
    fn unreferenced_buys_stay_own_buys() {
        let entries = [
            entry("2024-04-01 00:00:00", "XBT", "Bought own", "", dec!(1), dec!(100)),
            entry("2024-04-20 00:00:00", "XBT", "Bought for friend", "", dec!(1), dec!(200)),
            entry("2024-04-21 00:00:00", "XBT", "Sent to friend", "", dec!(-1), dec!(210)),
        ];
        let config = EngineConfig::default();
        let mapping = crate::core::match_buys_for_others(
            &entries,
            &config.classifier,
            &crate::core::MatchConfig::default(),
        );
        assert!(mapping.is_empty());

        let report = run(&entries, &mapping, &config);
        let bucket = &report.years[0];
        assert_eq!(bucket.buys.len(), 2);
        assert!(bucket.buys_for_others.is_empty());
        // unmatched, so the transfer takes the oldest lot
        assert_eq!(bucket.transfers[0].cost, Some(dec!(100)));
        assert_eq!(report.closing_balances()[0].lots[0].unit_cost, dec!(200));
    }

    #[test]
    fn only_the_described_outflow_uses_the_match() {
        let entries = [
            entry("2024-04-01 00:00:00", "XBT", "Bought", "OWN", dec!(1), dec!(100)),
            entry("2024-04-02 00:00:00", "XBT", "Bought", "FRIEND", dec!(1), dec!(150)),
            entry("2024-04-03 00:00:00", "XBT", "Sent to Sam", "", dec!(-1), dec!(150)),
            entry("2024-04-03 00:00:00", "XBT", "Payment", "", dec!(-0.5), dec!(75)),
        ];
        let mut mapping = BuyForOthersMapping::default();
        mapping.insert(
            "XBT",
            "FRIEND",
            MatchedTransfer {
                other_timestamp: "2024-04-03 00:00:00".to_string(),
                other_desc: "Sent to Sam".to_string(),
                buy_qty: dec!(1),
                other_qty: dec!(1),
            },
        );
        let report = run(&entries, &mapping, &EngineConfig::default());
        let bucket = &report.years[0];
        assert!(report.warnings.is_empty());
        assert_eq!(bucket.transfers.len(), 1);
        assert_eq!(bucket.transfers[0].lot_reference, "FRIEND");
        assert_eq!(bucket.others.len(), 1);
        assert_eq!(bucket.others[0].kind, TxKind::Other);
        assert_eq!(bucket.others[0].lot_reference, "OWN");
    }

}
