//! FIFO consumption of lots to satisfy an outflow.
//!
//! 1. Matched override (non-taxable outflows only): when a buy-for-others
//!    match names a lot, that lot is consumed first regardless of its
//!    position, with zero proceeds and profit.
//! 2. FIFO sweep: the oldest lots are consumed until the outflow is covered.
//!    Proceeds are allocated by each split's share of the *whole* outflow
//!    quantity, so the splits add back up to the outflow's fiat value.
//! 3. Shortfall: any quantity left once the inventory is exhausted becomes a
//!    zero-cost split against lot "N/A".

use super::decimal::{ratio, EPSILON};
use super::inventory::{Consumption, Inventory, NO_LOT};
use clap::ValueEnum;
use rust_decimal::Decimal;
use serde::Serialize;

/// How proceeds are reported on non-taxable outflow splits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
pub enum OtherProceeds {
    /// Report zero proceeds and zero profit
    #[default]
    Zero,
    /// Report the proportional share of proceeds, with zero profit
    Allocate,
}

/// Tax treatment applied to every split of one outflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    Taxable,
    NonTaxable(OtherProceeds),
}

/// How a split was sourced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SplitSource {
    Fifo,
    /// Lot chosen by a buy-for-others match
    Matched,
    /// No lot left to cover the quantity
    Shortfall,
}

/// Share of one outflow satisfied from a single lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisposalSplit {
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub cost: Decimal,
    pub proceeds: Decimal,
    pub profit: Decimal,
    pub lot_reference: String,
    pub disposal_reference: String,
    pub source: SplitSource,
}

#[derive(Debug, Clone)]
pub struct DisposalRequest<'a> {
    /// Units leaving the inventory (positive)
    pub quantity: Decimal,
    /// Fiat value of the whole outflow
    pub proceeds: Decimal,
    pub treatment: Treatment,
    /// Transaction reference stamped on every split
    pub reference: &'a str,
    /// Lot reference to consume first
    pub matched_lot: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct DisposalOutcome {
    pub splits: Vec<DisposalSplit>,
    /// Quantity not covered by any lot
    pub shortfall: Option<Decimal>,
    /// Units held in lots when the disposal started
    pub available: Decimal,
    /// The matched lot reference was not found in the inventory
    pub missing_matched_lot: Option<String>,
}

impl DisposalOutcome {
    pub fn total_proceeds(&self) -> Decimal {
        self.splits.iter().map(|s| s.proceeds).sum()
    }

    pub fn total_cost(&self) -> Decimal {
        self.splits.iter().map(|s| s.cost).sum()
    }
}

pub fn dispose(inventory: &mut Inventory, request: &DisposalRequest) -> DisposalOutcome {
    let mut outcome = DisposalOutcome {
        available: inventory.units(),
        ..DisposalOutcome::default()
    };
    let mut remaining = request.quantity;

    if let Some(matched) = request.matched_lot {
        match inventory.find_by_reference(matched) {
            Some(index) => {
                // index comes from find_by_reference, so the lot exists
                if let Ok(consumption) = inventory.consume_at(index, remaining) {
                    remaining -= consumption.quantity;
                    outcome.splits.push(DisposalSplit {
                        quantity: consumption.quantity,
                        unit_cost: consumption.unit_cost,
                        cost: consumption.cost,
                        proceeds: Decimal::ZERO,
                        profit: Decimal::ZERO,
                        lot_reference: consumption.reference,
                        disposal_reference: request.reference.to_string(),
                        source: SplitSource::Matched,
                    });
                }
            }
            None => {
                log::warn!(
                    "{} {}: matched lot {} is no longer in inventory, falling back to FIFO",
                    inventory.asset(),
                    request.reference,
                    matched
                );
                outcome.missing_matched_lot = Some(matched.to_string());
            }
        }
    }

    if inventory.is_empty() && remaining > EPSILON {
        inventory.insert_placeholder();
    }

    while remaining > EPSILON && inventory.peek_oldest().is_some() {
        let Ok(consumption) = inventory.consume_front(remaining) else {
            break;
        };
        // exhausted placeholders and dust lots yield nothing
        if consumption.quantity <= Decimal::ZERO {
            continue;
        }
        remaining -= consumption.quantity;
        outcome
            .splits
            .push(fifo_split(request, consumption, SplitSource::Fifo));
    }

    if remaining > EPSILON {
        log::warn!(
            "{} {}: inventory short by {} (available {}), using zero cost basis",
            inventory.asset(),
            request.reference,
            remaining,
            outcome.available
        );
        outcome.shortfall = Some(remaining);
        let consumption = Consumption {
            quantity: remaining,
            unit_cost: Decimal::ZERO,
            cost: Decimal::ZERO,
            reference: NO_LOT.to_string(),
        };
        outcome
            .splits
            .push(fifo_split(request, consumption, SplitSource::Shortfall));
    }

    outcome
}

fn fifo_split(request: &DisposalRequest, consumption: Consumption, source: SplitSource) -> DisposalSplit {
    let allocated = request.proceeds * ratio(consumption.quantity, request.quantity);
    let (proceeds, profit) = match request.treatment {
        Treatment::Taxable => (allocated, allocated - consumption.cost),
        Treatment::NonTaxable(OtherProceeds::Allocate) => (allocated, Decimal::ZERO),
        Treatment::NonTaxable(OtherProceeds::Zero) => (Decimal::ZERO, Decimal::ZERO),
    };
    DisposalSplit {
        quantity: consumption.quantity,
        unit_cost: consumption.unit_cost,
        cost: consumption.cost,
        proceeds,
        profit,
        lot_reference: consumption.reference,
        disposal_reference: request.reference.to_string(),
        source,
    }
}
