use super::decimal::{ratio, EPSILON};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;

/// Lot reference used when no acquisition backs a disposal
pub const NO_LOT: &str = "N/A";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("{asset}: cannot consume {requested} from an empty inventory")]
    Underflow { asset: String, requested: Decimal },
    #[error("{asset}: no lot at position {index}")]
    NoSuchLot { asset: String, index: usize },
}

/// Cost-basis lot for a quantity acquired at a single unit price
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lot {
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub reference: String,
}

impl Lot {
    pub fn cost(&self) -> Decimal {
        self.quantity * self.unit_cost
    }
}

/// Quantity taken from a single lot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumption {
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub cost: Decimal,
    pub reference: String,
}

/// FIFO queue of lots for one asset.
///
/// `units` always equals the sum of lot quantities and `value` the sum of
/// quantity × unit cost; both are maintained incrementally.
#[derive(Debug, Clone)]
pub struct Inventory {
    asset: String,
    lots: VecDeque<Lot>,
    units: Decimal,
    value: Decimal,
}

impl Inventory {
    pub fn new(asset: impl Into<String>) -> Self {
        Inventory {
            asset: asset.into(),
            lots: VecDeque::new(),
            units: Decimal::ZERO,
            value: Decimal::ZERO,
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn units(&self) -> Decimal {
        self.units
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    /// Sum of lot quantities, recomputed from scratch
    pub fn lot_units(&self) -> Decimal {
        self.lots.iter().map(|l| l.quantity).sum()
    }

    /// Append a lot for a purchase. A zero quantity gets a zero unit cost.
    pub fn acquire(&mut self, quantity: Decimal, fiat_value: Decimal, reference: &str) -> &Lot {
        let unit_cost = ratio(fiat_value, quantity);
        let lot = Lot {
            quantity,
            unit_cost,
            reference: reference.to_string(),
        };
        self.units += lot.quantity;
        self.value += lot.cost();
        log::debug!(
            "{} ACQUIRE {}: qty={}, unit_cost={}. Balance: units={}, value={}",
            self.asset,
            reference,
            quantity,
            unit_cost,
            self.units,
            self.value
        );
        self.lots.push_back(lot);
        self.lots.back().expect("lot was just pushed")
    }

    /// Zero-quantity, zero-cost lot standing in for missing acquisitions
    pub fn insert_placeholder(&mut self) {
        self.lots.push_back(Lot {
            quantity: Decimal::ZERO,
            unit_cost: Decimal::ZERO,
            reference: NO_LOT.to_string(),
        });
    }

    pub fn peek_oldest(&self) -> Option<&Lot> {
        self.lots.front()
    }

    /// Position of the first lot with this reference
    pub fn find_by_reference(&self, reference: &str) -> Option<usize> {
        self.lots.iter().position(|l| l.reference == reference)
    }

    /// Consume up to `quantity` from the oldest lot
    pub fn consume_front(&mut self, quantity: Decimal) -> Result<Consumption, InventoryError> {
        if self.lots.is_empty() {
            return Err(InventoryError::Underflow {
                asset: self.asset.clone(),
                requested: quantity,
            });
        }
        self.consume_at(0, quantity)
    }

    /// Consume up to `quantity` from the lot at `index`, removing it once
    /// exhausted.
    pub fn consume_at(&mut self, index: usize, quantity: Decimal) -> Result<Consumption, InventoryError> {
        let lot = self.lots.get_mut(index).ok_or_else(|| InventoryError::NoSuchLot {
            asset: self.asset.clone(),
            index,
        })?;

        let consumed = lot.quantity.min(quantity).max(Decimal::ZERO);
        let cost = consumed * lot.unit_cost;
        lot.quantity -= consumed;
        self.units -= consumed;
        self.value -= cost;

        let consumption = Consumption {
            quantity: consumed,
            unit_cost: lot.unit_cost,
            cost,
            reference: lot.reference.clone(),
        };

        if lot.quantity <= EPSILON {
            // drop the residual with the lot so the totals stay in step
            let residual = lot.quantity;
            self.units -= residual;
            self.value -= residual * lot.unit_cost;
            self.lots.remove(index);
        }

        log::debug!(
            "{} CONSUME {}: qty={}, cost={}. Balance: units={}, value={}",
            self.asset,
            consumption.reference,
            consumption.quantity,
            consumption.cost,
            self.units,
            self.value
        );
        Ok(consumption)
    }

    pub fn snapshot(&self) -> Vec<Lot> {
        self.lots.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn assert_balanced(inv: &Inventory) {
        assert!((inv.units() - inv.lot_units()).abs() <= EPSILON);
        let value: Decimal = inv.lots().map(Lot::cost).sum();
        assert!((inv.value() - value).abs() <= EPSILON);
    }

    #[test]
    fn acquire_appends_and_totals() {
        let mut inv = Inventory::new("XBT");
        let lot = inv.acquire(dec!(10), dec!(1000), "B1");
        assert_eq!(lot.unit_cost, dec!(100));
        inv.acquire(dec!(5), dec!(750), "B2");
        assert_eq!(inv.units(), dec!(15));
        assert_eq!(inv.value(), dec!(1750));
        assert_eq!(inv.peek_oldest().unwrap().reference, "B1");
        assert_balanced(&inv);
    }

    #[test]
    fn zero_quantity_buy_has_zero_unit_cost() {
        let mut inv = Inventory::new("XBT");
        let lot = inv.acquire(Decimal::ZERO, dec!(50), "B0");
        assert_eq!(lot.unit_cost, Decimal::ZERO);
    }

    #[test]
    fn consume_front_partial_then_whole() {
        let mut inv = Inventory::new("XBT");
        inv.acquire(dec!(10), dec!(1000), "B1");
        inv.acquire(dec!(5), dec!(750), "B2");

        let c = inv.consume_front(dec!(6)).unwrap();
        assert_eq!(c.quantity, dec!(6));
        assert_eq!(c.cost, dec!(600));
        assert_eq!(c.reference, "B1");
        assert_eq!(inv.peek_oldest().unwrap().quantity, dec!(4));
        assert_balanced(&inv);

        let c = inv.consume_front(dec!(100)).unwrap();
        assert_eq!(c.quantity, dec!(4));
        assert_eq!(inv.peek_oldest().unwrap().reference, "B2");
        assert_eq!(inv.len(), 1);
        assert_balanced(&inv);
    }

    #[test]
    fn residual_below_epsilon_is_dropped() {
        let mut inv = Inventory::new("XBT");
        inv.acquire(dec!(1.00000000001), dec!(100), "B1");
        inv.consume_front(dec!(1)).unwrap();
        assert!(inv.is_empty());
        assert_eq!(inv.units(), Decimal::ZERO);
        assert_balanced(&inv);
    }

    #[test]
    fn empty_inventory_underflows() {
        let mut inv = Inventory::new("XBT");
        assert_eq!(
            inv.consume_front(dec!(1)),
            Err(InventoryError::Underflow {
                asset: "XBT".to_string(),
                requested: dec!(1)
            })
        );
    }

    #[test]
    fn find_and_consume_by_reference() {
        let mut inv = Inventory::new("XBT");
        inv.acquire(dec!(1), dec!(100), "B1");
        inv.acquire(dec!(2), dec!(400), "B2");
        inv.acquire(dec!(3), dec!(900), "B3");

        let idx = inv.find_by_reference("B2").unwrap();
        assert_eq!(idx, 1);
        let c = inv.consume_at(idx, dec!(2)).unwrap();
        assert_eq!(c.cost, dec!(400));
        assert_eq!(inv.find_by_reference("B2"), None);
        let refs: Vec<_> = inv.lots().map(|l| l.reference.as_str()).collect();
        assert_eq!(refs, ["B1", "B3"]);
        assert_balanced(&inv);

        assert!(matches!(
            inv.consume_at(5, dec!(1)),
            Err(InventoryError::NoSuchLot { index: 5, .. })
        ));
    }

    #[test]
    fn placeholder_is_removed_on_first_touch() {
        let mut inv = Inventory::new("XBT");
        inv.insert_placeholder();
        assert_eq!(inv.peek_oldest().unwrap().reference, NO_LOT);
        let c = inv.consume_front(dec!(5)).unwrap();
        assert_eq!(c.quantity, Decimal::ZERO);
        assert!(inv.is_empty());
        assert_balanced(&inv);
    }
}
