use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Problems found while running the ledger through the lot inventory.
/// None of them stop the run, but each one weakens the reported figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum Warning {
    /// Outflow larger than the units held in lots. The excess was given a
    /// zero cost basis. When `available = 0`, there was no cost basis at all.
    InsufficientCostBasis {
        asset: String,
        timestamp: String,
        reference: String,
        #[schemars(with = "String")]
        available: Decimal,
        #[schemars(with = "String")]
        required: Decimal,
    },
    /// Outflow matched to a buy whose lot was already consumed; FIFO order
    /// was used instead.
    MatchedLotMissing {
        asset: String,
        timestamp: String,
        lot_reference: String,
    },
}

impl Warning {
    pub fn asset(&self) -> &str {
        match self {
            Warning::InsufficientCostBasis { asset, .. } | Warning::MatchedLotMissing { asset, .. } => asset,
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            Warning::InsufficientCostBasis { timestamp, .. }
            | Warning::MatchedLotMissing { timestamp, .. } => timestamp,
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::InsufficientCostBasis {
                asset,
                timestamp,
                reference,
                available,
                required,
            } => write!(
                f,
                "{timestamp} {asset} {reference}: needed {required} but only {available} held in lots"
            ),
            Warning::MatchedLotMissing {
                asset,
                timestamp,
                lot_reference,
            } => write!(
                f,
                "{timestamp} {asset}: matched lot {lot_reference} already consumed"
            ),
        }
    }
}
