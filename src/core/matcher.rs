//! Detection of buys made on behalf of someone else: a purchase followed
//! within a few days by an outflow of (nearly) the same quantity. The lot
//! from such a buy is later consumed by that outflow directly instead of by
//! FIFO order.

use super::classify::{classify, is_non_sale_outflow, ClassifierConfig, TxKind};
use super::decimal::ratio;
use super::ledger::{LedgerEntry, TIMESTAMP_FORMAT};
use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchConfig {
    /// Longest gap allowed between the buy and the outflow
    pub window: Duration,
    /// Minimum outflow quantity as a fraction of the buy quantity
    pub min_ratio: Decimal,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            window: Duration::days(7),
            min_ratio: dec!(0.90),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("{path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("{path}: invalid mapping: {error}")]
    Json {
        path: PathBuf,
        error: serde_json::Error,
    },
}

/// The outflow a buy was matched to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MatchedTransfer {
    /// Timestamp of the outflow (YYYY-MM-DD HH:MM:SS)
    pub other_timestamp: String,
    /// Description of the outflow
    pub other_desc: String,
    /// Quantity bought
    #[schemars(with = "String")]
    pub buy_qty: Decimal,
    /// Quantity sent out
    #[schemars(with = "String")]
    pub other_qty: Decimal,
}

/// Asset -> buy reference -> matched outflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct BuyForOthersMapping(pub BTreeMap<String, BTreeMap<String, MatchedTransfer>>);

impl BuyForOthersMapping {
    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    /// Number of matched buys across all assets
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn assets(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, MatchedTransfer>)> {
        self.0.iter()
    }

    pub fn insert(&mut self, asset: &str, buy_reference: &str, transfer: MatchedTransfer) {
        self.0
            .entry(asset.to_string())
            .or_default()
            .insert(buy_reference.to_string(), transfer);
    }

    /// Reference of the buy lot matched to the outflow at `datetime` with
    /// `description`. Both must agree, as an asset can have several outflows
    /// in the same second.
    pub fn matched_lot(&self, asset: &str, datetime: NaiveDateTime, description: &str) -> Option<&str> {
        let timestamp = datetime.format(TIMESTAMP_FORMAT).to_string();
        self.0.get(asset).and_then(|buys| {
            buys.iter()
                .find(|(_, t)| t.other_timestamp == timestamp && t.other_desc == description)
                .map(|(reference, _)| reference.as_str())
        })
    }

    pub fn is_buy_for_others(&self, asset: &str, reference: &str) -> bool {
        self.0
            .get(asset)
            .is_some_and(|buys| buys.contains_key(reference))
    }

    pub fn read_json(path: &Path) -> Result<Self, MappingError> {
        let file = File::open(path).map_err(|error| MappingError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|error| MappingError::Json {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Like `read_json`, but a missing file yields an empty mapping
    pub fn load_optional(path: &Path) -> Result<Self, MappingError> {
        if !path.exists() {
            log::warn!(
                "No buy-for-others mapping at {}, all outflows use FIFO order",
                path.display()
            );
            return Ok(Self::default());
        }
        let mapping = Self::read_json(path)?;
        log::info!("Loaded {} matched buys from {}", mapping.len(), path.display());
        Ok(mapping)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), MappingError> {
        let io_err = |error| MappingError::Io {
            path: path.to_path_buf(),
            error,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|error| MappingError::Json {
            path: path.to_path_buf(),
            error,
        })?;
        writer.write_all(b"\n").map_err(io_err)?;
        writer.flush().map_err(io_err)
    }
}

struct BuyCandidate<'a> {
    entry: &'a LedgerEntry,
    matched: bool,
}

/// Pair outflows with the closest preceding unmatched buy of the same asset.
///
/// `entries` must already be in chronological order. Each buy is matched at
/// most once; outflows are visited oldest first, so an earlier outflow takes
/// precedence over a later one for the same buy.
pub fn match_buys_for_others(
    entries: &[LedgerEntry],
    classifier: &ClassifierConfig,
    config: &MatchConfig,
) -> BuyForOthersMapping {
    let mut by_asset: BTreeMap<&str, (Vec<BuyCandidate>, Vec<&LedgerEntry>)> = BTreeMap::new();
    for entry in entries {
        let Some(kind) = classify(entry, classifier) else {
            continue;
        };
        let (buys, outflows) = by_asset.entry(entry.asset.as_str()).or_default();
        // the mapping is keyed by buy reference, so a buy without one cannot be matched
        if kind == TxKind::Buy && !entry.reference.is_empty() {
            buys.push(BuyCandidate {
                entry,
                matched: false,
            });
        } else if is_non_sale_outflow(entry, kind) {
            outflows.push(entry);
        }
    }

    let mut mapping = BuyForOthersMapping::default();
    for (asset, (mut buys, outflows)) in by_asset {
        for outflow in outflows {
            let quantity = outflow.quantity.abs();
            let mut best: Option<(usize, Duration)> = None;
            for (i, buy) in buys.iter().enumerate() {
                if buy.matched {
                    continue;
                }
                let elapsed = outflow.datetime - buy.entry.datetime;
                if elapsed < Duration::zero() || elapsed > config.window {
                    continue;
                }
                if ratio(quantity, buy.entry.quantity) < config.min_ratio {
                    continue;
                }
                // strict comparison keeps the earliest buy on a tie
                if best.is_none_or(|(_, gap)| elapsed < gap) {
                    best = Some((i, elapsed));
                }
            }

            if let Some((i, gap)) = best {
                let buy = &mut buys[i];
                buy.matched = true;
                log::debug!(
                    "{} buy {} matched to outflow at {} ({} apart)",
                    asset,
                    buy.entry.reference,
                    outflow.timestamp(),
                    gap
                );
                mapping.insert(
                    asset,
                    &buy.entry.reference,
                    MatchedTransfer {
                        other_timestamp: outflow.timestamp(),
                        other_desc: outflow.description.clone(),
                        buy_qty: buy.entry.quantity,
                        other_qty: quantity,
                    },
                );
            }
        }
    }
    mapping
}
