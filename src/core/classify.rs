use super::ledger::LedgerEntry;
use serde::Serialize;

/// What a ledger row means for the lot inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TxKind {
    Buy,
    Sell,
    Fee,
    /// Outflow to another wallet or person; not a taxable sale
    CustodialTransfer,
    /// Any other movement: a non-purchase credit, or an unlabelled outflow
    Other,
}

impl TxKind {
    pub fn display(&self) -> &'static str {
        match self {
            TxKind::Buy => "Buy",
            TxKind::Sell => "Sell",
            TxKind::Fee => "Fee",
            TxKind::CustodialTransfer => "Transfer",
            TxKind::Other => "Other",
        }
    }

    /// Only sales realise a gain or loss
    pub fn is_taxable(&self) -> bool {
        matches!(self, TxKind::Sell)
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Prefix marking a purchase (case-sensitive)
    pub acquisition_keyword: String,
    /// Prefix marking a sale (case-sensitive)
    pub disposal_keyword: String,
    /// Substring marking a fee (case-insensitive)
    pub fee_keyword: String,
    /// Substrings marking an outflow as a custodial transfer (case-insensitive)
    pub transfer_keywords: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            acquisition_keyword: "Bought".to_string(),
            disposal_keyword: "Sold".to_string(),
            fee_keyword: "fee".to_string(),
            transfer_keywords: ["send", "sent", "transfer", "withdraw"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Classify a ledger row. Rows with no quantity change yield `None`.
pub fn classify(entry: &LedgerEntry, config: &ClassifierConfig) -> Option<TxKind> {
    if entry.quantity.is_zero() {
        return None;
    }

    let description = entry.description.as_str();
    let lowered = description.to_lowercase();

    let kind = if lowered.contains(&config.fee_keyword.to_lowercase()) {
        TxKind::Fee
    } else if entry.quantity.is_sign_positive() {
        if description.starts_with(&config.acquisition_keyword) {
            TxKind::Buy
        } else {
            TxKind::Other
        }
    } else if description.starts_with(&config.disposal_keyword) {
        TxKind::Sell
    } else if config
        .transfer_keywords
        .iter()
        .any(|k| lowered.contains(&k.to_lowercase()))
    {
        TxKind::CustodialTransfer
    } else {
        TxKind::Other
    };

    Some(kind)
}

/// True for rows that leave the inventory without being a sale: the
/// candidates for buys made on behalf of someone else.
pub fn is_non_sale_outflow(entry: &LedgerEntry, kind: TxKind) -> bool {
    entry.quantity.is_sign_negative()
        && matches!(kind, TxKind::CustodialTransfer | TxKind::Other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn entry(description: &str, quantity: Decimal) -> LedgerEntry {
        LedgerEntry {
            datetime: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            asset: "XBT".to_string(),
            description: description.to_string(),
            reference: "R".to_string(),
            quantity,
            value: dec!(100),
        }
    }

    fn kind(description: &str, quantity: Decimal) -> Option<TxKind> {
        classify(&entry(description, quantity), &ClassifierConfig::default())
    }

    #[test]
    fn zero_delta_is_discarded() {
        assert_eq!(kind("Bought 1 BTC", Decimal::ZERO), None);
    }

    #[test]
    fn fee_wins_over_everything() {
        assert_eq!(kind("Trading FEE", dec!(-0.1)), Some(TxKind::Fee));
        assert_eq!(kind("Bought fee rebate", dec!(0.1)), Some(TxKind::Fee));
        assert_eq!(kind("Sold with fee", dec!(-0.1)), Some(TxKind::Fee));
    }

    #[test]
    fn buys_need_positive_delta_and_keyword() {
        assert_eq!(kind("Bought 1 BTC", dec!(1)), Some(TxKind::Buy));
        assert_eq!(kind("Received 1 BTC", dec!(1)), Some(TxKind::Other));
        // keyword is a case-sensitive prefix
        assert_eq!(kind("bought 1 BTC", dec!(1)), Some(TxKind::Other));
    }

    #[test]
    fn sells_need_negative_delta_and_keyword() {
        assert_eq!(kind("Sold 1 BTC", dec!(-1)), Some(TxKind::Sell));
        assert_eq!(kind("Sold 1 BTC", dec!(1)), Some(TxKind::Other));
    }

    #[test]
    fn unlabelled_outflows() {
        assert_eq!(kind("Sent to friend", dec!(-1)), Some(TxKind::CustodialTransfer));
        assert_eq!(kind("Withdrawal", dec!(-1)), Some(TxKind::CustodialTransfer));
        assert_eq!(kind("Payment", dec!(-1)), Some(TxKind::Other));
    }

    #[test]
    fn custom_keywords() {
        let config = ClassifierConfig {
            acquisition_keyword: "Purchase".to_string(),
            disposal_keyword: "Sale".to_string(),
            ..ClassifierConfig::default()
        };
        assert_eq!(
            classify(&entry("Purchase 1 ETH", dec!(1)), &config),
            Some(TxKind::Buy)
        );
        assert_eq!(
            classify(&entry("Sale 1 ETH", dec!(-1)), &config),
            Some(TxKind::Sell)
        );
    }

    #[test]
    fn non_sale_outflows() {
        let out = entry("Sent", dec!(-1));
        assert!(is_non_sale_outflow(&out, TxKind::CustodialTransfer));
        assert!(!is_non_sale_outflow(&out, TxKind::Sell));
        assert!(!is_non_sale_outflow(&entry("Deposit", dec!(1)), TxKind::Other));
    }
}
