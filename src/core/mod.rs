pub mod classify;
pub mod decimal;
pub mod disposal;
pub mod engine;
pub mod fy;
pub mod inventory;
pub mod ledger;
pub mod matcher;
pub mod warnings;

// Flat public surface for domain types and functions.
pub use classify::ClassifierConfig;
pub use disposal::OtherProceeds;
pub use engine::{run, AssetBalance, EngineConfig, FifoReport, FinancialYearBucket, LedgerRow};
pub use fy::FinancialYear;
pub use ledger::{load_ledger, LedgerEntry, LedgerRecord};
pub use matcher::{match_buys_for_others, BuyForOthersMapping, MatchConfig, MatchedTransfer};
pub use warnings::Warning;
