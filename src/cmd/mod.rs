pub mod balances;
pub mod match_others;
pub mod report;
pub mod schema;
pub mod summary;
pub mod validate;

use crate::core::{
    load_ledger, match_buys_for_others, run, BuyForOthersMapping, ClassifierConfig, EngineConfig,
    FifoReport, FinancialYear, LedgerEntry, MatchConfig, OtherProceeds,
};
use anyhow::Context;
use clap::Args;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table,
};

/// Where the ledger comes from and how its rows are read
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Ledger CSV files, or directories of them
    #[arg(required = true, value_name = "PATH")]
    pub inputs: Vec<PathBuf>,

    /// Description prefix marking a purchase
    #[arg(long, default_value = "Bought")]
    pub acquisition_keyword: String,

    /// Description prefix marking a sale
    #[arg(long, default_value = "Sold")]
    pub disposal_keyword: String,

    /// Days after a buy in which an outflow may be matched to it
    #[arg(long, default_value_t = 7)]
    pub window_days: i64,

    /// Minimum outflow quantity as a fraction of the matched buy
    #[arg(long, default_value = "0.90")]
    pub min_ratio: Decimal,
}

impl InputArgs {
    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            acquisition_keyword: self.acquisition_keyword.clone(),
            disposal_keyword: self.disposal_keyword.clone(),
            ..ClassifierConfig::default()
        }
    }

    pub fn match_config(&self) -> anyhow::Result<MatchConfig> {
        let window = chrono::Duration::try_days(self.window_days)
            .with_context(|| format!("--window-days {} is out of range", self.window_days))?;
        Ok(MatchConfig {
            window,
            min_ratio: self.min_ratio,
        })
    }

    pub fn load(&self) -> anyhow::Result<Vec<LedgerEntry>> {
        let entries = load_ledger(&self.inputs)?;
        if entries.is_empty() {
            log::warn!("No ledger rows found in {:?}", self.inputs);
        } else {
            log::info!("Loaded {} ledger rows", entries.len());
        }
        Ok(entries)
    }

    pub fn find_matches(&self, entries: &[LedgerEntry]) -> anyhow::Result<BuyForOthersMapping> {
        let mapping = match_buys_for_others(entries, &self.classifier(), &self.match_config()?);
        log::info!("Matched {} buys to outflows", mapping.len());
        Ok(mapping)
    }
}

/// How the ledger is costed
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Proceeds shown on outflows that are not sales
    #[arg(long, value_enum, default_value_t = OtherProceeds::Zero)]
    pub other_proceeds: OtherProceeds,

    /// Buy-for-others mapping file (see the `match` command)
    #[arg(short, long)]
    pub mapping: Option<PathBuf>,

    /// Match buys to outflows from the ledger instead of reading the mapping
    #[arg(long)]
    pub rematch: bool,

    /// Fiat currency label for amounts
    #[arg(long, default_value = "ZAR")]
    pub currency: String,
}

impl EngineArgs {
    pub fn config(&self, input: &InputArgs) -> EngineConfig {
        EngineConfig {
            classifier: input.classifier(),
            other_proceeds: self.other_proceeds,
        }
    }

    pub fn mapping(&self, input: &InputArgs, entries: &[LedgerEntry]) -> anyhow::Result<BuyForOthersMapping> {
        if self.rematch {
            return input.find_matches(entries);
        }
        match &self.mapping {
            Some(path) => BuyForOthersMapping::load_optional(path)
                .with_context(|| format!("reading mapping {}", path.display())),
            None => Ok(BuyForOthersMapping::default()),
        }
    }
}

/// Load the ledger and run it through the lot inventory
pub fn process(input: &InputArgs, engine: &EngineArgs) -> anyhow::Result<(FifoReport, BuyForOthersMapping)> {
    let entries = input.load()?;
    let mapping = engine.mapping(input, &entries)?;
    let report = run(&entries, &mapping, &engine.config(input));
    Ok((report, mapping))
}

pub fn year_filter(year: Option<i32>) -> Option<FinancialYear> {
    year.map(FinancialYear)
}

pub fn year_label(year: Option<FinancialYear>) -> String {
    year.map_or("All Years".to_string(), |y| y.to_string())
}

/// Rounded borders with numbers right-aligned below the header
pub fn styled(mut table: Table) -> String {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
        .to_string()
}
