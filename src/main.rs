mod cmd;
mod core;
mod report;

use clap::{Parser, Subcommand};

/// FIFO cost basis and financial-year disposal reports for crypto ledgers
#[derive(Parser, Debug)]
#[command(name = "fifotax", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Match buys to the outflows that sent them on, and save the mapping
    Match(cmd::match_others::MatchCommand),
    /// Write per-asset ledgers, financial-year reports and the overview
    Report(cmd::report::ReportCommand),
    /// Show holdings and remaining lots at each year end
    Balances(cmd::balances::BalancesCommand),
    /// Show gains and losses per financial year
    Summary(cmd::summary::SummaryCommand),
    /// Check for shortfalls and missing matched lots
    Validate(cmd::validate::ValidateCommand),
    /// Print the expected input formats
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    match Cli::parse().command {
        Command::Match(c) => c.exec(),
        Command::Report(c) => c.exec(),
        Command::Balances(c) => c.exec(),
        Command::Summary(c) => c.exec(),
        Command::Validate(c) => c.exec(),
        Command::Schema(c) => c.exec(),
    }
}
