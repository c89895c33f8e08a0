//! Match command - find buys made on behalf of someone else

use crate::cmd::InputArgs;
use clap::Args;
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

#[derive(Args, Debug)]
pub struct MatchCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Where to write the mapping
    #[arg(short, long, default_value = "buys_for_others.json")]
    output: PathBuf,

    /// Print the matches instead of writing them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Tabled)]
struct MatchRow {
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Buy Ref")]
    buy_reference: String,
    #[tabled(rename = "Bought")]
    buy_qty: String,
    #[tabled(rename = "Sent")]
    other_qty: String,
    #[tabled(rename = "Sent At")]
    other_timestamp: String,
    #[tabled(rename = "Description")]
    other_desc: String,
}

impl MatchCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let entries = self.input.load()?;
        let mapping = self.input.find_matches(&entries)?;

        if self.dry_run {
            let rows: Vec<MatchRow> = mapping
                .assets()
                .flat_map(|(asset, buys)| {
                    buys.iter().map(move |(reference, t)| MatchRow {
                        asset: asset.clone(),
                        buy_reference: reference.clone(),
                        buy_qty: t.buy_qty.to_string(),
                        other_qty: t.other_qty.to_string(),
                        other_timestamp: t.other_timestamp.clone(),
                        other_desc: t.other_desc.clone(),
                    })
                })
                .collect();
            if rows.is_empty() {
                println!("No buys matched to outflows");
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
            return Ok(());
        }

        mapping.write_json(&self.output)?;
        println!("Wrote {}", self.output.display());
        for (asset, buys) in mapping.assets() {
            println!("  {}: {} buys matched to others", asset, buys.len());
        }
        Ok(())
    }
}
