//! Schema command - print expected input formats

use crate::core::{BuyForOthersMapping, LedgerRecord};
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Output format: csv-header, csv-fields or mapping
    #[arg(value_enum, default_value = "csv-fields")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// CSV header row of a ledger file
    CsvHeader,
    /// Ledger column descriptions
    CsvFields,
    /// JSON Schema for the buy-for-others mapping file
    Mapping,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::CsvHeader => {
                println!("{}", LedgerRecord::csv_header().join(","));
            }
            SchemaFormat::CsvFields => print_csv_fields(),
            SchemaFormat::Mapping => {
                let schema = schema_for!(BuyForOthersMapping);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
        }
        Ok(())
    }
}

fn print_csv_fields() {
    println!("Ledger CSV Format");
    println!("=================");
    println!();
    for field in LedgerRecord::csv_schema() {
        let req = if field.required { "required" } else { "optional" };
        println!("{:20} ({:8})  {}", field.name, req, field.description);
    }
    println!();
    println!("Quantity is signed: positive for inflows, negative for outflows.");
    println!("Value is the unsigned fiat amount of the row.");
}
