use crate::cmd::{process, EngineArgs, InputArgs};
use crate::report::{self, ReportOptions};
use anyhow::Context;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ReportCommand {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    engine: EngineArgs,

    /// Directory the CSV reports are written to
    #[arg(short, long, default_value = "reports")]
    output: PathBuf,

    /// Write into a new subdirectory named after the current time
    #[arg(long)]
    timestamped: bool,
}

impl ReportCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (fifo, mapping) = process(&self.input, &self.engine)?;

        if self.engine.rematch {
            if let Some(path) = &self.engine.mapping {
                mapping
                    .write_json(path)
                    .with_context(|| format!("saving mapping {}", path.display()))?;
                log::info!("Saved {} matched buys to {}", mapping.len(), path.display());
            }
        }

        let dir = self.output_dir();
        let options = ReportOptions {
            currency: self.engine.currency.clone(),
        };
        let written = report::write_all(&fifo, &options, &dir)
            .with_context(|| format!("writing reports to {}", dir.display()))?;

        println!("Wrote {} reports to {}", written.len(), dir.display());
        for path in &written {
            if let Some(name) = path.file_name() {
                println!("  {}", name.to_string_lossy());
            }
        }
        for balance in fifo.closing_balances() {
            log::info!(
                "Closing {}: {} units in {} lots",
                balance.asset,
                balance.units,
                balance.lots.len()
            );
        }
        if !fifo.warnings.is_empty() {
            println!();
            println!(
                "{} warning(s); run `fifotax validate` for details",
                fifo.warnings.len()
            );
        }
        Ok(())
    }

    fn output_dir(&self) -> PathBuf {
        if self.timestamped {
            let stamp = chrono::Local::now().format("%Y_%m_%d_%H%M").to_string();
            self.output.join(stamp)
        } else {
            self.output.clone()
        }
    }
}
