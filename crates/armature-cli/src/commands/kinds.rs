//! `arma kinds` - list the widget kinds of the default composition root.

use crate::cli::OutputFormat;
use crate::factories;
use anyhow::Result;
use colored::Colorize;

pub async fn execute(format: OutputFormat) -> Result<()> {
    let container = factories::default_container();
    let kinds = factories::registered_widget_kinds(&container);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&kinds)?);
        }
        OutputFormat::Table => {
            println!("{}", "Registered widget kinds:".bold());
            for kind in kinds {
                println!("  {kind}");
            }
        }
    }
    Ok(())
}
