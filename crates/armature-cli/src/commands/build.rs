//! `arma build` - construct the widget tree described by a form file.

use crate::cli::OutputFormat;
use crate::config::CliConfig;
use crate::factories;
use crate::formatting::{render_metrics_table, render_tree};
use anyhow::{Context, Result};
use armature_core::{FormBuilder, FormSpec};
use colored::Colorize;
use std::path::PathBuf;

pub async fn execute(config: CliConfig, file: PathBuf, format: OutputFormat) -> Result<()> {
    let path = config.resolve_form_path(&file);
    let spec = FormSpec::from_file(&path)
        .with_context(|| format!("failed to load form from '{}'", path.display()))?;

    let container = factories::default_container();
    let builder = FormBuilder::new(container).with_options(config.build_options());
    let built = builder
        .build(spec)
        .await
        .with_context(|| format!("failed to build form '{}'", path.display()))?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&built.report())?);
        }
        OutputFormat::Table => {
            println!(
                "{} {} ({} widgets, ready in {}ms)",
                "Built".green().bold(),
                built.form_name.bold(),
                built.widgets.len(),
                built.metrics.total_ms
            );
            println!();
            print!("{}", render_tree(&built.describe()));
            println!();
            println!("{}", render_metrics_table(&built.metrics));
            println!(
                "{} {}",
                "ready order:".dimmed(),
                built.ready_order.join(" → ")
            );
        }
    }

    Ok(())
}
