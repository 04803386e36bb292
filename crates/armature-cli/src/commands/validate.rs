//! `arma validate` - parse and validate a form file without building it.

use crate::cli::OutputFormat;
use crate::config::CliConfig;
use anyhow::{bail, Context, Result};
use armature_core::FormSpec;
use colored::Colorize;
use std::path::PathBuf;

pub async fn execute(config: CliConfig, file: PathBuf, format: OutputFormat) -> Result<()> {
    let path = config.resolve_form_path(&file);
    let spec = FormSpec::from_file(&path)
        .with_context(|| format!("failed to load form from '{}'", path.display()))?;

    let issues = spec.validate();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "name": spec.name,
                    "fields": spec.field_count(),
                    "valid": issues.is_empty(),
                    "issues": issues,
                }))?
            );
        }
        OutputFormat::Table => {
            if issues.is_empty() {
                println!(
                    "{} {} ({} fields)",
                    "OK".green().bold(),
                    spec.name.bold(),
                    spec.field_count()
                );
            } else {
                println!(
                    "{} {} has {} issue(s):",
                    "INVALID".red().bold(),
                    spec.name.bold(),
                    issues.len()
                );
                for issue in &issues {
                    println!("  {} {}", issue.path.yellow(), issue.message);
                }
            }
        }
    }

    if !issues.is_empty() {
        bail!("form '{}' failed validation", spec.name);
    }
    Ok(())
}
