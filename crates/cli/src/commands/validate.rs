//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{DestinationKind, SpreaderConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    asynchronous: bool,
    keep_cached: bool,
    wait_for_finish: bool,
    chunk_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    flush_timeout_ms: Option<u64>,
    destinations: Vec<String>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    asynchronous: config.asynchronous,
                    keep_cached: config.keep_cached,
                    wait_for_finish: config.wait_for_finish,
                    chunk_size: config.chunk_size,
                    flush_timeout_ms: config.flush_timeout_ms,
                    destinations: config
                        .destinations
                        .iter()
                        .map(|d| format!("{} ({:?})", d.name, d.kind))
                        .collect(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &SpreaderConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.destinations.is_empty() {
        warnings.push("No destinations configured - `run` needs at least one --output".to_string());
    }

    for destination in &config.destinations {
        if destination.kind == DestinationKind::Memory {
            warnings.push(format!(
                "Destination '{}' is in-memory - its data is dropped when the run ends",
                destination.name
            ));
        }
    }

    if config.wait_for_finish && config.flush_timeout_ms.is_none() {
        warnings.push(
            "wait_for_finish without flush_timeout_ms - a flush before finish blocks indefinitely"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Asynchronous: {}", summary.asynchronous);
            println!("  Keep cached: {}", summary.keep_cached);
            println!("  Wait for finish: {}", summary.wait_for_finish);
            println!("  Chunk size: {}", summary.chunk_size);
            println!("  Destinations ({}):", summary.destinations.len());
            for destination in &summary.destinations {
                println!("    - {}", destination);
            }
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
