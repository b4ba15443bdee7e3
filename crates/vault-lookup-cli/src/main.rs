use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;
use vault_lookup::{LookupOptions, MemoryContext, VaultLookup};

mod config;

use config::Overrides;

/// Look up keys in Vault the way the hiera backend would
#[derive(Parser, Debug)]
#[command(name = "vault-lookup")]
#[command(about = "Look up hierarchical configuration keys in a Vault KV store")]
#[command(version)]
struct Args {
    /// Keys to look up
    #[arg(required = true)]
    keys: Vec<String>,

    /// Path to options file (default: <config dir>/vault-lookup/options.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Vault address (overrides VAULT_ADDR)
    #[arg(short, long)]
    address: Option<String>,

    /// Token, token file path, or IGNORE-VAULT (overrides VAULT_TOKEN)
    #[arg(short, long)]
    token: Option<String>,

    /// Mount and prefix to search, e.g. puppet=nodes/web01 (repeatable, in order)
    #[arg(short, long = "mount", value_name = "MOUNT=PREFIX", value_parser = config::parse_mount)]
    mounts: Vec<(String, String)>,

    /// Field to extract from each secret
    #[arg(long)]
    default_field: Option<String>,

    /// How to interpret the extracted field: string or json
    #[arg(long)]
    default_field_parse: Option<String>,

    /// What to do when the field is missing: ignore or only
    #[arg(long)]
    default_field_behavior: Option<String>,

    /// Keep searching when a path cannot be read
    #[arg(long)]
    continue_if_not_found: bool,

    /// Print lookup diagnostics to stderr
    #[arg(short, long)]
    explain: bool,

    /// Print compact JSON
    #[arg(long)]
    compact: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            address: self.address.clone(),
            token: self.token.clone(),
            mounts: self.mounts.clone(),
            default_field: self.default_field.clone(),
            default_field_parse: self.default_field_parse.clone(),
            default_field_behavior: self.default_field_behavior.clone(),
            continue_if_not_found: self.continue_if_not_found,
        }
    }
}

fn main() -> Result<ExitCode> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vault_lookup=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let raw = config::resolve(args.config.as_deref(), &args.overrides())
        .context("Failed to load lookup options")?;
    let options = LookupOptions::from_value(&raw).context("Invalid lookup options")?;

    let backend = VaultLookup::new();
    let context = MemoryContext::new();

    let mut found = Map::new();
    let mut missing = 0usize;
    let mut printed = 0usize;
    for key in &args.keys {
        let result = backend.lookup(key, &options, &context);
        if args.explain {
            let explanations = context.explanations();
            for line in &explanations[printed..] {
                eprintln!("{}", line);
            }
            printed = explanations.len();
        }

        match result.with_context(|| format!("Lookup of '{}' failed", key))? {
            Some(value) => {
                found.insert(key.clone(), value);
            }
            None => {
                tracing::info!("No value found for '{}'", key);
                missing += 1;
            }
        }
    }

    if let Some(output) = render(&args.keys, found, args.compact)? {
        println!("{}", output);
    }

    Ok(if missing == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// Format the results: a single key prints its value, several keys print an
/// object with `null` for keys that were not found
fn render(keys: &[String], mut found: Map<String, Value>, compact: bool) -> Result<Option<String>> {
    let output = match keys {
        [key] => match found.remove(key) {
            Some(value) => value,
            None => return Ok(None),
        },
        _ => Value::Object(
            keys.iter()
                .map(|key| (key.clone(), found.remove(key).unwrap_or(Value::Null)))
                .collect(),
        ),
    };

    let text = if compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };
    Ok(Some(text))
}
