//! Config command - inspect and edit the checker settings.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;
use serde_json::Value;

use nfse_core::models::config::NfseConfig;

use crate::context::default_config_path;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Write a configuration file with default settings
    Init {
        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Get a value by dotted key (e.g. "validation.regime_check_enabled")
    Get { key: String },

    /// Set a value by dotted key
    Set { key: String, value: String },

    /// Show configuration file path
    Path,
}

/// Run a config subcommand against `path`, or the default location.
pub fn run(args: ConfigArgs, path: Option<&str>) -> anyhow::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(default_config_path);

    match args.command {
        ConfigCommand::Show => show_config(&config_path),
        ConfigCommand::Init { force } => init_config(&config_path, force),
        ConfigCommand::Get { key } => {
            let json = serde_json::to_value(load_or_default(&config_path)?)?;
            println!("{}", serde_json::to_string_pretty(get_key(&json, &key)?)?);
            Ok(())
        }
        ConfigCommand::Set { key, value } => set_config(&config_path, &key, &value),
        ConfigCommand::Path => show_path(&config_path),
    }
}

fn load_or_default(path: &Path) -> anyhow::Result<NfseConfig> {
    if path.exists() {
        Ok(NfseConfig::from_file(path)?)
    } else {
        Ok(NfseConfig::default())
    }
}

fn show_config(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        println!(
            "{} No config file found, showing defaults.",
            style("ℹ").blue()
        );
    }

    let mut json = serde_json::to_value(load_or_default(path)?)?;

    // never echo the service token
    if let Some(token) = json.pointer_mut("/regime_service/token") {
        if !token.is_null() {
            *token = Value::String("********".to_string());
        }
    }

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    NfseConfig::default().save(path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        path.display()
    );
    Ok(())
}

fn set_config(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let mut json = serde_json::to_value(load_or_default(path)?)?;

    // bare words are taken as strings
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    set_key(&mut json, key, parsed.clone())?;

    let config: NfseConfig = serde_json::from_value(json)
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    config.save(path)?;

    let shown = if key.ends_with("token") && !parsed.is_null() {
        "\"********\"".to_string()
    } else {
        serde_json::to_string(&parsed)?
    };
    println!("{} Set {} = {}", style("✓").green(), key, shown);
    Ok(())
}

fn show_path(path: &Path) -> anyhow::Result<()> {
    println!("Configuration file: {}", path.display());

    if path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'nfse config init' to create a configuration file.");
    }

    Ok(())
}

fn get_key<'a>(json: &'a Value, key: &str) -> anyhow::Result<&'a Value> {
    key.split('.').try_fold(json, |current, part| {
        current
            .get(part)
            .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))
    })
}

/// Only existing keys can be set.
fn set_key(json: &mut Value, key: &str, value: Value) -> anyhow::Result<()> {
    let (parent, last) = match key.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, key),
    };

    let mut current = json;
    if let Some(parent) = parent {
        for part in parent.split('.') {
            current = current
                .get_mut(part)
                .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;
        }
    }

    match current.as_object_mut() {
        Some(obj) if obj.contains_key(last) => {
            obj.insert(last.to_string(), value);
            Ok(())
        }
        Some(_) => anyhow::bail!("Configuration key not found: {}", key),
        None => anyhow::bail!("Cannot set value at non-object path: {}", key),
    }
}
