//! Handler functions for config CLI commands.
//!
//! Implements `vitrine config {path,get,show,init,export}`.

use std::io::Write;
use std::path::PathBuf;

use vitrine_core::{Error, Result};

use crate::cli::ConfigAction;
use crate::config::VitrineConfig;

// ============================================================================
// Command dispatch
// ============================================================================

/// Handle a config subcommand.
///
/// Receives the raw `--config` path (not a loaded config) because some
/// commands (path, init) work before a config file exists.
pub fn handle_config_command(config_path: Option<&str>, action: ConfigAction) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match action {
        ConfigAction::Path => cmd_config_path(config_path, &mut out),
        ConfigAction::Get { key } => {
            let config = VitrineConfig::load(config_path)?;
            cmd_config_get(&config, &key, &mut out)
        }
        ConfigAction::Show => {
            let config = VitrineConfig::load(config_path)?;
            write!(out, "{}", config.to_toml_string()?)?;
            Ok(())
        }
        ConfigAction::Init { file, force } => cmd_config_init(file.as_deref(), force, &mut out),
        ConfigAction::Export { docker_env } => {
            let config = VitrineConfig::load(config_path)?;
            cmd_config_export(&config, docker_env, &mut out)
        }
    }
}

// ============================================================================
// Command handlers
// ============================================================================

fn cmd_config_path(config_path: Option<&str>, out: &mut impl Write) -> Result<()> {
    match VitrineConfig::resolve_config_path(config_path) {
        Some(path) => {
            writeln!(out, "{}", path.display())?;
            if !path.exists() {
                eprintln!("(file does not exist; run `vitrine config init` to create it)");
            }
            Ok(())
        }
        None => Err(Error::config(
            "Could not determine config directory for this platform",
        )),
    }
}

fn cmd_config_get(config: &VitrineConfig, key: &str, out: &mut impl Write) -> Result<()> {
    let value = toml::Value::try_from(config).map_err(|e| Error::config(e.to_string()))?;
    match get_nested_value(&value, key) {
        Some(val) => {
            writeln!(out, "{}", format_toml_value(val))?;
            Ok(())
        }
        None => Err(Error::config(format!(
            "Key '{key}' not found in configuration"
        ))),
    }
}

fn cmd_config_init(file: Option<&str>, force: bool, out: &mut impl Write) -> Result<()> {
    let path = match file {
        Some(p) => PathBuf::from(p),
        None => VitrineConfig::default_config_path()
            .ok_or_else(|| Error::config("Could not determine config directory"))?,
    };

    if path.exists() && !force {
        return Err(Error::config(format!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, VitrineConfig::default().to_toml_string()?)?;

    writeln!(out, "Config file created at {}", path.display())?;
    Ok(())
}

fn cmd_config_export(config: &VitrineConfig, docker_env: bool, out: &mut impl Write) -> Result<()> {
    for (key, value) in config.to_env_vars()? {
        if docker_env {
            writeln!(out, "--env {key}={value}")?;
        } else {
            writeln!(out, "{key}={value}")?;
        }
    }
    Ok(())
}

// ============================================================================
// TOML dotted-key helpers
// ============================================================================

/// Navigate a dotted key path in a TOML value tree.
fn get_nested_value<'a>(value: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.')
        .try_fold(value, |current, part| current.as_table()?.get(part))
}

fn format_toml_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
