//! Configuration management subcommands
//!
//! - init: Create a new configuration file
//! - show: Print the effective configuration
//! - schema: Print the JSON schema
//! - validate: Validate a configuration file

use anyhow::{Context, Result, bail};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use testmate_core::config::{
    DEFAULT_PARALLEL_JOBS, DEFAULT_PATTERN, DEFAULT_WATCH_TIMEOUT_SEC, DiscoveryConfiguration,
    ExecutionConfiguration,
};
use testmate_core::{ConfigLoader, ExecutableEntry, TestmateConfig};
use tracing::debug;

use crate::ConfigFormat;

fn file_name(format: ConfigFormat) -> &'static str {
    match format {
        ConfigFormat::Json => ".testmaterc.json",
        ConfigFormat::Toml => ".testmaterc.toml",
        ConfigFormat::Yaml => "testmate.yaml",
    }
}

/// Configuration written by `config init`
fn starter_config() -> TestmateConfig {
    TestmateConfig {
        executables: Some(vec![ExecutableEntry::Pattern(DEFAULT_PATTERN.to_string())]),
        execution: Some(ExecutionConfiguration {
            parallel_jobs: Some(DEFAULT_PARALLEL_JOBS),
            running_timeout_sec: None,
        }),
        discovery: Some(DiscoveryConfiguration {
            watch_timeout_sec: Some(DEFAULT_WATCH_TIMEOUT_SEC),
            ..Default::default()
        }),
    }
}

/// Config init command implementation
pub fn init_command(workspace: &Path, format: ConfigFormat, force: bool) -> Result<()> {
    debug!("Initializing configuration file with format: {:?}", format);
    let config_path = workspace.join(file_name(format));

    if config_path.exists() && !force {
        bail!(
            "Configuration file '{}' already exists. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = starter_config();
    let content = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(&config)?,
        ConfigFormat::Toml => toml::to_string_pretty(&config)?,
    };
    fs::write(&config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("{} Created {}", "✓".green(), config_path.display());
    Ok(())
}

/// Config show command implementation
pub fn show_command(workspace: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = ConfigLoader::load(config_path, workspace)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Config schema command implementation
pub fn schema_command() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&TestmateConfig::json_schema())?);
    Ok(())
}

/// Config validate command implementation
pub fn validate_command(workspace: &Path, path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => ConfigLoader::auto_discover(workspace)?.with_context(|| {
            format!("No configuration file found from {}", workspace.display())
        })?,
    };
    debug!("Validating configuration file: {}", path.display());

    let config = ConfigLoader::load_from_file(&path)
        .with_context(|| format!("Configuration {} is invalid", path.display()))?;

    println!("{} Configuration is valid", "✓".green());
    println!("   File: {}", path.display());
    println!("   Patterns: {}", config.executable_patterns().len());
    println!("   Parallel jobs: {}", config.parallel_jobs());
    Ok(())
}
