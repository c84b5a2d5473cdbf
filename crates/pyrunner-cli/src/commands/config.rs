//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use pyr_core::config::{self, RunnerConfig};

use crate::output::{print_error, print_info, print_success};

/// Config file to use: the `--config` argument or the default location
pub fn config_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Load the runner configuration, defaults filling anything unset
pub fn load_runner_config(path: &Path) -> Result<RunnerConfig> {
    config::load_or_default(path)
        .with_context(|| format!("Failed to load config from {:?}", path))
}

/// Show the effective configuration
pub fn config_show(path: &Path) -> Result<()> {
    let config = load_runner_config(path)?;

    if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
    } else {
        print_info(&format!("No configuration file at {:?}, showing defaults", path));
    }
    println!();

    let content = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("{}", content);
    Ok(())
}

/// Write a configuration file with every default spelled out
pub fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(path, &RunnerConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}
