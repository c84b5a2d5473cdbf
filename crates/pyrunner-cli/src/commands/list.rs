//! List command implementation

use std::collections::HashSet;

use anyhow::{Context, Result};

use pyr_core::config::RunnerConfig;
use pyr_core::AutobootRegistrar;
use pyr_orchestrator::{Reconciler, ScriptRegistry};

use crate::output::{format_processes, format_scripts};

/// List managed scripts and any script processes running on this host
pub fn list_command(config: &RunnerConfig, long: bool) -> Result<()> {
    let registry = ScriptRegistry::new(config);
    let autoboot = AutobootRegistrar::new(&config.autoboot_file, &config.scripts_dir);
    let designated = autoboot.get().context("Failed to read autoboot designation")?;

    let reconciler = Reconciler::new(&config.scripts_dir, config.stop_grace_period);
    let processes = reconciler.scan(&HashSet::new());
    let running: HashSet<&str> = processes.iter().map(|p| p.name.as_str()).collect();

    let scripts = registry
        .list(|name| running.contains(name.as_str()), designated.as_deref())
        .with_context(|| format!("Failed to list {}", config.scripts_dir.display()))?;

    println!("Scripts in {}:", config.scripts_dir.display());
    println!("{}", format_scripts(&scripts, long));

    if !processes.is_empty() {
        println!("\nRunning Processes:");
        println!("{}", format_processes(&processes));
    }

    Ok(())
}
