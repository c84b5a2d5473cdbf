//! Validate command implementation

use std::path::Path;

use anyhow::{Context, Result};

use pyr_core::config::RunnerConfig;
use pyr_orchestrator::ScriptRegistry;

use crate::output::print_verdict;

/// Check a local file against the validation policy
///
/// Sibling imports are resolved against the managed scripts directory,
/// since that is where the file would run. Returns whether it is valid.
pub fn validate_command(config: &RunnerConfig, file: &Path) -> Result<bool> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let script_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let registry = ScriptRegistry::new(config);
    let known = registry
        .known_local_names()
        .with_context(|| format!("Failed to read {}", config.scripts_dir.display()))?;

    let verdict = registry.validator().validate(&source, &script_name, &known);
    print_verdict(&script_name, &verdict);
    Ok(verdict.is_valid)
}
