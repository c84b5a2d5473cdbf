//! Autoboot command implementations

use anyhow::{Context, Result};

use pyr_core::config::RunnerConfig;
use pyr_core::{AutobootRegistrar, RunnerError, ScriptName};

use crate::output::{print_info, print_success, print_warning};

fn registrar(config: &RunnerConfig) -> AutobootRegistrar {
    AutobootRegistrar::new(&config.autoboot_file, &config.scripts_dir)
}

/// Show the current designation
pub fn autoboot_show(config: &RunnerConfig) -> Result<()> {
    let autoboot = registrar(config);
    match autoboot.get().context("Failed to read autoboot designation")? {
        Some(name) => {
            println!("{}", name);
            if !config.scripts_dir.join(&name).is_file() {
                print_warning(&format!(
                    "{} no longer exists in {}",
                    name,
                    config.scripts_dir.display()
                ));
            }
        }
        None => print_info("No autoboot script configured"),
    }
    Ok(())
}

/// Designate a script to run at boot
///
/// The script must exist in the scripts directory; whether it validates
/// is checked when it boots.
pub fn autoboot_set(config: &RunnerConfig, name: &str) -> Result<()> {
    let name = ScriptName::parse(name)?;
    registrar(config).set(&name).map_err(|e| match e {
        RunnerError::NotFound(_) => anyhow::anyhow!(
            "Script not found: {}",
            config.script_path(name.as_str()).display()
        ),
        other => anyhow::Error::new(other).context("Failed to write autoboot designation"),
    })?;
    print_success(&format!("{} will run at boot", name));
    Ok(())
}

/// Remove the designation
pub fn autoboot_clear(config: &RunnerConfig) -> Result<()> {
    registrar(config)
        .clear()
        .context("Failed to clear autoboot designation")?;
    print_success("Autoboot cleared");
    Ok(())
}
