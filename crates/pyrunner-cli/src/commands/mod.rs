//! CLI command implementations

mod autoboot;
mod boot;
mod config;
mod list;
mod serve;
mod validate;

pub use autoboot::{autoboot_clear, autoboot_set, autoboot_show};
pub use boot::boot_command;
pub use config::{config_init, config_path, config_show, load_runner_config};
pub use list::list_command;
pub use serve::serve_command;
pub use validate::validate_command;
