//! Output formatting utilities for the CLI
//!
//! Tables for scripts and external processes, verdict summaries, and
//! coloured status lines.

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use pyr_core::ipc::{ExternalProcess, ScriptRecord};
use pyr_validator::Verdict;

/// Format scripts as an ASCII table
///
/// The detailed view adds the first validation error or the missing
/// dependencies of each script.
pub fn format_scripts(scripts: &[ScriptRecord], detailed: bool) -> String {
    if scripts.is_empty() {
        return "No scripts".to_string();
    }

    #[derive(Tabled)]
    struct ScriptRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "SIZE")]
        size: String,
        #[tabled(rename = "MODIFIED")]
        modified: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "AUTOBOOT")]
        autoboot: String,
        #[tabled(rename = "LOG")]
        log: String,
    }

    #[derive(Tabled)]
    struct ScriptRowDetailed {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "SIZE")]
        size: String,
        #[tabled(rename = "MODIFIED")]
        modified: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "AUTOBOOT")]
        autoboot: String,
        #[tabled(rename = "LOG")]
        log: String,
        #[tabled(rename = "DETAILS")]
        details: String,
    }

    let flag = |on: bool| if on { "yes" } else { "-" }.to_string();

    if detailed {
        let rows: Vec<ScriptRowDetailed> = scripts
            .iter()
            .map(|s| ScriptRowDetailed {
                name: s.name.clone(),
                size: format_size(s.size),
                modified: s.modified.format("%Y-%m-%d %H:%M").to_string(),
                status: script_status(s).to_string(),
                autoboot: flag(s.is_autoboot),
                log: flag(s.has_log),
                details: script_details(s),
            })
            .collect();

        Table::new(rows)
            .with(Style::rounded())
            .with(Width::wrap(120))
            .to_string()
    } else {
        let rows: Vec<ScriptRow> = scripts
            .iter()
            .map(|s| ScriptRow {
                name: s.name.clone(),
                size: format_size(s.size),
                modified: s.modified.format("%Y-%m-%d %H:%M").to_string(),
                status: script_status(s).to_string(),
                autoboot: flag(s.is_autoboot),
                log: flag(s.has_log),
            })
            .collect();

        Table::new(rows).with(Style::rounded()).to_string()
    }
}

/// Format external script processes as an ASCII table
pub fn format_processes(processes: &[ExternalProcess]) -> String {
    if processes.is_empty() {
        return "No script processes running".to_string();
    }

    #[derive(Tabled)]
    struct ProcessRow {
        #[tabled(rename = "PID")]
        pid: u32,
        #[tabled(rename = "SCRIPT")]
        name: String,
        #[tabled(rename = "COMMAND")]
        cmdline: String,
    }

    let rows: Vec<ProcessRow> = processes
        .iter()
        .map(|p| ProcessRow {
            pid: p.pid,
            name: p.name.clone(),
            cmdline: truncate(&p.cmdline, 60),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// One-word status of a script
pub fn script_status(record: &ScriptRecord) -> &'static str {
    if record.is_running {
        "running"
    } else if !record.is_valid {
        "invalid"
    } else if !record.is_executable {
        "missing deps"
    } else {
        "ready"
    }
}

fn script_details(record: &ScriptRecord) -> String {
    if let Some(first) = record.errors.first() {
        if record.errors.len() > 1 {
            format!("{} (+{} more)", first, record.errors.len() - 1)
        } else {
            first.clone()
        }
    } else if !record.missing_deps.is_empty() {
        format!("needs {}", record.missing_deps.join(", "))
    } else {
        "-".to_string()
    }
}

/// Print a verdict the way `validate` reports it
pub fn print_verdict(file: &str, verdict: &Verdict) {
    if !verdict.is_valid {
        print_error(&format!(
            "{} has {} security violation(s)",
            file,
            verdict.errors.len()
        ));
        for error in &verdict.errors {
            println!("  {}", error);
        }
        return;
    }

    print_success(&format!("{} is valid", file));
    if !verdict.missing_deps.is_empty() {
        print_warning(&format!(
            "Missing dependencies: {}",
            verdict.missing_deps.join(", ")
        ));
    }
}

/// Format a byte count in human-readable form
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix, to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow, to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
