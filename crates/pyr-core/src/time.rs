//! Time utilities for PyRunner

use chrono::{DateTime, Local, TimeZone, Utc};
use std::time::{Duration, SystemTime};

/// Seconds as a float, the unit runtimes are reported in
pub fn runtime_secs(runtime: Duration) -> f64 {
    runtime.as_secs_f64()
}

/// Convert a filesystem timestamp to UTC
pub fn system_time_to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// Human-readable runtime such as `1h 02m 03s` or `4.2s`
pub fn format_runtime(runtime: Duration) -> String {
    let total = runtime.as_secs();
    if total < 60 {
        return format!("{:.1}s", runtime.as_secs_f64());
    }

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else {
        format!("{}m {:02}s", minutes, seconds)
    }
}

/// Timestamp written into log headers, in the host's local time
pub fn log_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}
