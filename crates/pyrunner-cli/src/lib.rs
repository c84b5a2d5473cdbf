//! pyrunner: command-line interface for PyRunner
//!
//! Provides the `pyrunner` CLI for running the web service, validating
//! scripts offline, launching the autoboot script and managing
//! configuration.

pub mod commands;
pub mod output;
