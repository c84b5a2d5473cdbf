//! Validator error types

use thiserror::Error;

/// Errors raised while preparing a syntax tree for analysis
///
/// These never escape [`crate::Validator::validate`]; they are folded into an
/// invalid verdict so unparsable code is never treated as safe.
#[derive(Error, Debug)]
pub enum ValidatorError {
    /// The tree-sitter grammar could not be loaded
    #[error("failed to initialise Python parser: {0}")]
    ParserInit(String),

    /// The parser gave up without producing a tree
    #[error("parser produced no syntax tree")]
    NoTree,
}
