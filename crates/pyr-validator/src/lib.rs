//! pyr-validator: Static security validator for PyRunner guest scripts
//!
//! Guest scripts are never executed to decide whether they are safe. Instead
//! the source is parsed with the tree-sitter Python grammar and the syntax
//! tree is walked for blocked imports, dangerous builtin calls and file
//! operations outside the managed directory. Bare imports of sibling scripts
//! that have not been uploaded yet are reported separately as missing
//! dependencies.

mod error;
mod paths;
mod policy;
mod stdlib;
mod verdict;
mod visitor;

pub use error::ValidatorError;
pub use policy::ValidationPolicy;
pub use verdict::{Analysis, Dependencies, Validity, Verdict};
pub use visitor::Validator;
