//! Validator verdicts

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Raw findings for one source text, independent of which siblings exist
///
/// Registries cache this per file and resolve it against the current set of
/// sibling scripts whenever a listing is produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Analysis {
    /// Human-readable violations, in source order
    pub errors: Vec<String>,
    /// Bare imports that look like sibling scripts
    pub local_imports: BTreeSet<String>,
}

impl Analysis {
    /// Resolve against the names of scripts currently in the managed
    /// directory (module names, without the `.py` extension)
    pub fn resolve(&self, known_local_names: &BTreeSet<String>) -> Verdict {
        // Unparsable or blocked code does not get a dependency report
        let missing_deps = if self.errors.is_empty() {
            self.local_imports
                .difference(known_local_names)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        Verdict {
            is_valid: self.errors.is_empty(),
            errors: self.errors.clone(),
            missing_deps,
        }
    }
}

/// The tuple (is_valid, errors, missing_deps) for one guest script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// No blocked capability was found and the source parsed
    pub is_valid: bool,
    /// Violations, in source order
    pub errors: Vec<String>,
    /// Sibling scripts imported but not present, sorted
    pub missing_deps: Vec<String>,
}

impl Verdict {
    /// Valid and every local dependency is present
    pub fn is_executable(&self) -> bool {
        self.is_valid && self.missing_deps.is_empty()
    }

    /// Validity as a tagged value
    pub fn validity(&self) -> Validity {
        if self.is_valid {
            Validity::Valid
        } else {
            Validity::Invalid
        }
    }

    /// Dependency completeness as a tagged value
    pub fn dependencies(&self) -> Dependencies {
        if self.missing_deps.is_empty() {
            Dependencies::Complete
        } else {
            Dependencies::MissingDeps
        }
    }
}

/// Whether a script passed the security scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    Valid,
    Invalid,
}

/// Whether every sibling a script imports is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependencies {
    Complete,
    MissingDeps,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_reports_missing_siblings() {
        let analysis = Analysis {
            errors: vec![],
            local_imports: names(&["b", "c"]),
        };

        let verdict = analysis.resolve(&names(&["a", "c"]));
        assert!(verdict.is_valid);
        assert_eq!(verdict.missing_deps, vec!["b".to_string()]);
        assert!(!verdict.is_executable());
        assert_eq!(verdict.dependencies(), Dependencies::MissingDeps);

        let verdict = analysis.resolve(&names(&["a", "b", "c"]));
        assert!(verdict.is_executable());
        assert_eq!(verdict.validity(), Validity::Valid);
    }

    #[test]
    fn test_invalid_analysis_is_never_executable() {
        let analysis = Analysis {
            errors: vec!["Line 1: Blocked import 'socket'".to_string()],
            local_imports: BTreeSet::new(),
        };
        let verdict = analysis.resolve(&BTreeSet::new());
        assert!(!verdict.is_valid);
        assert!(!verdict.is_executable());
        assert_eq!(verdict.validity(), Validity::Invalid);
    }
}
