//! Persisted "run at boot" designation
//!
//! A single script name stored in a small text file. Writes go to a
//! temporary sibling and are renamed into place, so a reader never sees a
//! partial name.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::RunnerError;
use crate::types::ScriptName;

/// Owner of the autoboot file
#[derive(Debug)]
pub struct AutobootRegistrar {
    path: PathBuf,
    scripts_dir: PathBuf,
    lock: Mutex<()>,
}

impl AutobootRegistrar {
    pub fn new(path: impl Into<PathBuf>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scripts_dir: scripts_dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// File the designation is persisted to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current designation, if any
    ///
    /// The named script may have been removed since it was designated.
    pub fn get(&self) -> Result<Option<String>, RunnerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read()
    }

    /// Designate `name`, replacing any previous designation
    ///
    /// Only existence is checked; validity is decided at boot.
    pub fn set(&self, name: &ScriptName) -> Result<(), RunnerError> {
        if !self.scripts_dir.join(name.as_str()).is_file() {
            return Err(RunnerError::NotFound(name.to_string()));
        }

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, format!("{}\n", name))?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::info!("Autoboot set to {}", name);
        Ok(())
    }

    /// Remove the designation. Clearing an empty designation is a no-op.
    pub fn clear(&self) -> Result<(), RunnerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("Autoboot cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Clear the designation only if it currently names `name`
    ///
    /// Returns whether anything was cleared.
    pub fn clear_if(&self, name: &str) -> Result<bool, RunnerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.read()?.as_deref() != Some(name) {
            return Ok(false);
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!("Autoboot cleared ({} removed)", name);
        Ok(true)
    }

    fn read(&self) -> Result<Option<String>, RunnerError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let name = content.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, AutobootRegistrar) {
        let dir = TempDir::new().unwrap();
        let scripts = dir.path().join("code");
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join("blink.py"), "print('hi')\n").unwrap();
        let registrar = AutobootRegistrar::new(dir.path().join("state/autoboot.txt"), &scripts);
        (dir, registrar)
    }

    fn name(s: &str) -> ScriptName {
        ScriptName::parse(s).unwrap()
    }

    #[test]
    fn test_empty_by_default() {
        let (_dir, registrar) = setup();
        assert_eq!(registrar.get().unwrap(), None);
    }

    #[test]
    fn test_set_survives_new_registrar() {
        let (dir, registrar) = setup();
        registrar.set(&name("blink.py")).unwrap();
        assert_eq!(registrar.get().unwrap().as_deref(), Some("blink.py"));

        let reopened =
            AutobootRegistrar::new(dir.path().join("state/autoboot.txt"), dir.path().join("code"));
        assert_eq!(reopened.get().unwrap().as_deref(), Some("blink.py"));
    }

    #[test]
    fn test_set_requires_existing_script() {
        let (_dir, registrar) = setup();
        let result = registrar.set(&name("ghost.py"));
        assert!(matches!(result, Err(RunnerError::NotFound(_))));
        assert_eq!(registrar.get().unwrap(), None);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (_dir, registrar) = setup();
        registrar.clear().unwrap();
        registrar.set(&name("blink.py")).unwrap();
        registrar.clear().unwrap();
        registrar.clear().unwrap();
        assert_eq!(registrar.get().unwrap(), None);
    }

    #[test]
    fn test_clear_if_matches_only() {
        let (_dir, registrar) = setup();
        registrar.set(&name("blink.py")).unwrap();
        assert!(!registrar.clear_if("other.py").unwrap());
        assert_eq!(registrar.get().unwrap().as_deref(), Some("blink.py"));
        assert!(registrar.clear_if("blink.py").unwrap());
        assert_eq!(registrar.get().unwrap(), None);
    }

    #[test]
    fn test_stale_designation_is_tolerated() {
        let (dir, registrar) = setup();
        registrar.set(&name("blink.py")).unwrap();
        std::fs::remove_file(dir.path().join("code/blink.py")).unwrap();
        assert_eq!(registrar.get().unwrap().as_deref(), Some("blink.py"));
    }
}
