//! Annotated view of the managed scripts directory
//!
//! The directory is the source of truth. Verdicts are cached per file and
//! recomputed when the file's size or modification time changes; sibling
//! resolution happens on every read since it depends on the other files.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use dashmap::DashMap;

use pyr_core::config::RunnerConfig;
use pyr_core::ipc::ScriptRecord;
use pyr_core::time::system_time_to_utc;
use pyr_core::types::SCRIPT_EXTENSION;
use pyr_core::{RunState, RunnerError, ScriptName};
use pyr_validator::{Analysis, Validator, Verdict};

/// Result of accepting an uploaded file
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub name: ScriptName,
    pub verdict: Verdict,
    /// Where the script was written; `None` when it was rejected
    pub saved_to: Option<PathBuf>,
}

#[derive(Clone)]
struct CachedAnalysis {
    size: u64,
    modified: SystemTime,
    analysis: Analysis,
}

/// Scripts directory plus per-file verdict cache
pub struct ScriptRegistry {
    scripts_dir: PathBuf,
    log_dir: PathBuf,
    validator: Validator,
    cache: DashMap<ScriptName, CachedAnalysis>,
}

impl ScriptRegistry {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            scripts_dir: config.scripts_dir.clone(),
            log_dir: config.log_dir.clone(),
            validator: Validator::new(config.validation.clone(), &config.scripts_dir),
            cache: DashMap::new(),
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn script_path(&self, name: &ScriptName) -> PathBuf {
        self.scripts_dir.join(name.as_str())
    }

    /// `<log_dir>/<script>.py.log`, the one place log files are named
    pub fn log_path(&self, name: &ScriptName) -> PathBuf {
        self.log_dir.join(format!("{}.log", name))
    }

    /// Every `.py` file in the managed directory, sorted by name
    pub fn names(&self) -> Result<Vec<ScriptName>, RunnerError> {
        let entries = match std::fs::read_dir(&self.scripts_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !file_name.ends_with(&format!(".{}", SCRIPT_EXTENSION)) {
                continue;
            }
            if let Ok(name) = ScriptName::parse(file_name) {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    /// Module names of every script, for sibling resolution
    pub fn known_local_names(&self) -> Result<BTreeSet<String>, RunnerError> {
        Ok(self
            .names()?
            .iter()
            .map(|n| n.module_name().to_string())
            .collect())
    }

    /// Whether the script file exists
    pub fn exists(&self, name: &ScriptName) -> bool {
        self.script_path(name).is_file()
    }

    /// Script source
    pub fn read_source(&self, name: &ScriptName) -> Result<String, RunnerError> {
        let bytes = self.read_bytes(name)?;
        String::from_utf8(bytes).map_err(|_| RunnerError::NotUtf8(name.to_string()))
    }

    /// Current verdict for a script
    pub fn verdict(&self, name: &ScriptName) -> Result<Verdict, RunnerError> {
        let analysis = self.analysis(name)?;
        Ok(analysis.resolve(&self.known_local_names()?))
    }

    /// Annotated record for one script
    pub fn record(
        &self,
        name: &ScriptName,
        is_running: bool,
        autoboot: Option<&str>,
    ) -> Result<ScriptRecord, RunnerError> {
        let known = self.known_local_names()?;
        self.record_with(name, is_running, autoboot, &known)
    }

    /// Records for every script, sorted by name
    pub fn list(
        &self,
        is_running: impl Fn(&ScriptName) -> bool,
        autoboot: Option<&str>,
    ) -> Result<Vec<ScriptRecord>, RunnerError> {
        let names = self.names()?;
        let known: BTreeSet<String> = names.iter().map(|n| n.module_name().to_string()).collect();

        let mut records = Vec::with_capacity(names.len());
        for name in &names {
            match self.record_with(name, is_running(name), autoboot, &known) {
                Ok(record) => records.push(record),
                // Deleted between read_dir and stat
                Err(RunnerError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        // Entries that vanished from disk
        self.cache.retain(|name, _| names.binary_search(name).is_ok());
        Ok(records)
    }

    /// Validate an uploaded file and save it when it passes
    ///
    /// Invalid scripts are never written. A valid script replaces any file
    /// of the same name.
    pub fn save_upload(&self, file_name: &str, bytes: &[u8]) -> Result<UploadOutcome, RunnerError> {
        let name = ScriptName::parse(file_name)?;
        let source =
            std::str::from_utf8(bytes).map_err(|_| RunnerError::NotUtf8(name.to_string()))?;

        let known = self.known_local_names()?;
        let verdict = self.validator.validate(source, name.as_str(), &known);

        if !verdict.is_valid {
            tracing::info!(
                "Rejected upload {} ({} violations)",
                name,
                verdict.errors.len()
            );
            return Ok(UploadOutcome {
                name,
                verdict,
                saved_to: None,
            });
        }

        std::fs::create_dir_all(&self.scripts_dir)?;
        let path = self.script_path(&name);
        let tmp = self.scripts_dir.join(format!(".{}.upload", name));
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        self.cache.remove(&name);

        tracing::info!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(UploadOutcome {
            name,
            verdict,
            saved_to: Some(path),
        })
    }

    /// Remove a script and its log
    ///
    /// Callers must make sure the script is not running.
    pub fn delete(&self, name: &ScriptName) -> Result<(), RunnerError> {
        let path = self.script_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RunnerError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        self.cache.remove(name);

        match std::fs::remove_file(self.log_path(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove log for {}: {}", name, e),
        }

        tracing::info!("Deleted {}", name);
        Ok(())
    }

    /// Last persisted log, if any
    pub fn read_log(&self, name: &ScriptName) -> Result<Option<String>, RunnerError> {
        match std::fs::read(self.log_path(name)) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn record_with(
        &self,
        name: &ScriptName,
        is_running: bool,
        autoboot: Option<&str>,
        known: &BTreeSet<String>,
    ) -> Result<ScriptRecord, RunnerError> {
        let (size, modified, analysis) = self.analysis_with_meta(name)?;
        let verdict = analysis.resolve(known);

        Ok(ScriptRecord {
            name: name.to_string(),
            size,
            modified: system_time_to_utc(modified),
            is_valid: verdict.is_valid,
            is_executable: verdict.is_executable(),
            is_running,
            has_log: self.log_path(name).is_file(),
            is_autoboot: autoboot == Some(name.as_str()),
            validity: verdict.validity(),
            dependencies: verdict.dependencies(),
            state: if is_running {
                RunState::Running
            } else {
                RunState::Idle
            },
            errors: verdict.errors,
            missing_deps: verdict.missing_deps,
        })
    }

    fn analysis(&self, name: &ScriptName) -> Result<Analysis, RunnerError> {
        self.analysis_with_meta(name).map(|(_, _, analysis)| analysis)
    }

    fn analysis_with_meta(
        &self,
        name: &ScriptName,
    ) -> Result<(u64, SystemTime, Analysis), RunnerError> {
        let path = self.script_path(name);
        let meta = match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(RunnerError::NotFound(name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RunnerError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let size = meta.len();
        let modified = meta.modified()?;

        if let Some(cached) = self.cache.get(name) {
            if cached.size == size && cached.modified == modified {
                return Ok((size, modified, cached.analysis.clone()));
            }
        }

        let bytes = self.read_bytes(name)?;
        let analysis = match std::str::from_utf8(&bytes) {
            Ok(source) => self.validator.analyze_script(source, name.as_str()),
            // Files copied in by hand can bypass the upload check
            Err(_) => Analysis {
                errors: vec!["File is not valid UTF-8 text".to_string()],
                local_imports: BTreeSet::new(),
            },
        };

        tracing::debug!("Analyzed {} ({} errors)", name, analysis.errors.len());
        self.cache.insert(
            name.clone(),
            CachedAnalysis {
                size,
                modified,
                analysis: analysis.clone(),
            },
        );
        Ok((size, modified, analysis))
    }

    fn read_bytes(&self, name: &ScriptName) -> Result<Vec<u8>, RunnerError> {
        match std::fs::read(self.script_path(name)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RunnerError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
