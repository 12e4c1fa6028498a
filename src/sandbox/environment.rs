use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::EngineError;

/// An isolated interpreter + package manager installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    root: PathBuf,
}

impl RuntimeEnvironment {
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the interpreter executable inside the environment
    pub fn interpreter(&self) -> PathBuf {
        if cfg!(windows) {
            self.root.join("Scripts").join("python.exe")
        } else {
            self.root.join("bin").join("python")
        }
    }

    /// Path to the package manager executable inside the environment
    pub fn package_manager(&self) -> PathBuf {
        if cfg!(windows) {
            self.root.join("Scripts").join("pip.exe")
        } else {
            self.root.join("bin").join("pip")
        }
    }

    fn exists(&self) -> bool {
        self.interpreter().exists()
    }
}

/// Lazily creates the isolated runtime and hands it out to jobs.
///
/// Creation runs at most once per provisioner, even under concurrent first
/// access. A failed creation is remembered and reported to every later
/// caller instead of being retried.
pub struct EnvironmentProvisioner {
    location: PathBuf,
    base_interpreter: String,
    state: OnceLock<Result<RuntimeEnvironment, String>>,
    init_lock: Mutex<()>,
}

impl EnvironmentProvisioner {
    pub fn new(location: impl Into<PathBuf>, base_interpreter: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            base_interpreter: base_interpreter.into(),
            state: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Returns the environment, creating it first if needed.
    ///
    /// This blocks while the environment is being created; async callers
    /// should go through [`EnvironmentProvisioner::ensure_async`].
    pub fn ensure(&self) -> Result<RuntimeEnvironment, EngineError> {
        if let Some(state) = self.state.get() {
            return Self::to_result(state);
        }

        let _guard = self.init_lock.lock();
        // Another caller may have finished while we waited for the lock
        if let Some(state) = self.state.get() {
            return Self::to_result(state);
        }

        let state = self.provision();
        if let Err(e) = &state {
            log::error!(
                "Failed to create runtime environment at {}: {e}",
                self.location.display()
            );
        }
        Self::to_result(self.state.get_or_init(|| state))
    }

    /// Async front-end to [`EnvironmentProvisioner::ensure`]; creation runs
    /// on the blocking thread pool, later calls return without leaving the
    /// current task.
    pub async fn ensure_async(self: &Arc<Self>) -> Result<RuntimeEnvironment, EngineError> {
        if let Some(state) = self.state.get() {
            return Self::to_result(state);
        }

        let provisioner = Arc::clone(self);
        tokio::task::spawn_blocking(move || provisioner.ensure())
            .await
            .map_err(|e| EngineError::EnvironmentUnavailable(format!("provisioning task failed: {e}")))?
    }

    fn to_result(state: &Result<RuntimeEnvironment, String>) -> Result<RuntimeEnvironment, EngineError> {
        state
            .clone()
            .map_err(EngineError::EnvironmentUnavailable)
    }

    fn provision(&self) -> Result<RuntimeEnvironment, String> {
        let env = RuntimeEnvironment::from_root(&self.location);
        if env.exists() {
            log::info!("Reusing runtime environment at {}", self.location.display());
            return Ok(env);
        }

        log::info!("Creating runtime environment at {}", self.location.display());
        if let Some(parent) = self.location.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("cannot create {}: {e}", parent.display()))?;
        }

        let output = Command::new(&self.base_interpreter)
            .arg("-m")
            .arg("venv")
            .arg(&self.location)
            .output()
            .map_err(|e| format!("failed to spawn {}: {e}", self.base_interpreter))?;

        if !output.status.success() {
            return Err(format!(
                "venv creation exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        if !env.exists() {
            return Err(format!(
                "interpreter missing after creation: {}",
                env.interpreter().display()
            ));
        }

        log::info!("Runtime environment ready at {}", self.location.display());
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let env = RuntimeEnvironment::from_root("/opt/venv");
        if cfg!(windows) {
            assert!(env.interpreter().ends_with("Scripts/python.exe"));
            assert!(env.package_manager().ends_with("Scripts/pip.exe"));
        } else {
            assert_eq!(env.interpreter(), PathBuf::from("/opt/venv/bin/python"));
            assert_eq!(env.package_manager(), PathBuf::from("/opt/venv/bin/pip"));
        }
    }

    #[test]
    fn test_existing_environment_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let bin = if cfg!(windows) { "Scripts" } else { "bin" };
        let exe = if cfg!(windows) { "python.exe" } else { "python" };
        std::fs::create_dir_all(dir.path().join(bin)).unwrap();
        std::fs::write(dir.path().join(bin).join(exe), b"").unwrap();

        // The base interpreter is never spawned for an existing environment
        let provisioner = EnvironmentProvisioner::new(dir.path(), "definitely-not-python");
        let first = provisioner.ensure().unwrap();
        let second = provisioner.ensure().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.root(), dir.path());
    }

    #[test]
    fn test_failure_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("env");
        let provisioner = EnvironmentProvisioner::new(&location, "definitely-not-python");

        let first = provisioner.ensure().unwrap_err();
        assert!(matches!(first, EngineError::EnvironmentUnavailable(_)));

        // Make the location look valid: the cached failure still wins
        let bin = if cfg!(windows) { "Scripts" } else { "bin" };
        std::fs::create_dir_all(location.join(bin)).unwrap();
        let second = provisioner.ensure().unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_concurrent_first_access_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let bin = if cfg!(windows) { "Scripts" } else { "bin" };
        let exe = if cfg!(windows) { "python.exe" } else { "python" };
        std::fs::create_dir_all(dir.path().join(bin)).unwrap();
        std::fs::write(dir.path().join(bin).join(exe), b"").unwrap();

        let provisioner = Arc::new(EnvironmentProvisioner::new(dir.path(), "python3"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let p = Arc::clone(&provisioner);
                std::thread::spawn(move || p.ensure().unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().root(), dir.path());
        }
    }
}
