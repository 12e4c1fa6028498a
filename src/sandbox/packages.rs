use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::process::{CapturedOutput, ProcessOutcome, run_with_timeout};
use super::{EngineError, EnvironmentProvisioner};

/// Budget for each install attempt
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(120);
/// Budget for `pip list`
pub const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Standard-library module names that must never be installed from the index
const DENYLIST: [&str; 6] = ["os", "sys", "subprocess", "shutil", "tempfile", "pathlib"];

/// Packages that ship with the environment or with the plotting stack
const BASELINE_PACKAGES: &[&str] = &[
    "pip",
    "setuptools",
    "wheel",
    "distlib",
    "filelock",
    "platformdirs",
    "typing-extensions",
    "zipp",
    "importlib-metadata",
    "markupsafe",
    "click",
    "itsdangerous",
    "jinja2",
    "werkzeug",
    "flask",
    "flask-cors",
    "pyparsing",
    "python-dateutil",
    "six",
    "cycler",
    "kiwisolver",
    "certifi",
    "charset-normalizer",
    "idna",
    "urllib3",
    "cffi",
    "colorama",
    "cryptography",
    "pycparser",
    "contourpy",
    "distro",
    "et_xmlfile",
    "fonttools",
    "keyring",
    "keyrings.cryptfile",
    "mama",
    "more-itertools",
    "narwhals",
    "packaging",
    "pytz",
    "requests",
    "soupsieve",
    "termcolor",
    "typing_extensions",
    "tzdata",
    "pycryptodome",
];

const BASELINE_PREFIXES: &[&str] = &["pip-", "setuptools", "argon2-", "jaraco.", "scipy", "psutil"];

/// Number of header lines in `pip list` output
const LIST_HEADER_LINES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Baseline,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub kind: PackageKind,
}

impl PackageRecord {
    pub fn classify(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = if is_baseline(&name) {
            PackageKind::Baseline
        } else {
            PackageKind::User
        };
        Self { name, kind }
    }
}

/// Installed packages, split into the user-facing view and the full list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageListing {
    pub packages: Vec<String>,
    pub all_packages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub package: String,
    pub output: String,
}

/// Whether `name` belongs to the environment's baseline rather than the user.
/// Matching is exact and case-sensitive; versions play no part.
pub fn is_baseline(name: &str) -> bool {
    name.starts_with('_')
        || BASELINE_PACKAGES.contains(&name)
        || BASELINE_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Trims `name` and rejects empty and denylisted names
pub fn validate_package_name(name: &str) -> Result<&str, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidInput(
            "Package name cannot be empty".to_string(),
        ));
    }
    if DENYLIST.iter().any(|denied| denied.eq_ignore_ascii_case(name)) {
        return Err(EngineError::InvalidInput(format!(
            "Cannot install {name} - this is a built-in Python module"
        )));
    }
    Ok(name)
}

/// Package names from the tabular `pip list` output
pub fn parse_package_list(stdout: &str) -> Vec<String> {
    stdout
        .trim()
        .lines()
        .skip(LIST_HEADER_LINES)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

/// Splits the full package list into the user view, keeping input order
pub fn classify_packages(all_packages: Vec<String>) -> PackageListing {
    let packages = all_packages
        .iter()
        .map(|name| PackageRecord::classify(name.as_str()))
        .filter(|record| record.kind == PackageKind::User)
        .map(|record| record.name)
        .collect();

    PackageListing {
        packages,
        all_packages,
    }
}

/// Installs and lists third-party packages of the isolated runtime
pub struct PackageInstaller {
    provisioner: Arc<EnvironmentProvisioner>,
}

impl PackageInstaller {
    pub fn new(provisioner: Arc<EnvironmentProvisioner>) -> Self {
        Self { provisioner }
    }

    /// Installs `name`, first into the user site, then globally if that fails
    pub async fn install(&self, name: &str) -> Result<InstallReport, EngineError> {
        let package = validate_package_name(name)?.to_owned();
        let env = self.provisioner.ensure_async().await?;
        let pip = env.package_manager();

        log::info!("Installing package {package}");

        let first = self.attempt(&pip, &["install", "--user", package.as_str()], &package).await?;
        if first.success() {
            log::info!("Installed {package} into the user site");
            return Ok(InstallReport {
                package,
                output: first.stdout,
            });
        }

        log::warn!(
            "User-scope install of {package} exited with {}, retrying without --user",
            first.exit_code
        );
        let second = self.attempt(&pip, &["install", package.as_str()], &package).await?;
        if second.success() {
            log::info!("Installed {package}");
            return Ok(InstallReport {
                package,
                output: second.stdout,
            });
        }

        log::warn!("Failed to install {package}: exit code {}", second.exit_code);
        Err(EngineError::InstallFailed {
            package,
            diagnostic: second.stderr,
        })
    }

    async fn attempt(
        &self,
        pip: &Path,
        args: &[&str],
        package: &str,
    ) -> Result<CapturedOutput, EngineError> {
        match run_with_timeout(pip, args, None, INSTALL_TIMEOUT).await? {
            ProcessOutcome::Exited(output) => Ok(output),
            ProcessOutcome::TimedOut { .. } => {
                log::warn!("Installing {package} timed out");
                Err(EngineError::InstallTimedOut {
                    package: package.to_owned(),
                })
            }
        }
    }

    /// Lists installed packages and separates the user-added ones
    pub async fn list(&self) -> Result<PackageListing, EngineError> {
        let env = self.provisioner.ensure_async().await?;
        let outcome = run_with_timeout(env.package_manager(), &["list"], None, LIST_TIMEOUT).await?;

        match outcome {
            ProcessOutcome::Exited(output) if output.success() => {
                let listing = classify_packages(parse_package_list(&output.stdout));
                log::debug!(
                    "Listed {} packages ({} user)",
                    listing.all_packages.len(),
                    listing.packages.len()
                );
                Ok(listing)
            }
            ProcessOutcome::Exited(output) => Err(EngineError::ListFailed {
                diagnostic: output.stderr,
            }),
            ProcessOutcome::TimedOut { .. } => Err(EngineError::ListFailed {
                diagnostic: format!("pip list timed out after {} seconds", LIST_TIMEOUT.as_secs()),
            }),
        }
    }
}
