//! Installation of companion declaration packages
//!
//! The package manager is picked by a lock file presence check, then the
//! install runs as a background process. Only the spawn is awaited by the
//! caller; the exit status is reported through the returned [`InstallTask`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{Range, Url};

use crate::resolver::{WorkspaceFileSearch, companion_package_name};

/// Longest package name accepted by the npm registry
const MAX_PACKAGE_NAME_LEN: usize = 214;

/// Number of trailing stderr lines kept for failure reports
const STDERR_TAIL_LINES: usize = 5;

/// Package manager used to install companion packages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
}

impl PackageManager {
    /// Lock file whose presence selects yarn
    pub const YARN_LOCKFILE: &'static str = "yarn.lock";

    /// Pick yarn when its lock file exists at the workspace root, npm otherwise
    pub async fn detect(search: &impl WorkspaceFileSearch) -> Self {
        if search.find_files(Self::YARN_LOCKFILE).await.is_empty() {
            PackageManager::Npm
        } else {
            PackageManager::Yarn
        }
    }

    /// Executable name, including the Windows shim extension
    pub fn program(self) -> &'static str {
        match (self, cfg!(windows)) {
            (PackageManager::Npm, false) => "npm",
            (PackageManager::Npm, true) => "npm.cmd",
            (PackageManager::Yarn, false) => "yarn",
            (PackageManager::Yarn, true) => "yarn.cmd",
        }
    }
}

/// Arguments of the install command, as sent by code actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallArguments {
    /// Manifest the action was requested on
    pub uri: Url,
    /// Range of the dependency name when the action was built
    pub range: Range,
    /// Dependency name read from that range
    pub package: String,
}

/// A resolved install invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCommand {
    pub manager: PackageManager,
    /// Dependency whose companion package is installed
    pub package: String,
}

impl InstallCommand {
    pub fn new(manager: PackageManager, package: impl Into<String>) -> Self {
        Self {
            manager,
            package: package.into(),
        }
    }

    /// Name of the package that gets installed
    pub fn companion(&self) -> String {
        companion_package_name(&self.package)
    }

    pub fn args(&self) -> Vec<String> {
        let companion = self.companion();
        match self.manager {
            PackageManager::Yarn => vec!["add".to_string(), "--dev".to_string(), companion],
            PackageManager::Npm => vec!["i".to_string(), "--save-dev".to_string(), companion],
        }
    }

    /// Human readable command line
    pub fn shell_line(&self) -> String {
        let manager = match self.manager {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
        };
        format!("{} {}", manager, self.args().join(" "))
    }
}

/// Errors raised before the install process is running
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("invalid install arguments: {0}")]
    InvalidArguments(String),
    #[error("no workspace folder contains {0}")]
    NoWorkspace(Url),
    #[error("failed to start `{command}` in {}: {source}", .cwd.display())]
    Spawn {
        command: String,
        cwd: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How a spawned install ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Succeeded,
    Failed {
        code: Option<i32>,
        stderr_tail: String,
    },
    /// Waiting on the process failed
    Lost(String),
}

/// A running install
pub struct InstallTask {
    pub command: InstallCommand,
    handle: JoinHandle<InstallOutcome>,
}

impl InstallTask {
    /// Wait for the process to exit
    pub async fn wait(self) -> InstallOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => InstallOutcome::Lost(e.to_string()),
        }
    }
}

/// Whether `name` looks like an npm package name
pub fn is_plausible_package_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_PACKAGE_NAME_LEN {
        return false;
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || "\"'{}[]:,\\`$;&|<>".contains(c))
    {
        return false;
    }
    match name.strip_prefix('@') {
        Some(scoped) => matches!(
            scoped.split_once('/'),
            Some((scope, package)) if !scope.is_empty() && !package.is_empty() && !package.contains('/')
        ),
        None => !name.contains('/') && !name.starts_with('.'),
    }
}

/// Start installing the companion package in `cwd`.
///
/// Returns as soon as the process is spawned. Output is captured so it never
/// reaches the language server's stdout.
pub fn spawn_install(command: InstallCommand, cwd: &Path) -> Result<InstallTask, InstallError> {
    if !is_plausible_package_name(&command.package) {
        return Err(InstallError::InvalidArguments(format!(
            "{:?} is not a package name",
            command.package
        )));
    }

    let child = tokio::process::Command::new(command.manager.program())
        .args(command.args())
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| InstallError::Spawn {
            command: command.shell_line(),
            cwd: cwd.to_path_buf(),
            source,
        })?;

    tracing::info!("Started `{}` in {}", command.shell_line(), cwd.display());

    let line = command.shell_line();
    let handle = tokio::spawn(async move {
        match child.wait_with_output().await {
            Ok(output) if output.status.success() => {
                tracing::info!("`{}` finished", line);
                InstallOutcome::Succeeded
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let lines: Vec<&str> = stderr.lines().collect();
                let stderr_tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
                tracing::warn!("`{}` exited with {}", line, output.status);
                InstallOutcome::Failed {
                    code: output.status.code(),
                    stderr_tail,
                }
            }
            Err(e) => {
                tracing::error!("Failed waiting for `{}`: {}", line, e);
                InstallOutcome::Lost(e.to_string())
            }
        }
    });

    Ok(InstallTask { command, handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::FsWorkspace;
    use tempfile::TempDir;

    #[test]
    fn test_npm_command_line() {
        let command = InstallCommand::new(PackageManager::Npm, "lodash");
        assert_eq!(command.args(), vec!["i", "--save-dev", "@types/lodash"]);
        assert_eq!(command.shell_line(), "npm i --save-dev @types/lodash");
    }

    #[test]
    fn test_yarn_command_line() {
        let command = InstallCommand::new(PackageManager::Yarn, "lodash");
        assert_eq!(command.args(), vec!["add", "--dev", "@types/lodash"]);
        assert_eq!(command.shell_line(), "yarn add --dev @types/lodash");
    }

    #[test]
    fn test_scoped_command_line() {
        let command = InstallCommand::new(PackageManager::Npm, "@babel/core");
        assert_eq!(command.companion(), "@types/babel__core");
        assert_eq!(command.shell_line(), "npm i --save-dev @types/babel__core");
    }

    #[tokio::test]
    async fn test_detect_npm_without_lockfile() {
        let dir = TempDir::new().unwrap();
        let workspace = FsWorkspace::new(dir.path());
        assert_eq!(PackageManager::detect(&workspace).await, PackageManager::Npm);
    }

    #[tokio::test]
    async fn test_detect_yarn_with_lockfile() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("yarn.lock"), "").unwrap();
        let workspace = FsWorkspace::new(dir.path());
        assert_eq!(PackageManager::detect(&workspace).await, PackageManager::Yarn);
    }

    #[test]
    fn test_plausible_package_names() {
        assert!(is_plausible_package_name("lodash"));
        assert!(is_plausible_package_name("lodash.merge"));
        assert!(is_plausible_package_name("@babel/core"));
        assert!(!is_plausible_package_name(""));
        assert!(!is_plausible_package_name("lo dash"));
        assert!(!is_plausible_package_name("\"lodash\""));
        assert!(!is_plausible_package_name("lodash\": \"^4"));
        assert!(!is_plausible_package_name("a/b"));
        assert!(!is_plausible_package_name("@scope"));
        assert!(!is_plausible_package_name("@scope/"));
        assert!(!is_plausible_package_name(".hidden"));
        assert!(!is_plausible_package_name("x; rm -rf /"));
        assert!(!is_plausible_package_name(&"a".repeat(215)));
    }

    #[test]
    fn test_install_arguments_round_trip_shape() {
        let args = InstallArguments {
            uri: Url::parse("file:///project/package.json").unwrap(),
            range: Range::default(),
            package: "lodash".to_string(),
        };
        let value = serde_json::to_value(&args).unwrap();
        assert_eq!(value["package"], "lodash");
        assert_eq!(value["uri"], "file:///project/package.json");
        assert_eq!(value["range"]["start"]["line"], 0);
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_package() {
        let dir = TempDir::new().unwrap();
        let command = InstallCommand::new(PackageManager::Npm, "bad name");
        let result = spawn_install(command, dir.path());
        assert!(matches!(result, Err(InstallError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");
        let command = InstallCommand::new(PackageManager::Npm, "lodash");
        let result = spawn_install(command, &missing);
        assert!(matches!(result, Err(InstallError::Spawn { .. })));
    }
}
