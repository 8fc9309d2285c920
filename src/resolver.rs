//! Type availability resolution for runtime dependencies
//!
//! A dependency is considered typed when any of the following holds, checked
//! in order:
//!
//! 1. the project's `devDependencies` already declares its companion
//!    `@types/*` package
//! 2. the installed package's own `package.json` declares `types`/`typings`
//! 3. `node_modules/<name>/index.d.ts` exists in the workspace
//!
//! The first check is answered from the manifest alone; the others touch
//! the filesystem and suspend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::parsers::ProjectManifest;

/// Scope that hosts companion declaration packages
pub const TYPES_SCOPE: &str = "@types/";

/// Directory holding installed packages, relative to the workspace root
pub const NODE_MODULES: &str = "node_modules";

/// Companion declaration package for `name`.
///
/// Scoped packages follow the DefinitelyTyped convention:
/// `@scope/pkg` becomes `@types/scope__pkg`.
pub fn companion_package_name(name: &str) -> String {
    if let Some(rest) = name.strip_prefix('@')
        && let Some((scope, package)) = rest.split_once('/')
    {
        return format!("{TYPES_SCOPE}{scope}__{package}");
    }
    format!("{TYPES_SCOPE}{name}")
}

/// Error raised while reading an installed package's manifest
#[derive(Debug, Error)]
pub enum ManifestReadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of looking for a declaration entry in an installed manifest
#[derive(Debug)]
pub enum DeclarationField {
    /// The manifest declares `types` (or `typings`)
    Present(String),
    /// The manifest was read but declares no entry
    Absent,
    /// The manifest could not be read or parsed
    Unreadable(ManifestReadError),
}

/// Reads the manifests of installed packages
#[async_trait]
pub trait InstalledManifestReader: Send + Sync {
    /// Inspect the manifest at `path` for a declaration entry
    async fn declaration_field(&self, path: &Path) -> DeclarationField;
}

/// Searches the workspace for files
#[async_trait]
pub trait WorkspaceFileSearch: Send + Sync {
    /// Find files matching a `/`-separated pattern relative to the workspace
    /// root. Segments may contain `*`. Returns an empty list when nothing
    /// matches.
    async fn find_files(&self, pattern: &str) -> Vec<PathBuf>;
}

/// A workspace folder together with its collaborators
pub trait Workspace: InstalledManifestReader + WorkspaceFileSearch {
    /// Root directory of the workspace folder
    fn root(&self) -> &Path;
}

/// Evidence that a dependency already has type information
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSource {
    /// The dependency is itself a declaration package
    DeclarationPackage,
    /// The companion package is listed in `devDependencies`
    DevDependency(String),
    /// The installed manifest declares a declaration entry
    DeclarationField(String),
    /// A declaration file was found in the workspace
    DeclarationFile(PathBuf),
}

/// Decides, per dependency, whether type information is available
pub struct TypeAvailabilityResolver<'a, W> {
    workspace: &'a W,
}

impl<'a, W: Workspace> TypeAvailabilityResolver<'a, W> {
    pub fn new(workspace: &'a W) -> Self {
        Self { workspace }
    }

    /// Whether the companion declaration package should be installed
    pub async fn needs_install(&self, manifest: &ProjectManifest, name: &str) -> bool {
        match self.find_types(manifest, name).await {
            Some(source) => {
                tracing::trace!("Types for {} found: {:?}", name, source);
                false
            }
            None => true,
        }
    }

    /// Find the first piece of evidence that `name` is typed
    pub async fn find_types(&self, manifest: &ProjectManifest, name: &str) -> Option<TypeSource> {
        if name.starts_with(TYPES_SCOPE) {
            return Some(TypeSource::DeclarationPackage);
        }

        let companion = companion_package_name(name);
        if manifest.has_dev_dependency(&companion) {
            return Some(TypeSource::DevDependency(companion));
        }
        let verbatim = format!("{TYPES_SCOPE}{name}");
        if verbatim != companion && manifest.has_dev_dependency(&verbatim) {
            return Some(TypeSource::DevDependency(verbatim));
        }

        if !is_safe_package_path(name) {
            tracing::debug!("Skipping installed package checks for {:?}", name);
            return None;
        }

        let manifest_path = self
            .workspace
            .root()
            .join(NODE_MODULES)
            .join(name)
            .join("package.json");
        match self.workspace.declaration_field(&manifest_path).await {
            DeclarationField::Present(entry) => return Some(TypeSource::DeclarationField(entry)),
            DeclarationField::Absent => {}
            DeclarationField::Unreadable(e) => {
                tracing::trace!("Treating unreadable manifest as untyped: {}", e);
            }
        }

        let pattern = format!("{NODE_MODULES}/{name}/index.d.ts");
        self.workspace
            .find_files(&pattern)
            .await
            .into_iter()
            .next()
            .map(TypeSource::DeclarationFile)
    }
}

/// Whether `name` can be used as a path below `node_modules`
fn is_safe_package_path(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['\\', '*', ':'])
        && name
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
        && name.split('/').count() <= 2
}
