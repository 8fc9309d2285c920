//! Filesystem-backed workspace collaborators

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::parsers::ProjectManifest;
use crate::resolver::{
    DeclarationField, InstalledManifestReader, ManifestReadError, Workspace, WorkspaceFileSearch,
};

/// A workspace folder on disk
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    root: PathBuf,
}

impl FsWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl InstalledManifestReader for FsWorkspace {
    async fn declaration_field(&self, path: &Path) -> DeclarationField {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(source) => {
                return DeclarationField::Unreadable(ManifestReadError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(value) => match ProjectManifest::from_value(value).declaration_entry() {
                Some(entry) => DeclarationField::Present(entry.to_string()),
                None => DeclarationField::Absent,
            },
            Err(source) => DeclarationField::Unreadable(ManifestReadError::Parse {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Whether `pattern` stays below the workspace root
fn is_confined(pattern: &str) -> bool {
    !pattern.is_empty()
        && Path::new(pattern)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[async_trait]
impl WorkspaceFileSearch for FsWorkspace {
    async fn find_files(&self, pattern: &str) -> Vec<PathBuf> {
        if !is_confined(pattern) {
            tracing::debug!("Rejecting search pattern {:?}", pattern);
            return Vec::new();
        }

        // The root is taken literally, only the pattern may hold wildcards
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let full_pattern = format!("{}/{}", root.trim_end_matches('/'), pattern);

        let expand = move || match glob::glob(&full_pattern) {
            Ok(entries) => {
                let mut found: Vec<PathBuf> = entries.flatten().collect();
                found.sort();
                found
            }
            Err(e) => {
                tracing::debug!("Invalid search pattern {:?}: {}", full_pattern, e);
                Vec::new()
            }
        };

        match tokio::task::spawn_blocking(expand).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Workspace search for {:?} failed: {}", pattern, e);
                Vec::new()
            }
        }
    }
}

impl Workspace for FsWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }
}
