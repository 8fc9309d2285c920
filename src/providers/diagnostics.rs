//! Diagnostics provider for dependencies without type declarations

use async_trait::async_trait;
use dashmap::DashMap;
use tower_lsp::lsp_types::*;

use crate::parsers::DependencyEntry;
use crate::resolver::companion_package_name;

/// Code attached to every missing-types diagnostic
pub const NO_TYPES_CODE: &str = "no-types-detected";

/// Source label shown next to the diagnostic
pub const DIAGNOSTIC_SOURCE: &str = "Types Installer Helper";

/// Per-document diagnostic sink with full-replace semantics
#[async_trait]
pub trait DiagnosticStore: Send + Sync {
    /// Replace every diagnostic recorded for `uri`
    async fn set(&self, uri: Url, diagnostics: Vec<Diagnostic>);
}

/// Diagnostics kept in memory, keyed by document
#[derive(Debug, Default)]
pub struct MemoryDiagnosticStore {
    entries: DashMap<Url, Vec<Diagnostic>>,
}

impl MemoryDiagnosticStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnostics currently recorded for `uri`
    pub fn get(&self, uri: &Url) -> Vec<Diagnostic> {
        self.entries
            .get(uri)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn remove(&self, uri: &Url) {
        self.entries.remove(uri);
    }
}

#[async_trait]
impl DiagnosticStore for MemoryDiagnosticStore {
    async fn set(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        if diagnostics.is_empty() {
            self.entries.remove(&uri);
        } else {
            self.entries.insert(uri, diagnostics);
        }
    }
}

/// Create one diagnostic per dependency flagged as missing types
pub fn create_diagnostics(flagged: &[DependencyEntry]) -> Vec<Diagnostic> {
    flagged.iter().map(create_missing_types_diagnostic).collect()
}

/// Replace the document's diagnostics in `store`
pub async fn publish_diagnostics(
    store: &impl DiagnosticStore,
    uri: &Url,
    diagnostics: Vec<Diagnostic>,
) {
    tracing::debug!("Publishing {} diagnostics for {}", diagnostics.len(), uri);
    store.set(uri.clone(), diagnostics).await;
}

fn create_missing_types_diagnostic(entry: &DependencyEntry) -> Diagnostic {
    let companion = companion_package_name(&entry.name);
    Diagnostic {
        range: Range {
            start: Position {
                line: entry.line,
                character: entry.name_start,
            },
            end: Position {
                line: entry.line,
                character: entry.name_end,
            },
        },
        severity: Some(DiagnosticSeverity::INFORMATION),
        code: Some(NumberOrString::String(NO_TYPES_CODE.to_string())),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message: format!(
            "No \"types\" property detected in package.json. Install a types package like '{companion}' for TypeScript compatibility."
        ),
        related_information: None,
        tags: None,
        code_description: None,
        data: Some(serde_json::json!({ "package": entry.name })),
    }
}
