//! Analysis of a package.json document
//!
//! [`analyze`] turns manifest text into the diagnostics that should be
//! published for it. It holds no state; callers own publishing.

use std::collections::HashSet;

use futures::future::join_all;
use tower_lsp::lsp_types::Diagnostic;

use crate::parsers::npm::scan_dependencies;
use crate::parsers::{DependencyEntry, ProjectManifest};
use crate::providers::diagnostics::create_diagnostics;
use crate::resolver::{TypeAvailabilityResolver, Workspace};
use crate::utils::matches_pattern;

/// Analyze manifest text and build its missing-types diagnostics.
///
/// Returns an empty list when the text is not valid JSON or when no
/// workspace is available to resolve `node_modules` against.
/// Dependencies matching any `ignore` pattern are never flagged. A name
/// declared more than once is reported at its last occurrence, the one
/// JSON parsers keep.
pub async fn analyze<W: Workspace>(
    content: &str,
    workspace: Option<&W>,
    ignore: &[String],
) -> Vec<Diagnostic> {
    let Some(manifest) = ProjectManifest::parse(content) else {
        return Vec::new();
    };
    let Some(workspace) = workspace else {
        tracing::debug!("No workspace folder available, skipping dependency lookup");
        return Vec::new();
    };

    let entries: Vec<DependencyEntry> = last_occurrences(scan_dependencies(content))
        .into_iter()
        .filter(|entry| {
            let declared = manifest.has_dependency(&entry.name);
            if !declared {
                tracing::debug!("Scanned entry {} not found in parsed manifest", entry.name);
            }
            declared
        })
        .filter(|entry| !ignore.iter().any(|pattern| matches_pattern(pattern, &entry.name)))
        .collect();

    let resolver = TypeAvailabilityResolver::new(workspace);
    let checks = entries
        .iter()
        .map(|entry| resolver.needs_install(&manifest, &entry.name));
    let needs_install = join_all(checks).await;

    let flagged: Vec<DependencyEntry> = entries
        .into_iter()
        .zip(needs_install)
        .filter_map(|(entry, needed)| needed.then_some(entry))
        .collect();

    tracing::debug!("{} dependencies are missing types", flagged.len());
    create_diagnostics(&flagged)
}

/// Keep the last entry of each name, in source order
fn last_occurrences(entries: Vec<DependencyEntry>) -> Vec<DependencyEntry> {
    let mut seen = HashSet::new();
    let mut kept: Vec<DependencyEntry> = entries
        .into_iter()
        .rev()
        .filter(|entry| seen.insert(entry.name.clone()))
        .collect();
    kept.reverse();
    kept
}
