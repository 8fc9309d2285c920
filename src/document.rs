//! Document state and analysis generations
//!
//! Analyses of the same document may finish out of order. Each pass takes a
//! generation number when it starts and only publishes if that number is
//! still the latest for the document.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tower_lsp::lsp_types::Url;

/// Latest known state of an open manifest
pub struct DocumentState {
    /// Full document text
    pub content: String,
}

/// Whether `uri` names a project manifest that should be analyzed
pub fn is_package_manifest(uri: &Url) -> bool {
    let path = uri.path();
    let filename = path.rsplit('/').next().unwrap_or(path);
    filename == "package.json" && !path.contains("/node_modules/")
}

/// Per-document analysis generations.
///
/// Generations are drawn from one counter shared by all documents, so a
/// number is never reused. Only open documents keep an entry.
#[derive(Debug, Default)]
pub struct Generations {
    next: AtomicU64,
    latest: DashMap<Url, u64>,
}

impl Generations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new pass for `uri` and return its generation
    pub fn begin(&self, uri: &Url) -> u64 {
        let generation = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.latest.insert(uri.clone(), generation);
        generation
    }

    /// Whether `generation` is still the latest pass for `uri`
    pub fn is_current(&self, uri: &Url, generation: u64) -> bool {
        self.latest
            .get(uri)
            .is_some_and(|latest| *latest == generation)
    }

    /// Forget `uri`, making every in-flight pass for it stale
    pub fn invalidate(&self, uri: &Url) {
        self.latest.remove(uri);
    }
}
