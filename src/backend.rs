use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::analysis::analyze;
use crate::config::Config;
use crate::document::{DocumentState, Generations, is_package_manifest};
use crate::install::{
    InstallArguments, InstallCommand, InstallError, InstallOutcome, PackageManager, spawn_install,
};
use crate::providers::code_actions::{INSTALL_TYPES_COMMAND, create_code_actions};
use crate::providers::diagnostics::{DiagnosticStore, MemoryDiagnosticStore, publish_diagnostics};
use crate::workspace::FsWorkspace;

/// Diagnostic store that records locally and publishes to the client
struct PublishingStore<'a> {
    client: &'a Client,
    recorded: &'a MemoryDiagnosticStore,
}

#[async_trait]
impl<'a> DiagnosticStore for PublishingStore<'a> {
    async fn set(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        self.recorded.set(uri.clone(), diagnostics.clone()).await;
        self.client.publish_diagnostics(uri, diagnostics, None).await;
    }
}

pub struct TypesInstallerBackend {
    client: Client,
    /// Configuration
    config: RwLock<Config>,
    /// Workspace folder roots, used to locate `node_modules`
    workspace_folders: RwLock<Vec<PathBuf>>,
    /// Latest text of open manifests
    documents: DashMap<Url, DocumentState>,
    /// Analysis pass counters, used to drop stale results
    generations: Generations,
    /// Diagnostics last published per document
    diagnostics: MemoryDiagnosticStore,
}

impl TypesInstallerBackend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            config: RwLock::new(Config::default()),
            workspace_folders: RwLock::new(Vec::new()),
            documents: DashMap::new(),
            generations: Generations::new(),
            diagnostics: MemoryDiagnosticStore::new(),
        }
    }

    fn store(&self) -> PublishingStore<'_> {
        PublishingStore {
            client: &self.client,
            recorded: &self.diagnostics,
        }
    }

    fn workspace_root_for(&self, uri: &Url) -> Option<PathBuf> {
        let folders = self.workspace_folders.read().ok()?;
        find_workspace_root(&folders, uri)
    }

    /// Analyze a manifest and publish its diagnostics
    async fn process_document(&self, uri: &Url, content: &str) {
        if !is_package_manifest(uri) {
            return;
        }

        self.documents.insert(
            uri.clone(),
            DocumentState {
                content: content.to_string(),
            },
        );
        let generation = self.generations.begin(uri);
        let diagnostics = self.analyze_document(uri, content).await;
        self.publish_if_current(uri, generation, diagnostics).await;
    }

    /// Build the diagnostics for a manifest under the current configuration
    async fn analyze_document(&self, uri: &Url, content: &str) -> Vec<Diagnostic> {
        let (diagnostics_enabled, ignore) = self
            .config
            .read()
            .map(|c| (c.diagnostics.enabled, c.ignore.clone()))
            .unwrap_or((true, Vec::new()));

        if !diagnostics_enabled {
            return Vec::new();
        }
        let workspace = self.workspace_root_for(uri).map(FsWorkspace::new);
        if workspace.is_none() {
            tracing::debug!("No workspace folder contains {}", uri);
        }
        analyze(content, workspace.as_ref(), &ignore).await
    }

    /// Publish the result of pass `generation` unless a newer pass started
    /// or the document was closed meanwhile. Returns whether it published.
    async fn publish_if_current(
        &self,
        uri: &Url,
        generation: u64,
        diagnostics: Vec<Diagnostic>,
    ) -> bool {
        if !self.generations.is_current(uri, generation) {
            tracing::debug!("Discarding stale analysis {} of {}", generation, uri);
            return false;
        }

        tracing::info!(
            "Found {} dependencies without types in {}",
            diagnostics.len(),
            uri.path()
        );
        publish_diagnostics(&self.store(), uri, diagnostics).await;
        true
    }

    /// Start installing the companion package named by a code action
    async fn install_types(
        &self,
        arguments: Vec<serde_json::Value>,
    ) -> std::result::Result<(), InstallError> {
        let value = arguments
            .into_iter()
            .next()
            .ok_or_else(|| InstallError::InvalidArguments("missing argument".to_string()))?;
        let args: InstallArguments = serde_json::from_value(value)
            .map_err(|e| InstallError::InvalidArguments(e.to_string()))?;

        let root = self
            .workspace_root_for(&args.uri)
            .ok_or_else(|| InstallError::NoWorkspace(args.uri.clone()))?;
        let manager = PackageManager::detect(&FsWorkspace::new(&root)).await;
        let task = spawn_install(InstallCommand::new(manager, args.package), &root)?;

        let line = task.command.shell_line();
        self.client
            .log_message(MessageType::INFO, format!("Running `{line}`"))
            .await;

        let client = self.client.clone();
        tokio::spawn(async move {
            match task.wait().await {
                InstallOutcome::Succeeded => {
                    client
                        .show_message(MessageType::INFO, format!("`{line}` finished"))
                        .await;
                }
                InstallOutcome::Failed { code, stderr_tail } => {
                    let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                    client
                        .show_message(
                            MessageType::ERROR,
                            format!("`{line}` failed ({code}): {stderr_tail}"),
                        )
                        .await;
                }
                InstallOutcome::Lost(e) => {
                    client
                        .show_message(MessageType::ERROR, format!("`{line}` failed: {e}"))
                        .await;
                }
            }
        });

        Ok(())
    }
}

/// Root of the innermost workspace folder containing `uri`
fn find_workspace_root(folders: &[PathBuf], uri: &Url) -> Option<PathBuf> {
    let path = uri.to_file_path().ok()?;
    folders
        .iter()
        .filter(|folder| path.starts_with(folder))
        .max_by_key(|folder| folder.components().count())
        .cloned()
}

/// Workspace folder roots announced by the client
fn workspace_folder_paths(
    folders: Option<&[WorkspaceFolder]>,
    root_uri: Option<&Url>,
) -> Vec<PathBuf> {
    match folders {
        Some(folders) if !folders.is_empty() => folders
            .iter()
            .filter_map(|folder| folder.uri.to_file_path().ok())
            .collect(),
        _ => root_uri
            .and_then(|uri| uri.to_file_path().ok())
            .into_iter()
            .collect(),
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for TypesInstallerBackend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        // Parse configuration from initialization options
        let config = Config::from_init_options(params.initialization_options);
        tracing::info!("Configuration: {:?}", config);

        if let Ok(mut cfg) = self.config.write() {
            *cfg = config;
        }

        #[allow(deprecated)]
        let folders = workspace_folder_paths(
            params.workspace_folders.as_deref(),
            params.root_uri.as_ref(),
        );
        tracing::info!("Workspace folders: {:?}", folders);
        if let Ok(mut current) = self.workspace_folders.write() {
            *current = folders;
        }

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "types-installer-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                code_action_provider: Some(CodeActionProviderCapability::Options(
                    CodeActionOptions {
                        code_action_kinds: Some(vec![CodeActionKind::QUICKFIX]),
                        ..Default::default()
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![INSTALL_TYPES_COMMAND.to_string()],
                    ..Default::default()
                }),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    file_operations: None,
                }),
                ..Default::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Types installer LSP initialized")
            .await;
        tracing::info!("Types installer LSP initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!("Types installer LSP shutting down");
        Ok(())
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        let removed = workspace_folder_paths(Some(params.event.removed.as_slice()), None);
        let added = workspace_folder_paths(Some(params.event.added.as_slice()), None);

        if let Ok(mut folders) = self.workspace_folders.write() {
            folders.retain(|folder| !removed.contains(folder));
            for folder in added {
                if !folders.contains(&folder) {
                    folders.push(folder);
                }
            }
            tracing::info!("Workspace folders changed: {:?}", *folders);
        }
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let content = params.text_document.text;

        tracing::debug!("Document opened: {}", uri);
        self.process_document(&uri, &content).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;

        // With FULL sync, we get the entire document content
        if let Some(change) = params.content_changes.into_iter().next() {
            tracing::debug!("Document changed: {}", uri);
            self.process_document(&uri, &change.text).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;

        // Re-process on save if we have the text
        if let Some(text) = params.text {
            tracing::debug!("Document saved: {}", uri);
            self.process_document(&uri, &text).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        tracing::debug!("Document closed: {}", uri);
        self.documents.remove(&uri);
        self.generations.invalidate(&uri);
        self.diagnostics.remove(&uri);

        // Clear diagnostics for this document
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let install_enabled = self
            .config
            .read()
            .map(|c| c.install.enabled)
            .unwrap_or(true);
        if !install_enabled {
            return Ok(Some(vec![]));
        }

        let uri = &params.text_document.uri;
        let Some(doc) = self.documents.get(uri) else {
            return Ok(Some(vec![]));
        };

        let diagnostics = self.diagnostics.get(uri);
        let actions = create_code_actions(uri, &diagnostics, &doc.content);
        tracing::debug!("Returning {} code actions for {}", actions.len(), uri);

        Ok(Some(actions))
    }

    async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> Result<Option<serde_json::Value>> {
        match params.command.as_str() {
            INSTALL_TYPES_COMMAND => {
                if let Err(e) = self.install_types(params.arguments).await {
                    tracing::warn!("Install failed: {}", e);
                    self.client
                        .show_message(MessageType::ERROR, format!("Types installer: {e}"))
                        .await;
                }
                Ok(None)
            }
            _ => {
                tracing::warn!("Unknown command: {}", params.command);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tower_lsp::LspService;

    fn folder(path: &str) -> WorkspaceFolder {
        WorkspaceFolder {
            uri: Url::from_file_path(path).unwrap(),
            name: path.to_string(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_find_workspace_root_prefers_innermost() {
        let folders = vec![PathBuf::from("/repo"), PathBuf::from("/repo/packages/web")];

        let uri = Url::parse("file:///repo/packages/web/package.json").unwrap();
        assert_eq!(
            find_workspace_root(&folders, &uri),
            Some(PathBuf::from("/repo/packages/web"))
        );

        let uri = Url::parse("file:///repo/package.json").unwrap();
        assert_eq!(find_workspace_root(&folders, &uri), Some(PathBuf::from("/repo")));
    }

    #[cfg(unix)]
    #[test]
    fn test_find_workspace_root_outside_folders() {
        let folders = vec![PathBuf::from("/repo")];
        let uri = Url::parse("file:///elsewhere/package.json").unwrap();
        assert_eq!(find_workspace_root(&folders, &uri), None);

        // Prefix matching is per path component
        let uri = Url::parse("file:///repository/package.json").unwrap();
        assert_eq!(find_workspace_root(&folders, &uri), None);

        let uri = Url::parse("untitled:Untitled-1").unwrap();
        assert_eq!(find_workspace_root(&folders, &uri), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_workspace_folder_paths() {
        let folders = vec![folder("/a"), folder("/b")];
        assert_eq!(
            workspace_folder_paths(Some(folders.as_slice()), None),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );

        let root = Url::from_file_path("/root-only").unwrap();
        assert_eq!(
            workspace_folder_paths(None, Some(&root)),
            vec![PathBuf::from("/root-only")]
        );
        assert_eq!(
            workspace_folder_paths(Some(&[][..]), Some(&root)),
            vec![PathBuf::from("/root-only")]
        );
        assert!(workspace_folder_paths(None, None).is_empty());
    }

    const MANIFEST: &str = r#"{
  "dependencies": {
    "lodash": "^4.0.0"
  }
}"#;

    fn open_params(uri: &Url, text: &str) -> DidOpenTextDocumentParams {
        DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: "json".to_string(),
                version: 1,
                text: text.to_string(),
            },
        }
    }

    fn set_workspace(backend: &TypesInstallerBackend, root: &std::path::Path) {
        *backend.workspace_folders.write().unwrap() = vec![root.to_path_buf()];
    }

    fn manifest_uri(root: &std::path::Path) -> Url {
        Url::from_file_path(root.join("package.json")).unwrap()
    }

    #[tokio::test]
    async fn test_open_records_diagnostics() {
        let dir = TempDir::new().unwrap();
        let (service, _socket) = LspService::new(TypesInstallerBackend::new);
        let backend = service.inner();
        set_workspace(backend, dir.path());
        let uri = manifest_uri(dir.path());

        backend.did_open(open_params(&uri, MANIFEST)).await;

        let recorded = backend.diagnostics.get(&uri);
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].message.contains("@types/lodash"));
    }

    #[tokio::test]
    async fn test_pass_finishing_late_is_discarded() {
        let dir = TempDir::new().unwrap();
        let (service, _socket) = LspService::new(TypesInstallerBackend::new);
        let backend = service.inner();
        set_workspace(backend, dir.path());
        let uri = manifest_uri(dir.path());

        let older = backend.generations.begin(&uri);
        let newer = backend.generations.begin(&uri);
        let newer_result = backend.analyze_document(&uri, MANIFEST).await;
        let older_result = backend
            .analyze_document(&uri, r#"{"dependencies": {}}"#)
            .await;
        assert_eq!(newer_result.len(), 1);

        // The newer pass finishes first, the older one last
        assert!(backend.publish_if_current(&uri, newer, newer_result.clone()).await);
        assert!(!backend.publish_if_current(&uri, older, older_result).await);
        assert_eq!(backend.diagnostics.get(&uri), newer_result);
    }

    #[tokio::test]
    async fn test_close_clears_and_blocks_in_flight_pass() {
        let dir = TempDir::new().unwrap();
        let (service, _socket) = LspService::new(TypesInstallerBackend::new);
        let backend = service.inner();
        set_workspace(backend, dir.path());
        let uri = manifest_uri(dir.path());

        backend.did_open(open_params(&uri, MANIFEST)).await;
        assert_eq!(backend.diagnostics.get(&uri).len(), 1);

        let in_flight = backend.generations.begin(&uri);
        let late_result = backend.analyze_document(&uri, MANIFEST).await;
        backend
            .did_close(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
            })
            .await;

        assert!(backend.diagnostics.get(&uri).is_empty());
        assert!(!backend.documents.contains_key(&uri));
        assert!(!backend.publish_if_current(&uri, in_flight, late_result).await);
        assert!(backend.diagnostics.get(&uri).is_empty());
    }

    #[tokio::test]
    async fn test_document_outside_workspace_gets_empty_list() {
        let workspace_dir = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let (service, _socket) = LspService::new(TypesInstallerBackend::new);
        let backend = service.inner();
        set_workspace(backend, workspace_dir.path());
        let uri = manifest_uri(elsewhere.path());

        // Left over from an earlier pass
        backend
            .diagnostics
            .set(uri.clone(), vec![Diagnostic::default()])
            .await;

        backend.did_open(open_params(&uri, MANIFEST)).await;

        assert!(backend.documents.contains_key(&uri));
        assert!(backend.diagnostics.get(&uri).is_empty());
    }
}
