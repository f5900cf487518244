//! LSP backend implementation for sqlsense
//!
//! Documents are fully synced and stamped with a server-side version. Edits
//! schedule a debounced validation; when it fires, the result is published
//! only if the document has not moved on in the meantime.

use crate::convert::{completion_items, offset_of, statement_lens, to_lsp_diagnostic};
use anyhow::Context;
use sqlsense_core::{Config, SchemaSnapshot};
use sqlsense_sql::{Classifier, Locator, References, SqlParser, Validator};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    CodeLens, CodeLensOptions, CodeLensParams, CompletionOptions, CompletionParams,
    CompletionResponse, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DidSaveTextDocumentParams, InitializeParams, InitializeResult,
    InitializedParams, MessageType, SaveOptions, ServerCapabilities, ServerInfo,
    TextDocumentSyncCapability, TextDocumentSyncKind, TextDocumentSyncOptions,
    TextDocumentSyncSaveOptions, Url,
};
use tower_lsp::{Client, LanguageServer};

/// An open document and the version it was stamped with
#[derive(Debug, Clone)]
struct Document {
    text: String,
    version: u64,
}

/// Engine components built from one config
struct Engine {
    config: Config,
    validator: Validator,
    classifier: Classifier,
    locator: Locator,
    parser: SqlParser,
}

impl Engine {
    fn new(config: Config) -> Self {
        Self {
            validator: Validator::from_config(&config),
            classifier: Classifier::from_config(&config),
            locator: Locator::from_config(&config),
            parser: SqlParser::from_config(&config),
            config,
        }
    }
}

/// LSP backend for sqlsense
///
/// Cheap to clone; every clone shares the same state, so debounce tasks can
/// own one.
#[derive(Clone)]
pub struct Backend {
    /// LSP client for communicating with the editor
    client: Client,
    /// Currently open documents
    documents: Arc<RwLock<HashMap<Url, Document>>>,
    /// Engine built from the workspace config
    engine: Arc<RwLock<Arc<Engine>>>,
    /// Schema snapshot loaded from the workspace, if any
    schema: Arc<RwLock<Option<Arc<SchemaSnapshot>>>>,
    /// Workspace root directory
    root: Arc<RwLock<Option<PathBuf>>>,
    /// Source of document versions
    versions: Arc<AtomicU64>,
}

impl Backend {
    /// Create a new LSP backend
    pub fn new(client: Client) -> Self {
        Self {
            client,
            documents: Arc::new(RwLock::new(HashMap::new())),
            engine: Arc::new(RwLock::new(Arc::new(Engine::new(Config::default())))),
            schema: Arc::new(RwLock::new(None)),
            root: Arc::new(RwLock::new(None)),
            versions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Store new text for a document and return its version
    async fn store(&self, uri: Url, text: String) -> u64 {
        let version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
        self.documents
            .write()
            .await
            .insert(uri, Document { text, version });
        version
    }

    async fn document(&self, uri: &Url) -> Option<Document> {
        self.documents.read().await.get(uri).cloned()
    }

    /// Reload config and snapshot from the workspace root
    async fn reload_workspace(&self) {
        let Some(root) = self.root.read().await.clone() else {
            return;
        };

        let config = match load_config(&root) {
            Ok(Some(config)) => {
                self.client
                    .log_message(MessageType::INFO, "Loaded sqlsense.toml")
                    .await;
                config
            }
            Ok(None) => Config {
                project_root: root.clone(),
                ..Config::default()
            },
            Err(e) => {
                self.client
                    .log_message(MessageType::WARNING, format!("{:#}", e))
                    .await;
                Config {
                    project_root: root.clone(),
                    ..Config::default()
                }
            }
        };

        let schema = match config.schema_snapshot_path() {
            Some(path) => match load_schema(&path) {
                Ok(schema) => {
                    self.client
                        .log_message(
                            MessageType::INFO,
                            format!(
                                "Loaded schema snapshot for {} ({} tables)",
                                schema.database_name,
                                schema.tables.len()
                            ),
                        )
                        .await;
                    Some(Arc::new(schema))
                }
                Err(e) => {
                    self.client
                        .log_message(MessageType::WARNING, format!("{:#}", e))
                        .await;
                    None
                }
            },
            None => None,
        };

        *self.schema.write().await = schema;
        *self.engine.write().await = Arc::new(Engine::new(config));
    }

    /// Validate a document and publish, unless a newer version exists
    async fn publish_diagnostics(&self, uri: Url, version: u64) {
        let Some(document) = self.document(&uri).await else {
            return;
        };
        if document.version != version {
            return;
        }

        let engine = self.engine.read().await.clone();
        let schema = self.schema.read().await.clone();
        let diagnostics = engine.validator.validate(&document.text, schema.as_deref());

        // An edit may have landed while validating
        if self.document(&uri).await.map(|d| d.version) != Some(version) {
            tracing::debug!(%uri, version, "discarding stale diagnostics");
            return;
        }

        let diagnostics = diagnostics.iter().map(to_lsp_diagnostic).collect();
        self.client.publish_diagnostics(uri, diagnostics, None).await;
    }

    /// Validate after the configured quiet period
    async fn schedule_diagnostics(&self, uri: Url, version: u64) {
        let delay = Duration::from_millis(self.engine.read().await.config.lsp.debounce_ms);
        let backend = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            backend.publish_diagnostics(uri, version).await;
        });
    }
}

/// `sqlsense.toml` under the root; `None` when there is no such file
fn load_config(root: &Path) -> anyhow::Result<Option<Config>> {
    let path = root.join("sqlsense.toml");
    if !path.exists() {
        return Ok(None);
    }
    let config = Config::from_file(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    Ok(Some(config))
}

fn load_schema(path: &Path) -> anyhow::Result<SchemaSnapshot> {
    SchemaSnapshot::from_json_file(path)
        .with_context(|| format!("Failed to load schema snapshot from {}", path.display()))
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        #[allow(deprecated)]
        let root = params.root_uri.and_then(|uri| uri.to_file_path().ok());
        *self.root.write().await = root;
        self.reload_workspace().await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                        ..Default::default()
                    },
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".to_string(), " ".to_string()]),
                    ..Default::default()
                }),
                code_lens_provider: Some(CodeLensOptions {
                    resolve_provider: Some(false),
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "sqlsense-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "sqlsense LSP server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = self.store(uri.clone(), params.text_document.text).await;
        self.publish_diagnostics(uri, version).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;

        // Full sync: the last change carries the whole text
        if let Some(change) = params.content_changes.into_iter().last() {
            let version = self.store(uri.clone(), change.text).await;
            self.schedule_diagnostics(uri, version).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;

        let version = match params.text {
            Some(text) => self.store(uri.clone(), text).await,
            None => match self.document(&uri).await {
                Some(document) => document.version,
                None => return,
            },
        };

        // Config or snapshot may have been the file that was saved
        self.reload_workspace().await;
        self.publish_diagnostics(uri, version).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.write().await.remove(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let Some(document) = self.document(&uri).await else {
            return Ok(None);
        };
        let Some(offset) = offset_of(&document.text, position) else {
            return Ok(None);
        };

        let engine = self.engine.read().await.clone();
        let schema = self.schema.read().await.clone();

        let before = &document.text[..offset];
        let context = engine.classifier.classify(before, Some(&document.text));

        let line = position.line as usize + 1;
        let column = position.character as usize + 1;
        let statement = engine
            .locator
            .locate(&document.text, line, column)
            .map(|span| span.text)
            .unwrap_or_else(|| before.to_string());
        let references = References::extract_with(&engine.parser, &statement);

        tracing::debug!(context = context.kind(), "completion");
        let items = completion_items(&context, &references, schema.as_deref());
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn code_lens(&self, params: CodeLensParams) -> Result<Option<Vec<CodeLens>>> {
        let uri = params.text_document.uri;
        let Some(document) = self.document(&uri).await else {
            return Ok(None);
        };

        let engine = self.engine.read().await.clone();
        let lenses = engine
            .locator
            .statement_spans(&document.text)
            .iter()
            .map(|span| statement_lens(&uri, span))
            .collect();
        Ok(Some(lenses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("sqlsense-lsp-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn missing_config_is_not_an_error() {
        let root = temp_root("no-config");
        assert!(load_config(&root).unwrap().is_none());
    }

    #[test]
    fn config_is_read_from_the_root() {
        let root = temp_root("config");
        std::fs::write(
            root.join("sqlsense.toml"),
            "[lsp]\ndebounce_ms = 250\nschema_snapshot = \"schema.json\"\n",
        )
        .unwrap();

        let config = load_config(&root).unwrap().unwrap();
        assert_eq!(config.lsp.debounce_ms, 250);
        assert_eq!(config.schema_snapshot_path(), Some(root.join("schema.json")));
    }

    #[test]
    fn broken_snapshot_reports_its_path() {
        let root = temp_root("schema");
        let path = root.join("schema.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_schema(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("schema.json"));
    }
}
