//! Format-aware document store over a [`FsBackend`].
//!
//! ### Cache rules
//! - `meta` maps a URI to its last known [`DocumentStat`]; `known` marks a document as known but
//!   not loaded. Values are never cached: every load re-reads.
//! - Both are filled after a successful save, append or load and cleared after a confirmed drop.
//! - The native filesystem is the source of truth; the caches only save redundant calls.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::core::utils::{self, Strip};
use crate::core::{AccessLevel, FsBackend, Result, StoreError};
use crate::vfs::{DirFS, DocumentStat};

mod access;
mod config;
mod format;
mod index;
mod listing;

pub use access::{AccessGuard, AllowAll, RootGuard};
pub use config::{DEFAULT_INDEX_FILES, StoreConfig};
pub use format::{FormatRegistry, LoadOptions, Loader, Matcher, Saver};
pub use index::DocumentIndex;
pub use listing::{EntryFilter, FindOptions, ListOptions, ReadDirOptions, SortKey, SortOrder};

/// Filesystem-backed document store rooted at `cwd/root`.
///
/// ### Example:
/// ```no_run
/// use docstore_kit::{DocumentStore, StoreConfig};
/// use serde_json::json;
///
/// # async fn run() -> docstore_kit::Result<()> {
/// let store = DocumentStore::new(StoreConfig::new("/tmp", "my_docs"))?;
/// store.connect().await?;
///
/// store.save_document("users/alice.json", &json!({"name": "Alice"})).await?;
/// let alice = store.load_document("users/alice.json", json!({})).await?;
/// assert_eq!(alice["name"], "Alice");
/// # Ok(())
/// # }
/// ```
pub struct DocumentStore {
    config: StoreConfig,
    backend: Arc<dyn FsBackend>,
    guard: Arc<dyn AccessGuard>,
    formats: Arc<FormatRegistry>,
    meta: Mutex<HashMap<String, DocumentStat>>,
    known: Mutex<HashSet<String>>,
    created_root_parents: Mutex<Vec<PathBuf>>, // host paths created by connect()
    connected: AtomicBool,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("cwd", &self.config.cwd)
            .field("root", &self.config.root)
            .field("formats", &self.formats)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl DocumentStore {
    /// Creates a store over the host filesystem.
    pub fn new(config: StoreConfig) -> Result<Self> {
        Self::with_backend(config, Arc::new(DirFS::new()))
    }

    /// Creates a store over any native filesystem capability.
    pub fn with_backend(config: StoreConfig, backend: Arc<dyn FsBackend>) -> Result<Self> {
        config.validate()?;
        let guard = Arc::new(RootGuard::with_exceptions(config.access_exceptions.clone()));
        Ok(Self {
            config,
            backend,
            guard,
            formats: Arc::new(FormatRegistry::builtin()),
            meta: Mutex::new(HashMap::new()),
            known: Mutex::new(HashSet::new()),
            created_root_parents: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
        })
    }

    /// Replaces the access policy.
    pub fn with_guard<G: AccessGuard + 'static>(mut self, guard: G) -> Self {
        self.guard = Arc::new(guard);
        self
    }

    /// Replaces the loader/saver chains.
    pub fn with_formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = Arc::new(formats);
        self
    }

    /// Configuration the store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Absolute directory the root is resolved against.
    pub fn cwd(&self) -> &Path {
        &self.config.cwd
    }

    /// Root directory name, relative to `cwd`.
    pub fn root(&self) -> &str {
        &self.config.root
    }

    /// True between a successful `connect` and the next `disconnect`.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Lexically normalizes a URI. `..` never climbs above the root.
    pub fn normalize(&self, path: &str) -> String {
        utils::normalize(path)
    }

    /// Composes `segments` into a root-relative URI. `..` above the root saturates.
    pub fn resolve_sync(&self, segments: &[&str]) -> String {
        utils::normalize_all(segments)
    }

    /// Async form of [`Self::resolve_sync`].
    pub async fn resolve(&self, segments: &[&str]) -> String {
        self.resolve_sync(segments)
    }

    /// `cwd` + `root` + normalized `segments`. A leading `/` means the virtual root.
    pub fn absolute(&self, segments: &[&str]) -> PathBuf {
        let mut path = self.config.cwd.clone();
        for part in utils::segments(&self.config.root) {
            path.push(part);
        }
        let uri = utils::normalize_all(segments);
        for part in utils::segments(&uri) {
            path.push(part);
        }
        path
    }

    /// [`Self::absolute`] made absolute with the platform's path rules.
    pub fn location(&self, segments: &[&str]) -> PathBuf {
        let path = self.absolute(segments);
        std::path::absolute(&path).unwrap_or(path)
    }

    /// Path that leads from `from` to `to`. It may start with `..`.
    pub fn relative(&self, from: &str, to: &str) -> String {
        utils::relative(from, to)
    }

    /// Last segment of `path`, see [`utils::basename`].
    pub fn basename(&self, path: &str, strip: Strip<'_>) -> String {
        utils::basename(path, strip)
    }

    /// Parent URI, always ending with `/`.
    pub fn dirname(&self, path: &str) -> String {
        utils::dirname(path)
    }

    /// Lowercased extension with its dot, or an empty string.
    pub fn extname(&self, path: &str) -> String {
        utils::extname(path)
    }

    /// Ensures the root directory exists.
    pub async fn connect(&self) -> Result<()> {
        let root = self.location(&[]);
        let created = self
            .backend
            .mkdir_all(&root)
            .await
            .map_err(|e| StoreError::write(&self.config.root, e))?;
        debug!(root = %root.display(), created = created.len(), "connected");
        self.created_root_parents.lock().extend(created);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// With `erase_on_disconnect`, removes everything under the root and the root directories
    /// `connect()` created.
    pub async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        if !self.config.erase_on_disconnect {
            return Ok(());
        }

        let created = std::mem::take(&mut *self.created_root_parents.lock());
        let root = self.location(&[]);
        match created.first() {
            Some(outermost) => self.erase(outermost).await?,
            None => {
                let children = match self.backend.read_dir(&root).await {
                    Ok(children) => children,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
                    Err(e) => return Err(StoreError::delete(&self.config.root, e.to_string())),
                };
                for (name, _) in children {
                    self.erase(&root.join(name)).await?;
                }
            }
        }
        self.meta.lock().clear();
        self.known.lock().clear();
        debug!(root = %root.display(), "disconnected and erased");
        Ok(())
    }

    async fn erase(&self, path: &Path) -> Result<()> {
        let result = match self.backend.stat(path).await {
            Ok(stat) if stat.is_dir() => self.backend.remove_dir_all(path).await,
            Ok(_) => self.backend.remove_file(path).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::delete(&path.display().to_string(), e.to_string())),
        }
    }

    /// New store rooted at `uri` beneath the current root, with its own empty caches.
    pub fn extract(&self, uri: &str) -> Result<DocumentStore> {
        self.guard.ensure_access(uri, AccessLevel::Read)?;
        let root = utils::normalize_all(&[self.config.root.as_str(), uri]);
        let config = StoreConfig {
            root: root.trim_end_matches('/').to_string(),
            ..self.config.clone()
        };
        Ok(DocumentStore {
            config,
            backend: Arc::clone(&self.backend),
            guard: Arc::clone(&self.guard),
            formats: Arc::clone(&self.formats),
            meta: Mutex::new(HashMap::new()),
            known: Mutex::new(HashSet::new()),
            created_root_parents: Mutex::new(Vec::new()),
            connected: AtomicBool::new(self.is_connected()),
        })
    }

    fn cache_key(uri: &str) -> String {
        let key = utils::normalize(uri);
        match key.trim_end_matches('/') {
            "" => ".".to_string(),
            trimmed => trimmed.to_string(),
        }
    }

    fn remember(&self, uri: &str, stat: DocumentStat) {
        let key = Self::cache_key(uri);
        trace!(uri = %key, exists = stat.exists, "cache update");
        if stat.exists {
            self.meta.lock().insert(key.clone(), stat);
            self.known.lock().insert(key);
        } else {
            self.forget(&key);
        }
    }

    fn forget(&self, key: &str) {
        self.meta.lock().remove(key);
        self.known.lock().remove(key);
    }

    /// Last stat recorded for `uri`, if any.
    pub fn cached_stat(&self, uri: &str) -> Option<DocumentStat> {
        self.meta.lock().get(&Self::cache_key(uri)).cloned()
    }

    /// True once `uri` is known to the cache (its value is never held).
    pub fn is_cached(&self, uri: &str) -> bool {
        self.known.lock().contains(&Self::cache_key(uri))
    }

    fn cached_children(&self, key: &str) -> Vec<String> {
        let prefix = format!("{key}/");
        self.meta
            .lock()
            .keys()
            .filter(|k| *k != key && (key == "." || k.starts_with(&prefix)))
            .cloned()
            .collect()
    }

    async fn stat_native(&self, path: &Path) -> DocumentStat {
        match self.backend.stat(path).await {
            Ok(stat) => stat,
            Err(e) if e.kind() == io::ErrorKind::NotFound => DocumentStat::missing("not found"),
            Err(e) => DocumentStat::missing(e.to_string()),
        }
    }

    /// Fresh metadata from the native layer. Never fails: problems end up in `error`.
    pub async fn stat_document(&self, uri: &str) -> DocumentStat {
        if let Err(e) = self.guard.ensure_access(uri, AccessLevel::Read) {
            return DocumentStat::missing(e.to_string());
        }
        self.stat_native(&self.location(&[uri])).await
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            soft_errors: self.config.soft_parse_errors,
            delimiter: self.config.text_delimiter.clone(),
        }
    }

    /// Loads and decodes `uri`, or returns `default` when it does not exist.
    pub async fn load_document(&self, uri: &str, default: Value) -> Result<Value> {
        self.load_document_with(uri, default, &self.load_options()).await
    }

    /// Like [`Self::load_document`] with explicit decoding options.
    /// Returns `Value::Bool(false)` if no loader accepted the content.
    pub async fn load_document_with(
        &self,
        uri: &str,
        default: Value,
        options: &LoadOptions,
    ) -> Result<Value> {
        let ext = utils::extname(uri);
        self.guard.ensure_access(uri, AccessLevel::Read)?;
        let path = self.location(&[uri]);

        let stat = self.stat_native(&path).await;
        if !stat.exists {
            trace!(uri, "missing, returning default");
            return Ok(default);
        }
        let bytes = match self.backend.read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(default),
            Err(e) => return Err(StoreError::Io(e)),
        };
        self.remember(uri, stat);

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) if options.soft_errors => return Ok(Value::Null),
            Err(e) => {
                return Err(StoreError::Parse {
                    uri: uri.to_string(),
                    source: e.into(),
                });
            }
        };
        match self.formats.load(&ext, &text, options) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Ok(Value::Bool(false)),
            Err(source) => Err(StoreError::Parse {
                uri: uri.to_string(),
                source,
            }),
        }
    }

    async fn ensure_parent(&self, uri: &str, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.backend
                .mkdir_all(parent)
                .await
                .map_err(|e| StoreError::write(uri, e))?;
        }
        Ok(())
    }

    /// Encodes `document` by extension and writes it, creating parent directories.
    /// Returns `false` only when no saver accepted the data.
    pub async fn save_document(&self, uri: &str, document: &Value) -> Result<bool> {
        self.guard.ensure_access(uri, AccessLevel::Write)?;
        let ext = utils::extname(uri);
        let path = self.location(&[uri]);
        self.ensure_parent(uri, &path).await?;

        let serialized = self
            .formats
            .save(&ext, document)
            .map_err(|source| StoreError::Parse {
                uri: uri.to_string(),
                source,
            })?;
        let Some(serialized) = serialized else {
            return Ok(false);
        };

        self.backend
            .write(&path, serialized.as_bytes())
            .await
            .map_err(|e| StoreError::write(uri, e))?;
        debug!(uri, bytes = serialized.len(), "saved");

        let stat = self.stat_native(&path).await;
        self.remember(uri, stat);
        Ok(true)
    }

    /// Appends `chunk` verbatim, below the format layer.
    pub async fn write_document(&self, uri: &str, chunk: &str) -> Result<bool> {
        self.guard.ensure_access(uri, AccessLevel::Write)?;
        let path = self.location(&[uri]);
        self.ensure_parent(uri, &path).await?;

        self.backend
            .append(&path, chunk.as_bytes())
            .await
            .map_err(|e| StoreError::write(uri, e))?;
        debug!(uri, bytes = chunk.len(), "appended");

        let stat = self.stat_native(&path).await;
        self.remember(uri, stat);
        Ok(true)
    }

    /// Removes a file or an empty directory.
    /// Returns `false` if it did not exist; fails on a non-empty directory.
    pub async fn drop_document(&self, uri: &str) -> Result<bool> {
        self.guard.ensure_access(uri, AccessLevel::Delete)?;
        let key = Self::cache_key(uri);
        if key == "." {
            return Err(StoreError::delete(uri, "the root cannot be removed"));
        }
        let path = self.location(&[uri]);

        let stat = self.stat_native(&path).await;
        if !stat.exists {
            self.forget(&key);
            return Ok(false);
        }

        let removed = if stat.is_dir() {
            for child in self.cached_children(&key) {
                let child_stat = self.stat_native(&self.location(&[child.as_str()])).await;
                if child_stat.exists {
                    return Err(StoreError::delete(uri, "directory is not empty"));
                }
                self.forget(&child);
            }
            self.backend.remove_dir(&path).await
        } else {
            self.backend.remove_file(&path).await
        };
        match removed {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => {
                return Err(StoreError::delete(uri, "directory is not empty"));
            }
            Err(e) => return Err(StoreError::delete(uri, e.to_string())),
        }

        let gone = !self.backend.exists(&path).await;
        if gone {
            self.forget(&key);
        }
        debug!(uri, gone, "dropped");
        Ok(gone)
    }

    /// Drops each URI independently; results keep the input order.
    pub async fn drop_all(&self, uris: &[&str]) -> Vec<Result<bool>> {
        let mut results = Vec::with_capacity(uris.len());
        for uri in uris {
            results.push(self.drop_document(uri).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MapFS;
    use serde_json::json;
    use tempdir::TempDir;

    fn setup_test_env() -> TempDir {
        TempDir::new("docstore_test").unwrap()
    }

    fn host_store(temp_dir: &TempDir) -> DocumentStore {
        DocumentStore::new(StoreConfig::new(temp_dir.path(), "data")).unwrap()
    }

    fn memory_store() -> DocumentStore {
        DocumentStore::with_backend(StoreConfig::new("/mem", "root"), Arc::new(MapFS::new()))
            .unwrap()
    }

    mod paths {
        use super::*;

        #[test]
        fn test_absolute_and_location() {
            let store = memory_store();
            assert_eq!(store.absolute(&["a", "b.json"]), PathBuf::from("/mem/root/a/b.json"));
            assert_eq!(store.absolute(&["/a"]), PathBuf::from("/mem/root/a"));
            assert_eq!(store.absolute(&["../../etc/passwd"]), PathBuf::from("/mem/root/etc/passwd"));
            assert_eq!(store.location(&[]), PathBuf::from("/mem/root"));
        }

        #[test]
        fn test_resolve_sync_saturates() {
            let store = memory_store();
            assert_eq!(store.resolve_sync(&["sub", "..", ".."]), ".");
            assert_eq!(store.resolve_sync(&["../../x"]), "x");
            assert_eq!(store.resolve_sync(&["a", "b/"]), "a/b/");
        }

        #[tokio::test]
        async fn test_resolve_matches_sync() {
            let store = memory_store();
            assert_eq!(store.resolve(&["a/./b", "../c"]).await, "a/c");
        }

        #[test]
        fn test_name_helpers() {
            let store = memory_store();
            assert_eq!(store.basename("a/b.txt", Strip::Extension), "b");
            assert_eq!(store.dirname("a/b.txt"), "a/");
            assert_eq!(store.extname("a/B.YML"), ".yml");
            assert_eq!(store.relative("a/b", "a/c"), "../c");
            assert_eq!(store.normalize("a//b/"), "a/b/");
        }
    }

    mod lifecycle {
        use super::*;

        #[tokio::test]
        async fn test_connect_creates_root() {
            let temp_dir = setup_test_env();
            let store = DocumentStore::new(StoreConfig::new(temp_dir.path(), "a/b")).unwrap();

            store.connect().await.unwrap();

            assert!(store.is_connected());
            assert!(temp_dir.path().join("a/b").is_dir());
        }

        #[tokio::test]
        async fn test_disconnect_erases_created_root() {
            let temp_dir = setup_test_env();
            let config = StoreConfig::new(temp_dir.path(), "a/b").with_erase_on_disconnect(true);
            let store = DocumentStore::new(config).unwrap();
            store.connect().await.unwrap();
            store.save_document("x.txt", &json!("x")).await.unwrap();

            store.disconnect().await.unwrap();

            assert!(!store.is_connected());
            assert!(!temp_dir.path().join("a").exists());
            assert!(!store.is_cached("x.txt"));
        }

        #[tokio::test]
        async fn test_disconnect_keeps_preexisting_root() {
            let temp_dir = setup_test_env();
            std::fs::create_dir(temp_dir.path().join("data")).unwrap();
            let config = StoreConfig::new(temp_dir.path(), "data").with_erase_on_disconnect(true);
            let store = DocumentStore::new(config).unwrap();
            store.connect().await.unwrap();
            store.save_document("sub/x.txt", &json!("x")).await.unwrap();

            store.disconnect().await.unwrap();

            assert!(temp_dir.path().join("data").is_dir());
            assert!(!temp_dir.path().join("data/sub").exists());
        }

        #[tokio::test]
        async fn test_disconnect_without_erase_keeps_files() {
            let temp_dir = setup_test_env();
            let store = host_store(&temp_dir);
            store.connect().await.unwrap();
            store.save_document("x.txt", &json!("x")).await.unwrap();

            store.disconnect().await.unwrap();

            assert!(temp_dir.path().join("data/x.txt").exists());
        }

        #[tokio::test]
        async fn test_connect_fails_on_file_root() {
            let temp_dir = setup_test_env();
            std::fs::write(temp_dir.path().join("data"), b"not a dir").unwrap();
            let store = host_store(&temp_dir);

            let err = store.connect().await.unwrap_err();
            assert!(matches!(err, StoreError::Write { .. }));
        }
    }

    mod save_load {
        use super::*;

        #[tokio::test]
        async fn test_save_then_load_json() {
            let temp_dir = setup_test_env();
            let store = host_store(&temp_dir);
            store.connect().await.unwrap();
            let alice = json!({"name": "Alice", "role": "Developer"});

            assert!(store.save_document("users/alice.json", &alice).await.unwrap());
            let loaded = store.load_document("users/alice.json", json!(null)).await.unwrap();

            assert_eq!(loaded, alice);
            assert!(temp_dir.path().join("data/users/alice.json").is_file());
        }

        #[tokio::test]
        async fn test_load_missing_returns_default() {
            let store = memory_store();
            let loaded = store.load_document("missing.json", json!({})).await.unwrap();
            assert_eq!(loaded, json!({}));
            assert!(!store.is_cached("missing.json"));
        }

        #[tokio::test]
        async fn test_load_missing_skips_loaders() {
            let mut formats = FormatRegistry::text_only();
            formats.push_loader(Loader::new("boom", Matcher::Any, |_, _| {
                Err(anyhow::anyhow!("must not be called"))
            }));
            let store = memory_store().with_formats(formats);

            let loaded = store.load_document("nothing.txt", json!("dflt")).await.unwrap();
            assert_eq!(loaded, json!("dflt"));
        }

        #[tokio::test]
        async fn test_csv_roundtrip() {
            let store = memory_store();
            let rows = json!([{"Name": "John", "Age": 30}]);

            store.save_document("x.csv", &rows).await.unwrap();

            assert_eq!(store.load_document("x.csv", json!([])).await.unwrap(), rows);
        }

        #[tokio::test]
        async fn test_resave_updates_meta() {
            let store = memory_store();
            store.save_document("doc.json", &json!({"v": 1})).await.unwrap();
            let first = store.cached_stat("doc.json").unwrap();

            store.save_document("doc.json", &json!({"v": 22})).await.unwrap();
            let second = store.cached_stat("doc.json").unwrap();

            assert!(second.mtime_ms >= first.mtime_ms);
            assert_ne!(second.size, first.size);
            assert_eq!(store.load_document("doc.json", json!(null)).await.unwrap(), json!({"v": 22}));
        }

        #[tokio::test]
        async fn test_save_marks_known_not_loaded() {
            let store = memory_store();
            assert!(!store.is_cached("a.txt"));

            store.save_document("a.txt", &json!("hello")).await.unwrap();

            assert!(store.is_cached("a.txt"));
            assert_eq!(store.meta.lock().len(), store.known.lock().len());
            assert_eq!(store.cached_stat("a.txt").map(|s| s.size), Some(5));
        }

        #[tokio::test]
        async fn test_parse_failure_and_soft_errors() {
            let store = memory_store();
            store.write_document("bad.json", "{not json").await.unwrap();

            let err = store.load_document("bad.json", json!(null)).await.unwrap_err();
            assert!(matches!(err, StoreError::Parse { .. }));

            let soft = LoadOptions {
                soft_errors: true,
                ..Default::default()
            };
            let value = store.load_document_with("bad.json", json!(1), &soft).await.unwrap();
            assert_eq!(value, Value::Null);
        }

        #[tokio::test]
        async fn test_no_matching_handler() {
            let store = memory_store();
            store.write_document("a.bin", "raw").await.unwrap();

            let mut formats = FormatRegistry::empty();
            formats.push_loader(Loader::new("decline", Matcher::Any, |_, _| Ok(None)));
            let store = store.with_formats(formats);

            assert_eq!(store.load_document("a.bin", json!(null)).await.unwrap(), json!(false));
            assert!(!store.save_document("b.bin", &json!("x")).await.unwrap());
            assert!(store.stat_document("b.bin").await.error.is_some());
        }

        #[tokio::test]
        async fn test_text_delimiter_from_config() {
            let config = StoreConfig::new("/mem", "root").with_text_delimiter("\n");
            let store = DocumentStore::with_backend(config, Arc::new(MapFS::new())).unwrap();
            store.save_document("lines.txt", &json!(["a", "b"])).await.unwrap();

            let loaded = store.load_document("lines.txt", json!(null)).await.unwrap();
            assert_eq!(loaded, json!(["a", "b"]));
        }
    }

    mod write {
        use super::*;

        #[tokio::test]
        async fn test_append_concatenates() {
            let store = memory_store();
            assert!(store.write_document("log/out.txt", "A").await.unwrap());
            assert!(store.write_document("log/out.txt", "B").await.unwrap());

            let loaded = store.load_document("log/out.txt", json!("")).await.unwrap();
            assert_eq!(loaded, json!("AB"));
            assert_eq!(store.cached_stat("log/out.txt").map(|s| s.size), Some(2));
        }

        #[tokio::test]
        async fn test_append_ignores_format() {
            let store = memory_store();
            store.write_document("rows.jsonl", "{\"a\":1}\n").await.unwrap();
            store.write_document("rows.jsonl", "{\"a\":2}\n").await.unwrap();

            let loaded = store.load_document("rows.jsonl", json!([])).await.unwrap();
            assert_eq!(loaded, json!([{"a": 1}, {"a": 2}]));
        }
    }

    mod access {
        use super::*;

        #[tokio::test]
        async fn test_escaping_uris_are_denied() {
            let store = memory_store();
            let err = store.save_document("../x.json", &json!(1)).await.unwrap_err();
            assert!(err.is_access_denied());

            let err = store.load_document("a/../../x.json", json!(1)).await.unwrap_err();
            assert!(matches!(
                err,
                StoreError::AccessDenied {
                    level: AccessLevel::Read,
                    ..
                }
            ));
            assert!(store.drop_document("../x").await.unwrap_err().is_access_denied());
            assert!(store.write_document("../x", "y").await.unwrap_err().is_access_denied());

            let stat = store.stat_document("../x").await;
            assert!(!stat.exists);
            assert!(stat.error.unwrap().contains("access denied"));
        }

        #[tokio::test]
        async fn test_configured_exception() {
            let config = StoreConfig::new("/mem", "root").with_access_exception("config.json");
            let store = DocumentStore::with_backend(config, Arc::new(MapFS::new())).unwrap();

            store.save_document("../config.json", &json!({"k": 1})).await.unwrap();
            assert_eq!(
                store.load_document("config.json", json!(null)).await.unwrap(),
                json!({"k": 1})
            );
        }

        struct ReadOnly;

        impl AccessGuard for ReadOnly {
            fn ensure_access(&self, uri: &str, level: AccessLevel) -> Result<()> {
                match level {
                    AccessLevel::Read => Ok(()),
                    _ => Err(StoreError::AccessDenied {
                        uri: uri.to_string(),
                        level,
                    }),
                }
            }
        }

        #[tokio::test]
        async fn test_custom_guard_runs_before_native_calls() {
            let store = memory_store().with_guard(ReadOnly);
            assert!(store.save_document("a.txt", &json!("x")).await.is_err());
            assert!(store.stat_document("a.txt").await.error.is_some());
            assert_eq!(store.load_document("a.txt", json!(0)).await.unwrap(), json!(0));
        }
    }

    mod drop {
        use super::*;

        #[tokio::test]
        async fn test_drop_twice() {
            let store = memory_store();
            store.save_document("a.json", &json!({})).await.unwrap();

            assert!(store.drop_document("a.json").await.unwrap());
            assert!(!store.drop_document("a.json").await.unwrap());
            assert!(!store.is_cached("a.json"));
            assert!(store.cached_stat("a.json").is_none());
        }

        #[tokio::test]
        async fn test_drop_non_empty_directory() {
            let temp_dir = setup_test_env();
            let store = host_store(&temp_dir);
            store.connect().await.unwrap();
            store.save_document("dir/a.txt", &json!("a")).await.unwrap();
            store.save_document("dir/b.txt", &json!("b")).await.unwrap();

            let err = store.drop_document("dir").await.unwrap_err();
            assert!(matches!(err, StoreError::Delete { .. }));

            assert!(store.drop_document("dir/a.txt").await.unwrap());
            assert!(store.drop_document("dir/b.txt").await.unwrap());
            assert!(store.drop_document("dir/").await.unwrap());
            assert!(!temp_dir.path().join("data/dir").exists());
        }

        #[tokio::test]
        async fn test_drop_directory_with_uncached_files() {
            let temp_dir = setup_test_env();
            let store = host_store(&temp_dir);
            store.connect().await.unwrap();
            std::fs::create_dir(temp_dir.path().join("data/ext")).unwrap();
            std::fs::write(temp_dir.path().join("data/ext/f.txt"), b"x").unwrap();

            assert!(store.drop_document("ext").await.is_err());
        }

        #[tokio::test]
        async fn test_drop_corrects_stale_cache() {
            let temp_dir = setup_test_env();
            let store = host_store(&temp_dir);
            store.connect().await.unwrap();
            store.save_document("dir/a.txt", &json!("a")).await.unwrap();
            std::fs::remove_file(temp_dir.path().join("data/dir/a.txt")).unwrap();

            assert!(store.drop_document("dir").await.unwrap());
            assert!(!store.is_cached("dir/a.txt"));
        }

        #[tokio::test]
        async fn test_drop_root_refused() {
            let store = memory_store();
            store.connect().await.unwrap();
            assert!(store.drop_document("/").await.is_err());
        }

        #[tokio::test]
        async fn test_drop_all_keeps_order() {
            let store = memory_store();
            store.save_document("a.txt", &json!("a")).await.unwrap();
            store.save_document("c.txt", &json!("c")).await.unwrap();

            let results = store.drop_all(&["a.txt", "b.txt", "c.txt", "../x"]).await;

            assert_eq!(results.len(), 4);
            assert!(matches!(results[0], Ok(true)));
            assert!(matches!(results[1], Ok(false)));
            assert!(matches!(results[2], Ok(true)));
            assert!(results[3].is_err());
        }
    }

    mod stat {
        use super::*;

        #[tokio::test]
        async fn test_stat_bypasses_cache() {
            let temp_dir = setup_test_env();
            let store = host_store(&temp_dir);
            store.connect().await.unwrap();
            store.save_document("a.txt", &json!("a")).await.unwrap();
            std::fs::write(temp_dir.path().join("data/a.txt"), b"longer").unwrap();

            let stat = store.stat_document("a.txt").await;
            assert_eq!(stat.size, 6);
            assert_eq!(store.cached_stat("a.txt").map(|s| s.size), Some(1));
        }

        #[tokio::test]
        async fn test_stat_missing() {
            let store = memory_store();
            let stat = store.stat_document("nope.txt").await;
            assert!(!stat.exists);
            assert_eq!(stat.error.as_deref(), Some("not found"));
        }
    }

    mod extract {
        use super::*;

        #[tokio::test]
        async fn test_extract_scopes_root() {
            let store = memory_store();
            store.save_document("users/alice.json", &json!({"n": 1})).await.unwrap();

            let users = store.extract("users/").unwrap();

            assert_eq!(users.root(), "root/users");
            assert!(!users.is_cached("alice.json"));
            assert_eq!(
                users.load_document("alice.json", json!(null)).await.unwrap(),
                json!({"n": 1})
            );
            assert!(users.is_cached("alice.json"));
            assert!(store.is_cached("users/alice.json"));
        }

        #[tokio::test]
        async fn test_extract_caches_are_independent() {
            let store = memory_store();
            let users = store.extract("users").unwrap();

            users.save_document("bob.json", &json!({"n": 2})).await.unwrap();

            assert!(users.is_cached("bob.json"));
            assert!(!store.is_cached("users/bob.json"));
            assert_eq!(
                store.load_document("users/bob.json", json!(null)).await.unwrap(),
                json!({"n": 2})
            );
        }

        #[test]
        fn test_extract_denies_escape() {
            let store = memory_store();
            assert!(store.extract("../other").is_err());
        }
    }
}
