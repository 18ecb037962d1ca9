use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::{Result, StoreError};

pub const DEFAULT_INDEX_FILES: [&str; 2] = ["index.txt", "index.txtl"];

/// Construction-time settings of a [`crate::DocumentStore`].
///
/// Can be built in code or read from TOML:
///
/// ```toml
/// root = "data"
/// access_exceptions = ["config.json"]
/// text_delimiter = "\n"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Host working directory the root is resolved against.
    pub cwd: PathBuf,
    /// Virtual root, relative to `cwd`.
    pub root: String,
    /// Basenames that may be addressed above the root.
    pub access_exceptions: Vec<String>,
    /// Index filenames probed in order when listing a directory.
    pub index_files: Vec<String>,
    pub soft_parse_errors: bool,
    /// Splits plain-text documents into an array of strings on load.
    pub text_delimiter: Option<String>,
    /// `disconnect()` erases the root directories `connect()` created.
    pub erase_on_disconnect: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            root: ".".to_string(),
            access_exceptions: Vec::new(),
            index_files: DEFAULT_INDEX_FILES.iter().map(|s| s.to_string()).collect(),
            soft_parse_errors: false,
            text_delimiter: None,
            erase_on_disconnect: false,
        }
    }
}

impl StoreConfig {
    pub fn new(cwd: impl Into<PathBuf>, root: impl Into<String>) -> Self {
        Self {
            cwd: cwd.into(),
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cwd.as_os_str().is_empty() {
            return Err(StoreError::Config("cwd must not be empty".into()));
        }
        if crate::core::utils::escapes_root(&self.root) {
            return Err(StoreError::Config(format!(
                "root '{}' climbs above cwd",
                self.root
            )));
        }
        if self.index_files.iter().any(|name| name.contains('/')) {
            return Err(StoreError::Config(
                "index file names must be plain basenames".into(),
            ));
        }
        Ok(())
    }

    pub fn with_access_exception(mut self, name: impl Into<String>) -> Self {
        self.access_exceptions.push(name.into());
        self
    }

    pub fn with_text_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.text_delimiter = Some(delimiter.into());
        self
    }

    pub fn with_erase_on_disconnect(mut self, erase: bool) -> Self {
        self.erase_on_disconnect = erase;
        self
    }
}
