//! Ordered loader/saver chains keyed by file extension.
//!
//! Each handler is tried in registration order; the first one that matches the extension and
//! returns `Some` wins. A plain-text handler always closes both chains, so every extension can be
//! loaded and saved.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use serde_json::{Map, Value};

pub type LoadFn = Arc<dyn Fn(&str, &LoadOptions) -> anyhow::Result<Option<Value>> + Send + Sync>;
pub type SaveFn = Arc<dyn Fn(&Value) -> anyhow::Result<Option<String>> + Send + Sync>;

/// Per-call decoding options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Turn parse failures into `Value::Null` instead of an error.
    pub soft_errors: bool,
    /// Split plain text into an array of strings.
    pub delimiter: Option<String>,
}

/// Decides whether a handler applies to an extension (lowercased, with the dot).
#[derive(Clone)]
pub enum Matcher {
    Extensions(Vec<String>),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
    Any,
}

impl Matcher {
    pub fn extensions(exts: &[&str]) -> Self {
        Matcher::Extensions(exts.iter().map(|e| e.to_lowercase()).collect())
    }

    pub fn matches(&self, ext: &str) -> bool {
        match self {
            Matcher::Extensions(exts) => exts.iter().any(|e| e == ext),
            Matcher::Predicate(predicate) => predicate(ext),
            Matcher::Any => true,
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Extensions(exts) => f.debug_tuple("Extensions").field(exts).finish(),
            Matcher::Predicate(_) => f.write_str("Predicate(..)"),
            Matcher::Any => f.write_str("Any"),
        }
    }
}

#[derive(Clone)]
pub struct Loader {
    pub name: String,
    pub matcher: Matcher,
    load: LoadFn,
}

impl Loader {
    pub fn new<F>(name: impl Into<String>, matcher: Matcher, load: F) -> Self
    where
        F: Fn(&str, &LoadOptions) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            matcher,
            load: Arc::new(load),
        }
    }
}

#[derive(Clone)]
pub struct Saver {
    pub name: String,
    pub matcher: Matcher,
    save: SaveFn,
}

impl Saver {
    pub fn new<F>(name: impl Into<String>, matcher: Matcher, save: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Option<String>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            matcher,
            save: Arc::new(save),
        }
    }
}

#[derive(Clone)]
pub struct FormatRegistry {
    loaders: Vec<Loader>,
    savers: Vec<Saver>,
    fallback_loader: Option<Loader>,
    fallback_saver: Option<Saver>,
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("loaders", &self.loader_names())
            .field("savers", &self.saver_names())
            .finish()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FormatRegistry {
    /// No handlers at all: every load and save reports "no match".
    pub fn empty() -> Self {
        Self {
            loaders: Vec::new(),
            savers: Vec::new(),
            fallback_loader: None,
            fallback_saver: None,
        }
    }

    /// Only the plain-text fallback.
    pub fn text_only() -> Self {
        Self {
            fallback_loader: Some(Loader::new("text", Matcher::Any, load_text)),
            fallback_saver: Some(Saver::new("text", Matcher::Any, save_text)),
            ..Self::empty()
        }
    }

    /// JSON, JSON lines, YAML, CSV and TSV in front of the plain-text fallback.
    pub fn builtin() -> Self {
        let mut registry = Self::text_only();
        registry
            .push_loader(Loader::new("json", Matcher::extensions(&[".json"]), |text, _| {
                Ok(Some(serde_json::from_str(text)?))
            }))
            .push_loader(Loader::new("jsonl", Matcher::extensions(&[".jsonl"]), load_jsonl))
            .push_loader(Loader::new(
                "yaml",
                Matcher::extensions(&[".yaml", ".yml"]),
                |text, _| Ok(Some(serde_yaml::from_str(text)?)),
            ))
            .push_loader(Loader::new("csv", Matcher::extensions(&[".csv"]), |text, _| {
                decode_delimited(text, b',').map(Some)
            }))
            .push_loader(Loader::new("tsv", Matcher::extensions(&[".tsv"]), |text, _| {
                decode_delimited(text, b'\t').map(Some)
            }));
        registry
            .push_saver(Saver::new("json", Matcher::extensions(&[".json"]), |data| {
                Ok(Some(serde_json::to_string_pretty(data)?))
            }))
            .push_saver(Saver::new("jsonl", Matcher::extensions(&[".jsonl"]), save_jsonl))
            .push_saver(Saver::new(
                "yaml",
                Matcher::extensions(&[".yaml", ".yml"]),
                |data| Ok(Some(serde_yaml::to_string(data)?)),
            ))
            .push_saver(Saver::new("csv", Matcher::extensions(&[".csv"]), |data| {
                encode_delimited(data, b',')
            }))
            .push_saver(Saver::new("tsv", Matcher::extensions(&[".tsv"]), |data| {
                encode_delimited(data, b'\t')
            }));
        registry
    }

    /// Appends a loader; it runs after the existing ones and before the text fallback.
    pub fn push_loader(&mut self, loader: Loader) -> &mut Self {
        self.loaders.push(loader);
        self
    }

    pub fn push_saver(&mut self, saver: Saver) -> &mut Self {
        self.savers.push(saver);
        self
    }

    pub fn loader_names(&self) -> Vec<&str> {
        self.loaders
            .iter()
            .chain(self.fallback_loader.iter())
            .map(|l| l.name.as_str())
            .collect()
    }

    pub fn saver_names(&self) -> Vec<&str> {
        self.savers
            .iter()
            .chain(self.fallback_saver.iter())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Runs the loader chain. `Ok(None)` means no loader accepted the content.
    pub fn load(&self, ext: &str, text: &str, options: &LoadOptions) -> anyhow::Result<Option<Value>> {
        let chain = self.loaders.iter().chain(self.fallback_loader.iter());
        for loader in chain.filter(|l| l.matcher.matches(ext)) {
            match (loader.load)(text, options) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => continue,
                Err(_) if options.soft_errors => return Ok(Some(Value::Null)),
                Err(e) => return Err(e.context(format!("{} loader", loader.name))),
            }
        }
        Ok(None)
    }

    /// Runs the saver chain and returns the serialized form of the first match.
    pub fn save(&self, ext: &str, data: &Value) -> anyhow::Result<Option<String>> {
        let chain = self.savers.iter().chain(self.fallback_saver.iter());
        for saver in chain.filter(|s| s.matcher.matches(ext)) {
            if let Some(serialized) =
                (saver.save)(data).with_context(|| format!("{} saver", saver.name))?
            {
                return Ok(Some(serialized));
            }
        }
        Ok(None)
    }
}

fn load_text(text: &str, options: &LoadOptions) -> anyhow::Result<Option<Value>> {
    let value = match options.delimiter.as_deref() {
        Some(delimiter) if !delimiter.is_empty() => Value::Array(
            text.split(delimiter)
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ),
        _ => Value::String(text.to_string()),
    };
    Ok(Some(value))
}

fn save_text(data: &Value) -> anyhow::Result<Option<String>> {
    let text = match data {
        Value::String(s) => s.clone(),
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        other => serde_json::to_string(other)?,
    };
    Ok(Some(text))
}

fn load_jsonl(text: &str, _: &LoadOptions) -> anyhow::Result<Option<Value>> {
    let mut rows = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = serde_json::from_str::<Value>(line).with_context(|| format!("line {}", n + 1))?;
        rows.push(value);
    }
    Ok(Some(Value::Array(rows)))
}

fn save_jsonl(data: &Value) -> anyhow::Result<Option<String>> {
    let mut out = String::new();
    let rows = match data {
        Value::Array(rows) => rows.as_slice(),
        single => std::slice::from_ref(single),
    };
    for row in rows {
        out.push_str(&serde_json::to_string(row)?);
        out.push('\n');
    }
    Ok(Some(out))
}

/// Numeric-looking cells become numbers, everything else stays a string.
fn typed_cell(cell: &str) -> Value {
    let trimmed = cell.trim();
    if !trimmed.is_empty() {
        if let Ok(n) = trimmed.parse::<i64>() {
            return Value::from(n);
        }
        if let Ok(n) = trimmed.parse::<u64>() {
            return Value::from(n);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Value::from(f);
            }
        }
    }
    Value::String(cell.to_string())
}

fn decode_delimited(text: &str, delimiter: u8) -> anyhow::Result<Value> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| (name.to_string(), typed_cell(cell)))
            .collect();
        rows.push(Value::Object(row));
    }
    Ok(Value::Array(rows))
}

fn cell_text(value: Option<&Value>) -> anyhow::Result<String> {
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(nested) => serde_json::to_string(nested)?,
    })
}

/// Writes an array of flat records; anything else is left to the next saver.
fn encode_delimited(data: &Value, delimiter: u8) -> anyhow::Result<Option<String>> {
    let Some(rows) = data.as_array() else {
        return Ok(None);
    };
    if rows.iter().any(|row| !row.is_object()) {
        return Ok(None);
    }

    let mut headers: Vec<&str> = Vec::new();
    for row in rows.iter().filter_map(Value::as_object) {
        for name in row.keys() {
            if !headers.contains(&name.as_str()) {
                headers.push(name);
            }
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    if !headers.is_empty() {
        writer.write_record(&headers)?;
    }
    for row in rows.iter().filter_map(Value::as_object) {
        let cells = headers
            .iter()
            .map(|name| cell_text(row.get(*name)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        writer.write_record(&cells)?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow!("{}", e.error()))?;
    Ok(Some(String::from_utf8(bytes)?))
}
