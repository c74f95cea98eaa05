/* Output backends. A backend turns a compiled lexical analyzer into files; the registry maps a
 * language identifier to its backend. */

use crate::analyzer::LexicalAnalyzer;
use crate::visualizer::to_dot;
use color_eyre::eyre::{Report, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_FILE_NAME: &str = "lexical_analyzer";

#[derive(Debug, PartialEq, Eq)]
pub enum BackendError {
    /// A file name or namespace option that is not an identifier
    InvalidIdentifier(String, String),
    /// A backend id that does not match `[A-Za-z][A-Za-z0-9_+-]*`
    InvalidBackendId(String),
    UnknownBackend(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::InvalidIdentifier(what, name) => {
                write!(f, "Error: Invalid {} '{}'!", what, name)
            }
            BackendError::InvalidBackendId(id) => write!(f, "Error: Invalid backend id '{}'!", id),
            BackendError::UnknownBackend(id) => {
                write!(f, "Error: No backend registered for language '{}'!", id)
            }
        }
    }
}

impl std::error::Error for BackendError {}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn is_backend_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(ch) if ch.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '+'))
}

/// Options shared by every backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendOptions {
    file_name: Option<String>,
    namespace: Option<String>,
}

impl BackendOptions {
    pub fn new(file_name: Option<String>, namespace: Option<String>) -> Result<Self, BackendError> {
        for (value, what) in [(&file_name, "base file name"), (&namespace, "namespace")] {
            if let Some(name) = value {
                if !is_identifier(name) {
                    return Err(BackendError::InvalidIdentifier(what.to_string(), name.clone()));
                }
            }
        }
        Ok(BackendOptions {
            file_name,
            namespace,
        })
    }

    pub fn get_file_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or(DEFAULT_FILE_NAME)
    }

    pub fn get_namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

/// A file produced by a backend, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    path: PathBuf,
    contents: String,
}

impl EmittedFile {
    pub fn new(path: PathBuf, contents: String) -> Self {
        EmittedFile { path, contents }
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }

    pub fn get_contents(&self) -> &str {
        &self.contents
    }

    /// Write the file below `output_dir`, returning the full path written.
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(&self.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &self.contents)?;
        Ok(path)
    }
}

pub trait Backend {
    fn description(&self) -> &str;
    fn emit(&self, analyzer: &LexicalAnalyzer, options: &BackendOptions) -> Result<Vec<EmittedFile>>;
}

/// Emits one graphviz file per section.
pub struct DotBackend;

impl Backend for DotBackend {
    fn description(&self) -> &str {
        "Graphviz dot rendering of every section's minimized automaton"
    }

    fn emit(&self, analyzer: &LexicalAnalyzer, options: &BackendOptions) -> Result<Vec<EmittedFile>> {
        let rule_name = |rule: usize| {
            analyzer
                .get_rule(rule)
                .and_then(|record| record.get_id())
                .map_or_else(|| format!("#{}", rule), str::to_string)
        };

        let files = analyzer
            .sections()
            .iter()
            .map(|section| {
                let file_name = format!(
                    "{}.{}.dot",
                    options.get_file_name(),
                    section.get_name().replace('.', "_")
                );
                EmittedFile::new(PathBuf::from(file_name), to_dot(section.get_dfa(), &rule_name))
            })
            .collect();
        Ok(files)
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    namespace: Option<&'a str>,
    analyzer: &'a LexicalAnalyzer,
}

/// Emits the whole analyzer as a single json document.
pub struct JsonBackend;

impl Backend for JsonBackend {
    fn description(&self) -> &str {
        "Json document holding the rules and the minimized automaton of every section"
    }

    fn emit(&self, analyzer: &LexicalAnalyzer, options: &BackendOptions) -> Result<Vec<EmittedFile>> {
        let document = JsonDocument {
            namespace: options.get_namespace(),
            analyzer,
        };
        let json_string = serde_json::to_string_pretty(&document)?;
        let file_name = format!("{}.json", options.get_file_name());
        Ok(vec![EmittedFile::new(PathBuf::from(file_name), json_string)])
    }
}

pub struct BackendRegistry {
    backends: BTreeMap<String, Box<dyn Backend>>,
    default_backend: String,
}

impl BackendRegistry {
    /// An empty registry whose default language is `default_backend`.
    pub fn new(default_backend: &str) -> Self {
        BackendRegistry {
            backends: BTreeMap::new(),
            default_backend: default_backend.to_string(),
        }
    }

    /// A registry holding the `dot` and `json` backends, `json` being the default.
    pub fn with_builtins() -> Self {
        let mut registry = BackendRegistry::new("json");
        registry.backends.insert("dot".to_string(), Box::new(DotBackend));
        registry.backends.insert("json".to_string(), Box::new(JsonBackend));
        registry
    }

    pub fn register(&mut self, id: &str, backend: Box<dyn Backend>) -> Result<(), BackendError> {
        if !is_backend_id(id) {
            return Err(BackendError::InvalidBackendId(id.to_string()));
        }
        self.backends.insert(id.to_string(), backend);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&dyn Backend, BackendError> {
        self.backends
            .get(id)
            .map(|backend| backend.as_ref())
            .ok_or_else(|| BackendError::UnknownBackend(id.to_string()))
    }

    pub fn get_default(&self) -> &str {
        &self.default_backend
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// A table of the registered languages and their descriptions.
    pub fn describe(&self) -> String {
        let width = self.backends.keys().map(String::len).max().unwrap_or(0) + 1;
        let mut description = String::from("Available output languages:\n");
        for (id, backend) in &self.backends {
            let marker = if *id == self.default_backend {
                " (default)"
            } else {
                ""
            };
            description.push_str(&format!(
                "    {:width$}{}{}\n",
                id,
                backend.description(),
                marker,
                width = width
            ));
        }
        description
    }

    /// Run the backend for `id` (or the default one) and write its files below `output_dir`.
    pub fn emit(
        &self,
        id: Option<&str>,
        analyzer: &LexicalAnalyzer,
        options: &BackendOptions,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let id = id.unwrap_or(self.default_backend.as_str());
        let backend = self.get(id).map_err(Report::new)?;
        let files = backend.emit(analyzer, options)?;
        let written = files
            .iter()
            .map(|file| file.write(output_dir))
            .collect::<Result<Vec<_>>>()?;
        info!(language = id, files = written.len(), "emitted lexical analyzer");
        Ok(written)
    }
}
