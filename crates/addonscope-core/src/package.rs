use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Model, Record, ScriptModule};

/// Manifest content: a literal mapping.
pub type Manifest = Map<String, Value>;

/// Lines of code of one language inside a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageShare {
    pub lines: u64,
    pub fraction_from_total: f64,
}

/// One of the three package relation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Declared in the manifest.
    Depends,
    /// Source-level import of another package.
    Imports,
    /// Markup-level reference to another package's id.
    Refers,
}

/// Short summary of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageInfo {
    pub name: String,
    pub model_count: usize,
    pub class_count: usize,
    pub record_count: usize,
    pub view_count: usize,
    pub depends: usize,
}

/// A discovered addon package and everything extracted from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub path: PathBuf,
    pub name: String,
    #[serde(default)]
    pub manifest: Manifest,
    #[serde(default)]
    pub models: BTreeMap<String, Model>,
    #[serde(default)]
    pub classes: BTreeMap<String, Model>,
    #[serde(default)]
    pub script_modules: BTreeMap<String, ScriptModule>,
    #[serde(default)]
    pub views: BTreeMap<String, Record>,
    #[serde(default)]
    pub records: BTreeMap<String, Record>,
    #[serde(default)]
    pub depends: BTreeSet<String>,
    #[serde(default)]
    pub imports: BTreeSet<String>,
    #[serde(default)]
    pub refers: BTreeSet<String>,
    #[serde(default)]
    pub files: BTreeSet<PathBuf>,
    #[serde(default)]
    pub status: BTreeSet<String>,
    #[serde(default)]
    pub language: BTreeMap<String, LanguageShare>,
    #[serde(default)]
    pub words: BTreeSet<String>,
    #[serde(default)]
    pub hashsum: String,
    #[serde(default)]
    pub data_count: u64,
    #[serde(default)]
    pub duration_secs: f64,
}

/// Whether a file name looks like a readme.
pub fn is_readme(file_name: &str) -> bool {
    file_name.starts_with("readme.") || file_name.starts_with("README.")
}

impl Package {
    /// Create an empty package for a directory; the name is its last segment.
    pub fn new(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self {
            path: path.to_path_buf(),
            name,
            ..Self::default()
        }
    }

    fn manifest_str(&self, key: &str) -> &str {
        self.manifest.get(key).and_then(Value::as_str).unwrap_or("")
    }

    pub fn author(&self) -> &str {
        self.manifest_str("author")
    }

    pub fn category(&self) -> &str {
        self.manifest_str("category")
    }

    pub fn description(&self) -> &str {
        self.manifest_str("description")
    }

    pub fn license(&self) -> &str {
        self.manifest_str("license")
    }

    pub fn summary(&self) -> &str {
        self.manifest_str("summary")
    }

    pub fn version(&self) -> &str {
        self.manifest_str("version")
    }

    pub fn website(&self) -> &str {
        self.manifest_str("website")
    }

    pub fn external_dependencies(&self) -> Value {
        self.manifest
            .get("external_dependencies")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    pub fn installable(&self) -> bool {
        self.manifest
            .get("installable")
            .map(is_truthy)
            .unwrap_or(false)
    }

    pub fn auto_install(&self) -> bool {
        self.manifest
            .get("auto_install")
            .map(is_truthy)
            .unwrap_or(false)
    }

    /// Data files declared in the manifest.
    pub fn data_files(&self) -> Vec<String> {
        string_list(self.manifest.get("data"))
    }

    /// Asset globs declared in the manifest, skipping `remove` directives.
    pub fn asset_patterns(&self) -> Vec<String> {
        let Some(Value::Object(bundles)) = self.manifest.get("assets") else {
            return Vec::new();
        };

        let mut patterns = Vec::new();
        for entries in bundles.values() {
            let Value::Array(entries) = entries else {
                continue;
            };
            for entry in entries {
                match entry {
                    Value::String(path) => patterns.push(path.clone()),
                    Value::Array(directive) => {
                        if directive.first().and_then(Value::as_str) == Some("remove") {
                            continue;
                        }
                        if let Some(path) = directive.last().and_then(Value::as_str) {
                            patterns.push(path.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }
        patterns
    }

    fn readme_path(&self) -> Option<PathBuf> {
        let mut names: Vec<String> = std::fs::read_dir(&self.path)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| is_readme(n))
            .collect();
        names.sort();
        names.first().map(|n| self.path.join(n))
    }

    /// Content of the first readme file, or an empty string.
    pub fn readme(&self) -> String {
        self.readme_path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .unwrap_or_default()
    }

    /// Extension of the readme file including the dot, e.g. `.md`.
    pub fn readme_extension(&self) -> Option<String> {
        self.readme_path()?
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
    }

    pub fn info(&self) -> PackageInfo {
        let related: BTreeSet<&String> = self
            .depends
            .iter()
            .chain(&self.imports)
            .chain(&self.refers)
            .collect();
        PackageInfo {
            name: self.name.clone(),
            model_count: self.models.len(),
            class_count: self.classes.len(),
            record_count: self.records.len(),
            view_count: self.views.len(),
            depends: related.len(),
        }
    }

    /// Names reachable through the selected relation kinds.
    pub fn related(&self, relations: &[Relation]) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for relation in relations {
            out.extend(self.relation(*relation).iter().cloned());
        }
        out
    }

    pub fn relation(&self, relation: Relation) -> &BTreeSet<String> {
        match relation {
            Relation::Depends => &self.depends,
            Relation::Imports => &self.imports,
            Relation::Refers => &self.refers,
        }
    }

    pub fn add(&mut self, relation: Relation, name: impl Into<String>) {
        let set = match relation {
            Relation::Depends => &mut self.depends,
            Relation::Imports => &mut self.imports,
            Relation::Refers => &mut self.refers,
        };
        set.insert(name.into());
    }

    /// Merge a second discovery of the same package.
    pub fn merge_from(&mut self, other: &Package) {
        for (name, model) in &other.models {
            self.merge_model(model.clone(), name);
        }
        self.depends.extend(other.depends.iter().cloned());
        self.imports.extend(other.imports.iter().cloned());
        self.refers.extend(other.refers.iter().cloned());
        self.files.extend(other.files.iter().cloned());
    }

    pub fn merge_model(&mut self, model: Model, key: &str) {
        match self.models.get_mut(key) {
            Some(existing) => existing.merge(&model),
            None => {
                self.models.insert(key.to_string(), model);
            }
        }
    }

    /// File a record under views or data records depending on its kind.
    pub fn merge_record(&mut self, record: Record) {
        let target = if record.is_view() {
            &mut self.views
        } else {
            &mut self.records
        };
        match target.get_mut(&record.name) {
            Some(existing) => existing.merge(&record),
            None => {
                target.insert(record.name.clone(), record);
            }
        }
    }

    /// Add the keywords of some free text.
    pub fn add_keywords(&mut self, text: &str, keywords: &Keywords) {
        self.words.extend(keywords.extract(text));
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Module: {}>", self.name)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Keyword extraction: lowercased words of at least two ASCII letters,
/// stopwords removed.
#[derive(Debug, Clone)]
pub struct Keywords {
    word: Regex,
    stopwords: BTreeSet<String>,
}

impl Keywords {
    pub fn new(stopwords: BTreeSet<String>) -> Result<Self> {
        Ok(Self {
            word: Regex::new(r"\b[a-zA-Z]{2,}\b").context("failed to compile keyword pattern")?,
            stopwords,
        })
    }

    pub fn extract(&self, text: &str) -> BTreeSet<String> {
        self.word
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|w| !self.stopwords.contains(w))
            .collect()
    }
}
