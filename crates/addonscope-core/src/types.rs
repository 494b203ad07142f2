use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::metrics;

/// Status flag: a file listed in the manifest does not exist.
pub const STATUS_MISSING_FILE: &str = "missing-file";
/// Status flag: more than one manifest file was found in the package.
pub const STATUS_MULTIPLE_MANIFEST: &str = "multiple-manifest";
/// Status flag: a source file was rewritten by the syntax porter.
pub const STATUS_PORTED: &str = "ported";
/// Status flag: a source file needed its indentation normalized.
pub const STATUS_INDENT_FIX: &str = "indent-fix";

/// Status flag raised when a file only parsed under an older grammar revision.
pub fn feature_status(major: u32, minor: u32) -> String {
    format!("feature-{major}-{minor}")
}

/// Separator between a package name and a local identifier.
pub const NAME_SEPARATOR: char = '.';

/// A declared field on an object-definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub type_tag: String,
    #[serde(default)]
    pub source_text: Option<String>,
}

impl Field {
    pub fn new(type_tag: impl Into<String>, source_text: Option<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            source_text,
        }
    }

    /// The link field synthesized for a delegation-inheritance entry.
    pub fn delegation() -> Self {
        Self::new("Many2one", None)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Field: {}>", self.type_tag)
    }
}

/// A method declared on an object-definition, with its static metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub parameters: Vec<String>,
    #[serde(default)]
    pub complexity: u32,
    #[serde(default)]
    pub lines: u32,
    #[serde(default)]
    pub halstead: f64,
}

/// One declared class-like unit ("model").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inherit: BTreeSet<String>,
    /// Delegation inheritance: local field name -> target type.
    #[serde(default)]
    pub inherits: BTreeMap<String, String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Field>,
    #[serde(default)]
    pub functions: BTreeMap<String, Function>,
}

impl Model {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// A definition without its own name but exactly one extension target
    /// reopens that target and takes its name.
    pub fn adopt_inherit_name(&mut self) {
        if self.name.is_none() && self.inherit.len() == 1 {
            self.name = self.inherit.iter().next().cloned();
        }
    }

    /// Named definitions are models; everything else is an auxiliary class.
    pub fn is_model(&self) -> bool {
        self.name.is_some()
    }

    /// Merge another definition of the same model into this one.
    pub fn merge(&mut self, other: &Model) {
        if self.name != other.name {
            return;
        }
        self.inherit.extend(other.inherit.iter().cloned());
        self.inherits
            .extend(other.inherits.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.fields
            .extend(other.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.functions
            .extend(other.functions.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Targets of both extension and delegation edges.
    pub fn parents(&self) -> impl Iterator<Item = &String> {
        self.inherit.iter().chain(self.inherits.values())
    }

    fn complexities(&self) -> Vec<f64> {
        self.functions
            .values()
            .map(|f| f64::from(f.complexity))
            .collect()
    }

    /// Median cyclomatic complexity over all functions.
    pub fn complexity(&self) -> f64 {
        metrics::median(&self.complexities())
    }

    pub fn min_complexity(&self) -> u32 {
        self.functions
            .values()
            .map(|f| f.complexity)
            .min()
            .unwrap_or(0)
    }

    pub fn max_complexity(&self) -> u32 {
        self.functions
            .values()
            .map(|f| f.complexity)
            .max()
            .unwrap_or(0)
    }

    /// Geometric mean of the Halstead volumes of all functions.
    pub fn halstead(&self) -> f64 {
        let volumes: Vec<f64> = self.functions.values().map(|f| f.halstead).collect();
        metrics::geometric_mean(&volumes)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Model: {}>", self.name.as_deref().unwrap_or("?"))
    }
}

/// One markup-declared unit: a data record or a UI view/template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(default)]
    pub inherit: Option<String>,
    #[serde(default)]
    pub calls: BTreeSet<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub complexity: u64,
    #[serde(default)]
    pub lines: u64,
    #[serde(default)]
    pub view: bool,
}

impl Record {
    pub fn is_view(&self) -> bool {
        self.view
    }

    /// Namespace a bare identifier with the owning package name.
    pub fn qualify(name: &str, package: &str) -> String {
        if name.contains(NAME_SEPARATOR) {
            name.to_string()
        } else {
            format!("{package}{NAME_SEPARATOR}{name}")
        }
    }

    /// Name for a record without an own id, derived from its extension target.
    pub fn synthetic_name(inherit: &str, package: &str) -> String {
        let local = inherit.rsplit(NAME_SEPARATOR).next().unwrap_or(inherit);
        format!("{package}{NAME_SEPARATOR}{local}")
    }

    /// Merge another declaration of the same record.
    pub fn merge(&mut self, other: &Record) {
        if self.name != other.name {
            return;
        }
        self.calls.extend(other.calls.iter().cloned());
        self.complexity += other.complexity;
        self.lines += other.lines;
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.view {
            write!(f, "<View: {}>", self.name)
        } else {
            write!(f, "<Data: {}>", self.name)
        }
    }
}

/// A script asset, optionally declaring itself as a named module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptModule {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default = "default_true")]
    pub default: bool,
    #[serde(default)]
    pub requires: BTreeSet<String>,
    #[serde(default)]
    pub complexity: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl ScriptModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            default: true,
            requires: BTreeSet::new(),
            complexity: None,
        }
    }
}

impl fmt::Display for ScriptModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "<JS: {}/{alias}>", self.name),
            None => write!(f, "<JS: {}>", self.name),
        }
    }
}
