use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;

use crate::package::Manifest;
use crate::types::{Model, Record, ScriptModule};

/// Everything extracted from one object-source file.
#[derive(Debug, Clone, Default)]
pub struct SourceUnit {
    /// Class definitions in file order, keyed by their class identifier.
    pub classes: Vec<(String, Model)>,
    /// Top-level imports as dotted paths, e.g. `odoo.addons.sale.models`.
    /// Relative imports keep their leading dots.
    pub imports: Vec<String>,
    /// Status flags raised while recovering from parse failures.
    pub status: BTreeSet<String>,
}

/// Trait implemented by the object-source extractor.
pub trait SourceAnalyzer: Send + Sync {
    /// Evaluate a manifest file as a literal mapping, never executing it.
    fn parse_manifest(&self, path: &Path) -> Result<Manifest>;

    /// Parse one source file, recovering from legacy syntax where possible.
    fn analyze_file(&self, path: &Path) -> Result<SourceUnit>;
}

/// Everything extracted from one markup file.
#[derive(Debug, Clone, Default)]
pub struct MarkupUnit {
    /// Names of other packages referenced by id.
    pub refers: BTreeSet<String>,
    pub records: Vec<Record>,
    /// Script `src` attributes found in the document.
    pub scripts: Vec<String>,
}

/// Trait implemented by the markup extractor.
pub trait MarkupAnalyzer: Send + Sync {
    fn analyze(&self, path: &Path, package: &str) -> Result<MarkupUnit>;
}

/// Trait implemented by the script-convention detector.
pub trait ScriptAnalyzer: Send + Sync {
    /// `asset_path` is the asset URL the file was found under, e.g.
    /// `web/static/src/core/utils.js`.
    fn analyze(&self, path: &Path, asset_path: &str) -> Result<ScriptModule>;
}
