pub mod extract;
pub mod literal;
pub mod recovery;

use std::path::Path;

use anyhow::{bail, Context, Result};
use tree_sitter::{Language, Node, Query, QueryCursor, StreamingIterator};

use addonscope_core::analyzer::{SourceAnalyzer, SourceUnit};
use addonscope_core::config::ToolsConfig;
use addonscope_core::package::Manifest;
use addonscope_core::tools::SyntaxPorter;

use crate::recovery::RecoveringParser;

/// Object-source analyzer for Python addon code, built on tree-sitter.
pub struct PythonAnalyzer {
    language: Language,
    import_query: Query,
    porter: SyntaxPorter,
}

impl PythonAnalyzer {
    pub fn new(tools: &ToolsConfig) -> Result<Self> {
        let language: Language = tree_sitter_python::LANGUAGE.into();

        // Module-level imports only; imports inside functions are not followed.
        let import_query = Query::new(
            &language,
            r#"
            (module (import_statement) @import)
            (module (import_from_statement) @import)
            "#,
        )
        .context("failed to compile import query")?;

        Ok(Self {
            language,
            import_query,
            porter: SyntaxPorter::new(tools),
        })
    }

    fn top_level_imports(&self, root: Node, source: &[u8]) -> Vec<String> {
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.import_query, root, source);
        let mut statements = Vec::new();
        while let Some(m) = matches.next() {
            statements.extend(m.captures.iter().map(|c| c.node));
        }
        statements.sort_by_key(|n| n.start_byte());
        statements
            .into_iter()
            .flat_map(|statement| extract::import_paths(statement, source))
            .collect()
    }
}

impl SourceAnalyzer for PythonAnalyzer {
    fn parse_manifest(&self, path: &Path) -> Result<Manifest> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let tree = recovery::parse_tree(&self.language, &content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let root = tree.root_node();
        if root.has_error() {
            bail!("{} is not valid Python", path.display());
        }
        let value = literal::evaluate_module(root, content.as_bytes())
            .with_context(|| format!("{} is not a literal manifest", path.display()))?;
        match value {
            serde_json::Value::Object(map) => Ok(map),
            other => bail!(
                "{} evaluates to {}, expected a mapping",
                path.display(),
                kind_of(&other)
            ),
        }
    }

    fn analyze_file(&self, path: &Path) -> Result<SourceUnit> {
        let parsed = RecoveringParser::new(&self.language, &self.porter)
            .parse(path)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        let source = parsed.source.as_bytes();
        let root = parsed.tree.root_node();
        Ok(SourceUnit {
            classes: extract::classes(root, source),
            imports: self.top_level_imports(root, source),
            status: parsed.status,
        })
    }
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "None",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a sequence",
        serde_json::Value::Object(_) => "a mapping",
    }
}

pub(crate) fn node_text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}
