use std::collections::BTreeSet;
use std::path::Path;

use tree_sitter::{Language, Node, Parser, Tree};

use addonscope_core::tools::SyntaxPorter;
use addonscope_core::types::{feature_status, STATUS_INDENT_FIX, STATUS_PORTED};

/// Statement kinds only valid in the legacy language revision.
const LEGACY_STATEMENTS: &[&str] = &["print_statement", "exec_statement"];

/// Why a source file could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ParseFailure {
    #[error("syntax error at line {line}, column {column} (`{kind}`)")]
    Syntax {
        line: usize,
        column: usize,
        kind: String,
    },
    #[error("legacy statement at line {line}")]
    LegacySyntax { line: usize },
    #[error("failed to load the Python grammar: {0}")]
    Grammar(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Recovery strategies, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The file as-is under the current grammar.
    Current,
    /// The file as-is, accepting legacy statements.
    Legacy,
    /// A scratch copy rewritten by the syntax porter.
    Ported,
    /// The scratch copy with normalized indentation.
    IndentFixed,
}

/// A successfully parsed file. `source` is the text the tree was built from,
/// which differs from the file content after porting or indentation fixes.
pub struct ParsedSource {
    pub tree: Tree,
    pub source: String,
    pub strategy: Strategy,
    pub status: BTreeSet<String>,
}

pub struct RecoveringParser<'a> {
    language: &'a Language,
    porter: &'a SyntaxPorter,
}

impl<'a> RecoveringParser<'a> {
    pub fn new(language: &'a Language, porter: &'a SyntaxPorter) -> Self {
        Self { language, porter }
    }

    /// Parse one file, walking the recovery strategies until one succeeds.
    /// When all fail, the last failure is returned.
    pub fn parse(&self, path: &Path) -> Result<ParsedSource, ParseFailure> {
        let original = std::fs::read_to_string(path)?;

        let first = match self.attempt(&original, false) {
            Ok(tree) => return Ok(self.done(tree, original, Strategy::Current, BTreeSet::new())),
            Err(e) => e,
        };
        tracing::debug!("{}: {first}", path.display());

        match self.attempt(&original, true) {
            Ok(tree) => {
                tracing::warn!("legacy syntax in {}", path.display());
                let status = BTreeSet::from([feature_status(2, 7)]);
                return Ok(self.done(tree, original, Strategy::Legacy, status));
            }
            Err(ParseFailure::Syntax { .. }) => {}
            Err(e) => return Err(e),
        }

        let scratch = tempfile::Builder::new()
            .prefix("addonscope-")
            .suffix(".py")
            .tempfile()?;
        std::fs::write(scratch.path(), &original)?;

        let mut status = BTreeSet::new();
        let mut last = first;
        if self.porter.port(scratch.path()) {
            tracing::warn!("ported {}", path.display());
            status.insert(STATUS_PORTED.to_string());
            let ported = std::fs::read_to_string(scratch.path())?;
            match self.attempt(&ported, false) {
                Ok(tree) => return Ok(self.done(tree, ported, Strategy::Ported, status)),
                Err(e) => last = e,
            }
        }

        let current = std::fs::read_to_string(scratch.path())?;
        let fixed = fix_indentation(&current);
        if fixed != current {
            tracing::warn!("fixed indentation of {}", path.display());
            status.insert(STATUS_INDENT_FIX.to_string());
            std::fs::write(scratch.path(), &fixed)?;
        }
        match self.attempt(&fixed, false) {
            Ok(tree) => Ok(self.done(tree, fixed, Strategy::IndentFixed, status)),
            Err(e) => {
                tracing::debug!("{}: {last}", path.display());
                Err(e)
            }
        }
    }

    fn done(
        &self,
        tree: Tree,
        source: String,
        strategy: Strategy,
        status: BTreeSet<String>,
    ) -> ParsedSource {
        ParsedSource {
            tree,
            source,
            strategy,
            status,
        }
    }

    /// Parse text and reject trees with errors, and legacy statements unless allowed.
    fn attempt(&self, source: &str, allow_legacy: bool) -> Result<Tree, ParseFailure> {
        let tree = parse_tree(self.language, source)?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(first_error(root).unwrap_or(ParseFailure::Syntax {
                line: 1,
                column: 1,
                kind: "ERROR".to_string(),
            }));
        }
        if !allow_legacy {
            if let Some(node) = find_kind(root, LEGACY_STATEMENTS) {
                return Err(ParseFailure::LegacySyntax {
                    line: node.start_position().row + 1,
                });
            }
        }
        Ok(tree)
    }
}

pub(crate) fn parse_tree(language: &Language, source: &str) -> Result<Tree, ParseFailure> {
    let mut parser = Parser::new();
    parser
        .set_language(language)
        .map_err(|e| ParseFailure::Grammar(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| ParseFailure::Grammar("parser returned no tree".to_string()))
}

fn first_error(node: Node) -> Option<ParseFailure> {
    if node.is_error() || node.is_missing() {
        let kind = if node.is_missing() {
            format!("missing {}", node.kind())
        } else {
            node.kind().to_string()
        };
        return Some(ParseFailure::Syntax {
            line: node.start_position().row + 1,
            column: node.start_position().column + 1,
            kind,
        });
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

fn find_kind<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    if kinds.contains(&node.kind()) {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
    children.into_iter().find_map(|child| find_kind(child, kinds))
}

/// Expand leading tabs to the next multiple of four and strip trailing whitespace.
pub fn fix_indentation(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        let mut width = 0usize;
        for c in line.chars() {
            match c {
                ' ' => width += 1,
                '\t' => width += 4 - width % 4,
                _ => break,
            }
        }
        out.push_str(&" ".repeat(width));
        out.push_str(line.trim());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use addonscope_core::config::ToolsConfig;

    fn no_porter() -> SyntaxPorter {
        SyntaxPorter::new(&ToolsConfig {
            porter: vec!["addonscope-test-no-porter".to_string()],
            ..ToolsConfig::default()
        })
    }

    fn parse(content: &str) -> Result<ParsedSource, ParseFailure> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.py");
        std::fs::write(&path, content).unwrap();
        let language: Language = tree_sitter_python::LANGUAGE.into();
        let porter = no_porter();
        RecoveringParser::new(&language, &porter).parse(&path)
    }

    #[test]
    fn test_current_syntax() {
        let parsed = parse("import os\nprint('hi')\n").unwrap();
        assert_eq!(parsed.strategy, Strategy::Current);
        assert!(parsed.status.is_empty());
    }

    #[test]
    fn test_legacy_print_statement() {
        let parsed = parse("print 'hello'\n").unwrap();
        assert_eq!(parsed.strategy, Strategy::Legacy);
        assert!(parsed.status.contains("feature-2-7"));
    }

    #[test]
    fn test_unparseable_returns_last_error() {
        let err = parse("def broken(:\n    pass\n").err().unwrap();
        assert!(matches!(err, ParseFailure::Syntax { .. }), "got {err}");
    }

    #[test]
    fn test_fix_indentation() {
        assert_eq!(fix_indentation("\tx = 1  \n  \ty\n"), "    x = 1\n    y\n");
        assert_eq!(fix_indentation("a\n"), "a\n");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let language: Language = tree_sitter_python::LANGUAGE.into();
        let porter = no_porter();
        let err = RecoveringParser::new(&language, &porter)
            .parse(Path::new("/nonexistent/addonscope/x.py"))
            .err()
            .unwrap();
        assert!(matches!(err, ParseFailure::Io(_)));
    }
}
