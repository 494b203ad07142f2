use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use roxmltree::{Document, Node};

use addonscope_core::analyzer::{MarkupAnalyzer, MarkupUnit};
use addonscope_core::types::Record;

/// Elements whose `id` declares (or overrides) a data identifier.
const DATA_TAGS: &[&str] = &[
    "act_window",
    "assert",
    "delete",
    "function",
    "menuitem",
    "record",
    "report",
    "template",
    "url",
];

const VIEW_MODEL: &str = "ir.ui.view";
const CALL_ATTR: &str = "t-call";

/// Markup analyzer for XML data files.
pub struct XmlAnalyzer {
    xml_id: Regex,
}

impl XmlAnalyzer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            xml_id: Regex::new(r"^\w+\.\w+").context("failed to compile xml id pattern")?,
        })
    }

    /// Packages referenced by qualified ids anywhere in the document.
    fn references(&self, doc: &Document, package: &str) -> BTreeSet<String> {
        let mut ids: Vec<&str> = Vec::new();
        for node in doc.descendants().filter(Node::is_element) {
            let tag = node.tag_name().name();
            match tag {
                "record" => {
                    for field in named_fields(node, "inherit_id") {
                        ids.extend(field.attribute("ref"));
                    }
                    if node.attribute("model") == Some(VIEW_MODEL) {
                        for arch in named_fields(node, "arch") {
                            ids.extend(calls_below(arch));
                        }
                    }
                }
                "template" => {
                    ids.extend(node.attribute("inherit_id"));
                    ids.extend(calls_below(node));
                }
                _ => {}
            }
            if DATA_TAGS.contains(&tag) {
                ids.extend(node.attribute("id"));
            }
        }

        ids.into_iter()
            .filter(|id| self.xml_id.is_match(id))
            .filter_map(|id| id.split('.').next())
            .filter(|owner| *owner != package)
            .map(str::to_string)
            .collect()
    }
}

impl MarkupAnalyzer for XmlAnalyzer {
    fn analyze(&self, path: &Path, package: &str) -> Result<MarkupUnit> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let doc = Document::parse(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        let records = doc
            .descendants()
            .filter(|n| n.is_element() && matches!(n.tag_name().name(), "record" | "template"))
            .filter_map(|n| record(&doc, n, package))
            .collect();

        let scripts = doc
            .descendants()
            .filter(|n| n.has_tag_name("script"))
            .filter_map(|n| n.attribute("src"))
            .map(str::to_string)
            .collect();

        let unit = MarkupUnit {
            refers: self.references(&doc, package),
            records,
            scripts,
        };
        tracing::debug!(
            "{}: {} records, {} references",
            path.display(),
            unit.records.len(),
            unit.refers.len()
        );
        Ok(unit)
    }
}

/// Direct `<field name="...">` children of an element.
fn named_fields<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.has_tag_name("field") && c.attribute("name") == Some(name))
}

/// `t-call` targets on the element and everything below it.
fn calls_below<'a>(node: Node<'a, '_>) -> Vec<&'a str> {
    node.descendants()
        .filter_map(|n| n.attribute(CALL_ATTR))
        .collect()
}

/// Build a record or view from a `record`/`template` element. Elements with
/// neither an id nor an inheritance target are dropped.
fn record(doc: &Document, node: Node, package: &str) -> Option<Record> {
    let (inherit, calls, model, view): (Option<&str>, Vec<&str>, Option<String>, bool) =
        match node.tag_name().name() {
            "template" => (
                node.attribute("inherit_id"),
                calls_below(node),
                None,
                true,
            ),
            "record" if node.attribute("model") == Some(VIEW_MODEL) => {
                let inherit = named_fields(node, "inherit_id")
                    .find_map(|f| f.attribute("ref"));
                let calls = named_fields(node, "arch").flat_map(calls_below).collect();
                let model = named_fields(node, "model")
                    .flat_map(|f| f.descendants())
                    .find_map(|n| n.text().filter(|_| n.is_text()))
                    .map(str::to_string);
                (inherit, calls, model, true)
            }
            "record" => (
                None,
                Vec::new(),
                node.attribute("model").map(str::to_string),
                false,
            ),
            _ => return None,
        };

    let name = match (node.attribute("id"), inherit) {
        (Some(id), _) => Record::qualify(id, package),
        (None, Some(parent)) => Record::synthetic_name(parent, package),
        (None, None) => return None,
    };

    Some(Record {
        name,
        inherit: inherit.map(|parent| Record::qualify(parent, package)),
        calls: calls
            .into_iter()
            .map(|call| Record::qualify(call, package))
            .collect(),
        model,
        complexity: complexity(node),
        lines: line_span(doc, node),
        view,
    })
}

/// Descendant elements plus every attribute on the element and below.
fn complexity(node: Node) -> u64 {
    let elements = node.descendants().filter(Node::is_element).count() - 1;
    let attributes: usize = node
        .descendants()
        .filter(Node::is_element)
        .map(|n| n.attributes().count())
        .sum();
    (elements + attributes) as u64
}

fn line_span(doc: &Document, node: Node) -> u64 {
    let range = node.range();
    let start = doc.text_pos_at(range.start).row;
    let end = doc.text_pos_at(range.end).row;
    u64::from(end.saturating_sub(start)) + 1
}
