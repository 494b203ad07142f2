use addonscope_core::graph::{GraphView, MigrationState, NodeKind};

/// Render a graph view as a GraphViz DOT digraph.
///
/// Nodes are colored by migration state when present, otherwise nodes
/// without outgoing edges are highlighted. Edges on a cycle are red.
/// Structure nodes get a shape per kind and are labeled by their last
/// path segment.
pub fn generate_graph(view: &GraphView, name: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("digraph {} {{\n", sanitize_dot_id(name)));
    out.push_str("  rankdir=LR;\n");
    out.push_str("  node [shape=box];\n\n");

    for node in &view.nodes {
        let mut attrs = Vec::new();
        let color = match node.migration {
            Some(MigrationState::Done) => Some("green"),
            Some(MigrationState::Partial) => Some("orange"),
            Some(MigrationState::Todo) => Some("blue"),
            Some(MigrationState::NotMigrated) => None,
            None if node.base => Some("blue"),
            None => None,
        };
        if let Some(color) = color {
            attrs.push(format!("color={color}"));
        }
        if let Some(kind) = node.kind {
            let label = node.name.rsplit('/').next().unwrap_or(&node.name);
            attrs.push(format!("shape={}", shape(kind)));
            attrs.push(format!("label={}", quote(label)));
        }
        if node.auto_included {
            attrs.push("style=dashed".to_string());
        }
        if attrs.is_empty() {
            out.push_str(&format!("  {};\n", quote(&node.name)));
        } else {
            out.push_str(&format!("  {} [{}];\n", quote(&node.name), attrs.join(", ")));
        }
    }

    if !view.edges.is_empty() {
        out.push('\n');
    }
    for edge in &view.edges {
        let from = quote(&edge.from);
        let to = quote(&edge.to);
        if edge.in_cycle {
            out.push_str(&format!("  {from} -> {to} [color=red];\n"));
        } else {
            out.push_str(&format!("  {from} -> {to};\n"));
        }
    }

    out.push_str("}\n");
    out
}

fn shape(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Package => "doubleoctagon",
        NodeKind::Model => "box",
        NodeKind::Field => "octagon",
        NodeKind::View => "oval",
    }
}

fn sanitize_dot_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Node names contain dots, so every id is a quoted DOT string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
