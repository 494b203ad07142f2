use std::collections::{BTreeMap, BTreeSet};

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};

/// Directed graph as `node -> set of targets`. Targets need not be nodes.
pub type Adjacency = BTreeMap<String, BTreeSet<String>>;

/// Migration coloring of a package node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationState {
    /// Migrated, and so is every visible dependency.
    Done,
    /// Migrated, but some visible dependency is not.
    Partial,
    /// Not migrated, but every visible dependency is.
    Todo,
    NotMigrated,
}

/// What a structure graph node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Package,
    Model,
    Field,
    View,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub name: String,
    /// No outgoing edges left after lonely-node elision.
    pub base: bool,
    #[serde(default)]
    pub auto_included: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration: Option<MigrationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub in_cycle: bool,
}

/// Node and edge sets of one graph query, ready for rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphView {
    /// Build the view of `visible` nodes. Edges are kept when both ends are visible.
    pub fn build(
        graph: &Adjacency,
        visible: &BTreeSet<String>,
        cycles: &BTreeSet<(String, String)>,
    ) -> Self {
        let mut view = GraphView::default();
        for name in visible {
            let targets = graph.get(name);
            view.nodes.push(GraphNode {
                name: name.clone(),
                base: targets.is_some_and(BTreeSet::is_empty),
                auto_included: false,
                migration: None,
                kind: None,
            });

            for target in targets.into_iter().flatten() {
                if !visible.contains(target) {
                    continue;
                }
                let edge = (name.clone(), target.clone());
                view.edges.push(GraphEdge {
                    in_cycle: cycles.contains(&edge),
                    from: edge.0,
                    to: edge.1,
                });
            }
        }
        view
    }

    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.name == name)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.iter().any(|e| e.from == from && e.to == to)
    }

    pub fn cycle_edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(|e| e.in_cycle)
    }
}

/// Edges surviving iterative peeling of the acyclic fringe.
///
/// Each round restricts every edge set to the remaining nodes and drops the
/// nodes that have no remaining edges or that nothing targets, until the node
/// count stops changing. Every edge on a cycle survives, but a surviving edge
/// is not guaranteed to lie on a simple cycle.
pub fn cycle_edges(graph: &Adjacency) -> BTreeSet<(String, String)> {
    let mut current = graph.clone();
    loop {
        let before = current.len();

        let restricted: Adjacency = current
            .iter()
            .map(|(node, targets)| {
                let kept = targets
                    .iter()
                    .filter(|t| current.contains_key(*t))
                    .cloned()
                    .collect();
                (node.clone(), kept)
            })
            .collect();
        let targeted: BTreeSet<&String> = restricted.values().flatten().collect();

        current = restricted
            .iter()
            .filter(|(node, targets)| !targets.is_empty() && targeted.contains(node))
            .map(|(node, targets)| (node.clone(), targets.clone()))
            .collect();

        if current.len() == before {
            break;
        }
    }

    current
        .into_iter()
        .flat_map(|(node, targets)| targets.into_iter().map(move |t| (node.clone(), t)))
        .collect()
}

/// Drop nodes without edges in either direction.
///
/// Edge sets are restricted to targets that are nodes of the graph.
pub fn elide_lonely(graph: &Adjacency) -> Adjacency {
    let targeted: BTreeSet<&String> = graph
        .values()
        .flatten()
        .filter(|t| graph.contains_key(*t))
        .collect();

    graph
        .iter()
        .filter_map(|(node, targets)| {
            let kept: BTreeSet<String> = targets
                .iter()
                .filter(|t| targeted.contains(t))
                .cloned()
                .collect();
            (!kept.is_empty() || targeted.contains(node)).then(|| (node.clone(), kept))
        })
        .collect()
}

fn to_graphmap(graph: &Adjacency) -> DiGraphMap<&str, ()> {
    let mut g = DiGraphMap::new();
    for node in graph.keys() {
        g.add_node(node.as_str());
    }
    for (node, targets) in graph {
        for target in targets {
            if graph.contains_key(target) {
                g.add_edge(node.as_str(), target.as_str(), ());
            }
        }
    }
    g
}

/// All nodes reachable from the given start nodes, the start nodes included.
/// Start nodes that are not in the graph are kept but not expanded.
pub fn reachable<'a>(
    graph: &Adjacency,
    start: impl IntoIterator<Item = &'a String>,
) -> BTreeSet<String> {
    let g = to_graphmap(graph);
    let mut out = BTreeSet::new();
    let mut dfs: Option<Dfs<&str, _>> = None;

    for node in start {
        out.insert(node.clone());
        if !g.contains_node(node.as_str()) {
            continue;
        }
        let dfs = dfs.get_or_insert_with(|| Dfs::new(&g, node.as_str()));
        dfs.move_to(node.as_str());
        while let Some(next) = dfs.next(&g) {
            out.insert(next.to_string());
        }
    }
    out
}

/// Every node reachable from `start`, excluding `start` itself.
/// An unknown start node yields an empty set.
pub fn transitive_closure(graph: &Adjacency, start: &str) -> BTreeSet<String> {
    let g = to_graphmap(graph);
    if !g.contains_node(start) {
        return BTreeSet::new();
    }

    let mut out = BTreeSet::new();
    let mut dfs = Dfs::new(&g, start);
    while let Some(next) = dfs.next(&g) {
        if next != start {
            out.insert(next.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> Adjacency {
        edges
            .iter()
            .map(|(n, ts)| (n.to_string(), ts.iter().map(|t| t.to_string()).collect()))
            .collect()
    }

    fn edge(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn test_cycle_edges_triangle_and_isolated_edge() {
        let g = graph(&[
            ("a", &["b"]),
            ("b", &["c"]),
            ("c", &["a"]),
            ("d", &["e"]),
            ("e", &[]),
        ]);
        let cycles = cycle_edges(&g);
        let expected: BTreeSet<_> = [edge("a", "b"), edge("b", "c"), edge("c", "a")]
            .into_iter()
            .collect();
        assert_eq!(cycles, expected);
    }

    #[test]
    fn test_cycle_edges_acyclic() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        assert!(cycle_edges(&g).is_empty());
    }

    #[test]
    fn test_cycle_edges_keeps_bridge_between_cycles() {
        // The bridge a->c survives peeling although it is on no cycle.
        let g = graph(&[
            ("a", &["b", "c"]),
            ("b", &["a"]),
            ("c", &["d"]),
            ("d", &["c"]),
        ]);
        let cycles = cycle_edges(&g);
        assert!(cycles.contains(&edge("a", "c")));
        assert_eq!(cycles.len(), 5);
    }

    #[test]
    fn test_cycle_edges_ignores_unknown_targets() {
        let g = graph(&[("a", &["a", "base"])]);
        let expected: BTreeSet<_> = [edge("a", "a")].into_iter().collect();
        assert_eq!(cycle_edges(&g), expected);
    }

    #[test]
    fn test_elide_lonely() {
        let g = graph(&[
            ("a", &["b", "external"]),
            ("b", &[]),
            ("lonely", &[]),
            ("only_external", &["external"]),
        ]);
        let elided = elide_lonely(&g);
        assert_eq!(elided.len(), 2);
        assert_eq!(elided["a"], ["b".to_string()].into_iter().collect());
        assert!(elided["b"].is_empty());
    }

    #[test]
    fn test_transitive_closure() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        let closure = transitive_closure(&g, "a");
        assert_eq!(closure, ["b", "c"].iter().map(|s| s.to_string()).collect());
        assert!(transitive_closure(&g, "c").is_empty());
        assert!(transitive_closure(&g, "unknown").is_empty());
    }

    #[test]
    fn test_transitive_closure_excludes_start_in_cycle() {
        let g = graph(&[("a", &["b"]), ("b", &["a", "missing"])]);
        let closure = transitive_closure(&g, "a");
        assert_eq!(closure, ["b".to_string()].into_iter().collect());
    }

    #[test]
    fn test_reachable_from_many() {
        let g = graph(&[
            ("a", &["b"]),
            ("b", &[]),
            ("c", &["d"]),
            ("d", &[]),
            ("e", &[]),
        ]);
        let start = vec!["a".to_string(), "c".to_string(), "zz".to_string()];
        let seen = reachable(&g, &start);
        assert_eq!(
            seen,
            ["a", "b", "c", "d", "zz"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn test_graph_view_build() {
        let g = graph(&[("a", &["b", "c"]), ("b", &["a"]), ("c", &[])]);
        let cycles = cycle_edges(&g);
        let visible: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let view = GraphView::build(&g, &visible, &cycles);

        assert_eq!(view.nodes.len(), 2);
        assert_eq!(view.edges.len(), 2, "edge to invisible c is dropped");
        assert!(view.edges.iter().all(|e| e.in_cycle));
        assert!(!view.node("a").unwrap().base);
    }
}
