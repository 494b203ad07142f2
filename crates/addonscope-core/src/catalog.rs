use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::graph::{self, Adjacency, GraphEdge, GraphNode, GraphView, MigrationState, NodeKind};
use crate::package::{Package, Relation};
use crate::types::{Model, Record};

/// Package that every other package implicitly depends on.
pub const BASE_PACKAGE: &str = "base";

/// Source of the working state of installed packages, e.g. a live database.
pub trait StateLookup {
    fn state(&self, name: &str) -> Option<String>;
}

/// `name -> state` mapping loaded from a JSON object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticStates {
    states: BTreeMap<String, String>,
}

impl StaticStates {
    pub fn new(states: BTreeMap<String, String>) -> Self {
        Self { states }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read states file '{}'", path.display()))?;
        let states = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse states file '{}'", path.display()))?;
        Ok(Self { states })
    }
}

impl StateLookup for StaticStates {
    fn state(&self, name: &str) -> Option<String> {
        self.states.get(name).cloned()
    }
}

/// Options shared by all graph queries.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Comma-separated globs selecting the visible nodes.
    pub pattern: String,
    pub skip_lonely_nodes: bool,
    /// Expand the visible set along edges to saturation.
    pub full_dependency: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            skip_lonely_nodes: true,
            full_dependency: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModuleGraphOptions {
    pub relations: Vec<Relation>,
    /// Version glob; enables migration coloring.
    pub migration: Option<String>,
    pub graph: GraphOptions,
}

impl Default for ModuleGraphOptions {
    fn default() -> Self {
        Self {
            relations: vec![Relation::Depends],
            migration: None,
            graph: GraphOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelGraphOptions {
    pub inherit: bool,
    pub inherits: bool,
    pub graph: GraphOptions,
}

impl Default for ModelGraphOptions {
    fn default() -> Self {
        Self {
            inherit: true,
            inherits: true,
            graph: GraphOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewGraphOptions {
    pub inherit: bool,
    pub calls: bool,
    pub graph: GraphOptions,
}

impl Default for ViewGraphOptions {
    fn default() -> Self {
        Self {
            inherit: true,
            calls: true,
            graph: GraphOptions::default(),
        }
    }
}

/// Containment graph of packages, their models, fields and views.
#[derive(Debug, Clone)]
pub struct StructureGraphOptions {
    pub packages: String,
    pub models: String,
    pub views: String,
    pub fields: bool,
}

impl Default for StructureGraphOptions {
    fn default() -> Self {
        Self {
            packages: "*".to_string(),
            models: "*".to_string(),
            views: "*".to_string(),
            fields: true,
        }
    }
}

/// Dependency usage of one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub data_count: u64,
    pub depends: Vec<String>,
    pub fields: usize,
    pub imports: Vec<String>,
    pub model_count: usize,
    /// Packages actually used: imports, references and owners of extended models.
    pub refers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_dependency: Vec<String>,
}

/// The analysed collection of packages with a filtered selection.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    full: BTreeMap<String, Package>,
    selected: BTreeSet<String>,
    shadowed: Vec<Package>,
}

/// Compile comma-separated glob patterns.
pub fn glob_set(patterns: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob '{pattern}'"))?);
    }
    builder.build().context("failed to build glob set")
}

impl Catalog {
    /// Collect packages in discovery order. The first package per name wins,
    /// later ones are kept as shadowed.
    pub fn from_packages(packages: impl IntoIterator<Item = Package>) -> Self {
        let mut catalog = Catalog::default();
        for package in packages {
            if catalog.full.contains_key(&package.name) {
                tracing::debug!(
                    "package {} at {} shadowed by an earlier discovery",
                    package.name,
                    package.path.display()
                );
                catalog.shadowed.push(package);
                continue;
            }
            catalog.selected.insert(package.name.clone());
            catalog.full.insert(package.name.clone(), package);
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    /// Direct lookup in the full set, ignoring filters.
    pub fn get(&self, name: &str) -> Option<&Package> {
        self.full.get(name)
    }

    /// Later discoveries of a package name.
    pub fn shadowed(&self, name: &str) -> Vec<&Package> {
        self.shadowed.iter().filter(|p| p.name == name).collect()
    }

    pub fn full(&self) -> &BTreeMap<String, Package> {
        &self.full
    }

    /// Selected packages, sorted by name.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.selected.iter().filter_map(|name| self.full.get(name))
    }

    fn retain(&mut self, keep: impl Fn(&Package) -> bool) {
        let full = &self.full;
        self.selected
            .retain(|name| full.get(name).is_some_and(|p| keep(p)));
    }

    /// Drop packages whose name starts with `test_`.
    pub fn test_filter(&mut self) {
        tracing::debug!("applying filter: test");
        self.retain(|p| !p.name.starts_with("test_"));
    }

    pub fn path_filter(&mut self, patterns: &str) -> Result<()> {
        tracing::debug!("applying filter: path [{patterns}]");
        let globs = glob_set(patterns)?;
        self.retain(|p| globs.is_match(&p.path));
        Ok(())
    }

    pub fn name_filter(&mut self, patterns: &str) -> Result<()> {
        tracing::debug!("applying filter: name [{patterns}]");
        let globs = glob_set(patterns)?;
        self.retain(|p| globs.is_match(&p.name));
        Ok(())
    }

    /// Keep packages whose looked-up state is one of the comma-separated states.
    pub fn state_filter(&mut self, lookup: &dyn StateLookup, states: &str) {
        tracing::debug!("applying filter: state [{states}]");
        let wanted: BTreeSet<&str> = states.split(',').map(str::trim).collect();
        self.retain(|p| {
            lookup
                .state(&p.name)
                .is_some_and(|s| wanted.contains(s.as_str()))
        });
    }

    /// Same-named models of the selected packages, merged.
    pub fn models(&self) -> BTreeMap<String, Model> {
        let mut out: BTreeMap<String, Model> = BTreeMap::new();
        for package in self.packages() {
            for (name, model) in &package.models {
                match out.get_mut(name) {
                    Some(existing) => existing.merge(model),
                    None => {
                        out.insert(name.clone(), model.clone());
                    }
                }
            }
        }
        out
    }

    /// Same-named views of the selected packages, merged.
    pub fn views(&self) -> BTreeMap<String, Record> {
        let mut out: BTreeMap<String, Record> = BTreeMap::new();
        for package in self.packages() {
            for (name, view) in &package.views {
                match out.get_mut(name) {
                    Some(existing) => existing.merge(view),
                    None => {
                        out.insert(name.clone(), view.clone());
                    }
                }
            }
        }
        out
    }

    fn full_depends_graph(&self) -> Adjacency {
        self.full
            .iter()
            .map(|(name, p)| (name.clone(), p.depends.clone()))
            .collect()
    }

    /// Transitive declared dependencies over the unfiltered set.
    pub fn full_dependency(&self, name: &str) -> BTreeSet<String> {
        graph::transitive_closure(&self.full_depends_graph(), name)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.full).context("failed to serialize packages")
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let full: BTreeMap<String, Package> =
            serde_json::from_str(content).context("failed to parse package data")?;
        let selected = full.keys().cloned().collect();
        Ok(Self {
            full,
            selected,
            shadowed: Vec::new(),
        })
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("failed to write '{}'", path.display()))
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        Self::from_json(&content).with_context(|| format!("invalid data in '{}'", path.display()))
    }

    /// Per selected package: what it uses versus what it declares.
    pub fn dependency_report(&self) -> BTreeMap<String, DependencyReport> {
        // Model name -> package defining it from scratch
        let owners: BTreeMap<&str, &str> = self
            .full
            .values()
            .flat_map(|p| {
                p.models
                    .iter()
                    .filter(|(_, m)| m.inherit.is_empty() && m.inherits.is_empty())
                    .map(move |(name, _)| (name.as_str(), p.name.as_str()))
            })
            .collect();

        let mut out = BTreeMap::new();
        for package in self.packages() {
            let mut used: BTreeSet<String> = package
                .imports
                .iter()
                .chain(&package.refers)
                .cloned()
                .collect();
            let mut fields = 0;
            for model in package.models.values() {
                fields += model.fields.len();
                used.extend(
                    model
                        .parents()
                        .filter_map(|parent| owners.get(parent.as_str()))
                        .map(|owner| owner.to_string()),
                );
            }

            let closure = self.full_dependency(&package.name);
            let missing: Vec<String> = used
                .iter()
                .filter(|u| !closure.contains(*u))
                .filter(|u| u.as_str() != BASE_PACKAGE && **u != package.name)
                .cloned()
                .collect();
            if !missing.is_empty() {
                tracing::error!("missing dependency: {} -> {missing:?}", package.name);
            }

            out.insert(
                package.name.clone(),
                DependencyReport {
                    data_count: package.data_count,
                    depends: package.depends.iter().cloned().collect(),
                    fields,
                    imports: package.imports.iter().cloned().collect(),
                    model_count: package.models.len(),
                    refers: used.into_iter().collect(),
                    missing_dependency: missing,
                },
            );
        }
        out
    }

    /// Package graph over the selected relation kinds.
    pub fn module_graph(&self, options: &ModuleGraphOptions) -> Result<GraphView> {
        let graph: Adjacency = self
            .packages()
            .map(|p| (p.name.clone(), p.related(&options.relations)))
            .collect();

        let cycles = graph::cycle_edges(&graph);
        let mut shown = if options.graph.skip_lonely_nodes {
            graph::elide_lonely(&graph)
        } else {
            graph
        };
        let mut visible = select(&shown, &options.graph.pattern)?;

        let mut auto_included = BTreeSet::new();
        if options.graph.full_dependency {
            visible = graph::reachable(&shown, &visible);
            for name in self.expand_auto_install(&mut visible) {
                if let Some(package) = self.full.get(&name) {
                    shown
                        .entry(name.clone())
                        .or_insert_with(|| package.related(&options.relations));
                }
                auto_included.insert(name);
            }
        }

        let mut view = GraphView::build(&shown, &visible, &cycles);
        for name in &auto_included {
            if let Some(node) = view.node_mut(name) {
                node.auto_included = true;
            }
        }

        if let Some(version) = &options.migration {
            let states = self.migration_states(version)?;
            for node in &mut view.nodes {
                node.migration = Some(
                    states
                        .get(&node.name)
                        .copied()
                        .unwrap_or(MigrationState::NotMigrated),
                );
            }
        }
        Ok(view)
    }

    /// Add auto-install packages of the full set whose declared dependencies
    /// are all visible, until nothing changes. Returns the added names.
    fn expand_auto_install(&self, visible: &mut BTreeSet<String>) -> BTreeSet<String> {
        let mut added = BTreeSet::new();
        loop {
            let ready: Vec<String> = self
                .full
                .values()
                .filter(|p| p.auto_install() && !visible.contains(&p.name))
                .filter(|p| p.depends.is_subset(visible))
                .map(|p| p.name.clone())
                .collect();
            if ready.is_empty() {
                break;
            }
            for name in ready {
                tracing::debug!("auto-including {name}");
                visible.insert(name.clone());
                added.insert(name);
            }
        }
        added
    }

    /// Migration coloring of every selected package for a version glob.
    pub fn migration_states(&self, version: &str) -> Result<BTreeMap<String, MigrationState>> {
        let globs = glob_set(version)?;
        let migrated: BTreeSet<&str> = self
            .packages()
            .filter(|p| globs.is_match(p.version()))
            .map(|p| p.name.as_str())
            .collect();

        Ok(self
            .packages()
            .map(|p| {
                let depends_migrated = p
                    .depends
                    .iter()
                    .filter(|d| self.contains(d))
                    .all(|d| migrated.contains(d.as_str()));
                let state = match (migrated.contains(p.name.as_str()), depends_migrated) {
                    (true, true) => MigrationState::Done,
                    (true, false) => MigrationState::Partial,
                    (false, true) => MigrationState::Todo,
                    (false, false) => MigrationState::NotMigrated,
                };
                (p.name.clone(), state)
            })
            .collect())
    }

    /// Structure graph with node ids `pkg`, `pkg/model`, `pkg/model/field`
    /// and `pkg/view`. Edges point from container to member.
    pub fn structure_graph(&self, options: &StructureGraphOptions) -> Result<GraphView> {
        let packages = glob_set(&options.packages)?;
        let models = glob_set(&options.models)?;
        let views = glob_set(&options.views)?;

        let mut view = GraphView::default();
        for package in self.packages().filter(|p| packages.is_match(&p.name)) {
            let package_id = package.name.clone();
            add_member(&mut view, None, package_id.clone(), NodeKind::Package);

            let matching = package.models.iter().filter(|(n, _)| models.is_match(n.as_str()));
            for (name, model) in matching {
                let model_id = format!("{package_id}/{name}");
                add_member(&mut view, Some(&package_id), model_id.clone(), NodeKind::Model);
                if options.fields {
                    for field in model.fields.keys() {
                        let field_id = format!("{model_id}/{field}");
                        add_member(&mut view, Some(&model_id), field_id, NodeKind::Field);
                    }
                }
            }

            for name in package.views.keys().filter(|n| views.is_match(n.as_str())) {
                let view_id = format!("{package_id}/{name}");
                add_member(&mut view, Some(&package_id), view_id, NodeKind::View);
            }
        }
        Ok(view)
    }

    /// Model graph over extension and/or delegation edges.
    pub fn model_graph(&self, options: &ModelGraphOptions) -> Result<GraphView> {
        let graph: Adjacency = self
            .models()
            .into_iter()
            .map(|(name, model)| {
                let mut edges = BTreeSet::new();
                if options.inherit {
                    edges.extend(model.inherit.iter().cloned());
                }
                if options.inherits {
                    edges.extend(model.inherits.values().cloned());
                }
                (name, edges)
            })
            .collect();
        generic_graph(graph, &options.graph)
    }

    /// View graph over extension and/or call edges.
    pub fn view_graph(&self, options: &ViewGraphOptions) -> Result<GraphView> {
        let graph: Adjacency = self
            .views()
            .into_iter()
            .map(|(name, view)| {
                let mut edges = BTreeSet::new();
                if options.inherit {
                    edges.extend(view.inherit.iter().cloned());
                }
                if options.calls {
                    edges.extend(view.calls.iter().cloned());
                }
                (name, edges)
            })
            .collect();
        generic_graph(graph, &options.graph)
    }
}

fn add_member(view: &mut GraphView, container: Option<&str>, id: String, kind: NodeKind) {
    if let Some(container) = container {
        view.edges.push(GraphEdge {
            from: container.to_string(),
            to: id.clone(),
            in_cycle: false,
        });
    }
    view.nodes.push(GraphNode {
        name: id,
        base: false,
        auto_included: false,
        migration: None,
        kind: Some(kind),
    });
}

fn select(graph: &Adjacency, pattern: &str) -> Result<BTreeSet<String>> {
    let globs = glob_set(pattern)?;
    Ok(graph
        .keys()
        .filter(|name| globs.is_match(name.as_str()))
        .cloned()
        .collect())
}

fn generic_graph(graph: Adjacency, options: &GraphOptions) -> Result<GraphView> {
    let cycles = graph::cycle_edges(&graph);
    let shown = if options.skip_lonely_nodes {
        graph::elide_lonely(&graph)
    } else {
        graph
    };
    let mut visible = select(&shown, &options.pattern)?;
    if options.full_dependency {
        visible = graph::reachable(&shown, &visible);
    }
    Ok(GraphView::build(&shown, &visible, &cycles))
}
