use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use addonscope_core::catalog::{
    Catalog, GraphOptions, ModelGraphOptions, ModuleGraphOptions, StaticStates,
    StructureGraphOptions, ViewGraphOptions,
};
use addonscope_core::config::{Config, CONFIG_FILE};
use addonscope_core::graph::GraphView;
use addonscope_core::package::Relation;
use addonscope_core::pipeline::DiscoveryPipeline;

use addonscope_js::JsAnalyzer;
use addonscope_python::PythonAnalyzer;
use addonscope_report::{dot, json, text};
use addonscope_xml::XmlAnalyzer;

const LOG_ENV: &str = "ADDONSCOPE_LOG";

#[derive(Parser)]
#[command(name = "addonscope")]
#[command(about = "Discover addon packages and analyse their dependency graphs")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover packages and print a summary
    Scan {
        #[command(flatten)]
        source: SourceArgs,
        /// Save the discovered packages as JSON to this file
        #[arg(long)]
        save: Option<PathBuf>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a dependency graph of modules, models or views
    Graph {
        #[command(subcommand)]
        kind: GraphKind,
    },
    /// Print the dependency usage report as JSON
    Report {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Create a default .addonscope.toml configuration file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum GraphKind {
    /// Package graph over manifest, import and reference relations
    Modules {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        graph: GraphArgs,
        /// Include manifest dependencies (default when no relation is given)
        #[arg(long)]
        depends: bool,
        /// Include source-level imports
        #[arg(long)]
        imports: bool,
        /// Include markup references
        #[arg(long)]
        refers: bool,
        /// Color nodes by migration state; glob matching migrated versions
        #[arg(long)]
        migration: Option<String>,
    },
    /// Model inheritance graph
    Models {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        graph: GraphArgs,
        /// Ignore `_inherit` edges
        #[arg(long)]
        no_inherit: bool,
        /// Ignore `_inherits` edges
        #[arg(long)]
        no_inherits: bool,
    },
    /// View inheritance and call graph
    Views {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        graph: GraphArgs,
        /// Ignore view inheritance edges
        #[arg(long)]
        no_inherit: bool,
        /// Ignore t-call edges
        #[arg(long)]
        no_calls: bool,
    },
    /// Packages with the models, fields and views they declare
    Structure {
        #[command(flatten)]
        source: SourceArgs,
        /// Comma-separated globs on package names
        #[arg(long, default_value = "*")]
        modules: String,
        /// Comma-separated globs on model names
        #[arg(long, default_value = "*")]
        models: String,
        /// Comma-separated globs on view names
        #[arg(long, default_value = "*")]
        views: String,
        /// Leave out model fields
        #[arg(long)]
        no_fields: bool,
        /// Output format
        #[arg(long, value_enum, default_value_t = GraphFormat::Json)]
        format: GraphFormat,
    },
}

/// Where packages come from and which of them are selected.
#[derive(Args)]
struct SourceArgs {
    /// Directories to discover packages in
    #[arg(short, long = "path")]
    paths: Vec<PathBuf>,
    /// Load previously saved packages instead of (or in addition to) discovery
    #[arg(short, long)]
    load: Option<PathBuf>,
    /// Config file path (defaults to .addonscope.toml in the first path or above)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Keep packages whose name starts with test_
    #[arg(long)]
    no_test_filter: bool,
    /// Comma-separated globs on package paths
    #[arg(long)]
    path_filter: Option<String>,
    /// Comma-separated globs on package names
    #[arg(long)]
    name_filter: Option<String>,
    /// JSON file mapping package names to their installation state
    #[arg(long)]
    states: Option<PathBuf>,
    /// Comma-separated states to keep, used with --states
    #[arg(long, requires = "states")]
    state_filter: Option<String>,
}

#[derive(Args)]
struct GraphArgs {
    /// Comma-separated globs selecting the visible nodes
    #[arg(long, default_value = "*")]
    pattern: String,
    /// Keep nodes without any edges
    #[arg(long)]
    show_lonely: bool,
    /// Show everything the visible nodes depend on
    #[arg(long)]
    full: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = GraphFormat::Json)]
    format: GraphFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphFormat {
    Json,
    Dot,
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let result = match cli.command {
        Commands::Scan { source, save, json } => cmd_scan(&source, save.as_deref(), json),
        Commands::Graph { kind } => cmd_graph(kind),
        Commands::Report { source } => cmd_report(&source),
        Commands::Init { force } => cmd_init(force),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(2);
    }
}

fn init_logger(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn cmd_scan(source: &SourceArgs, save: Option<&Path>, as_json: bool) -> Result<()> {
    let (catalog, _) = load_catalog(source)?;
    if let Some(path) = save {
        catalog.save_json(path)?;
        tracing::info!("saved {} packages to {}", catalog.full().len(), path.display());
    }
    if as_json {
        println!("{}", json::format_summary(&catalog, false)?);
    } else {
        print!("{}", text::format_summary(&catalog));
    }
    Ok(())
}

fn cmd_graph(kind: GraphKind) -> Result<()> {
    let (name, view, format) = match kind {
        GraphKind::Modules {
            source,
            graph,
            depends,
            imports,
            refers,
            migration,
        } => {
            let (catalog, config) = load_catalog(&source)?;
            let mut relations = Vec::new();
            if depends || !(imports || refers) {
                relations.push(Relation::Depends);
            }
            if imports {
                relations.push(Relation::Imports);
            }
            if refers {
                relations.push(Relation::Refers);
            }
            let options = ModuleGraphOptions {
                relations,
                migration,
                graph: graph_options(&graph, &config),
            };
            ("modules", catalog.module_graph(&options)?, graph.format)
        }
        GraphKind::Models {
            source,
            graph,
            no_inherit,
            no_inherits,
        } => {
            let (catalog, config) = load_catalog(&source)?;
            let options = ModelGraphOptions {
                inherit: !no_inherit,
                inherits: !no_inherits,
                graph: graph_options(&graph, &config),
            };
            ("models", catalog.model_graph(&options)?, graph.format)
        }
        GraphKind::Views {
            source,
            graph,
            no_inherit,
            no_calls,
        } => {
            let (catalog, config) = load_catalog(&source)?;
            let options = ViewGraphOptions {
                inherit: !no_inherit,
                calls: !no_calls,
                graph: graph_options(&graph, &config),
            };
            ("views", catalog.view_graph(&options)?, graph.format)
        }
        GraphKind::Structure {
            source,
            modules,
            models,
            views,
            no_fields,
            format,
        } => {
            let (catalog, _) = load_catalog(&source)?;
            let options = StructureGraphOptions {
                packages: modules,
                models,
                views,
                fields: !no_fields,
            };
            ("structure", catalog.structure_graph(&options)?, format)
        }
    };
    print_graph(name, &view, format)
}

fn print_graph(name: &str, view: &GraphView, format: GraphFormat) -> Result<()> {
    match format {
        GraphFormat::Json => println!("{}", json::format_graph(view, false)?),
        GraphFormat::Dot => print!("{}", dot::generate_graph(view, name)),
    }
    Ok(())
}

fn graph_options(args: &GraphArgs, config: &Config) -> GraphOptions {
    GraphOptions {
        pattern: args.pattern.clone(),
        skip_lonely_nodes: config.graph.skip_lonely_nodes && !args.show_lonely,
        full_dependency: config.graph.show_full_dependency || args.full,
    }
}

fn cmd_report(source: &SourceArgs) -> Result<()> {
    let (catalog, _) = load_catalog(source)?;
    let report = catalog.dependency_report();
    println!("{}", json::format_dependency_report(&report, false)?);
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let target = PathBuf::from(CONFIG_FILE);
    if target.exists() && !force {
        bail!("{CONFIG_FILE} already exists. Use --force to overwrite.");
    }
    std::fs::write(&target, Config::default_toml())
        .with_context(|| format!("failed to write {CONFIG_FILE}"))?;
    println!("Created {CONFIG_FILE} with default configuration.");
    Ok(())
}

fn load_config(source: &SourceArgs) -> Result<Config> {
    match &source.config {
        Some(path) => Config::load(path),
        None => {
            let base = match source.paths.first() {
                Some(path) => path.clone(),
                None => std::env::current_dir().context("failed to read working directory")?,
            };
            Ok(Config::load_or_default(&base))
        }
    }
}

/// Discover or load packages, then apply the selection filters.
fn load_catalog(source: &SourceArgs) -> Result<(Catalog, Config)> {
    if source.paths.is_empty() && source.load.is_none() {
        bail!("nothing to analyse: pass --path or --load");
    }
    let config = load_config(source)?;

    let mut packages = Vec::new();
    if let Some(path) = &source.load {
        let loaded = Catalog::load_json(path)?;
        packages.extend(loaded.full().values().cloned());
    }
    if !source.paths.is_empty() {
        let pipeline = build_pipeline(&config)?;
        for path in &source.paths {
            if !path.is_dir() {
                bail!("'{}' is not a directory", path.display());
            }
        }
        packages.extend(pipeline.discover(&source.paths));
    }

    let mut catalog = Catalog::from_packages(packages);
    tracing::info!("{} packages available", catalog.len());

    if !source.no_test_filter {
        catalog.test_filter();
    }
    if let Some(patterns) = &source.path_filter {
        catalog.path_filter(patterns)?;
    }
    if let Some(patterns) = &source.name_filter {
        catalog.name_filter(patterns)?;
    }
    if let Some(path) = &source.states {
        let lookup = StaticStates::load(path)?;
        let states = source.state_filter.as_deref().unwrap_or("installed");
        catalog.state_filter(&lookup, states);
    }

    Ok((catalog, config))
}

fn build_pipeline(config: &Config) -> Result<DiscoveryPipeline> {
    let python = PythonAnalyzer::new(&config.tools).context("failed to initialize Python analyzer")?;
    let xml = XmlAnalyzer::new().context("failed to initialize XML analyzer")?;
    let js = JsAnalyzer::new().context("failed to initialize JS analyzer")?;
    DiscoveryPipeline::new(
        Box::new(python),
        Box::new(xml),
        Box::new(js),
        config.clone(),
    )
    .context("failed to initialize discovery pipeline")
}
