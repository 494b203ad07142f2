pub mod analyzer;
pub mod catalog;
pub mod config;
pub mod graph;
pub mod hash;
pub mod imports;
pub mod metrics;
pub mod package;
pub mod pipeline;
pub mod tools;
pub mod types;

pub use analyzer::{MarkupAnalyzer, MarkupUnit, ScriptAnalyzer, SourceAnalyzer, SourceUnit};
pub use catalog::Catalog;
pub use config::Config;
pub use graph::GraphView;
pub use package::{Manifest, Package, Relation};
pub use pipeline::DiscoveryPipeline;
pub use types::*;
