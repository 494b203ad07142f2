use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;

use addonscope_core::catalog::{Catalog, DependencyReport};
use addonscope_core::graph::GraphView;
use addonscope_core::package::PackageInfo;

fn render<T: Serialize + ?Sized>(value: &T, compact: bool) -> Result<String> {
    let json = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    json.context("failed to serialize report")
}

/// Format a graph query result as JSON.
pub fn format_graph(view: &GraphView, compact: bool) -> Result<String> {
    render(view, compact)
}

/// Format the per-package dependency report as JSON.
pub fn format_dependency_report(
    report: &BTreeMap<String, DependencyReport>,
    compact: bool,
) -> Result<String> {
    render(report, compact)
}

/// Wrapper for scan output listing the selected packages.
#[derive(Debug, Serialize)]
pub struct ScanOutput {
    pub package_count: usize,
    pub packages: Vec<ScanEntry>,
}

#[derive(Debug, Serialize)]
pub struct ScanEntry {
    #[serde(flatten)]
    pub info: PackageInfo,
    pub version: String,
    pub status: Vec<String>,
    pub hashsum: String,
}

/// Format a summary of the selected packages as JSON.
pub fn format_summary(catalog: &Catalog, compact: bool) -> Result<String> {
    let packages: Vec<ScanEntry> = catalog
        .packages()
        .map(|p| ScanEntry {
            info: p.info(),
            version: p.version().to_string(),
            status: p.status.iter().cloned().collect(),
            hashsum: p.hashsum.clone(),
        })
        .collect();
    render(
        &ScanOutput {
            package_count: packages.len(),
            packages,
        },
        compact,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use addonscope_core::package::Package;
    use std::path::Path;

    fn catalog() -> Catalog {
        let mut sale = Package::new(Path::new("/addons/sale"));
        sale.depends.insert("base".to_string());
        sale.status.insert("missing-file".to_string());
        sale.hashsum = "abc".to_string();
        Catalog::from_packages([sale, Package::new(Path::new("/addons/base"))])
    }

    #[test]
    fn test_format_summary() {
        let json = format_summary(&catalog(), false).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["package_count"], 2);
        let sale = parsed["packages"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["name"] == "sale")
            .unwrap();
        assert_eq!(sale["depends"], 1);
        assert_eq!(sale["status"], serde_json::json!(["missing-file"]));
        assert_eq!(sale["hashsum"], "abc");
    }

    #[test]
    fn test_format_graph_compact() {
        let json = format_graph(&GraphView::default(), true).unwrap();
        assert_eq!(json, r#"{"nodes":[],"edges":[]}"#);
    }
}
