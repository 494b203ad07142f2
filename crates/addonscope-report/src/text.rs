use colored::Colorize;

use addonscope_core::catalog::Catalog;
use addonscope_core::package::Package;

/// Format a summary of the selected packages for terminal output.
pub fn format_summary(catalog: &Catalog) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", "Addonscope - Package Discovery".bold()));
    out.push_str(&format!("{}\n\n", "=".repeat(40)));

    let packages: Vec<&Package> = catalog.packages().collect();
    let models: usize = packages.iter().map(|p| p.models.len()).sum();
    let views: usize = packages.iter().map(|p| p.views.len()).sum();
    let records: usize = packages.iter().map(|p| p.records.len()).sum();
    out.push_str(&format!(
        "{}: {} packages, {} models, {} views, {} records\n",
        "Summary".bold(),
        packages.len(),
        models,
        views,
        records,
    ));

    if packages.is_empty() {
        out.push_str(&format!("\n{}\n", "No packages found.".yellow()));
        out.push('\n');
        return out;
    }

    out.push_str(&format!("\n{}\n{}\n", "Packages".bold(), "-".repeat(40)));
    for package in packages {
        out.push_str(&format_package(package));
    }

    let flagged = catalog
        .packages()
        .filter(|p| !p.status.is_empty())
        .count();
    if flagged == 0 {
        out.push_str(&format!("\n{}\n", "No diagnostics.".green().bold()));
    } else {
        out.push_str(&format!(
            "\n{} {} package(s) with diagnostics\n",
            "Warning:".yellow().bold(),
            flagged
        ));
    }

    out.push('\n');
    out
}

fn format_package(package: &Package) -> String {
    let mut out = String::new();
    let info = package.info();

    let version = package.version();
    if version.is_empty() {
        out.push_str(&format!("\n  {}\n", info.name.bold()));
    } else {
        out.push_str(&format!("\n  {} {}\n", info.name.bold(), version.dimmed()));
    }
    out.push_str(&format!(
        "    models: {}, classes: {}, views: {}, records: {}, scripts: {}\n",
        info.model_count,
        info.class_count,
        info.view_count,
        info.record_count,
        package.script_modules.len(),
    ));

    if !package.depends.is_empty() {
        out.push_str(&format!("    {}: {}\n", "depends".cyan(), join(&package.depends)));
    }
    if !package.imports.is_empty() {
        out.push_str(&format!("    {}: {}\n", "imports".cyan(), join(&package.imports)));
    }
    if !package.refers.is_empty() {
        out.push_str(&format!("    {}: {}\n", "refers".cyan(), join(&package.refers)));
    }
    if !package.status.is_empty() {
        out.push_str(&format!(
            "    {}: {}\n",
            "status".yellow().bold(),
            join(&package.status)
        ));
    }
    out
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    items
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
