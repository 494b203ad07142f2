use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde_json::Value;
use walkdir::WalkDir;

use crate::analyzer::{MarkupAnalyzer, ScriptAnalyzer, SourceAnalyzer};
use crate::config::Config;
use crate::hash;
use crate::imports::{self, ImportKind};
use crate::package::{Keywords, Package};
use crate::tools::{ComplexityScorer, LineCounter};
use crate::types::{STATUS_MISSING_FILE, STATUS_MULTIPLE_MANIFEST};

/// Outcome of looking at one directory.
pub enum Candidate {
    Package(Box<Package>),
    /// No manifest: a plain folder whose subdirectories are searched.
    Folder,
    /// A manifest without an entry point. Dropped without descending.
    Rejected,
}

/// Breadth-first package discovery driving the extractors.
pub struct DiscoveryPipeline {
    source: Box<dyn SourceAnalyzer>,
    markup: Box<dyn MarkupAnalyzer>,
    script: Box<dyn ScriptAnalyzer>,
    config: Config,
    line_counter: LineCounter,
    complexity: ComplexityScorer,
    keywords: Keywords,
}

impl DiscoveryPipeline {
    pub fn new(
        source: Box<dyn SourceAnalyzer>,
        markup: Box<dyn MarkupAnalyzer>,
        script: Box<dyn ScriptAnalyzer>,
        config: Config,
    ) -> Result<Self> {
        let line_counter = LineCounter::new(&config.tools)?;
        let complexity = ComplexityScorer::new(&config.tools)?;
        let keywords = Keywords::new(config.discovery.stopwords.clone())?;
        Ok(Self {
            source,
            markup,
            script,
            config,
            line_counter,
            complexity,
            keywords,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Discover all packages below the given roots, in discovery order.
    ///
    /// Directories of one depth level are assembled in parallel and merged back
    /// in queue order, so the result does not depend on scheduling. A failing
    /// directory is logged and skipped.
    pub fn discover(&self, roots: &[PathBuf]) -> Vec<Package> {
        let max_depth = self.config.discovery.max_depth;
        let mut packages = Vec::new();
        let mut level: Vec<PathBuf> = roots.to_vec();
        let mut depth = 0usize;

        while !level.is_empty() {
            if max_depth.is_some_and(|max| depth > max) {
                break;
            }

            let results: Vec<(PathBuf, Result<Candidate>)> = level
                .par_iter()
                .map(|dir| (dir.clone(), self.assemble(dir)))
                .collect();

            let mut next = Vec::new();
            for (dir, result) in results {
                match result {
                    Ok(Candidate::Package(package)) => packages.push(*package),
                    Ok(Candidate::Folder) => next.extend(self.subdirectories(&dir)),
                    Ok(Candidate::Rejected) => {}
                    Err(e) => tracing::error!("skipping {}: {e:#}", dir.display()),
                }
            }
            level = next;
            depth += 1;
        }
        packages
    }

    fn subdirectories(&self, dir: &Path) -> Vec<PathBuf> {
        let blacklist = &self.config.discovery.folder_blacklist;
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter(|e| !blacklist.contains(e.file_name().to_string_lossy().as_ref()))
            .map(|e| e.into_path())
            .collect()
    }

    /// Assemble one directory into a package if it is one.
    pub fn assemble(&self, dir: &Path) -> Result<Candidate> {
        let started = Instant::now();
        let discovery = &self.config.discovery;

        if !dir.is_dir() {
            anyhow::bail!("not a directory");
        }

        let manifests: Vec<PathBuf> = discovery
            .manifest_files
            .iter()
            .map(|name| dir.join(name))
            .filter(|path| path.is_file())
            .collect();
        if manifests.is_empty() {
            return Ok(Candidate::Folder);
        }

        let entry_point = dir.join(&discovery.entry_point);
        if !entry_point.is_file() {
            tracing::debug!(
                "{} has a manifest but no {}",
                dir.display(),
                discovery.entry_point
            );
            return Ok(Candidate::Rejected);
        }

        let mut package = Package::new(dir);
        for manifest in &manifests {
            let content = self
                .source
                .parse_manifest(manifest)
                .with_context(|| format!("invalid manifest '{}'", manifest.display()))?;
            if let Some(Value::Array(depends)) = content.get("depends") {
                package
                    .depends
                    .extend(depends.iter().filter_map(Value::as_str).map(str::to_string));
            }
            package.manifest.extend(content);
        }
        if manifests.len() > 1 {
            package.status.insert(STATUS_MULTIPLE_MANIFEST.to_string());
        }

        let texts = [
            package.name.clone(),
            package.summary().to_string(),
            package.description().to_string(),
        ];
        for text in &texts {
            package.add_keywords(text, &self.keywords);
        }

        if !discovery.skip_python {
            self.parse_sources(&mut package, &entry_point)?;
        }

        if !discovery.skip_readme {
            let readme = package.readme();
            package.add_keywords(&readme, &self.keywords);
        }

        if !discovery.skip_language {
            package.language = self.line_counter.count(dir);
        }

        let parent = dir.parent().unwrap_or(dir).to_path_buf();
        if !discovery.skip_assets {
            self.parse_assets(&mut package, &parent);
        }

        let mut touched: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        if !discovery.skip_data {
            for file in package.data_files() {
                let path = dir.join(&file);
                touched.push(path.clone());
                self.parse_data_file(&mut package, &path, &parent)?;
            }
        }

        touched.extend(manifests);
        touched.extend(package.files.iter().cloned());
        package.hashsum = hash::hash_file_set(&touched, dir);

        tracing::info!("found package {}", package.name);
        if !package.status.is_empty() {
            tracing::info!("status {}: {:?}", package.name, package.status);
        }

        package.duration_secs = started.elapsed().as_secs_f64();
        Ok(Candidate::Package(Box::new(package)))
    }

    /// Parse the entry point and every local file it transitively imports.
    fn parse_sources(&self, package: &mut Package, entry_point: &Path) -> Result<()> {
        let discovery = &self.config.discovery;
        let mut work = VecDeque::from([entry_point.to_path_buf()]);

        while let Some(file) = work.pop_front() {
            if !package.files.insert(file.clone()) {
                continue;
            }
            tracing::debug!("parsing {}", file.display());

            let unit = match self.source.analyze_file(&file) {
                Ok(unit) => unit,
                Err(e) if file == entry_point => {
                    return Err(e.context(format!("entry point '{}' not parsable", file.display())));
                }
                Err(e) => {
                    tracing::error!("not parsable {}: {e:#}", file.display());
                    continue;
                }
            };

            package.status.extend(unit.status);
            for (ident, mut model) in unit.classes {
                model.adopt_inherit_name();
                match model.name.clone() {
                    Some(name) => package.merge_model(model, &name),
                    None => {
                        package.classes.insert(ident, model);
                    }
                }
            }

            let dir = file.parent().unwrap_or(Path::new("."));
            for import in unit.imports {
                match imports::classify_import(&import, discovery) {
                    ImportKind::Package(name) => {
                        if name != package.name {
                            package.imports.insert(name);
                        }
                    }
                    ImportKind::Framework => {}
                    ImportKind::Local => {
                        let resolved =
                            imports::resolve_local(dir, &import, &discovery.entry_point);
                        work.extend(resolved.into_iter().filter(|f| !package.files.contains(f)));
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_assets(&self, package: &mut Package, parent: &Path) {
        for pattern in package.asset_patterns() {
            let full = parent.join(pattern.trim_matches('/'));
            let paths = match glob::glob(&full.to_string_lossy()) {
                Ok(paths) => paths,
                Err(e) => {
                    tracing::warn!("invalid asset pattern '{pattern}' in {}: {e}", package.name);
                    continue;
                }
            };

            for path in paths.filter_map(|p| p.ok()) {
                if !path.extension().is_some_and(|ext| ext == "js") {
                    continue;
                }
                let asset_path = path
                    .strip_prefix(parent)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                self.parse_script(package, &path, &asset_path);
            }
        }
    }

    fn parse_script(&self, package: &mut Package, path: &Path, asset_path: &str) {
        if !package.files.insert(path.to_path_buf()) {
            return;
        }
        match self.script.analyze(path, asset_path) {
            Ok(mut module) => {
                module.complexity = self.complexity.score(path);
                package.script_modules.insert(module.name.clone(), module);
            }
            Err(e) => tracing::warn!("failed to read script {}: {e:#}", path.display()),
        }
    }

    fn parse_data_file(&self, package: &mut Package, path: &Path, parent: &Path) -> Result<()> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !matches!(extension, "xml" | "csv") {
            return Ok(());
        }
        if !path.is_file() {
            tracing::warn!("{}: missing data file {}", package.name, path.display());
            package.status.insert(STATUS_MISSING_FILE.to_string());
            return Ok(());
        }
        package.files.insert(path.to_path_buf());

        if extension == "csv" {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            package.data_count += csv_rows(&content);
            return Ok(());
        }

        let unit = self
            .markup
            .analyze(path, &package.name)
            .with_context(|| format!("malformed markup '{}'", path.display()))?;
        package.refers.extend(unit.refers);
        for record in unit.records {
            package.merge_record(record);
        }
        for src in unit.scripts {
            let asset_path = src.trim_start_matches('/');
            let script = parent.join(asset_path);
            if script.is_file() && script.extension().is_some_and(|ext| ext == "js") {
                self.parse_script(package, &script, asset_path);
            }
        }
        Ok(())
    }
}

/// Data rows of a CSV file, header excluded.
fn csv_rows(content: &str) -> u64 {
    let rows = content.lines().filter(|l| !l.trim().is_empty()).count();
    rows.saturating_sub(1) as u64
}
