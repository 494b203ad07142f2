use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file looked up in a project and its ancestors.
pub const CONFIG_FILE: &str = ".addonscope.toml";

/// Top-level configuration from `.addonscope.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

/// How package directories are recognized and what gets extracted from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_manifest_files")]
    pub manifest_files: Vec<String>,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    #[serde(default = "default_addons_prefixes")]
    pub addons_prefixes: Vec<String>,
    #[serde(default = "default_framework_packages")]
    pub framework_packages: Vec<String>,
    #[serde(default = "default_folder_blacklist")]
    pub folder_blacklist: BTreeSet<String>,
    #[serde(default)]
    pub stopwords: BTreeSet<String>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub skip_python: bool,
    #[serde(default)]
    pub skip_readme: bool,
    #[serde(default)]
    pub skip_data: bool,
    #[serde(default)]
    pub skip_assets: bool,
    #[serde(default)]
    pub skip_language: bool,
}

fn default_manifest_files() -> Vec<String> {
    vec![
        "__manifest__.py".to_string(),
        "__odoo__.py".to_string(),
        "__openerp__.py".to_string(),
    ]
}

fn default_entry_point() -> String {
    "__init__.py".to_string()
}

fn default_addons_prefixes() -> Vec<String> {
    vec!["odoo.addons.".to_string(), "openerp.addons.".to_string()]
}

fn default_framework_packages() -> Vec<String> {
    vec!["odoo".to_string(), "openerp".to_string()]
}

fn default_folder_blacklist() -> BTreeSet<String> {
    [".git", "__pycache__", "node_modules", "setup"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            manifest_files: default_manifest_files(),
            entry_point: default_entry_point(),
            addons_prefixes: default_addons_prefixes(),
            framework_packages: default_framework_packages(),
            folder_blacklist: default_folder_blacklist(),
            stopwords: BTreeSet::new(),
            max_depth: None,
            skip_python: false,
            skip_readme: false,
            skip_data: false,
            skip_assets: false,
            skip_language: false,
        }
    }
}

/// Command lines of the external tools. The file or directory is appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_line_counter")]
    pub line_counter: Vec<String>,
    #[serde(default = "default_script_complexity")]
    pub script_complexity: Vec<String>,
    #[serde(default = "default_porter")]
    pub porter: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_line_counter() -> Vec<String> {
    vec!["cloc".to_string()]
}

fn default_script_complexity() -> Vec<String> {
    vec![
        "eslint".to_string(),
        "--no-eslintrc".to_string(),
        "--format".to_string(),
        "json".to_string(),
        "--rule".to_string(),
        "complexity: [1, 0]".to_string(),
    ]
}

fn default_porter() -> Vec<String> {
    vec!["2to3".to_string(), "-n".to_string(), "-w".to_string()]
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            line_counter: default_line_counter(),
            script_complexity: default_script_complexity(),
            porter: default_porter(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Presentation defaults for graph queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_true")]
    pub skip_lonely_nodes: bool,
    #[serde(default)]
    pub show_full_dependency: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            skip_lonely_nodes: true,
            show_full_dependency: false,
        }
    }
}

impl Config {
    /// Load configuration from a `.addonscope.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content).with_context(|| {
            format!(
                "failed to parse '{}'. Run `addonscope init` to create a valid config file",
                path.display()
            )
        })?;
        Ok(config)
    }

    /// Load from `.addonscope.toml` in the given directory or any ancestor, or return defaults.
    pub fn load_or_default(dir: &Path) -> Self {
        let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut current = start.as_path();
        loop {
            let config_path = current.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!(
                            "failed to load config from '{}': {e:#}. Using defaults.",
                            config_path.display()
                        );
                        Self::default()
                    }
                };
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Self::default()
    }

    /// Generate default TOML content for `addonscope init`.
    pub fn default_toml() -> String {
        r#"# addonscope - addon discovery and dependency analysis

[discovery]
manifest_files = ["__manifest__.py", "__odoo__.py", "__openerp__.py"]
entry_point = "__init__.py"
addons_prefixes = ["odoo.addons.", "openerp.addons."]
framework_packages = ["odoo", "openerp"]
folder_blacklist = [".git", "__pycache__", "node_modules", "setup"]
# Words ignored when collecting package keywords
stopwords = []
# max_depth = 3
skip_python = false
skip_readme = false
skip_data = false
skip_assets = false
skip_language = false

[tools]
# The analysed file or directory is appended to each command line.
line_counter = ["cloc"]
script_complexity = ["eslint", "--no-eslintrc", "--format", "json", "--rule", "complexity: [1, 0]"]
porter = ["2to3", "-n", "-w"]
timeout_secs = 30

[graph]
skip_lonely_nodes = true
show_full_dependency = false
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.discovery.manifest_files[0], "__manifest__.py");
        assert_eq!(config.discovery.entry_point, "__init__.py");
        assert!(config.discovery.stopwords.is_empty());
        assert!(config.discovery.max_depth.is_none());
        assert!(config.graph.skip_lonely_nodes);
        assert_eq!(config.tools.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_default_toml_is_valid() {
        let config: Config = toml::from_str(&Config::default_toml()).unwrap();
        assert_eq!(
            config.discovery.manifest_files,
            Config::default().discovery.manifest_files
        );
        assert!(config.discovery.folder_blacklist.contains(".git"));
        assert_eq!(config.tools.line_counter, vec!["cloc"]);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let toml_str = r#"
[discovery]
stopwords = ["odoo", "module"]
max_depth = 2

[graph]
skip_lonely_nodes = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.discovery.stopwords.len(), 2);
        assert_eq!(config.discovery.max_depth, Some(2));
        assert_eq!(config.discovery.entry_point, "__init__.py");
        assert!(!config.graph.skip_lonely_nodes);
        assert_eq!(config.tools.porter[0], "2to3");
    }

    #[test]
    fn test_load_or_default_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[discovery]\nmax_depth = 1\n",
        )
        .unwrap();
        let nested = dir.path().join("addons/sale");
        std::fs::create_dir_all(&nested).unwrap();
        let config = Config::load_or_default(&nested);
        assert_eq!(config.discovery.max_depth, Some(1));
    }

    #[test]
    fn test_load_reports_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[discovery\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
