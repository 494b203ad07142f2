use std::path::{Path, PathBuf};

use crate::config::DiscoveryConfig;

/// What a top-level import statement refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// Another addon package, reached through an addons namespace prefix.
    Package(String),
    /// The framework runtime itself.
    Framework,
    /// Anything else is resolved against the importing file's directory.
    Local,
}

/// Classify a dotted import path.
pub fn classify_import(import: &str, config: &DiscoveryConfig) -> ImportKind {
    for prefix in &config.addons_prefixes {
        if let Some(rest) = import.strip_prefix(prefix.as_str()) {
            return match rest.split('.').next() {
                Some(name) if !name.is_empty() => ImportKind::Package(name.to_string()),
                _ => ImportKind::Framework,
            };
        }
    }

    let head = import.split('.').next().unwrap_or("");
    if config.framework_packages.iter().any(|p| p == head) {
        return ImportKind::Framework;
    }
    ImportKind::Local
}

/// Source files a local import pulls in, resolved from `dir`.
///
/// Segments are walked in order: `<seg>.py` is taken and ends the walk,
/// `<seg>/__init__.py` is taken and the walk descends into `<seg>`, a plain
/// directory is descended into, anything else ends the walk.
pub fn resolve_local(dir: &Path, import: &str, entry_point: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut current = dir.to_path_buf();

    for segment in import.trim_start_matches('.').split('.') {
        if segment.is_empty() {
            break;
        }

        let module_file = current.join(format!("{segment}.py"));
        if module_file.is_file() {
            found.push(module_file);
            break;
        }

        let subdir = current.join(segment);
        let init = subdir.join(entry_point);
        if init.is_file() {
            found.push(init);
            current = subdir;
        } else if subdir.is_dir() {
            current = subdir;
        } else {
            break;
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_other_package() {
        let config = DiscoveryConfig::default();
        assert_eq!(
            classify_import("odoo.addons.sale.models.sale_order", &config),
            ImportKind::Package("sale".to_string())
        );
        assert_eq!(
            classify_import("openerp.addons.stock", &config),
            ImportKind::Package("stock".to_string())
        );
    }

    #[test]
    fn test_classify_framework_and_local() {
        let config = DiscoveryConfig::default();
        assert_eq!(classify_import("odoo.models", &config), ImportKind::Framework);
        assert_eq!(classify_import("openerp.fields", &config), ImportKind::Framework);
        assert_eq!(classify_import("..models", &config), ImportKind::Local);
        assert_eq!(classify_import("wizard.helper", &config), ImportKind::Local);
    }

    #[test]
    fn test_resolve_module_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("helpers.py"), "").unwrap();
        let found = resolve_local(dir.path(), "..helpers", "__init__.py");
        assert_eq!(found, vec![dir.path().join("helpers.py")]);
    }

    #[test]
    fn test_resolve_package_then_module() {
        let dir = tempfile::tempdir().unwrap();
        let models = dir.path().join("models");
        std::fs::create_dir(&models).unwrap();
        std::fs::write(models.join("__init__.py"), "").unwrap();
        std::fs::write(models.join("sale.py"), "").unwrap();

        let found = resolve_local(dir.path(), "models.sale", "__init__.py");
        assert_eq!(found, vec![models.join("__init__.py"), models.join("sale.py")]);
    }

    #[test]
    fn test_resolve_descends_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("lib/tools");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("misc.py"), "").unwrap();

        let found = resolve_local(dir.path(), "lib.tools.misc", "__init__.py");
        assert_eq!(found, vec![nested.join("misc.py")]);
        assert!(resolve_local(dir.path(), "missing.thing", "__init__.py").is_empty());
    }
}
