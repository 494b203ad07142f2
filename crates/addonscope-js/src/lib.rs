use std::path::Path;

use anyhow::{Context, Result};
use regex::{Captures, Regex};

use addonscope_core::analyzer::ScriptAnalyzer;
use addonscope_core::types::ScriptModule;

/// A quoted string in any of the three JS quote styles, captured as
/// `dq`, `sq` or `bq`.
const QUOTED: &str = r#"(?:"(?P<dq>[^"'`]*?)"|'(?P<sq>[^"'`]*?)'|`(?P<bq>[^"'`]*?)`)"#;

/// Script analyzer recognizing legacy `odoo.define` modules and
/// `@odoo-module` annotated ES modules.
pub struct JsAnalyzer {
    define: Regex,
    require: Regex,
    module_marker: Regex,
    import: Regex,
    url: Regex,
}

impl JsAnalyzer {
    pub fn new() -> Result<Self> {
        let define = Regex::new(&format!(r"odoo\s*\.\s*define\s*\(\s*{QUOTED}"))
            .context("failed to compile define pattern")?;
        let require = Regex::new(&format!(r"require\s*\(\s*{QUOTED}\s*\)"))
            .context("failed to compile require pattern")?;
        let module_marker = Regex::new(
            r"\s*/(?:\*|/).*\s*@odoo-module(?:\s+alias=(?P<alias>[\w.]+))?(?:\s+default=(?P<default>False|false|0))?",
        )
        .context("failed to compile module marker pattern")?;
        let import = Regex::new(&format!(
            r"(?m)^\s*import\s+\{{(?:\s*\w+\s*,?\s*)+\}}\s*from\s*{}",
            QUOTED.replace("*?", "+?")
        ))
        .context("failed to compile import pattern")?;
        let url = Regex::new(
            r"^/?(?P<module>\S+)/(?:[\S/]*/)?static/(?P<kind>src|tests)(?P<url>/[\S/]*)",
        )
        .context("failed to compile asset url pattern")?;

        Ok(Self {
            define,
            require,
            module_marker,
            import,
            url,
        })
    }

    /// Canonical module name for an asset URL:
    /// `web/static/src/one/two.js` becomes `@web/one/two`, test files map to
    /// `@web/../tests/...`. URLs outside a static tree pass through.
    pub fn url_to_module_path(&self, url: &str) -> String {
        let Some(caps) = self.url.captures(url) else {
            return url.to_string();
        };
        let module = &caps["module"];
        let mut path = &caps["url"];
        if path.ends_with("/index.js") || path.ends_with("/index") {
            path = path.rsplit_once('/').map_or(path, |(head, _)| head);
        }
        let path = path.strip_suffix(".js").unwrap_or(path);

        if &caps["kind"] == "src" {
            format!("@{module}{path}")
        } else {
            format!("@{module}/../tests{path}")
        }
    }

    /// CommonJS-style `require("...")` targets.
    fn requires(&self, content: &str) -> Vec<String> {
        self.require
            .captures_iter(content)
            .filter_map(|caps| quoted(&caps))
            .collect()
    }
}

fn quoted(caps: &Captures) -> Option<String> {
    caps.name("dq")
        .or_else(|| caps.name("sq"))
        .or_else(|| caps.name("bq"))
        .map(|m| m.as_str().to_string())
}

impl ScriptAnalyzer for JsAnalyzer {
    fn analyze(&self, path: &Path, asset_path: &str) -> Result<ScriptModule> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut module = ScriptModule::new(self.url_to_module_path(asset_path));

        let defines: Vec<String> = self
            .define
            .captures_iter(&content)
            .filter_map(|caps| quoted(&caps))
            .collect();
        if let Some(first) = defines.first() {
            if defines.len() > 1 {
                tracing::warn!("multiple odoo.define in single script {}", module.name);
            }
            module.alias = Some(first.clone());
            module.requires.extend(self.requires(&content));
            return Ok(module);
        }

        if let Some(marker) = self.module_marker.captures(&content) {
            module.alias = marker.name("alias").map(|m| m.as_str().to_string());
            module.default = marker.name("default").is_none();
            module.requires.extend(
                self.import
                    .captures_iter(&content)
                    .filter_map(|caps| quoted(&caps)),
            );
            module.requires.extend(self.requires(&content));
        }

        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn analyze(content: &str, asset_path: &str) -> ScriptModule {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.js");
        std::fs::write(&path, content).unwrap();
        JsAnalyzer::new().unwrap().analyze(&path, asset_path).unwrap()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_url_to_module_path() {
        let js = JsAnalyzer::new().unwrap();
        assert_eq!(js.url_to_module_path("web/static/src/one/two/three.js"), "@web/one/two/three");
        assert_eq!(js.url_to_module_path("/web/static/src/core/index.js"), "@web/core");
        assert_eq!(js.url_to_module_path("web/static/src/core/index"), "@web/core");
        assert_eq!(js.url_to_module_path("web/static/tests/helpers.js"), "@web/../tests/helpers");
        assert_eq!(js.url_to_module_path("web/static/lib/jquery.js"), "web/static/lib/jquery.js");
    }

    #[test]
    fn test_legacy_define() {
        let module = analyze(
            r#"odoo.define('web.Widget', function (require) {
    "use strict";
    var core = require('web.core');
    var mixins = require("web.mixins");
});
odoo.define('web.Other', function () {});
"#,
            "web/static/src/legacy/widget.js",
        );
        assert_eq!(module.name, "@web/legacy/widget");
        assert_eq!(module.alias.as_deref(), Some("web.Widget"));
        assert!(module.default);
        assert_eq!(module.requires, set(&["web.core", "web.mixins"]));
    }

    #[test]
    fn test_odoo_module_marker() {
        let module = analyze(
            r#"/** @odoo-module alias=web.Dialog default=false */

import { Component, useState } from "@odoo/owl";
import {registry} from '@web/core/registry';
import Thing from "@web/thing";
const legacy = require("web.legacy");
"#,
            "web/static/src/core/dialog.js",
        );
        assert_eq!(module.name, "@web/core/dialog");
        assert_eq!(module.alias.as_deref(), Some("web.Dialog"));
        assert!(!module.default);
        assert_eq!(module.requires, set(&["@odoo/owl", "@web/core/registry", "web.legacy"]));
    }

    #[test]
    fn test_marker_without_options() {
        let module = analyze("// @odoo-module\nexport const x = 1;\n", "sale/static/src/x.js");
        assert!(module.alias.is_none());
        assert!(module.default);
        assert!(module.requires.is_empty());
    }

    #[test]
    fn test_plain_script_is_minimal_module() {
        let module = analyze("var x = require('not.a.module');\n", "sale/static/lib/x.js");
        assert_eq!(module.name, "sale/static/lib/x.js");
        assert!(module.alias.is_none());
        assert!(module.requires.is_empty());
        assert!(module.complexity.is_none());
    }
}
