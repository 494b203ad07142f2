use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::ToolsConfig;
use crate::package::LanguageShare;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Reasons an external tool produced no usable output.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("no command configured")]
    Empty,
    #[error("'{0}' not found")]
    NotFound(String),
    #[error("'{tool}' timed out after {timeout:?}")]
    TimedOut { tool: String, timeout: Duration },
    #[error("'{tool}' exited with status {status}")]
    Failed { tool: String, status: i32 },
    #[error("failed to run '{tool}': {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured output of a finished tool run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs one configured command line with a timeout.
#[derive(Debug)]
pub struct ToolRunner {
    argv: Vec<String>,
    timeout: Duration,
    warned: AtomicBool,
}

impl ToolRunner {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            argv,
            timeout,
            warned: AtomicBool::new(false),
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    /// Run the command with `target` appended as the last argument.
    pub fn run(&self, target: &Path) -> Result<ToolOutput, ToolError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(ToolError::Empty);
        };

        let mut child = Command::new(program)
            .args(args)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ToolError::NotFound(program.clone()),
                _ => ToolError::Io {
                    tool: program.clone(),
                    source: e,
                },
            })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            let polled = child.try_wait().map_err(|e| ToolError::Io {
                tool: program.clone(),
                source: e,
            })?;
            if let Some(status) = polled {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolError::TimedOut {
                    tool: program.clone(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = ToolOutput {
            stdout: stdout.map(join_drain).unwrap_or_default(),
            stderr: stderr.map(join_drain).unwrap_or_default(),
        };

        if !status.success() {
            tracing::debug!("{program} stderr: {}", output.stderr.trim());
            return Err(ToolError::Failed {
                tool: program.clone(),
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(output)
    }

    /// Run the command; an unavailable tool is logged once and yields `None`.
    pub fn run_or_warn(&self, target: &Path) -> Option<ToolOutput> {
        match self.run(target) {
            Ok(output) => Some(output),
            Err(e) => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!("tool unavailable, skipping: {e}");
                } else {
                    tracing::debug!("tool unavailable for {}: {e}", target.display());
                }
                None
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_drain(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// `<language> <files> <blank> <comment> <code>` row of a cloc-style report.
const LINE_COUNT_ROW: &str = r"^([^:]*?)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)";
const COMPLEXITY_MESSAGE: &str = r"complexity of (\d+)";

/// Per-language line counts from a cloc-style tool.
#[derive(Debug)]
pub struct LineCounter {
    runner: ToolRunner,
    row: Regex,
}

impl LineCounter {
    pub fn new(config: &ToolsConfig) -> Result<Self> {
        Ok(Self {
            runner: ToolRunner::new(config.line_counter.clone(), config.timeout()),
            row: Regex::new(LINE_COUNT_ROW).context("failed to compile line count pattern")?,
        })
    }

    pub fn count(&self, dir: &Path) -> BTreeMap<String, LanguageShare> {
        match self.runner.run_or_warn(dir) {
            Some(output) => self.parse(&output.stdout),
            None => BTreeMap::new(),
        }
    }

    /// Parse the report rows; header and `SUM:` rows are skipped.
    pub fn parse(&self, output: &str) -> BTreeMap<String, LanguageShare> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for line in output.lines() {
            let Some(caps) = self.row.captures(line) else {
                continue;
            };
            let language = caps[1].trim();
            if language.is_empty() {
                continue;
            }
            if let Ok(code) = caps[5].parse::<u64>() {
                counts.insert(language.to_string(), code);
            }
        }

        let total: u64 = counts.values().sum();
        counts
            .into_iter()
            .map(|(language, lines)| {
                let fraction_from_total = if total == 0 {
                    0.0
                } else {
                    lines as f64 / total as f64
                };
                (
                    language,
                    LanguageShare {
                        lines,
                        fraction_from_total,
                    },
                )
            })
            .collect()
    }
}

/// Highest cyclomatic complexity a linter reports for a script file.
#[derive(Debug)]
pub struct ComplexityScorer {
    runner: ToolRunner,
    message: Regex,
}

impl ComplexityScorer {
    pub fn new(config: &ToolsConfig) -> Result<Self> {
        Ok(Self {
            runner: ToolRunner::new(config.script_complexity.clone(), config.timeout()),
            message: Regex::new(COMPLEXITY_MESSAGE)
                .context("failed to compile complexity pattern")?,
        })
    }

    pub fn score(&self, file: &Path) -> Option<f64> {
        let output = self.runner.run_or_warn(file)?;
        self.parse_report(&output.stdout)
    }

    /// Extract the maximum `complexity of N` from a JSON lint report.
    pub fn parse_report(&self, report: &str) -> Option<f64> {
        let value: serde_json::Value = serde_json::from_str(report).ok()?;

        value
            .as_array()?
            .iter()
            .filter_map(|file| file.get("messages")?.as_array())
            .flatten()
            .filter_map(|msg| msg.get("message")?.as_str())
            .filter_map(|text| self.message.captures(text)?[1].parse::<f64>().ok())
            .reduce(f64::max)
    }
}

/// Rewrites legacy source files in place.
#[derive(Debug)]
pub struct SyntaxPorter {
    runner: ToolRunner,
}

impl SyntaxPorter {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            runner: ToolRunner::new(config.porter.clone(), config.timeout()),
        }
    }

    /// Returns `true` if the porter ran on the file.
    pub fn port(&self, file: &Path) -> bool {
        self.runner.run_or_warn(file).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOC_OUTPUT: &str = "\
      12 text files.
github.com/AlDanial/cloc v 1.90  T=0.02 s (600.0 files/s, 30000.0 lines/s)
-------------------------------------------------------------------------------
Language                     files          blank        comment           code
-------------------------------------------------------------------------------
Python                           6             40             12            300
XML                              4             10              2            100
-------------------------------------------------------------------------------
SUM:                            10             50             14            400
-------------------------------------------------------------------------------
";

    fn offline() -> ToolsConfig {
        ToolsConfig {
            line_counter: vec!["addonscope-no-cloc".to_string()],
            script_complexity: vec!["addonscope-no-eslint".to_string()],
            porter: vec!["addonscope-no-porter".to_string()],
            timeout_secs: 1,
        }
    }

    #[test]
    fn test_parse_line_counts() {
        let counts = LineCounter::new(&offline()).unwrap().parse(CLOC_OUTPUT);
        assert_eq!(counts.len(), 2, "SUM and header rows must be ignored");
        assert_eq!(counts["Python"].lines, 300);
        assert!((counts["Python"].fraction_from_total - 0.75).abs() < 1e-9);
        assert!((counts["XML"].fraction_from_total - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_parse_line_counts_empty() {
        assert!(LineCounter::new(&offline()).unwrap().parse("").is_empty());
    }

    #[test]
    fn test_parse_complexity_report() {
        let report = r#"[{"filePath": "a.js", "messages": [
            {"ruleId": "complexity", "message": "Function 'a' has a complexity of 3. Maximum allowed is 0."},
            {"ruleId": "complexity", "message": "Arrow function has a complexity of 7. Maximum allowed is 0."},
            {"ruleId": "no-undef", "message": "'x' is not defined."}
        ]}]"#;
        let scorer = ComplexityScorer::new(&offline()).unwrap();
        assert_eq!(scorer.parse_report(report), Some(7.0));
        assert_eq!(scorer.parse_report(r#"[{"messages": []}]"#), None);
        assert_eq!(scorer.parse_report("not json"), None);
    }

    #[test]
    fn test_missing_tool_is_not_found() {
        let runner = ToolRunner::new(
            vec!["addonscope-no-such-tool-xyz".to_string()],
            Duration::from_secs(5),
        );
        let err = runner.run(Path::new(".")).unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)), "got {err:?}");
        assert!(runner.run_or_warn(Path::new(".")).is_none());
    }

    #[test]
    fn test_empty_command() {
        let runner = ToolRunner::new(Vec::new(), Duration::from_secs(1));
        assert!(matches!(runner.run(Path::new(".")), Err(ToolError::Empty)));
    }

    #[test]
    fn test_unavailable_tools_degrade() {
        let config = offline();
        assert!(LineCounter::new(&config)
            .unwrap()
            .count(Path::new("."))
            .is_empty());
        assert!(ComplexityScorer::new(&config)
            .unwrap()
            .score(Path::new("x.js"))
            .is_none());
        assert!(!SyntaxPorter::new(&config).port(Path::new("x.py")));
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_output_and_timeout() {
        let echo = ToolRunner::new(vec!["echo".to_string()], Duration::from_secs(5));
        let output = echo.run(Path::new("hello")).unwrap();
        assert_eq!(output.stdout.trim(), "hello");

        let sleep = ToolRunner::new(vec!["sleep".to_string()], Duration::from_millis(100));
        let err = sleep.run(Path::new("5")).unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }), "got {err:?}");
    }
}
