//! TOML configuration.
//!
//! A config file declares the targets to patch, where to look for them,
//! what marks them as fixed, and a single rule table whose entries are
//! scoped to a target by name:
//!
//! ```toml
//! [[targets]]
//! name = "batch_spec_verify"
//! file = "mlc_llm/op/batch_spec_verify.py"
//! markers = ["done[0] == 0"]
//!
//! [[rules]]
//! scope = "batch_spec_verify"
//! kind = "literal"
//! find = "done[0] = False"
//! replace = "done[0] = 0"
//! ```
//!
//! All validation happens in [`load_config`]; the rest of the crate may
//! assume a loaded config is consistent.

use anyhow::{bail, Context, Result};
use mend_core::balance::BalanceSpec;
use mend_core::rule::Rule;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_diagnostics_dir")]
    pub dir: PathBuf,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            dir: default_diagnostics_dir(),
        }
    }
}

fn default_diagnostics_dir() -> PathBuf {
    PathBuf::from("tmp_patched")
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Where fetched payloads land. Defaults to `<diagnostics.dir>/fetched`.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            scratch_dir: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    15
}

/// Where installed packages live.
#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    /// Interpreter to ask for its site directories (e.g. `python3`).
    #[serde(default)]
    pub interpreter: Option<String>,
    /// Installation prefixes scanned for `lib/python3*/site-packages`.
    #[serde(default)]
    pub prefixes: Vec<PathBuf>,
    /// Site directories used verbatim.
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    /// Also consider `$VIRTUAL_ENV` and `$CONDA_PREFIX`.
    #[serde(default = "default_true")]
    pub use_env: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            interpreter: None,
            prefixes: Vec::new(),
            roots: Vec::new(),
            use_env: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    pub name: String,
    /// Relative path suffix, e.g. `mlc_llm/cpp/json_ffi/json_ffi_engine.cc`.
    pub file: String,
    /// Explicit override paths (files, or directories joined with `file`).
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    /// Repository-local source trees joined with `file`.
    #[serde(default)]
    pub repo_local: Vec<PathBuf>,
    /// Probe installed-package roots from `[site]`.
    #[serde(default = "default_true")]
    pub installed: bool,
    #[serde(default)]
    pub search: Option<SearchConfig>,
    pub markers: Vec<String>,
    #[serde(default)]
    pub residuals: Vec<String>,
    /// Create the file under installed roots when it is missing there.
    #[serde(default)]
    pub install: bool,
    #[serde(default)]
    pub first_hit_only: bool,
    #[serde(default)]
    pub source: Option<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_max_depth() -> usize {
    8
}
fn default_max_files() -> usize {
    50_000
}

/// Known-good replacement content for a target.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourceConfig {
    /// Local copies, in priority order.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    /// Remote fallbacks, tried in order when no local copy exists.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Missing content from every location is fatal.
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleKindConfig {
    Literal,
    Pattern,
    ReplaceFile,
    Balance,
}

/// One row of the rule table.
#[derive(Debug, Deserialize, Clone)]
pub struct RuleConfig {
    /// Name of the target this rule applies to.
    pub scope: String,
    pub kind: RuleKindConfig,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub find: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub replace: Option<String>,
    /// Inline body for `replace_file`; defaults to the target's source.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub open: Option<char>,
    #[serde(default)]
    pub close: Option<char>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl RuleConfig {
    /// The construct this rule rewrites, used to detect competing rules.
    fn anchor(&self) -> Option<&str> {
        match self.kind {
            RuleKindConfig::Literal => self.find.as_deref(),
            RuleKindConfig::Pattern => self.pattern.as_deref(),
            RuleKindConfig::ReplaceFile => Some("<replace_file>"),
            RuleKindConfig::Balance => Some("<balance>"),
        }
    }

    fn balance_spec(&self) -> BalanceSpec {
        let default = BalanceSpec::default();
        BalanceSpec {
            open: self.open.unwrap_or(default.open),
            close: self.close.unwrap_or(default.close),
            comment: self.comment.clone().unwrap_or(default.comment),
        }
    }

    /// Build the engine rule. `source_body` backs `replace_file` rules
    /// without an inline body; `Ok(None)` means no body is available.
    pub fn compile(&self, source_body: Option<&str>) -> Result<Option<Rule>> {
        let rule = match self.kind {
            RuleKindConfig::Literal => {
                let find = self.find.as_deref().unwrap_or_default();
                let replace = self.replace.as_deref().unwrap_or_default();
                Rule::literal(find, replace)?
            }
            RuleKindConfig::Pattern => {
                let pattern = self.pattern.as_deref().unwrap_or_default();
                let replace = self.replace.as_deref().unwrap_or_default();
                Rule::pattern(pattern, replace)?
            }
            RuleKindConfig::ReplaceFile => match self.body.as_deref().or(source_body) {
                Some(body) => Rule::replace_file(body),
                None => return Ok(None),
            },
            RuleKindConfig::Balance => Rule::balance(self.balance_spec())?,
        };
        Ok(Some(match &self.label {
            Some(label) => rule.with_label(label.clone()),
            None => rule,
        }))
    }
}

impl Config {
    /// A config with no targets, used by commands that work on a single
    /// file given on the command line.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn rules_for<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a RuleConfig> {
        self.rules.iter().filter(move |r| r.scope == target)
    }

    /// Whether any rule of `target` consumes the target's known-good source.
    pub fn needs_source(&self, target: &str) -> bool {
        self.rules_for(target)
            .any(|r| r.kind == RuleKindConfig::ReplaceFile && r.body.is_none())
    }

    /// Targets selected on the command line, or all of them.
    pub fn select(&self, names: &[String]) -> Result<Vec<&TargetConfig>> {
        if names.is_empty() {
            return Ok(self.targets.iter().collect());
        }
        names
            .iter()
            .map(|n| {
                self.target(n).ok_or_else(|| {
                    let known: Vec<&str> = self.targets.iter().map(|t| t.name.as_str()).collect();
                    anyhow::anyhow!("Unknown target: '{}'. Configured: {}", n, known.join(", "))
                })
            })
            .collect()
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.fetch
            .scratch_dir
            .clone()
            .unwrap_or_else(|| self.diagnostics.dir.join("fetched"))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.fetch.timeout_secs == 0 {
        bail!("fetch.timeout_secs must be > 0");
    }

    let mut names = HashSet::new();
    for target in &config.targets {
        if target.name.trim().is_empty() {
            bail!("targets[].name must not be empty");
        }
        if !names.insert(target.name.as_str()) {
            bail!("Duplicate target name: '{}'", target.name);
        }
        if target.file.trim().is_empty() {
            bail!("targets.{}.file must not be empty", target.name);
        }
        if target.markers.iter().all(|m| m.is_empty()) {
            bail!("targets.{} needs at least one non-empty marker", target.name);
        }
        if let Some(search) = &target.search {
            if search.max_depth == 0 {
                bail!("targets.{}.search.max_depth must be > 0", target.name);
            }
            if search.max_files == 0 {
                bail!("targets.{}.search.max_files must be > 0", target.name);
            }
        }
    }

    let mut anchors = HashSet::new();
    for (i, rule) in config.rules.iter().enumerate() {
        let Some(target) = config.target(&rule.scope) else {
            bail!("rules[{}]: scope '{}' is not a configured target", i, rule.scope);
        };

        let anchor = rule.anchor().unwrap_or_default();
        if !anchors.insert((rule.scope.as_str(), anchor)) {
            bail!(
                "rules[{}]: another rule in scope '{}' already rewrites `{}`",
                i,
                rule.scope,
                anchor
            );
        }

        if rule.kind == RuleKindConfig::ReplaceFile && rule.body.is_none() && target.source.is_none()
        {
            bail!(
                "rules[{}]: replace_file needs an inline `body` or a [targets.source] on '{}'",
                i,
                rule.scope
            );
        }

        // Compile once so bad patterns and self-growing literals fail at load.
        rule.compile(Some(""))
            .with_context(|| format!("rules[{}] (scope '{}')", i, rule.scope))?;
    }

    Ok(())
}
