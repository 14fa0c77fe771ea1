//! Declarative rewrite rules.
//!
//! A [`Rule`] is a pure function from text to text. Four kinds exist:
//!
//! | Kind | Effect |
//! |------|--------|
//! | `literal` | Replace every non-overlapping occurrence of a fixed string |
//! | `pattern` | Regex substitution with `$1`-style capture expansion |
//! | `replace_file` | Discard the content and substitute a known-good body |
//! | `balance` | Append missing closing braces (see [`crate::balance`]) |
//!
//! A rule whose anchor is absent is a no-op reported as
//! [`RuleStatus::NotFound`], never an error.

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::balance::{balance, BalanceSpec};

/// Why a rule definition was rejected.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("literal rule has an empty `find`")]
    EmptyFind,

    #[error("replacement contains its own anchor `{0}`; the rule would grow the file on every run")]
    SelfContaining(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("balance rule needs distinct open and close characters (got `{0}` twice)")]
    SameGroupChars(char),
}

#[derive(Debug, Clone)]
pub enum RuleKind {
    Literal { find: String, replace: String },
    Pattern { regex: Regex, replace: String },
    ReplaceFile { body: String },
    Balance(BalanceSpec),
}

/// One entry of the rule table.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Human-readable label used in logs and reports.
    pub label: String,
    pub kind: RuleKind,
}

/// What a single rule did to the text it was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleStatus {
    /// The anchor matched `count` times and the text changed.
    Applied { count: usize },
    /// The anchor was not present.
    NotFound,
    /// The rule ran but produced identical text.
    Unchanged,
    /// The rule's output was discarded.
    Skipped { reason: String },
}

impl RuleStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self, RuleStatus::Applied { .. })
    }
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleStatus::Applied { count } => write!(f, "applied ({})", count),
            RuleStatus::NotFound => write!(f, "pattern not found"),
            RuleStatus::Unchanged => write!(f, "unchanged"),
            RuleStatus::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

impl Rule {
    pub fn literal(find: &str, replace: &str) -> Result<Self, RuleError> {
        if find.is_empty() {
            return Err(RuleError::EmptyFind);
        }
        if replace.contains(find) {
            return Err(RuleError::SelfContaining(find.to_string()));
        }
        Ok(Self {
            label: format!("literal `{}`", find),
            kind: RuleKind::Literal {
                find: find.to_string(),
                replace: replace.to_string(),
            },
        })
    }

    pub fn pattern(pattern: &str, replace: &str) -> Result<Self, RuleError> {
        let regex = Regex::new(pattern)?;
        Ok(Self {
            label: format!("pattern `{}`", pattern),
            kind: RuleKind::Pattern {
                regex,
                replace: replace.to_string(),
            },
        })
    }

    pub fn replace_file(body: impl Into<String>) -> Self {
        Self {
            label: "replace_file".to_string(),
            kind: RuleKind::ReplaceFile { body: body.into() },
        }
    }

    pub fn balance(spec: BalanceSpec) -> Result<Self, RuleError> {
        if spec.open == spec.close {
            return Err(RuleError::SameGroupChars(spec.open));
        }
        Ok(Self {
            label: format!("balance `{}{}`", spec.open, spec.close),
            kind: RuleKind::Balance(spec),
        })
    }

    /// Override the generated label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            RuleKind::Literal { .. } => "literal",
            RuleKind::Pattern { .. } => "pattern",
            RuleKind::ReplaceFile { .. } => "replace_file",
            RuleKind::Balance(_) => "balance",
        }
    }

    /// Apply the rule once.
    pub fn apply(&self, input: &str) -> (String, RuleStatus) {
        match &self.kind {
            RuleKind::Literal { find, replace } => {
                let count = input.matches(find.as_str()).count();
                if count == 0 {
                    return (input.to_string(), RuleStatus::NotFound);
                }
                finish(input, input.replace(find.as_str(), replace), count)
            }
            RuleKind::Pattern { regex, replace } => {
                let count = regex.find_iter(input).count();
                if count == 0 {
                    return (input.to_string(), RuleStatus::NotFound);
                }
                let output = regex.replace_all(input, replace.as_str()).into_owned();
                finish(input, output, count)
            }
            RuleKind::ReplaceFile { body } => finish(input, body.clone(), 1),
            RuleKind::Balance(spec) => {
                let outcome = balance(input, spec);
                let appended = outcome.appended;
                finish(input, outcome.content, appended)
            }
        }
    }
}

fn finish(input: &str, output: String, count: usize) -> (String, RuleStatus) {
    if output == input {
        (output, RuleStatus::Unchanged)
    } else {
        (output, RuleStatus::Applied { count })
    }
}
