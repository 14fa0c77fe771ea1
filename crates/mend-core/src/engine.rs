//! Ordered application of a rule table to file content.
//!
//! Rules run in table order; each sees the output of the previous one.
//! After a rule produces new text, the same rule is applied to that text
//! once more. If the second application would change it again the rule is
//! not idempotent on this input: its output is dropped and the rule is
//! logged as skipped, so a re-run of the engine can never drift.

use serde::Serialize;

use crate::rule::{Rule, RuleKind, RuleStatus};

/// Log entry for one rule of one rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleLog {
    pub rule: String,
    pub kind: &'static str,
    #[serde(flatten)]
    pub status: RuleStatus,
}

/// Final content plus what happened along the way.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub content: String,
    /// `true` iff `content` differs from the input.
    pub changed: bool,
    pub log: Vec<RuleLog>,
}

impl RewriteOutcome {
    /// Closing characters appended by balance rules in this rewrite.
    pub fn braces_appended(&self) -> usize {
        self.log
            .iter()
            .filter(|entry| entry.kind == "balance")
            .map(|entry| match entry.status {
                RuleStatus::Applied { count } => count,
                _ => 0,
            })
            .sum()
    }

    /// Rules whose anchor was absent.
    pub fn not_found(&self) -> impl Iterator<Item = &RuleLog> {
        self.log
            .iter()
            .filter(|entry| entry.status == RuleStatus::NotFound)
    }
}

/// Run `rules` over `input` in order.
pub fn rewrite(input: &str, rules: &[Rule]) -> RewriteOutcome {
    let mut current = input.to_string();
    let mut log = Vec::with_capacity(rules.len());

    for rule in rules {
        let (output, status) = rule.apply(&current);

        let status = if status.is_applied() && !settles(rule, &output) {
            RuleStatus::Skipped {
                reason: "not idempotent on this input".to_string(),
            }
        } else {
            if status.is_applied() {
                current = output;
            }
            status
        };

        log.push(RuleLog {
            rule: rule.label.clone(),
            kind: rule.kind_name(),
            status,
        });
    }

    RewriteOutcome {
        changed: current != input,
        content: current,
        log,
    }
}

/// Whether applying `rule` to its own output is a no-op.
fn settles(rule: &Rule, output: &str) -> bool {
    match rule.kind {
        // Fixed-point by construction.
        RuleKind::ReplaceFile { .. } => true,
        _ => rule.apply(output).0 == output,
    }
}
