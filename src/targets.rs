use anyhow::Result;
use mend_core::marker::find_marker;

use crate::config::Config;
use crate::narrate::Silent;
use crate::patch::run_locate;

/// One row of the `mend targets` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRow {
    pub name: String,
    pub candidates: usize,
    pub rules: usize,
    pub source: &'static str,
    pub status: &'static str,
}

pub fn target_rows(config: &Config) -> Result<Vec<TargetRow>> {
    let mut rows = Vec::new();

    for (target, outcome) in run_locate(config, &[], &Silent)? {
        let patched = outcome.candidates.iter().any(|c| {
            std::fs::read_to_string(&c.path)
                .map(|content| find_marker(&content, &target.markers).is_some())
                .unwrap_or(false)
        });
        let status = if outcome.is_empty() {
            "MISSING"
        } else if patched {
            "PATCHED"
        } else {
            "UNPATCHED"
        };
        let source = match &target.source {
            Some(s) if s.required => "required",
            Some(_) => "optional",
            None => "-",
        };
        rows.push(TargetRow {
            name: target.name.clone(),
            candidates: outcome.candidates.len(),
            rules: config.rules_for(&target.name).count(),
            source,
            status,
        });
    }

    Ok(rows)
}

pub fn list_targets(config: &Config) -> Result<()> {
    let rows = target_rows(config)?;
    if rows.is_empty() {
        println!("No targets configured.");
        return Ok(());
    }

    println!(
        "{:<24} {:<11} {:<6} {:<9} STATUS",
        "TARGET", "CANDIDATES", "RULES", "SOURCE"
    );
    for row in rows {
        println!(
            "{:<24} {:<11} {:<6} {:<9} {}",
            row.name, row.candidates, row.rules, row.source, row.status
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use std::fs;
    use tempfile::TempDir;

    fn target(name: &str, repo: &std::path::Path) -> TargetConfig {
        TargetConfig {
            name: name.into(),
            file: format!("{}.py", name),
            paths: Vec::new(),
            repo_local: vec![repo.to_path_buf()],
            installed: false,
            search: None,
            markers: vec!["FIXED".into()],
            residuals: Vec::new(),
            install: false,
            first_hit_only: false,
            source: None,
        }
    }

    #[test]
    fn rows_reflect_marker_state() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("done.py"), "# FIXED\n").unwrap();
        fs::write(tmp.path().join("todo.py"), "broken\n").unwrap();

        let mut config = Config::minimal();
        config.site.use_env = false;
        config.targets = vec![
            target("done", tmp.path()),
            target("todo", tmp.path()),
            target("gone", tmp.path()),
        ];

        let statuses: Vec<&str> = target_rows(&config)
            .unwrap()
            .iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(statuses, vec!["PATCHED", "UNPATCHED", "MISSING"]);
    }
}
