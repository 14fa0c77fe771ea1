//! Candidate inspection.
//!
//! Prints the head of every candidate with its checksum, backup and marker
//! status. Used by `mend inspect` to debug which copy of a file a build
//! will actually pick up.

use anyhow::Result;
use mend_core::marker::find_marker;
use std::path::PathBuf;

use crate::commit::{backup_path, sha256_hex};
use crate::config::Config;
use crate::narrate::Silent;
use crate::patch::run_locate;

#[derive(Debug, Clone)]
pub struct CandidateView {
    pub target: String,
    pub path: PathBuf,
    pub strategy: String,
    pub bytes: usize,
    pub lines: usize,
    pub sha256: Option<String>,
    /// Last modification time, UTC.
    pub modified: Option<String>,
    pub has_backup: bool,
    pub marker: Option<String>,
    pub head: Vec<String>,
    pub error: Option<String>,
}

/// Structured view of every candidate of the selected targets.
pub fn inspect_candidates(
    config: &Config,
    targets: &[String],
    head_lines: usize,
) -> Result<Vec<CandidateView>> {
    let mut views = Vec::new();

    for (target, outcome) in run_locate(config, targets, &Silent)? {
        for candidate in outcome.candidates {
            let mut view = CandidateView {
                target: target.name.clone(),
                has_backup: backup_path(&candidate.path).exists(),
                path: candidate.path,
                strategy: candidate.strategy.to_string(),
                bytes: 0,
                lines: 0,
                sha256: None,
                modified: None,
                marker: None,
                head: Vec::new(),
                error: None,
            };
            match std::fs::read(&view.path) {
                Ok(bytes) => {
                    let content = String::from_utf8_lossy(&bytes);
                    view.bytes = bytes.len();
                    view.lines = content.lines().count();
                    view.sha256 = Some(sha256_hex(&bytes));
                    view.marker = find_marker(&content, &target.markers).map(str::to_string);
                    view.head = content.lines().take(head_lines).map(str::to_string).collect();
                }
                Err(e) => view.error = Some(e.to_string()),
            }
            view.modified = std::fs::metadata(&view.path)
                .and_then(|m| m.modified())
                .ok()
                .map(format_modified);
            views.push(view);
        }
    }

    Ok(views)
}

/// CLI entry point: print each candidate to stdout.
pub fn run_inspect(config: &Config, targets: &[String], head_lines: usize) -> Result<()> {
    let views = inspect_candidates(config, targets, head_lines)?;
    if views.is_empty() {
        println!("No candidates found.");
        return Ok(());
    }

    for view in &views {
        println!("--- {} ---", view.path.display());
        println!("target:   {}", view.target);
        println!("strategy: {}", view.strategy);
        if let Some(err) = &view.error {
            println!("error:    {}", err);
            println!();
            continue;
        }
        println!("size:     {} bytes, {} lines", view.bytes, view.lines);
        println!("sha256:   {}", view.sha256.as_deref().unwrap_or("-"));
        println!("modified: {}", view.modified.as_deref().unwrap_or("-"));
        println!("backup:   {}", if view.has_backup { "yes" } else { "no" });
        println!("marker:   {}", view.marker.as_deref().unwrap_or("(missing)"));
        println!();
        for line in &view.head {
            println!("{}", line);
        }
        if view.lines > view.head.len() {
            println!("... ({} more lines)", view.lines - view.head.len());
        }
        println!();
    }

    Ok(())
}

fn format_modified(time: std::time::SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(time)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn views_carry_head_and_marker() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("repo/pkg/engine.cc");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        let body: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        fs::write(&file, format!("// MLCJSONFFIEngineForceLink_v1\n{}", body)).unwrap();
        fs::write(backup_path(&file), "old").unwrap();

        let mut config = Config::minimal();
        config.site.use_env = false;
        config.targets.push(TargetConfig {
            name: "engine".into(),
            file: "pkg/engine.cc".into(),
            paths: Vec::new(),
            repo_local: vec![tmp.path().join("repo")],
            installed: false,
            search: None,
            markers: vec!["MLCJSONFFIEngineForceLink_v1".into()],
            residuals: Vec::new(),
            install: false,
            first_hit_only: false,
            source: None,
        });

        let views = inspect_candidates(&config, &[], 40).unwrap();
        assert_eq!(views.len(), 1);
        let v = &views[0];
        assert_eq!(v.head.len(), 40);
        assert_eq!(v.lines, 51);
        assert!(v.has_backup);
        assert_eq!(v.marker.as_deref(), Some("MLCJSONFFIEngineForceLink_v1"));
        assert_eq!(v.strategy, "repo_local");
        assert!(v.modified.as_deref().unwrap().ends_with('Z'));
    }
}
