//! Candidate locator.
//!
//! Resolves a [`TargetSpec`] to the existing files it may refer to. The
//! strategies run in a fixed priority order:
//!
//! | Order | Strategy | Paths probed |
//! |-------|----------|--------------|
//! | 1 | `override` | caller-supplied paths (a directory is joined with the suffix) |
//! | 2 | `repo_local` | repository-local source trees joined with the suffix |
//! | 3 | `installed` | installed-package roots joined with the suffix |
//! | 4 | `search` | bounded recursive walk matching the file name |
//!
//! [`locate`] is a pure function of its arguments: every root it looks at
//! is passed in. Finding nothing is a normal outcome and returns an empty
//! candidate list; unreadable directories are skipped.

use globset::{Glob, GlobSet, GlobSetBuilder};
use mend_core::report::Probe;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{SearchConfig, TargetConfig};

/// Identity of a file to patch and where it may live.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub name: String,
    /// Relative path suffix of the file.
    pub suffix: PathBuf,
    pub overrides: Vec<PathBuf>,
    pub repo_local: Vec<PathBuf>,
    pub use_installed: bool,
    pub search: Option<SearchConfig>,
    pub first_hit_only: bool,
}

impl TargetSpec {
    pub fn from_config(target: &TargetConfig, extra_overrides: &[PathBuf]) -> Self {
        let mut overrides = extra_overrides.to_vec();
        overrides.extend(target.paths.iter().cloned());
        Self {
            name: target.name.clone(),
            suffix: PathBuf::from(&target.file),
            overrides,
            repo_local: target.repo_local.clone(),
            use_installed: target.installed,
            search: target.search.clone(),
            first_hit_only: target.first_hit_only,
        }
    }

    /// A spec with only explicit paths, used for known-good sources.
    pub fn explicit(name: &str, suffix: &str, paths: &[PathBuf]) -> Self {
        Self {
            name: name.to_string(),
            suffix: PathBuf::from(suffix),
            overrides: paths.to_vec(),
            repo_local: Vec::new(),
            use_installed: false,
            search: None,
            first_hit_only: true,
        }
    }

    /// Terminal component of the suffix, matched by the search strategy.
    pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.suffix.file_name()
    }
}

/// An existing file the target may refer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub strategy: &'static str,
    pub readable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LocateOutcome {
    pub candidates: Vec<Candidate>,
    /// Every path looked at, hits and misses, in probe order.
    pub probes: Vec<Probe>,
}

impl LocateOutcome {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn record(&mut self, strategy: &'static str, path: &Path, hit: bool, first_hit_only: bool) {
        self.probes.push(Probe {
            strategy: strategy.to_string(),
            path: path.to_path_buf(),
            hit,
        });
        if !hit || (first_hit_only && !self.candidates.is_empty()) {
            return;
        }
        let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.candidates.iter().any(|c| c.path == resolved) {
            return;
        }
        let readable = std::fs::File::open(&resolved).is_ok();
        self.candidates.push(Candidate {
            path: resolved,
            strategy,
            readable,
        });
    }
}

/// Resolve `spec` against its own roots plus `installed_roots`.
pub fn locate(spec: &TargetSpec, installed_roots: &[PathBuf]) -> LocateOutcome {
    let mut outcome = LocateOutcome::default();
    let first = spec.first_hit_only;

    for path in &spec.overrides {
        let path = if path.is_dir() {
            path.join(&spec.suffix)
        } else {
            path.clone()
        };
        let hit = path.is_file();
        outcome.record("override", &path, hit, first);
    }

    for root in &spec.repo_local {
        let path = root.join(&spec.suffix);
        let hit = path.is_file();
        outcome.record("repo_local", &path, hit, first);
    }

    if spec.use_installed {
        for root in installed_roots {
            let path = root.join(&spec.suffix);
            let hit = path.is_file();
            outcome.record("installed", &path, hit, first);
        }
    }

    if let (Some(search), Some(name)) = (&spec.search, spec.file_name()) {
        for root in &search.roots {
            let hits = search_root(root, name, search);
            if hits.is_empty() {
                outcome.record("search", root, false, first);
            }
            for hit in hits {
                outcome.record("search", &hit, true, first);
            }
        }
    }

    outcome
}

/// Walk `root` looking for files named `name`, bounded by depth and by the
/// number of files visited. The walk is sorted so the budget cuts off
/// deterministically. Excluded directories are pruned, not descended.
fn search_root(root: &Path, name: &std::ffi::OsStr, search: &SearchConfig) -> Vec<PathBuf> {
    let excludes = Excludes::new(&search.exclude_globs);
    let mut visited = 0usize;
    let mut hits = Vec::new();

    let walker = WalkDir::new(root)
        .max_depth(search.max_depth)
        .follow_links(search.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !excludes.skips_dir(e.path().strip_prefix(root).unwrap_or(e.path()))
        });

    for entry in walker {
        // Unreadable directories and broken links are skipped.
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if excludes.files.is_match(relative) {
            continue;
        }

        visited += 1;
        if visited > search.max_files {
            break;
        }
        if entry.file_name() == name {
            hits.push(entry.into_path());
        }
    }

    hits.sort();
    hits
}

/// Exclude globs, matched against root-relative paths. A `<dir>/**`
/// pattern also prunes `<dir>` itself.
struct Excludes {
    files: GlobSet,
    dirs: GlobSet,
}

impl Excludes {
    fn new(extra: &[String]) -> Self {
        let defaults = ["**/.git/**", "**/target/**", "**/node_modules/**"];
        let patterns: Vec<String> = defaults
            .iter()
            .map(|s| s.to_string())
            .chain(extra.iter().cloned())
            .collect();
        let dir_patterns: Vec<String> = patterns
            .iter()
            .filter_map(|p| p.strip_suffix("/**").map(str::to_string))
            .collect();
        Self {
            files: build_globset(&patterns),
            dirs: build_globset(&dir_patterns),
        }
    }

    fn skips_dir(&self, relative: &Path) -> bool {
        self.dirs.is_match(relative) || self.files.is_match(relative)
    }
}

fn build_globset(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        // Invalid user globs are ignored rather than aborting the search.
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SUFFIX: &str = "mlc_llm/op/batch_spec_verify.py";

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn spec() -> TargetSpec {
        TargetSpec {
            name: "bsv".into(),
            suffix: PathBuf::from(SUFFIX),
            overrides: Vec::new(),
            repo_local: Vec::new(),
            use_installed: true,
            search: None,
            first_hit_only: false,
        }
    }

    fn search(roots: Vec<PathBuf>) -> SearchConfig {
        SearchConfig {
            roots,
            max_depth: 8,
            max_files: 10_000,
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }

    #[test]
    fn empty_when_nothing_exists() {
        let tmp = TempDir::new().unwrap();
        let mut s = spec();
        s.repo_local = vec![tmp.path().join("src")];
        let out = locate(&s, &[tmp.path().join("site")]);
        assert!(out.is_empty());
        assert_eq!(out.probes.len(), 2);
        assert!(out.probes.iter().all(|p| !p.hit));
    }

    #[test]
    fn strategies_run_in_priority_order() {
        let tmp = TempDir::new().unwrap();
        let site = tmp.path().join("site");
        let repo = tmp.path().join("repo");
        let explicit = tmp.path().join("explicit.py");
        touch(&site.join(SUFFIX));
        touch(&repo.join(SUFFIX));
        touch(&explicit);

        let mut s = spec();
        s.overrides = vec![explicit.clone()];
        s.repo_local = vec![repo.clone()];
        let out = locate(&s, &[site.clone()]);

        let strategies: Vec<&str> = out.candidates.iter().map(|c| c.strategy).collect();
        assert_eq!(strategies, vec!["override", "repo_local", "installed"]);
        assert!(out.candidates.iter().all(|c| c.readable));
    }

    #[test]
    fn override_directory_is_joined_with_suffix() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join(SUFFIX));
        let mut s = spec();
        s.overrides = vec![tmp.path().to_path_buf()];
        let out = locate(&s, &[]);
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.candidates[0].strategy, "override");
    }

    #[test]
    fn duplicates_collapse_to_first_strategy() {
        let tmp = TempDir::new().unwrap();
        let site = tmp.path().join("site");
        touch(&site.join(SUFFIX));

        let mut s = spec();
        s.repo_local = vec![site.clone()];
        s.search = Some(search(vec![tmp.path().to_path_buf()]));
        let out = locate(&s, &[site]);
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.candidates[0].strategy, "repo_local");
        assert_eq!(out.probes.iter().filter(|p| p.hit).count(), 3);
    }

    #[test]
    fn first_hit_only_still_logs_later_probes() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        touch(&a.join(SUFFIX));
        touch(&b.join(SUFFIX));

        let mut s = spec();
        s.first_hit_only = true;
        s.repo_local = vec![a, b];
        let out = locate(&s, &[]);
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.probes.len(), 2);
        assert!(out.probes[1].hit);
    }

    #[test]
    fn search_matches_file_name_and_skips_excludes() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("deep/pkg/batch_spec_verify.py"));
        touch(&tmp.path().join("node_modules/batch_spec_verify.py"));
        touch(&tmp.path().join("vendor/batch_spec_verify.py"));

        let mut s = spec();
        s.use_installed = false;
        let mut cfg = search(vec![tmp.path().to_path_buf()]);
        cfg.exclude_globs = vec!["vendor/**".into()];
        s.search = Some(cfg);

        let out = locate(&s, &[]);
        assert_eq!(out.candidates.len(), 1);
        assert!(out.candidates[0].path.ends_with("deep/pkg/batch_spec_verify.py"));
    }

    #[test]
    fn excluded_directories_are_pruned() {
        let excludes = Excludes::new(&["vendor/**".to_string(), "*.bak".to_string()]);
        assert!(excludes.skips_dir(Path::new("node_modules")));
        assert!(excludes.skips_dir(Path::new("web/node_modules")));
        assert!(excludes.skips_dir(Path::new(".git")));
        assert!(excludes.skips_dir(Path::new("vendor")));
        assert!(!excludes.skips_dir(Path::new("src")));
        assert!(!excludes.skips_dir(Path::new("src/vendor")));
        assert!(excludes.files.is_match(Path::new("engine.cc.bak")));
    }

    #[test]
    fn search_respects_depth_and_file_budget() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("a/b/c/d/batch_spec_verify.py"));

        let mut s = spec();
        s.use_installed = false;
        let mut shallow = search(vec![tmp.path().to_path_buf()]);
        shallow.max_depth = 2;
        s.search = Some(shallow);
        assert!(locate(&s, &[]).is_empty());

        // Sorted walk visits `0aa/` before `a/`.
        for i in 0..5 {
            touch(&tmp.path().join(format!("0aa/{}.txt", i)));
        }
        let mut budget = search(vec![tmp.path().to_path_buf()]);
        budget.max_files = 1;
        s.search = Some(budget);
        assert!(locate(&s, &[]).is_empty());
    }

    #[test]
    fn missing_search_root_is_not_an_error() {
        let mut s = spec();
        s.use_installed = false;
        s.search = Some(search(vec![PathBuf::from("/no/such/root")]));
        let out = locate(&s, &[]);
        assert!(out.is_empty());
        assert_eq!(out.probes[0].strategy, "search");
    }
}
