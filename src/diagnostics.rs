//! Diagnostics sink.
//!
//! A fixed directory (default `tmp_patched/`) that CI uploads as an
//! artifact. Files are appended to across runs:
//!
//! | File | Content |
//! |------|---------|
//! | `attempted_targets.txt` | every path a rewrite was attempted on |
//! | `patched_targets.txt` | every path actually written |
//! | `patched-<basename>` | final content of each written file |
//! | `brace_fix_applied.txt` | `<path>\t<count>` per balance fix |
//! | `no_local_source.txt` | targets with no known-good source |
//! | `marker_missing.txt` | targets with no marker anywhere, latest run only |
//! | `reports.jsonl` | one serialized run report per line |
//!
//! No write here is allowed to fail the run. Each failure is narrated as
//! a warning and counted.

use mend_core::report::RunReport;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::narrate::{Event, Narrator};

pub struct DiagnosticsSink<'a> {
    dir: PathBuf,
    enabled: bool,
    narrator: &'a dyn Narrator,
    /// Copies written this run, per basename.
    copies: HashMap<String, usize>,
    errors: usize,
}

impl<'a> DiagnosticsSink<'a> {
    pub fn new(dir: &Path, narrator: &'a dyn Narrator) -> Self {
        Self {
            dir: dir.to_path_buf(),
            enabled: true,
            narrator,
            copies: HashMap::new(),
            errors: 0,
        }
    }

    /// A sink that records nothing, for dry runs.
    pub fn disabled(narrator: &'a dyn Narrator) -> Self {
        Self {
            enabled: false,
            ..Self::new(Path::new(""), narrator)
        }
    }

    /// Number of failed writes so far.
    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn attempted(&mut self, path: &Path) {
        self.append("attempted_targets.txt", &path.display().to_string());
    }

    pub fn patched(&mut self, path: &Path) {
        self.append("patched_targets.txt", &path.display().to_string());
    }

    /// Save the final content of `path` as `patched-<basename>`; later
    /// copies of the same basename get `.2`, `.3`, ...
    pub fn copy_patched(&mut self, path: &Path, content: &str) -> Option<PathBuf> {
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());
        let seen = self.copies.entry(base.clone()).or_insert(0);
        *seen += 1;
        let name = match *seen {
            1 => format!("patched-{}", base),
            n => format!("patched-{}.{}", base, n),
        };
        self.write(&name, content)
    }

    pub fn brace_fix(&mut self, path: &Path, appended: usize) {
        self.append(
            "brace_fix_applied.txt",
            &format!("{}\t{}", path.display(), appended),
        );
    }

    pub fn no_local_source(&mut self, target: &str) {
        self.append("no_local_source.txt", target);
    }

    /// Sentinel listing every target that has no marker anywhere. Replaced
    /// each run; removed when every target is verified.
    pub fn marker_missing<'t>(&mut self, targets: impl IntoIterator<Item = &'t str>) {
        let body: String = targets.into_iter().map(|t| format!("{}\n", t)).collect();
        if !body.is_empty() {
            self.write("marker_missing.txt", &body);
        } else {
            self.remove("marker_missing.txt");
        }
    }

    /// Append `report` to `reports.jsonl`.
    pub fn report(&mut self, report: &RunReport) {
        match serde_json::to_string(report) {
            Ok(line) => self.append("reports.jsonl", &line),
            Err(e) => self.fail("reports.jsonl", e),
        }
    }

    fn ensure_dir(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            let dir = self.dir.display().to_string();
            self.fail(&dir, e);
            return false;
        }
        true
    }

    fn append(&mut self, name: &str, line: &str) {
        if !self.ensure_dir() {
            return;
        }
        let path = self.dir.join(name);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{}", line));
        if let Err(e) = result {
            self.fail(name, e);
        }
    }

    fn write(&mut self, name: &str, content: &str) -> Option<PathBuf> {
        if !self.ensure_dir() {
            return None;
        }
        let path = self.dir.join(name);
        match std::fs::write(&path, content) {
            Ok(()) => Some(path),
            Err(e) => {
                self.fail(name, e);
                None
            }
        }
    }

    fn remove(&mut self, name: &str) {
        if !self.enabled {
            return;
        }
        match std::fs::remove_file(self.dir.join(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => self.fail(name, e),
        }
    }

    fn fail(&mut self, what: &str, err: impl std::fmt::Display) {
        self.errors += 1;
        self.narrator.report(Event::warning(format!(
            "diagnostics: could not write {}: {}",
            what, err
        )));
    }
}
