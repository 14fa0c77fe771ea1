//! Run reports.
//!
//! One [`RunReport`] per invocation, holding one [`TargetReport`] per
//! configured target. Reports are built in memory while the run proceeds
//! and serialized once, at the end, by the diagnostics sink.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::RuleLog;

/// One path the locator looked at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub strategy: String,
    pub path: PathBuf,
    pub hit: bool,
}

/// Where the known-good replacement body came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum SourceOrigin {
    /// The target has no replacement source; rules only.
    None,
    Inline,
    Local { path: PathBuf },
    /// `path` is the scratch copy, absent on dry runs.
    Remote { url: String, path: Option<PathBuf> },
    /// A source was configured but nothing was available.
    Missing,
}

/// Per-candidate outcome of apply.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchResult {
    pub path: PathBuf,
    pub strategy: String,
    pub attempted: bool,
    pub backed_up: bool,
    pub written: bool,
    pub changed: bool,
    pub marker_found: Option<String>,
    pub error: Option<String>,
    pub rules: Vec<RuleLog>,
    /// SHA-256 of the content before and after the rewrite.
    pub sha256_before: Option<String>,
    pub sha256_after: Option<String>,
}

impl PatchResult {
    pub fn new(path: PathBuf, strategy: &str) -> Self {
        Self {
            path,
            strategy: strategy.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyRole {
    /// The path was a write target in this run.
    Written,
    /// The path was only discovered; verified read-only.
    Discovered,
}

impl VerifyRole {
    pub fn as_str(self) -> &'static str {
        match self {
            VerifyRole::Written => "written",
            VerifyRole::Discovered => "discovered",
        }
    }
}

/// Result of re-reading one path after the run.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub path: PathBuf,
    pub role: VerifyRole,
    pub marker_found: Option<String>,
    pub residuals: Vec<(String, usize)>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub name: String,
    pub file: String,
    pub probes: Vec<Probe>,
    pub source: SourceOrigin,
    pub results: Vec<PatchResult>,
    pub verifications: Vec<Verification>,
    /// Set when the target could not be processed at all.
    pub error: Option<String>,
    pub fatal: bool,
}

impl TargetReport {
    pub fn new(name: &str, file: &str) -> Self {
        Self {
            name: name.to_string(),
            file: file.to_string(),
            probes: Vec::new(),
            source: SourceOrigin::None,
            results: Vec::new(),
            verifications: Vec::new(),
            error: None,
            fatal: false,
        }
    }

    /// At least one location carries a marker.
    pub fn verified(&self) -> bool {
        self.verifications.iter().any(|v| v.marker_found.is_some())
    }

    pub fn written_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.results.iter().filter(|r| r.written).map(|r| &r.path)
    }

    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    SoftFailure,
    Fatal,
}

impl RunStatus {
    /// Process exit code for this status. Soft failures never fail the
    /// enclosing pipeline.
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Ok | RunStatus::SoftFailure => 0,
            RunStatus::Fatal => 2,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Ok => write!(f, "ok"),
            RunStatus::SoftFailure => write!(f, "soft failure"),
            RunStatus::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub targets: Vec<TargetReport>,
    pub status: RunStatus,
    /// Diagnostics writes that failed; never affects `status`.
    pub sink_errors: usize,
}

impl RunReport {
    pub fn new(command: &str, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            command: command.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            targets: Vec::new(),
            status: RunStatus::Ok,
            sink_errors: 0,
        }
    }

    /// Stamp the finish time and derive the run status.
    ///
    /// Fatal if any target hit a fatal condition; otherwise ok iff every
    /// target is verified somewhere.
    pub fn finish(&mut self) -> RunStatus {
        self.finished_at = Some(Utc::now());
        self.status = if self.targets.iter().any(|t| t.fatal) {
            RunStatus::Fatal
        } else if self.targets.iter().all(TargetReport::verified) {
            RunStatus::Ok
        } else {
            RunStatus::SoftFailure
        };
        self.status
    }

    pub fn unverified(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets.iter().filter(|t| !t.verified())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verification(marker: Option<&str>) -> Verification {
        Verification {
            path: PathBuf::from("/x"),
            role: VerifyRole::Discovered,
            marker_found: marker.map(str::to_string),
            residuals: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn any_marker_verifies_target() {
        let mut target = TargetReport::new("t", "a/b.py");
        target.verifications.push(verification(None));
        assert!(!target.verified());
        target.verifications.push(verification(Some("m")));
        assert!(target.verified());
    }

    #[test]
    fn finish_derives_status() {
        let mut report = RunReport::new("apply", false);
        let mut ok = TargetReport::new("ok", "a");
        ok.verifications.push(verification(Some("m")));
        report.targets.push(ok);
        assert_eq!(report.finish(), RunStatus::Ok);

        report.targets.push(TargetReport::new("missing", "b"));
        assert_eq!(report.finish(), RunStatus::SoftFailure);
        assert_eq!(report.unverified().count(), 1);

        report.targets[1].fatal = true;
        assert_eq!(report.finish(), RunStatus::Fatal);
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(RunStatus::Ok.exit_code(), 0);
        assert_eq!(RunStatus::SoftFailure.exit_code(), 0);
        assert_eq!(RunStatus::Fatal.exit_code(), 2);
    }

    #[test]
    fn serializes_to_json() {
        let mut report = RunReport::new("verify", true);
        report.targets.push(TargetReport::new("t", "f.cc"));
        report.finish();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "soft_failure");
        assert_eq!(json["targets"][0]["source"]["origin"], "none");
    }
}
