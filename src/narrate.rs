//! Running narration of each decision the engine makes.
//!
//! Every stage reports what it decided (found / not found, changed /
//! unchanged, backed up, written, verified) through a [`Narrator`].
//! Human narration goes to **stdout** so it interleaves with the final
//! summary in CI logs; warnings go to stderr. JSON narration emits one
//! object per line for machine consumers.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A single narration event.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    TargetStart {
        target: String,
        file: String,
    },
    Probe {
        target: String,
        strategy: String,
        path: PathBuf,
        hit: bool,
    },
    Candidate {
        target: String,
        strategy: String,
        path: PathBuf,
        readable: bool,
    },
    NoCandidates {
        target: String,
    },
    SourceFound {
        target: String,
        origin: String,
        /// Local path or URL.
        location: String,
    },
    FetchAttempt {
        url: String,
    },
    FetchFailed {
        url: String,
        reason: String,
    },
    SourceMissing {
        target: String,
        required: bool,
    },
    Rule {
        path: PathBuf,
        rule: String,
        status: String,
    },
    Rewrite {
        path: PathBuf,
        changed: bool,
    },
    BackedUp {
        path: PathBuf,
        backup: PathBuf,
    },
    BackupKept {
        backup: PathBuf,
    },
    Written {
        path: PathBuf,
    },
    WriteFailed {
        path: PathBuf,
        error: String,
    },
    Verified {
        path: PathBuf,
        role: String,
        marker: Option<String>,
    },
    Residual {
        path: PathBuf,
        token: String,
        count: usize,
    },
    Warning {
        message: String,
    },
    Summary {
        status: String,
        targets: usize,
        written: usize,
        failures: usize,
        verified: usize,
    },
}

impl Event {
    pub fn warning(message: impl Into<String>) -> Self {
        Event::Warning {
            message: message.into(),
        }
    }

    fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::Warning { .. } | Event::WriteFailed { .. } | Event::FetchFailed { .. }
        )
    }

    fn human(&self) -> String {
        match self {
            Event::TargetStart { target, file } => format!("target {} ({})", target, file),
            Event::Probe {
                strategy,
                path,
                hit,
                ..
            } => format!(
                "  {:<10} {} {}",
                strategy,
                if *hit { "found    " } else { "not found" },
                path.display()
            ),
            Event::Candidate {
                strategy,
                path,
                readable,
                ..
            } => format!(
                "  candidate [{}] {}{}",
                strategy,
                path.display(),
                if *readable { "" } else { " (unreadable)" }
            ),
            Event::NoCandidates { target } => format!("  no candidates for {}", target),
            Event::SourceFound {
                origin, location, ..
            } => format!("  known-good source ({}): {}", origin, location),
            Event::FetchAttempt { url } => format!("  fetching {}", url),
            Event::FetchFailed { url, reason } => format!("  fetch failed: {}: {}", url, reason),
            Event::SourceMissing { target, required } => format!(
                "  no known-good source for {}{}",
                target,
                if *required { " (required)" } else { "" }
            ),
            Event::Rule { rule, status, .. } => format!("    rule {}: {}", rule, status),
            Event::Rewrite { path, changed } => format!(
                "  {} {}",
                if *changed { "changed  " } else { "unchanged" },
                path.display()
            ),
            Event::BackedUp { backup, .. } => format!("  backed up to {}", backup.display()),
            Event::BackupKept { backup } => {
                format!("  backup kept (already present): {}", backup.display())
            }
            Event::Written { path } => format!("  written {}", path.display()),
            Event::WriteFailed { path, error } => {
                format!("  write failed for {}: {}", path.display(), error)
            }
            Event::Verified { path, role, marker } => match marker {
                Some(m) => format!("  verified [{}] {} (marker `{}`)", role, path.display(), m),
                None => format!("  marker missing [{}] {}", role, path.display()),
            },
            Event::Residual { path, token, count } => format!(
                "  residual `{}` x{} in {}",
                token,
                count,
                path.display()
            ),
            Event::Warning { message } => format!("warning: {}", message),
            Event::Summary {
                status,
                targets,
                written,
                failures,
                verified,
            } => format!(
                "{}: {} target(s), {} written, {} failed, {} verified",
                status, targets, written, failures, verified
            ),
        }
    }
}

/// Receives narration events from the pipeline.
pub trait Narrator: Send + Sync {
    fn report(&self, event: Event);
}

/// Human-readable lines on stdout, warnings on stderr.
pub struct HumanNarrator;

impl Narrator for HumanNarrator {
    fn report(&self, event: Event) {
        let line = event.human();
        if event.is_warning() {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        } else {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }
}

/// One JSON object per event on stdout.
pub struct JsonNarrator;

impl Narrator for JsonNarrator {
    fn report(&self, event: Event) {
        if let Ok(line) = serde_json::to_string(&event) {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }
}

/// Drops everything.
pub struct Silent;

impl Narrator for Silent {
    fn report(&self, _event: Event) {}
}

/// Keeps events in memory; used by library callers and tests.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Narrator for Recorder {
    fn report(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Narration mode selected on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum NarrateMode {
    Human,
    Json,
    Off,
}

impl NarrateMode {
    pub fn narrator(&self) -> Box<dyn Narrator> {
        match self {
            NarrateMode::Human => Box::new(HumanNarrator),
            NarrateMode::Json => Box::new(JsonNarrator),
            NarrateMode::Off => Box::new(Silent),
        }
    }
}

pub(crate) fn probe_event(target: &str, strategy: &str, path: &Path, hit: bool) -> Event {
    Event::Probe {
        target: target.to_string(),
        strategy: strategy.to_string(),
        path: path.to_path_buf(),
        hit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_lines() {
        let e = Event::Rewrite {
            path: PathBuf::from("/a/b.py"),
            changed: false,
        };
        assert_eq!(e.human(), "  unchanged /a/b.py");

        let e = Event::Verified {
            path: PathBuf::from("/a/b.py"),
            role: "written".into(),
            marker: None,
        };
        assert_eq!(e.human(), "  marker missing [written] /a/b.py");
    }

    #[test]
    fn json_is_tagged() {
        let e = Event::NoCandidates {
            target: "bsv".into(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["event"], "no_candidates");
        assert_eq!(json["target"], "bsv");
    }

    #[test]
    fn recorder_keeps_order() {
        let r = Recorder::new();
        r.report(Event::warning("one"));
        r.report(Event::warning("two"));
        let events = r.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], Event::warning("two"));
        assert!(events[0].is_warning());
    }
}
