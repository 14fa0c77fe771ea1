//! Run orchestration.
//!
//! For each selected target, in configuration order:
//!
//! 1. locate candidates ([`crate::locate`]),
//! 2. resolve the known-good source when a `replace_file` rule needs one
//!    (local copies first, then [`crate::fetch`]),
//! 3. rewrite every candidate with the target's rules,
//! 4. back up and commit changed content ([`crate::commit`]),
//! 5. verify written and discovered paths ([`crate::verify`]).
//!
//! Everything is recorded in a [`RunReport`] and flushed to the
//! diagnostics sink at the end. Per-candidate failures are recorded and
//! processing continues; only a missing `required` source is fatal.

use anyhow::{bail, Context, Result};
use mend_core::balance::BalanceSpec;
use mend_core::engine::rewrite;
use mend_core::error::PatchError;
use mend_core::marker::find_marker;
use mend_core::report::{
    PatchResult, RunReport, SourceOrigin, TargetReport, Verification, VerifyRole,
};
use mend_core::rule::Rule;
use std::path::{Path, PathBuf};

use crate::commit::{commit, sha256_hex};
use crate::config::{Config, RuleKindConfig, TargetConfig};
use crate::diagnostics::DiagnosticsSink;
use crate::fetch::fetch_first;
use crate::locate::{locate, Candidate, LocateOutcome, TargetSpec};
use crate::narrate::{probe_event, Event, Narrator};
use crate::site::{installed_roots, SiteEnv};
use crate::verify::verify_paths;

/// Options for `mend apply`.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Targets to process; empty means all.
    pub targets: Vec<String>,
    pub dry_run: bool,
    /// Extra override paths, probed before everything else.
    pub paths: Vec<PathBuf>,
}

/// Full pipeline over the selected targets.
pub fn run_apply(
    config: &Config,
    options: &ApplyOptions,
    narrator: &dyn Narrator,
) -> Result<RunReport> {
    let selected = config.select(&options.targets)?;
    let installed = installed_roots(&config.site, &SiteEnv::from_process(), narrator);
    let mut sink = if options.dry_run {
        DiagnosticsSink::disabled(narrator)
    } else {
        DiagnosticsSink::new(&config.diagnostics.dir, narrator)
    };

    let mut report = RunReport::new("apply", options.dry_run);
    for target in selected {
        let target_report = apply_target(config, target, options, &installed, &mut sink, narrator);
        report.targets.push(target_report);
    }

    Ok(finish(report, &mut sink, narrator))
}

/// Read-only verification pass over every candidate of the selected targets.
pub fn run_verify(config: &Config, targets: &[String], narrator: &dyn Narrator) -> Result<RunReport> {
    let selected = config.select(targets)?;
    let installed = installed_roots(&config.site, &SiteEnv::from_process(), narrator);
    let mut sink = DiagnosticsSink::new(&config.diagnostics.dir, narrator);

    let mut report = RunReport::new("verify", false);
    for target in selected {
        let mut target_report = TargetReport::new(&target.name, &target.file);
        let outcome = discover(target, &[], &installed, narrator);
        target_report.probes = outcome.probes.clone();
        verify_target(&mut target_report, target, &outcome.candidates, narrator);
        report.targets.push(target_report);
    }

    Ok(finish(report, &mut sink, narrator))
}

/// Locate the selected targets, narrating every probe and candidate.
pub fn run_locate<'c>(
    config: &'c Config,
    targets: &[String],
    narrator: &dyn Narrator,
) -> Result<Vec<(&'c TargetConfig, LocateOutcome)>> {
    let selected = config.select(targets)?;
    let installed = installed_roots(&config.site, &SiteEnv::from_process(), narrator);

    Ok(selected
        .into_iter()
        .map(|target| {
            let outcome = discover(target, &[], &installed, narrator);
            for c in &outcome.candidates {
                narrator.report(Event::Candidate {
                    target: target.name.clone(),
                    strategy: c.strategy.to_string(),
                    path: c.path.clone(),
                    readable: c.readable,
                });
            }
            (target, outcome)
        })
        .collect())
}

/// Close unbalanced `{` in a single file, through backup and commit.
pub fn run_balance(
    config: &Config,
    file: &Path,
    dry_run: bool,
    narrator: &dyn Narrator,
) -> Result<PatchResult> {
    if !file.is_file() {
        bail!("No such file: {}", file.display());
    }
    let rule = Rule::balance(BalanceSpec::default()).context("Invalid balance rule")?;
    let mut sink = if dry_run {
        DiagnosticsSink::disabled(narrator)
    } else {
        DiagnosticsSink::new(&config.diagnostics.dir, narrator)
    };

    let result = apply_candidate(file, "explicit", &[rule], &[], dry_run, &mut sink, narrator);
    if let Some(err) = &result.error {
        narrator.report(Event::warning(format!("balance: {}", err)));
    }
    Ok(result)
}

fn apply_target(
    config: &Config,
    target: &TargetConfig,
    options: &ApplyOptions,
    installed: &[PathBuf],
    sink: &mut DiagnosticsSink,
    narrator: &dyn Narrator,
) -> TargetReport {
    let mut report = TargetReport::new(&target.name, &target.file);
    let outcome = discover(target, &options.paths, installed, narrator);
    report.probes = outcome.probes.clone();

    let mut body: Option<String> = None;
    if config.needs_source(&target.name) {
        match resolve_source(config, target, options.dry_run, narrator) {
            Ok((origin, text)) => {
                report.source = origin;
                body = Some(text);
            }
            Err(e) => {
                narrator.report(Event::SourceMissing {
                    target: target.name.clone(),
                    required: e.is_fatal(),
                });
                sink.no_local_source(&target.name);
                report.source = SourceOrigin::Missing;
                report.fatal = e.is_fatal();
                report.error = Some(e.to_string());
            }
        }
    } else if config
        .rules_for(&target.name)
        .any(|r| r.kind == RuleKindConfig::ReplaceFile)
    {
        report.source = SourceOrigin::Inline;
    }

    match compile_rules(config, &target.name, body.as_deref()) {
        Ok(rules) => {
            for (path, strategy) in destinations(target, &outcome.candidates, installed) {
                let result = apply_candidate(
                    &path,
                    strategy,
                    &rules,
                    &target.markers,
                    options.dry_run,
                    sink,
                    narrator,
                );
                report.results.push(result);
            }
        }
        Err(e) => {
            narrator.report(Event::warning(format!("{}: {:#}", target.name, e)));
            report.error = Some(format!("{:#}", e));
        }
    }

    verify_target(&mut report, target, &outcome.candidates, narrator);
    report
}

/// Locate one target and narrate what was probed.
fn discover(
    target: &TargetConfig,
    extra_paths: &[PathBuf],
    installed: &[PathBuf],
    narrator: &dyn Narrator,
) -> LocateOutcome {
    narrator.report(Event::TargetStart {
        target: target.name.clone(),
        file: target.file.clone(),
    });
    let spec = TargetSpec::from_config(target, extra_paths);
    let outcome = locate(&spec, installed);
    for probe in &outcome.probes {
        narrator.report(probe_event(&target.name, &probe.strategy, &probe.path, probe.hit));
    }
    if outcome.is_empty() {
        narrator.report(Event::NoCandidates {
            target: target.name.clone(),
        });
    }
    outcome
}

/// Known-good replacement content: local copies first, then remote URLs.
/// A `required` source that cannot be found anywhere is fatal.
fn resolve_source(
    config: &Config,
    target: &TargetConfig,
    dry_run: bool,
    narrator: &dyn Narrator,
) -> Result<(SourceOrigin, String), PatchError> {
    let required = target.source.as_ref().map(|s| s.required).unwrap_or(false);
    find_source(config, target, dry_run, narrator).map_err(|e| {
        if required && !e.is_fatal() {
            PatchError::Fatal(format!(
                "required source for '{}' unavailable: {}",
                target.name, e
            ))
        } else {
            e
        }
    })
}

/// Unreadable local copies are skipped. Dry runs keep fetched payloads in
/// memory only.
fn find_source(
    config: &Config,
    target: &TargetConfig,
    dry_run: bool,
    narrator: &dyn Narrator,
) -> Result<(SourceOrigin, String), PatchError> {
    let Some(source) = &target.source else {
        return Err(PatchError::absent("no source configured"));
    };

    let spec = TargetSpec::explicit(&target.name, &target.file, &source.paths);
    let local = locate(&spec, &[]);
    for probe in &local.probes {
        narrator.report(probe_event(&target.name, "source", &probe.path, probe.hit));
    }
    for candidate in local.candidates.iter().filter(|c| c.readable) {
        let body = match std::fs::read_to_string(&candidate.path) {
            Ok(body) => body,
            Err(e) => {
                let err = PatchError::io(&candidate.path, e);
                narrator.report(Event::warning(format!("skipping source {}", err)));
                continue;
            }
        };
        narrator.report(Event::SourceFound {
            target: target.name.clone(),
            origin: "local".to_string(),
            location: candidate.path.display().to_string(),
        });
        return Ok((
            SourceOrigin::Local {
                path: candidate.path.clone(),
            },
            body,
        ));
    }

    let file_name = spec
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| target.name.clone());
    let scratch = (!dry_run).then(|| config.scratch_dir());
    let fetched = fetch_first(
        &source.urls,
        &file_name,
        &config.fetch,
        scratch.as_deref(),
        narrator,
    )?;
    narrator.report(Event::SourceFound {
        target: target.name.clone(),
        origin: "remote".to_string(),
        location: fetched.url.clone(),
    });
    Ok((
        SourceOrigin::Remote {
            url: fetched.url,
            path: fetched.path,
        },
        fetched.body,
    ))
}

/// The target's rules in table order. `replace_file` rules without a body
/// are dropped.
fn compile_rules(config: &Config, target: &str, body: Option<&str>) -> Result<Vec<Rule>> {
    let mut rules = Vec::new();
    for rule in config.rules_for(target) {
        if let Some(compiled) = rule.compile(body)? {
            rules.push(compiled);
        }
    }
    Ok(rules)
}

/// Candidates plus, in install mode, the not-yet-existing copies under
/// installed roots that already hold the target's top-level package.
fn destinations(
    target: &TargetConfig,
    candidates: &[Candidate],
    installed: &[PathBuf],
) -> Vec<(PathBuf, &'static str)> {
    let mut out: Vec<(PathBuf, &'static str)> = candidates
        .iter()
        .map(|c| (c.path.clone(), c.strategy))
        .collect();

    if !target.install {
        return out;
    }
    let suffix = Path::new(&target.file);
    let Some(package) = suffix.components().next() else {
        return out;
    };
    for root in installed {
        let dest = root.join(suffix);
        if root.join(package).is_dir() && !dest.exists() && !out.iter().any(|(p, _)| *p == dest) {
            out.push((dest, "install"));
        }
    }
    out
}

fn apply_candidate(
    path: &Path,
    strategy: &str,
    rules: &[Rule],
    markers: &[String],
    dry_run: bool,
    sink: &mut DiagnosticsSink,
    narrator: &dyn Narrator,
) -> PatchResult {
    let mut result = PatchResult::new(path.to_path_buf(), strategy);
    result.attempted = true;
    sink.attempted(path);

    let exists = path.exists();
    let original = if exists {
        match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                let err = PatchError::io(path, e);
                narrator.report(Event::warning(err.to_string()));
                result.error = Some(err.to_string());
                return result;
            }
        }
    } else {
        String::new()
    };
    if exists {
        result.sha256_before = Some(sha256_hex(original.as_bytes()));
    }

    let out = rewrite(&original, rules);
    for entry in &out.log {
        narrator.report(Event::Rule {
            path: path.to_path_buf(),
            rule: entry.rule.clone(),
            status: entry.status.to_string(),
        });
    }
    narrator.report(Event::Rewrite {
        path: path.to_path_buf(),
        changed: out.changed,
    });
    result.changed = out.changed;
    result.rules = out.log.clone();
    result.marker_found = find_marker(&out.content, markers).map(str::to_string);

    if !out.changed || dry_run {
        return result;
    }

    match commit(path, &out.content) {
        Ok(committed) => {
            if let Some(backup) = committed.backup {
                result.backed_up = true;
                narrator.report(if committed.backed_up {
                    Event::BackedUp {
                        path: path.to_path_buf(),
                        backup,
                    }
                } else {
                    Event::BackupKept { backup }
                });
            }
            result.written = true;
            result.sha256_after = Some(sha256_hex(out.content.as_bytes()));
            narrator.report(Event::Written {
                path: path.to_path_buf(),
            });

            sink.patched(path);
            sink.copy_patched(path, &out.content);
            let appended = out.braces_appended();
            if appended > 0 {
                sink.brace_fix(path, appended);
            }
        }
        Err(e) => {
            narrator.report(Event::WriteFailed {
                path: path.to_path_buf(),
                error: e.to_string(),
            });
            result.error = Some(e.to_string());
        }
    }
    result
}

/// Verify written paths, then every other candidate read-only.
fn verify_target(
    report: &mut TargetReport,
    target: &TargetConfig,
    candidates: &[Candidate],
    narrator: &dyn Narrator,
) {
    let written: Vec<PathBuf> = report.written_paths().cloned().collect();
    let discovered: Vec<PathBuf> = candidates
        .iter()
        .map(|c| c.path.clone())
        .filter(|p| !written.contains(p))
        .collect();

    let mut verifications = verify_paths(
        &written,
        &target.markers,
        &target.residuals,
        VerifyRole::Written,
    );
    verifications.extend(verify_paths(
        &discovered,
        &target.markers,
        &target.residuals,
        VerifyRole::Discovered,
    ));

    for v in &verifications {
        narrate_verification(v, narrator);
    }
    report.verifications = verifications;
}

fn narrate_verification(v: &Verification, narrator: &dyn Narrator) {
    if let Some(err) = &v.error {
        narrator.report(Event::warning(format!(
            "cannot verify {}: {}",
            v.path.display(),
            err
        )));
        return;
    }
    narrator.report(Event::Verified {
        path: v.path.clone(),
        role: v.role.as_str().to_string(),
        marker: v.marker_found.clone(),
    });
    for (token, count) in &v.residuals {
        narrator.report(Event::Residual {
            path: v.path.clone(),
            token: token.clone(),
            count: *count,
        });
    }
}

/// Derive the status, write sentinels and the report, narrate the summary.
fn finish(mut report: RunReport, sink: &mut DiagnosticsSink, narrator: &dyn Narrator) -> RunReport {
    let status = report.finish();

    let unverified: Vec<String> = report.unverified().map(|t| t.name.clone()).collect();
    sink.marker_missing(unverified.iter().map(String::as_str));
    report.sink_errors = sink.errors();
    sink.report(&report);

    narrator.report(Event::Summary {
        status: status.to_string(),
        targets: report.targets.len(),
        written: report.targets.iter().map(|t| t.written_paths().count()).sum(),
        failures: report.targets.iter().map(TargetReport::failures).sum(),
        verified: report.targets.iter().filter(|t| t.verified()).count(),
    });
    report
}
