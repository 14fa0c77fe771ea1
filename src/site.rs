//! Installed-package root discovery.
//!
//! Patched files usually live inside an installed Python distribution, and
//! where that is depends on how the runtime was set up: a venv, a conda
//! env, the system prefix, or the user site. This module turns the
//! `[site]` config plus the process environment into an ordered list of
//! existing site-packages directories.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::SiteConfig;
use crate::narrate::{Event, Narrator};

const SITE_QUERY: &str = "\
import site
paths = []
try:
    paths += site.getsitepackages()
except Exception:
    pass
try:
    paths.append(site.getusersitepackages())
except Exception:
    pass
print('\\n'.join(paths))
";

/// Environment inputs, captured once so discovery stays a function of
/// explicit values.
#[derive(Debug, Clone, Default)]
pub struct SiteEnv {
    pub virtual_env: Option<PathBuf>,
    pub conda_prefix: Option<PathBuf>,
}

impl SiteEnv {
    pub fn from_process() -> Self {
        Self {
            virtual_env: std::env::var_os("VIRTUAL_ENV").map(PathBuf::from),
            conda_prefix: std::env::var_os("CONDA_PREFIX").map(PathBuf::from),
        }
    }
}

/// Existing site directories, deduplicated, in priority order:
/// configured roots, configured and environment prefixes, interpreter.
pub fn installed_roots(site: &SiteConfig, env: &SiteEnv, narrator: &dyn Narrator) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = site.roots.clone();

    let mut prefixes = site.prefixes.clone();
    if site.use_env {
        prefixes.extend(env.virtual_env.iter().cloned());
        prefixes.extend(env.conda_prefix.iter().cloned());
    }
    for prefix in &prefixes {
        roots.extend(prefix_site_dirs(prefix));
    }

    if let Some(interpreter) = &site.interpreter {
        match query_interpreter(interpreter) {
            Ok(paths) => roots.extend(paths),
            Err(e) => narrator.report(Event::warning(format!(
                "could not query {} for site directories: {:#}",
                interpreter, e
            ))),
        }
    }

    dedup_existing(roots)
}

/// `lib/python3*/site-packages` (and the Windows `Lib/site-packages`)
/// under one installation prefix.
pub fn prefix_site_dirs(prefix: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    for lib in ["lib", "lib64"] {
        let Ok(entries) = std::fs::read_dir(prefix.join(lib)) else {
            continue;
        };
        let mut versions: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("python3"))
            .map(|e| e.path().join("site-packages"))
            .filter(|p| p.is_dir())
            .collect();
        // Newest interpreter first.
        versions.sort();
        versions.reverse();
        dirs.extend(versions);
    }

    for flat in ["lib/site-packages", "Lib/site-packages"] {
        let p = prefix.join(flat);
        if p.is_dir() {
            dirs.push(p);
        }
    }

    dirs
}

fn query_interpreter(interpreter: &str) -> Result<Vec<PathBuf>> {
    let output = Command::new(interpreter)
        .args(["-c", SITE_QUERY])
        .output()
        .with_context(|| format!("failed to run {}", interpreter))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{} exited with {}: {}", interpreter, output.status, stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect())
}

fn dedup_existing(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen: Vec<PathBuf> = Vec::new();
    for p in paths {
        if p.is_dir() && !seen.contains(&p) {
            seen.push(p);
        }
    }
    seen
}
