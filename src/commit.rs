//! Backup & commit.
//!
//! Before the first write to a path, the original is copied to a sibling
//! `<name>.bak`. An existing backup is never overwritten, so it always
//! holds the content from before any patch was applied. The new content is
//! written to a temporary sibling and renamed into place.

use mend_core::error::PatchError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const BACKUP_SUFFIX: &str = ".bak";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub backup: Option<PathBuf>,
    /// A backup was created by this call (false if one already existed).
    pub backed_up: bool,
    /// The target did not exist before and was created.
    pub created: bool,
}

/// `engine.cc` → `engine.cc.bak`, in the same directory.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(BACKUP_SUFFIX);
    path.with_file_name(name)
}

/// Back up `path` once, then atomically replace its content.
pub fn commit(path: &Path, content: &str) -> Result<CommitOutcome, PatchError> {
    let mut outcome = CommitOutcome {
        backup: None,
        backed_up: false,
        created: false,
    };

    let permissions = match fs::metadata(path) {
        Ok(meta) => {
            if meta.permissions().readonly() {
                return Err(PatchError::io(path, "target is read-only"));
            }
            let backup = backup_path(path);
            if !backup.exists() {
                fs::copy(path, &backup)
                    .map_err(|e| PatchError::io(&backup, format!("backup failed: {}", e)))?;
                outcome.backed_up = true;
            }
            outcome.backup = Some(backup);
            Some(meta.permissions())
        }
        Err(_) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| PatchError::io(parent, e))?;
            }
            outcome.created = true;
            None
        }
    };

    write_atomic(path, content, permissions)?;
    Ok(outcome)
}

fn write_atomic(
    path: &Path,
    content: &str,
    permissions: Option<fs::Permissions>,
) -> Result<(), PatchError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.{}.mend-tmp", name, Uuid::new_v4().simple()));

    fs::write(&tmp_path, content).map_err(|e| PatchError::io(path, e))?;
    if let Some(perms) = permissions {
        let _ = fs::set_permissions(&tmp_path, perms);
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(PatchError::io(path, e));
    }
    Ok(())
}

/// Hex SHA-256 of `content`, used in reports.
pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/a/json_ffi_engine.cc")),
            PathBuf::from("/a/json_ffi_engine.cc.bak")
        );
    }

    #[test]
    fn first_commit_backs_up_original() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("a.py");
        fs::write(&target, "original").unwrap();

        let out = commit(&target, "patched").unwrap();
        assert!(out.backed_up);
        assert!(!out.created);
        assert_eq!(fs::read_to_string(&target).unwrap(), "patched");
        assert_eq!(fs::read_to_string(backup_path(&target)).unwrap(), "original");
    }

    #[test]
    fn second_commit_preserves_first_backup() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("a.py");
        fs::write(&target, "original").unwrap();

        commit(&target, "patched once").unwrap();
        let out = commit(&target, "patched twice").unwrap();
        assert!(!out.backed_up);
        assert_eq!(out.backup, Some(backup_path(&target)));
        assert_eq!(fs::read_to_string(backup_path(&target)).unwrap(), "original");
        assert_eq!(fs::read_to_string(&target).unwrap(), "patched twice");
    }

    #[test]
    fn creates_missing_target_without_backup() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("site/mlc_llm/cpp/engine.cc");

        let out = commit(&target, "fresh").unwrap();
        assert!(out.created);
        assert!(out.backup.is_none());
        assert_eq!(fs::read_to_string(&target).unwrap(), "fresh");
        assert!(!backup_path(&target).exists());
    }

    #[test]
    fn read_only_target_is_refused_untouched() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("ro.py");
        fs::write(&target, "original").unwrap();
        let mut perms = fs::metadata(&target).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&target, perms).unwrap();

        let err = commit(&target, "patched").unwrap_err();
        assert!(matches!(err, PatchError::Io { .. }));
        assert!(err.to_string().contains("read-only"));
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        assert!(!backup_path(&target).exists());
    }

    #[test]
    fn leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("a.py");
        fs::write(&target, "x").unwrap();
        commit(&target, "y").unwrap();
        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".mend-tmp")), "{:?}", names);
    }

    #[test]
    fn sha256_is_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
