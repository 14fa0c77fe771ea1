//! Verifier: re-read paths and look for a post-condition marker.

use mend_core::marker::{count_residuals, find_marker};
use mend_core::report::{Verification, VerifyRole};
use std::path::{Path, PathBuf};

/// Re-open each path and scan it for markers and residual tokens.
/// Read failures are recorded on the entry, never returned.
pub fn verify_paths<'a>(
    paths: impl IntoIterator<Item = &'a PathBuf>,
    markers: &[String],
    residuals: &[String],
    role: VerifyRole,
) -> Vec<Verification> {
    paths
        .into_iter()
        .map(|path| verify_one(path, markers, residuals, role))
        .collect()
}

fn verify_one(path: &Path, markers: &[String], residuals: &[String], role: VerifyRole) -> Verification {
    let mut v = Verification {
        path: path.to_path_buf(),
        role,
        marker_found: None,
        residuals: Vec::new(),
        error: None,
    };
    match std::fs::read(path) {
        Ok(bytes) => {
            let content = String::from_utf8_lossy(&bytes);
            v.marker_found = find_marker(&content, markers).map(str::to_string);
            v.residuals = count_residuals(&content, residuals);
        }
        Err(e) => v.error = Some(e.to_string()),
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::commit;
    use std::fs;
    use tempfile::TempDir;

    fn markers() -> Vec<String> {
        vec!["MLCJSONFFIEngineForceLink_v1".into(), "jsonffi_contains_replacement".into()]
    }

    #[test]
    fn marker_round_trip_after_commit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("json_ffi_engine.cc");
        fs::write(&path, "int main() {}\n").unwrap();

        let before = verify_paths([&path], &markers(), &[], VerifyRole::Discovered);
        assert_eq!(before[0].marker_found, None);

        commit(&path, "// jsonffi_contains_replacement\nint main() {}\n").unwrap();
        let after = verify_paths([&path], &markers(), &[], VerifyRole::Written);
        assert_eq!(after[0].marker_found.as_deref(), Some("jsonffi_contains_replacement"));
        assert_eq!(after[0].role, VerifyRole::Written);
    }

    #[test]
    fn residuals_are_counted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bsv.py");
        fs::write(&path, "x = T.alloc_buffer((1,), \"bool\")\ny: \"bool\"\n").unwrap();
        let v = verify_paths([&path], &markers(), &["\"bool\"".to_string()], VerifyRole::Discovered);
        assert_eq!(v[0].residuals, vec![("\"bool\"".to_string(), 2)]);
        assert!(v[0].marker_found.is_none());
    }

    #[test]
    fn unreadable_path_is_recorded() {
        let missing = PathBuf::from("/no/such/file.cc");
        let v = verify_paths([&missing], &markers(), &[], VerifyRole::Discovered);
        assert!(v[0].error.is_some());
        assert!(v[0].marker_found.is_none());
    }
}
