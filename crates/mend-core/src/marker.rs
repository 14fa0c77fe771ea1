//! Post-condition oracle.
//!
//! A marker is a substring that exists only in corrected content. A file
//! counts as patched iff it contains at least one recognised variant.

/// First marker variant present in `content`, in configuration order.
pub fn find_marker<'a>(content: &str, markers: &'a [String]) -> Option<&'a str> {
    markers
        .iter()
        .find(|m| !m.is_empty() && content.contains(m.as_str()))
        .map(String::as_str)
}

/// Occurrences of each residual token that should be gone after a fix.
///
/// Only tokens that still occur are returned.
pub fn count_residuals(content: &str, residuals: &[String]) -> Vec<(String, usize)> {
    residuals
        .iter()
        .filter(|r| !r.is_empty())
        .filter_map(|r| {
            let n = content.matches(r.as_str()).count();
            (n > 0).then(|| (r.clone(), n))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_any_variant() {
        let markers = strings(&["jsonffi_contains_replacement", "MLCJSONFFIEngineForceLink_v1"]);
        let content = "extern \"C\" int MLCJSONFFIEngineForceLink_v1() { return 1; }";
        assert_eq!(
            find_marker(content, &markers),
            Some("MLCJSONFFIEngineForceLink_v1")
        );
    }

    #[test]
    fn prefers_configuration_order() {
        let markers = strings(&["b", "a"]);
        assert_eq!(find_marker("a b", &markers), Some("b"));
    }

    #[test]
    fn empty_marker_never_matches() {
        let markers = strings(&[""]);
        assert_eq!(find_marker("anything", &markers), None);
    }

    #[test]
    fn missing_marker() {
        let markers = strings(&["done[0] == 0"]);
        assert_eq!(find_marker("while T.Not(done[0]):", &markers), None);
    }

    #[test]
    fn residuals_only_report_present_tokens() {
        let residuals = strings(&["\"bool\"", "T.Not("]);
        let found = count_residuals("a = \"bool\"\nb = \"bool\"\n", &residuals);
        assert_eq!(found, vec![("\"bool\"".to_string(), 2)]);
    }
}
