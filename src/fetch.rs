//! Remote fallback for known-good replacement content.
//!
//! Used only when no local copy of a target's known-good source exists.
//! URLs are tried strictly in order, one blocking request each, with a
//! per-attempt timeout. Any failure (network error, timeout, non-2xx,
//! empty or non-UTF-8 body, scratch write error) moves on to the next URL.
//! Running out of URLs is [`PatchError::Absent`], a normal outcome.
//!
//! URLs may reference environment variables as `{env:NAME}`, e.g.
//! `https://raw.githubusercontent.com/{env:GITHUB_REPOSITORY}/main/x.cc`.
//! A URL whose variable is unset is skipped.

use mend_core::error::PatchError;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::FetchConfig;
use crate::narrate::{Event, Narrator};

/// A fetched known-good body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    pub url: String,
    pub body: String,
    /// Scratch copy; `None` when nothing was persisted.
    pub path: Option<PathBuf>,
}

/// Expand `{env:NAME}` placeholders. `None` if any variable is unset.
pub fn expand_url(template: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{env:") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 5..];
        let end = after.find('}')?;
        let value = lookup(&after[..end]).filter(|v| !v.is_empty())?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// Try each URL in order and return the first usable payload. With a
/// `scratch` dir it is also persisted as `<scratch>/fetched-<file_name>`.
pub fn fetch_first(
    urls: &[String],
    file_name: &str,
    config: &FetchConfig,
    scratch: Option<&Path>,
    narrator: &dyn Narrator,
) -> Result<FetchedSource, PatchError> {
    if urls.is_empty() {
        return Err(PatchError::absent("no remote URLs configured"));
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("mend/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PatchError::absent(format!("http client unavailable: {}", e)))?;

    for template in urls {
        let Some(url) = expand_url(template, |name| std::env::var(name).ok()) else {
            narrator.report(Event::FetchFailed {
                url: template.clone(),
                reason: "environment variable in URL is not set".to_string(),
            });
            continue;
        };

        narrator.report(Event::FetchAttempt { url: url.clone() });
        let body = match fetch_one(&client, &url) {
            Ok(body) => body,
            Err(reason) => {
                narrator.report(Event::FetchFailed { url, reason });
                continue;
            }
        };
        let path = match scratch.map(|dir| persist(dir, file_name, body.as_bytes())) {
            None => None,
            Some(Ok(path)) => Some(path),
            Some(Err(e)) => {
                narrator.report(Event::FetchFailed {
                    url,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        return Ok(FetchedSource { url, body, path });
    }

    Err(PatchError::absent("no source available from any remote URL"))
}

fn fetch_one(client: &reqwest::blocking::Client, url: &str) -> Result<String, String> {
    let response = client.get(url).send().map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status));
    }
    let bytes = response.bytes().map_err(|e| e.to_string())?;
    if bytes.is_empty() {
        return Err("empty response body".to_string());
    }
    String::from_utf8(bytes.to_vec()).map_err(|_| "response body is not valid UTF-8".to_string())
}

fn persist(scratch: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, PatchError> {
    std::fs::create_dir_all(scratch).map_err(|e| PatchError::io(scratch, e))?;
    let path = scratch.join(format!("fetched-{}", file_name));
    std::fs::write(&path, bytes).map_err(|e| PatchError::io(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrate::Recorder;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use tempfile::TempDir;

    /// Serve `responses` to consecutive connections, then stop.
    fn serve(responses: &[&'static [u8]]) -> String {
        let responses = responses.to_vec();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response);
            }
        });
        format!("http://{}", addr)
    }

    fn config() -> FetchConfig {
        FetchConfig {
            timeout_secs: 5,
            scratch_dir: None,
        }
    }

    #[test]
    fn expands_env_placeholders() {
        let lookup = |name: &str| (name == "GITHUB_REPOSITORY").then(|| "me/repo".to_string());
        assert_eq!(
            expand_url("https://raw.example/{env:GITHUB_REPOSITORY}/main/a.cc", lookup),
            Some("https://raw.example/me/repo/main/a.cc".to_string())
        );
        assert_eq!(expand_url("https://x/{env:UNSET}/a", lookup), None);
        assert_eq!(expand_url("https://x/plain", lookup), Some("https://x/plain".into()));
        assert_eq!(expand_url("https://x/{env:BROKEN", lookup), None);
    }

    #[test]
    fn no_urls_is_absent() {
        let tmp = TempDir::new().unwrap();
        let err =
            fetch_first(&[], "a.cc", &config(), Some(tmp.path()), &Recorder::new()).unwrap_err();
        assert!(matches!(err, PatchError::Absent(_)));
    }

    #[test]
    fn unreachable_urls_are_exhausted_in_order() {
        let tmp = TempDir::new().unwrap();
        let recorder = Recorder::new();
        let urls = vec![
            "http://127.0.0.1:9/a.cc".to_string(),
            "http://127.0.0.1:9/b.cc".to_string(),
        ];
        let err = fetch_first(&urls, "a.cc", &config(), Some(tmp.path()), &recorder).unwrap_err();
        assert!(!err.is_fatal());

        let failed: Vec<String> = recorder
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::FetchFailed { url, .. } => Some(url),
                _ => None,
            })
            .collect();
        assert_eq!(failed, urls);
    }

    #[test]
    fn falls_through_error_status_to_next_url() {
        let base = serve(&[
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nContent-Length: 12\r\nConnection: close\r\n\r\nknown good\r\n",
        ]);
        let tmp = TempDir::new().unwrap();
        let urls = vec![format!("{}/missing.cc", base), format!("{}/engine.cc", base)];

        let fetched =
            fetch_first(&urls, "engine.cc", &config(), Some(tmp.path()), &Recorder::new())
                .unwrap();
        assert_eq!(fetched.url, urls[1]);
        assert_eq!(fetched.body, "known good\r\n");
        let path = fetched.path.unwrap();
        assert_eq!(path, tmp.path().join("fetched-engine.cc"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "known good\r\n");
    }

    #[test]
    fn non_utf8_payload_falls_through() {
        let base = serve(&[
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n\xff\xfe",
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nclean",
        ]);
        let urls = vec![format!("{}/bad.cc", base), format!("{}/good.cc", base)];

        let recorder = Recorder::new();
        let fetched = fetch_first(&urls, "engine.cc", &config(), None, &recorder).unwrap();
        assert_eq!(fetched.url, urls[1]);
        assert_eq!(fetched.body, "clean");
        assert!(recorder.events().iter().any(|e| matches!(
            e,
            Event::FetchFailed { reason, .. } if reason.contains("UTF-8")
        )));
    }

    #[test]
    fn without_scratch_nothing_is_persisted() {
        let base = serve(&[
            b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbody",
        ]);
        let urls = vec![format!("{}/engine.cc", base)];
        let fetched = fetch_first(&urls, "engine.cc", &config(), None, &Recorder::new()).unwrap();
        assert_eq!(fetched.body, "body");
        assert!(fetched.path.is_none());
    }
}
