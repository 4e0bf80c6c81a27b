//! Artifact provider access.
//!
//! [`ArtifactSource`] is the seam between the polling runtime and the
//! provider; [`GithubSource`] talks to the GitHub Actions artifacts API.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use artisync_core::{ArtifactVersion, Job, Secrets, Token};
use artisync_sync::atomic;

use crate::error::{io_err, DaemonError};

pub const GITHUB_API: &str = "https://api.github.com";
pub const GITHUB_API_VERSION: &str = "2022-11-28";
const ACCEPT: &str = "application/vnd.github+json";
const PAGE_SIZE: &str = "100";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where artifact versions come from.
pub trait ArtifactSource: Send + Sync {
    /// Newest usable version of the job's artifact, if any.
    fn latest(&self, job: &Job) -> Result<Option<ArtifactVersion>, DaemonError>;

    /// Store the package of `version` at `dest`, atomically. Returns the
    /// number of bytes written.
    fn download(
        &self,
        job: &Job,
        version: &ArtifactVersion,
        dest: &Path,
    ) -> Result<u64, DaemonError>;
}

/// Listing payload of `GET /repos/{owner}/{repo}/actions/artifacts`.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactList {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub artifacts: Vec<ArtifactVersion>,
}

/// The newest non-expired artifact called `name`.
pub fn select_latest(artifacts: Vec<ArtifactVersion>, name: &str) -> Option<ArtifactVersion> {
    artifacts
        .into_iter()
        .filter(|artifact| artifact.name == name && !artifact.expired)
        .max_by_key(|artifact| artifact.created_at)
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

pub struct GithubSource {
    agent: ureq::Agent,
    api_base: String,
    secrets: Secrets,
}

impl GithubSource {
    pub fn new(secrets: Secrets) -> Self {
        Self::with_api_base(secrets, GITHUB_API)
    }

    /// Point the source at another API root (GitHub Enterprise, tests).
    pub fn with_api_base(secrets: Secrets, api_base: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .user_agent(concat!("artisync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secrets,
        }
    }

    pub fn listing_url(&self, job: &Job) -> String {
        format!(
            "{}/repos/{}/{}/actions/artifacts",
            self.api_base, job.owner, job.repo
        )
    }

    fn token(&self, job: &Job) -> Result<&Token, DaemonError> {
        self.secrets
            .token_for(&job.owner)
            .ok_or_else(|| DaemonError::Transport(format!("no token for owner '{}'", job.owner)))
    }

    fn request(&self, url: &str, token: &Token) -> ureq::Request {
        self.agent
            .get(url)
            .set("Accept", ACCEPT)
            .set("Authorization", &format!("Bearer {}", token.expose()))
            .set("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }
}

impl ArtifactSource for GithubSource {
    fn latest(&self, job: &Job) -> Result<Option<ArtifactVersion>, DaemonError> {
        let token = self.token(job)?;
        let url = self.listing_url(job);
        let list: ArtifactList = self
            .request(&url, token)
            .query("name", &job.artifact_name)
            .query("per_page", PAGE_SIZE)
            .call()
            .map_err(|e| DaemonError::Transport(format!("list {url}: {e}")))?
            .into_json()
            .map_err(|e| DaemonError::Transport(format!("decode listing from {url}: {e}")))?;

        tracing::debug!(
            job = %job.key(),
            total = list.total_count,
            received = list.artifacts.len(),
            "artifact listing"
        );
        Ok(select_latest(list.artifacts, &job.artifact_name))
    }

    fn download(
        &self,
        job: &Job,
        version: &ArtifactVersion,
        dest: &Path,
    ) -> Result<u64, DaemonError> {
        let token = self.token(job)?;
        let url = &version.archive_download_url;
        let response = self
            .request(url, token)
            .call()
            .map_err(|e| DaemonError::Transport(format!("download {url}: {e}")))?;

        if let Some(dir) = dest.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let mut body = response.into_reader();
        atomic::replace_with(dest, &mut body)
            .map_err(|e| DaemonError::Transport(format!("download {url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artisync_core::Secret;
    use chrono::{TimeZone, Utc};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use tempfile::TempDir;

    fn version(id: i64, name: &str, secs: i64, expired: bool) -> ArtifactVersion {
        ArtifactVersion {
            id,
            name: name.to_string(),
            size_in_bytes: 0,
            archive_download_url: format!("https://example.invalid/{id}/zip"),
            expired,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn job() -> Job {
        Job {
            owner: "acme".into(),
            repo: "site".into(),
            artifact_name: "dist".into(),
            excludes: vec![],
            deploy_path: "/srv/site".into(),
        }
    }

    fn secrets() -> Secrets {
        [Secret {
            owner: "acme".into(),
            token: Token::new("ghp_test"),
        }]
        .into_iter()
        .collect()
    }

    /// Serve exactly one HTTP response; the handle yields the raw request.
    fn serve_once(status: &'static str, body: Vec<u8>) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (base, handle)
    }

    #[test]
    fn newest_matching_artifact_wins() {
        let picked = select_latest(
            vec![
                version(1, "dist", 100, false),
                version(2, "coverage", 500, false),
                version(3, "dist", 300, false),
                version(4, "dist", 200, false),
            ],
            "dist",
        )
        .unwrap();
        assert_eq!(picked.id, 3);
    }

    #[test]
    fn expired_and_foreign_artifacts_are_ignored() {
        let picked = select_latest(
            vec![version(1, "dist", 100, false), version(2, "dist", 900, true)],
            "dist",
        );
        assert_eq!(picked.map(|v| v.id), Some(1));
        assert!(select_latest(vec![version(1, "other", 1, false)], "dist").is_none());
        assert!(select_latest(vec![], "dist").is_none());
    }

    #[test]
    fn listing_sends_provider_headers_and_filters() {
        let body = br#"{"total_count":2,"artifacts":[
            {"id":7,"name":"dist","size_in_bytes":10,"archive_download_url":"http://x/7","expired":false,"created_at":"2024-05-01T12:00:00Z"},
            {"id":8,"name":"dist","size_in_bytes":10,"archive_download_url":"http://x/8","expired":false,"created_at":"2024-05-02T12:00:00Z"}
        ]}"#;
        let (base, server) = serve_once("200 OK", body.to_vec());

        let source = GithubSource::with_api_base(secrets(), format!("{base}/"));
        let latest = source.latest(&job()).unwrap().unwrap();
        assert_eq!(latest.id, 8);

        let request = server.join().unwrap().to_ascii_lowercase();
        assert!(request.starts_with(
            "get /repos/acme/site/actions/artifacts?name=dist&per_page=100 http/1.1"
        ));
        assert!(request.contains("accept: application/vnd.github+json"));
        assert!(request.contains("authorization: bearer ghp_test"));
        assert!(request.contains("x-github-api-version: 2022-11-28"));
    }

    #[test]
    fn http_error_is_a_transport_error() {
        let (base, server) = serve_once("404 Not Found", b"{}".to_vec());
        let source = GithubSource::with_api_base(secrets(), base);
        let err = source.latest(&job()).unwrap_err();
        assert!(matches!(err, DaemonError::Transport(_)), "got: {err}");
        server.join().unwrap();
    }

    #[test]
    fn unknown_owner_is_a_transport_error() {
        let source = GithubSource::new(Secrets::default());
        let err = source.latest(&job()).unwrap_err();
        assert!(matches!(err, DaemonError::Transport(msg) if msg.contains("acme")));
    }

    #[test]
    fn download_streams_package_to_destination() {
        let payload = b"PK\x03\x04 pretend archive".to_vec();
        let (base, server) = serve_once("200 OK", payload.clone());
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("artifacts").join("acme.site.dist.zip");

        let mut v = version(9, "dist", 1, false);
        v.archive_download_url = format!("{base}/repos/acme/site/actions/artifacts/9/zip");
        let written = GithubSource::with_api_base(secrets(), base)
            .download(&job(), &v, &dest)
            .unwrap();

        assert_eq!(written, payload.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), payload);
        let request = server.join().unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /repos/acme/site/actions/artifacts/9/zip"));
        assert!(request.contains("authorization: bearer ghp_test"));
    }
}
