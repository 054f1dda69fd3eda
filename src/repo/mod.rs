pub mod select;
pub mod types;

pub use select::SelectionLimits;
pub use types::{EntryKind, RepoFile, RepoRef, RepoSnapshot, TreeEntry};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Branches tried, in order, when resolving the default branch.
const DEFAULT_BRANCHES: [&str; 2] = ["main", "master"];

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Invalid GitHub repository URL: {0}")]
    InvalidUrl(String),

    #[error("GitHub API request failed: Invalid token.")]
    Auth,

    #[error("GitHub API request failed: {0}")]
    NotFound(String),

    #[error("GitHub API request failed: {status}. {message}")]
    HostApi { status: StatusCode, message: String },

    #[error("GitHub API request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to decode content of {path}: {reason}")]
    Decode { path: String, reason: String },
}

/// Parse a GitHub repository URL into owner and name.
///
/// Expected format: https://github.com/{owner}/{repo}[.git][/anything]
pub fn parse_repo_url(url: &str) -> Result<RepoRef, RepoError> {
    let invalid = || RepoError::InvalidUrl(url.to_string());
    let parsed = reqwest::Url::parse(url.trim()).map_err(|_| invalid())?;

    if parsed.host_str() != Some("github.com") {
        return Err(invalid());
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(invalid)?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() < 2 {
        return Err(invalid());
    }

    let name = segments[1].strip_suffix(".git").unwrap_or(segments[1]);
    if name.is_empty() {
        return Err(invalid());
    }

    Ok(RepoRef {
        owner: segments[0].to_string(),
        name: name.to_string(),
    })
}

/// Anything that can produce a snapshot for a repository URL.
#[async_trait]
pub trait RepoSource: Send + Sync {
    async fn fetch(&self, repo_url: &str, token: &str) -> Result<RepoSnapshot, RepoError>;
}

#[derive(Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Deserialize)]
struct BranchCommit {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeNode>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeNode {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    size: Option<u64>,
}

impl From<TreeNode> for TreeEntry {
    fn from(node: TreeNode) -> Self {
        let kind = if node.kind == "blob" {
            EntryKind::Blob
        } else {
            EntryKind::Other
        };
        TreeEntry {
            path: node.path,
            kind,
            sha: node.sha,
            size: node.size,
        }
    }
}

#[derive(Deserialize)]
struct BlobResponse {
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

/// Fetches repository snapshots from the GitHub REST API.
pub struct GitHubClient {
    client: reqwest::Client,
    api_base: String,
    limits: SelectionLimits,
}

impl GitHubClient {
    pub fn new(api_base: impl Into<String>, limits: SelectionLimits) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            limits,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T, RepoError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", "repo-analyzer")
            .header("Accept", "application/vnd.github.v3+json")
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        debug!(%status, url, "GitHub API returned an error status");
        Err(match status {
            StatusCode::UNAUTHORIZED => RepoError::Auth,
            StatusCode::NOT_FOUND => RepoError::NotFound("Repository not found.".to_string()),
            _ => {
                let message = response
                    .json::<ApiMessage>()
                    .await
                    .map(|body| body.message)
                    .unwrap_or_else(|_| "Unknown error".to_string());
                RepoError::HostApi { status, message }
            }
        })
    }

    /// Try `main`, then `master`. Returns the branch name and its head commit.
    async fn resolve_default_branch(
        &self,
        repo: &RepoRef,
        token: &str,
    ) -> Result<(&'static str, String), RepoError> {
        for branch in DEFAULT_BRANCHES {
            let url = format!(
                "{}/repos/{}/{}/branches/{}",
                self.api_base, repo.owner, repo.name, branch
            );
            match self.get_json::<BranchResponse>(&url, token).await {
                Ok(found) => return Ok((branch, found.commit.sha)),
                Err(RepoError::NotFound(_)) => debug!(branch, "branch not found"),
                Err(err) => return Err(err),
            }
        }
        Err(RepoError::NotFound(
            "Could not find main or master branch.".to_string(),
        ))
    }

    async fn fetch_tree(
        &self,
        repo: &RepoRef,
        commit_sha: &str,
        token: &str,
    ) -> Result<Vec<TreeEntry>, RepoError> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, repo.owner, repo.name, commit_sha
        );
        let tree = self.get_json::<TreeResponse>(&url, token).await?;
        if tree.truncated {
            warn!(entries = tree.tree.len(), "GitHub truncated the tree listing");
        }
        Ok(tree.tree.into_iter().map(TreeEntry::from).collect())
    }

    async fn fetch_blob(
        &self,
        repo: &RepoRef,
        entry: &TreeEntry,
        token: &str,
    ) -> Result<RepoFile, RepoError> {
        let url = format!(
            "{}/repos/{}/{}/git/blobs/{}",
            self.api_base, repo.owner, repo.name, entry.sha
        );
        let blob = self.get_json::<BlobResponse>(&url, token).await?;
        let content = decode_blob(&entry.path, &blob)?;
        debug!(path = %entry.path, chars = content.chars().count(), "fetched blob");
        Ok(RepoFile {
            path: entry.path.clone(),
            content,
        })
    }
}

#[async_trait]
impl RepoSource for GitHubClient {
    /// Resolve the default branch, list its tree, pick the interesting files
    /// and download them one after another.
    #[instrument(skip(self, token))]
    async fn fetch(&self, repo_url: &str, token: &str) -> Result<RepoSnapshot, RepoError> {
        let repo = parse_repo_url(repo_url)?;

        let (branch, commit_sha) = self.resolve_default_branch(&repo, token).await?;
        debug!(branch, commit = %commit_sha, "resolved default branch");

        let tree = select::blobs_only(self.fetch_tree(&repo, &commit_sha, token).await?);
        let selected = select::select_files(&tree, &self.limits);
        debug!(blobs = tree.len(), selected = selected.len(), "selected files to fetch");

        let mut files = Vec::with_capacity(selected.len());
        for entry in selected {
            files.push(self.fetch_blob(&repo, entry, token).await?);
        }

        Ok(RepoSnapshot { tree, files })
    }
}

fn decode_blob(path: &str, blob: &BlobResponse) -> Result<String, RepoError> {
    match blob.encoding.as_str() {
        "utf-8" | "utf8" => Ok(blob.content.clone()),
        _ => {
            let compact: String = blob
                .content
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            let bytes = general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| RepoError::Decode {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_valid_repo_url() {
        let repo = parse_repo_url("https://github.com/acme/widget").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widget");
    }

    #[test]
    fn test_parse_repo_url_strips_git_suffix_and_extra_segments() {
        let repo = parse_repo_url("https://github.com/acme/widget.git").unwrap();
        assert_eq!(repo.name, "widget");
        let repo = parse_repo_url("https://github.com/acme/widget/tree/main/src").unwrap();
        assert_eq!(repo.to_string(), "acme/widget");
    }

    #[test]
    fn test_parse_invalid_repo_url() {
        assert!(matches!(parse_repo_url("not-a-url"), Err(RepoError::InvalidUrl(_))));
        assert!(parse_repo_url("https://gitlab.com/acme/widget").is_err());
        assert!(parse_repo_url("https://github.com/acme").is_err());
        assert!(parse_repo_url("https://github.com/").is_err());
    }

    #[test]
    fn test_decode_base64_blob_with_newlines() {
        let blob = BlobResponse {
            content: "aGVsbG8g\nd29ybGQ=\n".to_string(),
            encoding: "base64".to_string(),
        };
        assert_eq!(decode_blob("a.txt", &blob).unwrap(), "hello world");
    }

    #[test]
    fn test_decode_invalid_base64_is_error() {
        let blob = BlobResponse {
            content: "!!!".to_string(),
            encoding: "base64".to_string(),
        };
        assert!(matches!(
            decode_blob("a.txt", &blob),
            Err(RepoError::Decode { .. })
        ));
    }

    fn b64(text: &str) -> String {
        general_purpose::STANDARD.encode(text)
    }

    async fn mount_tree(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/git/trees/abc123"))
            .and(query_param("recursive", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": "abc123",
                "truncated": false,
                "tree": [
                    { "path": "src", "type": "tree", "sha": "t1" },
                    { "path": "src/main.rs", "type": "blob", "sha": "b1", "size": 40 },
                    { "path": "Cargo.toml", "type": "blob", "sha": "b2", "size": 20 },
                    { "path": "assets/big.bin", "type": "blob", "sha": "b3", "size": 500000 }
                ]
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/git/blobs/b1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": b64("fn main() {}\n"),
                "encoding": "base64"
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/git/blobs/b2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": b64("[package]\nname = \"widget\"\n"),
                "encoding": "base64"
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_snapshot_from_main_branch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/branches/main"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "main",
                "commit": { "sha": "abc123" }
            })))
            .mount(&server)
            .await;
        mount_tree(&server).await;

        let client = GitHubClient::new(server.uri(), SelectionLimits::default());
        let snapshot = client
            .fetch("https://github.com/acme/widget", "tok")
            .await
            .unwrap();

        assert_eq!(snapshot.tree.len(), 3);
        assert!(snapshot.tree.iter().all(|e| e.kind == EntryKind::Blob));
        let paths: Vec<&str> = snapshot.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["Cargo.toml", "src/main.rs"]);
        assert_eq!(snapshot.file_content("src/main.rs"), Some("fn main() {}\n"));
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_master() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/branches/main"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Branch not found" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/branches/master"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "master",
                "commit": { "sha": "abc123" }
            })))
            .mount(&server)
            .await;
        mount_tree(&server).await;

        let client = GitHubClient::new(server.uri(), SelectionLimits::default());
        let snapshot = client
            .fetch("https://github.com/acme/widget", "tok")
            .await
            .unwrap();
        assert_eq!(snapshot.files.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_without_default_branch_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GitHubClient::new(server.uri(), SelectionLimits::default());
        let err = client
            .fetch("https://github.com/acme/widget", "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound(ref m) if m.contains("main or master")));
    }

    #[tokio::test]
    async fn test_fetch_with_rejected_token_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })))
            .mount(&server)
            .await;

        let client = GitHubClient::new(server.uri(), SelectionLimits::default());
        let err = client
            .fetch("https://github.com/acme/widget", "bad")
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Auth));
    }

    #[tokio::test]
    async fn test_fetch_other_status_carries_upstream_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({ "message": "API rate limit exceeded" })),
            )
            .mount(&server)
            .await;

        let client = GitHubClient::new(server.uri(), SelectionLimits::default());
        let err = client
            .fetch("https://github.com/acme/widget", "tok")
            .await
            .unwrap_err();
        match err {
            RepoError::HostApi { status, message } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(message, "API rate limit exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_server_error_without_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let client = GitHubClient::new(server.uri(), SelectionLimits::default());
        let err = client
            .fetch("https://github.com/acme/widget", "tok")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::HostApi { status: StatusCode::INTERNAL_SERVER_ERROR, ref message }
                if message == "Unknown error"
        ));
    }

    #[tokio::test]
    async fn test_fetch_missing_tree_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/branches/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "main",
                "commit": { "sha": "abc123" }
            })))
            .mount(&server)
            .await;

        let client = GitHubClient::new(server.uri(), SelectionLimits::default());
        let err = client
            .fetch("https://github.com/acme/widget", "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound(ref m) if m == "Repository not found."));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = GitHubClient::new(server.uri(), SelectionLimits::default());
        let err = client.fetch("https://example.com/x/y", "tok").await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidUrl(_)));
    }
}
