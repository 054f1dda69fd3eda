use std::fmt;

/// Owner/name pair parsed from a GitHub repository URL.
/// Extracted by parse_repo_url() in repo/mod.rs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Normalized URL used as the history key, so `…/widget.git` and
    /// `…/widget/` land on the same entry.
    pub fn canonical_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Kind of a node in the git tree. Only blobs are ever fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Other,
}

/// One entry of the recursive tree listing, as returned by a single host call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the repository root (e.g., "src/main.rs")
    pub path: String,
    pub kind: EntryKind,
    /// Blob SHA, used to fetch content
    pub sha: String,
    /// Size in bytes, when the host reports one
    pub size: Option<u64>,
}

/// A fetched file with its content already decoded to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    pub path: String,
    pub content: String,
}

/// Tree listing plus the bounded set of files fetched for one analysis.
///
/// `tree` keeps host order; `files` keeps the order they were requested in,
/// which is whitelist priority rather than tree order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoSnapshot {
    pub tree: Vec<TreeEntry>,
    pub files: Vec<RepoFile>,
}

impl RepoSnapshot {
    /// Fetched content for `path`, if that file was selected.
    pub fn file_content(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.content.as_str())
    }
}
