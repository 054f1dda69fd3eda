use super::types::{EntryKind, TreeEntry};

/// Well-known manifests and entry points, highest priority first.
pub const IMPORTANT_FILES_WHITELIST: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "vite.config.ts",
    "webpack.config.js",
    ".eslintrc.json",
    "tailwind.config.js",
    "babel.config.js",
    "README.md",
    "Dockerfile",
    "docker-compose.yml",
    "pom.xml",
    "build.gradle",
    "settings.gradle",
    "requirements.txt",
    "Pipfile",
    "pyproject.toml",
    "Gemfile",
    "composer.json",
    "go.mod",
    "Cargo.toml",
    "src/index.tsx",
    "src/index.ts",
    "src/main.ts",
    "src/App.tsx",
    "src/main.rs",
    "src/lib.rs",
    "main.go",
    "main.py",
    "app.py",
];

pub const DEFAULT_MAX_FILES: usize = 10;
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 100_000;

/// Bounds applied when choosing which blobs to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionLimits {
    /// Hard cap on the number of files selected
    pub max_files: usize,
    /// Files at or above this size are skipped, never truncated
    pub max_file_size_bytes: u64,
}

impl Default for SelectionLimits {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
        }
    }
}

/// Keep blob entries only, preserving host order.
pub fn blobs_only(tree: Vec<TreeEntry>) -> Vec<TreeEntry> {
    tree.into_iter()
        .filter(|entry| entry.kind == EntryKind::Blob)
        .collect()
}

/// Pick the files whose content is worth sending to the model.
///
/// Walks the whitelist in priority order. For each name, an exact path match
/// comes first, then any `…/{name}` match in tree order. Oversized entries are
/// skipped and the result is cut at `limits.max_files`.
pub fn select_files<'a>(blobs: &'a [TreeEntry], limits: &SelectionLimits) -> Vec<&'a TreeEntry> {
    select_with_whitelist(blobs, IMPORTANT_FILES_WHITELIST, limits)
}

pub fn select_with_whitelist<'a>(
    blobs: &'a [TreeEntry],
    whitelist: &[&str],
    limits: &SelectionLimits,
) -> Vec<&'a TreeEntry> {
    let mut taken = vec![false; blobs.len()];
    let mut selected = Vec::new();

    for name in whitelist {
        let suffix = format!("/{name}");
        let exact = blobs.iter().enumerate().filter(|(_, e)| e.path == *name);
        let nested = blobs
            .iter()
            .enumerate()
            .filter(|(_, e)| e.path.ends_with(&suffix));

        for (idx, entry) in exact.chain(nested) {
            if selected.len() >= limits.max_files {
                return selected;
            }
            if taken[idx] || !within_size(entry, limits) {
                continue;
            }
            taken[idx] = true;
            selected.push(entry);
        }
    }

    selected
}

fn within_size(entry: &TreeEntry, limits: &SelectionLimits) -> bool {
    entry
        .size
        .map_or(true, |size| size < limits.max_file_size_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(path: &str, size: u64) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            kind: EntryKind::Blob,
            sha: format!("sha-{path}"),
            size: Some(size),
        }
    }

    fn paths(selected: &[&TreeEntry]) -> Vec<String> {
        selected.iter().map(|e| e.path.clone()).collect()
    }

    #[test]
    fn test_blobs_only_drops_trees() {
        let mut dir = blob("src", 0);
        dir.kind = EntryKind::Other;
        let blobs = blobs_only(vec![dir, blob("src/main.rs", 10)]);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].path, "src/main.rs");
    }

    #[test]
    fn test_selection_follows_whitelist_order_not_tree_order() {
        let tree = vec![
            blob("Cargo.toml", 100),
            blob("README.md", 100),
            blob("package.json", 100),
            blob("src/other.rs", 100),
        ];
        let selected = select_files(&tree, &SelectionLimits::default());
        assert_eq!(paths(&selected), vec!["package.json", "README.md", "Cargo.toml"]);
    }

    #[test]
    fn test_selection_cap_keeps_first_in_priority_order() {
        let whitelist: Vec<String> = (0..20).map(|i| format!("file{i:02}.json")).collect();
        let whitelist_refs: Vec<&str> = whitelist.iter().map(String::as_str).collect();
        // Tree order is reversed relative to priority.
        let tree: Vec<TreeEntry> = whitelist.iter().rev().map(|p| blob(p, 10)).collect();

        let limits = SelectionLimits {
            max_files: 10,
            max_file_size_bytes: 1_000,
        };
        let selected = select_with_whitelist(&tree, &whitelist_refs, &limits);
        assert_eq!(selected.len(), 10);
        assert_eq!(paths(&selected), whitelist[..10].to_vec());
    }

    #[test]
    fn test_oversized_whitelisted_file_is_excluded() {
        let tree = vec![blob("package.json", 100_000), blob("README.md", 99_999)];
        let selected = select_files(&tree, &SelectionLimits::default());
        assert_eq!(paths(&selected), vec!["README.md"]);
    }

    #[test]
    fn test_exact_match_precedes_nested_match() {
        let tree = vec![
            blob("apps/web/package.json", 10),
            blob("package.json", 10),
        ];
        let selected = select_files(&tree, &SelectionLimits::default());
        assert_eq!(paths(&selected), vec!["package.json", "apps/web/package.json"]);
    }

    #[test]
    fn test_suffix_match_respects_path_boundary() {
        let tree = vec![blob("mypackage.json", 10), blob("src/main.rs", 10)];
        let selected = select_files(&tree, &SelectionLimits::default());
        assert_eq!(paths(&selected), vec!["src/main.rs"]);
    }

    #[test]
    fn test_entry_matching_two_names_is_taken_once() {
        // Matches both whitelist names.
        let tree = vec![blob("web/src/index.ts", 10)];
        let whitelist = ["src/index.ts", "index.ts"];
        let selected = select_with_whitelist(&tree, &whitelist, &SelectionLimits::default());
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_unknown_size_is_kept() {
        let mut entry = blob("go.mod", 0);
        entry.size = None;
        let tree = vec![entry];
        assert_eq!(select_files(&tree, &SelectionLimits::default()).len(), 1);
    }
}
