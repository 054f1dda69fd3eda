pub mod schema;

pub use schema::{analysis_schema, code_change_schema};

use crate::repo::{RepoFile, RepoSnapshot, TreeEntry};
use crate::report::types::{Task, UpdatePlan};

pub const DEFAULT_MAX_TREE_ENTRIES: usize = 500;
pub const DEFAULT_MAX_FILE_CHARS: usize = 4000;

/// Ceilings applied while assembling the analysis prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBudget {
    /// Tree lines listed before the "... and K more files" marker
    pub max_tree_entries: usize,
    /// Characters of each file included; the rest is dropped silently
    pub max_file_chars: usize,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            max_tree_entries: DEFAULT_MAX_TREE_ENTRIES,
            max_file_chars: DEFAULT_MAX_FILE_CHARS,
        }
    }
}

/// What the commit message should describe.
#[derive(Debug, Clone, Copy)]
pub enum CommitSource<'a> {
    Tasks(&'a [Task]),
    Summary(&'a str),
}

/// Build the analysis prompt for a snapshot.
///
/// Pure: the same inputs always give the same bytes. Tree lines keep fetch
/// order and file blocks keep selection order.
pub fn build_analysis_prompt(repo_url: &str, snapshot: &RepoSnapshot, budget: &PromptBudget) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a world-class senior software architect and tech lead with deep expertise in \
         software design, code quality and developer tooling.\n",
    );
    prompt.push_str(&format!(
        "Analyze the GitHub repository located at: {repo_url}\n\n"
    ));
    prompt.push_str(
        "Base your analysis ONLY on the file structure and file contents provided below. \
         Do not assume the existence of code that is not shown.\n\n",
    );

    prompt.push_str("File Structure:\n");
    prompt.push_str(&format_tree(&snapshot.tree, budget.max_tree_entries));
    prompt.push('\n');

    prompt.push_str("Key File Contents:\n");
    if snapshot.files.is_empty() {
        prompt.push_str("(no key files were fetched)\n");
    }
    for file in &snapshot.files {
        prompt.push_str(&format_file_block(
            &file.path,
            truncate_chars(&file.content, budget.max_file_chars),
        ));
    }
    prompt.push('\n');

    prompt.push_str(
        "Generate a response in JSON format that conforms exactly to the provided schema:\n\
         1. conceptualAnalysis: a title and a description of the project's purpose, \
         architecture and tech stack as evidenced by the files above.\n\
         2. improvementSuggestions: suggestions grouped by category (for example \
         'Architecture', 'Performance', 'Security', 'Testing', 'Developer Experience'), \
         each concrete and tied to what the files show.\n\
         3. updatePlan: a title and an ordered list of tasks implementing the suggestions. \
         Every task needs a unique id, a title, a description, and the \
         relatedSuggestionCategory it addresses.\n",
    );
    prompt
}

/// Build the request for a single conventional commit message.
pub fn build_commit_message_prompt(source: CommitSource<'_>) -> String {
    let mut prompt = String::new();
    match source {
        CommitSource::Tasks(tasks) => {
            prompt.push_str(
                "You are an expert software engineer. Based on the following implementation tasks, \
                 create a single, well-formatted conventional commit message.\n\n",
            );
            prompt.push_str("Tasks:\n");
            for task in tasks {
                prompt.push_str(&format!(
                    "- {}: {} (Category: {})\n",
                    task.title, task.description, task.related_suggestion_category
                ));
            }
        }
        CommitSource::Summary(summary) => {
            prompt.push_str(
                "You are an expert software engineer. Based on the following summary of changes, \
                 create a single, well-formatted conventional commit message.\n\n",
            );
            prompt.push_str("Summary of changes:\n");
            prompt.push_str(summary.trim());
            prompt.push('\n');
        }
    }
    prompt.push_str(
        "\nUse a short subject line (type: description), a blank line, then a body listing the \
         key changes. Respond with the commit message only, without quotes or markdown fences.\n",
    );
    prompt
}

/// Build the code-change request. Files are included in full.
pub fn build_code_change_prompt(repo_url: &str, files: &[RepoFile], plan: &UpdatePlan) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "You are an expert software developer implementing an approved plan for the GitHub \
         repository at: {repo_url}\n\n"
    ));

    prompt.push_str("Current File Contents:\n");
    if files.is_empty() {
        prompt.push_str("(no files available)\n");
    }
    for file in files {
        prompt.push_str(&format_file_block(&file.path, &file.content));
    }
    prompt.push('\n');

    prompt.push_str(&format!("Implementation Plan: {}\n", plan.title));
    for task in &plan.tasks {
        prompt.push_str(&format!(
            "- [{}] {}: {} (Category: {})\n",
            task.id, task.title, task.description, task.related_suggestion_category
        ));
    }
    prompt.push('\n');

    prompt.push_str(
        "Produce the concrete file changes that implement this plan, as JSON conforming to the \
         provided schema:\n\
         - summary: one paragraph describing the overall change.\n\
         - changes: one entry per file, with filePath, status ('created', 'modified' or \
         'deleted') and content.\n\
         - content must be the COMPLETE new file text for created and modified files, and an \
         empty string for deleted files.\n\
         Only modify files shown above; create new files where the plan requires them.\n",
    );
    prompt
}

fn format_tree(tree: &[TreeEntry], max_entries: usize) -> String {
    let mut out = String::new();
    for entry in tree.iter().take(max_entries) {
        match entry.size {
            Some(size) => out.push_str(&format!("- {} ({} bytes)\n", entry.path, size)),
            None => out.push_str(&format!("- {}\n", entry.path)),
        }
    }
    if tree.len() > max_entries {
        out.push_str(&format!(
            "... and {} more files (tree truncated for brevity).\n",
            tree.len() - max_entries
        ));
    }
    out
}

fn format_file_block(path: &str, content: &str) -> String {
    format!("--- File: {path} ---\n{content}\n--- End of File: {path} ---\n")
}

/// First `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
