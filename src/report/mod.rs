pub mod diff;
pub mod types;

use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::orchestrator::PendingBuild;
use crate::repo::RepoSnapshot;
use crate::store::HistoryItem;
use diff::{DiffLine, LineKind};
use types::{AnalysisResult, ChangeStatus, CodeChange, CommitDetails, ProposedChanges};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// An analysis result together with what is needed to render it.
#[derive(Debug, Clone, Copy)]
pub struct Report<'a> {
    pub repo_url: &'a str,
    pub result: &'a AnalysisResult,
    /// Original file contents for diffing; absent for results loaded from history
    pub originals: Option<&'a RepoSnapshot>,
}

/// Output the report to terminal (default) or to a markdown file.
#[instrument(skip(report), fields(repo = report.repo_url))]
pub fn output(report: &Report<'_>, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            write_markdown_report(report, path)
        }
    }
}

/// Format and print the report to the terminal with colors.
///
/// Repository: https://github.com/acme/widget
///
/// ═══ Widget Service ═══
/// A small service that...
///
/// ═══ Improvement Suggestions ═══
/// [Testing]
///   • Add integration tests
/// ...
fn print_terminal_report(report: &Report<'_>) {
    let result = report.result;
    println!();
    println!("Repository: {}", report.repo_url.bold());
    println!();

    println!("═══ {} ═══", result.conceptual_analysis.title.bold());
    println!("{}", result.conceptual_analysis.description);
    println!();

    println!("═══ Improvement Suggestions ═══");
    if result.improvement_suggestions.is_empty() {
        println!("  No suggestions.");
    }
    for group in &result.improvement_suggestions {
        println!("[{}]", group.category.cyan().bold());
        for suggestion in &group.suggestions {
            println!("  • {suggestion}");
        }
    }
    println!();

    println!("═══ {} ═══", result.update_plan.title);
    for (i, task) in result.update_plan.tasks.iter().enumerate() {
        println!(
            "  {}. [{}] {} ({})",
            i + 1,
            task.id,
            task.title.bold(),
            task.related_suggestion_category.dimmed()
        );
        println!("     {}", task.description);
    }
    println!();

    if let Some(changes) = &result.proposed_changes {
        println!("═══ Applied Changes ═══");
        print_terminal_changes(changes, report.originals);
    }

    if let Some(commit) = &result.commit_details {
        println!("═══ Generated Commit ═══");
        print_terminal_commit(commit);
    }
}

/// Print the changes awaiting confirmation.
pub fn print_review(pending: &PendingBuild, originals: Option<&RepoSnapshot>) {
    println!();
    println!("═══ Review Proposed Changes ═══");
    print_terminal_changes(&pending.changes, originals);
    println!("Commit message:");
    for line in pending.commit_message.lines() {
        println!("    {}", line.yellow());
    }
    println!();
}

/// Print the saved analyses, newest first.
pub fn print_history(items: &[HistoryItem]) {
    if items.is_empty() {
        println!("No saved analyses.");
        return;
    }
    for item in items {
        let built = if item.result.commit_details.is_some() {
            " (built)".green().to_string()
        } else {
            String::new()
        };
        println!(
            "{}  {}  {}{}",
            item.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            item.repo_url.bold(),
            item.result.conceptual_analysis.title,
            built
        );
    }
}

fn print_terminal_changes(changes: &ProposedChanges, originals: Option<&RepoSnapshot>) {
    println!("{}", changes.summary);
    println!();
    for change in &changes.changes {
        println!("{} {}", colorize_status(change.status), change.file_path.bold());
        match change_diff(change, originals) {
            Some(lines) => {
                for line in &lines {
                    println!("{}", colorize_line(line));
                }
            }
            None => println!("  {}", "Original content not available.".dimmed()),
        }
        println!();
    }
}

fn print_terminal_commit(commit: &CommitDetails) {
    println!("commit {}", commit.hash.yellow());
    println!("Author: {}", commit.author);
    println!("Date:   {}", commit.timestamp.to_rfc2822());
    println!();
    for line in commit.message.lines() {
        println!("    {line}");
    }
    println!();
}

/// Write the report as a markdown file.
///
/// # Widget Service
/// **Repository:** https://github.com/acme/widget
///
/// ## Improvement Suggestions
/// ### Testing
/// - Add integration tests
fn write_markdown_report(report: &Report<'_>, path: &Path) -> Result<(), ReportError> {
    let result = report.result;
    let mut md = String::new();
    md.push_str(&format!("# {}\n\n", result.conceptual_analysis.title));
    md.push_str(&format!("**Repository:** {}\n\n", report.repo_url));
    md.push_str(&format!("{}\n\n", result.conceptual_analysis.description));

    md.push_str("## Improvement Suggestions\n\n");
    for group in &result.improvement_suggestions {
        md.push_str(&format!("### {}\n\n", group.category));
        for suggestion in &group.suggestions {
            md.push_str(&format!("- {suggestion}\n"));
        }
        md.push('\n');
    }

    md.push_str(&format!("## {}\n\n", result.update_plan.title));
    for (i, task) in result.update_plan.tasks.iter().enumerate() {
        md.push_str(&format!(
            "{}. **{}** ({}): {}\n",
            i + 1,
            task.title,
            task.related_suggestion_category,
            task.description
        ));
    }
    md.push('\n');

    if let Some(changes) = &result.proposed_changes {
        md.push_str("## Applied Changes\n\n");
        md.push_str(&format!("{}\n\n", changes.summary));
        for change in &changes.changes {
            md.push_str(&format!("### `{}` ({})\n\n", change.file_path, change.status));
            match change_diff(change, report.originals) {
                Some(lines) => {
                    md.push_str("```diff\n");
                    for line in &lines {
                        md.push_str(&format!("{}{}\n", line.prefix(), line.text));
                    }
                    md.push_str("```\n\n");
                }
                None => md.push_str("_Original content not available._\n\n"),
            }
        }
    }

    if let Some(commit) = &result.commit_details {
        md.push_str("## Generated Commit\n\n");
        md.push_str(&format!(
            "**Commit:** `{}` | **Author:** {} | **Date:** {}\n\n",
            commit.hash,
            commit.author,
            commit.timestamp.to_rfc3339()
        ));
        md.push_str(&format!("```\n{}\n```\n", commit.message));
    }

    std::fs::write(path, md)?;
    Ok(())
}

fn change_diff(change: &CodeChange, originals: Option<&RepoSnapshot>) -> Option<Vec<DiffLine>> {
    let original = originals.and_then(|s| s.file_content(&change.file_path));
    diff::diff_change(change, original)
}

fn colorize_status(status: ChangeStatus) -> colored::ColoredString {
    match status {
        ChangeStatus::Created => "CREATED".green().bold(),
        ChangeStatus::Modified => "MODIFIED".yellow().bold(),
        ChangeStatus::Deleted => "DELETED".red().bold(),
    }
}

fn colorize_line(line: &DiffLine) -> colored::ColoredString {
    let text = format!("{}{}", line.prefix(), line.text);
    match line.kind {
        LineKind::Added => text.green(),
        LineKind::Removed => text.red(),
        LineKind::Common => text.normal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::RepoFile;
    use chrono::Utc;
    use types::{ConceptualAnalysis, SuggestionGroup, Task, UpdatePlan};

    const URL: &str = "https://github.com/acme/widget";

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            conceptual_analysis: ConceptualAnalysis {
                title: "Widget Service".to_string(),
                description: "Serves widgets over HTTP.".to_string(),
            },
            improvement_suggestions: vec![SuggestionGroup {
                category: "Testing".to_string(),
                suggestions: vec!["Add integration tests".to_string()],
            }],
            update_plan: UpdatePlan {
                title: "Hardening Plan".to_string(),
                tasks: vec![Task {
                    id: "t1".to_string(),
                    title: "Add tests".to_string(),
                    description: "Cover the HTTP handlers".to_string(),
                    related_suggestion_category: "Testing".to_string(),
                }],
            },
            commit_details: None,
            proposed_changes: None,
        }
    }

    fn built_result() -> AnalysisResult {
        sample_result().with_build(
            CommitDetails {
                hash: "abc1234".to_string(),
                author: "AI Assistant <ai-assistant@repo-analyzer.dev>".to_string(),
                timestamp: Utc::now(),
                message: "test: cover handlers".to_string(),
            },
            ProposedChanges {
                summary: "Adds handler tests.".to_string(),
                changes: vec![
                    CodeChange {
                        file_path: "src/main.rs".to_string(),
                        status: ChangeStatus::Modified,
                        content: "fn main() {\n    serve();\n}".to_string(),
                    },
                    CodeChange {
                        file_path: "old.txt".to_string(),
                        status: ChangeStatus::Deleted,
                        content: String::new(),
                    },
                ],
            },
        )
    }

    fn snapshot() -> RepoSnapshot {
        RepoSnapshot {
            tree: vec![],
            files: vec![RepoFile {
                path: "src/main.rs".to_string(),
                content: "fn main() {\n}".to_string(),
            }],
        }
    }

    #[test]
    fn test_write_markdown_report() {
        let result = sample_result();
        let report = Report {
            repo_url: URL,
            result: &result,
            originals: None,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        write_markdown_report(&report, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# Widget Service"));
        assert!(content.contains("**Repository:** https://github.com/acme/widget"));
        assert!(content.contains("### Testing"));
        assert!(content.contains("- Add integration tests"));
        assert!(content.contains("1. **Add tests** (Testing)"));
        assert!(!content.contains("## Generated Commit"));
    }

    #[test]
    fn test_markdown_includes_diff_and_commit_after_build() {
        let result = built_result();
        let snapshot = snapshot();
        let report = Report {
            repo_url: URL,
            result: &result,
            originals: Some(&snapshot),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        output(&report, Some(&path)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("### `src/main.rs` (modified)"));
        assert!(content.contains("+     serve();"));
        assert!(content.contains("  fn main() {"));
        // old.txt was never fetched
        assert!(content.contains("_Original content not available._"));
        assert!(content.contains("**Commit:** `abc1234`"));
        assert!(content.contains("test: cover handlers"));
    }

    #[test]
    fn test_output_to_missing_directory_fails() {
        let result = sample_result();
        let report = Report {
            repo_url: URL,
            result: &result,
            originals: None,
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.md");
        assert!(matches!(
            output(&report, Some(&path)),
            Err(ReportError::FileWrite(_))
        ));
    }

    #[test]
    fn test_terminal_output_does_not_panic() {
        let result = built_result();
        let snapshot = snapshot();
        let report = Report {
            repo_url: URL,
            result: &result,
            originals: Some(&snapshot),
        };
        output(&report, None).unwrap();

        let pending = PendingBuild {
            changes: result.proposed_changes.clone().unwrap(),
            commit_message: "test: cover handlers".to_string(),
        };
        print_review(&pending, None);
        print_history(&[]);
    }
}
