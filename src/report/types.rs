use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// High-level summary of what the repository is and how it is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptualAnalysis {
    pub title: String,
    pub description: String,
}

/// Suggestions grouped under one category (e.g., "Testing").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionGroup {
    pub category: String,
    pub suggestions: Vec<String>,
}

/// A single unit of work in the implementation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique within a plan. Models return either strings or integers here.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    pub description: String,
    /// Category of the suggestion this task addresses
    pub related_suggestion_category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePlan {
    pub title: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeStatus::Created => write!(f, "created"),
            ChangeStatus::Modified => write!(f, "modified"),
            ChangeStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// One file-level change proposed by the model. `content` is the full new
/// text of the file, and empty for deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeChange {
    pub file_path: String,
    pub status: ChangeStatus,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChanges {
    pub summary: String,
    pub changes: Vec<CodeChange>,
}

/// Synthetic commit record. Never corresponds to a real commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDetails {
    pub hash: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Everything produced for one repository.
///
/// Created once per successful analysis. Later steps extend it through
/// [`AnalysisResult::with_build`], which returns a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub conceptual_analysis: ConceptualAnalysis,
    pub improvement_suggestions: Vec<SuggestionGroup>,
    pub update_plan: UpdatePlan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_details: Option<CommitDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_changes: Option<ProposedChanges>,
}

impl AnalysisResult {
    pub fn with_build(&self, commit: CommitDetails, changes: ProposedChanges) -> AnalysisResult {
        AnalysisResult {
            commit_details: Some(commit),
            proposed_changes: Some(changes),
            ..self.clone()
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
    })
}
