pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::prompt::{self, CommitSource, PromptBudget};
use crate::repo::{RepoFile, RepoSnapshot};
use crate::report::types::{AnalysisResult, ChangeStatus, ProposedChanges, UpdatePlan};

const ANALYSIS_TEMPERATURE: f32 = 0.7;
const CODE_CHANGE_TEMPERATURE: f32 = 0.4;

/// Substrings that generation services use when a prompt is too long.
const CONTEXT_OVERFLOW_SIGNATURES: &[&str] = &[
    "exceeds the maximum",
    "maximum context length",
    "too many tokens",
];

/// One call to the generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Structured output schema; `None` asks for plain text
    pub schema: Option<Value>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Network(#[from] reqwest::Error),

    #[error("{message}")]
    Service { status: StatusCode, message: String },

    #[error("the response contained no text")]
    EmptyResponse,
}

/// The external text/JSON completion service.
/// Output is non-deterministic and may fail for any reason.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Name used in user-facing errors (e.g., "Gemini API")
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error(
        "The repository is too large for the AI to analyze. \
         The file structure and content exceeded the API's context size limit."
    )]
    ContextOverflow,

    #[error("Failed to get {what} from {service}: {source}")]
    Generation {
        what: &'static str,
        service: String,
        source: GenerationError,
    },

    #[error("Failed to get {what} from {service}: malformed response ({reason})")]
    MalformedResponse {
        what: &'static str,
        service: String,
        reason: String,
    },
}

fn is_context_overflow(message: &str) -> bool {
    let message = message.to_lowercase();
    CONTEXT_OVERFLOW_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

async fn call(
    generator: &dyn Generator,
    what: &'static str,
    request: GenerationRequest,
) -> Result<String, AiError> {
    debug!(what, prompt_chars = request.prompt.chars().count(), "sending generation request");
    generator.generate(&request).await.map_err(|source| {
        if is_context_overflow(&source.to_string()) {
            warn!(what, "generation rejected: context size exceeded");
            AiError::ContextOverflow
        } else {
            AiError::Generation {
                what,
                service: generator.name().to_string(),
                source,
            }
        }
    })
}

fn malformed(generator: &dyn Generator, what: &'static str, reason: impl Into<String>) -> AiError {
    AiError::MalformedResponse {
        what,
        service: generator.name().to_string(),
        reason: reason.into(),
    }
}

/// Parse model output as JSON, tolerating a surrounding ```json fence.
fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
}

fn validate_plan(plan: &UpdatePlan) -> Result<(), String> {
    let mut seen = HashSet::new();
    for task in &plan.tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(format!("duplicate task id '{}'", task.id));
        }
    }
    Ok(())
}

/// Ask for the conceptual analysis, suggestions and plan of a snapshot.
#[instrument(skip(generator, snapshot, budget), fields(files = snapshot.files.len(), tree = snapshot.tree.len()))]
pub async fn analyze_repository(
    generator: &dyn Generator,
    repo_url: &str,
    snapshot: &RepoSnapshot,
    budget: &PromptBudget,
) -> Result<AnalysisResult, AiError> {
    const WHAT: &str = "analysis";
    let request = GenerationRequest {
        prompt: prompt::build_analysis_prompt(repo_url, snapshot, budget),
        schema: Some(prompt::analysis_schema()),
        temperature: Some(ANALYSIS_TEMPERATURE),
    };
    let text = call(generator, WHAT, request).await?;

    let mut result: AnalysisResult =
        parse_json(&text).map_err(|e| malformed(generator, WHAT, e.to_string()))?;
    validate_plan(&result.update_plan).map_err(|reason| malformed(generator, WHAT, reason))?;

    // Build extensions are only ever added locally.
    result.commit_details = None;
    result.proposed_changes = None;
    Ok(result)
}

/// Ask for concrete file changes implementing `plan`.
#[instrument(skip(generator, files, plan), fields(files = files.len(), tasks = plan.tasks.len()))]
pub async fn generate_code_changes(
    generator: &dyn Generator,
    repo_url: &str,
    files: &[RepoFile],
    plan: &UpdatePlan,
) -> Result<ProposedChanges, AiError> {
    const WHAT: &str = "code changes";
    let request = GenerationRequest {
        prompt: prompt::build_code_change_prompt(repo_url, files, plan),
        schema: Some(prompt::code_change_schema()),
        temperature: Some(CODE_CHANGE_TEMPERATURE),
    };
    let text = call(generator, WHAT, request).await?;

    let mut changes: ProposedChanges =
        parse_json(&text).map_err(|e| malformed(generator, WHAT, e.to_string()))?;
    if changes.changes.iter().any(|c| c.file_path.trim().is_empty()) {
        return Err(malformed(generator, WHAT, "change with an empty file path"));
    }
    for change in &mut changes.changes {
        if change.status == ChangeStatus::Deleted {
            change.content.clear();
        }
    }
    debug!(changes = changes.changes.len(), "received proposed changes");
    Ok(changes)
}

/// Ask for a conventional commit message. The reply is used verbatim, trimmed.
#[instrument(skip(generator, source))]
pub async fn generate_commit_message(
    generator: &dyn Generator,
    source: CommitSource<'_>,
) -> Result<String, AiError> {
    const WHAT: &str = "commit message";
    let request = GenerationRequest {
        prompt: prompt::build_commit_message_prompt(source),
        schema: None,
        temperature: None,
    };
    let message = call(generator, WHAT, request).await?.trim().to_string();
    if message.is_empty() {
        return Err(malformed(generator, WHAT, "empty commit message"));
    }
    Ok(message)
}
