pub mod phase;

pub use phase::Phase;

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::ai::{self, Generator};
use crate::prompt::{CommitSource, PromptBudget};
use crate::repo::{self, RepoSnapshot, RepoSource};
use crate::report::types::{AnalysisResult, CommitDetails, ProposedChanges};
use crate::store::{CredentialStore, HistoryItem, HistoryStore, StoreError};

pub const COMMIT_AUTHOR: &str = "AI Assistant <ai-assistant@repo-analyzer.dev>";
pub const DEFAULT_BUILD_DELAY: Duration = Duration::from_millis(4000);

const BUILD_STEPS: &[&str] = &[
    "Cloning repository conceptually...",
    "Analyzing project dependencies...",
    "Applying improvement patches virtually...",
    "Running conceptual unit tests...",
    "Performing static analysis...",
    "Finalizing build artifacts...",
];

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Rejected before any network call; the phase is unchanged.
    #[error("{0}")]
    InvalidInput(String),

    #[error("Cannot {action} while {phase}.")]
    InvalidTransition { action: &'static str, phase: Phase },

    /// An external call failed; the session is now in [`Phase::Error`].
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to a response once it came back.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Applied(T),
    /// The session moved on while the call was in flight.
    Discarded,
}

/// Changes awaiting the user's confirm/cancel decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBuild {
    pub changes: ProposedChanges,
    pub commit_message: String,
}

#[derive(Debug, Default)]
struct Session {
    phase: Phase,
    /// Bumped by every operation that starts an external call, and by resets
    epoch: u64,
    repo_url: Option<String>,
    snapshot: Option<Arc<RepoSnapshot>>,
    result: Option<AnalysisResult>,
    pending: Option<PendingBuild>,
    error: Option<String>,
}

impl Session {
    fn begin(&mut self, phase: Phase) -> u64 {
        self.epoch += 1;
        self.phase = phase;
        self.error = None;
        self.epoch
    }

    /// Whether a response for `ticket` may still be applied.
    fn expects(&self, ticket: u64, phase: Phase) -> bool {
        self.epoch == ticket && self.phase == phase
    }

    fn fail(&mut self, message: String) -> OrchestratorError {
        warn!(phase = %self.phase, error = %message, "pipeline step failed");
        self.phase = Phase::Error;
        self.error = Some(message.clone());
        OrchestratorError::Failed(message)
    }

    fn reject(&mut self, message: &str) -> OrchestratorError {
        self.error = Some(message.to_string());
        OrchestratorError::InvalidInput(message.to_string())
    }
}

/// Sequences fetch → analyze → generate changes → build for one session.
///
/// Methods take `&self`: session state lives behind a lock that is never held
/// across an await, so `new_analysis` can run while a call is pending. Each
/// pending call carries the epoch it started under and its response is
/// dropped if the epoch or phase no longer match.
pub struct Orchestrator {
    source: Arc<dyn RepoSource>,
    generator: Arc<dyn Generator>,
    credentials: CredentialStore,
    history: HistoryStore,
    budget: PromptBudget,
    build_delay: Duration,
    session: Mutex<Session>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn RepoSource>,
        generator: Arc<dyn Generator>,
        credentials: CredentialStore,
        history: HistoryStore,
    ) -> Self {
        Self {
            source,
            generator,
            credentials,
            history,
            budget: PromptBudget::default(),
            build_delay: DEFAULT_BUILD_DELAY,
            session: Mutex::new(Session::default()),
        }
    }

    pub fn with_budget(mut self, budget: PromptBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = delay;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn result(&self) -> Option<AnalysisResult> {
        self.lock().result.clone()
    }

    pub fn snapshot(&self) -> Option<Arc<RepoSnapshot>> {
        self.lock().snapshot.clone()
    }

    pub fn history(&self) -> Vec<HistoryItem> {
        self.history.load()
    }

    /// Fetch the repository and ask for its analysis.
    #[instrument(skip(self))]
    pub async fn analyze(&self, repo_url: &str) -> Result<Outcome<AnalysisResult>, OrchestratorError> {
        let input = repo_url.trim();
        let (ticket, token, key) = {
            let mut session = self.lock();
            if !session.phase.accepts_analyze() {
                return Err(OrchestratorError::InvalidTransition {
                    action: "analyze",
                    phase: session.phase,
                });
            }
            if input.is_empty() {
                return Err(session.reject("Please enter a valid GitHub repository URL."));
            }
            let Some(token) = self.credentials.token() else {
                return Err(session.reject(
                    "Please save a GitHub access token before analyzing a repository.",
                ));
            };

            let key = repo::parse_repo_url(input)
                .map(|r| r.canonical_url())
                .unwrap_or_else(|_| input.to_string());
            let ticket = session.begin(Phase::Fetching);
            session.repo_url = Some(key.clone());
            session.snapshot = None;
            session.result = None;
            session.pending = None;
            (ticket, token, key)
        };

        info!("fetching repository contents");
        let fetched = self.source.fetch(input, &token).await;

        let snapshot = {
            let mut session = self.lock();
            if !session.expects(ticket, Phase::Fetching) {
                warn!(ticket, "discarding stale fetch response");
                return Ok(Outcome::Discarded);
            }
            match fetched {
                Ok(snapshot) => {
                    let snapshot = Arc::new(snapshot);
                    session.snapshot = Some(snapshot.clone());
                    session.phase = Phase::Analyzing;
                    snapshot
                }
                Err(e) => return Err(session.fail(format!("Failed to analyze repository. {e}"))),
            }
        };

        info!(files = snapshot.files.len(), tree = snapshot.tree.len(), "requesting analysis");
        let analyzed =
            ai::analyze_repository(self.generator.as_ref(), &key, &snapshot, &self.budget).await;

        let result = {
            let mut session = self.lock();
            if !session.expects(ticket, Phase::Analyzing) {
                warn!(ticket, "discarding stale analysis response");
                return Ok(Outcome::Discarded);
            }
            match analyzed {
                Ok(result) => {
                    session.result = Some(result.clone());
                    session.phase = Phase::Results;
                    result
                }
                Err(e) => return Err(session.fail(format!("Failed to analyze repository. {e}"))),
            }
        };

        self.record_history(&key, &result);
        Ok(Outcome::Applied(result))
    }

    /// Ask for file changes implementing the plan, then a commit message for them.
    #[instrument(skip(self))]
    pub async fn implement(&self) -> Result<Outcome<PendingBuild>, OrchestratorError> {
        let (ticket, key, snapshot, plan) = {
            let mut session = self.lock();
            if session.phase != Phase::Results {
                return Err(OrchestratorError::InvalidTransition {
                    action: "implement",
                    phase: session.phase,
                });
            }
            let plan = session.result.as_ref().map(|r| r.update_plan.clone());
            let (Some(key), Some(snapshot), Some(plan)) =
                (session.repo_url.clone(), session.snapshot.clone(), plan)
            else {
                return Err(session.reject(
                    "Repository contents are not loaded; run the analysis again to implement its plan.",
                ));
            };
            let ticket = session.begin(Phase::GeneratingChanges);
            (ticket, key, snapshot, plan)
        };

        info!(tasks = plan.tasks.len(), "requesting code changes");
        let generated =
            ai::generate_code_changes(self.generator.as_ref(), &key, &snapshot.files, &plan).await;

        let changes = {
            let mut session = self.lock();
            if !session.expects(ticket, Phase::GeneratingChanges) {
                warn!(ticket, "discarding stale code-change response");
                return Ok(Outcome::Discarded);
            }
            match generated {
                Ok(changes) => changes,
                Err(e) => return Err(session.fail(format!("Failed to generate code changes. {e}"))),
            }
        };

        let source = if changes.summary.trim().is_empty() {
            CommitSource::Tasks(&plan.tasks)
        } else {
            CommitSource::Summary(&changes.summary)
        };
        let message = ai::generate_commit_message(self.generator.as_ref(), source).await;

        let mut session = self.lock();
        if !session.expects(ticket, Phase::GeneratingChanges) {
            warn!(ticket, "discarding stale commit-message response");
            return Ok(Outcome::Discarded);
        }
        let commit_message = match message {
            Ok(message) => message,
            Err(e) => return Err(session.fail(format!("Failed to generate commit message. {e}"))),
        };
        let pending = PendingBuild {
            changes,
            commit_message,
        };
        session.pending = Some(pending.clone());
        session.phase = Phase::ReviewingChanges;
        Ok(Outcome::Applied(pending))
    }

    /// Accept the reviewed changes and run the simulated build.
    #[instrument(skip(self))]
    pub async fn confirm(&self) -> Result<Outcome<AnalysisResult>, OrchestratorError> {
        let (ticket, pending) = {
            let mut session = self.lock();
            if session.phase != Phase::ReviewingChanges {
                return Err(OrchestratorError::InvalidTransition {
                    action: "confirm",
                    phase: session.phase,
                });
            }
            let Some(pending) = session.pending.take() else {
                return Err(session.reject("There are no proposed changes to confirm."));
            };
            (session.begin(Phase::Building), pending)
        };

        let step_delay = self.build_delay / BUILD_STEPS.len() as u32;
        for step in BUILD_STEPS {
            info!("{step}");
            tokio::time::sleep(step_delay).await;
        }

        let (key, result) = {
            let mut session = self.lock();
            if !session.expects(ticket, Phase::Building) {
                warn!(ticket, "discarding stale build");
                return Ok(Outcome::Discarded);
            }
            let (Some(key), Some(current)) = (session.repo_url.clone(), session.result.clone())
            else {
                return Err(session.fail("The analysis result is no longer available.".to_string()));
            };
            let commit = CommitDetails {
                hash: short_hash(),
                author: COMMIT_AUTHOR.to_string(),
                timestamp: Utc::now(),
                message: pending.commit_message,
            };
            let result = current.with_build(commit, pending.changes);
            session.result = Some(result.clone());
            session.phase = Phase::Results;
            (key, result)
        };

        info!("Build successful.");
        self.record_history(&key, &result);
        Ok(Outcome::Applied(result))
    }

    /// Drop the proposed changes and go back to the unchanged result.
    pub fn cancel(&self) -> Result<(), OrchestratorError> {
        let mut session = self.lock();
        if session.phase != Phase::ReviewingChanges {
            return Err(OrchestratorError::InvalidTransition {
                action: "cancel",
                phase: session.phase,
            });
        }
        session.pending = None;
        session.phase = Phase::Results;
        debug!("proposed changes discarded");
        Ok(())
    }

    /// Reset to idle from any phase. Responses still in flight are ignored.
    pub fn new_analysis(&self) {
        let mut session = self.lock();
        if session.phase.is_busy() {
            debug!(phase = %session.phase, "abandoning in-flight request");
        }
        let epoch = session.epoch + 1;
        *session = Session {
            epoch,
            ..Session::default()
        };
    }

    /// Show a stored result. Implementing it requires a fresh analysis.
    pub fn open_history(&self, repo_url: &str) -> Result<AnalysisResult, OrchestratorError> {
        let input = repo_url.trim();
        let key = repo::parse_repo_url(input)
            .map(|r| r.canonical_url())
            .unwrap_or_else(|_| input.to_string());

        let mut session = self.lock();
        if !matches!(session.phase, Phase::Idle | Phase::Error | Phase::Results) {
            return Err(OrchestratorError::InvalidTransition {
                action: "open history",
                phase: session.phase,
            });
        }
        let Some(item) = self.history.find(&key) else {
            return Err(session.reject(&format!("No saved analysis for {key}.")));
        };
        session.begin(Phase::Results);
        session.repo_url = Some(item.repo_url);
        session.snapshot = None;
        session.pending = None;
        session.result = Some(item.result.clone());
        Ok(item.result)
    }

    pub fn clear_history(&self) -> Result<(), OrchestratorError> {
        self.history.clear()?;
        Ok(())
    }

    fn record_history(&self, repo_url: &str, result: &AnalysisResult) {
        if let Err(e) = self.history.upsert(repo_url, result) {
            warn!(error = %e, "failed to save history");
        }
    }
}

fn short_hash() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..7].to_string()
}
