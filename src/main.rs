mod ai;
mod config;
mod orchestrator;
mod prompt;
mod repo;
mod report;
mod store;

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

use ai::GeminiClient;
use config::Config;
use orchestrator::{Orchestrator, Outcome};
use repo::GitHubClient;
use store::{CredentialStore, HistoryStore, LocalStore};

/// Repo Analyzer: fetches a bounded snapshot of a GitHub repository, asks an
/// AI model for an analysis and an implementation plan, and can simulate
/// implementing that plan.
#[derive(Parser, Debug)]
#[command(name = "repo-analyzer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one or more repositories (e.g., https://github.com/org/repo)
    Analyze {
        #[arg(required = true)]
        repo_urls: Vec<String>,

        /// Generate code changes for the plan and review them
        #[arg(long)]
        implement: bool,

        /// Confirm proposed changes without prompting
        #[arg(short, long, requires = "implement")]
        yes: bool,

        /// Optional output file path for a markdown report (single repository only)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Save the GitHub access token used for API requests
    Token {
        #[arg(required_unless_present = "clear")]
        token: Option<String>,

        /// Remove the saved token
        #[arg(long, conflicts_with = "token")]
        clear: bool,
    },

    /// List saved analyses
    History {
        /// Show the saved analysis for a repository URL
        #[arg(long, value_name = "URL")]
        show: Option<String>,

        /// Delete all saved analyses
        #[arg(long, conflicts_with = "show")]
        clear: bool,

        /// Write the shown analysis as markdown instead of printing it
        #[arg(short, long, requires = "show")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = Config::load()?;
    let store = Arc::new(open_store(&config));
    let credentials =
        CredentialStore::new(store.clone()).with_fallback(config.github.token.clone());

    match cli.command {
        Command::Token { token, clear } => {
            if clear {
                credentials.clear()?;
                println!("GitHub token cleared.");
            } else if let Some(token) = token {
                credentials.save(&token)?;
                println!("GitHub token saved.");
            }
            Ok(())
        }
        Command::History {
            show,
            clear,
            output,
        } => {
            // Never calls the generation service, so no key is required.
            let generator = GeminiClient::new(
                config.generation.api_key.clone().unwrap_or_default(),
                config.generation_base_url(),
                config.generation_model(),
            );
            let orch = build_orchestrator(&config, store, credentials, generator);
            if clear {
                orch.clear_history()?;
                println!("History cleared.");
            } else if let Some(url) = show {
                let result = orch.open_history(&url)?;
                let built = report::Report {
                    repo_url: &url,
                    result: &result,
                    originals: None,
                };
                report::output(&built, output.as_deref())?;
            } else {
                report::print_history(&orch.history());
            }
            Ok(())
        }
        Command::Analyze {
            repo_urls,
            implement,
            yes,
            output,
        } => {
            if output.is_some() && repo_urls.len() > 1 {
                return Err("--output can only be used with a single repository URL".into());
            }
            let generator = GeminiClient::new(
                config.generation_api_key()?,
                config.generation_base_url(),
                config.generation_model(),
            )
            .with_temperature(config.generation.temperature);
            let orch = build_orchestrator(&config, store, credentials, generator);

            let mut failures = 0;
            for repo_url in &repo_urls {
                orch.new_analysis();
                let run = Run {
                    orch: &orch,
                    implement,
                    yes,
                    output: output.as_deref(),
                };
                let span = info_span!("repo_analyze", repo_url = %repo_url);
                if let Err(e) = run.execute(repo_url).instrument(span).await {
                    let message = orch.last_error().unwrap_or_else(|| e.to_string());
                    error!(phase = %orch.phase(), "{message}");
                    eprintln!("{repo_url}: {message}");
                    failures += 1;
                }
            }

            if failures > 0 {
                return Err(format!("{failures} of {} analyses failed", repo_urls.len()).into());
            }
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> LocalStore {
    match config.store_path() {
        Some(path) => LocalStore::open(path),
        None => {
            warn!("no config directory found; tokens and history will not be saved");
            LocalStore::in_memory()
        }
    }
}

fn build_orchestrator(
    config: &Config,
    store: Arc<LocalStore>,
    credentials: CredentialStore,
    generator: GeminiClient,
) -> Orchestrator {
    let source = GitHubClient::new(config.github_api_base(), config.selection_limits());
    Orchestrator::new(
        Arc::new(source),
        Arc::new(generator),
        credentials,
        HistoryStore::new(store),
    )
    .with_budget(config.prompt_budget())
    .with_build_delay(config.build_delay())
}

/// One repository's trip through analyze, optional implement, and output.
struct Run<'a> {
    orch: &'a Orchestrator,
    implement: bool,
    yes: bool,
    output: Option<&'a std::path::Path>,
}

impl Run<'_> {
    async fn execute(&self, repo_url: &str) -> Result<(), Box<dyn std::error::Error>> {
        info!("analyzing repository");
        let Outcome::Applied(analysis) = self.orch.analyze(repo_url).await? else {
            return Err("analysis was superseded".into());
        };
        info!(
            suggestions = analysis.improvement_suggestions.len(),
            tasks = analysis.update_plan.tasks.len(),
            "analysis complete"
        );

        if self.implement {
            info!("generating code changes");
            let Outcome::Applied(pending) = self.orch.implement().await? else {
                return Err("code generation was superseded".into());
            };
            let snapshot = self.orch.snapshot();
            report::print_review(&pending, snapshot.as_deref());

            if self.yes || ask_confirmation("Apply these changes?")? {
                info!("building");
                let Outcome::Applied(built) = self.orch.confirm().await? else {
                    return Err("build was superseded".into());
                };
                if let Some(commit) = &built.commit_details {
                    info!(commit = %commit.hash, "build successful");
                }
            } else {
                self.orch.cancel()?;
                info!("proposed changes discarded");
            }
        }

        let result = self.orch.result().ok_or("no analysis result available")?;
        let snapshot = self.orch.snapshot();
        let canonical = repo::parse_repo_url(repo_url)
            .map(|r| r.canonical_url())
            .unwrap_or_else(|_| repo_url.to_string());
        let built = report::Report {
            repo_url: &canonical,
            result: &result,
            originals: snapshot.as_deref(),
        };
        report::output(&built, self.output)?;
        debug!(phase = %self.orch.phase(), "done");
        Ok(())
    }
}

fn ask_confirmation(question: &str) -> std::io::Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
