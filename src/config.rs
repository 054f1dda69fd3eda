use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::ai::gemini::{DEFAULT_MODEL, GEMINI_API_BASE};
use crate::orchestrator::DEFAULT_BUILD_DELAY;
use crate::prompt::PromptBudget;
use crate::repo::{SelectionLimits, GITHUB_API_BASE};
use crate::store::LocalStore;

const CONFIG_FILE: &str = ".repo-analyzer.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No generation API key configured. Set GEMINI_API_KEY or [generation] api_key in .repo-analyzer.toml.")]
    MissingApiKey,
}

/// Top-level configuration loaded from .repo-analyzer.toml.
///
/// All fields are optional; the tool works with zero config apart from an
/// API key for the generation service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// Used only when no token has been saved with `repo-analyzer token`.
    pub token: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Overrides the per-call temperature
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsConfig {
    pub max_files: Option<usize>,
    pub max_file_size_bytes: Option<u64>,
    pub max_tree_entries: Option<usize>,
    pub max_file_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildConfig {
    pub delay_ms: Option<u64>,
}

impl Config {
    /// Load configuration from .repo-analyzer.toml in the current directory,
    /// then fill unset credentials from the environment.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };
        Ok(config.with_env(|name| std::env::var(name).ok()))
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Fill `github.token` from GITHUB_TOKEN and `generation.api_key` from
    /// GEMINI_API_KEY, then API_KEY. File values take precedence.
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |name: &str| var(name).filter(|v| !v.trim().is_empty());
        if self.github.token.is_none() {
            self.github.token = non_blank("GITHUB_TOKEN");
        }
        if self.generation.api_key.is_none() {
            self.generation.api_key = non_blank("GEMINI_API_KEY").or_else(|| non_blank("API_KEY"));
        }
        self
    }

    pub fn github_api_base(&self) -> &str {
        self.github.api_base.as_deref().unwrap_or(GITHUB_API_BASE)
    }

    pub fn generation_api_key(&self) -> Result<&str, ConfigError> {
        self.generation
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn generation_base_url(&self) -> &str {
        self.generation.base_url.as_deref().unwrap_or(GEMINI_API_BASE)
    }

    pub fn generation_model(&self) -> &str {
        self.generation.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn selection_limits(&self) -> SelectionLimits {
        let defaults = SelectionLimits::default();
        SelectionLimits {
            max_files: self.limits.max_files.unwrap_or(defaults.max_files),
            max_file_size_bytes: self
                .limits
                .max_file_size_bytes
                .unwrap_or(defaults.max_file_size_bytes),
        }
    }

    pub fn prompt_budget(&self) -> PromptBudget {
        let defaults = PromptBudget::default();
        PromptBudget {
            max_tree_entries: self
                .limits
                .max_tree_entries
                .unwrap_or(defaults.max_tree_entries),
            max_file_chars: self.limits.max_file_chars.unwrap_or(defaults.max_file_chars),
        }
    }

    pub fn build_delay(&self) -> Duration {
        self.build
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BUILD_DELAY)
    }

    /// Configured store location, else the per-user default. `None` means
    /// no config directory could be found.
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store.path.clone().or_else(LocalStore::default_path)
    }
}
