//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PAGEWISE_*)
//! 2. TOML config file (if PAGEWISE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// What to do when another live process holds the run lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPolicy {
    /// Exit without touching the checkpoint.
    #[default]
    Abort,
    /// Log the contention and run anyway; the checkpoint still prevents
    /// reprocessing finished projects.
    Proceed,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PAGEWISE_*)
/// 2. TOML config file (if PAGEWISE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the OpenAI-compatible completion service.
    ///
    /// Set via PAGEWISE_COMPLETION_ENDPOINT environment variable.
    #[serde(default = "default_completion_endpoint")]
    pub completion_endpoint: String,

    /// Bearer token for the completion service.
    ///
    /// Set via PAGEWISE_API_KEY environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier sent with every completion request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Directory holding the numbered prompt template files.
    #[serde(default = "default_prompt_dir")]
    pub prompt_dir: PathBuf,

    /// Template file prefix; files are `{base}{n}.txt` for n in 1..=template_count.
    #[serde(default = "default_prompt_filename_base")]
    pub prompt_filename_base: String,

    /// Number of question templates applied to every page.
    #[serde(default = "default_template_count")]
    pub template_count: usize,

    /// Maximum number of projects processed concurrently.
    ///
    /// Set via PAGEWISE_MAX_CONCURRENT_PROJECTS environment variable.
    #[serde(default = "default_max_concurrent_projects")]
    pub max_concurrent_projects: usize,

    /// Maximum number of URLs fetched concurrently within one project.
    #[serde(default = "default_max_concurrent_urls")]
    pub max_concurrent_urls: usize,

    /// Directory holding the checkpoint and run lock.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Directory for per-fetch page cache files.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Directory for the CSV audit log.
    #[serde(default = "default_audit_log_dir")]
    pub audit_log_dir: PathBuf,

    /// Directory for merged result exports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// User-Agent string for page fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Page fetch and completion request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per page.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Fetch pages with a headless browser instead of plain HTTP.
    #[serde(default)]
    pub render_enabled: bool,

    /// Upper bound on the blocking worker pool used for disk and lock syscalls.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Behavior when the run lock is held by another live process.
    #[serde(default)]
    pub lock_policy: LockPolicy,

    /// Keep the checkpoint file after a fully successful run.
    #[serde(default)]
    pub keep_checkpoint: bool,
}

fn default_completion_endpoint() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_prompt_dir() -> PathBuf {
    PathBuf::from("./prompts")
}

fn default_prompt_filename_base() -> String {
    "prompt".into()
}

fn default_template_count() -> usize {
    5
}

fn default_max_concurrent_projects() -> usize {
    50
}

fn default_max_concurrent_urls() -> usize {
    4
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("./checkpoints")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./scraped_cache")
}

fn default_audit_log_dir() -> PathBuf {
    PathBuf::from("./pipeline_logs")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./results")
}

fn default_user_agent() -> String {
    "pagewise/0.1".into()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_worker_threads() -> usize {
    8
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            completion_endpoint: default_completion_endpoint(),
            api_key: None,
            model: default_model(),
            prompt_dir: default_prompt_dir(),
            prompt_filename_base: default_prompt_filename_base(),
            template_count: default_template_count(),
            max_concurrent_projects: default_max_concurrent_projects(),
            max_concurrent_urls: default_max_concurrent_urls(),
            checkpoint_dir: default_checkpoint_dir(),
            cache_dir: default_cache_dir(),
            audit_log_dir: default_audit_log_dir(),
            output_dir: default_output_dir(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            render_enabled: false,
            worker_threads: default_worker_threads(),
            lock_policy: LockPolicy::Abort,
            keep_checkpoint: false,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PAGEWISE_`
    /// 2. TOML file from `PAGEWISE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PAGEWISE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PAGEWISE_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Check if the completion API key is available (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the API key is not set.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "api_key".into(),
            hint: "Set PAGEWISE_API_KEY environment variable".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.cache_dir, PathBuf::from("./scraped_cache"));
        assert_eq!(config.checkpoint_dir, PathBuf::from("./checkpoints"));
        assert_eq!(config.template_count, 5);
        assert_eq!(config.max_concurrent_projects, 50);
        assert_eq!(config.max_concurrent_urls, 4);
        assert_eq!(config.lock_policy, LockPolicy::Abort);
        assert!(!config.render_enabled);
        assert!(!config.keep_checkpoint);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(60_000));
    }

    #[test]
    fn test_require_api_key_missing() {
        let config = AppConfig::default();
        let result = config.require_api_key();
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_require_api_key_present() {
        let config = AppConfig { api_key: Some("test-key".into()), ..Default::default() };
        assert_eq!(config.require_api_key().unwrap(), "test-key");
    }

    #[test]
    fn test_lock_policy_from_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("pagewise.toml", "lock_policy = \"proceed\"\nmax_concurrent_projects = 3\n")?;
            jail.set_env("PAGEWISE_CONFIG_FILE", "pagewise.toml");
            jail.set_env("PAGEWISE_MODEL", "lbl/llama");

            let config = AppConfig::load().expect("config loads");
            assert_eq!(config.lock_policy, LockPolicy::Proceed);
            assert_eq!(config.max_concurrent_projects, 3);
            assert_eq!(config.model, "lbl/llama");
            Ok(())
        });
    }
}
