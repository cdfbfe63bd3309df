//! Configuration system for jobscout
//!
//! Configuration is read from an optional TOML file. Every section has defaults,
//! so a missing file yields a runnable configuration. Secrets are never stored in
//! the file: the file names the environment variables that hold them, and they
//! are resolved once into an explicit [`Credentials`] value.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct JobScoutConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub scrape: ScrapeSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub criteria: CriteriaSection,
}

/// LLM section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name (only "openai" is supported)
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable containing API key
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    /// API base URL
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Optional temperature (0.0 to 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    /// Optional max tokens
    pub max_tokens: Option<u32>,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_llm_key_env(),
            base_url: default_llm_base_url(),
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_temperature() -> Option<f32> {
    Some(0.7)
}

fn default_llm_timeout() -> u64 {
    120
}

/// Web search section (Serper API)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSection {
    /// Environment variable containing the search API key
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    /// Upper bound on results per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Country code passed as `gl`
    #[serde(default = "default_country")]
    pub country: String,
    /// Language code passed as `hl`
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            base_url: default_search_base_url(),
            max_results: default_max_results(),
            country: default_country(),
            language: default_language(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_search_key_env() -> String {
    "SERPER_API_KEY".to_string()
}

fn default_search_base_url() -> String {
    "https://google.serper.dev".to_string()
}

fn default_max_results() -> usize {
    10
}

fn default_country() -> String {
    "us".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

/// Website scrape section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeSection {
    /// Maximum accepted response body in bytes
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,
    /// Maximum characters of page text handed back to the model
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for ScrapeSection {
    fn default() -> Self {
        Self {
            max_response_size: default_max_response_size(),
            max_text_chars: default_max_text_chars(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_max_response_size() -> usize {
    2 * 1024 * 1024
}

fn default_max_text_chars() -> usize {
    20_000
}

/// Pipeline execution section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSection {
    /// Directory the stage artifacts and the CSV are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Upper bound on LLM round trips per stage
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
    /// Upper bound on operator-requested revisions of a gated stage
    #[serde(default = "default_max_revisions")]
    pub max_revisions: usize,
    /// Approval wait bound in seconds; absent means wait until answered or cancelled
    pub approval_timeout_secs: Option<u64>,
    /// Run the validator agent before deterministic schema enforcement
    #[serde(default = "default_true")]
    pub llm_validation: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_tool_iterations: default_max_tool_iterations(),
            max_revisions: default_max_revisions(),
            approval_timeout_secs: None,
            llm_validation: true,
        }
    }
}

impl PipelineSection {
    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_secs.map(Duration::from_secs)
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_tool_iterations() -> usize {
    12
}

fn default_max_revisions() -> usize {
    3
}

fn default_true() -> bool {
    true
}

/// Fixed search filters that are not prompted for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriteriaSection {
    #[serde(default = "default_positions")]
    pub positions: Vec<String>,
    #[serde(default = "default_conditions")]
    pub conditions: Vec<String>,
    #[serde(default = "default_qualifications")]
    pub qualifications: Vec<String>,
    #[serde(default = "default_skills")]
    pub skills: Vec<String>,
    #[serde(default = "default_excluded_positions")]
    pub excluded_positions: Vec<String>,
}

impl Default for CriteriaSection {
    fn default() -> Self {
        Self {
            positions: default_positions(),
            conditions: default_conditions(),
            qualifications: default_qualifications(),
            skills: default_skills(),
            excluded_positions: default_excluded_positions(),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn default_positions() -> Vec<String> {
    strings(&["Quant Researcher", "Data Science", "Data Analyst", "Consulting"])
}

fn default_conditions() -> Vec<String> {
    strings(&["internship", "associate"])
}

fn default_qualifications() -> Vec<String> {
    strings(&["Masters"])
}

fn default_skills() -> Vec<String> {
    strings(&["Python", "Math", "SQL", "Matlab", "Tableau", "PowerBi"])
}

fn default_excluded_positions() -> Vec<String> {
    strings(&["Marketing", "Sales", "HR"])
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Required secret is not set: environment variable {0} is missing or empty")]
    MissingSecret(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to load {path}: {message}")]
    DotEnv { path: PathBuf, message: String },
}

/// Secrets file read from the working directory
pub const DOTENV_FILE: &str = ".env";

/// Read `KEY=value` pairs from a dotenv file without touching the process
/// environment. A missing file yields an empty map.
pub fn load_dotenv(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    // The parser echoes the offending line, which may hold a secret
    let dotenv_err = |e: dotenvy::Error| ConfigError::DotEnv {
        path: path.to_path_buf(),
        message: match e {
            dotenvy::Error::LineParse(line, index) => {
                let name = line.split('=').next().unwrap_or_default().trim();
                format!("cannot parse entry '{name}' (error at index {index})")
            }
            other => other.to_string(),
        },
    };

    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => return Ok(HashMap::new()),
        Err(e) => return Err(dotenv_err(e)),
    };
    iter.map(|item| item.map_err(dotenv_err)).collect()
}

/// Look a secret up in `dotenv` first, then in the process environment
pub fn lookup_secret(dotenv: &HashMap<String, String>, name: &str) -> Option<String> {
    dotenv
        .get(name)
        .cloned()
        .or_else(|| std::env::var(name).ok())
}

/// Default config file locations, checked in order
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["jobscout.toml", "config/jobscout.toml"];

impl JobScoutConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: JobScoutConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the first default location that exists,
    /// else built-in defaults
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load_from_file(path)?, Some(path.to_path_buf())));
        }

        for candidate in DEFAULT_CONFIG_PATHS {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Ok((Self::load_from_file(&path)?, Some(path)));
            }
        }

        Ok((Self::default(), None))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.provider != "openai" {
            return Err(ConfigError::InvalidConfig(format!(
                "Unsupported LLM provider: {}",
                self.llm.provider
            )));
        }
        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidConfig(format!(
                    "llm.temperature must be between 0.0 and 2.0, got {temperature}"
                )));
            }
        }
        if self.pipeline.max_tool_iterations == 0 {
            return Err(ConfigError::InvalidConfig(
                "pipeline.max_tool_iterations must be at least 1".to_string(),
            ));
        }
        if self.search.max_results == 0 {
            return Err(ConfigError::InvalidConfig(
                "search.max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// API keys for the hosted services, resolved once at startup
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub llm_api_key: String,
    pub search_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_api_key", &"***")
            .field("search_api_key", &"***")
            .finish()
    }
}

impl Credentials {
    /// Resolve both secrets through `lookup`, failing on the first missing one
    pub fn resolve<F>(config: &JobScoutConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingSecret(name.to_string()))
        };

        Ok(Self {
            search_api_key: required(&config.search.api_key_env)?,
            llm_api_key: required(&config.llm.api_key_env)?,
        })
    }

    /// Resolve from `.env` in the working directory, then the process environment
    pub fn from_env(config: &JobScoutConfig) -> Result<Self, ConfigError> {
        Self::from_dotenv_file(config, Path::new(DOTENV_FILE))
    }

    /// Resolve from the given dotenv file, then the process environment
    pub fn from_dotenv_file(config: &JobScoutConfig, path: &Path) -> Result<Self, ConfigError> {
        let dotenv = load_dotenv(path)?;
        Self::resolve(config, |name| lookup_secret(&dotenv, name))
    }
}
