//! Configuration file handling for shorts-relay.
//!
//! Loads configuration from `~/.config/shorts-relay/config.toml` or a custom
//! path. Secrets never live in this file; it only names the environment
//! variables they are read from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backdrop;
use crate::fallback::{Capability, Dimensions, FailurePolicy, ResolverSettings};
use crate::providers;

/// Configuration file structure for shorts-relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub chains: ChainsConfig,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderOverride>,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Provider order per capability. Order is tried front to back.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainsConfig {
    #[serde(default = "default_tts_chain")]
    pub tts: Vec<String>,
    #[serde(default = "default_image_search_chain")]
    pub image_search: Vec<String>,
    #[serde(default = "default_image_generate_chain")]
    pub image_generate: Vec<String>,
    #[serde(default = "default_text_generate_chain")]
    pub text_generate: Vec<String>,
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            tts: default_tts_chain(),
            image_search: default_image_search_chain(),
            image_generate: default_image_generate_chain(),
            text_generate: default_text_generate_chain(),
        }
    }
}

impl ChainsConfig {
    pub fn get(&self, capability: Capability) -> &[String] {
        match capability {
            Capability::Tts => &self.tts,
            Capability::ImageSearch => &self.image_search,
            Capability::ImageGenerate => &self.image_generate,
            Capability::TextGenerate => &self.text_generate,
        }
    }
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_tts_chain() -> Vec<String> {
    strings(&["elevenlabs", "groq", "openai", "gtts", "espeak"])
}

fn default_image_search_chain() -> Vec<String> {
    strings(&["pexels", "unsplash", "pixabay", "local"])
}

fn default_image_generate_chain() -> Vec<String> {
    strings(&["getimg", "openai", providers::SEARCH_STEP])
}

fn default_text_generate_chain() -> Vec<String> {
    strings(&["gemini", "openai", "groq", "openrouter"])
}

/// Optional per-provider settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct ProviderOverride {
    /// Credential variable names, in rotation order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Text generation model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Binary (espeak) or directory (local)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default)]
    pub policy: FailurePolicy,
    #[serde(default = "default_max_transient_strikes")]
    pub max_transient_strikes: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            policy: FailurePolicy::default(),
            max_transient_strikes: default_max_transient_strikes(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_secs: default_backoff_max_secs(),
        }
    }
}

impl ResolverConfig {
    pub fn settings(&self) -> ResolverSettings {
        ResolverSettings {
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            policy: self.policy,
            max_transient_strikes: self.max_transient_strikes.max(1),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
        }
    }
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_max_transient_strikes() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_secs() -> u64 {
    60
}

/// Settings for a pipeline run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobConfig {
    /// Where run directories are created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_question_prompt")]
    pub question_prompt: String,
    /// Used in turn, one per run, when every text provider fails
    #[serde(default = "default_questions")]
    pub default_questions: Vec<String>,
    #[serde(default = "default_background_query")]
    pub background_query: String,
    /// Used when every image provider fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_background: Option<PathBuf>,
    /// Top and bottom of the generated gradient, the last-resort background
    #[serde(default = "default_background_color")]
    pub background_color: String,
    #[serde(default = "default_secondary_color")]
    pub secondary_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            question_prompt: default_question_prompt(),
            default_questions: default_questions(),
            background_query: default_background_query(),
            fallback_background: None,
            background_color: default_background_color(),
            secondary_color: default_secondary_color(),
            voice: None,
            language: default_language(),
            width: default_width(),
            height: default_height(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl JobConfig {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Default question for the `run`th run. Rotates through the list.
    pub fn default_question(&self, run: usize) -> &str {
        let usable: Vec<&str> = self
            .default_questions
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .collect();
        if usable.is_empty() {
            return FALLBACK_QUESTION;
        }
        usable[run % usable.len()]
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from(".local/share"))
                .join("shorts-relay")
                .join("runs")
        })
    }
}

fn default_question_prompt() -> String {
    "Write one short, surprising general-knowledge trivia question for a \
     vertical video. Reply with the question only."
        .to_string()
}

const FALLBACK_QUESTION: &str = "Which country's flag is red and white with a maple leaf?";

fn default_questions() -> Vec<String> {
    strings(&[
        FALLBACK_QUESTION,
        "What animal is known as the 'King of the Jungle'?",
        "What is the capital of France?",
        "How many continents are there?",
        "What is the largest planet in our solar system?",
    ])
}

fn default_background_color() -> String {
    "#1a1a2e".to_string()
}

fn default_secondary_color() -> String {
    "#0f3460".to_string()
}

fn default_background_query() -> String {
    "abstract colorful background".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_width() -> u32 {
    1080
}

fn default_height() -> u32 {
    1920
}

fn default_max_tokens() -> u32 {
    150
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_cache_max_mb")]
    pub max_size_mb: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_size_mb: default_cache_max_mb(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_max_mb() -> u64 {
    500
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the default file doesn't exist.
    /// An explicit path that doesn't exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::read(path, true),
            None => Self::read(&default_path(), false),
        }
    }

    fn read(path: &Path, required: bool) -> Result<Self, ConfigError> {
        if !path.exists() {
            if required {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Check that every chain is usable before any job starts.
    ///
    /// Empty chains, unknown provider names and providers that don't serve
    /// the chain's capability are errors. So are settings no run could use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_values()?;
        for capability in Capability::ALL {
            let chain = self.chains.get(capability);
            if chain.is_empty() {
                return Err(ConfigError::EmptyChain(capability));
            }
            for name in chain {
                if capability == Capability::ImageGenerate && name == providers::SEARCH_STEP {
                    continue;
                }
                let info = providers::lookup(name).ok_or_else(|| ConfigError::UnknownProvider {
                    capability,
                    provider: name.clone(),
                })?;
                if !info.serves(capability) {
                    return Err(ConfigError::UnsupportedCapability {
                        capability,
                        provider: name.clone(),
                    });
                }
            }
        }
        for name in self.providers.keys() {
            if providers::lookup(name).is_none() {
                log::warn!("Ignoring settings for unknown provider '{}'", name);
            }
        }
        Ok(())
    }

    fn validate_values(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::InvalidValue {
            field,
            reason: reason.to_string(),
        };

        if self.resolver.call_timeout_secs == 0 {
            return Err(invalid("resolver.call_timeout_secs", "must be at least 1"));
        }
        if self.job.width == 0 || self.job.height == 0 {
            return Err(invalid("job.width/job.height", "must be non-zero"));
        }
        if self.job.default_questions.iter().all(|q| q.trim().is_empty()) {
            return Err(invalid("job.default_questions", "needs at least one question"));
        }
        for (field, value) in [
            ("job.background_color", &self.job.background_color),
            ("job.secondary_color", &self.job.secondary_color),
        ] {
            if backdrop::parse_hex_color(value).is_none() {
                return Err(invalid(field, "expected a #rrggbb color"));
            }
        }
        Ok(())
    }

    /// Serialize to TOML, for `config show` and `config init`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }

    /// Write the default configuration to `path`, refusing to overwrite.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        let content = Config::default().to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Errors that can occur when loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    SerializeError(toml::ser::Error),
    NotFound {
        path: PathBuf,
    },
    AlreadyExists {
        path: PathBuf,
    },
    EmptyChain(Capability),
    UnknownProvider {
        capability: Capability,
        provider: String,
    },
    UnsupportedCapability {
        capability: Capability,
        provider: String,
    },
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::SerializeError(e) => write!(f, "Failed to serialize config: {}", e),
            ConfigError::NotFound { path } => {
                write!(f, "Config file '{}' does not exist", path.display())
            }
            ConfigError::AlreadyExists { path } => {
                write!(f, "Config file '{}' already exists", path.display())
            }
            ConfigError::EmptyChain(capability) => {
                write!(f, "No providers configured for {}", capability)
            }
            ConfigError::UnknownProvider {
                capability,
                provider,
            } => write!(f, "Unknown provider '{}' in {} chain", provider, capability),
            ConfigError::UnsupportedCapability {
                capability,
                provider,
            } => write!(f, "Provider '{}' cannot serve {}", provider, capability),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::SerializeError(source) => Some(source),
            _ => None,
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("shorts-relay").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/shorts-relay/config.toml")
        })
}
