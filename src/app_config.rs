use std::fmt;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings. The per-role model
/// selection is rewritten here on every successful model switch.

/// Logical inference role, bound to exactly one loaded model at a time
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    // @role: Speech recognition
    Asr,
    // @role: Word-level timestamp refinement
    ForcedAligner,
    // @role: Segment translation
    Translator,
    // @role: Dictionary lookups
    Lookup,
}

impl ModelRole {
    /// All roles, in pipeline order
    pub const ALL: [ModelRole; 4] = [
        ModelRole::Asr,
        ModelRole::ForcedAligner,
        ModelRole::Translator,
        ModelRole::Lookup,
    ];

    // @returns: Lowercase role identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asr => "asr",
            Self::ForcedAligner => "forced_aligner",
            Self::Translator => "translator",
            Self::Lookup => "lookup",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asr" => Ok(Self::Asr),
            "forced_aligner" => Ok(Self::ForcedAligner),
            "translator" => Ok(Self::Translator),
            "lookup" => Ok(Self::Lookup),
            _ => Err(anyhow!("Invalid model role: {}", s)),
        }
    }
}

/// Selected model id per role, persisted across restarts
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelSelection {
    /// ASR model id
    #[serde(default = "default_asr_model")]
    pub asr: String,

    /// Forced-aligner model id
    #[serde(default = "default_aligner_model")]
    pub forced_aligner: String,

    /// Translator model id
    #[serde(default = "default_translator_model")]
    pub translator: String,

    /// Lookup model id
    #[serde(default = "default_lookup_model")]
    pub lookup: String,
}

impl ModelSelection {
    /// Selected model id for a role
    pub fn get(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Asr => &self.asr,
            ModelRole::ForcedAligner => &self.forced_aligner,
            ModelRole::Translator => &self.translator,
            ModelRole::Lookup => &self.lookup,
        }
    }

    /// Replace the selected model id for a role
    pub fn set(&mut self, role: ModelRole, model_id: String) {
        match role {
            ModelRole::Asr => self.asr = model_id,
            ModelRole::ForcedAligner => self.forced_aligner = model_id,
            ModelRole::Translator => self.translator = model_id,
            ModelRole::Lookup => self.lookup = model_id,
        }
    }
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            asr: default_asr_model(),
            forced_aligner: default_aligner_model(),
            translator: default_translator_model(),
            lookup: default_lookup_model(),
        }
    }
}

/// HTTP server bind configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Log level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Source language code (ISO) assumed for transcripts when a request
    /// does not say otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,

    /// Target language code (ISO) for translation output
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Selected model per inference role
    #[serde(default)]
    pub models: ModelSelection,

    /// Seconds a finished job is retained before garbage collection
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,

    /// Bounded size of the lookup result cache
    #[serde(default = "default_lookup_cache_size")]
    pub lookup_cache_size: usize,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            source_language: None,
            target_language: default_target_language(),
            models: ModelSelection::default(),
            job_retention_secs: default_job_retention_secs(),
            lookup_cache_size: default_lookup_cache_size(),
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port must be non-zero"));
        }
        if self.target_language.trim().is_empty() {
            return Err(anyhow!("Target language must not be empty"));
        }
        if let Some(source) = &self.source_language {
            if source.trim().is_empty() {
                return Err(anyhow!("Source language must not be empty when set"));
            }
        }
        for role in ModelRole::ALL {
            if self.models.get(role).trim().is_empty() {
                return Err(anyhow!("No model selected for role '{}'", role));
            }
        }
        if self.lookup_cache_size == 0 {
            return Err(anyhow!("Lookup cache size must be at least 1"));
        }
        Ok(())
    }

    /// Load the configuration from a JSON file, creating a default file
    /// when none exists yet
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            info!("Created default configuration at {}", path.display());
            Ok(config)
        }
    }

    /// Persist the configuration atomically (temp file + rename)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = dir {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize configuration")?;

        let mut tmp = NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))
            .context("Failed to create temporary config file")?;
        tmp.write_all(content.as_bytes())
            .context("Failed to write configuration")?;
        tmp.persist(path)
            .with_context(|| format!("Failed to move config file into place: {}", path.display()))?;

        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8172
}

fn default_target_language() -> String {
    "ja".to_string()
}

fn default_job_retention_secs() -> u64 {
    600
}

fn default_lookup_cache_size() -> usize {
    256
}

fn default_asr_model() -> String {
    "qwen3-asr-1.7b".to_string()
}

fn default_aligner_model() -> String {
    "qwen3-forced-aligner-0.6b".to_string()
}

fn default_translator_model() -> String {
    "qwen3-1.7b".to_string()
}

fn default_lookup_model() -> String {
    "qwen3-1.7b".to_string()
}
