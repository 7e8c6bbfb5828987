// src/config.rs

use crate::error::ExtractError;
use crate::reference::ReferenceData;
use serde::Deserialize;
use std::{fs, path::Path};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "lc_intake.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub reference: ReferenceSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    Ollama,
    Cliproxy,
    Remote,
    #[default]
    Heuristics,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub backend: LlmBackend,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_ollama")]
    pub ollama: Endpoint,
    #[serde(default = "default_cliproxy")]
    pub cliproxy: Endpoint,
    #[serde(default = "default_remote")]
    pub remote: Endpoint,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            max_chars: default_max_chars(),
            temperature: 0.0,
            ollama: default_ollama(),
            cliproxy: default_cliproxy(),
            remote: default_remote(),
        }
    }
}

impl LlmSection {
    /// Endpoint of the selected backend, `None` for heuristics.
    pub fn active_endpoint(&self) -> Option<&Endpoint> {
        match self.backend {
            LlmBackend::Ollama => Some(&self.ollama),
            LlmBackend::Cliproxy => Some(&self.cliproxy),
            LlmBackend::Remote => Some(&self.remote),
            LlmBackend::Heuristics => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub base_url: String,
    pub model: String,
}

fn default_max_chars() -> usize {
    12_000
}

fn default_ollama() -> Endpoint {
    Endpoint {
        base_url: "http://localhost:11434/v1".to_string(),
        model: "qwen3:8b".to_string(),
    }
}

fn default_cliproxy() -> Endpoint {
    Endpoint {
        base_url: "http://localhost:8317/v1".to_string(),
        model: "gemini-2.5-flash".to_string(),
    }
}

fn default_remote() -> Endpoint {
    Endpoint {
        base_url: "https://api.openai.com/v1".to_string(),
        model: "gpt-4o-mini".to_string(),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReferenceSection {
    /// TOML file replacing the built-in sanctions tables.
    pub tables: Option<String>,
}

impl ReferenceSection {
    pub fn load(&self) -> Result<ReferenceData, ExtractError> {
        match &self.tables {
            Some(path) => Ok(ReferenceData::load(path)?),
            None => Ok(ReferenceData::builtin()?),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ExtractError> {
        toml::from_str(content).map_err(|e| ExtractError::Config(e.to_string()))
    }

    /// Like [`Config::load`], but a missing file means all defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
