//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Taskweave configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub chains: ChainsConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding tasks.json, the memory namespace and chain logs.
    /// Resolved against the platform data dir when relative.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainsConfig {
    pub max_retries: u32,
    pub step_timeout_secs: u64,
    pub total_timeout_secs: u64,
    pub error_strategy: String,
    pub parallel_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    /// "current_execution" or "http"
    pub kind: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig { data_dir: None },
            chains: ChainsConfig {
                max_retries: 2,
                step_timeout_secs: 300,
                total_timeout_secs: 3600,
                error_strategy: "fail_fast".to_string(),
                parallel_enabled: true,
            },
            provider: ProviderConfig {
                api_key: None,
                kind: "current_execution".to_string(),
                model: "anthropic/claude-sonnet-4-20250514".to_string(),
                base_url: "https://openrouter.ai/api/v1".to_string(),
                temperature: 0.7,
                max_tokens: 8192,
                timeout_secs: 120,
            },
        }
    }
}

impl ProviderConfig {
    /// Resolve the API key from the environment.
    ///
    /// Keys are never stored in the config file; `TASKWEAVE_API_KEY` or
    /// `OPENROUTER_API_KEY` must be set for the HTTP provider kind.
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("TASKWEAVE_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                if key.len() <= 4 {
                    "***".to_string()
                } else {
                    let suffix = &key[key.len() - 4..];
                    format!("***{}", suffix)
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "Provider API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("TASKWEAVE_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("taskweave")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Resolve the data directory holding all persisted collections
    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }
        if let Ok(custom_dir) = env::var("TASKWEAVE_DATA_DIR") {
            return Ok(PathBuf::from(custom_dir));
        }
        Ok(dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?
            .join("taskweave"))
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            // Return default config without creating file
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.provider.enforce_env_only()?;

        match self.chains.error_strategy.as_str() {
            "fail_fast" | "continue_on_error" | "retry_on_error" | "skip_on_error" => {}
            other => {
                return Err(anyhow!(
                    "Unknown error strategy '{}'. Expected fail_fast, continue_on_error, retry_on_error or skip_on_error.",
                    other
                ));
            }
        }

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(anyhow!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.provider.temperature
            ));
        }

        Ok(())
    }
}
