//! Server configuration.
//!
//! Grounded on `config.py`'s `read_config`/nested dict config surface and
//! the teacher's `Config::load`/`save` TOML pattern (`directories::ProjectDirs`
//! for the on-disk location, `toml` for the format). The original keeps one
//! big nested YAML; this keeps the same knobs (`§6` config knobs) as a typed
//! TOML structure instead, since every value here has a fixed shape per
//! session rather than a free-form plugin config blob.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Retry/backoff knobs shared by provider dials and control-plane calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Which provider family implementation each role resolves to.
    #[serde(default)]
    pub selected_module: SelectedModule,
    /// ASR provider connection settings.
    #[serde(default)]
    pub asr: AsrConfig,
    /// TTS provider connection settings.
    #[serde(default)]
    pub tts: TtsConfig,
    /// Dialogue model (LLM) settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Wake-word cache behavior.
    #[serde(default)]
    pub wakeup_words: WakeupWordsConfig,
    /// Device directory / control-plane client settings.
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            selected_module: SelectedModule::default(),
            asr: AsrConfig::default(),
            tts: TtsConfig::default(),
            llm: LlmConfig::default(),
            wakeup_words: WakeupWordsConfig::default(),
            control_plane: ControlPlaneConfig::default(),
        }
    }
}

/// `max_retries` / `retry_delay` / `timeout` config knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    6
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(self) -> crate::voice::retry::RetryPolicy {
        crate::voice::retry::RetryPolicy {
            max_attempts: self.max_retries,
            initial_delay: Duration::from_secs(self.retry_delay_secs),
            max_delay: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// `selected_module.{ASR,TTS,LLM,VAD}` — which family member a device uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedModule {
    #[serde(rename = "ASR", default = "default_selected_asr")]
    pub asr: String,
    #[serde(rename = "TTS", default = "default_selected_tts")]
    pub tts: String,
    #[serde(rename = "LLM", default = "default_selected_llm")]
    pub llm: String,
    #[serde(rename = "VAD", default = "default_selected_vad")]
    pub vad: String,
}

fn default_selected_asr() -> String {
    "local".to_string()
}

fn default_selected_tts() -> String {
    "http_chunked".to_string()
}

fn default_selected_llm() -> String {
    "openrouter".to_string()
}

fn default_selected_vad() -> String {
    "silero".to_string()
}

impl Default for SelectedModule {
    fn default() -> Self {
        Self {
            asr: default_selected_asr(),
            tts: default_selected_tts(),
            llm: default_selected_llm(),
            vad: default_selected_vad(),
        }
    }
}

/// ASR provider-specific auth and connection settings, feeding
/// [`crate::voice::provider_registry::AsrProviderConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsrConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub model: String,
}

impl AsrConfig {
    pub fn to_provider_config(&self, selected: &str) -> crate::voice::provider_registry::AsrProviderConfig {
        use crate::voice::provider_registry::AsrProviderConfig;
        match selected {
            "streaming_ws" => AsrProviderConfig::StreamingWs {
                endpoint: self.endpoint.clone(),
                api_key: self.api_key.clone(),
                model: self.model.clone(),
            },
            "http_oneshot" => AsrProviderConfig::HttpOneshot {
                endpoint: self.endpoint.clone(),
                api_key: self.api_key.clone(),
            },
            _ => AsrProviderConfig::Local,
        }
    }
}

/// TTS provider-specific auth, voice selection, and audio params
/// (`sample_rate`, `voice`, `format`, `volume`, `rate`, `pitch`), feeding
/// [`crate::voice::provider_registry::TtsProviderConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_output_format")]
    pub format: String,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_rate")]
    pub rate: f32,
    #[serde(default = "default_pitch")]
    pub pitch: f32,
}

fn default_voice() -> String {
    "longxiaochun".to_string()
}

fn default_output_format() -> String {
    "opus".to_string()
}

fn default_volume() -> f32 {
    1.0
}

fn default_rate() -> f32 {
    1.0
}

fn default_pitch() -> f32 {
    1.0
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            secret: String::new(),
            voice: default_voice(),
            format: default_output_format(),
            volume: default_volume(),
            rate: default_rate(),
            pitch: default_pitch(),
        }
    }
}

impl TtsConfig {
    pub fn to_provider_config(&self, selected: &str) -> crate::voice::provider_registry::TtsProviderConfig {
        use crate::voice::provider_registry::TtsProviderConfig;
        match selected {
            "streaming_ws" => TtsProviderConfig::StreamingWs {
                endpoint: self.endpoint.clone(),
                api_key: self.api_key.clone(),
                voice: self.voice.clone(),
            },
            _ => TtsProviderConfig::HttpChunked {
                endpoint: self.endpoint.clone(),
                api_key: self.api_key.clone(),
                voice: self.voice.clone(),
            },
        }
    }
}

/// Dialogue model settings. `api_key` falls back to the `OPENROUTER_API_KEY`
/// environment variable when unset, mirroring the teacher's
/// `OpenRouterClient::from_keyring` fallback chain without an OS keyring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_model() -> String {
    "z-ai/glm-5".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
        }
    }
}

impl LlmConfig {
    /// Resolve the API key, falling back to `OPENROUTER_API_KEY`.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }
        std::env::var("OPENROUTER_API_KEY")
            .context("no LLM API key configured (set config.llm.api_key or OPENROUTER_API_KEY)")
    }
}

/// `enable_wakeup_words_response_cache` and the `wakeup_words` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeupWordsConfig {
    #[serde(default = "default_true")]
    pub enable_response_cache: bool,
    #[serde(default = "default_wakeup_words")]
    pub words: Vec<String>,
    #[serde(default = "default_fallback_greeting")]
    pub fallback_greeting: String,
}

fn default_true() -> bool {
    true
}

fn default_wakeup_words() -> Vec<String> {
    vec!["你好小智".to_string(), "小智小智".to_string()]
}

fn default_fallback_greeting() -> String {
    "我在呢".to_string()
}

impl Default for WakeupWordsConfig {
    fn default() -> Self {
        Self {
            enable_response_cache: default_true(),
            words: default_wakeup_words(),
            fallback_greeting: default_fallback_greeting(),
        }
    }
}

/// Device directory / control-plane REST client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub secret: String,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            secret: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from the on-disk TOML file, writing defaults on
    /// first run.
    pub fn load() -> Result<Self> {
        let path = config_path()?;

        if path.exists() {
            let contents = std::fs::read_to_string(&path).context("failed to read config file")?;
            let config: Config = toml::from_str(&contents).context("failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path()?;
        let parent = path.parent().context("config path has no parent")?;
        std::fs::create_dir_all(parent).context("failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(&path, contents).context("failed to write config file")?;
        Ok(())
    }
}

/// Get the configuration file path.
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "xiaozhi-server", "xiaozhi-server")
        .context("failed to resolve project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path.
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "xiaozhi-server", "xiaozhi-server")
        .context("failed to resolve project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Print the default configuration as a TOML string, for `config init`-style
/// CLI output.
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&Config::default()).unwrap_or_else(|_| "# default configuration\n".to_string())
}

/// Pretty-print the active configuration.
pub fn show_config() -> Result<()> {
    let config = Config::load()?;
    println!("ASR module:  {}", config.selected_module.asr);
    println!("TTS module:  {}", config.selected_module.tts);
    println!("LLM model:   {}", config.llm.model);
    println!("VAD module:  {}", config.selected_module.vad);
    println!("Max retries: {}", config.retry.max_retries);
    println!("Wake words:  {}", config.wakeup_words.words.join(", "));
    Ok(())
}
