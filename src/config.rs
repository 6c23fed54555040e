//! Configuration loading and management
//!
//! Defaults come from `$HOME`, then an optional `config.json` in the data
//! directory, then `KORE_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    pub remote: RemoteConfig,
    pub speech: SpeechConfig,
    pub timing: TimingConfig,
}

/// How the remote agent delivers its answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    #[default]
    Stream,
    Sync,
}

/// Remote agent endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Command router agent id
    pub agent_id: Option<String>,
    pub endpoint_id: String,
    pub reasoning_mode: String,
    pub response_mode: ResponseMode,
    pub temperature: f32,
    pub max_tokens: u32,
    pub external_user_id: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.on-demand.io/chat/v1".to_string(),
            api_key: None,
            agent_id: None,
            endpoint_id: "predefined-xai-grok4.1-fast".to_string(),
            reasoning_mode: "grok-4-fast".to_string(),
            response_mode: ResponseMode::Stream,
            temperature: 0.7,
            max_tokens: 500,
            external_user_id: "kore-daemon".to_string(),
        }
    }
}

/// External speech programs
///
/// `tts_program` receives the text as its last argument. `stt_program`
/// records one utterance and prints the transcript on stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub tts_program: String,
    pub tts_args: Vec<String>,
    pub stt_program: Option<String>,
    pub stt_args: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        let tts_program = if cfg!(target_os = "macos") { "say" } else { "espeak-ng" };
        Self {
            enabled: true,
            tts_program: tts_program.to_string(),
            tts_args: Vec::new(),
            stt_program: None,
            stt_args: Vec::new(),
        }
    }
}

/// Durations and tick counts for the command pipeline and overlay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub min_request_interval_ms: u64,
    pub remote_timeout_secs: u64,
    pub listen_timeout_secs: u64,
    /// How long happy/sad is held before returning to idle
    pub settle_ms: u64,
    pub thought_ticks: u64,
    pub failure_thought_ticks: u64,
    pub tick_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_request_interval_ms: 500,
            remote_timeout_secs: 30,
            listen_timeout_secs: 8,
            settle_ms: 1500,
            thought_ticks: 180,
            failure_thought_ticks: 120,
            tick_ms: 16,
        }
    }
}

impl TimingConfig {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_secs(self.listen_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Animation ticks spanning one full voice capture, rounded up
    pub fn listen_ticks(&self) -> u64 {
        let tick_ms = self.tick_ms.max(1);
        self.listen_timeout_secs
            .saturating_mul(1000)
            .div_ceil(tick_ms)
    }
}

/// Shape of the optional `config.json`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    remote: RemoteConfig,
    speech: SpeechConfig,
    timing: TimingConfig,
}

impl Config {
    /// Load configuration from defaults, config file and environment
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("kore");

        let file = read_file_config(&data_dir.join("config.json"))?;
        let mut config = Self {
            socket_path: data_dir.join("daemon.sock"),
            data_dir,
            remote: file.remote,
            speech: file.speech,
            timing: file.timing,
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `KORE_*` overrides from `lookup`
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("KORE_API_KEY") {
            self.remote.api_key = Some(key);
        }
        if let Some(id) = lookup("KORE_AGENT_ID") {
            self.remote.agent_id = Some(id);
        }
        if let Some(url) = lookup("KORE_BASE_URL") {
            self.remote.base_url = url;
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    info!(?path, "config file loaded");
    Ok(config)
}
