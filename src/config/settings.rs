//! Engine settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::translate::ProcessMode;

use super::AppPaths;

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// Compute device for the transcription model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// CPU inference only.
    Cpu,
    /// Require GPU inference.
    Cuda,
    /// Use the GPU when available, fall back to CPU.
    Auto,
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the transcription stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// GGML model name / file stem (e.g. `"base"`, `"small"`).
    pub model: String,
    /// Compute device.
    pub device: Device,
    /// Suppress non-speech output (voice-activity filtering).
    pub vad: bool,
    /// Source language as an ISO-639-1 code; `None` lets the model detect it.
    pub source_language: Option<String>,
    /// Initial prompt seeded into the prompt memory.
    pub prompt: String,
    /// Prompt memory capacity — how many recently confirmed segments are
    /// replayed to the model for continuity.  Clamped to at least 1.
    pub memory: usize,
    /// Seconds of trailing audio held back as draft before being committed.
    pub patience: f32,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "base".into(),
            device: Device::default(),
            vad: false,
            source_language: None,
            prompt: String::new(),
            memory: 3,
            patience: 5.0,
        }
    }
}

// ---------------------------------------------------------------------------
// TranslateConfig
// ---------------------------------------------------------------------------

/// Settings for the HTTP translation provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Target language code; `None` disables HTTP translation output.
    pub target_language: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            target_language: None,
            timeout_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// ParagraphConfig
// ---------------------------------------------------------------------------

/// Settings for adaptive paragraph detection on the confirmed stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParagraphConfig {
    /// Whether paragraph detection runs at all.
    pub enabled: bool,
    /// Standard deviations above the mean pause for a "significant" pause.
    pub threshold_std: f64,
    /// Minimum pause in seconds considered as a potential break.
    pub min_pause: f64,
    /// Characters per paragraph before a forced break.
    pub max_chars: usize,
    /// Words per paragraph before a forced break.
    pub max_words: usize,
    /// Number of recent pauses used for the running statistics.
    pub window_size: usize,
    /// Pauses observed before switching from the warmup threshold to the
    /// adaptive one.
    pub warmup_count: usize,
    /// Fixed threshold in seconds used during warmup.
    pub warmup_threshold: f64,
}

impl Default for ParagraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_std: 1.5,
            min_pause: 0.8,
            max_chars: 500,
            max_words: 100,
            window_size: 30,
            warmup_count: 5,
            warmup_threshold: 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// AiTrigger
// ---------------------------------------------------------------------------

/// What causes accumulated text to be dispatched to the LLM.
///
/// The paragraph-break and size-cap rules are always live; this selects the
/// additional automatic trigger — or disables automatic triggering entirely
/// in [`AiTrigger::Manual`] mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AiTrigger {
    /// Dispatch when this many seconds elapsed since the last dispatch.
    Time { interval_secs: u64 },
    /// Dispatch when the accumulated text reaches this many words.
    Words { count: usize },
    /// Dispatch only on an explicit request.
    Manual,
}

impl Default for AiTrigger {
    fn default() -> Self {
        Self::Time { interval_secs: 2 }
    }
}

// ---------------------------------------------------------------------------
// AiConfig
// ---------------------------------------------------------------------------

/// Settings for the LLM processing path.
///
/// When `enabled` the translation stage batches confirmed text and ships it
/// to an OpenAI-compatible endpoint instead of the HTTP sentence translator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Whether LLM processing replaces the HTTP translator.
    pub enabled: bool,
    /// Base URL of the API endpoint (e.g. `https://openrouter.ai/api`).
    pub base_url: String,
    /// API key — `None` for local providers that need no authentication.
    pub api_key: Option<String>,
    /// Model identifier sent to the API.
    pub model: String,
    /// What to do with each batch.
    pub mode: ProcessMode,
    /// Automatic trigger selection.
    pub trigger: AiTrigger,
    /// Seconds of silence after which pending text is flushed.
    pub silence_timeout_secs: u64,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f32,
    /// Retry attempts on transient failures.
    pub max_retries: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://openrouter.ai/api".into(),
            api_key: None,
            model: "qwen2.5:3b".into(),
            mode: ProcessMode::Translate,
            trigger: AiTrigger::default(),
            silence_timeout_secs: 60,
            temperature: 0.3,
            max_retries: 2,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// AutoStopConfig
// ---------------------------------------------------------------------------

/// Stop the session automatically after a period of inactivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoStopConfig {
    pub enabled: bool,
    /// Minutes of no confirmed text before the session ends.
    pub minutes: u64,
}

impl Default for AutoStopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            minutes: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for audio capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Input device name substring; `None` uses the system default.
    pub device: Option<String>,
    /// Seconds of audio per frame posted to the transcription stage.
    pub chunk_duration: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            chunk_duration: 0.1,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level engine configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use livescribe::config::EngineConfig;
///
/// // Load (returns Default when the file is missing)
/// let config = EngineConfig::load().unwrap();
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Transcription settings.
    pub stt: SttConfig,
    /// HTTP translation settings.
    pub translate: TranslateConfig,
    /// Paragraph detection settings.
    pub paragraph: ParagraphConfig,
    /// LLM processing settings.
    pub ai: AiConfig,
    /// Inactivity auto-stop.
    pub auto_stop: AutoStopConfig,
    /// Audio capture settings.
    pub audio: AudioConfig,
}

impl EngineConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(EngineConfig::default())` when the file does not exist
    /// yet, so callers never special-case a first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
