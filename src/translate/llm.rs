//! LLM text processor for proofreading and translation.
//!
//! [`ApiProcessor`] calls any OpenAI-compatible `/v1/chat/completions`
//! endpoint — OpenRouter, OpenAI, Groq, Ollama (OpenAI mode), LM Studio,
//! vLLM.  All connection details come from [`AiConfig`]; nothing is
//! hardcoded.
//!
//! Combined proofread+translate output may arrive as a structured
//! `PROOFREAD:` / `TRANSLATE:` document; [`parse_proofread_translate`]
//! splits it with a defensive fallback ladder for providers that ignore the
//! format.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AiConfig;

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

/// Errors that can occur during LLM processing.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport or connection error.
    #[error("LLM request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("LLM request timed out")]
    Timeout,

    /// The endpoint rejected the credentials; retrying cannot help.
    #[error("LLM authentication failed: {0}")]
    Auth(String),

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// The LLM returned a response with no usable text content.
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessMode
// ---------------------------------------------------------------------------

/// What the processor is asked to do with each batch of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMode {
    /// Correct transcription errors only.
    Proofread,
    /// Translate only.
    Translate,
    /// Proofread, then translate the corrected text.
    ProofreadTranslate,
}

// ---------------------------------------------------------------------------
// LlmProcessor trait
// ---------------------------------------------------------------------------

/// Async interface for LLM batch processing.
///
/// Implementors must be `Send + Sync` so they can sit behind an
/// `Arc<dyn LlmProcessor>` shared with the translation worker.
#[async_trait]
pub trait LlmProcessor: Send + Sync {
    /// Process one batch of text and return the result.
    async fn process(&self, text: &str) -> Result<String, LlmError>;

    /// The mode this processor was built for.
    fn mode(&self) -> ProcessMode;
}

// ---------------------------------------------------------------------------
// ApiProcessor
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct ApiProcessor {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_retries: u32,
    mode: ProcessMode,
    system_prompt: String,
}

impl ApiProcessor {
    /// Build a processor from config in the configured mode.
    ///
    /// `source`/`target` feed the system prompt; `target` is only consulted
    /// by the translating modes.
    pub fn from_config(config: &AiConfig, source: Option<&str>, target: Option<&str>) -> Self {
        Self::with_mode(config, config.mode, source, target)
    }

    /// Build a processor in an explicit mode, overriding the configured one.
    ///
    /// The two-call proofread+translate path uses this to derive its
    /// proofread-only and translate-only processors from one config.
    pub fn with_mode(
        config: &AiConfig,
        mode: ProcessMode,
        source: Option<&str>,
        target: Option<&str>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            mode,
            system_prompt: system_prompt(mode, source, target),
        }
    }

    async fn request_once(&self, text: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user",   "content": text }
            ],
            "stream": false,
            "temperature": self.temperature,
            "max_tokens": 4096
        });

        let mut req = self.client.post(&url).json(&body);

        // Attach the Authorization header only for a non-empty key — local
        // providers run without authentication.
        let key = self.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::Auth(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(LlmError::Request(format!("HTTP {status}")));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(LlmError::EmptyResponse)?
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(content)
    }
}

#[async_trait]
impl LlmProcessor for ApiProcessor {
    /// Send `text` to the endpoint, retrying transient failures with
    /// exponential backoff.  Authentication failures are not retried.
    async fn process(&self, text: &str) -> Result<String, LlmError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(std::time::Duration::from_secs(1 << (attempt - 1))).await;
            }
            match self.request_once(text).await {
                Ok(result) => return Ok(result),
                Err(err @ LlmError::Auth(_)) => return Err(err),
                Err(err) => {
                    log::warn!("LLM attempt {}/{} failed: {err}", attempt + 1, self.max_retries + 1);
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or(LlmError::EmptyResponse))
    }

    fn mode(&self) -> ProcessMode {
        self.mode
    }
}

// ---------------------------------------------------------------------------
// System prompts
// ---------------------------------------------------------------------------

fn system_prompt(mode: ProcessMode, source: Option<&str>, target: Option<&str>) -> String {
    let source = source.unwrap_or("the source language (auto-detect)");
    let target = target.unwrap_or("the target language");

    match mode {
        ProcessMode::Proofread => format!(
            "You are a professional proofreader for live speech transcripts in {source}. \
             Fix transcription errors, punctuation and casing without changing the meaning \
             or rewording. Return only the corrected text, nothing else."
        ),
        ProcessMode::Translate => format!(
            "You are a professional translator. Translate the user's text from {source} \
             into {target}. Preserve paragraph breaks. Return only the translation, \
             nothing else."
        ),
        ProcessMode::ProofreadTranslate => format!(
            "You are a professional editor and translator. First correct the transcription \
             errors in the user's text ({source}), then translate the corrected text into \
             {target}. Answer in exactly this format:\n\
             PROOFREAD:\n[corrected text]\n\nTRANSLATE:\n[translated text]"
        ),
    }
}

// ---------------------------------------------------------------------------
// Structured output parsing
// ---------------------------------------------------------------------------

/// Case-insensitive (ASCII) search for `marker` in `haystack`.
fn find_marker(haystack: &str, marker: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(marker.len())
        .position(|w| w.eq_ignore_ascii_case(marker.as_bytes()))
}

/// Split combined proofread+translate output into its two sections.
///
/// Fallback ladder for providers that ignore the format:
/// * both markers → both sections;
/// * only `TRANSLATE:` → translation only;
/// * only `PROOFREAD:` → proofread only;
/// * no markers → the whole text is treated as the translation.
pub fn parse_proofread_translate(text: &str) -> (String, String) {
    const PROOFREAD: &str = "PROOFREAD:";
    const TRANSLATE: &str = "TRANSLATE:";

    if text.is_empty() {
        return (String::new(), String::new());
    }

    let proofread_at = find_marker(text, PROOFREAD);
    let translate_at = find_marker(text, TRANSLATE);

    match (proofread_at, translate_at) {
        (Some(p), Some(t)) if p < t => {
            let proofread = text[p + PROOFREAD.len()..t].trim().to_string();
            let translate = text[t + TRANSLATE.len()..].trim().to_string();
            (proofread, translate)
        }
        (_, Some(t)) => (String::new(), text[t + TRANSLATE.len()..].trim().to_string()),
        (Some(p), None) => (text[p + PROOFREAD.len()..].trim().to_string(), String::new()),
        (None, None) => (String::new(), text.trim().to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiTrigger;

    fn config() -> AiConfig {
        AiConfig {
            enabled: true,
            base_url: "http://localhost:11434".into(),
            api_key: None,
            model: "qwen2.5:3b".into(),
            mode: ProcessMode::ProofreadTranslate,
            trigger: AiTrigger::Time { interval_secs: 2 },
            silence_timeout_secs: 60,
            temperature: 0.3,
            max_retries: 2,
            timeout_secs: 10,
        }
    }

    // ---- parse_proofread_translate ------------------------------------------

    #[test]
    fn parse_both_sections() {
        let (pr, tl) =
            parse_proofread_translate("PROOFREAD:\nFixed text.\n\nTRANSLATE:\nTexto corregido.");
        assert_eq!(pr, "Fixed text.");
        assert_eq!(tl, "Texto corregido.");
    }

    #[test]
    fn parse_is_case_insensitive() {
        let (pr, tl) = parse_proofread_translate("proofread: a\ntranslate: b");
        assert_eq!(pr, "a");
        assert_eq!(tl, "b");
    }

    #[test]
    fn parse_translate_only_marker() {
        let (pr, tl) = parse_proofread_translate("TRANSLATE:\nSolo traducción.");
        assert_eq!(pr, "");
        assert_eq!(tl, "Solo traducción.");
    }

    #[test]
    fn parse_proofread_only_marker() {
        let (pr, tl) = parse_proofread_translate("PROOFREAD:\nOnly fixed.");
        assert_eq!(pr, "Only fixed.");
        assert_eq!(tl, "");
    }

    #[test]
    fn parse_without_markers_is_translation() {
        let (pr, tl) = parse_proofread_translate("The model just answered.");
        assert_eq!(pr, "");
        assert_eq!(tl, "The model just answered.");
    }

    #[test]
    fn parse_empty_input() {
        assert_eq!(parse_proofread_translate(""), (String::new(), String::new()));
    }

    // ---- ApiProcessor construction ------------------------------------------

    #[test]
    fn from_config_uses_configured_mode() {
        let proc = ApiProcessor::from_config(&config(), Some("en"), Some("es"));
        assert_eq!(proc.mode(), ProcessMode::ProofreadTranslate);
    }

    #[test]
    fn with_mode_overrides_configured_mode() {
        let proc = ApiProcessor::with_mode(&config(), ProcessMode::Proofread, Some("en"), None);
        assert_eq!(proc.mode(), ProcessMode::Proofread);
        assert!(proc.system_prompt.contains("proofreader"));
    }

    #[test]
    fn translate_prompt_names_target_language() {
        let proc = ApiProcessor::with_mode(&config(), ProcessMode::Translate, Some("en"), Some("es"));
        assert!(proc.system_prompt.contains("es"));
    }

    #[tokio::test]
    async fn blank_input_short_circuits() {
        // base_url points nowhere routable; a network attempt would error.
        let mut cfg = config();
        cfg.base_url = "http://127.0.0.1:9".into();
        let proc = ApiProcessor::from_config(&cfg, None, None);
        assert_eq!(proc.process("   ").await.unwrap(), "");
    }

    #[test]
    fn processor_is_object_safe() {
        let p: Box<dyn LlmProcessor> = Box::new(ApiProcessor::from_config(&config(), None, None));
        assert_eq!(p.mode(), ProcessMode::ProofreadTranslate);
    }
}
