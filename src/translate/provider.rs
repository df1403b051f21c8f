//! Sentence-level HTTP translation provider.
//!
//! [`SentenceTranslator`] is the interface the translation stage drives in
//! HTTP mode.  The provider returns a *sentence-level split* of its input —
//! one `(source_span, target_span)` pair per sentence — which is what makes
//! the stage's reserve trick possible: the last pair is assumed to be the
//! only sentence that might still be incomplete.
//!
//! [`GoogleTranslator`] talks to the public `translate.googleapis.com`
//! endpoint (the `gtx` client used by the browser extension APIs).

use async_trait::async_trait;
use thiserror::Error;

// ---------------------------------------------------------------------------
// SentencePair
// ---------------------------------------------------------------------------

/// One sentence of the input together with its translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentencePair {
    /// The span of the input this pair covers.
    pub source: String,
    /// Its translation.
    pub target: String,
}

impl SentencePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TranslateError
// ---------------------------------------------------------------------------

/// Errors raised by a translation provider.  All of them are recoverable at
/// the stage level — the stage substitutes a marker and keeps going.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// HTTP transport or connection error.
    #[error("translation request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("translation request timed out")]
    Timeout,

    /// The response body was not in the expected shape.
    #[error("failed to parse translation response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for TranslateError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TranslateError::Timeout
        } else {
            TranslateError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// SentenceTranslator trait
// ---------------------------------------------------------------------------

/// Async interface for sentence-split translation.
///
/// * Empty `text` must yield an empty list without a network call.
/// * `source` of `None` means "auto-detect".
/// * The returned pairs cover the input in order.
#[async_trait]
pub trait SentenceTranslator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source: Option<&str>,
        target: &str,
    ) -> Result<Vec<SentencePair>, TranslateError>;
}

// ---------------------------------------------------------------------------
// GoogleTranslator
// ---------------------------------------------------------------------------

/// Translator backed by the public Google Translate `gtx` endpoint.
///
/// The response is a nested JSON array whose first element lists
/// `[target, source, …]` entries, one per sentence.
pub struct GoogleTranslator {
    client: reqwest::Client,
    base_url: String,
}

const DEFAULT_BASE_URL: &str = "https://translate.googleapis.com";

impl GoogleTranslator {
    /// Build a translator with the given per-request timeout.
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the endpoint base URL (tests point this at a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn parse_response(value: &serde_json::Value) -> Result<Vec<SentencePair>, TranslateError> {
        // Shape: [[["hola", "hello", …], ["mundo", "world", …]], …]
        let sentences = match value.get(0) {
            Some(serde_json::Value::Array(items)) => items.as_slice(),
            Some(serde_json::Value::Null) | None => &[],
            Some(other) => {
                return Err(TranslateError::Parse(format!(
                    "expected sentence array, got {other}"
                )))
            }
        };

        let mut pairs = Vec::with_capacity(sentences.len());
        for entry in sentences {
            let target = entry.get(0).and_then(|v| v.as_str());
            let source = entry.get(1).and_then(|v| v.as_str());
            if let (Some(target), Some(source)) = (target, source) {
                pairs.push(SentencePair::new(source, target));
            }
        }
        Ok(pairs)
    }
}

#[async_trait]
impl SentenceTranslator for GoogleTranslator {
    async fn translate(
        &self,
        text: &str,
        source: Option<&str>,
        target: &str,
    ) -> Result<Vec<SentencePair>, TranslateError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/translate_a/single", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("client", "gtx"),
                ("sl", source.unwrap_or("auto")),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TranslateError::Parse(e.to_string()))?;

        Self::parse_response(&value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_splits_sentences_in_order() {
        let value = json!([
            [
                ["Hola.", "Hello.", null],
                ["¿Cómo estás?", "How are you?", null]
            ],
            null
        ]);
        let pairs = GoogleTranslator::parse_response(&value).unwrap();
        assert_eq!(
            pairs,
            vec![
                SentencePair::new("Hello.", "Hola."),
                SentencePair::new("How are you?", "¿Cómo estás?"),
            ]
        );
    }

    #[test]
    fn parse_null_sentence_list_is_empty() {
        let value = json!([null]);
        assert!(GoogleTranslator::parse_response(&value).unwrap().is_empty());
    }

    #[test]
    fn parse_rejects_non_array_payload() {
        let value = json!(["unexpected"]);
        assert!(matches!(
            GoogleTranslator::parse_response(&value),
            Err(TranslateError::Parse(_))
        ));
    }

    #[test]
    fn parse_skips_malformed_entries() {
        let value = json!([[["ok", "src", null], [42], ["tail", "end"]]]);
        let pairs = GoogleTranslator::parse_response(&value).unwrap();
        assert_eq!(
            pairs,
            vec![
                SentencePair::new("src", "ok"),
                SentencePair::new("end", "tail")
            ]
        );
    }

    #[tokio::test]
    async fn empty_input_short_circuits_without_network() {
        // base_url points nowhere routable; an attempted request would error.
        let translator = GoogleTranslator::new(1).with_base_url("http://127.0.0.1:9");
        let pairs = translator.translate("", None, "es").await.unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn translator_is_object_safe() {
        let t: Box<dyn SentenceTranslator> = Box::new(GoogleTranslator::new(5));
        drop(t);
    }
}
