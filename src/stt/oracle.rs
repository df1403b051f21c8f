//! Transcription oracle trait and the whisper-rs implementation.
//!
//! [`TranscribeOracle`] is the interface the sliding-window stage drives; it
//! is intentionally narrow so tests can script it.  [`WhisperOracle`] is the
//! production implementation.  Model contexts are heavyweight and immutable
//! after load, so they are memoised process-wide keyed by model id and
//! device — repeated sessions with the same settings reuse the loaded
//! weights.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::i16_to_f32;
use crate::config::Device;
use crate::stt::transcribe::{optimal_threads, Segment, TranscribeRequest};

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

/// All errors that can arise from the transcription subsystem.
#[derive(Debug, Clone, Error)]
pub enum SttError {
    /// The GGML model file was not found at the given path.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// whisper-rs failed to initialise a context or per-call state.
    #[error("whisper context initialisation failed: {0}")]
    ContextInit(String),

    /// An error occurred during the inference pass.
    #[error("transcription error: {0}")]
    Transcription(String),
}

// ---------------------------------------------------------------------------
// TranscribeOracle trait
// ---------------------------------------------------------------------------

/// Interface for speech-to-text over a PCM window.
///
/// `pcm` is mono 16 kHz 16-bit PCM.  Returned segments are in chronological
/// order with timestamps relative to the start of `pcm`.  Implementations
/// are owned by a single worker thread; only `Send` is required.
pub trait TranscribeOracle: Send {
    fn transcribe(
        &mut self,
        pcm: &[i16],
        req: &TranscribeRequest,
    ) -> Result<Vec<Segment>, SttError>;
}

// ---------------------------------------------------------------------------
// Process-wide model cache
// ---------------------------------------------------------------------------

/// A loaded whisper context plus the identity it was loaded under.
///
/// The raw context holds a pointer to immutable model weights; sharing the
/// wrapper across threads is safe because every inference call creates its
/// own `WhisperState`.
struct CachedModel {
    ctx: WhisperContext,
}

// SAFETY: the model weights behind WhisperContext are read-only after load
// and whisper-rs serialises per-call mutable state into WhisperState.
unsafe impl Send for CachedModel {}
unsafe impl Sync for CachedModel {}

fn model_cache() -> &'static Mutex<HashMap<(String, Device), Arc<CachedModel>>> {
    static CACHE: OnceLock<Mutex<HashMap<(String, Device), Arc<CachedModel>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn load_or_cached(model_path: &Path, device: Device) -> Result<Arc<CachedModel>, SttError> {
    let key = (model_path.display().to_string(), device);

    let mut cache = model_cache().lock().unwrap();
    if let Some(model) = cache.get(&key) {
        log::debug!("reusing cached whisper model: {}", key.0);
        return Ok(Arc::clone(model));
    }

    if !model_path.exists() {
        return Err(SttError::ModelNotFound(key.0));
    }
    let path_str = model_path
        .to_str()
        .ok_or_else(|| SttError::ModelNotFound(key.0.clone()))?;

    let mut ctx_params = WhisperContextParameters::default();
    ctx_params.use_gpu(matches!(device, Device::Cuda | Device::Auto));

    let ctx = WhisperContext::new_with_params(path_str, ctx_params)
        .map_err(|e| SttError::ContextInit(e.to_string()))?;

    log::info!("whisper model loaded: {} ({device:?})", key.0);
    let model = Arc::new(CachedModel { ctx });
    cache.insert(key, Arc::clone(&model));
    Ok(model)
}

// ---------------------------------------------------------------------------
// WhisperOracle
// ---------------------------------------------------------------------------

/// Production oracle backed by a (possibly cached) whisper-rs context.
///
/// A fresh `WhisperState` is created per call, so two sessions sharing a
/// cached context never touch each other's inference state.
pub struct WhisperOracle {
    model: Arc<CachedModel>,
    n_threads: i32,
}

impl WhisperOracle {
    /// Load the model at `model_path` (or reuse the process-wide cached copy
    /// for the same path + device).
    pub fn load(model_path: impl AsRef<Path>, device: Device) -> Result<Self, SttError> {
        Ok(Self {
            model: load_or_cached(model_path.as_ref(), device)?,
            n_threads: optimal_threads(),
        })
    }
}

impl TranscribeOracle for WhisperOracle {
    fn transcribe(
        &mut self,
        pcm: &[i16],
        req: &TranscribeRequest,
    ) -> Result<Vec<Segment>, SttError> {
        let audio = i16_to_f32(pcm);

        let mut fp = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        fp.set_n_threads(self.n_threads);
        fp.set_print_special(false);
        fp.set_print_progress(false);
        fp.set_print_realtime(false);
        fp.set_print_timestamps(false);

        // The borrows passed to FullParams stay alive until state.full()
        // returns below.
        fp.set_language(req.language.as_deref());
        if !req.initial_prompt.is_empty() {
            fp.set_initial_prompt(&req.initial_prompt);
        }
        if req.vad {
            fp.set_suppress_blank(true);
            fp.set_no_speech_thold(0.6);
        }

        let mut state = self
            .model
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        state
            .full(fp, &audio)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let mut segments = Vec::with_capacity(n_segments as usize);
        for i in 0..n_segments {
            let text = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;

            // Timestamps arrive in centiseconds.
            let t0 = state.full_get_segment_t0(i).unwrap_or(0).max(0);
            let t1 = state.full_get_segment_t1(i).unwrap_or(0).max(0);

            segments.push(Segment {
                text,
                start: t0 as f32 / 100.0,
                end: t1 as f32 / 100.0,
            });
        }

        Ok(segments)
    }
}

// ---------------------------------------------------------------------------
// ScriptedOracle  (test-only)
// ---------------------------------------------------------------------------

/// A test double that replays a scripted sequence of answers.
///
/// Each call pops the next scripted response; when the script is exhausted
/// it keeps returning an empty segment list.
#[cfg(test)]
pub struct ScriptedOracle {
    responses: std::collections::VecDeque<Result<Vec<Segment>, SttError>>,
    /// Requests observed, newest last — lets tests assert on prompt memory.
    pub requests: Vec<TranscribeRequest>,
}

#[cfg(test)]
impl ScriptedOracle {
    pub fn new(responses: Vec<Vec<Segment>>) -> Self {
        Self {
            responses: responses.into_iter().map(Ok).collect(),
            requests: Vec::new(),
        }
    }

    pub fn failing(err: SttError) -> Self {
        Self {
            responses: std::collections::VecDeque::from([Err(err)]),
            requests: Vec::new(),
        }
    }
}

#[cfg(test)]
impl TranscribeOracle for ScriptedOracle {
    fn transcribe(
        &mut self,
        _pcm: &[i16],
        req: &TranscribeRequest,
    ) -> Result<Vec<Segment>, SttError> {
        self.requests.push(req.clone());
        self.responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
