//! Engine supervisor — session lifecycle across the three worker threads.
//!
//! [`Engine::start`] spawns a supervisor thread that constructs every stage
//! (model, audio device, providers), reports the outcome through
//! [`EngineCallbacks`], runs the capture loop itself, and joins the
//! transcribe/translate workers before firing `on_stopped`.
//!
//! [`EngineHandle`] is the caller's side: a non-blocking [`stop`]
//! (cooperative, observed by capture within one read tick and by the
//! downstream stages through the sentinel), the live input level for
//! meters, and the manual LLM flush flag.
//!
//! [`stop`]: EngineHandle::stop

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::audio::{AudioCapture, CaptureError};
use crate::config::EngineConfig;
use crate::queue::{MergeQueue, Pair};
use crate::stt::{ParagraphDetector, SttError, TranscriptionWindow, WhisperOracle};
use crate::translate::{
    ApiProcessor, GoogleTranslator, HttpTranslation, LlmBatcher, LlmProcessor, ProcessMode,
    TranslationStage,
};

use super::workers::{run_capture, run_transcription, run_translation};

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Construction failures that abort a session before it starts.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Stt(#[from] SttError),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// EngineCallbacks
// ---------------------------------------------------------------------------

/// Lifecycle and error callbacks, grouped so embedders pass one struct
/// instead of a parameter list.
///
/// `on_ready` fires once construction succeeded and the workers are live;
/// `on_failure` fires instead when construction failed.  Exactly one
/// `on_stopped` follows every successful start, after all three workers
/// have joined.
#[derive(Default)]
pub struct EngineCallbacks {
    pub on_ready: Option<Box<dyn FnOnce() + Send>>,
    pub on_failure: Option<Box<dyn FnOnce(EngineError) + Send>>,
    pub on_stopped: Option<Box<dyn FnOnce() + Send>>,
    /// Fatal audio-device failure; the session is already shutting down.
    pub on_record_error: Option<Box<dyn FnOnce(CaptureError) + Send>>,
    /// Fatal oracle failure; the session is already shutting down.
    pub on_transcribe_error: Option<Box<dyn FnOnce(SttError) + Send>>,
}

// ---------------------------------------------------------------------------
// EngineQueues
// ---------------------------------------------------------------------------

/// Result queues the engine writes for one session.
///
/// Each stream is terminated by exactly one `None`.  The proofread queue is
/// only fed in LLM proofread modes, but the engine terminates it at
/// shutdown whenever it is present.
#[derive(Clone)]
pub struct EngineQueues {
    pub transcription: Arc<MergeQueue<Pair>>,
    pub translation: Arc<MergeQueue<Pair>>,
    pub proofread: Option<Arc<MergeQueue<Pair>>>,
}

impl EngineQueues {
    /// Fresh transcription + translation queues, no proofread queue.
    pub fn new() -> Self {
        Self {
            transcription: Arc::new(MergeQueue::new()),
            translation: Arc::new(MergeQueue::new()),
            proofread: None,
        }
    }

    /// Fresh queues including a proofread queue.
    pub fn with_proofread() -> Self {
        Self {
            proofread: Some(Arc::new(MergeQueue::new())),
            ..Self::new()
        }
    }
}

impl Default for EngineQueues {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// EngineHandle
// ---------------------------------------------------------------------------

/// The caller's handle on a running session.
pub struct EngineHandle {
    running: Arc<AtomicBool>,
    level: Arc<AtomicU8>,
    manual_trigger: Arc<AtomicBool>,
    supervisor: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Request a cooperative stop.  Non-blocking; `on_stopped` fires once
    /// all workers have drained.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// `true` while the session has not been stopped (by [`stop`],
    /// auto-stop, or a fatal error).
    ///
    /// [`stop`]: Self::stop
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Current input level for UI meters, `0..=100`.
    pub fn level(&self) -> u8 {
        self.level.load(Ordering::Relaxed)
    }

    /// Ask the LLM path to process its accumulated text now.  Only
    /// meaningful with the manual trigger configured.
    pub fn request_ai_flush(&self) {
        self.manual_trigger.store(true, Ordering::Relaxed);
    }

    /// Block until the supervisor thread has finished.
    pub fn join(mut self) {
        if let Some(handle) = self.supervisor.take() {
            let _ = handle.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Builder/supervisor for one streaming session.
pub struct Engine;

impl Engine {
    /// Start a session: construct all stages on a background thread, then
    /// run capture → transcribe → translate until stopped.
    ///
    /// Construction failures (missing model, no input device) arrive via
    /// `callbacks.on_failure` and no workers are started.
    pub fn start(
        config: EngineConfig,
        queues: EngineQueues,
        callbacks: EngineCallbacks,
    ) -> EngineHandle {
        let running = Arc::new(AtomicBool::new(true));
        let level = Arc::new(AtomicU8::new(0));
        let manual_trigger = Arc::new(AtomicBool::new(false));

        let supervisor = {
            let running = Arc::clone(&running);
            let level = Arc::clone(&level);
            let manual_trigger = Arc::clone(&manual_trigger);

            std::thread::Builder::new()
                .name("engine".into())
                .spawn(move || {
                    supervise(config, queues, callbacks, running, level, manual_trigger);
                })
                .expect("failed to spawn engine supervisor thread")
        };

        EngineHandle {
            running,
            level,
            manual_trigger,
            supervisor: Some(supervisor),
        }
    }
}

/// Construct all stages, run the session to completion, fire callbacks.
fn supervise(
    config: EngineConfig,
    queues: EngineQueues,
    mut callbacks: EngineCallbacks,
    running: Arc<AtomicBool>,
    level: Arc<AtomicU8>,
    manual_trigger: Arc<AtomicBool>,
) {
    // Construction failure: report it, clear the flag, and terminate the
    // result queues so pollers blocked on them wake up.
    fn fail(
        callbacks: &mut EngineCallbacks,
        running: &AtomicBool,
        queues: &EngineQueues,
        err: EngineError,
    ) {
        running.store(false, Ordering::Relaxed);
        log::error!("engine construction failed: {err}");
        queues.transcription.put(None);
        queues.translation.put(None);
        if let Some(proofread) = &queues.proofread {
            proofread.put(None);
        }
        if let Some(on_failure) = callbacks.on_failure.take() {
            on_failure(err);
        }
    }

    // Load the model first; it is the expensive step and the audio device
    // should not be held open while it runs.
    let oracle = match WhisperOracle::load(resolve_model_path(&config), config.stt.device) {
        Ok(oracle) => oracle,
        Err(e) => return fail(&mut callbacks, &running, &queues, e.into()),
    };

    let capture = match AudioCapture::open(config.audio.device.as_deref()) {
        Ok(capture) => capture,
        Err(e) => return fail(&mut callbacks, &running, &queues, e.into()),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => return fail(&mut callbacks, &running, &queues, e.into()),
    };

    let window = build_window(&config);
    let mut stage = build_translation_stage(&config, &queues, Arc::clone(&manual_trigger));

    let frame_queue = Arc::new(MergeQueue::new());
    let ts2tl = Arc::new(MergeQueue::new());

    let ts_thread = {
        let frame_queue = Arc::clone(&frame_queue);
        let ts_result = Arc::clone(&queues.transcription);
        let ts2tl = Arc::clone(&ts2tl);
        let running = Arc::clone(&running);
        let on_transcribe_error = callbacks.on_transcribe_error.take();
        let mut oracle = oracle;
        let mut window = window;

        std::thread::Builder::new()
            .name("transcribe".into())
            .spawn(move || {
                if let Err(e) =
                    run_transcription(&mut oracle, &mut window, &frame_queue, &ts_result, &ts2tl)
                {
                    running.store(false, Ordering::Relaxed);
                    log::error!("transcription failed: {e}");
                    if let Some(on_transcribe_error) = on_transcribe_error {
                        on_transcribe_error(e);
                    }
                }
            })
            .expect("failed to spawn transcribe thread")
    };

    let tl_thread = {
        let ts2tl = Arc::clone(&ts2tl);
        let running = Arc::clone(&running);

        std::thread::Builder::new()
            .name("translate".into())
            .spawn(move || {
                run_translation(&runtime, &mut stage, &ts2tl, &running);
            })
            .expect("failed to spawn translate thread")
    };

    if let Some(on_ready) = callbacks.on_ready.take() {
        on_ready();
    }

    // The supervisor thread is the capture worker.
    let capture_result = run_capture(
        &capture,
        config.audio.chunk_duration,
        &running,
        &level,
        &frame_queue,
    );
    frame_queue.put(None);
    running.store(false, Ordering::Relaxed);

    if let Err(e) = capture_result {
        log::error!("audio capture failed: {e}");
        if let Some(on_record_error) = callbacks.on_record_error.take() {
            on_record_error(e);
        }
    }

    let _ = ts_thread.join();
    let _ = tl_thread.join();

    log::info!("session stopped");
    if let Some(on_stopped) = callbacks.on_stopped.take() {
        on_stopped();
    }
}

/// Treat the configured model as a path when it looks like one, otherwise
/// resolve it inside the models directory.
fn resolve_model_path(config: &EngineConfig) -> PathBuf {
    let model = &config.stt.model;
    if model.contains(std::path::MAIN_SEPARATOR) || model.ends_with(".bin") {
        PathBuf::from(model)
    } else {
        crate::config::AppPaths::new().model_file(model)
    }
}

fn build_window(config: &EngineConfig) -> TranscriptionWindow {
    let detector = config
        .paragraph
        .enabled
        .then(|| ParagraphDetector::new(config.paragraph.clone()));

    TranscriptionWindow::new(
        config.stt.prompt.clone(),
        config.stt.memory,
        config.stt.patience,
        config.stt.source_language.clone(),
        config.stt.vad,
        detector,
    )
}

fn build_translation_stage(
    config: &EngineConfig,
    queues: &EngineQueues,
    manual_trigger: Arc<AtomicBool>,
) -> TranslationStage {
    let auto_stop = config
        .auto_stop
        .enabled
        .then(|| Duration::from_secs(config.auto_stop.minutes * 60));

    let source = config.stt.source_language.as_deref();
    let target = config.translate.target_language.as_deref();

    if config.ai.enabled {
        let processor: Arc<dyn LlmProcessor> =
            Arc::new(ApiProcessor::from_config(&config.ai, source, target));

        // The two-call proofread+translate path needs its own single-task
        // processors, derived from the same config.
        let split_procs = (config.ai.mode == ProcessMode::ProofreadTranslate
            && queues.proofread.is_some())
        .then(|| {
            let pr: Arc<dyn LlmProcessor> = Arc::new(ApiProcessor::with_mode(
                &config.ai,
                ProcessMode::Proofread,
                source,
                None,
            ));
            let tl: Arc<dyn LlmProcessor> = Arc::new(ApiProcessor::with_mode(
                &config.ai,
                ProcessMode::Translate,
                source,
                target,
            ));
            (pr, tl)
        });

        let batcher = LlmBatcher::new(
            processor,
            split_procs,
            config.ai.trigger,
            Duration::from_secs(config.ai.silence_timeout_secs),
            manual_trigger,
        );

        TranslationStage::llm(
            batcher,
            Arc::clone(&queues.translation),
            queues.proofread.clone(),
            auto_stop,
        )
    } else {
        let http = HttpTranslation::new(
            Box::new(GoogleTranslator::new(config.translate.timeout_secs)),
            config.stt.source_language.clone(),
            config.translate.target_language.clone(),
        );
        TranslationStage::http(
            http,
            Arc::clone(&queues.translation),
            queues.proofread.clone(),
            auto_stop,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
