//! The three worker loops: capture, transcribe, translate.
//!
//! Each loop is a plain function over its queues and collaborators so the
//! inter-stage contracts (FIFO order, sentinel exactness, error paths) are
//! testable without a microphone or a model file.  The supervisor in
//! [`crate::pipeline::engine`] wires them onto named OS threads.
//!
//! Shutdown is cooperative: the capture loop checks the shared `running`
//! flag on every read-timeout tick and the downstream stages terminate on
//! receipt of the `None` sentinel, each forwarding exactly one `None` of
//! their own.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use crate::audio::{AudioCapture, CaptureError, FrameAssembler};
use crate::queue::{AudioFrame, MergeQueue, Pair};
use crate::stt::{SttError, TranscribeOracle, TranscriptionWindow};
use crate::translate::{StageStatus, TranslationStage};

// ---------------------------------------------------------------------------
// Capture worker
// ---------------------------------------------------------------------------

/// Read audio until `running` clears, posting fixed-duration frames.
///
/// The caller posts the `None` sentinel to `frame_queue` after this returns
/// — on both the clean and the error path — so it is sent exactly once.
pub(crate) fn run_capture(
    capture: &AudioCapture,
    chunk_duration: f32,
    running: &AtomicBool,
    level: &AtomicU8,
    frame_queue: &MergeQueue<AudioFrame>,
) -> Result<(), CaptureError> {
    let (tx, rx) = mpsc::channel();
    let _stream = capture.start(tx)?;

    let mut assembler =
        FrameAssembler::new(capture.sample_rate(), capture.channels(), chunk_duration);

    log::info!(
        "capture started: {} Hz, {} ch",
        capture.sample_rate(),
        capture.channels()
    );

    while running.load(Ordering::Relaxed) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(chunk) => {
                for frame in assembler.push(&chunk) {
                    frame_queue.put(Some(frame));
                }
                level.store(assembler.level(), Ordering::Relaxed);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Err(CaptureError::StreamClosed),
        }
    }

    log::debug!("capture loop exiting");
    Ok(())
}

// ---------------------------------------------------------------------------
// Transcription worker
// ---------------------------------------------------------------------------

/// Consume frames until the sentinel, posting confirmed/draft pairs to both
/// the UI result queue and the translation stage.
///
/// Both outbound queues receive exactly one `None` when this returns, on
/// the clean and the error path alike.
pub(crate) fn run_transcription(
    oracle: &mut dyn TranscribeOracle,
    window: &mut TranscriptionWindow,
    frame_queue: &MergeQueue<AudioFrame>,
    ts_result: &MergeQueue<Pair>,
    ts2tl: &MergeQueue<Pair>,
) -> Result<(), SttError> {
    let result = (|| {
        while let Some(frame) = frame_queue.get() {
            let pair = window.update(oracle, &frame)?;
            ts2tl.put(Some(pair.clone()));
            ts_result.put(Some(pair));
        }
        Ok(())
    })();

    ts2tl.put(None);
    ts_result.put(None);
    log::debug!("transcription worker exiting");
    result
}

// ---------------------------------------------------------------------------
// Translation worker
// ---------------------------------------------------------------------------

/// Consume confirmed/draft pairs until the sentinel (or an auto-stop),
/// then flush and terminate the stage's output queues.
///
/// Provider calls are async; the worker drives them to completion on its
/// own current-thread runtime, so it blocks exactly like the other stages.
pub(crate) fn run_translation(
    runtime: &tokio::runtime::Runtime,
    stage: &mut TranslationStage,
    ts2tl: &MergeQueue<Pair>,
    running: &AtomicBool,
) {
    while let Some(pair) = ts2tl.get() {
        match runtime.block_on(stage.update(pair)) {
            StageStatus::Continue => {}
            StageStatus::AutoStop => {
                running.store(false, Ordering::Relaxed);
                break;
            }
        }
    }

    runtime.block_on(stage.finish());
    log::debug!("translation worker exiting");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::{ScriptedOracle, Segment};
    use crate::translate::provider::{SentencePair, SentenceTranslator, TranslateError};
    use crate::translate::HttpTranslation;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    fn make_window(patience: f32) -> TranscriptionWindow {
        TranscriptionWindow::new(String::new(), 4, patience, None, false, None)
    }

    /// Echoes the whole input back as one sentence pair, uppercased.
    struct UpperTranslator;

    #[async_trait]
    impl SentenceTranslator for UpperTranslator {
        async fn translate(
            &self,
            text: &str,
            _source: Option<&str>,
            _target: &str,
        ) -> Result<Vec<SentencePair>, TranslateError> {
            Ok(vec![SentencePair::new(text, text.to_uppercase())])
        }
    }

    fn http_stage(tl: &Arc<MergeQueue<Pair>>) -> TranslationStage {
        TranslationStage::http(
            HttpTranslation::new(Box::new(UpperTranslator), None, Some("es".into())),
            Arc::clone(tl),
            None,
            None,
        )
    }

    fn drain(queue: &MergeQueue<Pair>) -> (Vec<Pair>, usize) {
        let mut items = Vec::new();
        let mut sentinels = 0;
        while let Some(entry) = queue.try_get() {
            match entry {
                Some(pair) => items.push(pair),
                None => sentinels += 1,
            }
        }
        (items, sentinels)
    }

    // ---- run_transcription -------------------------------------------------

    #[test]
    fn transcription_posts_pairs_then_one_sentinel_on_each_queue() {
        let frame_queue = MergeQueue::new();
        let ts_result = MergeQueue::new();
        let ts2tl = MergeQueue::new();

        // One second of audio then end-of-stream.  (Pre-loaded frames merge
        // into a single entry; that still exercises the full path.)
        frame_queue.put(Some(AudioFrame::new(vec![0i16; 32_000])));
        frame_queue.put(None);

        let mut oracle = ScriptedOracle::new(vec![vec![
            Segment::new("hello ", 0.0, 0.8),
            Segment::new("world", 1.2, 1.9),
        ]]);
        let mut window = make_window(1.0);

        run_transcription(&mut oracle, &mut window, &frame_queue, &ts_result, &ts2tl).unwrap();

        for queue in [&ts_result, &ts2tl] {
            let (items, sentinels) = drain(queue);
            assert_eq!(items.len(), 1);
            assert_eq!(items[0], Pair::new("hello ", "world"));
            assert_eq!(sentinels, 1);
        }
    }

    #[test]
    fn transcription_error_still_terminates_both_queues() {
        let frame_queue = MergeQueue::new();
        let ts_result = MergeQueue::new();
        let ts2tl = MergeQueue::new();

        frame_queue.put(Some(AudioFrame::new(vec![0i16; 1600])));
        frame_queue.put(None);

        let mut oracle = ScriptedOracle::failing(SttError::Transcription("boom".into()));
        let mut window = make_window(1.0);

        let result =
            run_transcription(&mut oracle, &mut window, &frame_queue, &ts_result, &ts2tl);
        assert!(result.is_err());

        for queue in [&ts_result, &ts2tl] {
            let (items, sentinels) = drain(queue);
            assert!(items.is_empty());
            assert_eq!(sentinels, 1);
        }
    }

    // ---- run_translation ---------------------------------------------------

    #[test]
    fn translation_consumes_until_sentinel_and_terminates() {
        let ts2tl = MergeQueue::new();
        let tl = Arc::new(MergeQueue::new());
        let running = AtomicBool::new(true);

        ts2tl.put(Some(Pair::new("hi.", "draft")));
        ts2tl.put(None);

        let rt = runtime();
        let mut stage = http_stage(&tl);
        run_translation(&rt, &mut stage, &ts2tl, &running);

        let (items, sentinels) = drain(&tl);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].confirmed, "HI.");
        assert_eq!(sentinels, 1);
        // A provider-level stop was never requested.
        assert!(running.load(Ordering::Relaxed));
    }

    // ---- Clean shutdown across both downstream workers (end-to-end) --------

    #[test]
    fn pipeline_workers_join_and_each_queue_ends_with_one_sentinel() {
        let frame_queue = Arc::new(MergeQueue::new());
        let ts_result = Arc::new(MergeQueue::new());
        let ts2tl = Arc::new(MergeQueue::new());
        let tl_result = Arc::new(MergeQueue::new());

        let ts_thread = {
            let frame_queue = Arc::clone(&frame_queue);
            let ts_result = Arc::clone(&ts_result);
            let ts2tl = Arc::clone(&ts2tl);
            std::thread::spawn(move || {
                let mut oracle = ScriptedOracle::new(vec![
                    vec![
                        Segment::new("one. ", 0.0, 0.8),
                        Segment::new("tw", 1.2, 1.9),
                    ],
                    vec![Segment::new("two.", 0.0, 0.9)],
                ]);
                let mut window = make_window(1.0);
                run_transcription(&mut oracle, &mut window, &frame_queue, &ts_result, &ts2tl)
                    .unwrap();
            })
        };

        let tl_thread = {
            let ts2tl = Arc::clone(&ts2tl);
            let tl_result = Arc::clone(&tl_result);
            std::thread::spawn(move || {
                let rt = runtime();
                let running = AtomicBool::new(true);
                let mut stage = http_stage(&tl_result);
                run_translation(&rt, &mut stage, &ts2tl, &running);
            })
        };

        // Feed frames one at a time, waiting for each to be taken so they
        // reach the worker un-merged, then end the stream.
        for frame in [
            AudioFrame::new(vec![0i16; 32_000]),
            AudioFrame::new(vec![0i16; 16_000]),
        ] {
            frame_queue.put(Some(frame));
            while frame_queue.is_nonempty() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        frame_queue.put(None);

        ts_thread.join().unwrap();
        tl_thread.join().unwrap();

        let (ts_items, ts_sentinels) = drain(&ts_result);
        let confirmed: String = ts_items.iter().map(|p| p.confirmed.as_str()).collect();
        assert_eq!(confirmed, "one. two.");
        assert_eq!(ts_sentinels, 1);

        let (tl_items, tl_sentinels) = drain(&tl_result);
        assert_eq!(tl_sentinels, 1);
        let translated: String = tl_items.iter().map(|p| p.confirmed.as_str()).collect();
        assert!(translated.contains("ONE."));
    }
}
