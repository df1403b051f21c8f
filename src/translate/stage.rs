//! Translation stage — consumes confirmed/draft updates from transcription
//! and produces translated (and optionally proofread) output.
//!
//! Two mutually exclusive modes:
//!
//! * **HTTP mode** ([`HttpTranslation`]) — every update is routed to a
//!   sentence-split [`SentenceTranslator`].  The last sentence returned is
//!   held back in a *reserve* and re-translated together with its
//!   continuation on the next update, so an incomplete trailing sentence is
//!   never translated twice.
//! * **LLM mode** ([`LlmBatcher`]) — confirmed text is accumulated and
//!   shipped to an [`LlmProcessor`] in batches when a trigger fires
//!   (paragraph break, size cap, time, word count, silence, or a manual
//!   request).
//!
//! Provider failures are recoverable: the stage substitutes a readable
//! marker (HTTP) or the unprocessed text (LLM) and keeps consuming.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AiTrigger;
use crate::queue::{MergeQueue, Pair};
use crate::translate::llm::LlmProcessor;
use crate::translate::provider::{SentencePair, SentenceTranslator};

/// Substituted for the translation when the HTTP provider fails.
pub const UNAVAILABLE_MARKER: &str = "Translation service is unavailable.";

/// Minimum accumulated characters before the paragraph-break trigger fires.
pub const MIN_CHARS_TO_PROCESS: usize = 150;

/// Accumulated size at which processing is forced even without a break.
pub const MAX_CHARS_TO_ACCUMULATE: usize = 400;

// ---------------------------------------------------------------------------
// HttpTranslation
// ---------------------------------------------------------------------------

/// Per-session state of the HTTP translation path.
pub struct HttpTranslation {
    translator: Box<dyn SentenceTranslator>,
    source: Option<String>,
    target: Option<String>,
    /// Source text of the last (possibly incomplete) sentence, carried
    /// across updates.
    reserve: String,
}

impl HttpTranslation {
    pub fn new(
        translator: Box<dyn SentenceTranslator>,
        source: Option<String>,
        target: Option<String>,
    ) -> Self {
        Self {
            translator,
            source,
            target,
            reserve: String::new(),
        }
    }

    /// The currently reserved source prefix.
    pub fn reserve(&self) -> &str {
        &self.reserve
    }

    async fn translate_or_marker(&self, text: &str, target: &str) -> Vec<SentencePair> {
        if text.is_empty() {
            return Vec::new();
        }
        match self
            .translator
            .translate(text, self.source.as_deref(), target)
            .await
        {
            Ok(pairs) => pairs,
            Err(e) => {
                log::warn!("translation provider failed: {e}");
                vec![SentencePair::new(text, UNAVAILABLE_MARKER)]
            }
        }
    }

    /// Translate one confirmed/draft update.
    ///
    /// Without a configured target language the stage stays silent and
    /// returns empty pairs.
    pub async fn update(&mut self, pair: &Pair) -> Pair {
        let Some(target) = self.target.clone() else {
            return Pair::default();
        };

        let confirmed_tgt = if !pair.confirmed.is_empty() || !self.reserve.is_empty() {
            let text = format!("{}{}", self.reserve, pair.confirmed);
            let mut sentences = self.translate_or_marker(&text, &target).await;

            if sentences.len() > 1 {
                // Only the last sentence can be incomplete; hold it back.
                let last = sentences.pop().unwrap();
                self.reserve = last.source;
                sentences
                    .iter()
                    .map(|p| p.target.as_str())
                    .collect::<String>()
            } else if let Some(only) = sentences.pop() {
                // A single sentence is consumed whole — popping it would
                // stall the output on short inputs.
                self.reserve.clear();
                only.target
            } else {
                self.reserve.clear();
                String::new()
            }
        } else {
            String::new()
        };

        // The draft translation is a fresh, discardable call over the new
        // reserve plus the current draft.
        let draft_src = format!("{}{}", self.reserve, pair.draft);
        let draft_tgt = self
            .translate_or_marker(&draft_src, &target)
            .await
            .iter()
            .map(|p| p.target.as_str())
            .collect::<String>();

        Pair {
            confirmed: confirmed_tgt,
            draft: draft_tgt,
        }
    }
}

// ---------------------------------------------------------------------------
// LlmBatcher
// ---------------------------------------------------------------------------

/// Per-session state of the LLM batching path.
pub struct LlmBatcher {
    processor: Arc<dyn LlmProcessor>,
    /// Proofread-only and translate-only processors for the two-call
    /// proofread+translate path; `None` runs single-call dispatch.
    split_procs: Option<(Arc<dyn LlmProcessor>, Arc<dyn LlmProcessor>)>,
    trigger: AiTrigger,
    silence_timeout: Duration,
    /// Set by an external actor to force processing of the accumulated text.
    manual: Arc<AtomicBool>,

    /// Confirmed source text not yet shipped.
    accumulated: String,
    /// Most recent draft, included in the end-of-stream flush.
    last_draft: String,
    last_process: Instant,
    last_activity: Instant,
}

impl LlmBatcher {
    pub fn new(
        processor: Arc<dyn LlmProcessor>,
        split_procs: Option<(Arc<dyn LlmProcessor>, Arc<dyn LlmProcessor>)>,
        trigger: AiTrigger,
        silence_timeout: Duration,
        manual: Arc<AtomicBool>,
    ) -> Self {
        Self {
            processor,
            split_procs,
            trigger,
            silence_timeout,
            manual,
            accumulated: String::new(),
            last_draft: String::new(),
            last_process: Instant::now(),
            last_activity: Instant::now(),
        }
    }

    /// Text accumulated and not yet shipped.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    async fn run(proc: &dyn LlmProcessor, text: &str) -> String {
        match proc.process(text).await {
            Ok(result) => result,
            Err(e) => {
                // Recoverable: keep the stream flowing with the input text.
                log::warn!("LLM processing failed, passing text through: {e}");
                text.to_string()
            }
        }
    }

    async fn dispatch(
        &self,
        to_process: &str,
        has_break: bool,
        final_flush: bool,
        tl_queue: &MergeQueue<Pair>,
        pr_queue: Option<&Arc<MergeQueue<Pair>>>,
    ) {
        use crate::translate::llm::ProcessMode;

        if let (Some((pr_proc, tl_proc)), Some(pr_queue)) = (&self.split_procs, pr_queue) {
            // Two sequential calls: models follow a single task per call far
            // more reliably than a combined instruction.
            let proofread = Self::run(pr_proc.as_ref(), to_process).await;
            let translated = Self::run(tl_proc.as_ref(), &proofread).await;

            let pr_sep = if final_flush { "" } else { "\n\n" };
            let tl_sep = if final_flush {
                ""
            } else if has_break {
                "\n\n"
            } else {
                " "
            };

            if !proofread.is_empty() {
                pr_queue.put(Some(Pair::new(format!("{proofread}{pr_sep}"), "")));
            }
            if !translated.is_empty() {
                tl_queue.put(Some(Pair::new(format!("{translated}{tl_sep}"), "")));
            }
        } else {
            let processed = Self::run(self.processor.as_ref(), to_process).await;
            let sep = if final_flush {
                ""
            } else if has_break {
                "\n\n"
            } else {
                " "
            };
            let out = Pair::new(format!("{processed}{sep}"), "");

            match (self.processor.mode(), pr_queue) {
                (ProcessMode::Proofread, Some(pr_queue)) => pr_queue.put(Some(out)),
                _ => tl_queue.put(Some(out)),
            }
        }
    }

    /// Accumulate one update and ship a batch if any trigger fires.
    pub async fn update(
        &mut self,
        pair: &Pair,
        tl_queue: &MergeQueue<Pair>,
        pr_queue: Option<&Arc<MergeQueue<Pair>>>,
    ) {
        self.last_draft = pair.draft.clone();

        if !pair.confirmed.is_empty() {
            self.accumulated.push_str(&pair.confirmed);
            self.last_activity = Instant::now();
        }

        let chars = self.accumulated.chars().count();
        let has_break = self.accumulated.contains("\n\n");
        let has_min_chars = chars >= MIN_CHARS_TO_PROCESS;
        let has_max_chars = chars >= MAX_CHARS_TO_ACCUMULATE;

        let manual_requested = !self.accumulated.is_empty() && self.manual.load(Ordering::Relaxed);
        if manual_requested {
            self.manual.store(false, Ordering::Relaxed);
        }

        // Automatic triggers are disabled entirely in manual mode; only the
        // manual flag and the paragraph/cap rules remain live.
        let (time_hit, words_hit, silence_hit) = match self.trigger {
            AiTrigger::Manual => (false, false, false),
            AiTrigger::Time { interval_secs } => (
                self.last_process.elapsed() >= Duration::from_secs(interval_secs),
                false,
                self.silence_elapsed(),
            ),
            AiTrigger::Words { count } => (
                false,
                self.accumulated.split_whitespace().count() >= count,
                self.silence_elapsed(),
            ),
        };

        let should_process = !self.accumulated.is_empty()
            && ((has_min_chars && has_break)
                || has_max_chars
                || time_hit
                || words_hit
                || silence_hit
                || manual_requested);

        if !should_process {
            return;
        }

        let to_process = if let Some(idx) = self.accumulated.rfind("\n\n") {
            // Ship complete paragraphs; the trailing incomplete one stays.
            let rest = self.accumulated.split_off(idx + 2);
            let mut head = std::mem::replace(&mut self.accumulated, rest);
            head.truncate(idx);
            head
        } else {
            std::mem::take(&mut self.accumulated)
        };

        if !to_process.is_empty() {
            log::debug!(
                "LLM batch: {} chars (break={has_break}, manual={manual_requested})",
                to_process.chars().count()
            );
            self.dispatch(&to_process, has_break, false, tl_queue, pr_queue)
                .await;
            self.last_process = Instant::now();
        }
    }

    fn silence_elapsed(&self) -> bool {
        self.last_activity.elapsed() >= self.silence_timeout
            && !self.accumulated.trim().is_empty()
    }

    /// End-of-stream flush: ship whatever remains (accumulated text plus the
    /// latest draft) through the same dispatch logic, without separators.
    pub async fn flush(
        &mut self,
        tl_queue: &MergeQueue<Pair>,
        pr_queue: Option<&Arc<MergeQueue<Pair>>>,
    ) {
        let mut final_text = std::mem::take(&mut self.accumulated);
        if !self.last_draft.trim().is_empty() {
            final_text.push_str(&self.last_draft);
        }
        if final_text.trim().is_empty() {
            return;
        }
        log::debug!("LLM flush: {} chars", final_text.chars().count());
        self.dispatch(&final_text, false, true, tl_queue, pr_queue)
            .await;
    }
}

// ---------------------------------------------------------------------------
// TranslationStage
// ---------------------------------------------------------------------------

/// Outcome of a single stage update.
#[derive(Debug, PartialEq, Eq)]
pub enum StageStatus {
    /// Keep consuming updates.
    Continue,
    /// The inactivity limit elapsed; the caller should stop the session.
    AutoStop,
}

/// The complete translation stage: one of the two modes plus the output
/// queues and the session inactivity watchdog.
pub struct TranslationStage {
    mode: StageMode,
    tl_queue: Arc<MergeQueue<Pair>>,
    pr_queue: Option<Arc<MergeQueue<Pair>>>,
    auto_stop: Option<Duration>,
    last_activity: Instant,
}

enum StageMode {
    Http(HttpTranslation),
    Llm(LlmBatcher),
}

impl TranslationStage {
    /// HTTP mode.  A proofread queue handed in here gets no output, but the
    /// stage still owns its termination sentinel.
    pub fn http(
        http: HttpTranslation,
        tl_queue: Arc<MergeQueue<Pair>>,
        pr_queue: Option<Arc<MergeQueue<Pair>>>,
        auto_stop: Option<Duration>,
    ) -> Self {
        Self {
            mode: StageMode::Http(http),
            tl_queue,
            pr_queue,
            auto_stop,
            last_activity: Instant::now(),
        }
    }

    pub fn llm(
        batcher: LlmBatcher,
        tl_queue: Arc<MergeQueue<Pair>>,
        pr_queue: Option<Arc<MergeQueue<Pair>>>,
        auto_stop: Option<Duration>,
    ) -> Self {
        Self {
            mode: StageMode::Llm(batcher),
            tl_queue,
            pr_queue,
            auto_stop,
            last_activity: Instant::now(),
        }
    }

    /// Process one confirmed/draft update from the transcription stage.
    pub async fn update(&mut self, pair: Pair) -> StageStatus {
        if let Some(limit) = self.auto_stop {
            if self.last_activity.elapsed() >= limit {
                log::info!("auto-stop: no activity for {}s", limit.as_secs());
                return StageStatus::AutoStop;
            }
        }
        if !pair.confirmed.is_empty() {
            self.last_activity = Instant::now();
        }

        match &mut self.mode {
            StageMode::Http(http) => {
                let out = http.update(&pair).await;
                self.tl_queue.put(Some(out));
            }
            StageMode::Llm(batcher) => {
                batcher
                    .update(&pair, &self.tl_queue, self.pr_queue.as_ref())
                    .await;
            }
        }
        StageStatus::Continue
    }

    /// Flush pending work and terminate every owned output queue.
    pub async fn finish(&mut self) {
        if let StageMode::Llm(batcher) = &mut self.mode {
            batcher
                .flush(&self.tl_queue, self.pr_queue.as_ref())
                .await;
        }
        self.tl_queue.put(None);
        if let Some(pr_queue) = &self.pr_queue {
            pr_queue.put(None);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::llm::{LlmError, ProcessMode};
    use crate::translate::provider::TranslateError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Splits input into sentences on `.?!` (keeping the delimiter) and
    /// translates each as `[<trimmed source>]`.  Records every call.
    struct SentenceSplitter {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl SentenceSplitter {
        fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }

        fn split(text: &str) -> Vec<String> {
            let mut spans = Vec::new();
            let mut start = 0;
            for (i, c) in text.char_indices() {
                if matches!(c, '.' | '?' | '!') {
                    spans.push(text[start..i + c.len_utf8()].to_string());
                    start = i + c.len_utf8();
                }
            }
            if start < text.len() {
                spans.push(text[start..].to_string());
            }
            spans
        }
    }

    #[async_trait]
    impl SentenceTranslator for SentenceSplitter {
        async fn translate(
            &self,
            text: &str,
            _source: Option<&str>,
            _target: &str,
        ) -> Result<Vec<SentencePair>, TranslateError> {
            self.calls.lock().unwrap().push(text.to_string());
            Ok(Self::split(text)
                .into_iter()
                .map(|s| {
                    let target = format!("[{}]", s.trim());
                    SentencePair::new(s, target)
                })
                .collect())
        }
    }

    /// Always fails — exercises the marker substitution path.
    struct BrokenTranslator;

    #[async_trait]
    impl SentenceTranslator for BrokenTranslator {
        async fn translate(
            &self,
            _text: &str,
            _source: Option<&str>,
            _target: &str,
        ) -> Result<Vec<SentencePair>, TranslateError> {
            Err(TranslateError::Timeout)
        }
    }

    /// LLM double: wraps input as `<tag:input>` and records calls.
    struct TagProcessor {
        tag: &'static str,
        mode: ProcessMode,
        calls: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl TagProcessor {
        fn new(tag: &'static str, mode: ProcessMode) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Arc::new(Self {
                    tag,
                    mode,
                    calls: Arc::clone(&calls),
                    fail: false,
                }),
                calls,
            )
        }

        fn failing(mode: ProcessMode) -> Arc<Self> {
            Arc::new(Self {
                tag: "x",
                mode,
                calls: Arc::new(Mutex::new(Vec::new())),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl LlmProcessor for TagProcessor {
        async fn process(&self, text: &str) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(LlmError::Timeout);
            }
            Ok(format!("<{}:{}>", self.tag, text))
        }

        fn mode(&self) -> ProcessMode {
            self.mode
        }
    }

    fn http_stage(translator: Box<dyn SentenceTranslator>) -> (TranslationStage, Arc<MergeQueue<Pair>>) {
        let tl = Arc::new(MergeQueue::new());
        let stage = TranslationStage::http(
            HttpTranslation::new(translator, None, Some("es".into())),
            Arc::clone(&tl),
            None,
            None,
        );
        (stage, tl)
    }

    fn llm_batcher(
        proc: Arc<dyn LlmProcessor>,
        trigger: AiTrigger,
        silence_secs: u64,
    ) -> (LlmBatcher, Arc<AtomicBool>) {
        let manual = Arc::new(AtomicBool::new(false));
        let batcher = LlmBatcher::new(
            proc,
            None,
            trigger,
            Duration::from_secs(silence_secs),
            Arc::clone(&manual),
        );
        (batcher, manual)
    }

    // -----------------------------------------------------------------------
    // HTTP mode
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn http_translates_each_sentence_exactly_once() {
        let (translator, calls) = SentenceSplitter::new();
        let (mut stage, tl) = http_stage(Box::new(translator));

        stage.update(Pair::new("Hello.", "How are")).await;
        let first = tl.get().unwrap();
        // The draft was translated as a throwaway call.
        assert_eq!(first, Pair::new("[Hello.]", "[How are]"));

        stage.update(Pair::new(" How are you?", "")).await;
        let second = tl.get().unwrap();
        assert_eq!(second.confirmed, "[How are you?]");

        stage.finish().await;
        assert_eq!(tl.get(), None);

        // Both sentences translated exactly once, no duplication; the empty
        // second draft never reached the provider.
        let calls = calls.lock().unwrap();
        assert_eq!(*calls, vec!["Hello.", "How are", " How are you?"]);
    }

    #[tokio::test]
    async fn http_reserve_holds_incomplete_sentence() {
        let (translator, _calls) = SentenceSplitter::new();
        let mut http = HttpTranslation::new(Box::new(translator), None, Some("es".into()));

        let out = http.update(&Pair::new("One. Two is incomp", "")).await;
        assert_eq!(out.confirmed, "[One.]");
        assert_eq!(http.reserve(), " Two is incomp");

        // The continuation arrives; the reserved prefix is re-translated with
        // it, exactly once.
        let out = http.update(&Pair::new("lete.", "")).await;
        assert_eq!(out.confirmed, "[Two is incomplete.]");
        assert_eq!(http.reserve(), "");
    }

    #[tokio::test]
    async fn http_reserve_flushes_on_trailing_empty_update() {
        let (translator, _calls) = SentenceSplitter::new();
        let mut http = HttpTranslation::new(Box::new(translator), None, Some("es".into()));

        http.update(&Pair::new("Done. Trailing.", "")).await;
        // The defensive pop reserved the final complete sentence.
        assert_eq!(http.reserve(), " Trailing.");

        // The next (empty) update drains it: one sentence comes back, which
        // is consumed whole and clears the reserve.
        let out = http.update(&Pair::new("", "")).await;
        assert_eq!(out.confirmed, "[Trailing.]");
        assert_eq!(http.reserve(), "");
    }

    #[tokio::test]
    async fn http_provider_failure_substitutes_marker_and_continues() {
        let (mut stage, tl) = http_stage(Box::new(BrokenTranslator));

        let status = stage.update(Pair::new("Hello.", "draft")).await;
        assert_eq!(status, StageStatus::Continue);

        let out = tl.get().expect("marker pair");
        assert_eq!(out.confirmed, UNAVAILABLE_MARKER);
        assert_eq!(out.draft, UNAVAILABLE_MARKER);
    }

    #[tokio::test]
    async fn http_without_target_language_stays_silent() {
        let (translator, calls) = SentenceSplitter::new();
        let mut http = HttpTranslation::new(Box::new(translator), None, None);

        let out = http.update(&Pair::new("Hello.", "draft")).await;
        assert!(out.is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn http_empty_update_with_empty_reserve_makes_no_calls() {
        let (translator, calls) = SentenceSplitter::new();
        let mut http = HttpTranslation::new(Box::new(translator), None, Some("es".into()));

        let out = http.update(&Pair::new("", "")).await;
        assert!(out.is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // LLM mode — triggers
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn paragraph_trigger_needs_min_chars() {
        let (proc, calls) = TagProcessor::new("t", ProcessMode::Translate);
        let (mut batcher, _) = llm_batcher(proc, AiTrigger::Manual, 60);
        let tl = MergeQueue::new();

        // Break present but below 150 chars: nothing ships.
        batcher
            .update(&Pair::new("Para one.\n\nPara two continuing", ""), &tl, None)
            .await;
        assert!(calls.lock().unwrap().is_empty());

        // Push the total past 150: exactly one call with the complete
        // paragraph; the trailing paragraph stays accumulated.
        let filler = "x".repeat(140);
        batcher.update(&Pair::new(filler.as_str(), ""), &tl, None).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], "Para one.");
        assert_eq!(batcher.accumulated(), format!("Para two continuing{filler}"));
    }

    #[tokio::test]
    async fn cap_trigger_ships_everything_without_break() {
        let (proc, calls) = TagProcessor::new("t", ProcessMode::Translate);
        let (mut batcher, _) = llm_batcher(proc, AiTrigger::Manual, 60);
        let tl = MergeQueue::new();

        let long = "y".repeat(MAX_CHARS_TO_ACCUMULATE);
        batcher.update(&Pair::new(long.as_str(), ""), &tl, None).await;

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(batcher.accumulated(), "");

        // No paragraph break → results are joined with a space.
        let out = tl.get().unwrap();
        assert_eq!(out.confirmed, format!("<t:{long}> "));
    }

    #[tokio::test]
    async fn time_trigger_fires_when_interval_elapsed() {
        let (proc, calls) = TagProcessor::new("t", ProcessMode::Translate);
        let (mut batcher, _) =
            llm_batcher(proc, AiTrigger::Time { interval_secs: 0 }, 60);
        let tl = MergeQueue::new();

        batcher.update(&Pair::new("short text", ""), &tl, None).await;
        assert_eq!(*calls.lock().unwrap(), vec!["short text"]);
    }

    #[tokio::test]
    async fn words_trigger_counts_accumulated_words() {
        let (proc, calls) = TagProcessor::new("t", ProcessMode::Translate);
        let (mut batcher, _) = llm_batcher(proc, AiTrigger::Words { count: 4 }, 60);
        let tl = MergeQueue::new();

        batcher.update(&Pair::new("one two ", ""), &tl, None).await;
        assert!(calls.lock().unwrap().is_empty());

        batcher.update(&Pair::new("three four", ""), &tl, None).await;
        assert_eq!(*calls.lock().unwrap(), vec!["one two three four"]);
    }

    #[tokio::test]
    async fn silence_trigger_flushes_accumulated() {
        let (proc, calls) = TagProcessor::new("t", ProcessMode::Translate);
        // interval effectively infinite, silence timeout zero.
        let (mut batcher, _) =
            llm_batcher(proc, AiTrigger::Time { interval_secs: 3600 }, 0);
        let tl = MergeQueue::new();

        batcher.update(&Pair::new("some words", ""), &tl, None).await;
        assert_eq!(*calls.lock().unwrap(), vec!["some words"]);
    }

    #[tokio::test]
    async fn manual_mode_disables_automatic_triggers() {
        let (proc, calls) = TagProcessor::new("t", ProcessMode::Translate);
        // Silence timeout of zero would fire instantly in automatic modes.
        let (mut batcher, manual) = llm_batcher(proc, AiTrigger::Manual, 0);
        let tl = MergeQueue::new();

        for _ in 0..5 {
            batcher.update(&Pair::new("more words ", ""), &tl, None).await;
        }
        assert!(calls.lock().unwrap().is_empty(), "grew without shipping");

        // The manual flag fires and is consumed.
        manual.store(true, Ordering::Relaxed);
        batcher.update(&Pair::new("", ""), &tl, None).await;
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(!manual.load(Ordering::Relaxed));
        assert_eq!(batcher.accumulated(), "");
    }

    #[tokio::test]
    async fn llm_failure_passes_text_through() {
        let proc = TagProcessor::failing(ProcessMode::Translate);
        let (mut batcher, _) = llm_batcher(proc, AiTrigger::Time { interval_secs: 0 }, 60);
        let tl = MergeQueue::new();

        batcher.update(&Pair::new("unprocessed", ""), &tl, None).await;
        let out = tl.get().unwrap();
        assert_eq!(out.confirmed, "unprocessed ");
    }

    // -----------------------------------------------------------------------
    // LLM mode — dispatch routing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn two_call_path_chains_proofread_into_translation() {
        let (main, _) = TagProcessor::new("m", ProcessMode::ProofreadTranslate);
        let (pr_proc, pr_calls) = TagProcessor::new("pr", ProcessMode::Proofread);
        let (tl_proc, tl_calls) = TagProcessor::new("tl", ProcessMode::Translate);

        let manual = Arc::new(AtomicBool::new(false));
        let mut batcher = LlmBatcher::new(
            main,
            Some((pr_proc as Arc<dyn LlmProcessor>, tl_proc as Arc<dyn LlmProcessor>)),
            AiTrigger::Time { interval_secs: 0 },
            Duration::from_secs(60),
            manual,
        );

        let tl = MergeQueue::new();
        let pr = Arc::new(MergeQueue::new());

        batcher.update(&Pair::new("raw text", ""), &tl, Some(&pr)).await;

        assert_eq!(*pr_calls.lock().unwrap(), vec!["raw text"]);
        // The translator received the proofread output, not the raw text.
        assert_eq!(*tl_calls.lock().unwrap(), vec!["<pr:raw text>"]);

        // Proofread output always separates with a paragraph break; the
        // translation used a space (no break in the source).
        assert_eq!(pr.get().unwrap().confirmed, "<pr:raw text>\n\n");
        assert_eq!(tl.get().unwrap().confirmed, "<tl:<pr:raw text>> ");
    }

    #[tokio::test]
    async fn proofread_mode_routes_to_proofread_queue() {
        let (proc, _) = TagProcessor::new("p", ProcessMode::Proofread);
        let manual = Arc::new(AtomicBool::new(false));
        let mut batcher = LlmBatcher::new(
            proc,
            None,
            AiTrigger::Time { interval_secs: 0 },
            Duration::from_secs(60),
            manual,
        );

        let tl = MergeQueue::new();
        let pr = Arc::new(MergeQueue::new());

        batcher.update(&Pair::new("fix me", ""), &tl, Some(&pr)).await;

        assert_eq!(pr.get().unwrap().confirmed, "<p:fix me> ");
        assert!(!tl.is_nonempty());
    }

    #[tokio::test]
    async fn paragraph_break_dispatch_uses_break_separator() {
        let (proc, _) = TagProcessor::new("t", ProcessMode::Translate);
        let (mut batcher, _) = llm_batcher(proc, AiTrigger::Manual, 60);
        let tl = MergeQueue::new();

        // 150+ chars with a break → paragraph trigger → "\n\n" separator.
        let para = format!("{}.\n\ntail", "z".repeat(160));
        batcher.update(&Pair::new(para.as_str(), ""), &tl, None).await;

        let out = tl.get().unwrap();
        assert!(out.confirmed.ends_with("\n\n"));
        assert_eq!(batcher.accumulated(), "tail");
    }

    // -----------------------------------------------------------------------
    // End-of-stream flush and sentinels
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn finish_flushes_accumulated_plus_draft_without_separator() {
        let (proc, calls) = TagProcessor::new("t", ProcessMode::Translate);
        let manual = Arc::new(AtomicBool::new(false));
        let batcher = LlmBatcher::new(
            proc,
            None,
            AiTrigger::Manual,
            Duration::from_secs(60),
            manual,
        );

        let tl = Arc::new(MergeQueue::new());
        let mut stage = TranslationStage::llm(batcher, Arc::clone(&tl), None, None);

        stage.update(Pair::new("confirmed tail", " and a draft")).await;
        stage.finish().await;

        assert_eq!(*calls.lock().unwrap(), vec!["confirmed tail and a draft"]);
        assert_eq!(tl.get().unwrap().confirmed, "<t:confirmed tail and a draft>");
        // Exactly one sentinel, at the end.
        assert_eq!(tl.get(), None);
        assert!(!tl.is_nonempty());
    }

    #[tokio::test]
    async fn finish_terminates_both_queues_exactly_once() {
        let (proc, _) = TagProcessor::new("t", ProcessMode::Proofread);
        let manual = Arc::new(AtomicBool::new(false));
        let batcher = LlmBatcher::new(
            proc,
            None,
            AiTrigger::Manual,
            Duration::from_secs(60),
            manual,
        );

        let tl = Arc::new(MergeQueue::new());
        let pr = Arc::new(MergeQueue::new());
        let mut stage =
            TranslationStage::llm(batcher, Arc::clone(&tl), Some(Arc::clone(&pr)), None);

        stage.finish().await;

        assert_eq!(tl.get(), None);
        assert!(!tl.is_nonempty());
        assert_eq!(pr.get(), None);
        assert!(!pr.is_nonempty());
    }

    #[tokio::test]
    async fn http_finish_posts_single_sentinel() {
        let (translator, _calls) = SentenceSplitter::new();
        let (mut stage, tl) = http_stage(Box::new(translator));

        stage.update(Pair::new("Hi.", "")).await;
        stage.finish().await;

        assert!(tl.get().is_some());
        assert_eq!(tl.get(), None);
        assert!(!tl.is_nonempty());
    }

    // -----------------------------------------------------------------------
    // Auto-stop
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn auto_stop_fires_after_inactivity() {
        let (translator, _calls) = SentenceSplitter::new();
        let tl = Arc::new(MergeQueue::new());
        let mut stage = TranslationStage::http(
            HttpTranslation::new(Box::new(translator), None, Some("es".into())),
            Arc::clone(&tl),
            None,
            Some(Duration::from_secs(0)),
        );

        let status = stage.update(Pair::new("text", "")).await;
        assert_eq!(status, StageStatus::AutoStop);
        // The triggering update is not processed.
        assert!(!tl.is_nonempty());
    }
}
