//! Merging single-producer single-consumer queues.
//!
//! Every hand-off between pipeline stages goes through a [`MergeQueue`].
//! When the consumer falls behind, newly produced items are merged into the
//! queue tail instead of piling up as separate entries — this is the
//! pipeline's only back-pressure mechanism, and it keeps queue memory bounded
//! without ever blocking a producer.
//!
//! Items implement the [`Merge`] capability.  Two concrete item types exist:
//!
//! * [`AudioFrame`] — raw PCM; merging concatenates samples.
//! * [`Pair`] — a `confirmed`/`draft` text update; merging concatenates the
//!   confirmed text and replaces the draft with the newest one.
//!
//! End-of-stream is signalled by `put(None)`.  The sentinel is appended as a
//! distinct entry and is never merged, so a consumer always observes it after
//! every real item its producer posted.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Capability for items that can absorb a successor in place.
///
/// `a.merge(b)` must leave `a` representing the same abstract update sequence
/// as delivering `a` then `b` separately — [`MergeQueue`] relies on this to
/// collapse adjacent entries without changing what the consumer learns.
pub trait Merge {
    /// Absorb `other` into `self`.  `other` arrived after `self`.
    fn merge(&mut self, other: Self);
}

// ---------------------------------------------------------------------------
// Pair
// ---------------------------------------------------------------------------

/// A two-layer text update: a committed prefix and a revisable suffix.
///
/// `confirmed` text only ever grows across a stream of pairs; `draft` is the
/// stage's current best guess for the not-yet-committed tail and may change
/// arbitrarily between updates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pair {
    /// Text committed by the producing stage; never retracted.
    pub confirmed: String,
    /// Text still subject to revision.
    pub draft: String,
}

impl Pair {
    pub fn new(confirmed: impl Into<String>, draft: impl Into<String>) -> Self {
        Self {
            confirmed: confirmed.into(),
            draft: draft.into(),
        }
    }

    /// Returns `true` when both layers are empty.
    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty() && self.draft.is_empty()
    }
}

impl Merge for Pair {
    /// `(a ⊕ b).confirmed = a.confirmed + b.confirmed`; the newer draft wins.
    fn merge(&mut self, other: Self) {
        self.confirmed.push_str(&other.confirmed);
        self.draft = other.draft;
    }
}

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// A chunk of mono 16 kHz signed 16-bit PCM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioFrame {
    /// PCM samples, mono, 16 kHz.
    pub samples: Vec<i16>,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Frame duration in seconds at the pipeline sample rate.
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(sample_rate)
    }
}

impl Merge for AudioFrame {
    fn merge(&mut self, other: Self) {
        self.samples.extend(other.samples);
    }
}

// ---------------------------------------------------------------------------
// MergeQueue
// ---------------------------------------------------------------------------

/// A blocking SPSC queue that merges consecutive items into its tail.
///
/// * [`put`](Self::put) never blocks.  A `Some(item)` is merged into the
///   current tail when that tail is itself a real item; otherwise it is
///   appended.  A `None` sentinel is always appended as its own entry.
/// * [`get`](Self::get) blocks until an entry is available and pops the head
///   — possibly the sentinel.
///
/// The sequence observed by `get` is a refinement of the put sequence:
/// merging only combines adjacent items, never reorders or drops them, and
/// sentinels are delivered exactly where they were put.
pub struct MergeQueue<T: Merge> {
    entries: Mutex<VecDeque<Option<T>>>,
    cond: Condvar,
}

impl<T: Merge> MergeQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        }
    }

    /// Enqueue an item or the end-of-stream sentinel.
    pub fn put(&self, item: Option<T>) {
        let mut entries = self.entries.lock().unwrap();
        match item {
            None => entries.push_back(None),
            Some(item) => match entries.back_mut() {
                Some(Some(tail)) => tail.merge(item),
                _ => entries.push_back(Some(item)),
            },
        }
        self.cond.notify_one();
    }

    /// Pop the head entry, blocking while the queue is empty.
    ///
    /// Returns `None` when the head is the end-of-stream sentinel.
    pub fn get(&self) -> Option<T> {
        let mut entries = self.entries.lock().unwrap();
        while entries.is_empty() {
            entries = self.cond.wait(entries).unwrap();
        }
        entries.pop_front().unwrap()
    }

    /// Non-blocking pop for polling consumers (UIs).
    pub fn try_get(&self) -> Option<Option<T>> {
        self.entries.lock().unwrap().pop_front()
    }

    /// Returns `true` when at least one entry (item or sentinel) is queued.
    pub fn is_nonempty(&self) -> bool {
        !self.entries.lock().unwrap().is_empty()
    }
}

impl<T: Merge> Default for MergeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
