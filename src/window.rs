//! # Window core
//!
//! [`WindowCore`] is the single-threaded window state machine: a
//! [`PartitionStore`], one eviction strategy, an optional trigger (sliding
//! windows), optional partition eviction, and the event sinks that observe it
//! all. Every entry point runs to completion before returning, so a checkpoint
//! always sees the window between two complete insertions.
//!
//! `WindowCore` takes no lock. Operators that drive a count or delta window
//! from one thread can own it directly; anything time based, or shared with a
//! timer thread, goes through [`Window`](crate::runtime::Window).
//!
//! ## Insertion
//!
//! 1. age partition eviction, when the policy evaluates before insertion;
//! 2. eviction before the insert (sliding evictions, tumbling flush of a
//!    closed window);
//! 3. partition creation, `before_insert`, append (or hand the tuple to the
//!    partition's summarizer), `after_insert`;
//! 4. eviction after the insert (count tumbling flush, bookkeeping), then the
//!    trigger;
//! 5. the partition becomes the most recently used one and count partition
//!    eviction runs.
//!
//! ## Checkpoint layout
//!
//! ```text
//! u8 checksum flag
//! "Window"      u8 window kind
//! "WindowBase"  partitions in key order (key, tuples, summarized count), LRU list,
//!               u32 partition eviction tag, [u64 tuple total]
//! eviction marker + state
//! trigger marker + state | "NoTrigger"
//! "Summarizers" count, (key, summarizer state)* | "NoSummarizer"
//! event sink state
//! [SHA-256 digest]
//! ```

use crate::checkpoint::{CheckpointCodec, CheckpointReader, CheckpointStream};
use crate::error::{CheckpointError, CheckpointResult, WindowResult};
use crate::event::EventSinks;
use crate::eviction::{EvictionResult, EvictionStrategy, PartitionCx};
use crate::partition_eviction::{PartitionEvictor, PartitionSelection};
use crate::partitioning::{PartitionKey, WindowTuple};
use crate::policy::{PolicyKind, WindowKind};
use crate::store::PartitionStore;
use crate::summarizer::{NO_SUMMARIZER_MARKER, Summaries, TumblingSummarizer};
use crate::time::Clock;
use crate::trigger::{NO_TRIGGER_MARKER, TriggerResult, TriggerStrategy};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

const WINDOW_MARKER: &str = "Window";
const BASE_MARKER: &str = "WindowBase";

/// Why a window is being reset to its initial state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetCause {
  /// The window resets itself, e.g. before or after a failed restore.
  /// Event sinks are not notified.
  Internal,
  /// The job rolled back to a known-good state. Event sinks receive
  /// `on_reset_to_initial_state`.
  External,
}

/// Window state machine without locking.
pub struct WindowCore<K: PartitionKey, T: WindowTuple> {
  kind: WindowKind,
  store: PartitionStore<K, T>,
  eviction: Box<dyn EvictionStrategy<K, T>>,
  trigger: Option<Box<dyn TriggerStrategy<K>>>,
  partition_evictor: Option<PartitionEvictor>,
  sinks: EventSinks<K, T>,
  summaries: Option<Summaries<K, T>>,
  clock: Arc<dyn Clock>,
  codec: CheckpointCodec,
}

impl<K: PartitionKey, T: WindowTuple> WindowCore<K, T> {
  pub(crate) fn from_parts(
    kind: WindowKind,
    eviction: Box<dyn EvictionStrategy<K, T>>,
    trigger: Option<Box<dyn TriggerStrategy<K>>>,
    partition_evictor: Option<PartitionEvictor>,
    sinks: EventSinks<K, T>,
    summaries: Option<Summaries<K, T>>,
    clock: Arc<dyn Clock>,
    codec: CheckpointCodec,
  ) -> Self {
    Self {
      kind,
      store: PartitionStore::new(),
      eviction,
      trigger,
      partition_evictor,
      sinks,
      summaries,
      clock,
      codec,
    }
  }

  /// Window flavour.
  pub fn kind(&self) -> WindowKind {
    self.kind
  }

  /// Eviction policy discriminant.
  pub fn eviction_kind(&self) -> PolicyKind {
    self.eviction.kind()
  }

  /// Trigger policy discriminant, for sliding windows with a trigger.
  pub fn trigger_kind(&self) -> Option<PolicyKind> {
    self.trigger.as_ref().map(|t| t.kind())
  }

  /// Partition eviction, if configured.
  pub fn partition_evictor(&self) -> Option<&PartitionEvictor> {
    self.partition_evictor.as_ref()
  }

  /// Returns true when some component must be driven by [`WindowCore::tick`].
  pub fn needs_timer(&self) -> bool {
    self.eviction.needs_timer()
      || self.trigger.as_ref().is_some_and(|t| t.needs_timer())
      || self
        .partition_evictor
        .is_some_and(|pe| pe.policy().is_age_based())
  }

  /// Checkpoint codec settings.
  pub fn codec(&self) -> CheckpointCodec {
    self.codec
  }

  /// Read access to the partition store.
  pub fn store(&self) -> &PartitionStore<K, T> {
    &self.store
  }

  /// Buffered tuples of `key`, oldest first.
  pub fn partition_tuples(&self, key: &K) -> Option<&VecDeque<T>> {
    self.store.get(key).map(|p| p.tuples())
  }

  /// Summarizer of the open window of `key`, for summarized tumbling windows.
  pub fn summarizer(&self, key: &K) -> Option<&dyn TumblingSummarizer<K, T>> {
    self.summaries.as_ref()?.get(key)
  }

  /// Total tuples in the window, buffered or summarized.
  pub fn tuple_count(&self) -> usize {
    self.store.tuple_count()
  }

  /// Number of partitions.
  pub fn partition_count(&self) -> usize {
    self.store.partition_count()
  }

  /// Inserts `tuple` into partition `key`.
  pub fn insert(&mut self, key: K, tuple: T) {
    let now = self.clock.now();

    if self
      .partition_evictor
      .is_some_and(|pe| pe.policy().evaluates_before_insertion())
    {
      self.evict_partitions(now);
    }

    if self.store.contains(&key) {
      let eviction = &mut self.eviction;
      let sinks = &self.sinks;
      let result = self.store.with_partition(&key, |tuples, summarized| {
        eviction.before_insert(
          &mut PartitionCx {
            key: &key,
            tuples,
            summarized,
            sinks,
            now,
          },
          &tuple,
        )
      });
      if result == Some(EvictionResult::Flush) {
        self.flush(&key);
      }
    }

    if self.store.ensure(&key) {
      self.sinks.open_window(&key);
      if let Some(summaries) = self.summaries.as_mut() {
        summaries.open(&key);
      }
      self.eviction.partition_created(&key, now);
      if let Some(trigger) = self.trigger.as_mut() {
        trigger.partition_created(&key, now);
      }
    }

    self.sinks.before_insert(&key, &tuple);
    match self.summaries.as_mut() {
      Some(summaries) => {
        summaries.insert(&key, &tuple);
        self.sinks.after_insert(&key, &tuple);
        let keep_first = self.eviction.kind() == PolicyKind::Delta;
        self.store.push_summarized(&key, tuple, keep_first);
      }
      None => {
        self.store.push(&key, tuple);
        if let Some(last) = self.store.get(&key).and_then(|p| p.tuples().back()) {
          self.sinks.after_insert(&key, last);
        }
      }
    }

    let eviction = &mut self.eviction;
    let sinks = &self.sinks;
    let result = self.store.with_partition(&key, |tuples, summarized| {
      eviction.after_insert(&mut PartitionCx {
        key: &key,
        tuples,
        summarized,
        sinks,
        now,
      })
    });

    if let Some(trigger) = self.trigger.as_mut() {
      if trigger.after_insert(&key, now) == TriggerResult::Fire {
        if let Some(p) = self.store.get(&key) {
          self.sinks.trigger(&key, p.tuples());
        }
      }
    }

    if result == Some(EvictionResult::Flush) {
      self.flush(&key);
    } else {
      self.store.touch(&key, now);
    }

    if self
      .partition_evictor
      .is_some_and(|pe| !pe.policy().evaluates_before_insertion())
    {
      self.evict_partitions(now);
    }
  }

  /// Handles a window punctuation. Punctuation windows flush every partition
  /// holding tuples, or report an empty window; other windows ignore it.
  pub fn insert_punctuation(&mut self) {
    if self.eviction.kind() != PolicyKind::Punct {
      return;
    }
    let keys = self.non_empty_keys();
    if keys.is_empty() {
      self.sinks.empty_window_punct();
      return;
    }
    for key in keys {
      self.flush(&key);
    }
  }

  /// Flushes every partition of a tumbling window that holds tuples, as on
  /// the final punctuation of a stream. Sliding windows are left untouched.
  pub fn drain(&mut self) {
    if self.kind != WindowKind::Tumbling {
      return;
    }
    for key in self.non_empty_keys() {
      self.flush(&key);
    }
  }

  /// Drives time based eviction, time triggers and age partition eviction.
  pub fn tick(&mut self) {
    let now = self.clock.now();
    trace!(now, partitions = self.store.partition_count(), "Window tick");

    if self
      .partition_evictor
      .is_some_and(|pe| pe.policy().is_age_based())
    {
      self.evict_partitions(now);
    }

    if self.eviction.needs_timer() {
      for key in self.store.sorted_keys() {
        let eviction = &mut self.eviction;
        let sinks = &self.sinks;
        let result = self.store.with_partition(&key, |tuples, summarized| {
          eviction.on_tick(&mut PartitionCx {
            key: &key,
            tuples,
            summarized,
            sinks,
            now,
          })
        });
        if result == Some(EvictionResult::Flush) {
          self.flush(&key);
        }
      }
    }

    if let Some(trigger) = self.trigger.as_mut() {
      if trigger.needs_timer() {
        for key in self.store.sorted_keys() {
          if trigger.on_tick(&key, now) == TriggerResult::Fire {
            if let Some(p) = self.store.get(&key) {
              self.sinks.trigger(&key, p.tuples());
            }
          }
        }
      }
    }
  }

  /// Writes the window to `stream`. The window itself is not modified, so a
  /// failed write leaves it as it was.
  pub fn checkpoint(&self, stream: &mut dyn CheckpointStream) -> WindowResult<()> {
    let mut w = self.codec.writer(stream)?;
    w.marker(WINDOW_MARKER)?;
    w.put(&self.kind.tag())?;

    w.marker(BASE_MARKER)?;
    self.store.checkpoint(&mut w)?;
    w.put(&self.partition_evictor.map_or(0, |pe| pe.policy().tag()))?;
    if self
      .partition_evictor
      .is_some_and(|pe| pe.policy().tracks_tuples())
    {
      w.put(&(self.store.tuple_count() as u64))?;
    }

    self.eviction.checkpoint(&mut w)?;
    match &self.trigger {
      Some(trigger) => trigger.checkpoint(&mut w)?,
      None => w.marker(NO_TRIGGER_MARKER)?,
    }
    match &self.summaries {
      Some(summaries) => summaries.checkpoint(&mut w)?,
      None => w.marker(NO_SUMMARIZER_MARKER)?,
    }
    self.sinks.checkpoint(&mut w)?;
    w.finish()?;
    debug!(
      partitions = self.store.partition_count(),
      tuples = self.store.tuple_count(),
      "Window checkpointed"
    );
    Ok(())
  }

  /// Replaces the window state with the checkpoint read from `stream`.
  ///
  /// On any error the window is left empty, event sinks receive
  /// `on_reset_to_initial_state`, and the error is returned. A marker or
  /// digest mismatch is reported as [`CheckpointError::Corrupt`].
  pub fn restore(&mut self, stream: &mut dyn CheckpointStream) -> WindowResult<()> {
    self.reset_to_initial_state(ResetCause::Internal);
    match self.decode(stream) {
      Ok(()) => {
        info!(
          partitions = self.store.partition_count(),
          tuples = self.store.tuple_count(),
          "Window restored from checkpoint"
        );
        Ok(())
      }
      Err(e) => {
        warn!(error = %e, "Window restore failed, window reset to its initial state");
        self.reset_to_initial_state(ResetCause::Internal);
        self.sinks.reset_to_initial_state();
        Err(e.into())
      }
    }
  }

  /// Discards all partitions and strategy state.
  pub fn reset_to_initial_state(&mut self, cause: ResetCause) {
    self.store.clear();
    if let Some(summaries) = self.summaries.as_mut() {
      summaries.clear();
    }
    self.eviction.reset();
    if let Some(trigger) = self.trigger.as_mut() {
      trigger.reset();
    }
    if cause == ResetCause::External {
      debug!("Window reset to its initial state");
      self.sinks.reset_to_initial_state();
    }
  }

  fn decode(&mut self, stream: &mut dyn CheckpointStream) -> CheckpointResult<()> {
    let mut r = self.codec.reader(stream)?;
    r.expect_marker(WINDOW_MARKER)?;
    let kind: u8 = r.get()?;
    if kind != self.kind.tag() {
      return Err(CheckpointError::Corrupt(format!(
        "checkpoint window kind {} does not match {:?}",
        kind, self.kind
      )));
    }

    r.expect_marker(BASE_MARKER)?;
    self.store.restore(&mut r)?;
    self.restore_partition_eviction(&mut r)?;

    self.eviction.restore(&mut r)?;
    let buffered: BTreeMap<K, usize> = self
      .store
      .iter()
      .map(|(key, p)| (key.clone(), p.tuples().len()))
      .collect();
    self.eviction.verify_restored(&buffered)?;
    match self.trigger.as_mut() {
      Some(trigger) => trigger.restore(&mut r)?,
      None => r.expect_marker(NO_TRIGGER_MARKER)?,
    }
    match self.summaries.as_mut() {
      Some(summaries) => summaries.restore(&mut r, &self.store)?,
      None => r.expect_marker(NO_SUMMARIZER_MARKER)?,
    }
    self.sinks.reset(&mut r)?;
    r.finish()
  }

  fn restore_partition_eviction(&mut self, r: &mut CheckpointReader<'_>) -> CheckpointResult<()> {
    let tag: u32 = r.get()?;
    let expected = self.partition_evictor.map_or(0, |pe| pe.policy().tag());
    if tag != expected {
      return Err(CheckpointError::Corrupt(format!(
        "checkpoint partition eviction tag {} does not match {}",
        tag, expected
      )));
    }
    if self
      .partition_evictor
      .is_some_and(|pe| pe.policy().tracks_tuples())
    {
      let total: u64 = r.get()?;
      if total != self.store.tuple_count() as u64 {
        return Err(CheckpointError::Corrupt(format!(
          "checkpoint tuple total {} does not match {} restored tuples",
          total,
          self.store.tuple_count()
        )));
      }
    }
    Ok(())
  }

  fn non_empty_keys(&self) -> Vec<K> {
    let mut keys: Vec<K> = self
      .store
      .iter()
      .filter(|(_, p)| !p.is_empty())
      .map(|(k, _)| k.clone())
      .collect();
    keys.sort();
    keys
  }

  fn flush(&mut self, key: &K) {
    let Some(p) = self.store.get(key) else {
      return;
    };
    debug!(partition = ?key, tuples = p.len(), "Flushing window partition");
    if let Some(summaries) = self.summaries.as_mut() {
      summaries.close(key);
    }
    self.sinks.before_flush(key, p.tuples());
    self.store.remove(key);
    self.sinks.after_flush(key);
    self.partition_removed(key);
  }

  fn partition_removed(&mut self, key: &K) {
    if let Some(summaries) = self.summaries.as_mut() {
      summaries.remove(key);
    }
    self.eviction.partition_removed(key);
    if let Some(trigger) = self.trigger.as_mut() {
      trigger.partition_removed(key);
    }
    self.sinks.close_window(key);
  }

  fn evict_partitions(&mut self, now: f64) {
    let Some(evictor) = self.partition_evictor else {
      return;
    };
    if !evictor.eviction_needed(&self.store.stats(), now) {
      return;
    }

    if evictor.policy().is_operator_defined() && !self.sinks.is_empty() {
      let entries = self.store.lru();
      let selection = PartitionSelection::new(&entries);
      self.sinks.partition_eviction_selection(&selection);
      let victims = selection.marked();
      self.remove_partitions(&victims);
      if !evictor.eviction_needed(&self.store.stats(), now) {
        return;
      }
    }

    let entries = self.store.lru();
    let selection = PartitionSelection::new(&entries);
    evictor.select_lru(&selection, now);
    let victims = selection.marked();
    self.remove_partitions(&victims);
    debug_assert!(
      !evictor.eviction_needed(&self.store.stats(), now),
      "LRU partition eviction made no progress"
    );
  }

  fn remove_partitions(&mut self, victims: &[(K, f64)]) {
    if victims.is_empty() {
      return;
    }
    self.sinks.partition_eviction(victims);
    for (key, _) in victims {
      if self.store.remove(key).is_some() {
        debug!(partition = ?key, "Partition was removed");
        self.partition_removed(key);
      }
    }
  }
}
