use super::{EvictionResult, EvictionStrategy, PartitionCx};
use crate::checkpoint::{CheckpointReader, CheckpointWriter};
use crate::error::{CheckpointError, CheckpointResult};
use crate::partitioning::{PartitionKey, WindowTuple};
use crate::policy::{PolicyKind, WindowKind};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

const MARKER: &str = "TimeEviction";

/// Time based eviction.
///
/// Sliding: every tuple remembers its arrival time and is evicted once it is
/// more than `seconds` old, checked before each insert and on every tick.
/// Tumbling: a partition opens when it is created and is flushed by the first
/// insert or tick at or after `open + seconds`.
#[derive(Clone, Debug)]
pub struct TimeEviction<K> {
  seconds: f64,
  kind: WindowKind,
  arrivals: BTreeMap<K, VecDeque<f64>>,
  opened: BTreeMap<K, f64>,
  full: BTreeSet<K>,
}

impl<K: PartitionKey> TimeEviction<K> {
  /// Creates a time eviction of `seconds`.
  pub fn new(seconds: f64, kind: WindowKind) -> Self {
    Self {
      seconds,
      kind,
      arrivals: BTreeMap::new(),
      opened: BTreeMap::new(),
      full: BTreeSet::new(),
    }
  }

  /// Window length in seconds.
  pub fn seconds(&self) -> f64 {
    self.seconds
  }

  fn expire<T>(&mut self, cx: &mut PartitionCx<'_, K, T>) {
    let Some(arrivals) = self.arrivals.get_mut(cx.key) else {
      return;
    };
    let expired = arrivals
      .iter()
      .take_while(|t| cx.now - **t > self.seconds)
      .count();
    if expired == 0 {
      return;
    }
    if !self.full.contains(cx.key) {
      self.full.insert(cx.key.clone());
      cx.initial_full();
    }
    for _ in 0..expired {
      arrivals.pop_front();
      cx.evict_front();
    }
  }

  fn window_closed(&self, key: &K, now: f64) -> bool {
    self
      .opened
      .get(key)
      .is_some_and(|open| now - open >= self.seconds)
  }
}

impl<K: PartitionKey, T: WindowTuple> EvictionStrategy<K, T> for TimeEviction<K> {
  fn kind(&self) -> PolicyKind {
    PolicyKind::Time
  }

  fn needs_timer(&self) -> bool {
    true
  }

  fn partition_created(&mut self, key: &K, now: f64) {
    match self.kind {
      WindowKind::Sliding => {
        self.arrivals.insert(key.clone(), VecDeque::new());
      }
      WindowKind::Tumbling => {
        self.opened.insert(key.clone(), now);
      }
    }
  }

  fn before_insert(&mut self, cx: &mut PartitionCx<'_, K, T>, _incoming: &T) -> EvictionResult {
    match self.kind {
      WindowKind::Sliding => {
        self.expire(cx);
        EvictionResult::Continue
      }
      WindowKind::Tumbling if self.window_closed(cx.key, cx.now) => EvictionResult::Flush,
      WindowKind::Tumbling => EvictionResult::Continue,
    }
  }

  fn after_insert(&mut self, cx: &mut PartitionCx<'_, K, T>) -> EvictionResult {
    if self.kind == WindowKind::Sliding {
      self
        .arrivals
        .entry(cx.key.clone())
        .or_default()
        .push_back(cx.now);
    }
    EvictionResult::Continue
  }

  fn on_tick(&mut self, cx: &mut PartitionCx<'_, K, T>) -> EvictionResult {
    match self.kind {
      WindowKind::Sliding => {
        self.expire(cx);
        EvictionResult::Continue
      }
      WindowKind::Tumbling if self.window_closed(cx.key, cx.now) => EvictionResult::Flush,
      WindowKind::Tumbling => EvictionResult::Continue,
    }
  }

  fn partition_removed(&mut self, key: &K) {
    self.arrivals.remove(key);
    self.opened.remove(key);
    self.full.remove(key);
  }

  fn checkpoint(&self, w: &mut CheckpointWriter<'_>) -> CheckpointResult<()> {
    w.marker(MARKER)?;
    w.put(&self.seconds)?;
    w.put(&self.arrivals)?;
    w.put(&self.opened)?;
    w.put(&self.full)
  }

  fn restore(&mut self, r: &mut CheckpointReader<'_>) -> CheckpointResult<()> {
    r.expect_marker(MARKER)?;
    let seconds: f64 = r.get()?;
    if seconds.to_bits() != self.seconds.to_bits() {
      return Err(CheckpointError::Corrupt(format!(
        "checkpoint has time eviction of {}s, window has {}s",
        seconds, self.seconds
      )));
    }
    self.arrivals = r.get()?;
    self.opened = r.get()?;
    self.full = r.get()?;
    Ok(())
  }

  fn verify_restored(&self, buffered: &BTreeMap<K, usize>) -> CheckpointResult<()> {
    match self.kind {
      WindowKind::Sliding => {
        if self.arrivals.len() != buffered.len() {
          return Err(CheckpointError::Corrupt(format!(
            "time eviction tracks {} partitions, window has {}",
            self.arrivals.len(),
            buffered.len()
          )));
        }
        for (key, len) in buffered {
          let tracked = self.arrivals.get(key).map(VecDeque::len);
          if tracked != Some(*len) {
            return Err(CheckpointError::Corrupt(format!(
              "time eviction tracks {:?} arrivals for partition {:?} holding {} tuples",
              tracked, key, len
            )));
          }
        }
      }
      WindowKind::Tumbling => {
        if self.opened.len() != buffered.len()
          || buffered.keys().any(|key| !self.opened.contains_key(key))
        {
          return Err(CheckpointError::Corrupt(
            "time eviction open times do not match the restored partitions".to_string(),
          ));
        }
      }
    }
    Ok(())
  }

  fn reset(&mut self) {
    self.arrivals.clear();
    self.opened.clear();
    self.full.clear();
  }
}
