//! # Eviction strategies
//!
//! An eviction strategy decides which tuples leave a partition and, for
//! tumbling windows, when a partition is flushed as a whole.
//!
//! | Policy | Sliding | Tumbling |
//! |---|---|---|
//! | count | evict the oldest tuple before an insert into a full buffer | flush after the insert that fills the buffer |
//! | time | evict tuples older than the window, on insert and on every tick | flush once the window has been open for its length |
//! | delta | evict tuples beyond the delta of the incoming tuple | flush when the incoming tuple is beyond the first buffered one |
//! | punct | n/a | flush on window punctuation |
//!
//! Strategies keep their per-partition bookkeeping in ordered maps keyed by
//! partition, so checkpoints are deterministic. The window tells a strategy
//! about partition creation and removal; the strategy never sees the store.

mod count;
mod delta;
mod punct;
mod time;

pub use count::CountEviction;
pub use delta::DeltaEviction;
pub use punct::PunctEviction;
pub use time::TimeEviction;

use crate::checkpoint::{CheckpointReader, CheckpointWriter};
use crate::error::CheckpointResult;
use crate::event::EventSinks;
use crate::policy::PolicyKind;
use std::collections::{BTreeMap, VecDeque};

/// Outcome of an eviction step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionResult {
  /// Nothing more to do.
  Continue,
  /// Flush the whole partition (tumbling windows).
  Flush,
}

/// One partition as seen by a strategy during a single step.
pub struct PartitionCx<'a, K, T> {
  /// Partition key.
  pub key: &'a K,
  /// Buffered tuples, oldest first.
  pub tuples: &'a mut VecDeque<T>,
  /// Tuples of the partition held by a summarizer instead of the buffer.
  pub summarized: usize,
  /// Sinks receiving eviction events.
  pub sinks: &'a EventSinks<K, T>,
  /// Current time in seconds.
  pub now: f64,
}

impl<K, T> PartitionCx<'_, K, T> {
  /// Number of tuples in the window, buffered or summarized.
  pub fn len(&self) -> usize {
    self.tuples.len() + self.summarized
  }

  /// Evicts the oldest tuple. Returns false when the buffer is empty.
  pub fn evict_front(&mut self) -> bool {
    let Some(front) = self.tuples.front() else {
      return false;
    };
    self.sinks.before_evict(self.key, front);
    if let Some(tuple) = self.tuples.pop_front() {
      self.sinks.after_evict(self.key, &tuple);
    }
    true
  }

  /// Evicts every tuple matching `pred`, keeping the order of the others.
  /// Returns the number evicted.
  pub fn evict_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
    let mut evicted = 0;
    let mut i = 0;
    while i < self.tuples.len() {
      if pred(&self.tuples[i]) {
        self.sinks.before_evict(self.key, &self.tuples[i]);
        if let Some(tuple) = self.tuples.remove(i) {
          self.sinks.after_evict(self.key, &tuple);
        }
        evicted += 1;
      } else {
        i += 1;
      }
    }
    evicted
  }

  /// Emits the initial-full event with the current buffer.
  pub fn initial_full(&self) {
    self.sinks.initial_full(self.key, &*self.tuples);
  }
}

/// Eviction half of a window.
pub trait EvictionStrategy<K, T>: Send {
  /// Policy implemented by this strategy.
  fn kind(&self) -> PolicyKind;

  /// Returns true when the strategy must be driven by timer ticks.
  fn needs_timer(&self) -> bool {
    false
  }

  /// A partition was created at `now`.
  fn partition_created(&mut self, key: &K, now: f64);

  /// Runs before `incoming` is appended to an existing partition.
  fn before_insert(&mut self, cx: &mut PartitionCx<'_, K, T>, incoming: &T) -> EvictionResult;

  /// Runs after a tuple was appended.
  fn after_insert(&mut self, cx: &mut PartitionCx<'_, K, T>) -> EvictionResult;

  /// Runs for every partition on a timer tick.
  fn on_tick(&mut self, _cx: &mut PartitionCx<'_, K, T>) -> EvictionResult {
    EvictionResult::Continue
  }

  /// A partition was removed. Per-partition bookkeeping must be dropped.
  fn partition_removed(&mut self, key: &K);

  /// Writes the strategy marker and state.
  fn checkpoint(&self, w: &mut CheckpointWriter<'_>) -> CheckpointResult<()>;

  /// Reads what [`EvictionStrategy::checkpoint`] wrote.
  fn restore(&mut self, r: &mut CheckpointReader<'_>) -> CheckpointResult<()>;

  /// Checks restored bookkeeping against the restored partitions, given as
  /// key and number of buffered tuples.
  fn verify_restored(&self, _buffered: &BTreeMap<K, usize>) -> CheckpointResult<()> {
    Ok(())
  }

  /// Drops all bookkeeping.
  fn reset(&mut self);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::event::WindowEvent;
  use std::sync::{Arc, Mutex};

  #[derive(Default)]
  struct Log(Mutex<Vec<String>>);

  impl WindowEvent<u8, i32> for Log {
    fn before_evict(&self, _key: &u8, tuple: &i32) {
      self.0.lock().unwrap().push(format!("before {}", tuple));
    }
    fn after_evict(&self, _key: &u8, tuple: &i32) {
      self.0.lock().unwrap().push(format!("after {}", tuple));
    }
  }

  #[test]
  fn evict_where_keeps_order_and_brackets_events() {
    let log = Arc::new(Log::default());
    let mut sinks: EventSinks<u8, i32> = EventSinks::new();
    sinks.push(log.clone());
    let mut tuples: VecDeque<i32> = [1, 2, 3, 4].into_iter().collect();
    let mut cx = PartitionCx {
      key: &0u8,
      tuples: &mut tuples,
      summarized: 0,
      sinks: &sinks,
      now: 0.0,
    };
    assert_eq!(cx.evict_where(|v| v % 2 == 0), 2);
    assert!(cx.evict_front());
    assert_eq!(tuples, VecDeque::from(vec![3]));
    assert_eq!(
      *log.0.lock().unwrap(),
      vec!["before 2", "after 2", "before 4", "after 4", "before 1", "after 1"]
    );
  }
}
