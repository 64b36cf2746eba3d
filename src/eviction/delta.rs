use super::{EvictionResult, EvictionStrategy, PartitionCx};
use crate::checkpoint::{CheckpointReader, CheckpointWriter};
use crate::error::{CheckpointError, CheckpointResult};
use crate::partitioning::{PartitionKey, WindowTuple};
use crate::policy::{DeltaPolicy, PolicyKind, WindowKind};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

const MARKER: &str = "DeltaEviction";

/// Attribute delta eviction.
///
/// Sliding: before an insert, every buffered tuple lying beyond the delta of
/// the incoming tuple is evicted. While a partition receives tuples in
/// attribute order the beyond-the-delta tuples form a prefix and are trimmed
/// from the front. The first out-of-order arrival switches the partition to a
/// scan of the whole buffer for the rest of its life, unless monotonic
/// recovery is enabled and a scan empties the buffer.
///
/// Tumbling: an incoming tuple beyond the delta of the first buffered tuple
/// flushes the partition and opens the next window.
pub struct DeltaEviction<K, T> {
  policy: DeltaPolicy<T>,
  kind: WindowKind,
  monotonic: BTreeMap<K, bool>,
  full: BTreeSet<K>,
}

impl<K: PartitionKey, T: WindowTuple> DeltaEviction<K, T> {
  /// Creates a delta eviction.
  pub fn new(policy: DeltaPolicy<T>, kind: WindowKind) -> Self {
    Self {
      policy,
      kind,
      monotonic: BTreeMap::new(),
      full: BTreeSet::new(),
    }
  }

  /// Returns false once `key` has seen an out-of-order tuple.
  pub fn is_monotonic(&self, key: &K) -> bool {
    self.monotonic.get(key).copied().unwrap_or(true)
  }

  fn slide(&mut self, cx: &mut PartitionCx<'_, K, T>, incoming: &T) {
    let policy = &self.policy;
    let monotonic = self.monotonic.entry(cx.key.clone()).or_insert(true);

    if *monotonic
      && cx
        .tuples
        .back()
        .is_some_and(|last| !policy.is_ordered(last, incoming))
    {
      warn!(
        partition = ?cx.key,
        "Out-of-order tuple, delta eviction falls back to scanning the partition"
      );
      *monotonic = false;
    }

    let any_beyond = if *monotonic {
      cx.tuples.front().is_some_and(|old| policy.is_beyond(old, incoming))
    } else {
      cx.tuples.iter().any(|old| policy.is_beyond(old, incoming))
    };
    if !any_beyond {
      return;
    }
    if !self.full.contains(cx.key) {
      self.full.insert(cx.key.clone());
      cx.initial_full();
    }
    if *monotonic {
      while cx
        .tuples
        .front()
        .is_some_and(|old| policy.is_beyond(old, incoming))
      {
        cx.evict_front();
      }
    } else {
      cx.evict_where(|old| policy.is_beyond(old, incoming));
      if cx.tuples.is_empty() && policy.recovers_when_empty() {
        *monotonic = true;
      }
    }
  }
}

impl<K: PartitionKey, T: WindowTuple> EvictionStrategy<K, T> for DeltaEviction<K, T> {
  fn kind(&self) -> PolicyKind {
    PolicyKind::Delta
  }

  fn partition_created(&mut self, key: &K, _now: f64) {
    if self.kind == WindowKind::Sliding {
      self.monotonic.insert(key.clone(), true);
    }
  }

  fn before_insert(&mut self, cx: &mut PartitionCx<'_, K, T>, incoming: &T) -> EvictionResult {
    match self.kind {
      WindowKind::Sliding => {
        self.slide(cx, incoming);
        EvictionResult::Continue
      }
      WindowKind::Tumbling => {
        let beyond = cx
          .tuples
          .front()
          .is_some_and(|first| self.policy.is_beyond(first, incoming));
        if beyond {
          EvictionResult::Flush
        } else {
          EvictionResult::Continue
        }
      }
    }
  }

  fn after_insert(&mut self, _cx: &mut PartitionCx<'_, K, T>) -> EvictionResult {
    EvictionResult::Continue
  }

  fn partition_removed(&mut self, key: &K) {
    self.monotonic.remove(key);
    self.full.remove(key);
  }

  fn checkpoint(&self, w: &mut CheckpointWriter<'_>) -> CheckpointResult<()> {
    w.marker(MARKER)?;
    w.put(&self.policy.delta())?;
    w.put(&self.monotonic)?;
    w.put(&self.full)
  }

  fn restore(&mut self, r: &mut CheckpointReader<'_>) -> CheckpointResult<()> {
    r.expect_marker(MARKER)?;
    let delta: f64 = r.get()?;
    if delta.to_bits() != self.policy.delta().to_bits() {
      return Err(CheckpointError::Corrupt(format!(
        "checkpoint has delta {}, window has {}",
        delta,
        self.policy.delta()
      )));
    }
    self.monotonic = r.get()?;
    self.full = r.get()?;
    Ok(())
  }

  fn reset(&mut self) {
    self.monotonic.clear();
    self.full.clear();
  }
}
