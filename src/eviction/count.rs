use super::{EvictionResult, EvictionStrategy, PartitionCx};
use crate::checkpoint::{CheckpointReader, CheckpointWriter};
use crate::error::{CheckpointError, CheckpointResult};
use crate::partitioning::{PartitionKey, WindowTuple};
use crate::policy::{PolicyKind, WindowKind};
use std::collections::BTreeSet;

const MARKER: &str = "CountEviction";

/// Count based eviction.
///
/// Sliding: a full buffer loses its oldest tuple before each insert, and the
/// first time a partition fills up `on_initial_full` fires.
/// Tumbling: the insert that fills the buffer flushes the partition.
#[derive(Clone, Debug)]
pub struct CountEviction<K> {
  size: usize,
  kind: WindowKind,
  full: BTreeSet<K>,
}

impl<K: PartitionKey> CountEviction<K> {
  /// Creates a count eviction of `size` tuples.
  pub fn new(size: usize, kind: WindowKind) -> Self {
    Self {
      size,
      kind,
      full: BTreeSet::new(),
    }
  }

  /// Configured size.
  pub fn size(&self) -> usize {
    self.size
  }
}

impl<K: PartitionKey, T: WindowTuple> EvictionStrategy<K, T> for CountEviction<K> {
  fn kind(&self) -> PolicyKind {
    PolicyKind::Count
  }

  fn partition_created(&mut self, _key: &K, _now: f64) {}

  fn before_insert(&mut self, cx: &mut PartitionCx<'_, K, T>, _incoming: &T) -> EvictionResult {
    if self.kind == WindowKind::Sliding && cx.tuples.len() >= self.size {
      cx.evict_front();
    }
    EvictionResult::Continue
  }

  fn after_insert(&mut self, cx: &mut PartitionCx<'_, K, T>) -> EvictionResult {
    match self.kind {
      WindowKind::Sliding => {
        if cx.tuples.len() == self.size && !self.full.contains(cx.key) {
          self.full.insert(cx.key.clone());
          cx.initial_full();
        }
        EvictionResult::Continue
      }
      WindowKind::Tumbling if cx.len() >= self.size => EvictionResult::Flush,
      WindowKind::Tumbling => EvictionResult::Continue,
    }
  }

  fn partition_removed(&mut self, key: &K) {
    self.full.remove(key);
  }

  fn checkpoint(&self, w: &mut CheckpointWriter<'_>) -> CheckpointResult<()> {
    w.marker(MARKER)?;
    w.put(&self.size)?;
    w.put(&self.full)
  }

  fn restore(&mut self, r: &mut CheckpointReader<'_>) -> CheckpointResult<()> {
    r.expect_marker(MARKER)?;
    let size: usize = r.get()?;
    if size != self.size {
      return Err(CheckpointError::Corrupt(format!(
        "checkpoint has count eviction size {}, window has {}",
        size, self.size
      )));
    }
    self.full = r.get()?;
    Ok(())
  }

  fn reset(&mut self) {
    self.full.clear();
  }
}
