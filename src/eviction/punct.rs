use super::{EvictionResult, EvictionStrategy, PartitionCx};
use crate::checkpoint::{CheckpointReader, CheckpointWriter};
use crate::error::CheckpointResult;
use crate::policy::PolicyKind;

const MARKER: &str = "PunctEviction";

/// Punctuation based tumbling eviction: tuples accumulate until the window
/// receives a window punctuation, which flushes every partition.
#[derive(Clone, Copy, Debug, Default)]
pub struct PunctEviction;

impl PunctEviction {
  /// Creates a punctuation eviction.
  pub fn new() -> Self {
    Self
  }
}

impl<K, T> EvictionStrategy<K, T> for PunctEviction {
  fn kind(&self) -> PolicyKind {
    PolicyKind::Punct
  }

  fn partition_created(&mut self, _key: &K, _now: f64) {}

  fn before_insert(&mut self, _cx: &mut PartitionCx<'_, K, T>, _incoming: &T) -> EvictionResult {
    EvictionResult::Continue
  }

  fn after_insert(&mut self, _cx: &mut PartitionCx<'_, K, T>) -> EvictionResult {
    EvictionResult::Continue
  }

  fn partition_removed(&mut self, _key: &K) {}

  fn checkpoint(&self, w: &mut CheckpointWriter<'_>) -> CheckpointResult<()> {
    w.marker(MARKER)
  }

  fn restore(&mut self, r: &mut CheckpointReader<'_>) -> CheckpointResult<()> {
    r.expect_marker(MARKER)
  }

  fn reset(&mut self) {}
}
