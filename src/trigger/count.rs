use super::{TriggerResult, TriggerStrategy};
use crate::checkpoint::{CheckpointReader, CheckpointWriter};
use crate::error::{CheckpointError, CheckpointResult};
use crate::partitioning::PartitionKey;
use crate::policy::PolicyKind;
use std::collections::BTreeMap;

const MARKER: &str = "CountTrigger";

/// Trigger that fires after every `size` insertions into a partition.
#[derive(Clone, Debug)]
pub struct CountTrigger<K> {
  size: usize,
  counts: BTreeMap<K, usize>,
}

impl<K: PartitionKey> CountTrigger<K> {
  /// Creates a new count trigger that fires after `size` insertions.
  pub fn new(size: usize) -> Self {
    Self {
      size,
      counts: BTreeMap::new(),
    }
  }

  /// Returns the target count.
  pub fn size(&self) -> usize {
    self.size
  }

  /// Insertions into `key` since it last fired.
  pub fn pending(&self, key: &K) -> usize {
    self.counts.get(key).copied().unwrap_or(0)
  }
}

impl<K: PartitionKey> TriggerStrategy<K> for CountTrigger<K> {
  fn kind(&self) -> PolicyKind {
    PolicyKind::Count
  }

  fn partition_created(&mut self, key: &K, _now: f64) {
    self.counts.insert(key.clone(), 0);
  }

  fn after_insert(&mut self, key: &K, _now: f64) -> TriggerResult {
    let count = self.counts.entry(key.clone()).or_insert(0);
    *count += 1;

    if *count >= self.size {
      *count = 0;
      TriggerResult::Fire
    } else {
      TriggerResult::Continue
    }
  }

  fn partition_removed(&mut self, key: &K) {
    self.counts.remove(key);
  }

  fn checkpoint(&self, w: &mut CheckpointWriter<'_>) -> CheckpointResult<()> {
    w.marker(MARKER)?;
    w.put(&self.size)?;
    w.put(&self.counts)
  }

  fn restore(&mut self, r: &mut CheckpointReader<'_>) -> CheckpointResult<()> {
    r.expect_marker(MARKER)?;
    let size: usize = r.get()?;
    if size != self.size {
      return Err(CheckpointError::Corrupt(format!(
        "checkpoint has count trigger size {}, window has {}",
        size, self.size
      )));
    }
    self.counts = r.get()?;
    Ok(())
  }

  fn reset(&mut self) {
    self.counts.clear();
  }
}
