use super::{TriggerResult, TriggerStrategy};
use crate::checkpoint::{CheckpointReader, CheckpointWriter};
use crate::error::{CheckpointError, CheckpointResult};
use crate::partitioning::PartitionKey;
use crate::policy::PolicyKind;
use std::collections::BTreeMap;

const MARKER: &str = "TimeTrigger";

/// Trigger that fires on a tick once `seconds` have elapsed since a partition
/// last fired. A new partition counts as having fired when it was created.
///
/// The boundary is inclusive: a tick exactly `seconds` after the last firing
/// fires (`now - last >= seconds`), so ticks landing on the interval fire on
/// every interval.
#[derive(Clone, Debug)]
pub struct TimeTrigger<K> {
  seconds: f64,
  last_fire_times: BTreeMap<K, f64>,
}

impl<K: PartitionKey> TimeTrigger<K> {
  /// Creates a new time trigger.
  pub fn new(seconds: f64) -> Self {
    Self {
      seconds,
      last_fire_times: BTreeMap::new(),
    }
  }

  /// Returns the trigger interval in seconds.
  pub fn seconds(&self) -> f64 {
    self.seconds
  }
}

impl<K: PartitionKey> TriggerStrategy<K> for TimeTrigger<K> {
  fn kind(&self) -> PolicyKind {
    PolicyKind::Time
  }

  fn needs_timer(&self) -> bool {
    true
  }

  fn partition_created(&mut self, key: &K, now: f64) {
    self.last_fire_times.insert(key.clone(), now);
  }

  fn on_tick(&mut self, key: &K, now: f64) -> TriggerResult {
    let last_fire = self.last_fire_times.entry(key.clone()).or_insert(now);
    if now - *last_fire >= self.seconds {
      *last_fire = now;
      TriggerResult::Fire
    } else {
      TriggerResult::Continue
    }
  }

  fn partition_removed(&mut self, key: &K) {
    self.last_fire_times.remove(key);
  }

  fn checkpoint(&self, w: &mut CheckpointWriter<'_>) -> CheckpointResult<()> {
    w.marker(MARKER)?;
    w.put(&self.seconds)?;
    w.put(&self.last_fire_times)
  }

  fn restore(&mut self, r: &mut CheckpointReader<'_>) -> CheckpointResult<()> {
    r.expect_marker(MARKER)?;
    let seconds: f64 = r.get()?;
    if seconds.to_bits() != self.seconds.to_bits() {
      return Err(CheckpointError::Corrupt(format!(
        "checkpoint has time trigger of {}s, window has {}s",
        seconds, self.seconds
      )));
    }
    self.last_fire_times = r.get()?;
    Ok(())
  }

  fn reset(&mut self) {
    self.last_fire_times.clear();
  }
}
