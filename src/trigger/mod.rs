//! # Trigger strategies
//!
//! Sliding windows use a trigger to decide when downstream logic should look
//! at a partition. Triggers never change the buffer; they only decide when
//! `on_trigger` fires. Within one insertion, or one tick, eviction has always
//! completed before a trigger is evaluated.
//!
//! - [`CountTrigger`]: fires every `size` insertions into a partition.
//! - [`TimeTrigger`]: fires on a tick once `seconds` have elapsed since the
//!   partition last fired (or was created).

mod count;
mod time;

pub use count::CountTrigger;
pub use time::TimeTrigger;

use crate::checkpoint::{CheckpointReader, CheckpointWriter};
use crate::error::CheckpointResult;
use crate::policy::PolicyKind;

/// Marker written in place of trigger state by windows without a trigger.
pub(crate) const NO_TRIGGER_MARKER: &str = "NoTrigger";

/// Result of evaluating a trigger for one partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerResult {
  /// Do nothing.
  Continue,
  /// Fire `on_trigger` for the partition.
  Fire,
}

/// Trigger half of a sliding window.
pub trait TriggerStrategy<K>: Send {
  /// Policy implemented by this trigger.
  fn kind(&self) -> PolicyKind;

  /// Returns true when the trigger must be driven by timer ticks.
  fn needs_timer(&self) -> bool {
    false
  }

  /// A partition was created at `now`.
  fn partition_created(&mut self, key: &K, now: f64);

  /// Evaluated after a tuple was appended to `key`.
  fn after_insert(&mut self, _key: &K, _now: f64) -> TriggerResult {
    TriggerResult::Continue
  }

  /// Evaluated for every partition on a timer tick.
  fn on_tick(&mut self, _key: &K, _now: f64) -> TriggerResult {
    TriggerResult::Continue
  }

  /// A partition was removed. Per-partition state must be dropped.
  fn partition_removed(&mut self, key: &K);

  /// Writes the trigger marker and state.
  fn checkpoint(&self, w: &mut CheckpointWriter<'_>) -> CheckpointResult<()>;

  /// Reads what [`TriggerStrategy::checkpoint`] wrote.
  fn restore(&mut self, r: &mut CheckpointReader<'_>) -> CheckpointResult<()>;

  /// Drops all state.
  fn reset(&mut self);
}
