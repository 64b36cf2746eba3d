//! Window event sinks.
//!
//! Operator logic observes a window through [`WindowEvent`]. Every method has a
//! no-op default, so a sink implements only what it cares about. Sinks run
//! synchronously inside the window's entry points, while the window lock is
//! held; a sink must not call back into the window that invoked it.
//!
//! Event order for one insertion:
//!
//! ```text
//! [on_partition_eviction (age)] -> [before_evict/after_evict]* | [before_flush, after_flush, on_close_window]
//! -> [on_open_window] -> before_insert -> after_insert -> [on_initial_full]
//! -> [on_trigger] | [before_flush, after_flush, on_close_window] -> [on_partition_eviction (count)]
//! ```

use crate::checkpoint::{CheckpointReader, CheckpointWriter};
use crate::error::CheckpointResult;
use crate::partition_eviction::PartitionSelection;
use std::collections::VecDeque;
use std::sync::Arc;

/// Observer of window activity.
#[allow(unused_variables)]
pub trait WindowEvent<K, T>: Send + Sync {
  /// A partition was created.
  fn on_open_window(&self, key: &K) {}

  /// `tuple` is about to be appended to partition `key`.
  fn before_insert(&self, key: &K, tuple: &T) {}

  /// `tuple` was appended to partition `key`.
  fn after_insert(&self, key: &K, tuple: &T) {}

  /// `tuple` is about to be evicted from partition `key`.
  fn before_evict(&self, key: &K, tuple: &T) {}

  /// `tuple` was evicted from partition `key`.
  fn after_evict(&self, key: &K, tuple: &T) {}

  /// A sliding partition reached its full extent for the first time.
  fn on_initial_full(&self, key: &K, tuples: &VecDeque<T>) {}

  /// The trigger policy fired for partition `key`.
  fn on_trigger(&self, key: &K, tuples: &VecDeque<T>) {}

  /// A tumbling partition is about to be flushed.
  fn before_flush(&self, key: &K, tuples: &VecDeque<T>) {}

  /// A tumbling partition was flushed.
  fn after_flush(&self, key: &K) {}

  /// A partition was removed, by a tumbling flush or by partition eviction.
  fn on_close_window(&self, key: &K) {}

  /// A window punctuation arrived while no partition held tuples.
  fn on_empty_window_punct(&self) {}

  /// Operator-defined partition eviction: mark victims in `selection`.
  fn on_partition_eviction_selection(&self, selection: &PartitionSelection<'_, K>) {}

  /// Partitions about to be removed by partition eviction, with their last-use times.
  fn on_partition_eviction(&self, victims: &[(K, f64)]) {}

  /// Appends sink state to a checkpoint.
  fn on_checkpoint(&self, writer: &mut CheckpointWriter<'_>) -> CheckpointResult<()> {
    Ok(())
  }

  /// Restores sink state written by [`WindowEvent::on_checkpoint`].
  fn on_reset(&self, reader: &mut CheckpointReader<'_>) -> CheckpointResult<()> {
    Ok(())
  }

  /// The window was reset to its construction-time state.
  fn on_reset_to_initial_state(&self) {}
}

/// Ordered set of event sinks. Each event is delivered to every sink in
/// registration order.
pub struct EventSinks<K, T> {
  sinks: Vec<Arc<dyn WindowEvent<K, T>>>,
}

impl<K, T> Default for EventSinks<K, T> {
  fn default() -> Self {
    Self { sinks: Vec::new() }
  }
}

impl<K, T> Clone for EventSinks<K, T> {
  fn clone(&self) -> Self {
    Self {
      sinks: self.sinks.clone(),
    }
  }
}

impl<K, T> EventSinks<K, T> {
  /// Creates an empty set.
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a sink.
  pub fn push(&mut self, sink: Arc<dyn WindowEvent<K, T>>) {
    self.sinks.push(sink);
  }

  /// Number of registered sinks.
  pub fn len(&self) -> usize {
    self.sinks.len()
  }

  /// Returns true when no sink is registered.
  pub fn is_empty(&self) -> bool {
    self.sinks.is_empty()
  }

  pub(crate) fn open_window(&self, key: &K) {
    self.sinks.iter().for_each(|s| s.on_open_window(key));
  }

  pub(crate) fn before_insert(&self, key: &K, tuple: &T) {
    self.sinks.iter().for_each(|s| s.before_insert(key, tuple));
  }

  pub(crate) fn after_insert(&self, key: &K, tuple: &T) {
    self.sinks.iter().for_each(|s| s.after_insert(key, tuple));
  }

  pub(crate) fn before_evict(&self, key: &K, tuple: &T) {
    self.sinks.iter().for_each(|s| s.before_evict(key, tuple));
  }

  pub(crate) fn after_evict(&self, key: &K, tuple: &T) {
    self.sinks.iter().for_each(|s| s.after_evict(key, tuple));
  }

  pub(crate) fn initial_full(&self, key: &K, tuples: &VecDeque<T>) {
    self.sinks.iter().for_each(|s| s.on_initial_full(key, tuples));
  }

  pub(crate) fn trigger(&self, key: &K, tuples: &VecDeque<T>) {
    self.sinks.iter().for_each(|s| s.on_trigger(key, tuples));
  }

  pub(crate) fn before_flush(&self, key: &K, tuples: &VecDeque<T>) {
    self.sinks.iter().for_each(|s| s.before_flush(key, tuples));
  }

  pub(crate) fn after_flush(&self, key: &K) {
    self.sinks.iter().for_each(|s| s.after_flush(key));
  }

  pub(crate) fn close_window(&self, key: &K) {
    self.sinks.iter().for_each(|s| s.on_close_window(key));
  }

  pub(crate) fn empty_window_punct(&self) {
    self.sinks.iter().for_each(|s| s.on_empty_window_punct());
  }

  pub(crate) fn partition_eviction_selection(&self, selection: &PartitionSelection<'_, K>) {
    self
      .sinks
      .iter()
      .for_each(|s| s.on_partition_eviction_selection(selection));
  }

  pub(crate) fn partition_eviction(&self, victims: &[(K, f64)]) {
    self.sinks.iter().for_each(|s| s.on_partition_eviction(victims));
  }

  pub(crate) fn checkpoint(&self, writer: &mut CheckpointWriter<'_>) -> CheckpointResult<()> {
    self.sinks.iter().try_for_each(|s| s.on_checkpoint(writer))
  }

  pub(crate) fn reset(&self, reader: &mut CheckpointReader<'_>) -> CheckpointResult<()> {
    self.sinks.iter().try_for_each(|s| s.on_reset(reader))
  }

  pub(crate) fn reset_to_initial_state(&self) {
    self.sinks.iter().for_each(|s| s.on_reset_to_initial_state());
  }
}
