//! # Tumbling window summarizers
//!
//! A tumbling window built with
//! [`WindowBuilder::with_summarizer`](crate::builder::WindowBuilder::with_summarizer)
//! does not buffer its tuples. Each open partition owns one
//! [`TumblingSummarizer`], created by the factory when the window opens, fed
//! every inserted tuple, and closed right before the partition is flushed, so
//! `before_flush` sinks observe the final summary.
//!
//! The window still counts the tuples of a summarized partition: count
//! eviction, time eviction and punctuation flush exactly as they do with a
//! buffer. Delta eviction keeps the first tuple of each window, which incoming
//! tuples are compared against; nothing else is buffered.
//!
//! A partition removed by partition eviction drops its summarizer without
//! closing it.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use streamweave_window::{TumblingSummarizer, WindowBuilder, WindowPolicy};
//!
//! struct Sum {
//!   current: i64,
//!   closed: Arc<Mutex<Vec<i64>>>,
//! }
//!
//! impl TumblingSummarizer<u32, i64> for Sum {
//!   fn on_tuple_insertion(&mut self, tuple: &i64) {
//!     self.current += tuple;
//!   }
//!   fn on_close_window(&mut self) {
//!     self.closed.lock().unwrap().push(self.current);
//!   }
//! }
//!
//! let closed = Arc::new(Mutex::new(Vec::new()));
//! let sums = closed.clone();
//! let mut window = WindowBuilder::<u32, i64>::tumbling(WindowPolicy::count(3))
//!   .with_summarizer(move |_key: &u32| Sum { current: 0, closed: sums.clone() })
//!   .build_core()
//!   .unwrap();
//! for v in 1..=7 {
//!   window.insert(0, v);
//! }
//! assert_eq!(*closed.lock().unwrap(), vec![6, 15]);
//! assert_eq!(window.tuple_count(), 1);
//! ```

use crate::checkpoint::{CheckpointReader, CheckpointWriter};
use crate::error::{CheckpointError, CheckpointResult};
use crate::partitioning::{PartitionKey, WindowTuple};
use crate::store::PartitionStore;
use std::collections::BTreeMap;
use std::sync::Arc;

const MARKER: &str = "Summarizers";
pub(crate) const NO_SUMMARIZER_MARKER: &str = "NoSummarizer";

/// Incremental summary of one tumbling window partition.
pub trait TumblingSummarizer<K, T>: Send {
  /// A window opened for partition `key`.
  fn on_open_window(&mut self, _key: &K) {}

  /// `tuple` was inserted into the window.
  fn on_tuple_insertion(&mut self, tuple: &T);

  /// The window closed and its partition is about to be flushed.
  fn on_close_window(&mut self) {}

  /// Writes the summary state into a window checkpoint.
  fn on_checkpoint(&self, _writer: &mut CheckpointWriter<'_>) -> CheckpointResult<()> {
    Ok(())
  }

  /// Reads what [`TumblingSummarizer::on_checkpoint`] wrote. Called on a
  /// fresh summarizer from the factory instead of `on_open_window`.
  fn on_reset(&mut self, _reader: &mut CheckpointReader<'_>) -> CheckpointResult<()> {
    Ok(())
  }
}

/// Creates the summarizer of a newly opened partition.
pub type SummarizerFactory<K, T> =
  Arc<dyn Fn(&K) -> Box<dyn TumblingSummarizer<K, T>> + Send + Sync>;

/// Summarizers of the open partitions of a window.
pub(crate) struct Summaries<K, T> {
  factory: SummarizerFactory<K, T>,
  active: BTreeMap<K, Box<dyn TumblingSummarizer<K, T>>>,
}

impl<K: PartitionKey, T: WindowTuple> Summaries<K, T> {
  pub(crate) fn new(factory: SummarizerFactory<K, T>) -> Self {
    Self {
      factory,
      active: BTreeMap::new(),
    }
  }

  pub(crate) fn open(&mut self, key: &K) {
    let mut summarizer = (self.factory)(key);
    summarizer.on_open_window(key);
    self.active.insert(key.clone(), summarizer);
  }

  pub(crate) fn insert(&mut self, key: &K, tuple: &T) {
    if let Some(summarizer) = self.active.get_mut(key) {
      summarizer.on_tuple_insertion(tuple);
    }
  }

  pub(crate) fn close(&mut self, key: &K) {
    if let Some(summarizer) = self.active.get_mut(key) {
      summarizer.on_close_window();
    }
  }

  pub(crate) fn remove(&mut self, key: &K) {
    self.active.remove(key);
  }

  pub(crate) fn get(&self, key: &K) -> Option<&dyn TumblingSummarizer<K, T>> {
    self.active.get(key).map(|s| &**s)
  }

  pub(crate) fn clear(&mut self) {
    self.active.clear();
  }

  pub(crate) fn checkpoint(&self, w: &mut CheckpointWriter<'_>) -> CheckpointResult<()> {
    w.marker(MARKER)?;
    w.put_len(self.active.len())?;
    for (key, summarizer) in &self.active {
      w.put(key)?;
      summarizer.on_checkpoint(w)?;
    }
    Ok(())
  }

  /// Rebuilds one summarizer per restored partition of `store`.
  pub(crate) fn restore(
    &mut self,
    r: &mut CheckpointReader<'_>,
    store: &PartitionStore<K, T>,
  ) -> CheckpointResult<()> {
    r.expect_marker(MARKER)?;
    self.active.clear();
    let count = r.get_len()?;
    for _ in 0..count {
      let key: K = r.get()?;
      if !store.contains(&key) || self.active.contains_key(&key) {
        return Err(CheckpointError::Corrupt(format!(
          "summarizer for unknown or repeated partition {:?}",
          key
        )));
      }
      let mut summarizer = (self.factory)(&key);
      summarizer.on_reset(r)?;
      self.active.insert(key, summarizer);
    }
    if self.active.len() != store.partition_count() {
      return Err(CheckpointError::Corrupt(format!(
        "{} summarizers for {} partitions",
        self.active.len(),
        store.partition_count()
      )));
    }
    Ok(())
  }
}
