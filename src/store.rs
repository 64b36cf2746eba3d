//! Partitioned tuple storage.
//!
//! [`PartitionStore`] owns every buffered tuple of a window, keyed by partition,
//! together with the least-recently-used ordering that partition eviction
//! consults. Strategies never hold on to the store; the window hands them one
//! partition buffer at a time.

use crate::checkpoint::{CheckpointReader, CheckpointWriter};
use crate::error::{CheckpointError, CheckpointResult};
use crate::partitioning::{PartitionKey, WindowTuple};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

/// Tuples of one partition, oldest first.
///
/// Partitions of a summarized window hold a count instead of their tuples.
#[derive(Clone, Debug)]
pub struct Partition<T> {
  tuples: VecDeque<T>,
  summarized: usize,
}

impl<T> Default for Partition<T> {
  fn default() -> Self {
    Self {
      tuples: VecDeque::new(),
      summarized: 0,
    }
  }
}

impl<T> Partition<T> {
  /// Buffered tuples, oldest first.
  pub fn tuples(&self) -> &VecDeque<T> {
    &self.tuples
  }

  /// Tuples handed to a summarizer and not buffered.
  pub fn summarized(&self) -> usize {
    self.summarized
  }

  /// Number of tuples in the partition, buffered or summarized.
  pub fn len(&self) -> usize {
    self.tuples.len() + self.summarized
  }

  /// Returns true when the partition holds no tuple.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Entry of the least-recently-used view.
#[derive(Clone, Debug, PartialEq)]
pub struct LruEntry<K> {
  /// Partition key.
  pub key: K,
  /// Time the partition was last inserted into.
  pub time: f64,
  /// Number of tuples buffered in the partition.
  pub tuple_count: usize,
}

/// Aggregate figures used to decide whether partition eviction is needed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StoreStats {
  /// Number of partitions in the LRU ordering.
  pub partitions: usize,
  /// Last-use time of the least recently used partition.
  pub oldest: Option<f64>,
  /// Total buffered tuples.
  pub tuples: usize,
}

/// All partitions of a window.
#[derive(Clone, Debug)]
pub struct PartitionStore<K, T> {
  partitions: HashMap<K, Partition<T>>,
  order: BTreeMap<u64, K>,
  index: HashMap<K, (u64, f64)>,
  next_seq: u64,
  total_tuples: usize,
}

impl<K, T> Default for PartitionStore<K, T> {
  fn default() -> Self {
    Self {
      partitions: HashMap::new(),
      order: BTreeMap::new(),
      index: HashMap::new(),
      next_seq: 0,
      total_tuples: 0,
    }
  }
}

impl<K: PartitionKey, T: WindowTuple> PartitionStore<K, T> {
  /// Creates an empty store.
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the partition for `key`.
  pub fn get(&self, key: &K) -> Option<&Partition<T>> {
    self.partitions.get(key)
  }

  /// Returns true when a partition exists for `key`.
  pub fn contains(&self, key: &K) -> bool {
    self.partitions.contains_key(key)
  }

  /// Creates the partition for `key` if it is missing. Returns true when created.
  pub fn ensure(&mut self, key: &K) -> bool {
    if self.partitions.contains_key(key) {
      return false;
    }
    self.partitions.insert(key.clone(), Partition::default());
    true
  }

  /// Appends `tuple` to an existing partition.
  pub fn push(&mut self, key: &K, tuple: T) {
    if let Some(p) = self.partitions.get_mut(key) {
      p.tuples.push_back(tuple);
      self.total_tuples += 1;
    }
  }

  /// Counts `tuple` into a summarized partition. The tuple is buffered only
  /// when `keep_first` is set and the partition buffer is empty.
  pub fn push_summarized(&mut self, key: &K, tuple: T, keep_first: bool) {
    if let Some(p) = self.partitions.get_mut(key) {
      if keep_first && p.tuples.is_empty() {
        p.tuples.push_back(tuple);
      } else {
        p.summarized += 1;
      }
      self.total_tuples += 1;
    }
  }

  /// Runs `f` against the buffer and summarized count of `key`, keeping the
  /// tuple total in step.
  pub fn with_partition<R>(
    &mut self,
    key: &K,
    f: impl FnOnce(&mut VecDeque<T>, usize) -> R,
  ) -> Option<R> {
    let p = self.partitions.get_mut(key)?;
    let before = p.tuples.len();
    let out = f(&mut p.tuples, p.summarized);
    self.total_tuples = self.total_tuples - before + p.tuples.len();
    Some(out)
  }

  /// Removes the partition for `key`, including its LRU entry.
  pub fn remove(&mut self, key: &K) -> Option<Partition<T>> {
    if let Some((seq, _)) = self.index.remove(key) {
      self.order.remove(&seq);
    }
    let p = self.partitions.remove(key)?;
    self.total_tuples -= p.len();
    Some(p)
  }

  /// Marks `key` as the most recently used partition at `now`.
  pub fn touch(&mut self, key: &K, now: f64) {
    if let Some((seq, _)) = self.index.remove(key) {
      self.order.remove(&seq);
    }
    let seq = self.next_seq;
    self.next_seq += 1;
    self.order.insert(seq, key.clone());
    self.index.insert(key.clone(), (seq, now));
  }

  /// Last-use time of `key`.
  pub fn last_used(&self, key: &K) -> Option<f64> {
    self.index.get(key).map(|(_, t)| *t)
  }

  /// Least-recently-used view, oldest first.
  pub fn lru(&self) -> Vec<LruEntry<K>> {
    self
      .order
      .values()
      .filter_map(|k| {
        let (_, time) = self.index.get(k)?;
        Some(LruEntry {
          key: k.clone(),
          time: *time,
          tuple_count: self.partitions.get(k).map_or(0, Partition::len),
        })
      })
      .collect()
  }

  /// Figures for partition eviction.
  pub fn stats(&self) -> StoreStats {
    StoreStats {
      partitions: self.order.len(),
      oldest: self
        .order
        .values()
        .next()
        .and_then(|k| self.index.get(k))
        .map(|(_, t)| *t),
      tuples: self.total_tuples,
    }
  }

  /// Partition keys in key order.
  pub fn sorted_keys(&self) -> Vec<K> {
    let mut keys: Vec<K> = self.partitions.keys().cloned().collect();
    keys.sort();
    keys
  }

  /// Iterates over partitions in no particular order.
  pub fn iter(&self) -> impl Iterator<Item = (&K, &Partition<T>)> {
    self.partitions.iter()
  }

  /// Number of partitions.
  pub fn partition_count(&self) -> usize {
    self.partitions.len()
  }

  /// Total tuples across partitions, buffered or summarized.
  pub fn tuple_count(&self) -> usize {
    self.total_tuples
  }

  /// Returns true when no partition exists.
  pub fn is_empty(&self) -> bool {
    self.partitions.is_empty()
  }

  /// Drops every partition and the LRU ordering.
  pub fn clear(&mut self) {
    self.partitions.clear();
    self.order.clear();
    self.index.clear();
    self.next_seq = 0;
    self.total_tuples = 0;
  }

  /// Writes partitions in key order followed by the LRU ordering.
  pub(crate) fn checkpoint(&self, w: &mut CheckpointWriter<'_>) -> CheckpointResult<()> {
    let keys = self.sorted_keys();
    w.put_len(keys.len())?;
    for (key, p) in keys.iter().filter_map(|k| Some((k, self.partitions.get(k)?))) {
      w.put(key)?;
      w.put(&p.tuples)?;
      w.put(&p.summarized)?;
    }
    let lru: Vec<(K, f64)> = self.lru().into_iter().map(|e| (e.key, e.time)).collect();
    w.put(&lru)
  }

  /// Reads what [`PartitionStore::checkpoint`] wrote into an empty store.
  pub(crate) fn restore(&mut self, r: &mut CheckpointReader<'_>) -> CheckpointResult<()> {
    self.clear();
    let count = r.get_len()?;
    for _ in 0..count {
      let key: K = r.get()?;
      let tuples: VecDeque<T> = r.get()?;
      let summarized: usize = r.get()?;
      let partition = Partition { tuples, summarized };
      self.total_tuples += partition.len();
      if self.partitions.insert(key.clone(), partition).is_some() {
        return Err(CheckpointError::Corrupt(format!(
          "partition {:?} appears twice",
          key
        )));
      }
    }
    let lru: Vec<(K, f64)> = r.get()?;
    for (key, time) in lru {
      if !self.partitions.contains_key(&key) || self.index.contains_key(&key) {
        return Err(CheckpointError::Corrupt(format!(
          "LRU entry for unknown or repeated partition {:?}",
          key
        )));
      }
      self.touch(&key, time);
    }
    Ok(())
  }
}

impl<K: PartitionKey, T: WindowTuple + fmt::Debug> fmt::Display for PartitionStore<K, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(
      f,
      "{} partitions, {} tuples",
      self.partition_count(),
      self.tuple_count()
    )?;
    for key in self.sorted_keys() {
      if let Some(p) = self.partitions.get(&key) {
        match p.summarized {
          0 => writeln!(f, "  {:?}: {:?}", key, p.tuples)?,
          n => writeln!(f, "  {:?}: {:?} (+{} summarized)", key, p.tuples, n)?,
        }
      }
    }
    Ok(())
  }
}
