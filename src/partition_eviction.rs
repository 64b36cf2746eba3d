//! Partition eviction.
//!
//! Bounds a window's partitions by number, by age, or by the total number of
//! buffered tuples. Eviction is two-phase: [`PartitionEvictor::eviction_needed`]
//! decides whether anything must go, then a selection pass marks victims in a
//! [`PartitionSelection`]. Selection never mutates the store; the window removes
//! the marked partitions afterwards.
//!
//! Operator-defined policies ([`PartitionEvictionPolicy::PartitionCount`],
//! [`PartitionEvictionPolicy::PartitionAge`]) let event sinks mark victims
//! first. Whenever that leaves the policy unsatisfied, and for the LRU
//! policies, [`PartitionEvictor::select_lru`] marks the least recently used
//! partitions.

use crate::policy::PartitionEvictionPolicy;
use crate::store::{LruEntry, StoreStats};
use std::cell::RefCell;

/// View over partitions, least recently used first, in which victims are marked.
pub struct PartitionSelection<'a, K> {
  entries: &'a [LruEntry<K>],
  marked: RefCell<Vec<bool>>,
}

impl<'a, K> PartitionSelection<'a, K> {
  /// Creates a selection over `entries`.
  pub fn new(entries: &'a [LruEntry<K>]) -> Self {
    Self {
      entries,
      marked: RefCell::new(vec![false; entries.len()]),
    }
  }

  /// Iterates over candidates, least recently used first.
  pub fn iter(&self) -> impl Iterator<Item = SelectionCursor<'_, 'a, K>> {
    (0..self.entries.len()).map(move |index| SelectionCursor {
      selection: self,
      index,
    })
  }

  /// Number of candidates.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Returns true when there are no candidates.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Number of marked candidates.
  pub fn marked_count(&self) -> usize {
    self.marked.borrow().iter().filter(|m| **m).count()
  }

  /// Marked candidates as `(key, last-use time)`, least recently used first.
  pub fn marked(&self) -> Vec<(K, f64)>
  where
    K: Clone,
  {
    let marked = self.marked.borrow();
    self
      .entries
      .iter()
      .zip(marked.iter())
      .filter(|(_, m)| **m)
      .map(|(e, _)| (e.key.clone(), e.time))
      .collect()
  }

  fn mark(&self, index: usize) {
    if let Some(slot) = self.marked.borrow_mut().get_mut(index) {
      *slot = true;
    }
  }
}

/// One candidate of a [`PartitionSelection`].
pub struct SelectionCursor<'s, 'a, K> {
  selection: &'s PartitionSelection<'a, K>,
  index: usize,
}

impl<K> SelectionCursor<'_, '_, K> {
  fn entry(&self) -> &LruEntry<K> {
    &self.selection.entries[self.index]
  }

  /// Partition key.
  pub fn partition(&self) -> &K {
    &self.entry().key
  }

  /// Last-use time of the partition.
  pub fn time(&self) -> f64 {
    self.entry().time
  }

  /// Tuples buffered in the partition.
  pub fn tuple_count(&self) -> usize {
    self.entry().tuple_count
  }

  /// Returns true when already marked.
  pub fn is_marked(&self) -> bool {
    self
      .selection
      .marked
      .borrow()
      .get(self.index)
      .copied()
      .unwrap_or(false)
  }

  /// Marks the partition for removal.
  pub fn mark_for_removal(&self) {
    self.selection.mark(self.index);
  }
}

/// Runs a [`PartitionEvictionPolicy`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PartitionEvictor {
  policy: PartitionEvictionPolicy,
}

impl PartitionEvictor {
  /// Creates an evictor. The policy is expected to be validated.
  pub fn new(policy: PartitionEvictionPolicy) -> Self {
    Self { policy }
  }

  /// Policy run by this evictor.
  pub fn policy(&self) -> &PartitionEvictionPolicy {
    &self.policy
  }

  /// Returns true when the store violates the policy at `now`.
  pub fn eviction_needed(&self, stats: &StoreStats, now: f64) -> bool {
    if stats.partitions == 0 {
      return false;
    }
    match self.policy {
      PartitionEvictionPolicy::PartitionCount { max }
      | PartitionEvictionPolicy::PartitionCountLru { max } => stats.partitions > max,
      PartitionEvictionPolicy::TupleCountLru { max } => stats.tuples > max,
      PartitionEvictionPolicy::PartitionAge { max_age }
      | PartitionEvictionPolicy::AgeLru { max_age } => {
        stats.oldest.is_some_and(|oldest| oldest < now - max_age)
      }
    }
  }

  /// Marks least recently used partitions until the policy would be satisfied,
  /// counting candidates already marked as gone.
  pub fn select_lru<K>(&self, selection: &PartitionSelection<'_, K>, now: f64) {
    match self.policy {
      PartitionEvictionPolicy::PartitionCount { max }
      | PartitionEvictionPolicy::PartitionCountLru { max } => {
        let mut remaining = selection.len() - selection.marked_count();
        for c in selection.iter() {
          if remaining <= max {
            break;
          }
          if !c.is_marked() {
            c.mark_for_removal();
            remaining -= 1;
          }
        }
      }
      PartitionEvictionPolicy::TupleCountLru { max } => {
        let mut remaining: usize = selection
          .iter()
          .filter(|c| !c.is_marked())
          .map(|c| c.tuple_count())
          .sum();
        for c in selection.iter() {
          if remaining <= max {
            break;
          }
          if !c.is_marked() {
            c.mark_for_removal();
            remaining -= c.tuple_count();
          }
        }
      }
      PartitionEvictionPolicy::PartitionAge { max_age }
      | PartitionEvictionPolicy::AgeLru { max_age } => {
        let horizon = now - max_age;
        selection
          .iter()
          .filter(|c| c.time() < horizon)
          .for_each(|c| c.mark_for_removal());
      }
    }
  }
}
