//! # Partition Eviction Test Suite
//!
//! LRU and operator-defined partition eviction driven through a window, plus
//! the evictor's selection rules in isolation.

use crate::builder::WindowBuilder;
use crate::event::WindowEvent;
use crate::partition_eviction::{PartitionEvictor, PartitionSelection};
use crate::policy::{PartitionEvictionPolicy, WindowPolicy};
use crate::store::{LruEntry, StoreStats};
use crate::time::ManualClock;
use crate::window::WindowCore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Records evictions, closes and triggers; optionally marks one key for removal.
#[derive(Default)]
struct Operator {
  events: Mutex<Vec<String>>,
  victim: Option<String>,
}

impl Operator {
  fn marking(victim: &str) -> Self {
    Self {
      victim: Some(victim.to_string()),
      ..Self::default()
    }
  }

  fn take(&self) -> Vec<String> {
    std::mem::take(&mut *self.events.lock().unwrap())
  }
}

impl WindowEvent<String, i64> for Operator {
  fn on_trigger(&self, key: &String, tuples: &VecDeque<i64>) {
    self
      .events
      .lock()
      .unwrap()
      .push(format!("trigger {} {:?}", key, tuples.iter().collect::<Vec<_>>()));
  }

  fn on_close_window(&self, key: &String) {
    self.events.lock().unwrap().push(format!("close {}", key));
  }

  fn on_partition_eviction_selection(&self, selection: &PartitionSelection<'_, String>) {
    for candidate in selection.iter() {
      if Some(candidate.partition()) == self.victim.as_ref() {
        candidate.mark_for_removal();
      }
    }
  }

  fn on_partition_eviction(&self, victims: &[(String, f64)]) {
    let keys: Vec<&str> = victims.iter().map(|(k, _)| k.as_str()).collect();
    self
      .events
      .lock()
      .unwrap()
      .push(format!("evict {}", keys.join(",")));
  }
}

fn window(
  policy: PartitionEvictionPolicy,
  operator: &Arc<Operator>,
  clock: &Arc<ManualClock>,
) -> WindowCore<String, i64> {
  WindowBuilder::sliding(WindowPolicy::count(10))
    .with_partition_eviction(policy)
    .with_clock(clock.clone())
    .with_sink(operator.clone())
    .build_core()
    .unwrap()
}

fn insert_at(window: &mut WindowCore<String, i64>, clock: &ManualClock, now: f64, key: &str, v: i64) {
  clock.set(now);
  window.insert(key.to_string(), v);
}

fn keys(window: &WindowCore<String, i64>) -> Vec<String> {
  window.store().sorted_keys()
}

// ============================================================================
// LRU Policies
// ============================================================================

#[test]
fn test_partition_count_lru_evicts_least_recently_used() {
  let clock = Arc::new(ManualClock::new(0.0));
  let op = Arc::new(Operator::default());
  let mut w = window(PartitionEvictionPolicy::PartitionCountLru { max: 2 }, &op, &clock);

  insert_at(&mut w, &clock, 0.0, "A", 1);
  insert_at(&mut w, &clock, 1.0, "B", 2);
  assert!(op.take().is_empty());

  insert_at(&mut w, &clock, 2.0, "C", 3);
  assert_eq!(op.take(), vec!["evict A", "close A"]);
  assert_eq!(keys(&w), vec!["B", "C"]);
}

#[test]
fn test_insert_refreshes_partition() {
  let clock = Arc::new(ManualClock::new(0.0));
  let op = Arc::new(Operator::default());
  let mut w = window(PartitionEvictionPolicy::PartitionCountLru { max: 2 }, &op, &clock);

  insert_at(&mut w, &clock, 0.0, "A", 1);
  insert_at(&mut w, &clock, 1.0, "B", 2);
  insert_at(&mut w, &clock, 2.0, "A", 3);
  insert_at(&mut w, &clock, 3.0, "C", 4);
  assert_eq!(op.take(), vec!["evict B", "close B"]);
  assert_eq!(keys(&w), vec!["A", "C"]);
  assert_eq!(w.store().last_used(&"A".to_string()), Some(2.0));
}

#[test]
fn test_tuple_count_lru_bounds_total_tuples() {
  let clock = Arc::new(ManualClock::new(0.0));
  let op = Arc::new(Operator::default());
  let mut w = window(PartitionEvictionPolicy::TupleCountLru { max: 4 }, &op, &clock);

  for (i, key) in ["A", "A", "A", "B"].into_iter().enumerate() {
    insert_at(&mut w, &clock, i as f64, key, i as i64);
  }
  assert!(op.take().is_empty());
  assert_eq!(w.tuple_count(), 4);

  insert_at(&mut w, &clock, 4.0, "B", 4);
  assert_eq!(op.take(), vec!["evict A", "close A"]);
  assert_eq!(w.tuple_count(), 2);
  assert_eq!(keys(&w), vec!["B"]);
}

#[test]
fn test_age_lru_evicts_on_tick() {
  let clock = Arc::new(ManualClock::new(0.0));
  let op = Arc::new(Operator::default());
  let mut w = window(PartitionEvictionPolicy::AgeLru { max_age: 5.0 }, &op, &clock);
  assert!(w.needs_timer());

  insert_at(&mut w, &clock, 0.0, "A", 1);
  insert_at(&mut w, &clock, 3.0, "B", 2);

  clock.set(5.0);
  w.tick();
  assert!(op.take().is_empty());

  clock.set(5.5);
  w.tick();
  assert_eq!(op.take(), vec!["evict A", "close A"]);

  clock.set(20.0);
  w.tick();
  assert_eq!(op.take(), vec!["evict B", "close B"]);
  assert_eq!(w.partition_count(), 0);
}

// ============================================================================
// Operator-Defined Policies
// ============================================================================

#[test]
fn test_operator_selects_victims() {
  let clock = Arc::new(ManualClock::new(0.0));
  let op = Arc::new(Operator::marking("B"));
  let mut w = window(PartitionEvictionPolicy::PartitionCount { max: 2 }, &op, &clock);

  insert_at(&mut w, &clock, 0.0, "A", 1);
  insert_at(&mut w, &clock, 1.0, "B", 2);
  insert_at(&mut w, &clock, 2.0, "C", 3);
  assert_eq!(op.take(), vec!["evict B", "close B"]);
  assert_eq!(keys(&w), vec!["A", "C"]);
}

#[test]
fn test_operator_selection_falls_back_to_lru() {
  let clock = Arc::new(ManualClock::new(0.0));
  let op = Arc::new(Operator::marking("nobody"));
  let mut w = window(PartitionEvictionPolicy::PartitionCount { max: 2 }, &op, &clock);

  insert_at(&mut w, &clock, 0.0, "A", 1);
  insert_at(&mut w, &clock, 1.0, "B", 2);
  insert_at(&mut w, &clock, 2.0, "C", 3);
  assert_eq!(op.take(), vec!["evict A", "close A"]);
}

#[test]
fn test_partition_age_evaluates_before_insertion() {
  let clock = Arc::new(ManualClock::new(0.0));
  let op = Arc::new(Operator::default());
  let mut w = window(PartitionEvictionPolicy::PartitionAge { max_age: 5.0 }, &op, &clock);

  insert_at(&mut w, &clock, 0.0, "A", 1);
  insert_at(&mut w, &clock, 3.0, "B", 2);
  insert_at(&mut w, &clock, 6.0, "A", 3);

  // A was stale before the insert, so the insert starts a fresh partition.
  assert_eq!(op.take(), vec!["evict A", "close A"]);
  assert_eq!(w.partition_tuples(&"A".to_string()).unwrap(), &[3]);
  assert_eq!(keys(&w), vec!["A", "B"]);
}

#[test]
fn test_eviction_drops_trigger_state() {
  let clock = Arc::new(ManualClock::new(0.0));
  let op = Arc::new(Operator::default());
  let mut w: WindowCore<String, i64> = WindowBuilder::sliding(WindowPolicy::count(10))
    .with_trigger(WindowPolicy::count(2))
    .with_partition_eviction(PartitionEvictionPolicy::PartitionCountLru { max: 1 })
    .with_clock(clock.clone())
    .with_sink(op.clone())
    .build_core()
    .unwrap();

  insert_at(&mut w, &clock, 0.0, "A", 1);
  insert_at(&mut w, &clock, 1.0, "B", 2);
  insert_at(&mut w, &clock, 2.0, "A", 3);
  assert_eq!(
    op.take(),
    vec!["evict A", "close A", "evict B", "close B"]
  );

  insert_at(&mut w, &clock, 3.0, "A", 4);
  assert_eq!(op.take(), vec!["trigger A [3, 4]"]);
}

// ============================================================================
// Evictor Rules
// ============================================================================

fn entries(spec: &[(&str, f64, usize)]) -> Vec<LruEntry<String>> {
  spec
    .iter()
    .map(|(k, time, tuple_count)| LruEntry {
      key: k.to_string(),
      time: *time,
      tuple_count: *tuple_count,
    })
    .collect()
}

fn stats_of(entries: &[LruEntry<String>]) -> StoreStats {
  StoreStats {
    partitions: entries.len(),
    oldest: entries.first().map(|e| e.time),
    tuples: entries.iter().map(|e| e.tuple_count).sum(),
  }
}

#[test]
fn test_empty_store_never_needs_eviction() {
  for policy in [
    PartitionEvictionPolicy::PartitionCountLru { max: 1 },
    PartitionEvictionPolicy::TupleCountLru { max: 1 },
    PartitionEvictionPolicy::AgeLru { max_age: 0.0 },
  ] {
    assert!(!PartitionEvictor::new(policy).eviction_needed(&StoreStats::default(), 100.0));
  }
}

#[test]
fn test_age_boundary_is_strict() {
  let evictor = PartitionEvictor::new(PartitionEvictionPolicy::AgeLru { max_age: 5.0 });
  let e = entries(&[("A", 5.0, 1)]);
  assert!(!evictor.eviction_needed(&stats_of(&e), 10.0));
  assert!(evictor.eviction_needed(&stats_of(&e), 10.1));
}

#[test]
fn test_select_lru_respects_existing_marks() {
  let evictor = PartitionEvictor::new(PartitionEvictionPolicy::PartitionCountLru { max: 2 });
  let e = entries(&[("A", 0.0, 1), ("B", 1.0, 1), ("C", 2.0, 1), ("D", 3.0, 1)]);
  let selection = PartitionSelection::new(&e);
  for c in selection.iter() {
    if c.partition() == "C" {
      c.mark_for_removal();
    }
  }
  evictor.select_lru(&selection, 0.0);
  let victims: Vec<String> = selection.marked().into_iter().map(|(k, _)| k).collect();
  assert_eq!(victims, vec!["A", "C"]);
}

#[test]
fn test_select_lru_satisfies_every_policy() {
  let e = entries(&[
    ("A", 0.0, 5),
    ("B", 1.0, 1),
    ("C", 2.0, 3),
    ("D", 8.0, 2),
    ("E", 9.0, 4),
  ]);
  let now = 10.0;
  for policy in [
    PartitionEvictionPolicy::PartitionCountLru { max: 1 },
    PartitionEvictionPolicy::PartitionCountLru { max: 4 },
    PartitionEvictionPolicy::TupleCountLru { max: 6 },
    PartitionEvictionPolicy::TupleCountLru { max: 0 },
    PartitionEvictionPolicy::AgeLru { max_age: 3.0 },
  ] {
    let evictor = PartitionEvictor::new(policy);
    assert!(evictor.eviction_needed(&stats_of(&e), now), "{:?}", policy);

    let selection = PartitionSelection::new(&e);
    evictor.select_lru(&selection, now);
    let marked: Vec<String> = selection.marked().into_iter().map(|(k, _)| k).collect();
    let survivors: Vec<LruEntry<String>> = e
      .iter()
      .filter(|entry| !marked.contains(&entry.key))
      .cloned()
      .collect();
    assert!(!evictor.eviction_needed(&stats_of(&survivors), now), "{:?}", policy);
  }
}

#[test]
fn test_selection_exposes_candidates() {
  let e = entries(&[("A", 1.5, 3), ("B", 2.5, 0)]);
  let selection = PartitionSelection::new(&e);
  assert_eq!(selection.len(), 2);
  assert!(!selection.is_empty());

  let first = selection.iter().next().unwrap();
  assert_eq!(first.partition(), "A");
  assert_eq!(first.time(), 1.5);
  assert_eq!(first.tuple_count(), 3);
  assert!(!first.is_marked());
  first.mark_for_removal();
  assert!(first.is_marked());
  assert_eq!(selection.marked_count(), 1);
  assert_eq!(selection.marked(), vec![("A".to_string(), 1.5)]);
}
