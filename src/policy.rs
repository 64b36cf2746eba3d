//! Window, trigger and partition eviction policies.
//!
//! A policy is pure configuration. [`WindowBuilder`](crate::builder::WindowBuilder)
//! validates policies and turns them into the strategies that run inside a
//! window.

use crate::error::{WindowError, WindowResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Window flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
  /// Tuples are evicted one at a time; triggers decide when to act.
  Sliding,
  /// The whole window is flushed once full.
  Tumbling,
}

impl WindowKind {
  pub(crate) fn tag(self) -> u8 {
    match self {
      WindowKind::Sliding => 1,
      WindowKind::Tumbling => 2,
    }
  }
}

/// Policy discriminant, used in error messages and checkpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PolicyKind {
  /// Count based.
  Count,
  /// Time based.
  Time,
  /// Attribute delta based.
  Delta,
  /// Window punctuation based.
  Punct,
}

impl fmt::Display for PolicyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      PolicyKind::Count => "count",
      PolicyKind::Time => "time",
      PolicyKind::Delta => "delta",
      PolicyKind::Punct => "punct",
    };
    f.write_str(s)
  }
}

/// Extracts the numeric attribute a delta policy measures.
pub type AttributeFn<T> = Arc<dyn Fn(&T) -> f64 + Send + Sync>;

/// Delta policy: a tuple is beyond the window once the attribute of a newer
/// tuple exceeds its own by more than `delta`.
pub struct DeltaPolicy<T> {
  delta: f64,
  attribute: AttributeFn<T>,
  recover_when_empty: bool,
}

impl<T> Clone for DeltaPolicy<T> {
  fn clone(&self) -> Self {
    Self {
      delta: self.delta,
      attribute: Arc::clone(&self.attribute),
      recover_when_empty: self.recover_when_empty,
    }
  }
}

impl<T> fmt::Debug for DeltaPolicy<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DeltaPolicy")
      .field("delta", &self.delta)
      .field("recover_when_empty", &self.recover_when_empty)
      .finish_non_exhaustive()
  }
}

impl<T> DeltaPolicy<T> {
  /// Creates a delta policy over the attribute returned by `attribute`.
  pub fn new(delta: f64, attribute: impl Fn(&T) -> f64 + Send + Sync + 'static) -> Self {
    Self::from_arc(delta, Arc::new(attribute))
  }

  /// Creates a delta policy from a shared attribute extractor.
  pub fn from_arc(delta: f64, attribute: AttributeFn<T>) -> Self {
    Self {
      delta,
      attribute,
      recover_when_empty: false,
    }
  }

  /// Lets a partition that lost insertion order return to front trimming once
  /// its buffer has been emptied.
  pub fn with_monotonic_recovery(mut self) -> Self {
    self.recover_when_empty = true;
    self
  }

  /// Configured delta.
  pub fn delta(&self) -> f64 {
    self.delta
  }

  /// Returns true when monotonic recovery is enabled.
  pub fn recovers_when_empty(&self) -> bool {
    self.recover_when_empty
  }

  /// Attribute value of `tuple`.
  pub fn attribute(&self, tuple: &T) -> f64 {
    (self.attribute)(tuple)
  }

  /// Returns true when `old` lies strictly beyond the window measured from `new`.
  /// A tuple exactly `delta` away is retained.
  pub fn is_beyond(&self, old: &T, new: &T) -> bool {
    self.attribute(new) - self.attribute(old) > self.delta
  }

  /// Returns true when `new` does not break insertion order with respect to `last`.
  pub fn is_ordered(&self, last: &T, new: &T) -> bool {
    self.attribute(new) >= self.attribute(last)
  }
}

/// Eviction or trigger policy of a window.
pub enum WindowPolicy<T> {
  /// Count of tuples.
  Count {
    /// Number of tuples.
    size: usize,
  },
  /// Elapsed seconds.
  Time {
    /// Interval in seconds.
    seconds: f64,
  },
  /// Attribute delta.
  Delta(DeltaPolicy<T>),
  /// Window punctuation. Tumbling eviction only.
  Punct,
}

impl<T> Clone for WindowPolicy<T> {
  fn clone(&self) -> Self {
    match self {
      WindowPolicy::Count { size } => WindowPolicy::Count { size: *size },
      WindowPolicy::Time { seconds } => WindowPolicy::Time { seconds: *seconds },
      WindowPolicy::Delta(d) => WindowPolicy::Delta(d.clone()),
      WindowPolicy::Punct => WindowPolicy::Punct,
    }
  }
}

impl<T> fmt::Debug for WindowPolicy<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      WindowPolicy::Count { size } => f.debug_struct("Count").field("size", size).finish(),
      WindowPolicy::Time { seconds } => f.debug_struct("Time").field("seconds", seconds).finish(),
      WindowPolicy::Delta(d) => f.debug_tuple("Delta").field(d).finish(),
      WindowPolicy::Punct => f.write_str("Punct"),
    }
  }
}

impl<T> WindowPolicy<T> {
  /// Count policy.
  pub fn count(size: usize) -> Self {
    WindowPolicy::Count { size }
  }

  /// Time policy.
  pub fn time(seconds: f64) -> Self {
    WindowPolicy::Time { seconds }
  }

  /// Delta policy over `attribute`.
  pub fn delta(delta: f64, attribute: impl Fn(&T) -> f64 + Send + Sync + 'static) -> Self {
    WindowPolicy::Delta(DeltaPolicy::new(delta, attribute))
  }

  /// Policy discriminant.
  pub fn kind(&self) -> PolicyKind {
    match self {
      WindowPolicy::Count { .. } => PolicyKind::Count,
      WindowPolicy::Time { .. } => PolicyKind::Time,
      WindowPolicy::Delta(_) => PolicyKind::Delta,
      WindowPolicy::Punct => PolicyKind::Punct,
    }
  }

  /// Returns true when the policy needs the background timer.
  pub fn is_time_based(&self) -> bool {
    matches!(self, WindowPolicy::Time { .. })
  }

  /// Checks the policy's own parameters.
  pub fn validate(&self) -> WindowResult<()> {
    match self {
      WindowPolicy::Count { size } if *size == 0 => {
        Err(WindowError::invalid("count policy size must be greater than 0"))
      }
      WindowPolicy::Time { seconds } if !(seconds.is_finite() && *seconds > 0.0) => Err(
        WindowError::invalid(format!("time policy needs a positive interval, got {}", seconds)),
      ),
      WindowPolicy::Delta(d) if !(d.delta.is_finite() && d.delta >= 0.0) => Err(
        WindowError::invalid(format!("delta policy needs a non-negative delta, got {}", d.delta)),
      ),
      _ => Ok(()),
    }
  }
}

/// Partition eviction policy: bounds the number of partitions, their age, or
/// the total number of buffered tuples.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionEvictionPolicy {
  /// At most `max` partitions; victims selected by event sinks, then LRU.
  PartitionCount {
    /// Maximum number of partitions.
    max: usize,
  },
  /// Partitions unused for more than `max_age` seconds are removed; victims
  /// selected by event sinks, then LRU.
  PartitionAge {
    /// Maximum age in seconds.
    max_age: f64,
  },
  /// At most `max` partitions, least recently used removed first.
  PartitionCountLru {
    /// Maximum number of partitions.
    max: usize,
  },
  /// At most `max` buffered tuples across all partitions, least recently used
  /// partitions removed first.
  TupleCountLru {
    /// Maximum number of tuples.
    max: usize,
  },
  /// Partitions unused for more than `max_age` seconds are removed.
  AgeLru {
    /// Maximum age in seconds.
    max_age: f64,
  },
}

impl PartitionEvictionPolicy {
  /// Returns true for policies whose victims are chosen by event sinks first.
  pub fn is_operator_defined(&self) -> bool {
    matches!(
      self,
      PartitionEvictionPolicy::PartitionCount { .. } | PartitionEvictionPolicy::PartitionAge { .. }
    )
  }

  /// Returns true when the policy is evaluated before a tuple is inserted,
  /// false when it is evaluated after.
  pub fn evaluates_before_insertion(&self) -> bool {
    self.is_age_based()
  }

  /// Returns true for age policies, which are also evaluated on timer ticks.
  pub fn is_age_based(&self) -> bool {
    matches!(
      self,
      PartitionEvictionPolicy::PartitionAge { .. } | PartitionEvictionPolicy::AgeLru { .. }
    )
  }

  /// Returns true when the policy bounds the total tuple count.
  pub fn tracks_tuples(&self) -> bool {
    matches!(self, PartitionEvictionPolicy::TupleCountLru { .. })
  }

  /// Checks the policy's parameters.
  pub fn validate(&self) -> WindowResult<()> {
    match self {
      PartitionEvictionPolicy::PartitionCount { max }
      | PartitionEvictionPolicy::PartitionCountLru { max }
      | PartitionEvictionPolicy::TupleCountLru { max }
        if *max == 0 =>
      {
        Err(WindowError::invalid("partition eviction maximum must be greater than 0"))
      }
      PartitionEvictionPolicy::PartitionAge { max_age } | PartitionEvictionPolicy::AgeLru { max_age }
        if !(max_age.is_finite() && *max_age > 0.0) =>
      {
        Err(WindowError::invalid(format!(
          "partition eviction age must be positive, got {}",
          max_age
        )))
      }
      _ => Ok(()),
    }
  }

  /// Checkpoint tag. 0 is reserved for "no partition eviction".
  pub(crate) fn tag(&self) -> u32 {
    match self {
      PartitionEvictionPolicy::PartitionCount { .. } => 1,
      PartitionEvictionPolicy::PartitionAge { .. } => 2,
      PartitionEvictionPolicy::PartitionCountLru { .. } => 3,
      PartitionEvictionPolicy::TupleCountLru { .. } => 4,
      PartitionEvictionPolicy::AgeLru { .. } => 5,
    }
  }
}
