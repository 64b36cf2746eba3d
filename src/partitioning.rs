//! # Partitioning Contract
//!
//! A window groups tuples by **partition key**. Every partition owns its own
//! buffer, its own eviction and trigger bookkeeping, and its own slot in the
//! least-recently-used ordering consulted by partition eviction.
//!
//! Keys and tuples are caller types. The window only needs the capabilities
//! listed by [`PartitionKey`] and [`WindowTuple`]; both are blanket-implemented,
//! so any type with those capabilities qualifies without an explicit impl.
//!
//! ## Usage
//!
//! ```rust
//! use streamweave_window::partitioning::{partition_by, PartitionKeyExtractor};
//!
//! #[derive(Clone)]
//! struct Reading {
//!   sensor: String,
//!   value: f64,
//! }
//!
//! let by_sensor = partition_by(|r: &Reading| r.sensor.clone());
//! let r = Reading { sensor: "s1".to_string(), value: 1.0 };
//! assert_eq!(by_sensor.extract_key(&r), "s1");
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

/// Capabilities required from a partition key.
///
/// `Ord` gives checkpoints a deterministic partition order; the serde bounds
/// let the key be written to and read back from a checkpoint.
pub trait PartitionKey:
  Clone + Eq + Hash + Ord + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<K> PartitionKey for K where
  K: Clone + Eq + Hash + Ord + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Capabilities required from a buffered tuple.
///
/// Any `#[derive(Clone, Serialize, Deserialize)]` type qualifies.
pub trait WindowTuple: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> WindowTuple for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Derives the partition key of a tuple.
///
/// Operators that receive unpartitioned tuples use an extractor to route each
/// tuple to [`Window::insert`](crate::runtime::Window::insert).
pub trait PartitionKeyExtractor<T>: Send + Sync {
  /// Key type produced by this extractor.
  type Key: PartitionKey;

  /// Returns the partition key of `tuple`.
  fn extract_key(&self, tuple: &T) -> Self::Key;
}

/// Extractor backed by a closure. Built with [`partition_by`].
pub struct FnKeyExtractor<T, K, F> {
  function: F,
  _marker: PhantomData<fn(&T) -> K>,
}

impl<T, K, F> PartitionKeyExtractor<T> for FnKeyExtractor<T, K, F>
where
  K: PartitionKey,
  F: Fn(&T) -> K + Send + Sync,
{
  type Key = K;

  fn extract_key(&self, tuple: &T) -> K {
    (self.function)(tuple)
  }
}

/// Creates a [`PartitionKeyExtractor`] from a closure.
pub fn partition_by<T, K, F>(function: F) -> FnKeyExtractor<T, K, F>
where
  K: PartitionKey,
  F: Fn(&T) -> K + Send + Sync,
{
  FnKeyExtractor {
    function,
    _marker: PhantomData,
  }
}

/// Extractor that places every tuple in one partition.
///
/// Unpartitioned windows are partitioned windows with a single key.
#[derive(Clone, Copy, Debug, Default)]
pub struct SinglePartition;

impl<T> PartitionKeyExtractor<T> for SinglePartition {
  type Key = u8;

  fn extract_key(&self, _tuple: &T) -> u8 {
    0
  }
}
