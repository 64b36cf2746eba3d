//! Serialized window configuration.
//!
//! Operators that read their window setup from a job description use
//! [`WindowConfig`]:
//!
//! ```json
//! {
//!   "kind": "sliding",
//!   "eviction": { "type": "count", "size": 100 },
//!   "trigger": { "type": "time", "seconds": 5.0 },
//!   "partition_eviction": { "type": "partition_count_lru", "max": 1000 },
//!   "tick_interval_ms": 50,
//!   "verify_checksums": true
//! }
//! ```
//!
//! A delta policy names no attribute; the extractor is supplied in code when
//! the configuration is turned into a [`WindowBuilder`].

use crate::builder::{DEFAULT_TICK_INTERVAL, WindowBuilder};
use crate::error::{WindowError, WindowResult};
use crate::partitioning::{PartitionKey, WindowTuple};
use crate::policy::{AttributeFn, DeltaPolicy, PartitionEvictionPolicy, WindowKind, WindowPolicy};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::Duration;

/// Serialized eviction or trigger policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyConfig {
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
  Delta {
    /// Maximum attribute distance.
    delta: f64,
    /// Let out-of-order partitions return to front trimming once empty.
    #[serde(default)]
    monotonic_recovery: bool,
  },
  /// Window punctuation.
  Punct,
}

impl PolicyConfig {
  fn into_policy<T>(self, attribute: Option<&AttributeFn<T>>) -> WindowResult<WindowPolicy<T>> {
    Ok(match self {
      PolicyConfig::Count { size } => WindowPolicy::Count { size },
      PolicyConfig::Time { seconds } => WindowPolicy::Time { seconds },
      PolicyConfig::Delta {
        delta,
        monotonic_recovery,
      } => {
        let attribute = attribute.ok_or_else(|| {
          WindowError::invalid("delta policy configured without an attribute extractor")
        })?;
        let policy = DeltaPolicy::from_arc(delta, attribute.clone());
        WindowPolicy::Delta(if monotonic_recovery {
          policy.with_monotonic_recovery()
        } else {
          policy
        })
      }
      PolicyConfig::Punct => WindowPolicy::Punct,
    })
  }
}

fn default_tick_interval_ms() -> u64 {
  DEFAULT_TICK_INTERVAL.as_millis() as u64
}

fn default_verify_checksums() -> bool {
  true
}

/// Serialized window configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
  /// Window flavour.
  pub kind: WindowKind,
  /// Eviction policy.
  pub eviction: PolicyConfig,
  /// Trigger policy, sliding windows only.
  #[serde(default)]
  pub trigger: Option<PolicyConfig>,
  /// Partition eviction policy.
  #[serde(default)]
  pub partition_eviction: Option<PartitionEvictionPolicy>,
  /// Timer thread period in milliseconds.
  #[serde(default = "default_tick_interval_ms")]
  pub tick_interval_ms: u64,
  /// Append and verify checkpoint digests.
  #[serde(default = "default_verify_checksums")]
  pub verify_checksums: bool,
}

impl WindowConfig {
  /// Parses a configuration from JSON.
  pub fn from_json(json: &str) -> WindowResult<Self> {
    Ok(serde_json::from_str(json)?)
  }

  /// Parses a configuration from a JSON reader, e.g. a file.
  pub fn from_reader(reader: impl Read) -> WindowResult<Self> {
    Ok(serde_json::from_reader(reader)?)
  }

  /// Serializes the configuration to JSON.
  pub fn to_json(&self) -> WindowResult<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  /// Turns the configuration into a builder. `attribute` is required when a
  /// delta policy is configured.
  pub fn into_builder<K: PartitionKey, T: WindowTuple>(
    self,
    attribute: Option<AttributeFn<T>>,
  ) -> WindowResult<WindowBuilder<K, T>> {
    let eviction = self.eviction.into_policy(attribute.as_ref())?;
    let builder = match self.kind {
      WindowKind::Sliding => WindowBuilder::sliding(eviction),
      WindowKind::Tumbling => WindowBuilder::tumbling(eviction),
    };
    let builder = match self.trigger {
      Some(trigger) => builder.with_trigger(trigger.into_policy(attribute.as_ref())?),
      None => builder,
    };
    let builder = match self.partition_eviction {
      Some(policy) => builder.with_partition_eviction(policy),
      None => builder,
    };
    Ok(
      builder
        .with_tick_interval(Duration::from_millis(self.tick_interval_ms))
        .with_verify_checksums(self.verify_checksums),
    )
  }
}
