//! # StreamWeave Window
//!
//! Partitioned sliding and tumbling windows for stream operators.
//!
//! A window buffers the tuples arriving on an operator input, grouped by
//! partition key, and tells operator logic when to act on them through
//! [`WindowEvent`] sinks.
//!
//! ## Key Features
//!
//! - **Sliding and tumbling windows** with count, time, delta and (tumbling)
//!   punctuation eviction
//! - **Triggers**: count and time triggers for sliding windows
//! - **Partition eviction**: bound partitions by count, age or total tuples,
//!   least recently used first or selected by operator logic
//! - **Summarizers**: tumbling windows can fold tuples into one summary per
//!   partition instead of buffering them
//! - **Checkpointing**: deterministic checkpoints of serde types over any
//!   ordered byte stream, with an optional SHA-256 digest verified on restore
//! - **Threading**: a mutex-guarded [`Window`] with a timer thread for time
//!   based windows, or a lock-free [`WindowCore`] for single-threaded operators
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use std::collections::VecDeque;
//! use streamweave_window::{WindowBuilder, WindowEvent, WindowPolicy};
//!
//! #[derive(Default)]
//! struct Sums(Mutex<Vec<i64>>);
//!
//! impl WindowEvent<String, i64> for Sums {
//!   fn on_trigger(&self, _key: &String, tuples: &VecDeque<i64>) {
//!     self.0.lock().unwrap().push(tuples.iter().sum());
//!   }
//! }
//!
//! let sums = Arc::new(Sums::default());
//! let window = WindowBuilder::<String, i64>::sliding(WindowPolicy::count(3))
//!   .with_trigger(WindowPolicy::count(1))
//!   .with_sink(sums.clone())
//!   .build()
//!   .unwrap();
//! for v in [1, 2, 3, 4] {
//!   window.insert("sensor-1".to_string(), v).unwrap();
//! }
//! assert_eq!(*sums.0.lock().unwrap(), vec![1, 3, 6, 9]);
//! ```

#![warn(missing_docs)]

/// Window construction and validation.
pub mod builder;
/// Checkpoint streams and the checkpoint codec.
pub mod checkpoint;
/// Serialized window configuration.
pub mod config;
/// Error types.
pub mod error;
/// Window event sinks.
pub mod event;
/// Eviction strategies.
pub mod eviction;
/// Partition eviction policies and victim selection.
pub mod partition_eviction;
/// Partition key and tuple capabilities.
pub mod partitioning;
/// Window, trigger and partition eviction policies.
pub mod policy;
/// Thread-safe window handle with timer thread.
pub mod runtime;
/// Partitioned tuple storage.
pub mod store;
/// Tumbling window summarizers.
pub mod summarizer;
/// Clocks.
pub mod time;
/// Trigger strategies.
pub mod trigger;
/// Window state machine.
pub mod window;

#[cfg(test)]
mod partition_eviction_test;

pub use builder::WindowBuilder;
pub use checkpoint::{CheckpointStream, IoCheckpoint, MemoryCheckpoint};
pub use config::{PolicyConfig, WindowConfig};
pub use error::{CheckpointError, WindowError, WindowResult};
pub use event::WindowEvent;
pub use partition_eviction::PartitionSelection;
pub use policy::{DeltaPolicy, PartitionEvictionPolicy, WindowKind, WindowPolicy};
pub use runtime::Window;
pub use summarizer::{SummarizerFactory, TumblingSummarizer};
pub use time::{Clock, ManualClock, SystemClock};
pub use window::{ResetCause, WindowCore};
