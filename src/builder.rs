//! Window construction.
//!
//! [`WindowBuilder`] collects policies, sinks and runtime settings, validates
//! the combination, and builds either a lock-free [`WindowCore`] or a
//! thread-safe [`Window`].
//!
//! ```rust
//! use streamweave_window::{WindowBuilder, WindowPolicy};
//!
//! let mut window = WindowBuilder::<u32, i64>::sliding(WindowPolicy::count(3))
//!   .with_trigger(WindowPolicy::count(2))
//!   .build_core()
//!   .unwrap();
//! for v in 1..=5 {
//!   window.insert(0, v);
//! }
//! assert_eq!(window.partition_tuples(&0).unwrap(), &[3, 4, 5]);
//! ```

use crate::checkpoint::CheckpointCodec;
use crate::error::{WindowError, WindowResult};
use crate::event::{EventSinks, WindowEvent};
use crate::eviction::{CountEviction, DeltaEviction, EvictionStrategy, PunctEviction, TimeEviction};
use crate::partition_eviction::PartitionEvictor;
use crate::partitioning::{PartitionKey, WindowTuple};
use crate::policy::{PartitionEvictionPolicy, PolicyKind, WindowKind, WindowPolicy};
use crate::runtime::Window;
use crate::summarizer::{Summaries, SummarizerFactory, TumblingSummarizer};
use crate::time::{Clock, SystemClock};
use crate::trigger::{CountTrigger, TimeTrigger, TriggerStrategy};
use crate::window::WindowCore;
use std::sync::Arc;
use std::time::Duration;

/// Default period of the timer thread.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Builder for [`WindowCore`] and [`Window`].
pub struct WindowBuilder<K, T> {
  kind: WindowKind,
  eviction: WindowPolicy<T>,
  trigger: Option<WindowPolicy<T>>,
  partition_eviction: Option<PartitionEvictionPolicy>,
  sinks: EventSinks<K, T>,
  summarizer: Option<SummarizerFactory<K, T>>,
  clock: Arc<dyn Clock>,
  verify_checksums: bool,
  tick_interval: Duration,
}

impl<K: PartitionKey, T: WindowTuple> WindowBuilder<K, T> {
  fn new(kind: WindowKind, eviction: WindowPolicy<T>) -> Self {
    Self {
      kind,
      eviction,
      trigger: None,
      partition_eviction: None,
      sinks: EventSinks::new(),
      summarizer: None,
      clock: Arc::new(SystemClock::new()),
      verify_checksums: true,
      tick_interval: DEFAULT_TICK_INTERVAL,
    }
  }

  /// Sliding window with the given eviction policy.
  pub fn sliding(eviction: WindowPolicy<T>) -> Self {
    Self::new(WindowKind::Sliding, eviction)
  }

  /// Tumbling window with the given eviction policy.
  pub fn tumbling(eviction: WindowPolicy<T>) -> Self {
    Self::new(WindowKind::Tumbling, eviction)
  }

  /// Sets the trigger policy. Sliding windows only.
  pub fn with_trigger(mut self, trigger: WindowPolicy<T>) -> Self {
    self.trigger = Some(trigger);
    self
  }

  /// Bounds the window's partitions.
  pub fn with_partition_eviction(mut self, policy: PartitionEvictionPolicy) -> Self {
    self.partition_eviction = Some(policy);
    self
  }

  /// Replaces the wall clock.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Registers an event sink. Sinks are notified in registration order.
  pub fn with_sink(mut self, sink: Arc<dyn WindowEvent<K, T>>) -> Self {
    self.sinks.push(sink);
    self
  }

  /// Keeps one summarizer per open partition instead of buffering tuples.
  /// Tumbling windows only.
  pub fn with_summarizer<S, F>(mut self, factory: F) -> Self
  where
    S: TumblingSummarizer<K, T> + 'static,
    F: Fn(&K) -> S + Send + Sync + 'static,
  {
    self.summarizer = Some(Arc::new(move |key: &K| {
      Box::new(factory(key)) as Box<dyn TumblingSummarizer<K, T>>
    }));
    self
  }

  /// Enables or disables checkpoint digests (enabled by default).
  pub fn with_verify_checksums(mut self, verify: bool) -> Self {
    self.verify_checksums = verify;
    self
  }

  /// Sets the timer thread period.
  pub fn with_tick_interval(mut self, interval: Duration) -> Self {
    self.tick_interval = interval;
    self
  }

  /// Checks the configuration without building.
  pub fn validate(&self) -> WindowResult<()> {
    self.eviction.validate()?;
    if self.kind == WindowKind::Sliding && self.eviction.kind() == PolicyKind::Punct {
      return Err(WindowError::invalid(
        "punctuation eviction requires a tumbling window",
      ));
    }
    if let Some(trigger) = &self.trigger {
      if self.kind == WindowKind::Tumbling {
        return Err(WindowError::invalid(
          "tumbling windows do not take a trigger policy",
        ));
      }
      if matches!(trigger.kind(), PolicyKind::Delta | PolicyKind::Punct) {
        return Err(WindowError::invalid(format!(
          "{} is not a valid trigger policy",
          trigger.kind()
        )));
      }
      trigger.validate()?;
    }
    if self.summarizer.is_some() && self.kind == WindowKind::Sliding {
      return Err(WindowError::invalid(
        "summarizers require a tumbling window",
      ));
    }
    if let Some(policy) = &self.partition_eviction {
      policy.validate()?;
    }
    if self.tick_interval.is_zero() {
      return Err(WindowError::invalid("tick interval must be greater than 0"));
    }
    Ok(())
  }

  /// Builds a window without locking or timer thread. The caller drives
  /// [`WindowCore::tick`] if the window is time based.
  pub fn build_core(self) -> WindowResult<WindowCore<K, T>> {
    self.validate()?;
    let kind = self.kind;

    let eviction: Box<dyn EvictionStrategy<K, T>> = match self.eviction {
      WindowPolicy::Count { size } => Box::new(CountEviction::new(size, kind)),
      WindowPolicy::Time { seconds } => Box::new(TimeEviction::new(seconds, kind)),
      WindowPolicy::Delta(policy) => Box::new(DeltaEviction::new(policy, kind)),
      WindowPolicy::Punct => Box::new(PunctEviction::new()),
    };

    let trigger: Option<Box<dyn TriggerStrategy<K>>> = match self.trigger {
      None => None,
      Some(WindowPolicy::Count { size }) => Some(Box::new(CountTrigger::new(size))),
      Some(WindowPolicy::Time { seconds }) => Some(Box::new(TimeTrigger::new(seconds))),
      Some(other) => {
        return Err(WindowError::invalid(format!(
          "{} is not a valid trigger policy",
          other.kind()
        )));
      }
    };

    Ok(WindowCore::from_parts(
      kind,
      eviction,
      trigger,
      self.partition_eviction.map(PartitionEvictor::new),
      self.sinks,
      self.summarizer.map(Summaries::new),
      self.clock,
      CheckpointCodec::new(self.verify_checksums),
    ))
  }

  /// Builds a thread-safe window. Call [`Window::start`] to run the timer
  /// thread of a time based window.
  pub fn build(self) -> WindowResult<Window<K, T>> {
    let tick_interval = self.tick_interval;
    Ok(Window::new(self.build_core()?, tick_interval))
  }
}
