//! Clocks used by time-based eviction, time-based triggers and age-based
//! partition eviction.
//!
//! Every time-dependent component of a window reads the same [`Clock`], so a
//! window sees one consistent notion of "now". Time is expressed as seconds in
//! an `f64`, matching the unit of [`WindowPolicy::Time`](crate::policy::WindowPolicy).
//!
//! - [`SystemClock`]: wall clock backed by `chrono::Utc::now()`.
//! - [`ManualClock`]: a clock that only moves when told to. Used by tests and by
//!   replay tooling that drives windows from recorded timestamps.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of "now in seconds".
pub trait Clock: Send + Sync {
  /// Returns the current time in seconds.
  fn now(&self) -> f64;
}

/// Wall clock reporting seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
  /// Creates a new system clock.
  pub fn new() -> Self {
    Self
  }
}

impl Clock for SystemClock {
  fn now(&self) -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
  }
}

/// A clock that is advanced explicitly.
///
/// The time is stored as the bit pattern of an `f64` so the clock can be shared
/// between the operator thread and the timer thread without a lock.
#[derive(Debug, Default)]
pub struct ManualClock {
  bits: AtomicU64,
}

impl ManualClock {
  /// Creates a manual clock starting at `start` seconds.
  pub fn new(start: f64) -> Self {
    Self {
      bits: AtomicU64::new(start.to_bits()),
    }
  }

  /// Sets the current time.
  pub fn set(&self, now: f64) {
    self.bits.store(now.to_bits(), Ordering::SeqCst);
  }

  /// Moves the clock forward by `seconds`.
  pub fn advance(&self, seconds: f64) {
    let mut current = self.bits.load(Ordering::SeqCst);
    loop {
      let next = (f64::from_bits(current) + seconds).to_bits();
      match self
        .bits
        .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
      {
        Ok(_) => return,
        Err(observed) => current = observed,
      }
    }
  }
}

impl Clock for ManualClock {
  fn now(&self) -> f64 {
    f64::from_bits(self.bits.load(Ordering::SeqCst))
  }
}
