//! Thread-safe window handle.
//!
//! [`Window`] serializes every operation on a [`WindowCore`] behind one mutex
//! and, for time based windows, runs a timer thread that calls
//! [`WindowCore::tick`] so eviction and triggers progress while no tuple
//! arrives. The operator thread and the timer thread are both plain OS threads.
//!
//! The timer is stopped by [`Window::shutdown`] or when the handle is dropped.

use crate::checkpoint::CheckpointStream;
use crate::error::{WindowError, WindowResult};
use crate::partitioning::{PartitionKey, WindowTuple};
use crate::store::PartitionStore;
use crate::summarizer::TumblingSummarizer;
use crate::window::{ResetCause, WindowCore};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

struct Timer {
  shutdown: Sender<()>,
  thread: JoinHandle<()>,
}

/// Window shared between an operator thread and a timer thread.
pub struct Window<K: PartitionKey, T: WindowTuple> {
  core: Arc<Mutex<WindowCore<K, T>>>,
  tick_interval: Duration,
  timer: Option<Timer>,
}

impl<K: PartitionKey, T: WindowTuple> Window<K, T> {
  pub(crate) fn new(core: WindowCore<K, T>, tick_interval: Duration) -> Self {
    Self {
      core: Arc::new(Mutex::new(core)),
      tick_interval,
      timer: None,
    }
  }

  fn lock(&self) -> WindowResult<MutexGuard<'_, WindowCore<K, T>>> {
    self
      .core
      .lock()
      .map_err(|e| WindowError::Lock(e.to_string()))
  }

  /// Starts the timer thread if the window is time based. Starting a running
  /// window does nothing.
  pub fn start(&mut self) -> WindowResult<()> {
    if self.timer.is_some() || !self.lock()?.needs_timer() {
      return Ok(());
    }
    let (shutdown, receiver) = bounded(1);
    let core = Arc::clone(&self.core);
    let interval = self.tick_interval;
    let thread = thread::Builder::new()
      .name("window-timer".to_string())
      .spawn(move || timer_loop(core, receiver, interval))
      .map_err(|e| WindowError::Timer(e.to_string()))?;
    self.timer = Some(Timer { shutdown, thread });
    Ok(())
  }

  /// Returns true while the timer thread runs.
  pub fn is_running(&self) -> bool {
    self.timer.is_some()
  }

  /// Stops and joins the timer thread.
  pub fn shutdown(&mut self) -> WindowResult<()> {
    let Some(timer) = self.timer.take() else {
      return Ok(());
    };
    let _ = timer.shutdown.send(());
    timer
      .thread
      .join()
      .map_err(|_| WindowError::Timer("window timer thread panicked".to_string()))
  }

  /// Inserts `tuple` into partition `key`.
  pub fn insert(&self, key: K, tuple: T) -> WindowResult<()> {
    self.lock()?.insert(key, tuple);
    Ok(())
  }

  /// Delivers a window punctuation.
  pub fn insert_punctuation(&self) -> WindowResult<()> {
    self.lock()?.insert_punctuation();
    Ok(())
  }

  /// Flushes every non-empty partition of a tumbling window.
  pub fn drain(&self) -> WindowResult<()> {
    self.lock()?.drain();
    Ok(())
  }

  /// Runs one timer step on the calling thread.
  pub fn tick(&self) -> WindowResult<()> {
    self.lock()?.tick();
    Ok(())
  }

  /// Writes the window to `stream`.
  pub fn checkpoint(&self, stream: &mut dyn CheckpointStream) -> WindowResult<()> {
    self.lock()?.checkpoint(stream)
  }

  /// Replaces the window state with the checkpoint in `stream`. On failure the
  /// window is empty.
  pub fn restore(&self, stream: &mut dyn CheckpointStream) -> WindowResult<()> {
    self.lock()?.restore(stream)
  }

  /// Discards all state and notifies event sinks.
  pub fn reset_to_initial_state(&self) -> WindowResult<()> {
    self.lock()?.reset_to_initial_state(ResetCause::External);
    Ok(())
  }

  /// Runs `f` with read access to the partition store.
  pub fn with_store<R>(&self, f: impl FnOnce(&PartitionStore<K, T>) -> R) -> WindowResult<R> {
    Ok(f(self.lock()?.store()))
  }

  /// Runs `f` with the summarizer of the open window of `key`.
  pub fn with_summarizer<R>(
    &self,
    key: &K,
    f: impl FnOnce(Option<&dyn TumblingSummarizer<K, T>>) -> R,
  ) -> WindowResult<R> {
    Ok(f(self.lock()?.summarizer(key)))
  }

  /// Copy of the tuples buffered for `key`, oldest first.
  pub fn partition_tuples(&self, key: &K) -> WindowResult<Option<Vec<T>>> {
    Ok(
      self
        .lock()?
        .partition_tuples(key)
        .map(|tuples| tuples.iter().cloned().collect()),
    )
  }

  /// Total buffered tuples.
  pub fn tuple_count(&self) -> WindowResult<usize> {
    Ok(self.lock()?.tuple_count())
  }

  /// Number of partitions.
  pub fn partition_count(&self) -> WindowResult<usize> {
    Ok(self.lock()?.partition_count())
  }
}

impl<K: PartitionKey, T: WindowTuple> Drop for Window<K, T> {
  fn drop(&mut self) {
    if let Err(e) = self.shutdown() {
      error!(error = %e, "Window timer did not stop cleanly");
    }
  }
}

fn timer_loop<K: PartitionKey, T: WindowTuple>(
  core: Arc<Mutex<WindowCore<K, T>>>,
  shutdown: Receiver<()>,
  interval: Duration,
) {
  debug!(?interval, "Window timer started");
  loop {
    match shutdown.recv_timeout(interval) {
      Err(RecvTimeoutError::Timeout) => match core.lock() {
        Ok(mut window) => window.tick(),
        Err(e) => {
          error!(error = %e, "Window lock poisoned, timer stopping");
          break;
        }
      },
      Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
    }
  }
  debug!("Window timer stopped");
}
