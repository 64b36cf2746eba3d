//! # Error Handling
//!
//! Error types for window construction, window operation and checkpointing.
//!
//! ## Taxonomy
//!
//! - **Configuration errors** ([`WindowError::InvalidConfig`], [`WindowError::Config`]):
//!   raised synchronously while a window is built. Fatal to that window instance only.
//! - **Checkpoint integrity errors** ([`CheckpointError::Corrupt`]): marker or digest
//!   mismatch on restore. Restore is aborted and the window is left empty.
//! - **Stream errors** ([`CheckpointError::Io`], [`CheckpointError::Truncated`]): the
//!   checkpoint stream could not deliver or accept bytes.
//!
//! Nothing here is retried internally. Retrying a checkpoint belongs to whoever owns
//! the checkpoint storage.

use thiserror::Error;

/// Error type for checkpoint streams and the checkpoint codec.
#[derive(Error, Debug)]
pub enum CheckpointError {
  /// I/O error reported by the underlying stream.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  /// The stream ended before a complete value could be read.
  #[error("checkpoint truncated: needed {needed} bytes, {available} available")]
  Truncated {
    /// Number of bytes requested.
    needed: usize,
    /// Number of bytes left in the stream.
    available: usize,
  },
  /// Marker or digest mismatch: the checkpoint is corrupt or was written by an
  /// incompatible window configuration.
  #[error("corrupt checkpoint: {0}")]
  Corrupt(String),
  /// A value frame could not be encoded or decoded by `bincode`.
  #[error("serialization error: {0}")]
  Serialization(String),
}

impl CheckpointError {
  /// Returns true for integrity failures (marker or digest mismatch).
  pub fn is_corrupt(&self) -> bool {
    matches!(self, CheckpointError::Corrupt(_))
  }
}

/// Error type for window operations.
#[derive(Error, Debug)]
pub enum WindowError {
  /// Invalid window configuration (incompatible policies, zero sizes, ...).
  #[error("invalid window config: {0}")]
  InvalidConfig(String),
  /// A serialized window configuration could not be parsed.
  #[error("config parse error: {0}")]
  Config(#[from] serde_json::Error),
  /// Checkpoint or restore failed.
  #[error(transparent)]
  Checkpoint(#[from] CheckpointError),
  /// The window mutex was poisoned by a panicking holder.
  #[error("lock error: {0}")]
  Lock(String),
  /// The background timer thread could not be started or joined.
  #[error("timer error: {0}")]
  Timer(String),
}

impl WindowError {
  /// Shorthand for [`WindowError::InvalidConfig`].
  pub fn invalid(msg: impl Into<String>) -> Self {
    WindowError::InvalidConfig(msg.into())
  }

  /// Returns true when the error is a corrupt checkpoint.
  pub fn is_corrupt_checkpoint(&self) -> bool {
    matches!(self, WindowError::Checkpoint(e) if e.is_corrupt())
  }
}

/// Result type for window operations.
pub type WindowResult<T> = Result<T, WindowError>;

/// Result type for checkpoint operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;
