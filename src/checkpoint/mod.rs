//! Checkpoint streams and the window checkpoint codec.
//!
//! A window never talks to a storage medium. It writes to, and restores from, an
//! ordered byte channel implementing [`CheckpointStream`]. The storage layer that
//! owns the stream (file system, key-value store, ...) decides durability and
//! retries.
//!
//! Two streams ship with the crate:
//!
//! - [`MemoryCheckpoint`]: an in-memory buffer, written front to back and read
//!   front to back.
//! - [`IoCheckpoint`]: an adapter over any `std::io::Read + Write`, e.g. a file.
//!
//! Structured values are encoded through [`CheckpointWriter`] and decoded through
//! [`CheckpointReader`] as `bincode` frames over serde.

mod codec;
#[cfg(test)]
mod codec_test;

pub use codec::{CheckpointCodec, CheckpointReader, CheckpointWriter, DIGEST_LEN};

use crate::error::{CheckpointError, CheckpointResult};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{ErrorKind, Read, Write};

/// Upper bound on marker length accepted by [`CheckpointStream::verify_marker`].
const MAX_MARKER_LEN: usize = 256;

/// Ordered byte channel a window checkpoints into and restores from.
///
/// Implementations are synchronous from the window's point of view; any blocking
/// belongs to the implementation.
pub trait CheckpointStream {
  /// Appends `bytes` to the stream.
  fn write_bytes(&mut self, bytes: &[u8]) -> CheckpointResult<()>;

  /// Fills `buf` with the next bytes of the stream.
  fn read_bytes(&mut self, buf: &mut [u8]) -> CheckpointResult<()>;

  /// Writes a self-describing marker.
  fn write_marker(&mut self, tag: &str) -> CheckpointResult<()> {
    let len = u32::try_from(tag.len())
      .ok()
      .filter(|len| (*len as usize) <= MAX_MARKER_LEN)
      .ok_or_else(|| CheckpointError::Serialization(format!("marker too long: {}", tag.len())))?;
    self.write_bytes(&len.to_le_bytes())?;
    self.write_bytes(tag.as_bytes())
  }

  /// Reads a marker and fails with [`CheckpointError::Corrupt`] unless it equals `tag`.
  fn verify_marker(&mut self, tag: &str) -> CheckpointResult<()> {
    let mut len = [0u8; 4];
    self.read_bytes(&mut len)?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_MARKER_LEN {
      return Err(CheckpointError::Corrupt(format!(
        "expected marker '{}', found a {} byte marker",
        tag, len
      )));
    }
    let mut found = vec![0u8; len];
    self.read_bytes(&mut found)?;
    if found != tag.as_bytes() {
      return Err(CheckpointError::Corrupt(format!(
        "expected marker '{}', found '{}'",
        tag,
        String::from_utf8_lossy(&found)
      )));
    }
    Ok(())
  }
}

impl<S: CheckpointStream + ?Sized> CheckpointStream for &mut S {
  fn write_bytes(&mut self, bytes: &[u8]) -> CheckpointResult<()> {
    (**self).write_bytes(bytes)
  }

  fn read_bytes(&mut self, buf: &mut [u8]) -> CheckpointResult<()> {
    (**self).read_bytes(buf)
  }

  fn write_marker(&mut self, tag: &str) -> CheckpointResult<()> {
    (**self).write_marker(tag)
  }

  fn verify_marker(&mut self, tag: &str) -> CheckpointResult<()> {
    (**self).verify_marker(tag)
  }
}

/// In-memory checkpoint stream.
///
/// Writes append to the buffer; reads consume from its front.
#[derive(Clone, Debug, Default)]
pub struct MemoryCheckpoint {
  data: BytesMut,
}

impl MemoryCheckpoint {
  /// Creates an empty stream.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a stream positioned at the start of `bytes`.
  pub fn from_bytes(bytes: &[u8]) -> Self {
    Self {
      data: BytesMut::from(bytes),
    }
  }

  /// Number of unread bytes.
  pub fn len(&self) -> usize {
    self.data.len()
  }

  /// Returns true when no unread bytes remain.
  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// Returns the unread bytes.
  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  /// Consumes the stream and returns its unread bytes.
  pub fn freeze(self) -> Bytes {
    self.data.freeze()
  }
}

impl CheckpointStream for MemoryCheckpoint {
  fn write_bytes(&mut self, bytes: &[u8]) -> CheckpointResult<()> {
    self.data.put_slice(bytes);
    Ok(())
  }

  fn read_bytes(&mut self, buf: &mut [u8]) -> CheckpointResult<()> {
    if self.data.len() < buf.len() {
      return Err(CheckpointError::Truncated {
        needed: buf.len(),
        available: self.data.len(),
      });
    }
    let chunk = self.data.split_to(buf.len());
    buf.copy_from_slice(&chunk);
    Ok(())
  }
}

/// Checkpoint stream over any `std::io` reader/writer.
#[derive(Debug)]
pub struct IoCheckpoint<S> {
  inner: S,
}

impl<S> IoCheckpoint<S> {
  /// Wraps `inner`.
  pub fn new(inner: S) -> Self {
    Self { inner }
  }

  /// Returns the wrapped reader/writer.
  pub fn into_inner(self) -> S {
    self.inner
  }
}

impl<S: Read + Write> CheckpointStream for IoCheckpoint<S> {
  fn write_bytes(&mut self, bytes: &[u8]) -> CheckpointResult<()> {
    self.inner.write_all(bytes)?;
    Ok(())
  }

  fn read_bytes(&mut self, buf: &mut [u8]) -> CheckpointResult<()> {
    self.inner.read_exact(buf).map_err(|e| {
      if e.kind() == ErrorKind::UnexpectedEof {
        CheckpointError::Truncated {
          needed: buf.len(),
          available: 0,
        }
      } else {
        CheckpointError::Io(e)
      }
    })
  }
}
