//! Value encoding on top of a [`CheckpointStream`], with an optional rolling digest.
//!
//! Layout of every checkpoint produced through [`CheckpointCodec`]:
//!
//! ```text
//! u8 checksum flag (0 | 1)
//! ... markers and value frames ...
//! [32 byte SHA-256 of everything after the flag byte, when the flag is 1]
//! ```
//!
//! A value frame is a little endian `u64` length followed by the value
//! encoded with `bincode`, so any `Serialize + DeserializeOwned` type can be
//! checkpointed. Markers are hashed as well as frames, so reordering
//! components changes the digest even when the bytes would otherwise decode.

use super::CheckpointStream;
use crate::error::{CheckpointError, CheckpointResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

/// Length of the trailing digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Read step for frames, so an untrusted length prefix never sizes an allocation.
const MAX_PREALLOC: usize = 4096;

/// Selects whether checkpoints carry, and restores require, a digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckpointCodec {
  /// Append a digest when writing and verify it when reading.
  pub verify_checksums: bool,
}

impl Default for CheckpointCodec {
  fn default() -> Self {
    Self {
      verify_checksums: true,
    }
  }
}

impl CheckpointCodec {
  /// Creates a codec.
  pub fn new(verify_checksums: bool) -> Self {
    Self { verify_checksums }
  }

  /// Starts a checkpoint on `stream`, writing the checksum flag.
  pub fn writer<'s>(
    &self,
    stream: &'s mut dyn CheckpointStream,
  ) -> CheckpointResult<CheckpointWriter<'s>> {
    stream.write_bytes(&[u8::from(self.verify_checksums)])?;
    Ok(CheckpointWriter {
      stream,
      hasher: self.verify_checksums.then(Sha256::new),
    })
  }

  /// Starts reading a checkpoint from `stream`.
  ///
  /// When checksum verification is enabled, a checkpoint without a digest is
  /// rejected as corrupt.
  pub fn reader<'s>(
    &self,
    stream: &'s mut dyn CheckpointStream,
  ) -> CheckpointResult<CheckpointReader<'s>> {
    let mut flag = [0u8; 1];
    stream.read_bytes(&mut flag)?;
    let has_digest = match flag[0] {
      0 => false,
      1 => true,
      other => {
        return Err(CheckpointError::Corrupt(format!(
          "unknown checksum flag {}",
          other
        )));
      }
    };
    if self.verify_checksums && !has_digest {
      return Err(CheckpointError::Corrupt(
        "checkpoint carries no digest but verification is enabled".to_string(),
      ));
    }
    Ok(CheckpointReader {
      stream,
      hasher: has_digest.then(Sha256::new),
      verify: self.verify_checksums,
    })
  }
}

/// Encodes values into a checkpoint stream.
pub struct CheckpointWriter<'s> {
  stream: &'s mut dyn CheckpointStream,
  hasher: Option<Sha256>,
}

impl<'s> CheckpointWriter<'s> {
  /// Writes raw bytes.
  pub fn write_raw(&mut self, bytes: &[u8]) -> CheckpointResult<()> {
    if let Some(hasher) = self.hasher.as_mut() {
      hasher.update(bytes);
    }
    self.stream.write_bytes(bytes)
  }

  /// Writes a self-describing marker.
  pub fn marker(&mut self, tag: &str) -> CheckpointResult<()> {
    if let Some(hasher) = self.hasher.as_mut() {
      hasher.update(tag.as_bytes());
    }
    self.stream.write_marker(tag)
  }

  /// Encodes `value` as one frame.
  pub fn put<V: Serialize + ?Sized>(&mut self, value: &V) -> CheckpointResult<()> {
    let frame = bincode::serialize(value).map_err(serialization_error)?;
    self.put_len(frame.len())?;
    self.write_raw(&frame)
  }

  /// Writes a length prefix.
  pub fn put_len(&mut self, len: usize) -> CheckpointResult<()> {
    self.write_raw(&(len as u64).to_le_bytes())
  }

  /// Returns true when a digest will be appended.
  pub fn is_hashing(&self) -> bool {
    self.hasher.is_some()
  }

  /// Completes the checkpoint, appending the digest when enabled.
  pub fn finish(self) -> CheckpointResult<()> {
    if let Some(hasher) = self.hasher {
      let digest = hasher.finalize();
      self.stream.write_bytes(&digest)?;
    }
    Ok(())
  }
}

/// Decodes values from a checkpoint stream.
pub struct CheckpointReader<'s> {
  stream: &'s mut dyn CheckpointStream,
  hasher: Option<Sha256>,
  verify: bool,
}

impl<'s> CheckpointReader<'s> {
  /// Fills `buf` with raw bytes.
  pub fn read_raw(&mut self, buf: &mut [u8]) -> CheckpointResult<()> {
    self.stream.read_bytes(buf)?;
    if let Some(hasher) = self.hasher.as_mut() {
      hasher.update(&*buf);
    }
    Ok(())
  }

  /// Reads a marker, failing with [`CheckpointError::Corrupt`] on mismatch.
  pub fn expect_marker(&mut self, tag: &str) -> CheckpointResult<()> {
    self.stream.verify_marker(tag)?;
    if let Some(hasher) = self.hasher.as_mut() {
      hasher.update(tag.as_bytes());
    }
    Ok(())
  }

  /// Decodes the next frame as a `V`.
  pub fn get<V: DeserializeOwned>(&mut self) -> CheckpointResult<V> {
    let len = self.get_len()?;
    let mut frame = Vec::with_capacity(len.min(MAX_PREALLOC));
    let mut chunk = [0u8; MAX_PREALLOC];
    let mut remaining = len;
    while remaining > 0 {
      let n = remaining.min(MAX_PREALLOC);
      self.read_raw(&mut chunk[..n])?;
      frame.extend_from_slice(&chunk[..n]);
      remaining -= n;
    }
    bincode::deserialize(&frame).map_err(serialization_error)
  }

  /// Reads a length prefix.
  pub fn get_len(&mut self) -> CheckpointResult<usize> {
    let mut buf = [0u8; 8];
    self.read_raw(&mut buf)?;
    let len = u64::from_le_bytes(buf);
    usize::try_from(len)
      .map_err(|_| CheckpointError::Corrupt(format!("length {} does not fit in memory", len)))
  }

  /// Completes the restore, reading and checking the digest when present.
  pub fn finish(self) -> CheckpointResult<()> {
    if let Some(hasher) = self.hasher {
      let expected = hasher.finalize();
      let mut found = [0u8; DIGEST_LEN];
      self.stream.read_bytes(&mut found)?;
      if self.verify && expected.as_slice() != &found[..] {
        return Err(CheckpointError::Corrupt(
          "checkpoint digest mismatch".to_string(),
        ));
      }
    }
    Ok(())
  }
}

fn serialization_error(e: bincode::Error) -> CheckpointError {
  CheckpointError::Serialization(e.to_string())
}
