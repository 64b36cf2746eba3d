//! Tests for the checkpoint frame codec and digest handling.

use crate::checkpoint::{CheckpointCodec, CheckpointStream, DIGEST_LEN, MemoryCheckpoint};
use crate::error::CheckpointError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Reading {
  sensor: String,
  value: f64,
  tags: Vec<String>,
}

fn write_sample(codec: CheckpointCodec) -> Vec<u8> {
  let mut ckpt = MemoryCheckpoint::new();
  let mut w = codec.writer(&mut ckpt).unwrap();
  w.marker("Sample").unwrap();
  w.put(&42u64).unwrap();
  w.put(&String::from("key")).unwrap();
  w.put(&vec![1i32, -2, 3]).unwrap();
  w.put(&(7u8, 2.5f64)).unwrap();
  w.finish().unwrap();
  ckpt.as_bytes().to_vec()
}

// ============================================================================
// Value Tests
// ============================================================================

#[test]
fn test_values_decode_in_order() {
  let codec = CheckpointCodec::new(true);
  let bytes = write_sample(codec);

  let mut ckpt = MemoryCheckpoint::from_bytes(&bytes);
  let mut r = codec.reader(&mut ckpt).unwrap();
  r.expect_marker("Sample").unwrap();
  assert_eq!(r.get::<u64>().unwrap(), 42);
  assert_eq!(r.get::<String>().unwrap(), "key");
  assert_eq!(r.get::<Vec<i32>>().unwrap(), vec![1, -2, 3]);
  assert_eq!(r.get::<(u8, f64)>().unwrap(), (7, 2.5));
  r.finish().unwrap();
  assert!(ckpt.is_empty());
}

#[test]
fn test_collections_and_options() {
  let codec = CheckpointCodec::new(false);
  let mut ckpt = MemoryCheckpoint::new();
  let deque: VecDeque<i64> = [3, 1, 2].into_iter().collect();
  let mut map = BTreeMap::new();
  map.insert(String::from("b"), 2.0f64);
  map.insert(String::from("a"), 1.0f64);

  let mut w = codec.writer(&mut ckpt).unwrap();
  w.put(&deque).unwrap();
  w.put(&map).unwrap();
  w.put(&Some(true)).unwrap();
  w.put(&Option::<u32>::None).unwrap();
  w.put(&9usize).unwrap();
  w.finish().unwrap();

  let mut r = codec.reader(&mut ckpt).unwrap();
  assert_eq!(r.get::<VecDeque<i64>>().unwrap(), deque);
  assert_eq!(r.get::<BTreeMap<String, f64>>().unwrap(), map);
  assert_eq!(r.get::<Option<bool>>().unwrap(), Some(true));
  assert_eq!(r.get::<Option<u32>>().unwrap(), None);
  assert_eq!(r.get::<usize>().unwrap(), 9);
  r.finish().unwrap();
}

#[test]
fn test_derived_types_round_trip() {
  let codec = CheckpointCodec::new(true);
  let reading = Reading {
    sensor: "s1".to_string(),
    value: -3.25,
    tags: vec!["north".to_string(), "roof".to_string()],
  };
  let mut ckpt = MemoryCheckpoint::new();
  let mut w = codec.writer(&mut ckpt).unwrap();
  w.put(&reading).unwrap();
  w.put(&vec![reading.clone(), reading.clone()]).unwrap();
  w.finish().unwrap();

  let mut r = codec.reader(&mut ckpt).unwrap();
  assert_eq!(r.get::<Reading>().unwrap(), reading);
  assert_eq!(r.get::<Vec<Reading>>().unwrap().len(), 2);
  r.finish().unwrap();
}

#[test]
fn test_frame_carries_its_length() {
  let codec = CheckpointCodec::new(false);
  let mut ckpt = MemoryCheckpoint::new();
  let mut w = codec.writer(&mut ckpt).unwrap();
  w.put(&7u32).unwrap();
  w.finish().unwrap();
  let bytes = ckpt.as_bytes().to_vec();
  assert_eq!(bytes.len(), 1 + 8 + 4);
  assert_eq!(&bytes[1..9], &4u64.to_le_bytes());
  assert_eq!(&bytes[9..], &7u32.to_le_bytes());
}

#[test]
fn test_invalid_bool_is_a_serialization_error() {
  let codec = CheckpointCodec::new(false);
  let mut bytes = vec![0u8];
  bytes.extend_from_slice(&1u64.to_le_bytes());
  bytes.push(5);
  let mut ckpt = MemoryCheckpoint::from_bytes(&bytes);
  let mut r = codec.reader(&mut ckpt).unwrap();
  assert!(matches!(
    r.get::<bool>(),
    Err(CheckpointError::Serialization(_))
  ));
}

#[test]
fn test_short_frame_is_a_serialization_error() {
  let codec = CheckpointCodec::new(false);
  let mut ckpt = MemoryCheckpoint::new();
  let mut w = codec.writer(&mut ckpt).unwrap();
  w.put(&1u8).unwrap();
  w.finish().unwrap();

  let mut r = codec.reader(&mut ckpt).unwrap();
  let err = r.get::<u64>().unwrap_err();
  assert!(matches!(err, CheckpointError::Serialization(_)));
  assert!(!err.is_corrupt());
}

#[test]
fn test_huge_length_prefix_fails_on_read() {
  let codec = CheckpointCodec::new(false);
  let mut bytes = vec![0u8];
  bytes.extend_from_slice(&(u32::MAX as u64).to_le_bytes());
  bytes.extend_from_slice(b"abc");
  let mut ckpt = MemoryCheckpoint::from_bytes(&bytes);
  let mut r = codec.reader(&mut ckpt).unwrap();
  assert!(matches!(
    r.get::<String>(),
    Err(CheckpointError::Truncated { .. })
  ));
}

// ============================================================================
// Digest Tests
// ============================================================================

#[test]
fn test_digest_is_appended_only_when_enabled() {
  let with = write_sample(CheckpointCodec::new(true));
  let without = write_sample(CheckpointCodec::new(false));
  assert_eq!(with.len(), without.len() + DIGEST_LEN);
  assert_eq!(with[0], 1);
  assert_eq!(without[0], 0);
  assert_eq!(&with[1..without.len()], &without[1..]);
}

#[test]
fn test_flipped_byte_fails_digest() {
  let codec = CheckpointCodec::new(true);
  let mut bytes = write_sample(codec);
  // Inside the u64 payload, after the flag, the "Sample" marker and the frame length.
  let idx = 1 + 4 + "Sample".len() + 8;
  bytes[idx] ^= 0xFF;

  let mut ckpt = MemoryCheckpoint::from_bytes(&bytes);
  let mut r = codec.reader(&mut ckpt).unwrap();
  r.expect_marker("Sample").unwrap();
  let _ = r.get::<u64>().unwrap();
  let _ = r.get::<String>().unwrap();
  let _ = r.get::<Vec<i32>>().unwrap();
  let _ = r.get::<(u8, f64)>().unwrap();
  let err = r.finish().unwrap_err();
  assert!(err.is_corrupt());
}

#[test]
fn test_missing_digest_is_rejected_when_verifying() {
  let bytes = write_sample(CheckpointCodec::new(false));
  let mut ckpt = MemoryCheckpoint::from_bytes(&bytes);
  match CheckpointCodec::new(true).reader(&mut ckpt) {
    Err(e) => assert!(e.is_corrupt()),
    Ok(_) => panic!("reader accepted a checkpoint without digest"),
  }
}

#[test]
fn test_present_digest_is_skipped_when_not_verifying() {
  let mut bytes = write_sample(CheckpointCodec::new(true));
  let last = bytes.len() - 1;
  bytes[last] ^= 0x01;

  let mut ckpt = MemoryCheckpoint::from_bytes(&bytes);
  let mut r = CheckpointCodec::new(false).reader(&mut ckpt).unwrap();
  r.expect_marker("Sample").unwrap();
  let _ = r.get::<u64>().unwrap();
  let _ = r.get::<String>().unwrap();
  let _ = r.get::<Vec<i32>>().unwrap();
  let _ = r.get::<(u8, f64)>().unwrap();
  r.finish().unwrap();
  assert!(ckpt.is_empty());
}

#[test]
fn test_unknown_flag_is_corrupt() {
  let mut ckpt = MemoryCheckpoint::from_bytes(&[7]);
  match CheckpointCodec::default().reader(&mut ckpt) {
    Err(e) => assert!(e.is_corrupt()),
    Ok(_) => panic!("unknown flag accepted"),
  }
}

#[test]
fn test_writer_goes_through_dyn_stream() {
  let codec = CheckpointCodec::new(true);
  let mut ckpt = MemoryCheckpoint::new();
  {
    let stream: &mut dyn CheckpointStream = &mut ckpt;
    let w = codec.writer(stream).unwrap();
    assert!(w.is_hashing());
    w.finish().unwrap();
  }
  assert_eq!(ckpt.len(), 1 + DIGEST_LEN);
}
