// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;

#[test]
fn empty_buffer() {
    let mut buf = ReplayBuffer::new(16);
    assert!(buf.is_empty());
    assert_eq!(buf.size(), 0);
    assert_eq!(buf.drain(), Vec::<u8>::new());
}

#[test]
fn append_within_capacity() {
    let mut buf = ReplayBuffer::new(16);
    buf.write(b"hello");
    buf.write(b" world");
    assert_eq!(buf.size(), 11);
    assert_eq!(buf.drain(), b"hello world".to_vec());
    assert!(buf.is_empty());
}

#[test]
fn evicts_from_head() {
    let mut buf = ReplayBuffer::new(8);
    buf.write(b"abcdef");
    buf.write(b"ghij");
    assert_eq!(buf.size(), 8);
    assert_eq!(buf.drain(), b"cdefghij".to_vec());
}

#[test]
fn oversize_chunk_keeps_tail() {
    let mut buf = ReplayBuffer::new(4);
    buf.write(b"abcdefgh");
    assert_eq!(buf.drain(), b"efgh".to_vec());
}

#[test]
fn chunk_exactly_at_capacity_replaces_contents() {
    let mut buf = ReplayBuffer::new(4);
    buf.write(b"abc");
    buf.write(b"wxyz");
    assert_eq!(buf.drain(), b"wxyz".to_vec());
}

#[test]
fn drain_is_single_shot() {
    let mut buf = ReplayBuffer::new(16);
    buf.write(b"data");
    assert_eq!(buf.drain(), b"data".to_vec());
    assert_eq!(buf.drain(), Vec::<u8>::new());
}

proptest! {
    // After any write sequence, the buffer holds the suffix of the
    // concatenated writes of length min(capacity, total).
    #[test]
    fn suffix_law(capacity in 1usize..64, writes in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..48), 0..12)) {
        let mut buf = ReplayBuffer::new(capacity);
        let mut all: Vec<u8> = Vec::new();
        for w in &writes {
            buf.write(w);
            all.extend_from_slice(w);
        }
        let keep = capacity.min(all.len());
        let expected = all[all.len() - keep..].to_vec();
        prop_assert_eq!(buf.size(), keep);
        prop_assert_eq!(buf.drain(), expected);
        prop_assert_eq!(buf.size(), 0);
    }
}
