//! Tests for file handles, golden roots and segment proofs.

use super::*;
use crate::{
    PrimitivesError,
    layout::{CHUNK_SIZE, Layout, SEGMENT_SIZE},
    merkle::{MerkleError, ZERO_HASH},
};
use alloy_primitives::{B256, hex};
use proptest::prelude::*;
use std::io::Write;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

fn b256(hex_str: &str) -> B256 {
    B256::from_slice(&hex::decode(hex_str).unwrap())
}

#[test]
fn test_golden_roots() {
    let vectors = [
        (0, "0000000000000000000000000000000000000000000000000000000000000000"),
        (1, "d397b3b043d87fcd6fad1291ff0bfd16401c274896d8c63a923727f077b8e0b5"),
        (256, "dc924469b334aed2a19fac7252e9961aea41f8d91996366029dbe0884229bf36"),
        (1024, "8aacdaee85c82f964038af7e81c183b6fec58de00e2867206fd4f2ae9444a194"),
        (4096, "0f3435b305ea676f607d3af612a44049185d571e4c527fa1c1ae759b123a408d"),
        (16384, "297018421256fcc29107e3654679fee0a8541b2ef0538507e7c7a05ed2e22470"),
        (65536, "d5782ea03d7a6dbc674b9715940f06f8a89f4eb99c762e40c5dbd46dc56557ad"),
    ];

    for (len, expected) in vectors {
        let file = FileHandle::from_bytes(pattern(len));
        assert_eq!(file.root_hash().unwrap(), b256(expected), "length {len}");
    }
}

#[test]
fn test_golden_root_single_byte() {
    let file = FileHandle::from_bytes(vec![0x2a]);
    assert_eq!(
        file.root_hash().unwrap(),
        b256("2c74edb9239c79dd8f53f49b94b557a1da091ca49eee61a2146c6249bbca24c8")
    );
}

#[test]
fn test_golden_root_multi_segment() {
    let file = FileHandle::from_bytes(pattern(2 * SEGMENT_SIZE + 1000));
    assert_eq!(file.num_segments(), 3);
    assert_eq!(file.merkle_tree().unwrap().num_leaves(), 3);
    assert_eq!(
        file.root_hash().unwrap(),
        b256("dbd7be748b8a1a154a199cb7bccbb3f2f230594af6a585274c101b3e0e112e96")
    );
}

#[test]
fn test_golden_root_padding_segment() {
    // flow padding adds an eighteenth, all-empty leaf
    let file = FileHandle::from_bytes(pattern(16385 * CHUNK_SIZE));
    assert_eq!(file.num_segments(), 17);
    assert_eq!(file.merkle_tree().unwrap().num_leaves(), 18);
    assert_eq!(
        file.root_hash().unwrap(),
        b256("58afec1e87f38396bafed478c4b4de4e9cd13d0d7ca4b887b8fd840abbc3812d")
    );
}

#[test]
fn test_empty_file() {
    let file = FileHandle::from_bytes(Vec::new());
    assert_eq!(file.size(), 0);
    assert_eq!(file.num_chunks(), 0);
    assert_eq!(file.num_segments(), 0);
    assert_eq!(file.iterate_segments().count(), 0);
    assert_eq!(file.root_hash().unwrap(), ZERO_HASH);
    assert!(matches!(
        file.read_segment(0),
        Err(FileError::SegmentOutOfRange { index: 0, segments: 0 })
    ));
}

#[test]
fn test_single_byte_file() {
    let file = FileHandle::from_bytes(vec![9u8]);
    assert_eq!(file.num_chunks(), 1);
    assert_eq!(file.num_segments(), 1);

    let segments: Vec<_> = file.iterate_segments().collect::<Result<_, _>>().unwrap();
    assert_eq!(segments, vec![Segment::new(0, vec![9u8].into())]);
    assert_eq!(segments[0].chunk_aligned(file.layout()).len(), CHUNK_SIZE);
}

#[test]
fn test_iterate_segments_in_order() {
    let data = pattern(3 * SEGMENT_SIZE + 17);
    let file = FileHandle::from_bytes(data.clone());
    let iter = file.iterate_segments();
    assert_eq!(iter.size_hint(), (4, Some(4)));

    let mut joined = Vec::new();
    for (expected, segment) in iter.enumerate() {
        let segment = segment.unwrap();
        assert_eq!(segment.index, expected as u64);
        joined.extend_from_slice(&segment.data);
    }
    assert_eq!(joined, data);
}

#[test]
fn test_random_access_matches_iteration() {
    let file = FileHandle::from_bytes(pattern(2 * SEGMENT_SIZE + 5));
    let second = file.read_segment(1).unwrap();
    let iterated = file.iterate_segments().nth(1).unwrap().unwrap();
    assert_eq!(second, iterated);
    assert_eq!(file.read_segment(2).unwrap().len(), 5);
}

#[test]
fn test_read_padded_segment() {
    // 16385 chunks pad to 18 segments, the last two beyond the data
    let file = FileHandle::from_bytes(pattern(16385 * CHUNK_SIZE));
    let tree = file.merkle_tree().unwrap();

    let partial = file.read_padded_segment(16).unwrap();
    assert_eq!(partial.len(), SEGMENT_SIZE);
    let stored = file.read_segment(16).unwrap();
    assert_eq!(&partial.data[..CHUNK_SIZE], &stored.data[..]);
    assert!(partial.data[CHUNK_SIZE..].iter().all(|b| *b == 0));
    let leaf = crate::merkle::segment_root(&partial.data, 0);
    assert_eq!(leaf, tree.leaf(16).unwrap());

    let padding = file.read_padded_segment(17).unwrap();
    assert!(padding.data.iter().all(|b| *b == 0));
    assert!(matches!(
        file.read_padded_segment(18),
        Err(FileError::SegmentOutOfRange { index: 18, segments: 18 })
    ));
}

#[test]
fn test_close_is_idempotent() {
    let file = FileHandle::from_bytes(pattern(1000));
    assert!(!file.is_closed());
    file.close();
    file.close();
    assert!(file.is_closed());
    assert!(matches!(file.read_segment(0), Err(FileError::Closed)));
    assert!(matches!(file.root_hash(), Err(FileError::Closed)));
}

#[test]
fn test_cached_tree_survives_close() {
    let file = FileHandle::from_bytes(pattern(1000));
    let root = file.root_hash().unwrap();
    file.close();
    assert_eq!(file.root_hash().unwrap(), root);
}

#[test]
fn test_open_path() {
    let data = pattern(SEGMENT_SIZE + 300);
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&data).unwrap();
    tmp.flush().unwrap();

    let from_path = FileHandle::open_path(tmp.path()).unwrap();
    let from_bytes = FileHandle::from_bytes(data);
    assert_eq!(from_path.size(), from_bytes.size());
    let expected = from_bytes.root_hash().unwrap();
    assert_eq!(from_path.root_hash().unwrap(), expected);
}

#[test]
fn test_open_missing_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.bin");
    assert!(matches!(FileHandle::open_path(&missing), Err(FileError::Unreadable { .. })));
}

#[test]
fn test_segment_proofs_verify() {
    let file = FileHandle::from_bytes(pattern(2 * SEGMENT_SIZE + 1000));
    let root = file.root_hash().unwrap();
    let layout = *file.layout();

    for segment in file.iterate_segments() {
        let segment = segment.unwrap();
        let proof = file.proof_at(segment.index).unwrap();
        let (index, data) = (segment.index, &segment.data);
        assert_eq!(
            verify_segment(&layout, &root, file.size(), index, data, &proof),
            Ok(())
        );
        let aligned = segment.chunk_aligned(&layout);
        assert_eq!(
            verify_segment(&layout, &root, file.size(), segment.index, &aligned, &proof),
            Ok(())
        );
    }
}

#[test]
fn test_tampered_segment_rejected() {
    let file = FileHandle::from_bytes(pattern(3 * SEGMENT_SIZE));
    let root = file.root_hash().unwrap();
    let segment = file.read_segment(1).unwrap();
    let proof = file.proof_at(1).unwrap();

    let mut tampered = segment.data.to_vec();
    tampered[1234] ^= 0x01;
    assert_eq!(
        verify_segment(file.layout(), &root, file.size(), 1, &tampered, &proof),
        Err(MerkleError::ContentMismatch)
    );

    // a proof for another segment does not transfer
    let other = file.proof_at(2).unwrap();
    assert!(verify_segment(file.layout(), &root, file.size(), 1, &segment.data, &other).is_err());
}

#[test]
fn test_proof_out_of_range() {
    let file = FileHandle::from_bytes(pattern(100));
    assert!(matches!(
        file.proof_at(1),
        Err(PrimitivesError::Merkle(MerkleError::IndexOutOfRange { index: 1, leaves: 1 }))
    ));
}

#[test]
fn test_submission_power_of_two() {
    let file = FileHandle::from_bytes(pattern(4 * SEGMENT_SIZE));
    let submission = file.submission(vec![0xca, 0xfe]).unwrap();
    assert_eq!(submission.length, 4 * SEGMENT_SIZE as u64);
    assert_eq!(submission.tags.as_ref(), &[0xca, 0xfe]);
    assert_eq!(submission.nodes.len(), 1);
    assert_eq!(submission.nodes[0].height, 12);
    assert_eq!(submission.nodes[0].root, submission.root);
}

#[test]
fn test_submission_split() {
    let file = FileHandle::from_bytes(pattern(2 * SEGMENT_SIZE + 1000));
    let submission = file.submission(Vec::new()).unwrap();
    let heights: Vec<_> = submission.nodes.iter().map(|node| node.height).collect();
    assert_eq!(heights, vec![11, 8]);
    assert_eq!(submission.sectors(), 2304);

    // the first node covers the two full segments
    let tree = file.merkle_tree().unwrap();
    let expected = crate::merkle::hash_pair(&tree.leaf(0).unwrap(), &tree.leaf(1).unwrap());
    assert_eq!(submission.nodes[0].root, expected);
    assert_eq!(submission.nodes[1].root, tree.leaf(2).unwrap());
}

#[test]
fn test_segment_width_does_not_change_root() {
    // grouping chunks into any power-of-two width reproduces the same upper levels
    let data = pattern(5000);
    let layout = Layout::new(CHUNK_SIZE, 4).unwrap();
    let narrow = FileHandle::open_with_layout(std::io::Cursor::new(data.clone()), layout).unwrap();
    let standard = FileHandle::from_bytes(data.clone());
    assert_eq!(narrow.num_segments(), 5);
    assert_eq!(narrow.root_hash().unwrap(), standard.root_hash().unwrap());

    let wide_chunks = Layout::new(2 * CHUNK_SIZE, 4).unwrap();
    let wide = FileHandle::open_with_layout(std::io::Cursor::new(data), wide_chunks).unwrap();
    assert_ne!(wide.root_hash().unwrap(), standard.root_hash().unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_root_is_deterministic(data in prop::collection::vec(any::<u8>(), 0..4 * CHUNK_SIZE)) {
        let first = FileHandle::from_bytes(data.clone()).root_hash().unwrap();
        let second = FileHandle::from_bytes(data).root_hash().unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_counts(len in 0usize..3 * SEGMENT_SIZE) {
        let file = FileHandle::from_bytes(vec![0u8; len]);
        prop_assert_eq!(file.num_chunks(), len.div_ceil(CHUNK_SIZE) as u64);
        prop_assert_eq!(file.num_segments(), file.num_chunks().div_ceil(1024));
        prop_assert_eq!(file.iterate_segments().count() as u64, file.num_segments());
    }
}
