//! Tests for tree construction, proofs and segment roots.

use super::*;
use alloy_primitives::{B256, hex, keccak256};
use proptest::prelude::*;

fn leaves(count: usize) -> Vec<Vec<u8>> {
    (0..count).map(|i| format!("leaf-{i}").into_bytes()).collect()
}

fn tree_of(contents: &[Vec<u8>]) -> MerkleTree {
    let mut builder = MerkleTree::builder();
    for content in contents {
        builder.add_leaf(content);
    }
    builder.build()
}

#[test]
fn test_empty_chunk_hash() {
    assert_eq!(EMPTY_CHUNK_HASH, keccak256([0u8; 256]));
    let expected =
        hex::decode("d397b3b043d87fcd6fad1291ff0bfd16401c274896d8c63a923727f077b8e0b5").unwrap();
    assert_eq!(EMPTY_CHUNK_HASH, B256::from_slice(&expected));
}

#[test]
fn test_empty_tree() {
    let tree = MerkleTree::builder().build();
    assert!(tree.is_empty());
    assert_eq!(tree.root(), ZERO_HASH);
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.proof_at(0), Err(MerkleError::index_out_of_range(0, 0)));
}

#[test]
fn test_single_leaf() {
    let tree = tree_of(&leaves(1));
    let leaf = keccak256(b"leaf-0");
    assert_eq!(tree.root(), leaf);
    assert_eq!(tree.height(), 0);

    let proof = tree.proof_at(0).unwrap();
    assert_eq!(proof, Proof::new(vec![leaf], vec![]));
    assert!(MerkleTree::verify(&tree.root(), b"leaf-0", 0, 1, &proof));
}

#[test]
fn test_pairs_hash_left_then_right() {
    let tree = tree_of(&leaves(2));
    let (a, b) = (keccak256(b"leaf-0"), keccak256(b"leaf-1"));
    assert_eq!(tree.root(), hash_pair(&a, &b));
    assert_ne!(tree.root(), hash_pair(&b, &a));
}

#[test]
fn test_odd_node_is_promoted() {
    let tree = tree_of(&leaves(3));
    let [a, b, c] = [0, 1, 2].map(|i| keccak256(format!("leaf-{i}")));
    let ab = hash_pair(&a, &b);
    assert_eq!(tree.root(), hash_pair(&ab, &c));
    assert_eq!(tree.height(), 2);

    let proof = tree.proof_at(2).unwrap();
    assert_eq!(proof.lemma, vec![c, ab, tree.root()]);
    assert_eq!(proof.path, vec![false]);
    assert_eq!(proof.position(3), Some(2));
}

#[test]
fn test_five_leaves_shape() {
    // [ab, cd, e] -> [abcd, e] -> root
    let contents = leaves(5);
    let tree = tree_of(&contents);
    let h: Vec<B256> = contents.iter().map(keccak256).collect();
    let abcd = hash_pair(&hash_pair(&h[0], &h[1]), &hash_pair(&h[2], &h[3]));
    assert_eq!(tree.root(), hash_pair(&abcd, &h[4]));
}

#[test]
fn test_every_proof_verifies() {
    for count in 1..=33 {
        let contents = leaves(count);
        let tree = tree_of(&contents);
        for (index, content) in contents.iter().enumerate() {
            let proof = tree.proof_at(index).unwrap();
            assert_eq!(
                proof.validate(&tree.root(), content, index, count),
                Ok(()),
                "leaf {index} of {count}"
            );
        }
    }
}

#[test]
fn test_wrong_position_rejected() {
    let contents = leaves(8);
    let tree = tree_of(&contents);
    let proof = tree.proof_at(3).unwrap();
    assert!(matches!(
        proof.validate(&tree.root(), &contents[3], 4, 8),
        Err(MerkleError::PositionMismatch { expected: 4, actual: 3 })
    ));
}

#[test]
fn test_reordered_siblings_rejected() {
    let contents = leaves(8);
    let tree = tree_of(&contents);
    let mut proof = tree.proof_at(5).unwrap();
    proof.lemma.swap(1, 2);
    assert_eq!(
        proof.validate(&tree.root(), &contents[5], 5, 8),
        Err(MerkleError::ValidationFailure)
    );
    assert!(!MerkleTree::verify(&tree.root(), &contents[5], 5, 8, &proof));
}

#[test]
fn test_flipped_path_rejected() {
    let contents = leaves(4);
    let tree = tree_of(&contents);
    let mut proof = tree.proof_at(0).unwrap();
    proof.path[0] = !proof.path[0];
    assert!(!MerkleTree::verify(&tree.root(), &contents[0], 0, 4, &proof));
}

#[test]
fn test_truncated_proof_rejected() {
    let contents = leaves(8);
    let tree = tree_of(&contents);
    let mut proof = tree.proof_at(2).unwrap();

    proof.path.pop();
    assert!(matches!(
        proof.validate(&tree.root(), &contents[2], 2, 8),
        Err(MerkleError::WrongFormat { .. })
    ));

    // shorten consistently: well formed but too shallow for eight leaves
    proof.lemma.remove(proof.lemma.len() - 2);
    assert!(matches!(
        proof.validate(&tree.root(), &contents[2], 2, 8),
        Err(MerkleError::DepthMismatch { expected: 3, actual: 2 })
    ));
}

#[test]
fn test_wrong_root_and_content_rejected() {
    let contents = leaves(4);
    let tree = tree_of(&contents);
    let proof = tree.proof_at(1).unwrap();
    assert_eq!(
        proof.validate(&B256::repeat_byte(1), &contents[1], 1, 4),
        Err(MerkleError::RootMismatch)
    );
    assert_eq!(
        proof.validate(&tree.root(), b"leaf-x", 1, 4),
        Err(MerkleError::ContentMismatch)
    );
    assert!(!MerkleTree::verify(&tree.root(), &contents[1], 4, 4, &proof));
    assert!(!MerkleTree::verify(&tree.root(), &contents[1], 1, 0, &proof));
}

#[test]
fn test_malformed_proofs_fail_closed() {
    let root = keccak256(b"leaf-0");
    assert!(!MerkleTree::verify(&root, b"leaf-0", 0, 1, &Proof::default()));
    let oversized = Proof::new(vec![root, root], vec![]);
    assert!(!MerkleTree::verify(&root, b"leaf-0", 0, 1, &oversized));
    assert!(!Proof::default().validate_root());
    assert_eq!(Proof::default().position(4), Some(0));
    assert_eq!(Proof::new(vec![], vec![true, true, true]).position(4), None);
}

#[test]
fn test_segment_root_padding() {
    assert_eq!(segment_root(&[], 0), ZERO_HASH);
    assert_eq!(segment_root(&[0u8; 256], 0), EMPTY_CHUNK_HASH);

    // a short trailing chunk hashes as if zero-filled
    let data = vec![0xabu8; 300];
    let mut filled = data.clone();
    filled.resize(512, 0);
    assert_eq!(segment_root(&data, 0), segment_root(&filled, 0));

    // explicit empty chunks equal materialized zeros
    filled.resize(512 + 3 * 256, 0);
    assert_eq!(segment_root(&data, 3), segment_root(&filled, 0));
}

#[test]
fn test_segment_root_custom_chunk_size() {
    let data = vec![1u8; 128];
    let expected = hash_pair(&keccak256([1u8; 64]), &keccak256([1u8; 64]));
    assert_eq!(segment_root_with_chunk_size(&data, 0, 64), expected);
}

proptest! {
    #[test]
    fn prop_root_is_deterministic(
        contents in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..40),
    ) {
        prop_assert_eq!(tree_of(&contents).root(), tree_of(&contents).root());
    }

    #[test]
    fn prop_proof_soundness(
        contents in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..64),
        pick in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let tree = tree_of(&contents);
        let count = contents.len();
        let index = pick.index(count);
        let proof = tree.proof_at(index).unwrap();
        prop_assert!(MerkleTree::verify(&tree.root(), &contents[index], index, count, &proof));

        let mut mutated = contents[index].clone();
        mutated[0] ^= 1 << bit;
        prop_assert!(!MerkleTree::verify(&tree.root(), &mutated, index, count, &proof));
    }
}
