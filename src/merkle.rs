//! Combined Merkle tree over one node's local leaf and its children's sub-roots.
//!
//! Leaves are sorted before the tree is built and interior nodes hash their two children in
//! sorted order, so a [`Proof`] is just the list of sibling hashes from the leaf upwards. A
//! node without a sibling on its level is promoted unchanged.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::tree::NodeId;

pub type Hash = [u8; 32];

const LEAF_TAG: u8 = 0x00;
const NODE_TAG: u8 = 0x01;

pub fn leaf_hash(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_TAG]);
    hasher.update(data);
    hasher.finalize().into()
}

pub fn hash_pair(a: &Hash, b: &Hash) -> Hash {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update([NODE_TAG]);
    hasher.update(lo);
    hasher.update(hi);
    hasher.finalize().into()
}

/// Sibling hashes from a leaf up to a root, lowest level first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(pub Vec<Hash>);

impl Proof {
    pub fn root_from(&self, leaf: &Hash) -> Hash {
        self.0
            .iter()
            .fold(*leaf, |acc, sibling| hash_pair(&acc, sibling))
    }

    pub fn verify(&self, leaf: &Hash, root: &Hash) -> bool {
        &self.root_from(leaf) == root
    }

    /// Continue this proof with the proof of its root in a larger tree.
    pub fn extended(&self, upper: &Proof) -> Proof {
        let mut hashes = self.0.clone();
        hashes.extend_from_slice(&upper.0);
        Proof(hashes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Who contributed a leaf to a node's combined tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LeafOwner {
    /// The node's own payload source.
    Local,
    Child(NodeId),
}

/// Root over `leaves` in the given order and one proof per leaf, in the same order.
///
/// Callers wanting an order-independent root sort the leaves first.
pub fn build_proofs(leaves: &[Hash]) -> (Hash, Vec<Proof>) {
    if leaves.is_empty() {
        return (leaf_hash(&[]), vec![]);
    }
    let mut level = leaves.to_vec();
    let mut positions: Vec<usize> = (0..leaves.len()).collect();
    let mut paths: Vec<Vec<Hash>> = vec![vec![]; leaves.len()];

    while level.len() > 1 {
        for (position, path) in positions.iter_mut().zip(paths.iter_mut()) {
            let sibling = *position ^ 1;
            if sibling < level.len() {
                path.push(level[sibling]);
            }
            *position /= 2;
        }
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => hash_pair(a, b),
                [a] => *a,
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect();
    }

    (level[0], paths.into_iter().map(Proof).collect())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CombinedTree {
    root: Hash,
    leaves: BTreeMap<LeafOwner, Hash>,
    proofs: BTreeMap<LeafOwner, Proof>,
}

impl CombinedTree {
    /// Build the tree and one proof per leaf. An empty leaf set has the hash of nothing as
    /// its root.
    pub fn build(leaves: impl IntoIterator<Item = (LeafOwner, Hash)>) -> Self {
        let leaves: BTreeMap<LeafOwner, Hash> = leaves.into_iter().collect();
        let mut sorted: Vec<(Hash, LeafOwner)> =
            leaves.iter().map(|(owner, hash)| (*hash, *owner)).collect();
        sorted.sort();

        let hashes: Vec<Hash> = sorted.iter().map(|(hash, _)| *hash).collect();
        let (root, paths) = build_proofs(&hashes);

        let proofs = sorted
            .iter()
            .zip(paths)
            .map(|((_, owner), proof)| (*owner, proof))
            .collect();

        CombinedTree {
            root,
            leaves,
            proofs,
        }
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn leaf(&self, owner: &LeafOwner) -> Option<&Hash> {
        self.leaves.get(owner)
    }

    pub fn proof_for(&self, owner: &LeafOwner) -> Option<&Proof> {
        self.proofs.get(owner)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn child(id: u32) -> LeafOwner {
        LeafOwner::Child(NodeId(id))
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let leaf = leaf_hash(b"only");
        let tree = CombinedTree::build([(LeafOwner::Local, leaf)]);
        assert_eq!(tree.root(), leaf);
        let proof = tree.proof_for(&LeafOwner::Local).unwrap();
        assert!(proof.is_empty());
        assert!(proof.verify(&leaf, &tree.root()));
    }

    #[test]
    fn odd_leaf_is_promoted() {
        let leaves = [
            (LeafOwner::Local, leaf_hash(b"a")),
            (child(1), leaf_hash(b"b")),
            (child(2), leaf_hash(b"c")),
        ];
        let tree = CombinedTree::build(leaves);
        for (owner, leaf) in leaves {
            assert!(tree.proof_for(&owner).unwrap().verify(&leaf, &tree.root()));
        }
        let depths: Vec<usize> = leaves
            .iter()
            .map(|(owner, _)| tree.proof_for(owner).unwrap().len())
            .collect();
        assert!(depths.contains(&1));
        assert!(depths.contains(&2));
    }

    #[test]
    fn order_of_insertion_does_not_matter() {
        let a = (LeafOwner::Local, leaf_hash(b"a"));
        let b = (child(3), leaf_hash(b"b"));
        let c = (child(4), leaf_hash(b"c"));
        assert_eq!(
            CombinedTree::build([a, b, c]).root(),
            CombinedTree::build([c, a, b]).root()
        );
    }

    #[test]
    fn proofs_compose_across_levels() {
        let lower = CombinedTree::build([
            (LeafOwner::Local, leaf_hash(b"lower-local")),
            (child(9), leaf_hash(b"grandchild")),
        ]);
        let upper = CombinedTree::build([
            (LeafOwner::Local, leaf_hash(b"upper-local")),
            (child(5), lower.root()),
        ]);
        let full = lower
            .proof_for(&LeafOwner::Local)
            .unwrap()
            .extended(upper.proof_for(&child(5)).unwrap());
        assert!(full.verify(&leaf_hash(b"lower-local"), &upper.root()));
        assert!(!full.verify(&leaf_hash(b"grandchild"), &upper.root()));
    }
}
