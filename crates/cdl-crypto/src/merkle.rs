use cdl_types::Digest;
use serde::{Deserialize, Serialize};

use crate::hasher::ContentHasher;

/// Side of a sibling in a Merkle proof path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Binary Merkle tree over a block's document content hashes.
///
/// Leaves are hashed pairwise bottom-up. A level with odd cardinality
/// duplicates its last element. The root is order-sensitive: permuting the
/// leaves changes it.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    root: Digest,
    leaves: Vec<Digest>,
    /// Level 0 = leaves, last level = `[root]`.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a Merkle tree from leaf digests.
    ///
    /// An empty list produces the hash of the empty string. A single leaf is
    /// its own root.
    pub fn from_leaves(leaves: Vec<Digest>) -> Self {
        if leaves.is_empty() {
            return Self {
                root: empty_root(),
                leaves: vec![],
                levels: vec![],
            };
        }

        let mut levels: Vec<Vec<Digest>> = vec![leaves.clone()];
        let mut current = leaves.clone();

        while current.len() > 1 {
            let next: Vec<Digest> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [odd] => hash_pair(odd, odd),
                    _ => unreachable!("chunks(2) yields one or two elements"),
                })
                .collect();
            levels.push(next.clone());
            current = next;
        }

        Self {
            root: current[0],
            leaves,
            levels,
        }
    }

    pub fn root(&self) -> Digest {
        self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaves.len() || self.levels.is_empty() {
            return None;
        }

        let mut path = Vec::new();
        let mut idx = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            let sibling = level.get(sibling_idx).copied().unwrap_or(level[idx]);
            let side = if idx % 2 == 0 { Side::Right } else { Side::Left };
            path.push((sibling, side));
            idx /= 2;
        }

        Some(MerkleProof {
            leaf: self.leaves[index],
            path,
            root: self.root,
        })
    }
}

/// Merkle root of a list of digests.
pub fn merkle_root(digests: &[Digest]) -> Digest {
    MerkleTree::from_leaves(digests.to_vec()).root()
}

/// Merkle inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: Digest,
    /// Path of (sibling_hash, sibling_side) pairs from leaf to root.
    pub path: Vec<(Digest, Side)>,
    pub root: Digest,
}

impl MerkleProof {
    /// Recompute the root from the leaf and path and compare.
    pub fn verify(&self) -> bool {
        let mut current = self.leaf;
        for (sibling, side) in &self.path {
            current = match side {
                Side::Left => hash_pair(sibling, &current),
                Side::Right => hash_pair(&current, sibling),
            };
        }
        current == self.root
    }
}

fn empty_root() -> Digest {
    ContentHasher::MERKLE.hash(b"")
}

fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = ContentHasher::MERKLE.start();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Digest::from_hash(*hasher.finalize().as_bytes())
}
