use {
  crate::primitives::{Hash32, Pubkey},
  serde::{Deserialize, Serialize},
  std::fmt::Display,
};

/// A single entry in a block's transaction list.
///
/// The transaction-processing runtime that would interpret `data` is
/// an external collaborator (the mempool/VM); the consensus core only
/// ever needs a transaction's identifier to answer `get_transaction`
/// lookups and to detect duplicate content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
  pub txn_id: [u8; 32],
  pub data: Vec<u8>,
}

/// The proof-of-stake witness carried by every block: who proposed it
/// and the PoS solution they produced for this height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPos {
  pub public_key: Pubkey,
  pub solution: u64,
}

/// The replicated chain unit.
///
/// `hash` is always `Hash32::digest` of the canonical encoding of
/// every other field (see [`Block::compute_hash`]); nothing in this
/// crate ever trusts a `hash` field it did not compute itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
  pub height: u64,
  pub hash: Hash32,
  pub previous_hash: Hash32,
  pub txs: Vec<Transaction>,
  pub block_pos: BlockPos,
}

impl Block {
  /// Builds and hashes a new block. This is the only constructor:
  /// there is no way to get a `Block` whose `hash` does not match its
  /// body.
  pub fn new(
    height: u64,
    previous_hash: Hash32,
    txs: Vec<Transaction>,
    block_pos: BlockPos,
  ) -> Self {
    let mut block = Self {
      height,
      hash: Hash32::ZERO,
      previous_hash,
      txs,
      block_pos,
    };
    block.hash = block.compute_hash();
    block
  }

  /// Recomputes the content hash of this block's body, ignoring
  /// whatever is currently stored in `self.hash`.
  pub fn compute_hash(&self) -> Hash32 {
    let body = BlockBody {
      height: self.height,
      previous_hash: self.previous_hash,
      txs: &self.txs,
      block_pos: self.block_pos,
    };
    Hash32::digest(&bincode::serialize(&body).expect("block body serializes"))
  }

  /// True if `self.hash` is consistent with the rest of the block's
  /// fields. The ingress and finalizer both rely on this before
  /// trusting a deserialized block.
  pub fn is_hash_valid(&self) -> bool {
    self.hash == self.compute_hash()
  }

  pub fn encode(&self) -> Vec<u8> {
    bincode::serialize(self).expect("block serializes")
  }

  pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
    bincode::deserialize(bytes)
  }
}

impl Display for Block {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "block({}, height={})", self.hash, self.height)
  }
}

#[derive(Serialize)]
struct BlockBody<'a> {
  height: u64,
  previous_hash: Hash32,
  txs: &'a [Transaction],
  block_pos: BlockPos,
}

#[cfg(test)]
mod test {
  use super::*;

  fn pos() -> BlockPos {
    BlockPos {
      public_key: crate::primitives::Keypair::generate().public(),
      solution: 42,
    }
  }

  #[test]
  fn new_block_hash_is_valid() {
    let block = Block::new(1, Hash32::ZERO, vec![], pos());
    assert!(block.is_hash_valid());
  }

  #[test]
  fn tampering_invalidates_hash() {
    let mut block = Block::new(1, Hash32::ZERO, vec![], pos());
    block.height = 2;
    assert!(!block.is_hash_valid());
  }

  #[test]
  fn encode_decode_roundtrip() {
    let block = Block::new(7, Hash32::digest(b"parent"), vec![], pos());
    let decoded = Block::decode(&block.encode()).unwrap();
    assert_eq!(block, decoded);
  }
}
