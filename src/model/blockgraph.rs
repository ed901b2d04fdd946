use {
  crate::primitives::{Hash32, Pubkey},
  ed25519_dalek::{Signature, Verifier},
  serde::{Deserialize, Serialize},
};

/// A reference to a block at a specific point in the round sequence,
/// as carried by a [`BlockGraph`]'s `block` and `prev` fields.
///
/// `hash` identifies this entry for deduplication purposes and is
/// *not* necessarily equal to the hash of the decoded [`data`] — see
/// the co-signing step in the ingress algorithm, which mints a fresh
/// `hash` for the locally co-signed copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
  pub hash: Hash32,
  pub node: u64,
  pub round: u64,
  pub data: Vec<u8>,
}

/// A node's signed proposal that a given block belongs to round `r`.
///
/// Identity for deduplication purposes is `(block.hash, block.node,
/// block.round)` — see [`BlockGraph::identity`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockGraph {
  pub block: BlockRef,
  pub prev: BlockRef,
  pub public_key: Pubkey,
  pub signature: Signature,
  pub deps: Option<Vec<Hash32>>,
}

pub type BlockGraphIdentity = (Hash32, u64, u64);

impl BlockGraph {
  pub fn identity(&self) -> BlockGraphIdentity {
    (self.block.hash, self.block.node, self.block.round)
  }

  /// The domain-separated digest that co-signatures are produced
  /// over: `block.hash ∥ block.node ∥ block.round ∥ prev.hash ∥
  /// prev.round`.
  pub fn signing_digest(&self) -> Hash32 {
    let mut buf = Vec::with_capacity(32 + 8 + 8 + 32 + 8 + b"blockgraph".len());
    buf.extend_from_slice(b"blockgraph");
    buf.extend_from_slice(self.block.hash.as_bytes());
    buf.extend_from_slice(&self.block.node.to_be_bytes());
    buf.extend_from_slice(&self.block.round.to_be_bytes());
    buf.extend_from_slice(self.prev.hash.as_bytes());
    buf.extend_from_slice(&self.prev.round.to_be_bytes());
    Hash32::digest(&buf)
  }

  /// Verifies the co-signature against the embedded `public_key`.
  /// This is a pure signature check; it does not consult the
  /// `Validator` collaborator and does not imply the block itself is
  /// valid.
  pub fn verify_signature(&self) -> bool {
    match ed25519_dalek::PublicKey::try_from(&self.public_key) {
      Ok(pk) => pk
        .verify(self.signing_digest().as_bytes(), &self.signature)
        .is_ok(),
      Err(_) => false,
    }
  }

  /// Encodes this block-graph for the `ADD_BLOCK_GRAPH` gossip topic.
  /// MessagePack is used (rather than the `bincode` format used for
  /// on-disk persistence) because the wire format must tolerate
  /// schema evolution across node versions: fields are addressed by
  /// index, so appending a field to either end of this struct in a
  /// future version does not break older readers.
  pub fn encode(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec(self)
  }

  pub fn decode(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
    rmp_serde::from_slice(bytes)
  }
}
