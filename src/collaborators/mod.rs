//! Collaborator traits.
//!
//! The gossip transport, the block validator, the signing service and
//! the peer directory are external collaborators that the core
//! depends on but does not own. Each contract is an `async_trait`,
//! following the same pattern used for components that consume
//! finalized blocks elsewhere in this crate.
//!
//! `reference` ships one in-memory implementation of each, sufficient
//! to drive the validator loop end-to-end in a single process: for
//! tests, and for the binary's `--standalone` demo mode. None of them
//! are production-grade — there is no real transport behind
//! `LoggingBroadcaster`, and `PermissiveValidator` skips cryptographic
//! and PoS verification entirely.

mod reference;

pub use reference::{
  EmptyPeers, InMemorySigner, LoggingBroadcaster, PermissiveValidator,
};

use {
  crate::{model::BlockGraph, primitives::Pubkey},
  async_trait::async_trait,
  ed25519_dalek::Signature,
  std::collections::HashMap,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
  pub host: String,
  pub public_key: Pubkey,
  pub node_name: String,
}

/// Peer-set provider. Must exclude the local node from its result.
#[async_trait]
pub trait Peers: Send + Sync {
  async fn peers(&self) -> HashMap<u64, Peer>;
}

/// Best-effort fan-out. Returns once dispatch is scheduled; delivery
/// is not guaranteed and is not retried at this layer (§7).
#[async_trait]
pub trait Broadcaster: Send + Sync {
  async fn broadcast(&self, peers: &HashMap<u64, Peer>, topic: &str, payload: Vec<u8>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
  Succeed,
  AlreadyExists,
  UnableToVerify,
}

/// Cryptographic / PoS verification, kept as an external collaborator
/// per §1's Non-goals — the core only ever consumes its verdicts.
#[async_trait]
pub trait Validator: Send + Sync {
  async fn verify_block(&self, block: &crate::model::Block) -> VerifyOutcome;
  async fn block_exists(&self, block: &crate::model::Block) -> VerifyOutcome;
  async fn verify_blockgraph_sig_node_round(&self, bg: &BlockGraph) -> VerifyOutcome;
}

/// Key custody, keyed by a well-known name (mirrors `primitives::keys`'s
/// own base58 `Pubkey`/`Keypair` types).
#[async_trait]
pub trait Signer: Send + Sync {
  async fn get_or_upsert_key(&self, name: &str) -> Pubkey;
  async fn sign(&self, name: &str, digest: &[u8; 32]) -> Signature;
  async fn public_key(&self, name: &str) -> Option<Pubkey>;
}
