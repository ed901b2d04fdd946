use {
  super::{Peer, Peers, Validator, VerifyOutcome},
  crate::{
    model::{Block, BlockGraph},
    primitives::{Keypair, Pubkey},
  },
  async_trait::async_trait,
  dashmap::DashMap,
  ed25519_dalek::Signature,
  std::collections::HashMap,
};

/// Peer provider with no peers. Exercises the "no peers" logging path
/// noted in the single-node scenario (§8 scenario 1).
#[derive(Default)]
pub struct EmptyPeers;

#[async_trait]
impl Peers for EmptyPeers {
  async fn peers(&self) -> HashMap<u64, Peer> {
    HashMap::new()
  }
}

/// Logs and drops every broadcast instead of dispatching over a real
/// transport — there is no gossip layer in this crate (§1 Non-goals).
#[derive(Default)]
pub struct LoggingBroadcaster;

#[async_trait]
impl super::Broadcaster for LoggingBroadcaster {
  async fn broadcast(
    &self,
    peers: &HashMap<u64, Peer>,
    topic: &str,
    payload: Vec<u8>,
  ) {
    if peers.is_empty() {
      tracing::info!(topic, bytes = payload.len(), "no peers to broadcast to");
      return;
    }
    tracing::debug!(
      topic,
      bytes = payload.len(),
      peers = peers.len(),
      "broadcasting"
    );
  }
}

/// Accepts any syntactically-decodable block or block-graph. Real
/// cryptographic and PoS verification is an external collaborator per
/// §1 Non-goals; this stub exists so the core's control flow runs
/// against something.
#[derive(Default)]
pub struct PermissiveValidator;

#[async_trait]
impl Validator for PermissiveValidator {
  async fn verify_block(&self, block: &Block) -> VerifyOutcome {
    if block.is_hash_valid() {
      VerifyOutcome::Succeed
    } else {
      VerifyOutcome::UnableToVerify
    }
  }

  async fn block_exists(&self, _block: &Block) -> VerifyOutcome {
    VerifyOutcome::Succeed
  }

  async fn verify_blockgraph_sig_node_round(&self, bg: &BlockGraph) -> VerifyOutcome {
    if bg.verify_signature() {
      VerifyOutcome::Succeed
    } else {
      VerifyOutcome::UnableToVerify
    }
  }
}

/// `ed25519-dalek`-backed signer keyed by a well-known name, mirroring
/// `primitives::keys::Keypair`. Keys are lazily generated the first
/// time `get_or_upsert_key` sees a given name.
#[derive(Default)]
pub struct InMemorySigner {
  keys: DashMap<String, Keypair>,
}

impl InMemorySigner {
  pub fn new() -> Self {
    Self::default()
  }

  fn key_for(&self, name: &str) -> Keypair {
    self
      .keys
      .entry(name.to_owned())
      .or_insert_with(Keypair::generate)
      .clone()
  }
}

#[async_trait]
impl super::Signer for InMemorySigner {
  async fn get_or_upsert_key(&self, name: &str) -> Pubkey {
    self.key_for(name).public()
  }

  async fn sign(&self, name: &str, digest: &[u8; 32]) -> Signature {
    self.key_for(name).sign(digest)
  }

  async fn public_key(&self, name: &str) -> Option<Pubkey> {
    self.keys.get(name).map(|k| k.public())
  }
}
