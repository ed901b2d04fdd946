//! BlockGraph Ingress.
//!
//! Single-writer async queue that receives candidate block-graphs
//! from peers and from the local block producer, deduplicates,
//! co-signs, persists and rebroadcasts them.
//!
//! The "single writer" guarantee is the channel's consumer loop, not
//! a lock: `submit` only ever enqueues, and a lone background task
//! drains the queue one item at a time.

use {
  crate::{
    chain::ChainStore,
    collaborators::{Broadcaster, Peer, Peers, Signer, Validator, VerifyOutcome},
    model::{Block, BlockGraph, BlockRef},
    primitives::{Hash32, ToBase58String},
    round::RoundOracle,
    seen_hash::SeenHashFilter,
  },
  serde::{Deserialize, Serialize},
  std::{collections::HashMap, sync::Arc},
  thiserror::Error,
  tokio::sync::mpsc,
};

pub const ADD_BLOCK_GRAPH_TOPIC: &str = "ADD_BLOCK_GRAPH";
const SIGNER_KEY_NAME: &str = "validator";

#[derive(Debug, Error)]
pub enum Error {
  #[error("ingress queue is closed")]
  QueueClosed(#[from] mpsc::error::SendError<BlockGraph>),

  #[error("malformed block-graph bytes: {0}")]
  Decode(#[from] rmp_serde::decode::Error),
}

/// The wire envelope rebroadcast over `ADD_BLOCK_GRAPH`. `block_height`
/// lets receiving peers gate replay by round without decoding the
/// full block-graph first (§4.1 "Rebroadcast").
#[derive(Serialize, Deserialize)]
struct GossipEnvelope {
  block_height: u64,
  block_graph: Vec<u8>,
}

pub struct BlockGraphIngress {
  tx: mpsc::Sender<BlockGraph>,
}

impl BlockGraphIngress {
  /// Spawns the consumer task and replays any block-graph already
  /// persisted for the current next-round (§4.1 "Replay on startup"):
  /// this restores Blockmania state after a crash without re-signing
  /// or re-broadcasting anything.
  pub async fn spawn(
    local_node_id: u64,
    chain: Arc<dyn ChainStore>,
    seen_hashes: Arc<SeenHashFilter>,
    rounds: Arc<RoundOracle>,
    validator: Arc<dyn Validator>,
    signer: Arc<dyn Signer>,
    peers: Arc<dyn Peers>,
    broadcaster: Arc<dyn Broadcaster>,
    completed_tx: mpsc::Sender<BlockGraph>,
  ) -> Self {
    let (tx, rx) = mpsc::channel(1024);

    let worker = Worker {
      local_node_id,
      chain,
      seen_hashes,
      rounds,
      validator,
      signer,
      peers,
      broadcaster,
      completed_tx,
    };
    worker.replay().await;
    tokio::spawn(worker.run(rx));

    Self { tx }
  }

  /// Enqueues `bg` for processing. Accepts proposals decoded from a
  /// gossip message as well as ones produced locally.
  pub async fn submit(&self, bg: BlockGraph) -> Result<(), Error> {
    self.tx.send(bg).await.map_err(Error::from)
  }

  /// Decodes a wire-format `BlockGraph` (§3, §6) and submits it.
  pub async fn submit_bytes(&self, bytes: &[u8]) -> Result<(), Error> {
    let bg = BlockGraph::decode(bytes)?;
    self.submit(bg).await
  }
}

struct Worker {
  local_node_id: u64,
  chain: Arc<dyn ChainStore>,
  seen_hashes: Arc<SeenHashFilter>,
  rounds: Arc<RoundOracle>,
  validator: Arc<dyn Validator>,
  signer: Arc<dyn Signer>,
  peers: Arc<dyn Peers>,
  broadcaster: Arc<dyn Broadcaster>,
  completed_tx: mpsc::Sender<BlockGraph>,
}

impl Worker {
  async fn replay(&self) {
    let next_round = match self.rounds.next_round().await {
      Ok(r) => r,
      Err(e) => {
        tracing::error!(error = %e, "replay: could not read next round");
        return;
      }
    };
    let pending = match self.chain.blockgraphs_where_round(next_round).await {
      Ok(p) => p,
      Err(e) => {
        tracing::error!(error = %e, "replay: could not load pending block-graphs");
        return;
      }
    };
    for bg in pending {
      if self.completed_tx.send(bg).await.is_err() {
        tracing::warn!("replay: coordinator channel closed");
        return;
      }
    }
  }

  async fn run(mut self, mut rx: mpsc::Receiver<BlockGraph>) {
    while let Some(bg) = rx.recv().await {
      if let Err(e) = self.process(bg).await {
        tracing::error!(error = %e, "ingress: failed to process block-graph");
      }
    }
  }

  async fn process(&mut self, bg: BlockGraph) -> Result<(), crate::chain::Error> {
    let block = match Block::decode(&bg.block.data) {
      Ok(b) => b,
      Err(e) => {
        tracing::warn!(error = %e, "dropping block-graph: inner block does not decode");
        return Ok(());
      }
    };

    if self.seen_hashes.contains(&block.hash) {
      self.chain.remove_delivered(block.hash).await?;
      self.chain.remove_blockgraph(bg.identity()).await?;
      return Ok(());
    }

    let next_round = self.rounds.next_round().await?;
    let lookup = (bg.block.hash, bg.block.node, next_round);
    match self.chain.get_blockgraph(lookup).await? {
      Some(saved) => {
        // The round conjunct can never be true here because `lookup`
        // already constrains on `next_round`; this branch is
        // effectively dead code, but the comparison is kept as-is
        // rather than simplified away.
        if saved.public_key != block.block_pos.public_key && saved.block.round != next_round {
          self.finalize(bg, block, next_round).await?;
        }
        // otherwise: duplicate, drop silently.
      }
      None => {
        if bg.block.round == next_round {
          self.finalize(bg, block, next_round).await?;
        }
      }
    }
    Ok(())
  }

  async fn finalize(
    &mut self,
    bg: BlockGraph,
    block: Block,
    next_round: u64,
  ) -> Result<(), crate::chain::Error> {
    let copy = bg.block.node != self.local_node_id;

    if copy {
      if self.validator.verify_blockgraph_sig_node_round(&bg).await != VerifyOutcome::Succeed {
        tracing::warn!(
          node = bg.block.node,
          public_key = %bg.public_key.as_bytes().to_b58(),
          signature = %bg.signature.to_b58(),
          "dropping block-graph: signature/node/round verification failed"
        );
        return Ok(());
      }
      self.chain.put_blockgraph(&bg).await?;

      // The co-signed copy's round is set to the inner block's
      // height, and its hash is a fresh digest of the height bytes
      // rather than of the block body.
      let copied = BlockGraph {
        block: BlockRef {
          hash: Hash32::digest(&block.height.to_be_bytes()),
          node: self.local_node_id,
          round: block.height,
          data: bg.block.data.clone(),
        },
        prev: bg.prev.clone(),
        public_key: self.signer.get_or_upsert_key(SIGNER_KEY_NAME).await,
        signature: ed25519_dalek::Signature::from_bytes(&[0; 64]).expect("valid placeholder"),
        deps: bg.deps.clone(),
      };
      let signed = self.sign(copied).await;
      self.chain.put_blockgraph(&signed).await?;
      self.rebroadcast(&signed).await;
      self.fire(bg).await;
    } else {
      let identity = bg.identity();
      if self.chain.get_blockgraph(identity).await?.is_some() {
        self.fire(bg).await;
        return Ok(());
      }
      let signed = self.sign(bg).await;
      self.chain.put_blockgraph(&signed).await?;
      self.rebroadcast(&signed).await;
      self.fire(signed).await;
    }
    Ok(())
  }

  async fn sign(&self, mut bg: BlockGraph) -> BlockGraph {
    bg.public_key = self.signer.get_or_upsert_key(SIGNER_KEY_NAME).await;
    bg.signature = self
      .signer
      .sign(SIGNER_KEY_NAME, bg.signing_digest().as_bytes())
      .await;
    bg
  }

  async fn rebroadcast(&self, bg: &BlockGraph) {
    let peers: HashMap<u64, Peer> = self.peers.peers().await;
    let envelope = GossipEnvelope {
      block_height: bg.block.round,
      block_graph: match bg.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
          tracing::error!(error = %e, "could not encode block-graph for broadcast");
          return;
        }
      },
    };
    let payload = match rmp_serde::to_vec(&envelope) {
      Ok(bytes) => bytes,
      Err(e) => {
        tracing::error!(error = %e, "could not encode gossip envelope");
        return;
      }
    };
    self
      .broadcaster
      .broadcast(&peers, ADD_BLOCK_GRAPH_TOPIC, payload)
      .await;
  }

  async fn fire(&self, bg: BlockGraph) {
    if self.completed_tx.send(bg).await.is_err() {
      tracing::warn!("coordinator channel closed; dropping block-graph-complete event");
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    chain::RocksChainStore,
    collaborators::{EmptyPeers, InMemorySigner, LoggingBroadcaster, PermissiveValidator},
    model::BlockPos,
    primitives::Keypair,
  };

  async fn harness(
    local_node_id: u64,
  ) -> (BlockGraphIngress, mpsc::Receiver<BlockGraph>, Arc<dyn ChainStore>) {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
      "ledger-core-ingress-test-{}",
      Hash32::digest(&rand::random::<[u8; 32]>())
    ));
    let chain: Arc<dyn ChainStore> = Arc::new(RocksChainStore::new(dir).unwrap());
    let seen_hashes = Arc::new(SeenHashFilter::new());
    let rounds = Arc::new(RoundOracle::new(Arc::clone(&chain)));
    let (completed_tx, completed_rx) = mpsc::channel(64);

    let ingress = BlockGraphIngress::spawn(
      local_node_id,
      Arc::clone(&chain),
      seen_hashes,
      rounds,
      Arc::new(PermissiveValidator),
      Arc::new(InMemorySigner::new()),
      Arc::new(EmptyPeers),
      Arc::new(LoggingBroadcaster),
      completed_tx,
    )
    .await;

    (ingress, completed_rx, chain)
  }

  fn block_graph(node: u64, round: u64, inner: &Block) -> BlockGraph {
    let kp = Keypair::generate();
    let mut bg = BlockGraph {
      block: BlockRef {
        hash: inner.hash,
        node,
        round,
        data: inner.encode(),
      },
      prev: BlockRef {
        hash: Hash32::ZERO,
        node,
        round: round.saturating_sub(1),
        data: vec![],
      },
      public_key: kp.public(),
      signature: kp.sign(&[0; 32]),
      deps: None,
    };
    bg.signature = kp.sign(bg.signing_digest().as_bytes());
    bg
  }

  fn sample_block(height: u64) -> Block {
    let pos = BlockPos {
      public_key: Keypair::generate().public(),
      solution: 1,
    };
    Block::new(height, Hash32::ZERO, vec![], pos)
  }

  #[tokio::test]
  async fn self_proposal_is_persisted_and_completed() {
    let (ingress, mut completed, chain) = harness(42).await;
    let block = sample_block(1);
    let bg = block_graph(42, 1, &block);
    ingress.submit(bg.clone()).await.unwrap();

    let delivered = completed.recv().await.expect("completed event");
    assert_eq!(delivered.identity(), bg.identity());
    assert!(chain.get_blockgraph(bg.identity()).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn duplicate_submission_persists_once() {
    let (ingress, mut completed, chain) = harness(7).await;
    let block = sample_block(1);
    let bg = block_graph(7, 1, &block);
    ingress.submit(bg.clone()).await.unwrap();
    completed.recv().await.unwrap();

    // The re-submission matches an already-persisted identity at
    // `next_round`, so it is dropped as a duplicate and never reaches
    // the completed-event channel.
    ingress.submit(bg.clone()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(completed.try_recv().is_err());

    let stored = chain.blockgraphs_where_round(1).await.unwrap();
    assert_eq!(stored.len(), 1);
  }

  #[tokio::test]
  async fn seen_hash_short_circuits_replay() {
    let (ingress, _completed, chain) = harness(1).await;
    let block = sample_block(5);
    let bg = block_graph(1, 0, &block);
    chain.put_blockgraph(&bg).await.unwrap();

    let seen_hashes = Arc::new(SeenHashFilter::new());
    seen_hashes.add(block.hash);
    // simulate an already-seen submission by re-deriving the worker
    // behaviour through a second ingress sharing the seeded filter.
    let rounds = Arc::new(RoundOracle::new(Arc::clone(&chain)));
    let (tx2, _rx2) = mpsc::channel(8);
    let guarded = BlockGraphIngress::spawn(
      1,
      Arc::clone(&chain),
      Arc::clone(&seen_hashes),
      rounds,
      Arc::new(PermissiveValidator),
      Arc::new(InMemorySigner::new()),
      Arc::new(EmptyPeers),
      Arc::new(LoggingBroadcaster),
      tx2,
    )
    .await;
    drop(ingress);
    guarded.submit(bg.clone()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(chain.get_blockgraph(bg.identity()).await.unwrap().is_none());
  }
}
