//! The consensus core's own exposed interface (§6): a handle type that
//! owns C1-C6 (plus the C7/C8 collaborators and stand-in) and wires
//! them into the control flow described in §2:
//!
//! ```text
//! peer -> C4 -> Chain Store (scratch) + rebroadcast
//!            -> C5 (debounce+quorum) -> Blockmania -> C6 -> Chain Store (finalized)
//! ```

use {
  crate::{
    chain::{ChainStore, RocksChainStore},
    collaborators::{Broadcaster, Peers, Signer, Validator},
    coordinator::Coordinator,
    finalizer::Finalizer,
    ingress::BlockGraphIngress,
    model::{Block, BlockGraph, Transaction},
    round::RoundOracle,
    seen_hash::SeenHashFilter,
  },
  std::{path::Path, sync::Arc},
  tokio::sync::mpsc,
  tokio_util::sync::CancellationToken,
};

pub const SAFEGUARD_WINDOW: u64 = 147;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
  Succeed,
  AlreadyExists,
  Invalid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExistsOutcome {
  AlreadyExists,
  Succeed,
}

pub struct ConsensusCore {
  chain: Arc<dyn ChainStore>,
  ingress: BlockGraphIngress,
}

impl ConsensusCore {
  /// Opens the Chain Store at `data_dir` and wires C2-C6 together,
  /// spawning the coordinator, the finalizer and the seen-hash flush
  /// ticker as background tasks bound to `token`.
  #[allow(clippy::too_many_arguments)]
  pub async fn spawn(
    local_node_id: u64,
    data_dir: impl AsRef<Path>,
    validator: Arc<dyn Validator>,
    signer: Arc<dyn Signer>,
    peers: Arc<dyn Peers>,
    broadcaster: Arc<dyn Broadcaster>,
    token: CancellationToken,
  ) -> Result<Self, crate::chain::Error> {
    let chain: Arc<dyn ChainStore> = Arc::new(RocksChainStore::new(data_dir)?);
    let seen_hashes = Arc::new(SeenHashFilter::new());
    let rounds = Arc::new(RoundOracle::new(Arc::clone(&chain)));

    tokio::spawn(Arc::clone(&seen_hashes).run_flush_ticker(token.clone()));

    let (completed_tx, completed_rx) = mpsc::channel(1024);
    let (delivered_tx, delivered_rx) = mpsc::channel(1024);

    let ingress = BlockGraphIngress::spawn(
      local_node_id,
      Arc::clone(&chain),
      Arc::clone(&seen_hashes),
      Arc::clone(&rounds),
      Arc::clone(&validator),
      signer,
      peers,
      broadcaster,
      completed_tx,
    )
    .await;

    Coordinator::spawn(
      local_node_id,
      Arc::clone(&chain),
      Arc::clone(&rounds),
      completed_rx,
      delivered_tx,
      token.clone(),
    );

    Arc::new(Finalizer::new(
      Arc::clone(&chain),
      seen_hashes,
      rounds,
      validator,
    ))
    .spawn(delivered_rx, token);

    Ok(Self { chain, ingress })
  }

  pub async fn get_block(&self, height: u64) -> Option<Block> {
    self.chain.get_by_height(height).await.unwrap_or(None)
  }

  pub async fn get_blocks(&self, skip: u64, take: u64) -> Vec<Block> {
    self.chain.order_by_height(skip, take).await.unwrap_or_default()
  }

  /// The last [`SAFEGUARD_WINDOW`] blocks, clamped at 0.
  pub async fn get_safeguard_blocks(&self) -> Vec<Block> {
    let height = self.get_height().await;
    let skip = height.saturating_sub(SAFEGUARD_WINDOW);
    let take = height.min(SAFEGUARD_WINDOW);
    self.get_blocks(skip, take).await
  }

  pub async fn get_height(&self) -> u64 {
    self.chain.count().await.unwrap_or(0)
  }

  /// `height == 0` means "latest".
  pub async fn get_hash(&self, height: u64) -> Option<(u64, crate::primitives::Hash32)> {
    let chain_height = self.get_height().await;
    let target = if height == 0 { chain_height } else { height };
    if height != 0 && height > chain_height {
      return None;
    }
    self.get_block(target).await.map(|b| (b.height, b.hash))
  }

  pub async fn get_transaction(&self, txn_id: [u8; 32]) -> Option<Transaction> {
    self.chain.where_tx(txn_id).await.unwrap_or(None)
  }

  pub async fn submit_block_graph(&self, bg: BlockGraph) -> SubmitOutcome {
    match self.block_graph_exists(&bg).await {
      ExistsOutcome::AlreadyExists => SubmitOutcome::AlreadyExists,
      ExistsOutcome::Succeed => match self.ingress.submit(bg).await {
        Ok(()) => SubmitOutcome::Succeed,
        Err(e) => {
          tracing::error!(error = %e, "submit_block_graph: ingress queue closed");
          SubmitOutcome::Invalid
        }
      },
    }
  }

  pub async fn submit_block_graph_bytes(&self, bytes: &[u8]) -> SubmitOutcome {
    match BlockGraph::decode(bytes) {
      Ok(bg) => self.submit_block_graph(bg).await,
      Err(e) => {
        tracing::warn!(error = %e, "submit_block_graph_bytes: malformed payload");
        SubmitOutcome::Invalid
      }
    }
  }

  pub async fn block_graph_exists(&self, bg: &BlockGraph) -> ExistsOutcome {
    match self.chain.get_blockgraph(bg.identity()).await {
      Ok(Some(_)) => ExistsOutcome::AlreadyExists,
      _ => ExistsOutcome::Succeed,
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    collaborators::{EmptyPeers, InMemorySigner, LoggingBroadcaster, PermissiveValidator},
    model::BlockPos,
    primitives::{Hash32, Keypair},
  };

  async fn core() -> ConsensusCore {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
      "ledger-core-facade-test-{}",
      Hash32::digest(&rand::random::<[u8; 32]>())
    ));
    ConsensusCore::spawn(
      1,
      dir,
      Arc::new(PermissiveValidator),
      Arc::new(InMemorySigner::new()),
      Arc::new(EmptyPeers),
      Arc::new(LoggingBroadcaster),
      CancellationToken::new(),
    )
    .await
    .unwrap()
  }

  #[tokio::test]
  async fn empty_chain_has_zero_height() {
    let core = core().await;
    assert_eq!(core.get_height().await, 0);
    assert!(core.get_block(0).await.is_none());
    assert!(core.get_hash(0).await.is_none());
  }

  #[tokio::test]
  async fn get_hash_zero_returns_latest() {
    let core = core().await;
    let pos = || BlockPos { public_key: Keypair::generate().public(), solution: 1 };
    let first = Block::new(1, Hash32::ZERO, vec![], pos());
    let second = Block::new(2, first.hash, vec![], pos());
    core.chain.put_block(&first).await.unwrap();
    core.chain.put_block(&second).await.unwrap();

    assert_eq!(core.get_hash(0).await, Some((second.height, second.hash)));
    assert_eq!(core.get_hash(1).await, Some((first.height, first.hash)));
  }

  #[tokio::test]
  async fn safeguard_blocks_on_short_chain_starts_at_zero() {
    let core = core().await;
    let pos = BlockPos { public_key: Keypair::generate().public(), solution: 1 };
    core.chain.put_block(&Block::new(0, Hash32::ZERO, vec![], pos)).await.unwrap();
    let blocks = core.get_safeguard_blocks().await;
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].height, 0);
  }
}
