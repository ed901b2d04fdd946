//! Blockmania Coordinator.
//!
//! Reactive aggregator that groups persisted block-graphs for the
//! current round by block hash, waits for a quorum, constructs a
//! Blockmania instance and drives delivery.
//!
//! The group-by/throttle/buffer reactive pipeline is two explicit
//! stages over typed channels: a per-hash debounce timer (`debounce`
//! task, one per currently-open group) and a batch buffer
//! (`batch_buffer` task) that coalesces closed groups into a single
//! trigger. Both stages run until `token` is cancelled — no further
//! batches are built after that, but in-flight ones are not aborted
//! mid-flight.

use {
  crate::{
    blockmania::{Blockmania, BlockmaniaConfig},
    chain::ChainStore,
    model::{BlockGraph, Interpreted},
    primitives::Hash32,
    round::RoundOracle,
  },
  dashmap::DashMap,
  futures::StreamExt,
  std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
  },
  tokio::sync::mpsc,
  tokio_util::sync::CancellationToken,
};

pub const BLOCKMANIA_DEBOUNCE_MILLIS: u64 = 1_500;
pub const BATCH_BUFFER_WINDOW_SECS: u64 = 1;
pub const BATCH_MAX_ITEMS: usize = 500;

pub struct Coordinator;

impl Coordinator {
  /// Spawns the full C5 pipeline. `completed_rx` is fed by the ingress
  /// task (C4); every `Interpreted` item Blockmania delivers is
  /// forwarded to `delivered_tx` (C6).
  pub fn spawn(
    local_node_id: u64,
    chain: Arc<dyn ChainStore>,
    rounds: Arc<RoundOracle>,
    completed_rx: mpsc::Receiver<BlockGraph>,
    delivered_tx: mpsc::Sender<Interpreted>,
    token: CancellationToken,
  ) {
    let last_seen: Arc<DashMap<Hash32, Instant>> = Arc::new(DashMap::new());
    let (closed_tx, closed_rx) = mpsc::channel::<()>(BATCH_MAX_ITEMS * 2);

    tokio::spawn(Self::group_by_hash(
      Arc::clone(&rounds),
      last_seen,
      completed_rx,
      closed_tx,
      token,
    ));
    tokio::spawn(run_batch_buffer(
      local_node_id,
      chain,
      rounds,
      closed_rx,
      delivered_tx,
    ));
  }
}

impl Coordinator {
  async fn group_by_hash(
    rounds: Arc<RoundOracle>,
    last_seen: Arc<DashMap<Hash32, Instant>>,
    mut completed_rx: mpsc::Receiver<BlockGraph>,
    closed_tx: mpsc::Sender<()>,
    token: CancellationToken,
  ) {
    loop {
      tokio::select! {
        maybe_bg = completed_rx.recv() => {
          let bg = match maybe_bg {
            Some(bg) => bg,
            None => return,
          };
          let next_round = match rounds.next_round().await {
            Ok(r) => r,
            Err(e) => {
              tracing::error!(error = %e, "coordinator: could not read next round");
              continue;
            }
          };
          if bg.block.round != next_round {
            continue;
          }
          let hash = bg.block.hash;
          let is_new = last_seen.insert(hash, Instant::now()).is_none();
          if is_new {
            tokio::spawn(debounce_group(hash, Arc::clone(&last_seen), closed_tx.clone()));
          }
        }
        _ = token.cancelled() => return,
      }
    }
  }
}

/// Waits out the 1.5s silence window for one hash group, then signals
/// the batch buffer that a group has closed. Loops instead of sleeping
/// once because later events for the same hash bump `last_seen` and
/// must re-arm the window.
async fn debounce_group(
  hash: Hash32,
  last_seen: Arc<DashMap<Hash32, Instant>>,
  closed_tx: mpsc::Sender<()>,
) {
  let window = Duration::from_millis(BLOCKMANIA_DEBOUNCE_MILLIS);
  loop {
    tokio::time::sleep(window).await;
    let seen_at = match last_seen.get(&hash).map(|r| *r) {
      Some(seen_at) => seen_at,
      None => return,
    };
    if seen_at.elapsed() >= window {
      last_seen.remove(&hash);
      let _ = closed_tx.send(()).await;
      return;
    }
  }
}

/// Coalesces closed-group signals into batches of up to
/// `BATCH_MAX_ITEMS` within `BATCH_BUFFER_WINDOW_SECS`, then runs the
/// batch-handling algorithm once per batch.
async fn run_batch_buffer(
  local_node_id: u64,
  chain: Arc<dyn ChainStore>,
  rounds: Arc<RoundOracle>,
  mut closed_rx: mpsc::Receiver<()>,
  delivered_tx: mpsc::Sender<Interpreted>,
) {
  let window = Duration::from_secs(BATCH_BUFFER_WINDOW_SECS);
  while let Some(()) = closed_rx.recv().await {
    let mut count = 1usize;
    let deadline = Instant::now() + window;
    while count < BATCH_MAX_ITEMS {
      let remaining = deadline.saturating_duration_since(Instant::now());
      if remaining.is_zero() {
        break;
      }
      match tokio::time::timeout(remaining, closed_rx.recv()).await {
        Ok(Some(())) => count += 1,
        Ok(None) => break,
        Err(_) => break,
      }
    }
    handle_batch(local_node_id, &chain, &rounds, &delivered_tx).await;
  }
}

async fn handle_batch(
  local_node_id: u64,
  chain: &Arc<dyn ChainStore>,
  rounds: &Arc<RoundOracle>,
  delivered_tx: &mpsc::Sender<Interpreted>,
) {
  let (round, next_round) = match (rounds.round().await, rounds.next_round().await) {
    (Ok(r), Ok(n)) => (r, n),
    _ => {
      tracing::error!("batch: could not read round/next_round");
      return;
    }
  };

  let blockgraphs = match chain.blockgraphs_where_round(next_round).await {
    Ok(bgs) => bgs,
    Err(e) => {
      tracing::error!(error = %e, "batch: could not reload pending block-graphs");
      return;
    }
  };

  if blockgraphs.len() < 2 {
    return;
  }

  let node_count = blockgraphs
    .iter()
    .map(|bg| bg.block.node)
    .collect::<HashSet<_>>()
    .len() as u64;
  let f = (node_count.saturating_sub(1)) / 3;
  let quorum = 2 * f + 1;
  if node_count < quorum {
    return;
  }

  let config = BlockmaniaConfig {
    last_interpreted: round,
    skip: vec![],
    local_node_id,
    node_count,
  };
  let mut instance = Blockmania::new(config);
  for bg in blockgraphs {
    instance.feed(bg);
  }

  let mut delivered = instance.tracking_delivered();
  while let Some(item) = delivered.next().await {
    if delivered_tx.send(item).await.is_err() {
      tracing::warn!("finalizer channel closed; dropping delivered batch");
      return;
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    chain::RocksChainStore,
    model::{Block, BlockPos, BlockRef},
    primitives::Keypair,
  };

  async fn store() -> Arc<dyn ChainStore> {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
      "ledger-core-coordinator-test-{}",
      Hash32::digest(&rand::random::<[u8; 32]>())
    ));
    Arc::new(RocksChainStore::new(dir).unwrap())
  }

  fn bg(node: u64, round: u64, hash: Hash32, data: Vec<u8>) -> BlockGraph {
    let kp = Keypair::generate();
    let mut bg = BlockGraph {
      block: BlockRef { hash, node, round, data },
      prev: BlockRef { hash: Hash32::ZERO, node, round: round.saturating_sub(1), data: vec![] },
      public_key: kp.public(),
      signature: kp.sign(&[0; 32]),
      deps: None,
    };
    bg.signature = kp.sign(bg.signing_digest().as_bytes());
    bg
  }

  #[tokio::test]
  async fn batch_below_quorum_delivers_nothing() {
    let chain = store().await;
    let rounds = Arc::new(RoundOracle::new(Arc::clone(&chain)));
    let pos = BlockPos { public_key: Keypair::generate().public(), solution: 1 };
    let block = Block::new(1, Hash32::ZERO, vec![], pos);
    let hash = Hash32::digest(b"h");
    chain.put_blockgraph(&bg(1, 1, hash, block.encode())).await.unwrap();

    let (delivered_tx, mut delivered_rx) = mpsc::channel(8);
    handle_batch(1, &chain, &rounds, &delivered_tx).await;
    assert!(delivered_rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn batch_at_quorum_delivers_all() {
    let chain = store().await;
    let rounds = Arc::new(RoundOracle::new(Arc::clone(&chain)));
    let pos = BlockPos { public_key: Keypair::generate().public(), solution: 1 };
    let block = Block::new(1, Hash32::ZERO, vec![], pos);
    let hash = Hash32::digest(b"h");
    for node in 1..=4u64 {
      chain
        .put_blockgraph(&bg(node, 1, hash, block.encode()))
        .await
        .unwrap();
    }

    let (delivered_tx, mut delivered_rx) = mpsc::channel(8);
    handle_batch(1, &chain, &rounds, &delivered_tx).await;
    let mut seen = 0;
    while let Ok(item) = delivered_rx.try_recv() {
      assert_eq!(item.hash, hash);
      seen += 1;
    }
    assert_eq!(seen, 4);
  }
}
