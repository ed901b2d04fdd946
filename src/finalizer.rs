//! Finalizer.
//!
//! Consumes Blockmania-delivered blocks, verifies them, stages them to
//! the Delivered store, then deterministically picks the round winner
//! and commits it to the Chain Store.

use {
  crate::{
    chain::ChainStore,
    collaborators::{Validator, VerifyOutcome},
    model::{Block, DeliveredBlock, Interpreted},
    round::RoundOracle,
    seen_hash::SeenHashFilter,
  },
  std::sync::Arc,
  tokio::sync::mpsc,
  tokio_util::sync::CancellationToken,
};

pub struct Finalizer {
  chain: Arc<dyn ChainStore>,
  seen_hashes: Arc<SeenHashFilter>,
  rounds: Arc<RoundOracle>,
  validator: Arc<dyn Validator>,
}

impl Finalizer {
  pub fn new(
    chain: Arc<dyn ChainStore>,
    seen_hashes: Arc<SeenHashFilter>,
    rounds: Arc<RoundOracle>,
    validator: Arc<dyn Validator>,
  ) -> Self {
    Self { chain, seen_hashes, rounds, validator }
  }

  /// Drains `delivered_rx` until `token` is cancelled, running the
  /// delivery-handling algorithm for every non-empty `Interpreted`
  /// tuple and winner selection after each batch.
  pub fn spawn(self: Arc<Self>, mut delivered_rx: mpsc::Receiver<Interpreted>, token: CancellationToken) {
    tokio::spawn(async move {
      loop {
        tokio::select! {
          item = delivered_rx.recv() => {
            match item {
              Some(item) => self.handle_delivered(item).await,
              None => return,
            }
          }
          _ = token.cancelled() => return,
        }
      }
    });
  }

  async fn handle_delivered(&self, item: Interpreted) {
    if !item.is_empty() {
      if let Err(e) = self.deliver_one(&item).await {
        tracing::error!(error = %e, "finalizer: store failure while handling delivery");
      }
    }

    // Winner selection runs after every delivered tuple regardless of
    // whether it succeeded, with garbage collection wrapped around it
    // so it always runs even if selection bails out early.
    let result = self.select_winner().await;
    if let Err(e) = self.garbage_collect().await {
      tracing::error!(error = %e, "finalizer: garbage collection failed");
    }
    if let Err(e) = result {
      tracing::error!(error = %e, "finalizer: winner selection failed");
    }
  }

  async fn deliver_one(&self, item: &Interpreted) -> Result<(), crate::chain::Error> {
    let next_round = self.rounds.next_round().await?;
    let identity = (item.hash, item.node, next_round);
    let bg = match self.chain.get_blockgraph(identity).await? {
      Some(bg) => bg,
      None => {
        tracing::warn!(hash = %item.hash, "delivered tuple has no matching block-graph");
        return Ok(());
      }
    };

    let block = match Block::decode(&bg.block.data) {
      Ok(b) => b,
      Err(e) => {
        tracing::warn!(error = %e, "delivered block-graph does not decode");
        self.chain.remove_blockgraph(identity).await?;
        return Ok(());
      }
    };

    if self.chain.get_by_height(block.height).await?.as_ref() == Some(&block) {
      self.seen_hashes.add(block.hash);
      self.chain.remove_delivered(block.hash).await?;
      self.chain.remove_blockgraph(identity).await?;
      return Ok(());
    }

    if self.validator.verify_blockgraph_sig_node_round(&bg).await != VerifyOutcome::Succeed {
      tracing::warn!(hash = %item.hash, "delivered block-graph failed signature verification");
      self.chain.remove_blockgraph(identity).await?;
      return Ok(());
    }

    self.chain.put_delivered(&DeliveredBlock::new(block)).await?;
    Ok(())
  }

  /// Deterministic pick over the Delivered store. The `winners.len() >
  /// 2` branch below is kept as-is: it requires a solution that is
  /// simultaneously the minimum and `>= max`, which only a set with
  /// every member tied can ever satisfy, and even then only if `min ==
  /// max` — for genuinely tied-but-not-degenerate sets this branch
  /// picks no winner at all.
  async fn select_winner(&self) -> Result<(), crate::chain::Error> {
    let height = self.chain.count().await?;
    self.select_winner_at(height + 1).await
  }

  async fn select_winner_at(&self, height: u64) -> Result<(), crate::chain::Error> {
    let delivered = self.chain.delivered_where_height(height).await?;
    if delivered.is_empty() {
      return Ok(());
    }

    let min_sol = delivered.iter().map(|d| d.block.block_pos.solution).min().unwrap();
    let max_sol = delivered.iter().map(|d| d.block.block_pos.solution).max().unwrap();
    let winners: Vec<&DeliveredBlock> =
      delivered.iter().filter(|d| d.block.block_pos.solution == min_sol).collect();

    let winner = if winners.len() > 2 {
      winners.into_iter().find(|d| d.block.block_pos.solution >= max_sol)
    } else {
      winners.into_iter().next()
    };

    let winner = match winner {
      Some(w) => w,
      None => return Ok(()),
    };

    if self.chain.get_by_height(winner.height()).await?.is_some() {
      self.seen_hashes.add(winner.block.hash);
      return Ok(());
    }

    match self.validator.verify_block(&winner.block).await {
      VerifyOutcome::UnableToVerify => {
        self.seen_hashes.add(winner.block.hash);
      }
      VerifyOutcome::AlreadyExists => {
        self.seen_hashes.add(winner.block.hash);
      }
      VerifyOutcome::Succeed => {
        self.chain.put_block(&winner.block).await?;
      }
    }
    Ok(())
  }

  /// Removes every Delivered block with `height < next_round()` and
  /// every block-graph with `round < next_round()` (§4.3 "Garbage
  /// collection").
  async fn garbage_collect(&self) -> Result<(), crate::chain::Error> {
    let next_round = self.rounds.next_round().await?;
    self.chain.remove_delivered_before(next_round).await?;
    self.chain.remove_blockgraphs_before(next_round).await?;
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    chain::RocksChainStore,
    collaborators::PermissiveValidator,
    model::{BlockGraph, BlockPos, BlockRef},
    primitives::{Hash32, Keypair},
  };

  async fn store() -> Arc<dyn ChainStore> {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
      "ledger-core-finalizer-test-{}",
      Hash32::digest(&rand::random::<[u8; 32]>())
    ));
    Arc::new(RocksChainStore::new(dir).unwrap())
  }

  fn block_with_solution(height: u64, solution: u64) -> Block {
    let pos = BlockPos { public_key: Keypair::generate().public(), solution };
    Block::new(height, Hash32::ZERO, vec![], pos)
  }

  fn bg_for(node: u64, round: u64, block: &Block) -> BlockGraph {
    let kp = Keypair::generate();
    let mut bg = BlockGraph {
      block: BlockRef { hash: block.hash, node, round, data: block.encode() },
      prev: BlockRef { hash: Hash32::ZERO, node, round: round.saturating_sub(1), data: vec![] },
      public_key: kp.public(),
      signature: kp.sign(&[0; 32]),
      deps: None,
    };
    bg.signature = kp.sign(bg.signing_digest().as_bytes());
    bg
  }

  fn finalizer(chain: Arc<dyn ChainStore>) -> Finalizer {
    Finalizer::new(
      Arc::clone(&chain),
      Arc::new(SeenHashFilter::new()),
      Arc::new(RoundOracle::new(chain)),
      Arc::new(PermissiveValidator),
    )
  }

  #[tokio::test]
  async fn single_delivered_block_wins() {
    let chain = store().await;
    let block = block_with_solution(1, 5);
    let bg = bg_for(1, 1, &block);
    chain.put_blockgraph(&bg).await.unwrap();
    let f = finalizer(Arc::clone(&chain));

    f.handle_delivered(Interpreted {
      hash: block.hash,
      round: 1,
      node: 1,
      data: block.encode(),
    })
    .await;

    assert_eq!(chain.get_by_height(1).await.unwrap(), Some(block));
  }

  #[tokio::test]
  async fn three_way_tie_below_max_has_no_winner() {
    let chain = store().await;
    // Three blocks tied at the minimum solution, plus one strictly
    // higher: `winners` (the three tied at the min) has length 3, so
    // the `winners.len() > 2` branch requires one of them to also be
    // `>= max_sol`. None is, so no winner is picked this round.
    let blocks = [
      block_with_solution(1, 5),
      block_with_solution(1, 5),
      block_with_solution(1, 5),
      block_with_solution(1, 20),
    ];
    for block in &blocks {
      chain.put_delivered(&DeliveredBlock::new(block.clone())).await.unwrap();
    }
    let f = finalizer(Arc::clone(&chain));
    f.select_winner_at(1).await.unwrap();
    assert_eq!(chain.count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn replay_of_finalized_block_marks_seen_hash() {
    let chain = store().await;
    let block = block_with_solution(1, 1);
    chain.put_block(&block).await.unwrap();
    let bg = bg_for(1, 1, &block);
    chain.put_blockgraph(&bg).await.unwrap();
    let f = finalizer(Arc::clone(&chain));

    f.handle_delivered(Interpreted {
      hash: block.hash,
      round: 1,
      node: 1,
      data: block.encode(),
    })
    .await;

    assert!(f.seen_hashes.contains(&block.hash));
  }
}
