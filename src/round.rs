//! Round Oracle.
//!
//! Derives the current round from chain height. Stateless and
//! re-queried on every call: `round()`/`next_round()` are `async`
//! throughout rather than bridging a synchronous call over an
//! awaited store read.

use {crate::chain::ChainStore, std::sync::Arc};

pub struct RoundOracle {
  chain: Arc<dyn ChainStore>,
}

impl RoundOracle {
  pub fn new(chain: Arc<dyn ChainStore>) -> Self {
    Self { chain }
  }

  /// `max(0, height - 1)`.
  pub async fn round(&self) -> Result<u64, crate::chain::Error> {
    let height = self.chain.count().await?;
    Ok(height.saturating_sub(1))
  }

  pub async fn next_round(&self) -> Result<u64, crate::chain::Error> {
    Ok(self.round().await? + 1)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    chain::RocksChainStore,
    model::{Block, BlockPos},
    primitives::{Hash32, Keypair},
  };

  async fn store() -> Arc<dyn ChainStore> {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
      "ledger-core-round-test-{}",
      Hash32::digest(&rand::random::<[u8; 32]>())
    ));
    Arc::new(RocksChainStore::new(dir).unwrap())
  }

  #[tokio::test]
  async fn empty_chain_rounds_to_zero() {
    let oracle = RoundOracle::new(store().await);
    assert_eq!(oracle.round().await.unwrap(), 0);
    assert_eq!(oracle.next_round().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn round_tracks_height() {
    let chain = store().await;
    let pos = BlockPos {
      public_key: Keypair::generate().public(),
      solution: 1,
    };
    chain
      .put_block(&Block::new(1, Hash32::ZERO, vec![], pos))
      .await
      .unwrap();
    let oracle = RoundOracle::new(chain);
    assert_eq!(oracle.round().await.unwrap(), 0);
    assert_eq!(oracle.next_round().await.unwrap(), 1);
  }
}
