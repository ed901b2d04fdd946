//! Chain Store.
//!
//! Durable append-only map of finalized blocks keyed by height, plus
//! scratch stores for pending block-graphs and blocks Blockmania has
//! delivered but that have not yet won their round.
//!
//! All operations are async and return a bool/value/`None` on success;
//! a `Result::Err` from this trait represents a store-failure and
//! callers are expected to log it and abandon the current operation
//! rather than propagate it further.

mod error;
mod store;

pub use {error::Error, store::RocksChainStore};

use {
  crate::{
    model::{Block, BlockGraph, BlockGraphIdentity, DeliveredBlock, Transaction},
    primitives::Hash32,
  },
  async_trait::async_trait,
};

#[async_trait]
pub trait ChainStore: Send + Sync {
  async fn put_block(&self, block: &Block) -> Result<bool, Error>;
  async fn get_by_height(&self, height: u64) -> Result<Option<Block>, Error>;
  async fn count(&self) -> Result<u64, Error>;
  async fn order_by_height(
    &self,
    skip: u64,
    take: u64,
  ) -> Result<Vec<Block>, Error>;
  async fn where_tx(
    &self,
    txn_id: [u8; 32],
  ) -> Result<Option<Transaction>, Error>;

  async fn put_blockgraph(&self, bg: &BlockGraph) -> Result<bool, Error>;
  async fn get_blockgraph(
    &self,
    identity: BlockGraphIdentity,
  ) -> Result<Option<BlockGraph>, Error>;
  async fn blockgraphs_where_round(
    &self,
    round: u64,
  ) -> Result<Vec<BlockGraph>, Error>;
  async fn remove_blockgraph(
    &self,
    identity: BlockGraphIdentity,
  ) -> Result<bool, Error>;
  async fn remove_blockgraphs_before(
    &self,
    round: u64,
  ) -> Result<u64, Error>;

  async fn put_delivered(&self, d: &DeliveredBlock) -> Result<bool, Error>;
  async fn delivered_where_height(
    &self,
    height: u64,
  ) -> Result<Vec<DeliveredBlock>, Error>;
  async fn remove_delivered(&self, hash: Hash32) -> Result<bool, Error>;
  async fn remove_delivered_before(
    &self,
    height: u64,
  ) -> Result<u64, Error>;
}
