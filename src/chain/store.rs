use {
  super::{ChainStore, Error},
  crate::{
    model::{Block, BlockGraph, BlockGraphIdentity, DeliveredBlock, Transaction},
    primitives::Hash32,
  },
  async_trait::async_trait,
  rocksdb::{Options, DB},
  std::{path::Path, sync::Arc},
};

const CF_BLOCKS: &str = "blocks";
const CF_TX_INDEX: &str = "tx_index";
const CF_BLOCKGRAPHS: &str = "blockgraphs";
const CF_DELIVERED: &str = "delivered";

/// A [`ChainStore`] backed by an embedded RocksDB instance.
///
/// Every public method runs its RocksDB calls on the blocking thread
/// pool via [`tokio::task::spawn_blocking`] — RocksDB's API is
/// synchronous and must never run directly on the async executor.
#[derive(Clone)]
pub struct RocksChainStore {
  db: Arc<DB>,
}

impl RocksChainStore {
  pub fn new(directory: impl AsRef<Path>) -> Result<Self, Error> {
    std::fs::create_dir_all(&directory)?;

    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);

    let db = DB::open_cf(
      &opts,
      directory,
      [CF_BLOCKS, CF_TX_INDEX, CF_BLOCKGRAPHS, CF_DELIVERED],
    )?;

    Ok(Self { db: Arc::new(db) })
  }

  fn blockgraph_key(identity: BlockGraphIdentity) -> Vec<u8> {
    let (hash, node, round) = identity;
    let mut key = Vec::with_capacity(48);
    key.extend_from_slice(&round.to_be_bytes());
    key.extend_from_slice(&node.to_be_bytes());
    key.extend_from_slice(hash.as_bytes());
    key
  }

  fn delivered_key(hash: Hash32) -> Vec<u8> {
    hash.as_bytes().to_vec()
  }
}

#[async_trait]
impl ChainStore for RocksChainStore {
  async fn put_block(&self, block: &Block) -> Result<bool, Error> {
    let db = Arc::clone(&self.db);
    let block = block.clone();
    spawn_blocking(move || {
      let blocks = cf(&db, CF_BLOCKS)?;
      let tx_index = cf(&db, CF_TX_INDEX)?;

      db.put_cf(&blocks, block.height.to_be_bytes(), block.encode())?;
      for tx in &block.txs {
        db.put_cf(&tx_index, tx.txn_id, bincode::serialize(tx)?)?;
      }
      Ok(true)
    })
    .await
  }

  async fn get_by_height(&self, height: u64) -> Result<Option<Block>, Error> {
    let db = Arc::clone(&self.db);
    spawn_blocking(move || {
      let blocks = cf(&db, CF_BLOCKS)?;
      match db.get_cf(&blocks, height.to_be_bytes())? {
        Some(bytes) => Ok(Some(Block::decode(&bytes)?)),
        None => Ok(None),
      }
    })
    .await
  }

  async fn count(&self) -> Result<u64, Error> {
    let db = Arc::clone(&self.db);
    spawn_blocking(move || {
      let blocks = cf(&db, CF_BLOCKS)?;
      Ok(db.iterator_cf(&blocks, rocksdb::IteratorMode::Start).count() as u64)
    })
    .await
  }

  async fn order_by_height(
    &self,
    skip: u64,
    take: u64,
  ) -> Result<Vec<Block>, Error> {
    let db = Arc::clone(&self.db);
    spawn_blocking(move || {
      let blocks = cf(&db, CF_BLOCKS)?;
      let mut out = Vec::with_capacity(take as usize);
      for row in db
        .iterator_cf(&blocks, rocksdb::IteratorMode::Start)
        .skip(skip as usize)
        .take(take as usize)
      {
        let (_, value) = row?;
        out.push(Block::decode(&value)?);
      }
      Ok(out)
    })
    .await
  }

  async fn where_tx(
    &self,
    txn_id: [u8; 32],
  ) -> Result<Option<Transaction>, Error> {
    let db = Arc::clone(&self.db);
    spawn_blocking(move || {
      let tx_index = cf(&db, CF_TX_INDEX)?;
      match db.get_cf(&tx_index, txn_id)? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
      }
    })
    .await
  }

  async fn put_blockgraph(&self, bg: &BlockGraph) -> Result<bool, Error> {
    let db = Arc::clone(&self.db);
    let key = Self::blockgraph_key(bg.identity());
    let value = bincode::serialize(bg)?;
    spawn_blocking(move || {
      let blockgraphs = cf(&db, CF_BLOCKGRAPHS)?;
      db.put_cf(&blockgraphs, key, value)?;
      Ok(true)
    })
    .await
  }

  async fn get_blockgraph(
    &self,
    identity: BlockGraphIdentity,
  ) -> Result<Option<BlockGraph>, Error> {
    let db = Arc::clone(&self.db);
    let key = Self::blockgraph_key(identity);
    spawn_blocking(move || {
      let blockgraphs = cf(&db, CF_BLOCKGRAPHS)?;
      match db.get_cf(&blockgraphs, key)? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
      }
    })
    .await
  }

  async fn blockgraphs_where_round(
    &self,
    round: u64,
  ) -> Result<Vec<BlockGraph>, Error> {
    let db = Arc::clone(&self.db);
    spawn_blocking(move || {
      let blockgraphs = cf(&db, CF_BLOCKGRAPHS)?;
      let prefix = round.to_be_bytes();
      let mut out = vec![];
      let iter = db.iterator_cf(
        &blockgraphs,
        rocksdb::IteratorMode::From(&prefix, rocksdb::Direction::Forward),
      );
      for row in iter {
        let (key, value) = row?;
        if key.len() < 8 || key[0..8] != prefix {
          break;
        }
        out.push(bincode::deserialize(&value)?);
      }
      Ok(out)
    })
    .await
  }

  async fn remove_blockgraph(
    &self,
    identity: BlockGraphIdentity,
  ) -> Result<bool, Error> {
    let db = Arc::clone(&self.db);
    let key = Self::blockgraph_key(identity);
    spawn_blocking(move || {
      let blockgraphs = cf(&db, CF_BLOCKGRAPHS)?;
      let existed = db.get_cf(&blockgraphs, &key)?.is_some();
      db.delete_cf(&blockgraphs, key)?;
      Ok(existed)
    })
    .await
  }

  async fn remove_blockgraphs_before(&self, round: u64) -> Result<u64, Error> {
    let db = Arc::clone(&self.db);
    spawn_blocking(move || {
      let blockgraphs = cf(&db, CF_BLOCKGRAPHS)?;
      let mut removed = 0u64;
      let keys: Vec<Box<[u8]>> = db
        .iterator_cf(&blockgraphs, rocksdb::IteratorMode::Start)
        .filter_map(|row| row.ok())
        .take_while(|(key, _)| {
          key.len() >= 8 && u64::from_be_bytes(key[0..8].try_into().unwrap()) < round
        })
        .map(|(key, _)| key)
        .collect();
      for key in keys {
        db.delete_cf(&blockgraphs, key)?;
        removed += 1;
      }
      Ok(removed)
    })
    .await
  }

  async fn put_delivered(&self, d: &DeliveredBlock) -> Result<bool, Error> {
    let db = Arc::clone(&self.db);
    let key = Self::delivered_key(d.block.hash);
    let value = bincode::serialize(d)?;
    spawn_blocking(move || {
      let delivered = cf(&db, CF_DELIVERED)?;
      db.put_cf(&delivered, key, value)?;
      Ok(true)
    })
    .await
  }

  async fn delivered_where_height(
    &self,
    height: u64,
  ) -> Result<Vec<DeliveredBlock>, Error> {
    let db = Arc::clone(&self.db);
    spawn_blocking(move || {
      let delivered = cf(&db, CF_DELIVERED)?;
      let mut out = vec![];
      for row in db.iterator_cf(&delivered, rocksdb::IteratorMode::Start) {
        let (_, value) = row?;
        let d: DeliveredBlock = bincode::deserialize(&value)?;
        if d.height() == height {
          out.push(d);
        }
      }
      Ok(out)
    })
    .await
  }

  async fn remove_delivered(&self, hash: Hash32) -> Result<bool, Error> {
    let db = Arc::clone(&self.db);
    let key = Self::delivered_key(hash);
    spawn_blocking(move || {
      let delivered = cf(&db, CF_DELIVERED)?;
      let existed = db.get_cf(&delivered, &key)?.is_some();
      db.delete_cf(&delivered, key)?;
      Ok(existed)
    })
    .await
  }

  async fn remove_delivered_before(&self, height: u64) -> Result<u64, Error> {
    let db = Arc::clone(&self.db);
    spawn_blocking(move || {
      let delivered = cf(&db, CF_DELIVERED)?;
      let mut removed = 0u64;
      let keys: Vec<Box<[u8]>> = db
        .iterator_cf(&delivered, rocksdb::IteratorMode::Start)
        .filter_map(|row| row.ok())
        .filter_map(|(key, value)| {
          let d: DeliveredBlock = bincode::deserialize(&value).ok()?;
          (d.height() < height).then_some(key)
        })
        .collect();
      for key in keys {
        db.delete_cf(&delivered, key)?;
        removed += 1;
      }
      Ok(removed)
    })
    .await
  }
}

/// Column families are all declared at `open_cf` time, so a missing
/// handle here means the store was opened incorrectly.
fn cf<'a>(db: &'a DB, name: &'static str) -> Result<Arc<rocksdb::BoundColumnFamily<'a>>, Error> {
  Ok(
    db.cf_handle(name)
      .unwrap_or_else(|| panic!("missing column family {name}")),
  )
}

/// Runs a blocking RocksDB closure on the blocking thread pool and
/// flattens the join error into [`Error`].
async fn spawn_blocking<F, T>(f: F) -> Result<T, Error>
where
  F: FnOnce() -> Result<T, Error> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(f).await?
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::model::BlockPos;

  fn pos() -> BlockPos {
    BlockPos {
      public_key: crate::primitives::Keypair::generate().public(),
      solution: 1,
    }
  }

  async fn store() -> RocksChainStore {
    let dir = tempdir();
    RocksChainStore::new(dir).unwrap()
  }

  fn tempdir() -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("ledger-core-test-{}", Hash32::digest(&rand::random::<[u8; 32]>())));
    p
  }

  #[tokio::test]
  async fn put_then_get_by_height() {
    let store = store().await;
    let block = Block::new(1, Hash32::ZERO, vec![], pos());
    assert!(store.put_block(&block).await.unwrap());
    assert_eq!(store.get_by_height(1).await.unwrap(), Some(block));
    assert_eq!(store.get_by_height(2).await.unwrap(), None);
  }

  #[tokio::test]
  async fn blockgraphs_filter_by_round() {
    let store = store().await;
    let kp = crate::primitives::Keypair::generate();
    for (node, round) in [(1, 5), (2, 5), (1, 6)] {
      let mut bg = BlockGraph {
        block: crate::model::BlockRef {
          hash: Hash32::digest(format!("{node}-{round}").as_bytes()),
          node,
          round,
          data: vec![],
        },
        prev: crate::model::BlockRef {
          hash: Hash32::ZERO,
          node,
          round: round - 1,
          data: vec![],
        },
        public_key: kp.public(),
        signature: kp.sign(&[0; 32]),
        deps: None,
      };
      bg.signature = kp.sign(bg.signing_digest().as_bytes());
      store.put_blockgraph(&bg).await.unwrap();
    }
    let round5 = store.blockgraphs_where_round(5).await.unwrap();
    assert_eq!(round5.len(), 2);
    let round6 = store.blockgraphs_where_round(6).await.unwrap();
    assert_eq!(round6.len(), 1);
  }
}
