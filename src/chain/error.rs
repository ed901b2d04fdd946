use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("storage engine error: {0}")]
  StorageEngine(#[from] rocksdb::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] bincode::Error),

  #[error("system io error: {0}")]
  SystemIO(#[from] std::io::Error),

  #[error("background task join error: {0}")]
  Join(#[from] tokio::task::JoinError),
}
