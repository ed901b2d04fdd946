//! Seen-Hash Filter.
//!
//! A bounded, periodically-flushed set of block hashes the ingress
//! and finalizer use to short-circuit replays of already-finalized or
//! already-rejected blocks.

use {
  crate::primitives::Hash32,
  std::{
    collections::HashSet,
    sync::RwLock,
    time::Duration,
  },
  tokio_util::sync::CancellationToken,
};

pub const SEEN_HASH_CAPACITY: usize = 50_000;
pub const SEEN_HASH_FLUSH_HOURS: u64 = 1;

/// Mutex-guarded (here, `RwLock`-guarded) hash set satisfying the
/// reader/upgradeable-writer discipline §4.4 asks for: `contains` only
/// ever takes a read lock, `add` takes a write lock and re-checks
/// membership before inserting so concurrent `add`s never lose an
/// update.
pub struct SeenHashFilter {
  hashes: RwLock<HashSet<Hash32>>,
}

impl SeenHashFilter {
  pub fn new() -> Self {
    Self {
      hashes: RwLock::new(HashSet::with_capacity(SEEN_HASH_CAPACITY)),
    }
  }

  pub fn contains(&self, hash: &Hash32) -> bool {
    self.hashes.read().expect("seen-hash lock poisoned").contains(hash)
  }

  /// No-op if `hash` is already present. If the set is at capacity and
  /// `hash` is new, the oldest-drop policy applies: the set is cleared
  /// before inserting (§8 invariant 4 only requires boundedness, not a
  /// particular eviction order).
  pub fn add(&self, hash: Hash32) {
    let mut hashes = self.hashes.write().expect("seen-hash lock poisoned");
    if hashes.contains(&hash) {
      return;
    }
    if hashes.len() >= SEEN_HASH_CAPACITY {
      hashes.clear();
    }
    hashes.insert(hash);
  }

  pub fn clear(&self) {
    self.hashes.write().expect("seen-hash lock poisoned").clear();
  }

  pub fn len(&self) -> usize {
    self.hashes.read().expect("seen-hash lock poisoned").len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Runs the hourly flush tick until `token` is cancelled. Spawned
  /// once from `main` alongside the coordinator, per §5's cancellation
  /// model.
  pub async fn run_flush_ticker(
    self: std::sync::Arc<Self>,
    token: CancellationToken,
  ) {
    let period = Duration::from_secs(SEEN_HASH_FLUSH_HOURS * 3600);
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await; // first tick fires immediately; consume it
    loop {
      tokio::select! {
        _ = ticker.tick() => {
          tracing::debug!(size = self.len(), "flushing seen-hash filter");
          self.clear();
        }
        _ = token.cancelled() => {
          tracing::debug!("seen-hash flush ticker stopped");
          return;
        }
      }
    }
  }
}

impl Default for SeenHashFilter {
  fn default() -> Self {
    Self::new()
  }
}
