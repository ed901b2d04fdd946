use {crate::model::Block, serde::{Deserialize, Serialize}};

/// A block that Blockmania has delivered (totally ordered) for its
/// round, but that has not yet been chosen as the round winner.
///
/// Keyed by the inner block's hash; destroyed once winner selection
/// runs for its height (§4.3, garbage collection).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredBlock {
  pub block: Block,
}

impl DeliveredBlock {
  pub fn new(block: Block) -> Self {
    Self { block }
  }

  pub fn height(&self) -> u64 {
    self.block.height
  }
}
