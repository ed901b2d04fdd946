use crate::primitives::Hash32;

/// Blockmania's output unit: one entry in the totally-ordered stream
/// the coordinator (C5) forwards to the finalizer (C6).
///
/// `data` mirrors the block-graph's own opaque `block.data` payload —
/// an empty `data` means "this slot was skipped" and carries no
/// block to finalize (§4.3: "whose `data` is non-empty").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interpreted {
  pub hash: Hash32,
  pub round: u64,
  pub node: u64,
  pub data: Vec<u8>,
}

impl Interpreted {
  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}
