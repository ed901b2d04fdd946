//! Blockmania stand-in.
//!
//! Blockmania's internal total-order algorithm is treated as a black
//! box satisfying a simple contract: built fresh per emitted batch,
//! fed a set of block-graphs, and consumed through a
//! `tracking_delivered` stream of [`Interpreted`] items. This module
//! ships a conforming, deterministic implementation — ordered by
//! `(round, node)` after excluding `skip` — so the rest of the crate's
//! control flow (the coordinator, the finalizer, the end-to-end
//! scenarios) runs against something real. It is not a claim that
//! this ordering is itself a production BFT total-order proof.

use {
  crate::model::{BlockGraph, Interpreted},
  futures::{stream, Stream},
};

/// Per-batch construction parameters (§4.2 step 4).
#[derive(Clone, Debug)]
pub struct BlockmaniaConfig {
  pub last_interpreted: u64,
  pub skip: Vec<u64>,
  pub local_node_id: u64,
  pub node_count: u64,
}

pub struct Blockmania {
  config: BlockmaniaConfig,
  blockgraphs: Vec<BlockGraph>,
}

impl Blockmania {
  pub fn new(config: BlockmaniaConfig) -> Self {
    Self {
      config,
      blockgraphs: Vec::new(),
    }
  }

  /// Feeds one block-graph into the instance. Blockmania is stateless
  /// across batches (§4.2): nothing here is persisted beyond the
  /// lifetime of this instance.
  pub fn feed(&mut self, bg: BlockGraph) {
    self.blockgraphs.push(bg);
  }

  /// Totally orders everything fed so far and exposes it as a stream
  /// of [`Interpreted`] items, skipping any node id named in
  /// `config.skip`.
  pub fn tracking_delivered(mut self) -> impl Stream<Item = Interpreted> {
    self.blockgraphs.sort_by_key(|bg| (bg.block.round, bg.block.node));
    let skip = self.config.skip;
    let items: Vec<Interpreted> = self
      .blockgraphs
      .into_iter()
      .filter(|bg| !skip.contains(&bg.block.node))
      .map(|bg| Interpreted {
        hash: bg.block.hash,
        round: bg.block.round,
        node: bg.block.node,
        data: bg.block.data,
      })
      .collect();
    stream::iter(items)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{model::BlockRef, primitives::{Hash32, Keypair}};
  use futures::StreamExt;

  fn bg(node: u64, round: u64, data: &[u8]) -> BlockGraph {
    let kp = Keypair::generate();
    let mut bg = BlockGraph {
      block: BlockRef {
        hash: Hash32::digest(data),
        node,
        round,
        data: data.to_vec(),
      },
      prev: BlockRef {
        hash: Hash32::ZERO,
        node,
        round: round.saturating_sub(1),
        data: vec![],
      },
      public_key: kp.public(),
      signature: kp.sign(&[0; 32]),
      deps: None,
    };
    bg.signature = kp.sign(bg.signing_digest().as_bytes());
    bg
  }

  #[tokio::test]
  async fn orders_by_round_then_node() {
    let config = BlockmaniaConfig {
      last_interpreted: 0,
      skip: vec![],
      local_node_id: 1,
      node_count: 4,
    };
    let mut instance = Blockmania::new(config);
    instance.feed(bg(3, 1, b"c"));
    instance.feed(bg(1, 1, b"a"));
    instance.feed(bg(2, 1, b"b"));

    let delivered: Vec<_> = instance.tracking_delivered().collect().await;
    let nodes: Vec<u64> = delivered.iter().map(|i| i.node).collect();
    assert_eq!(nodes, vec![1, 2, 3]);
  }

  #[tokio::test]
  async fn skip_excludes_named_nodes() {
    let config = BlockmaniaConfig {
      last_interpreted: 0,
      skip: vec![2],
      local_node_id: 1,
      node_count: 4,
    };
    let mut instance = Blockmania::new(config);
    instance.feed(bg(1, 1, b"a"));
    instance.feed(bg(2, 1, b"b"));

    let delivered: Vec<_> = instance.tracking_delivered().collect().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].node, 1);
  }
}
