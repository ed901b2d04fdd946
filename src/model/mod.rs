//! The data model shared by every consensus-core component. Nothing
//! in this module touches storage, networking or concurrency — it's
//! plain types and the invariants they can check about themselves.

mod block;
mod blockgraph;
mod delivered;
mod interpreted;

pub use {
  block::{Block, BlockPos, Transaction},
  blockgraph::{BlockGraph, BlockGraphIdentity, BlockRef},
  delivered::DeliveredBlock,
  interpreted::Interpreted,
};
