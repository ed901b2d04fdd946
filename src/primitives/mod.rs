mod b58;
mod hash;
mod keys;

pub use b58::ToBase58String;
pub use hash::{Hash32, Hash32ParseError};
pub use keys::{Keypair, KeypairError, Pubkey};
