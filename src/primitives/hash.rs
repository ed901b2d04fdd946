use {
  multihash::{Hasher, Sha3_256},
  serde::{Deserialize, Serialize},
  std::{fmt, str::FromStr},
  thiserror::Error,
};

/// A 32-byte content hash.
///
/// Used for block hashes, block-graph identity hashes and as the key
/// type of the Seen-Hash Filter. Rendered as lowercase hex, per the
/// "hex-encoded block hash" wording used throughout the consensus
/// core's data model.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash32(#[serde(with = "serde_bytes32")] [u8; 32]);

impl Hash32 {
  pub const ZERO: Hash32 = Hash32([0u8; 32]);

  pub fn from_bytes(bytes: [u8; 32]) -> Self {
    Self(bytes)
  }

  pub fn digest(data: &[u8]) -> Self {
    let mut hasher = Sha3_256::default();
    hasher.update(data);
    Self(hasher.finalize().try_into().expect("sha3-256 is 32 bytes"))
  }

  pub fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }

  pub fn to_hex(self) -> String {
    hex::encode(self.0)
  }
}

impl fmt::Display for Hash32 {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.to_hex())
  }
}

impl fmt::Debug for Hash32 {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Hash32({})", self.to_hex())
  }
}

#[derive(Debug, Error)]
pub enum Hash32ParseError {
  #[error("invalid hex string: {0}")]
  Hex(#[from] hex::FromHexError),

  #[error("expected 32 bytes, got {0}")]
  WrongLength(usize),
}

impl FromStr for Hash32 {
  type Err = Hash32ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let bytes = hex::decode(s)?;
    if bytes.len() != 32 {
      return Err(Hash32ParseError::WrongLength(bytes.len()));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(Self(out))
  }
}

mod serde_bytes32 {
  use serde::{Deserialize, Deserializer, Serialize, Serializer};

  pub fn serialize<S: Serializer>(
    bytes: &[u8; 32],
    s: S,
  ) -> Result<S::Ok, S::Error> {
    bytes.to_vec().serialize(s)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    d: D,
  ) -> Result<[u8; 32], D::Error> {
    let v = Vec::<u8>::deserialize(d)?;
    v.try_into()
      .map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"32"))
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn hex_roundtrip() {
    let h = Hash32::digest(b"hello");
    let parsed: Hash32 = h.to_hex().parse().unwrap();
    assert_eq!(h, parsed);
  }

  #[test]
  fn digest_is_deterministic() {
    assert_eq!(Hash32::digest(b"a"), Hash32::digest(b"a"));
    assert_ne!(Hash32::digest(b"a"), Hash32::digest(b"b"));
  }
}
