use ledger_core::primitives::Pubkey;

fn main() {
  let b58string: String = std::env::args().nth(1).expect("usage: keydump <base58 pubkey>");
  let pubkey: Pubkey = b58string.parse().expect("not a valid base58-encoded pubkey");
  println!("pubkey: {pubkey}");
  println!("bytes: {:?}", pubkey.as_bytes());
}
