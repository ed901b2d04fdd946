use ledger_core::primitives::Keypair;

fn main() {
  let count: u32 = std::env::args()
    .nth(1)
    .unwrap_or_else(|| "1".to_owned())
    .parse()
    .expect("argument must be a positive integer");

  for _ in 0..count {
    let keypair = Keypair::generate();
    println!("pubkey: {}", keypair.public());
    println!("secret: {}", keypair);
    println!();
  }
}
