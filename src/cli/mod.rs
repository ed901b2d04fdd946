use {crate::primitives::Keypair, clap::Parser, std::path::PathBuf};

/// Command-line configuration for the consensus-core binary.
///
/// Networking, bootstrap peers and RPC fronting are external
/// collaborators this crate does not own (§1 Non-goals); this binary
/// only ever runs in `--standalone` demo mode, driving the core with
/// the in-memory reference collaborators from [`crate::collaborators`].
#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct CliOpts {
  #[clap(short, long, help = "secret key of the local validator identity")]
  pub secret: Keypair,

  #[clap(
    short,
    long,
    help = "numeric node id of this validator",
    default_value = "0"
  )]
  pub node_id: u64,

  #[clap(
    short,
    long,
    help = "directory backing the Chain Store's RocksDB instance",
    default_value = "./data"
  )]
  pub data_dir: PathBuf,

  #[clap(
    long,
    help = "run against the in-memory reference collaborators instead of real ones"
  )]
  pub standalone: bool,

  #[clap(
    short,
    long,
    parse(from_occurrences),
    help = "use verbose output (-vv very verbose output)"
  )]
  pub verbose: u64,
}

impl CliOpts {
  pub fn data_dir(&self) -> &std::path::Path {
    &self.data_dir
  }
}
