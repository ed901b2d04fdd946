use {
  clap::Parser,
  ledger_core::{
    cli::CliOpts,
    collaborators::{EmptyPeers, InMemorySigner, LoggingBroadcaster, PermissiveValidator},
    ConsensusCore,
  },
  std::sync::Arc,
  tokio_util::sync::CancellationToken,
  tracing::{info, Level},
  tracing_subscriber::{
    filter::filter_fn,
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
    Layer,
  },
};

fn print_essentials(opts: &CliOpts) {
  info!("Starting ledger-core consensus node");
  info!("Version: {}", env!("CARGO_PKG_VERSION"));
  info!("Node id: {}", opts.node_id);
  info!("Data directory: {}", opts.data_dir().display());
  info!("Validator identity: {}", opts.secret.public());
  info!("Standalone mode: {}", opts.standalone);
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
  let opts = CliOpts::parse();

  let loglevel = match opts.verbose {
    1 => Level::DEBUG,
    2 => Level::TRACE,
    _ => Level::INFO,
  };
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::fmt::layer()
        .with_filter(filter_fn(move |metadata| metadata.level() <= &loglevel)),
    )
    .init();

  print_essentials(&opts);

  if !opts.standalone {
    anyhow::bail!(
      "this binary only wires the reference collaborators from `collaborators::reference`; \
       run with --standalone, or embed `ConsensusCore` in a host that supplies real ones"
    );
  }

  let token = CancellationToken::new();
  let core = ConsensusCore::spawn(
    opts.node_id,
    opts.data_dir(),
    Arc::new(PermissiveValidator),
    Arc::new(InMemorySigner::new()),
    Arc::new(EmptyPeers),
    Arc::new(LoggingBroadcaster),
    token.clone(),
  )
  .await?;

  info!("chain height at startup: {}", core.get_height().await);

  tokio::select! {
    _ = tokio::signal::ctrl_c() => {
      info!("shutdown requested");
      token.cancel();
    }
  }

  Ok(())
}
