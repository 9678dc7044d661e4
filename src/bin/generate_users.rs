//! Offline seed generator: sharded member JSON plus lookup indexes

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use monoline_api::seed::{generate_members, write_seed};

#[derive(Debug, Parser)]
#[command(name = "generate-users", about = "Generate sharded seed members")]
struct Args {
    /// Number of members to generate
    #[arg(long, default_value_t = 1000)]
    count: usize,

    /// Output directory
    #[arg(long, default_value = "data/users")]
    out: PathBuf,

    /// RNG seed, same seed gives the same tree
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    info!("Generating {} members (seed {})", args.count, args.seed);

    let members = generate_members(args.count, args.seed);
    let summary = write_seed(&args.out, &members)?;

    info!(
        "Done: {} members, {} of 1024 buckets used",
        summary.members, summary.buckets_used
    );
    Ok(())
}
