use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use replicator::config::{ReplicationKeys, Settings};
use tracing_subscriber::EnvFilter;

/// Replicates annotated configmaps and secrets across namespaces
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
enum Args {
    /// Run the controllers
    Run(RunArgs),
    /// Print the effective annotation, finalizer and label names
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// The address the health probe endpoints bind to
    #[arg(long, default_value = "0.0.0.0:8081")]
    health_probe_bind_address: SocketAddr,

    /// YAML file overriding annotation, finalizer and label names
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds between periodic re-checks of replicated objects, 0 disables them
    #[arg(long, default_value_t = 30)]
    resync_interval: u64,

    /// Maximum number of objects reconciled at once per kind
    #[arg(long, default_value_t = 4)]
    concurrency: u16,
}

fn load_keys(path: Option<&PathBuf>) -> anyhow::Result<ReplicationKeys> {
    match path {
        Some(path) => ReplicationKeys::from_file(path),
        None => Ok(ReplicationKeys::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args {
        Args::Config { config } => {
            let keys = load_keys(config.as_ref())?;
            println!("{}", serde_yaml::to_string(&keys)?);
        }
        Args::Run(args) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
                )
                .init();

            let settings = Settings {
                keys: load_keys(args.config.as_ref())?,
                probe_addr: args.health_probe_bind_address,
                resync_interval: (args.resync_interval > 0)
                    .then(|| Duration::from_secs(args.resync_interval)),
                concurrency: args.concurrency,
            };

            replicator::run(settings).await?;
        }
    };

    Ok(())
}
