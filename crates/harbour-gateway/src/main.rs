//! Harbour - Git LFS gateway issuing signed storage links

use clap::Parser;
use harbour_gateway::{run_server, GatewayConfig};
use harbour_signer::StorageConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "harbour")]
#[command(about = "Git LFS gateway handing out signed object store links")]
#[command(version)]
struct Args {
    /// Listen address (tcp://host:port, tcp4://, tcp6://, host:port or fd://N)
    #[arg(short, long, default_value = "tcp://127.0.0.1:8080", env = "HARBOUR_LISTEN")]
    listen: String,

    /// Metadata service base URL
    #[arg(long, default_value = "http://127.0.0.1:9090", env = "HARBOUR_META_URL")]
    meta_url: String,

    /// Deadline for one metadata call, in seconds
    #[arg(long, default_value = "30", env = "HARBOUR_META_TIMEOUT")]
    meta_timeout: u64,

    /// Object store endpoint, optionally with a bucket path prefix
    #[arg(long, default_value = "https://s3.amazonaws.com/harbour", env = "HARBOUR_S3_ENDPOINT")]
    s3_endpoint: String,

    /// Object store access key id
    #[arg(long, env = "HARBOUR_S3_ACCESS_KEY")]
    s3_access_key: String,

    /// Object store secret access key
    #[arg(long, env = "HARBOUR_S3_SECRET_KEY", hide_env_values = true)]
    s3_secret_key: String,

    /// Object store region
    #[arg(long, default_value = "us-east-1", env = "HARBOUR_S3_REGION")]
    s3_region: String,

    /// Signing service name
    #[arg(long, default_value = "s3", env = "HARBOUR_S3_SERVICE")]
    s3_service: String,

    /// Lifetime of download links, in seconds
    #[arg(long, default_value = "86400", env = "HARBOUR_DOWNLOAD_EXPIRY")]
    download_expiry: u64,

    /// Callback URL handed out with upload links
    #[arg(long, default_value = "http://127.0.0.1:9090/callback", env = "HARBOUR_CALLBACK_URL")]
    callback_url: String,

    /// Give up on open connections this many seconds after a drain signal
    #[arg(long, env = "HARBOUR_DRAIN_TIMEOUT")]
    drain_timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, env = "HARBOUR_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Parse arguments
    let args = Args::parse();

    // Setup logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "harbour_gateway={level},harbour_meta={level},harbour_signer={level},tower_http=info",
                level = log_level
            )
            .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Harbour gateway on {}", args.listen);
    tracing::info!("Metadata service: {}", args.meta_url);
    tracing::info!("Object store: {}", args.s3_endpoint);

    if args.drain_timeout.is_none() {
        tracing::info!("No drain timeout set; a drain waits for every open connection");
    }

    // Build configuration
    let config = GatewayConfig {
        listen: args.listen,
        meta_endpoint: args.meta_url,
        meta_timeout_secs: args.meta_timeout,
        storage: StorageConfig {
            endpoint: args.s3_endpoint,
            access_key_id: args.s3_access_key,
            secret_access_key: args.s3_secret_key,
            region: args.s3_region,
            service: args.s3_service,
            download_expiry_secs: args.download_expiry,
        },
        callback_url: args.callback_url,
        drain_timeout_secs: args.drain_timeout,
        ..Default::default()
    };

    // Run until drained
    run_server(config).await
}
