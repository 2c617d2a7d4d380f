use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod console;
mod context;
mod server;

#[derive(Parser, Debug, Clone)]
#[command(name = "loyalty-server")]
#[command(author, version, about = "Loyalty points ledger backed by a key-value hub")]
pub struct Args {
    /// Postgres connection URL. Falls back to DATABASE_URL; without either the
    /// store lives in memory only.
    #[arg(long)]
    db_url: Option<String>,

    /// Keep reward cooldowns across restarts.
    #[arg(long, default_value = "false")]
    persist_cooldowns: bool,

    /// Refuse redeem requests from the replication service that the user can't afford.
    #[arg(long, default_value = "false")]
    deny_remote_overdraft: bool,

    /// Read `<user> !command [args]` lines from stdin and answer them.
    #[arg(long, short = 'c', default_value = "false")]
    console: bool,

    /// Treat the stream as offline, which pauses the points award loop.
    #[arg(long, default_value = "false")]
    offline: bool,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("loyalty=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {e}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = Args::parse();
    if args.db_url.is_none() {
        args.db_url = std::env::var("DATABASE_URL").ok();
    }
    info!(
        "loyalty-server starting. persistent={}, console={}",
        args.db_url.is_some(),
        args.console
    );

    if let Err(e) = server::run_server(args).await {
        error!("Server error: {:?}", e);
        return Err(e.into());
    }
    info!("Main finished. Goodbye!");
    Ok(())
}
