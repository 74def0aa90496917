//! Keyrace typing-race server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin keyrace-server
//! cargo run --bin keyrace-server -- --host 0.0.0.0 --port 3000
//! RUST_LOG=keyrace_room=debug cargo run --bin keyrace-server
//! ```

use clap::Parser;
use keyrace::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "keyrace-server")]
#[command(about = "Real-time multiplayer typing-race server", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,
}

/// Logs at `default_level` unless `RUST_LOG` says otherwise.
fn setup_logger(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), KeyraceError> {
    setup_logger("info");

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let server = KeyraceServer::builder().bind(&addr).build().await?;
    tracing::info!("listening on ws://{addr}");
    server.run().await
}
