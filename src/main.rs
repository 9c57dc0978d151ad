use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pgfront::engine::values::ValuesEngine;
use pgfront::server::Server;

/// PostgreSQL wire-protocol front end.
#[derive(Parser, Debug)]
#[command(name = "pgfront", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:15432")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let listener = TcpListener::bind(&args.listen).await?;
    info!(addr = %args.listen, "pgfront listening");

    let server = Server::new(listener, ValuesEngine::new());

    // Ctrl-C triggers the graceful drain in Server::serve
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            shutdown.cancel();
        }
    });

    server.serve().await?;
    Ok(())
}
