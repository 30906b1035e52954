use std::io;
use std::path::PathBuf;
use std::thread;

use befh_core::{event_queue, run_handler, Handler};
use befh_handler_websocket::SocketPublisher;
use clap::Parser;
use tracing::{error, info};

mod config;
mod input;

use crate::config::PublisherConfig;

/// Publishes table inserts read from stdin over per-table WebSockets.
#[derive(Parser)]
#[command(name = "befh-ws-publisher", version)]
struct Cli {
    /// Path to configuration file (.toml, .json, .yaml or .env)
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Base connection string, overriding the configured one
    #[arg(long)]
    connection: Option<String>,
}

fn main() {
    let filter = std::env::var("BEFH_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let cfg = match PublisherConfig::new(cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("config load failed: {err}");
            std::process::exit(2);
        }
    };
    let connection = cli.connection.unwrap_or(cfg.connection);

    let (sender, queue) = event_queue(cfg.queue_capacity);
    let mut publisher = SocketPublisher::new(connection);
    publisher.load(&queue);

    let reader = thread::spawn(move || {
        let forwarded = input::forward_lines(io::stdin().lock(), &sender);
        info!("stdin closed after {} events", forwarded);
    });

    match run_handler(&mut publisher, &queue) {
        Ok(handled) => info!("handled {} events", handled),
        Err(err) => {
            error!("publisher stopped: {err}");
            std::process::exit(1);
        }
    }
    let _ = reader.join();
}
