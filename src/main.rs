#![cfg_attr(not(test), deny(clippy::panic))]

use chat_relay::config::{self, Config};
use chat_relay::logging;
use chat_relay::server::{RelayConfig, RelayServer};
use clap::Parser;

/// Chat relay -- rebroadcasts newline-delimited chat lines to every connected client
#[derive(Parser, Debug)]
#[command(name = "chat-relay")]
#[command(about = "A minimal TCP chat relay with history replay for late joiners")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the relay.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,

    /// Override the listening port.
    #[arg(long, short = 'p', env = "CHAT_RELAY_PORT")]
    port: Option<u16>,

    /// Override the listening address.
    #[arg(long, env = "CHAT_RELAY_HOST")]
    host: Option<String>,
}

impl Cli {
    fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(host) = &self.host {
            cfg.host.clone_from(host);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load();
    cli.apply_overrides(&mut cfg);

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Listen address: {}:{}", cfg.host, cfg.port);
                println!(
                    "  Outbound queue capacity: {}",
                    cfg.server.outbound_queue_capacity
                );
                println!("  Max line length: {}", cfg.server.max_line_length);
                match cfg.server.history_limit {
                    Some(limit) => println!("  History limit: {limit}"),
                    None => println!("  History limit: unbounded"),
                }
                println!("  File logging: {}", cfg.logging.enable_file_logging);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    logging::init_with_config(&cfg.logging);

    let addr = cfg.bind_addr()?;
    tracing::info!(%addr, "Starting chat relay");

    let server = RelayServer::bind(addr, RelayConfig::from(&cfg)).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        shutdown.shutdown();
    });

    server.run().await;

    Ok(())
}
