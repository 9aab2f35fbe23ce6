//! chat-relay binary
//!
//! Serves `POST /api/generate`, relaying streamed completions as plain text

use anyhow::Result;
use chat_relay::gate::server::start_server;
use chat_relay::AppConfig;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// chat-relay: streaming completion relay for browser chat clients
#[derive(Parser, Debug)]
#[command(name = "chat-relay")]
#[command(about = "Streaming chat completion relay", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Host to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;

    // Override with CLI arguments
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(timeout) = args.timeout {
        config.server.timeout_secs = timeout;
    }

    config.server.validate()?;

    if args.validate {
        print_config(&config);
        return Ok(());
    }

    start_server(config).await
}

/// Print the effective configuration
fn print_config(config: &AppConfig) {
    println!("Configuration validation:");
    println!("  Host: {}", config.server.host);
    println!("  Port: {}", config.server.port);
    println!("  Timeout: {}s", config.server.timeout_secs);
    println!("  Upstream: {}", config.provider.completions_url());
    println!(
        "  Server-held API key: {}",
        if config.provider.api_key().is_some() {
            "configured"
        } else {
            "none (callers must send X-OPENAI-API-KEY)"
        }
    );
    println!("\n✓ Configuration is valid");
}
