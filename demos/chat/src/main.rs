//! Tether Chat Demo
//!
//! Connects to a SignalR endpoint, prints every inbound message, and sends
//! each line typed on stdin. Type `/quit` to disconnect.
//!
//! # Running the Demo
//!
//! ```bash
//! cargo run --package chat-demo -- http://localhost:5000/chat
//! ```

use anyhow::Result;
use clap::Parser;
use tether::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Arguments for the chat demo.
#[derive(Parser, Debug)]
#[command(about = "Interactive chat client over a SignalR connection")]
struct Args {
    /// Base URL of the SignalR endpoint, e.g. http://localhost:5000/chat
    url: String,

    /// Bearer token added to every request.
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .init();

    let args = Args::parse();

    let connection = Connection::builder(&args.url)
        .trace_level(TraceLevel::StateChanges)
        .build()?;
    if let Some(token) = &args.token {
        connection.set_client_config(
            ClientConfig::new().with_header("Authorization", format!("Bearer {token}")),
        )?;
    }
    connection.set_on_message(|message| println!("<< {message}"))?;
    connection.set_on_disconnected(|| info!("Connection closed"))?;

    connection.start().await?;
    info!(id = %connection.connection_id(), "Connected");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line == "/quit" {
            break;
        }
        if let Err(e) = connection.send(&line).await {
            error!("Failed to send message: {e}");
            break;
        }
    }

    connection.stop().await?;
    Ok(())
}
