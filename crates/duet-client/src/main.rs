use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use duet_client::input::parse_line;
use duet_client::offload::OffloadChannel;
use duet_client::policy::{self, DEFAULT_MAX_FALLBACK_ATTEMPTS, JoinPolicy};
use duet_client::session::ClientSession;
use duet_client::transport::{self, DEFAULT_MAX_RECONNECTS, TransportConfig};
use duet_crypto::SealedBoxEngine;
use duet_types::models::{RoomName, RoomNameError};

/// End-to-end encrypted chat for exactly two people.
#[derive(Debug, Parser)]
#[command(name = "duet-chat", version)]
struct Args {
    /// Relay WebSocket URL
    #[arg(long, env = "DUET_SERVER_URL", default_value = "ws://127.0.0.1:3000/gateway")]
    server: String,

    /// Room to join; a random one if omitted
    #[arg(long, env = "DUET_ROOM", value_parser = parse_room)]
    room: Option<RoomName>,

    /// Random fallback rooms to try when the room is full
    #[arg(long, env = "DUET_MAX_FALLBACK", default_value_t = DEFAULT_MAX_FALLBACK_ATTEMPTS)]
    max_fallback_attempts: u32,

    /// Reconnect attempts after losing the relay
    #[arg(long, env = "DUET_MAX_RECONNECTS", default_value_t = DEFAULT_MAX_RECONNECTS)]
    max_reconnects: u32,
}

fn parse_room(value: &str) -> Result<RoomName, RoomNameError> {
    RoomName::new(value)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they don't interleave with the transcript
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet_client=info,duet_chat=info".into()),
        )
        .init();

    let args = Args::parse();

    let offload = OffloadChannel::spawn(SealedBoxEngine::new())?;
    let room = args.room.unwrap_or_else(policy::random_room);
    let mut session =
        ClientSession::start(offload, JoinPolicy::new(args.max_fallback_attempts), room).await?;

    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_line(&line) {
                Ok(Some(input)) => {
                    if input_tx.send(input).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            }
        }
    });

    let config = TransportConfig {
        max_reconnects: args.max_reconnects,
        ..TransportConfig::new(args.server)
    };
    transport::run(&mut session, &config, &mut input_rx, |entry| println!("{entry}")).await
}
