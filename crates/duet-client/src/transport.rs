use std::time::Duration;

use anyhow::{Result, bail};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{info, warn};

use duet_types::events::{ClientCommand, ServerEvent};

use crate::input::UserInput;
use crate::session::ClientSession;
use crate::transcript::TranscriptEntry;

pub const DEFAULT_MAX_RECONNECTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// `ws://host:port/gateway`
    pub url: String,
    /// Consecutive failed connects (or drops) tolerated before giving up.
    pub max_reconnects: u32,
    /// Wait before retry n is `backoff * n`.
    pub backoff: Duration,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            backoff: Duration::from_secs(1),
        }
    }
}

enum Exit {
    Quit,
    Lost,
}

/// Run the client until the user quits or the relay stays unreachable.
///
/// Each connection rejoins the session's home room; after a drop the session
/// is reset and the next connection starts the key exchange from scratch.
pub async fn run<F>(
    session: &mut ClientSession,
    config: &TransportConfig,
    input: &mut mpsc::UnboundedReceiver<UserInput>,
    mut render: F,
) -> Result<()>
where
    F: FnMut(&TranscriptEntry),
{
    let mut failures: u32 = 0;

    loop {
        let attempt = while_offline(connect_async(config.url.as_str()), session, input, &mut render);
        let Some(attempt) = attempt.await else {
            return Ok(());
        };
        match attempt {
            Ok((socket, _)) => {
                info!("connected to {}", config.url);
                failures = 0;
                match drive(session, socket, input, &mut render).await {
                    Exit::Quit => return Ok(()),
                    Exit::Lost => {
                        session.transport_lost();
                        render_new(session, &mut render);
                    }
                }
            }
            Err(e) => warn!("could not reach {}: {}", config.url, e),
        }

        failures += 1;
        if failures > config.max_reconnects {
            bail!(
                "giving up on {} after {} reconnect attempts",
                config.url,
                config.max_reconnects
            );
        }
        let wait = config.backoff * failures;
        info!("reconnecting in {:?} (attempt {})", wait, failures);
        let backoff = while_offline(tokio::time::sleep(wait), session, input, &mut render);
        if backoff.await.is_none() {
            return Ok(());
        }
    }
}

/// Wait for `pending` while still serving the user. Drafts stay local, a
/// `/join` becomes the room for the next connection, and `/quit` (or closed
/// input) abandons the wait with `None`.
async fn while_offline<T, F>(
    pending: impl Future<Output = T>,
    session: &mut ClientSession,
    input: &mut mpsc::UnboundedReceiver<UserInput>,
    render: &mut F,
) -> Option<T>
where
    F: FnMut(&TranscriptEntry),
{
    tokio::pin!(pending);
    loop {
        tokio::select! {
            out = &mut pending => return Some(out),
            line = input.recv() => match line {
                None | Some(UserInput::Quit) => return None,
                Some(UserInput::Say(text)) => {
                    session.send(&text).await;
                }
                Some(UserInput::Join(room)) => {
                    session.join(room);
                }
            },
        }
        render_new(session, render);
    }
}

async fn drive<S, F>(
    session: &mut ClientSession,
    socket: S,
    input: &mut mpsc::UnboundedReceiver<UserInput>,
    render: &mut F,
) -> Exit
where
    S: futures_util::Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
    F: FnMut(&TranscriptEntry),
{
    let (mut sink, mut stream) = socket.split();

    let join = session.connected();
    if send_command(&mut sink, &join).await.is_err() {
        return Exit::Lost;
    }

    loop {
        let outgoing: Vec<ClientCommand> = tokio::select! {
            line = input.recv() => match line {
                None | Some(UserInput::Quit) => {
                    let _ = sink.close().await;
                    return Exit::Quit;
                }
                Some(UserInput::Say(text)) => session.send(&text).await.into_iter().collect(),
                Some(UserInput::Join(room)) => vec![session.join(room)],
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerEvent>(text.as_str()) {
                        Ok(event) => session.handle_event(event).await,
                        Err(e) => {
                            warn!("bad event from relay: {}", e);
                            Vec::new()
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return Exit::Lost,
                // Pings are answered by tungstenite itself.
                Some(Ok(_)) => Vec::new(),
            },
        };

        for cmd in &outgoing {
            if send_command(&mut sink, cmd).await.is_err() {
                return Exit::Lost;
            }
        }
        render_new(session, render);
    }
}

async fn send_command<S>(sink: &mut S, cmd: &ClientCommand) -> Result<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let text = serde_json::to_string(cmd)?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

fn render_new<F: FnMut(&TranscriptEntry)>(session: &mut ClientSession, render: &mut F) {
    for entry in session.transcript_mut().take_new() {
        render(entry);
    }
}
