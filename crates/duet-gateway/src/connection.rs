use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use duet_types::events::{ClientCommand, ServerEvent};

use crate::coordinator::SessionCoordinator;
use crate::dispatcher::Dispatcher;

/// If this many Pongs in a row go missing, the connection is dropped.
const MAX_MISSED_HEARTBEATS: u8 = 2;

/// Handle a single WebSocket connection from accept to teardown.
///
/// Outbound events are drained by a send task that also drives the heartbeat.
/// Inbound frames are parsed and fed to the session's coordinator on this
/// task, so each command is applied to completion before the next is read.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, heartbeat: Duration) {
    let (sender, mut receiver) = socket.split();

    let (session_id, events_rx) = dispatcher.register_session().await;
    info!("session {} connected to gateway", session_id);

    let mut coordinator = SessionCoordinator::new(session_id, dispatcher);

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();

    let mut send_task = tokio::spawn(run_send_loop(sender, events_rx, heartbeat, pong_flag_send));

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            frame = receiver.next() => {
                let Some(Ok(msg)) = frame else { break };
                match msg {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientCommand>(text.as_str()) {
                            Ok(cmd) => coordinator.handle_command(cmd).await,
                            Err(e) => {
                                warn!(
                                    "session {} bad command: {} -- raw: {}",
                                    session_id,
                                    e,
                                    truncate(text.as_str(), 200)
                                );
                            }
                        }
                    }
                    Message::Pong(_) => {
                        pong_received.store(true, Ordering::Release);
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    send_task.abort();
    coordinator.disconnect().await;
    info!("session {} disconnected from gateway", session_id);
}

/// Forward queued events to the client and ping it every `heartbeat`.
/// Returns when the client is unreachable or the queue closes.
async fn run_send_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut events_rx: mpsc::UnboundedReceiver<ServerEvent>,
    heartbeat: Duration,
    pong_flag: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                let Some(text) = encode_event(&event) else { continue };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if pong_flag.swap(false, Ordering::Acquire) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= MAX_MISSED_HEARTBEATS {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                        break;
                    }
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn encode_event(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("failed to encode {} event: {}", event.kind(), e);
            None
        }
    }
}

/// Cut `text` to at most `max` bytes on a char boundary, for log lines.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
