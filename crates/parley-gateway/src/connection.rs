use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_db::StoreError;
use parley_types::events::{ClientCommand, ServerEvent};
use parley_types::models::MessageView;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Commands read off the socket but not yet applied. The reader only stalls
/// once this many are waiting on the store.
const COMMAND_QUEUE: usize = 256;

/// Drive one WebSocket connection from registration to cleanup:
/// replay history, relay events both ways, then forget the connection.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher) {
    let (mut sender, receiver) = socket.split();

    let attachment = dispatcher.connect().await;
    let conn_id = attachment.conn_id;
    info!("Connection {} opened", conn_id);

    let first = first_event(conn_id, attachment.history);
    if send_event(&mut sender, &first).await.is_err() {
        dispatcher.disconnect(conn_id).await;
        return;
    }

    run_connection_loop(
        sender,
        receiver,
        &dispatcher,
        conn_id,
        attachment.broadcast_rx,
        attachment.direct_rx,
    )
    .await;

    dispatcher.disconnect(conn_id).await;
    info!("Connection {} closed", conn_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: &Dispatcher,
    conn_id: Uuid,
    mut broadcast_rx: broadcast::Receiver<ServerEvent>,
    mut direct_rx: mpsc::UnboundedReceiver<ServerEvent>,
) {
    let commands = spawn_command_worker(dispatcher.clone(), conn_id);
    let resync_dispatcher = dispatcher.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            match resync(&resync_dispatcher, conn_id, &mut broadcast_rx, n).await {
                                Some(event) => event,
                                None => break,
                            }
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                result = direct_rx.recv() => {
                    let Some(event) = result else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Connection {} heartbeat timeout (missed {} pongs)", conn_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => {
                        if commands.send(cmd).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            truncate(&text, 200)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

/// The opening event: the full history, or an `error` when it can't be read.
/// A partial list is never replayed.
fn first_event(conn_id: Uuid, history: Result<Vec<MessageView>, StoreError>) -> ServerEvent {
    match history {
        Ok(history) => ServerEvent::LoadMessages(history),
        Err(e) => {
            error!("History replay for {} failed: {}", conn_id, e);
            ServerEvent::Error {
                message: e.to_string(),
            }
        }
    }
}

/// Replace a receiver that fell behind the broadcast buffer and hand back a
/// fresh `load messages` covering what it skipped. `None` closes the
/// connection so the client reconnects and replays.
async fn resync(
    dispatcher: &Dispatcher,
    conn_id: Uuid,
    broadcast_rx: &mut broadcast::Receiver<ServerEvent>,
    skipped: u64,
) -> Option<ServerEvent> {
    warn!("Connection {} lagged by {} broadcasts, resyncing", conn_id, skipped);
    let (fresh, history) = dispatcher.resubscribe().await;
    *broadcast_rx = fresh;
    match history {
        Ok(history) => Some(ServerEvent::LoadMessages(history)),
        Err(e) => {
            error!("Resync for {} failed, closing: {}", conn_id, e);
            None
        }
    }
}

/// Apply commands one at a time, in arrival order, off the socket reader so
/// Pongs are still read while the store is slow. The worker is detached and
/// drains what was already queued after the connection closes.
fn spawn_command_worker(dispatcher: Dispatcher, conn_id: Uuid) -> mpsc::Sender<ClientCommand> {
    let (tx, mut rx) = mpsc::channel(COMMAND_QUEUE);
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            handle_command(&dispatcher, conn_id, cmd).await;
        }
    });
    tx
}

/// Apply one client command. Store failures go back to the sender only.
async fn handle_command(dispatcher: &Dispatcher, conn_id: Uuid, cmd: ClientCommand) {
    let outcome = match cmd {
        ClientCommand::SetUsername(name) => {
            dispatcher.set_username(conn_id, name).await;
            Ok(())
        }

        ClientCommand::ChatMessage { text } => {
            dispatcher.chat_message(conn_id, text).await.map(|_| ())
        }

        ClientCommand::FileMessage { file_url, file_name } => dispatcher
            .file_message(conn_id, file_url, file_name)
            .await
            .map(|_| ()),

        ClientCommand::ChatReaction {
            message_id,
            reaction,
        } => dispatcher
            .chat_reaction(message_id, reaction)
            .await
            .map(|_| ()),

        ClientCommand::JoinPrivate { room_id } => {
            dispatcher.join_private(conn_id, room_id).await;
            Ok(())
        }

        ClientCommand::LeavePrivate { room_id } => {
            dispatcher.leave_private(conn_id, room_id).await;
            Ok(())
        }

        ClientCommand::PrivateMessage {
            room_id,
            sender,
            message,
        } => {
            let delivered = dispatcher.private_message(&room_id, sender, message).await;
            debug!("Private message in {} delivered to {} connection(s)", room_id, delivered);
            Ok(())
        }
    };

    if let Err(e) = outcome {
        warn!("Connection {} command failed: {}", conn_id, e);
        dispatcher
            .send_to(
                conn_id,
                ServerEvent::Error {
                    message: e.to_string(),
                },
            )
            .await;
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode {}: {}", event.name(), e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
