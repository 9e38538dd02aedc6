//! Transport adapter: TCP and WebSocket endpoints.
//!
//! Both endpoints feed the same pipeline: one inbound frame is one command
//! line, one outbound frame is one JSON object. On TCP, frames are newline
//! delimited; on WebSocket they are text messages. Each connection runs a
//! single task that multiplexes the socket with the session's outbound
//! queue, so frames are delivered to a client exactly in the order the core
//! emitted them.

use crate::game::SharedGameTable;
use crate::lobby::LobbyCommand;
use crate::router;
use crate::session::{SessionId, SharedRegistry, OUTBOUND_QUEUE};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Handles shared by every connection task.
pub struct ServerState {
    pub registry: SharedRegistry,
    pub games: SharedGameTable,
    pub lobby_tx: mpsc::Sender<LobbyCommand>,
}

/// Accept loop for the newline-delimited TCP endpoint.
pub async fn serve_tcp(listener: TcpListener, state: Arc<ServerState>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(handle_tcp_client(stream, addr, state));
            }
            Err(err) => {
                error!("TCP accept error: {}", err);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

/// Accept loop for the WebSocket endpoint.
pub async fn serve_ws(listener: TcpListener, state: Arc<ServerState>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(handle_ws_client(stream, addr, state));
            }
            Err(err) => {
                error!("WebSocket accept error: {}", err);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

/// Registers the session with the lobby worker and waits for its id.
async fn register_session(
    state: &ServerState,
) -> Option<(SessionId, mpsc::Receiver<String>)> {
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .lobby_tx
        .send(LobbyCommand::Open {
            outbound: out_tx,
            reply: reply_tx,
        })
        .await
        .ok()?;
    let session_id = reply_rx.await.ok()?;
    Some((session_id, out_rx))
}

async fn handle_tcp_client(stream: TcpStream, addr: SocketAddr, state: Arc<ServerState>) {
    info!("TCP connection from {}", addr);
    let Some((session_id, mut out_rx)) = register_session(&state).await else {
        return;
    };

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        router::dispatch(
                            session_id,
                            &line,
                            &state.registry,
                            &state.games,
                            &state.lobby_tx,
                        )
                        .await;
                    }
                    Ok(None) => break,
                    Err(err) => {
                        debug!("Read error from {}: {}", addr, err);
                        break;
                    }
                }
            }
            frame = out_rx.recv() => {
                match frame {
                    Some(json) => {
                        if write_half.write_all(json.as_bytes()).await.is_err()
                            || write_half.write_all(b"\n").await.is_err()
                        {
                            break;
                        }
                    }
                    // The server dropped the session (forced disconnect).
                    None => break,
                }
            }
        }
    }

    let _ = state
        .lobby_tx
        .send(LobbyCommand::Disconnect { session_id })
        .await;
    info!("TCP connection {} closed", addr);
}

async fn handle_ws_client(stream: TcpStream, addr: SocketAddr, state: Arc<ServerState>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!("WebSocket handshake with {} failed: {}", addr, err);
            return;
        }
    };
    info!("WebSocket connection from {}", addr);

    let Some((session_id, mut out_rx)) = register_session(&state).await else {
        return;
    };
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(line))) => {
                        router::dispatch(
                            session_id,
                            &line,
                            &state.registry,
                            &state.games,
                            &state.lobby_tx,
                        )
                        .await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary: not part of the protocol
                    Some(Err(err)) => {
                        debug!("WebSocket error from {}: {}", addr, err);
                        break;
                    }
                }
            }
            frame = out_rx.recv() => {
                match frame {
                    Some(json) => {
                        if ws_tx.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = state
        .lobby_tx
        .send(LobbyCommand::Disconnect { session_id })
        .await;
    info!("WebSocket connection {} closed", addr);
}
