//! WebSocket session wiring.
//!
//! Each connection gets exactly one executor. Outbound frames funnel
//! through an unbounded channel drained by a single forwarder task, so a
//! frame is always written whole; the read loop is single-threaded and
//! dispatches client actions. Teardown always closes the executor so the
//! scratch directory and any profile blobs are reclaimed.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use codepad_core::exec::{Executor, StartAction};
use codepad_core::frame::{Action, Frame, FrameSender};

use crate::routes::AppState;

/// Raw inbound frame. The action stays a string so unknown actions can be
/// echoed back in the error status.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InboundFrame {
    action: String,
    data: String,
}

/// Drive one WebSocket connection until it closes.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let client = state.client_seq.fetch_add(1, Ordering::SeqCst) + 1;
    let active = state.clients_active.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::info!("websocket client {client} connected ({active} active)");

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let executor = match Executor::new(
        state.toolchain.clone(),
        state.blobs.clone(),
        FrameSender::new(tx.clone()),
    ) {
        Ok(executor) => executor,
        Err(e) => {
            tracing::error!("client {client}: failed to create executor: {e}");
            let active = state.clients_active.fetch_sub(1, Ordering::SeqCst) - 1;
            tracing::info!("websocket client {client} disconnected ({active} active)");
            return;
        }
    };

    // Forward frames to the socket. A write failure is permanent: drop
    // the receiver and let the session wind down.
    let forward_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&frame) else {
                continue;
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            _ => continue,
        };
        let frame: InboundFrame = serde_json::from_str(&text).unwrap_or_default();
        if frame.action != "ClearOutput" {
            tracing::info!("{} action by client {client}", frame.action);
        }
        match frame.action.as_str() {
            "Run" => executor.start(StartAction::Run, frame.data).await,
            "Format" => executor.start(StartAction::Format, frame.data).await,
            "Stop" => executor.stop().await,
            // Echoed back untouched: the client uses it as a fence to know
            // every preceding message has been drained.
            "ClearOutput" => {
                let _ = tx.send(Frame::new(Action::ClearOutput, ""));
            }
            other => {
                let _ = tx.send(Frame::new(
                    Action::StatusUpdate,
                    format!("Unknown action: {other}\n"),
                ));
            }
        }
    }

    executor.close().await;
    drop(executor);
    drop(tx);
    let _ = forward_task.await;

    let active = state.clients_active.fetch_sub(1, Ordering::SeqCst) - 1;
    tracing::info!("websocket client {client} disconnected ({active} active)");
}
