//! WebSocket fan-out of reconciliation events.
//!
//! Every connected client receives every [`ReconcileEvent`] as a JSON text
//! frame. Slow clients may lag and miss events; publishing never blocks.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tablekeeper_core::{Notifier, ReconcileEvent};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::server::AppState;

/// Broadcast hub shared by the reconciler and the WebSocket handlers.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<ReconcileEvent>,
}

impl EventHub {
    /// Creates a hub buffering up to `capacity` events per client.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileEvent> {
        self.tx.subscribe()
    }
}

impl Notifier for EventHub {
    fn notify(&self, event: ReconcileEvent) {
        let request_id = event.request_id();
        match self.tx.send(event) {
            Ok(receivers) => debug!(%request_id, receivers, "Broadcast event"),
            Err(_) => debug!(%request_id, "No receivers for event"),
        }
    }
}

/// Upgrades `GET /api/ws` to a WebSocket streaming reconciliation events.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let events = state.events.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, events))
}

async fn handle_socket(socket: WebSocket, events: EventHub) {
    info!("WebSocket connected");
    let (mut sender, mut receiver) = socket.split();
    let mut rx = events.subscribe();

    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Close(_)) => break,
                Ok(_) => debug!("Ignoring client message"),
                Err(e) => {
                    warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            result = rx.recv() => match result {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize event");
                            continue;
                        }
                    };
                    if let Err(e) = sender.send(Message::Text(json.into())).await {
                        debug!(error = %e, "Failed to send event, closing connection");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Client lagged, some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut recv_task => break,
        }
    }

    recv_task.abort();
    info!("WebSocket disconnected");
}
