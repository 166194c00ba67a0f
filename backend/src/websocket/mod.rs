//! WebSocket channel for real-time notifications
//!
//! Each connection belongs to one authenticated user and only receives that
//! user's notifications, optionally narrowed to a set of kinds.

use axum::{
    async_trait,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use crate::middleware::AuthenticatedUser;
use crate::notification::{Notification, NotificationSink};

/// WebSocket server state
#[derive(Clone)]
pub struct WsState {
    pub tx: broadcast::Sender<Notification>,
    pub clients: Arc<RwLock<HashMap<String, ClientInfo>>>,
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub client_id: String,
    pub user_id: Uuid,
    /// Empty means every kind
    pub subscribed_kinds: Vec<String>,
}

impl ClientInfo {
    fn wants(&self, notification: &Notification) -> bool {
        notification.user_id == self.user_id
            && (self.subscribed_kinds.is_empty()
                || self.subscribed_kinds.contains(&notification.kind))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientMessage {
    Subscribe { kinds: Vec<String> },
    Unsubscribe { kinds: Vec<String> },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ServerMessage {
    Notification { notification: Notification },
    Subscribed { kinds: Vec<String> },
    Unsubscribed { kinds: Vec<String> },
    Pong,
}

impl Default for WsState {
    fn default() -> Self {
        Self::new()
    }
}

impl WsState {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            tx,
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn connected_clients(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn register_client(&self, client_id: String, user_id: Uuid) {
        let mut clients = self.clients.write().await;
        clients.insert(
            client_id.clone(),
            ClientInfo {
                client_id,
                user_id,
                subscribed_kinds: vec![],
            },
        );
    }

    async fn unregister_client(&self, client_id: &str) {
        self.clients.write().await.remove(client_id);
        tracing::info!(client_id, "WebSocket client disconnected");
    }

    async fn update_subscriptions(&self, client_id: &str, kinds: Vec<String>) {
        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get_mut(client_id) {
            client.subscribed_kinds = kinds;
        }
    }
}

#[async_trait]
impl NotificationSink for WsState {
    fn name(&self) -> &'static str {
        "websocket"
    }

    /// No connected receiver is not a failure: the stored copy remains
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        if self.tx.receiver_count() > 0 {
            self.tx
                .send(notification.clone())
                .map_err(|e| anyhow::anyhow!("broadcast failed: {}", e))?;
        }
        Ok(())
    }
}

/// Upgrade an authenticated HTTP connection
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    user: AuthenticatedUser,
    State(state): State<WsState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user.user_id))
}

async fn handle_socket(socket: WebSocket, state: WsState, user_id: Uuid) {
    let client_id = Uuid::new_v4().to_string();
    state.register_client(client_id.clone(), user_id).await;
    tracing::info!(client_id = %client_id, user_id = %user_id, "WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();
    let (internal_tx, mut internal_rx) = mpsc::channel::<ServerMessage>(32);

    let mut rx = state.tx.subscribe();
    let client_id_send = client_id.clone();
    let state_send = state.clone();

    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                received = rx.recv() => {
                    let notification = match received {
                        Ok(n) => n,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(client_id = %client_id_send, skipped, "WebSocket client lagging");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    let wanted = state_send
                        .clients
                        .read()
                        .await
                        .get(&client_id_send)
                        .map(|c| c.wants(&notification))
                        .unwrap_or(false);
                    if !wanted {
                        continue;
                    }
                    let msg = ServerMessage::Notification { notification };
                    if let Ok(text) = serde_json::to_string(&msg) {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(msg) = internal_rx.recv() => {
                    if let Ok(text) = serde_json::to_string(&msg) {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
                else => break,
            }
        }
    });

    let state_recv = state.clone();
    let client_id_recv = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) else {
                        continue;
                    };
                    match client_msg {
                        ClientMessage::Subscribe { kinds } => {
                            state_recv
                                .update_subscriptions(&client_id_recv, kinds.clone())
                                .await;
                            let _ = internal_tx.send(ServerMessage::Subscribed { kinds }).await;
                        }
                        ClientMessage::Unsubscribe { kinds } => {
                            let current = state_recv
                                .clients
                                .read()
                                .await
                                .get(&client_id_recv)
                                .map(|c| c.subscribed_kinds.clone());
                            if let Some(mut current) = current {
                                current.retain(|k| !kinds.contains(k));
                                state_recv.update_subscriptions(&client_id_recv, current).await;
                            }
                            let _ = internal_tx.send(ServerMessage::Unsubscribed { kinds }).await;
                        }
                        ClientMessage::Ping => {
                            let _ = internal_tx.send(ServerMessage::Pong).await;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.unregister_client(&client_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn notification(user_id: Uuid, kind: &str) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: kind.to_string(),
            title: "t".into(),
            message: "m".into(),
            link: None,
            read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_client_only_wants_own_notifications() {
        let user = Uuid::new_v4();
        let mut client = ClientInfo {
            client_id: "c".into(),
            user_id: user,
            subscribed_kinds: vec![],
        };
        assert!(client.wants(&notification(user, "INVOICE_PAID")));
        assert!(!client.wants(&notification(Uuid::new_v4(), "INVOICE_PAID")));

        client.subscribed_kinds = vec!["INVOICE_SENT".into()];
        assert!(!client.wants(&notification(user, "INVOICE_PAID")));
        assert!(client.wants(&notification(user, "INVOICE_SENT")));
    }

    #[tokio::test]
    async fn test_deliver_without_listeners_is_ok() {
        let state = WsState::new();
        assert!(state
            .deliver(&notification(Uuid::new_v4(), "INVOICE_SENT"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_deliver_reaches_subscribers() {
        let state = WsState::new();
        let mut rx = state.tx.subscribe();
        let user = Uuid::new_v4();
        state.deliver(&notification(user, "QUOTE_ACCEPTED")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().user_id, user);
    }
}
