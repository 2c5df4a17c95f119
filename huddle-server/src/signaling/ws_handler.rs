use crate::SignalingService;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(service): State<SignalingService>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, service))
}

async fn handle_socket(socket: WebSocket, service: SignalingService) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut conn = service.connect(tx);
    info!("New WebSocket connection");

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // The reader stays on this task so the connection is still ours to release.
    loop {
        tokio::select! {
            _ = (&mut send_task) => break,

            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => service.handle_text(&mut conn, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(other)) => debug!("Ignoring non-text frame: {:?}", other),
                Some(Err(e)) => {
                    warn!("WebSocket read failed: {}", e);
                    break;
                }
            },
        }
    }
    send_task.abort();

    let user = conn.user().map(ToString::to_string);
    service.disconnect(conn);
    info!(
        "WebSocket disconnected: {}",
        user.as_deref().unwrap_or("<unregistered>")
    );
}
