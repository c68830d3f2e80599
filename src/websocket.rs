use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{self, Message},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::presence::PresenceHandle;
use crate::types::{Ack, InboundMessage, SessionState};

pub struct SocketServer {
    listener: TcpListener,
    session: SessionState,
    presence: PresenceHandle,
}

impl SocketServer {
    /// Binds on loopback. Port 0 picks a free port.
    pub async fn bind(
        port: u16,
        session: SessionState,
        presence: PresenceHandle,
    ) -> std::io::Result<Self> {
        let addr = format!("127.0.0.1:{}", port);

        match TcpListener::bind(&addr).await {
            Ok(listener) => Ok(Self {
                listener,
                session,
                presence,
            }),
            Err(e) => {
                error!("Failed to bind to {}: {}", addr, e);
                error!("This usually means:");
                error!("  1. Another instance of the relay is running");
                error!("  2. The port is occupied by another process");
                error!("  3. Permission denied for this port");
                Err(e)
            }
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` fires. Each connection gets its
    /// own task; all of them share one session.
    pub async fn run(self, shutdown: CancellationToken) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("WebSocket server listening on: ws://{}", addr);
        }

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    let session = self.session.clone();
                    let presence = self.presence.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, session, presence).await {
                            error!("Error handling connection from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            }
        }

        info!("WebSocket server stopped accepting connections");
    }
}

async fn handle_connection(
    raw_stream: TcpStream,
    addr: SocketAddr,
    session: SessionState,
    presence: PresenceHandle,
) -> Result<(), tungstenite::Error> {
    let ws_stream = accept_async(raw_stream).await?;
    let client_id = Uuid::new_v4().to_string();

    info!("New WebSocket connection: {} with ID: {}", addr, client_id);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break,
            Err(tungstenite::Error::Protocol(
                tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
            )) => {
                debug!("Client {} dropped without a close handshake", client_id);
                break;
            }
            Err(e) => return Err(e),
        };

        match msg {
            Message::Text(text) => {
                let ack = handle_text(&text, &session, &presence, unix_now()).await;
                if let Ack::Error(ref reason) = ack {
                    warn!("Rejected message from {}: {}", client_id, reason);
                }
                ws_sender.send(Message::Text(ack.to_string())).await?;
            }
            Message::Binary(_) => {
                debug!("Received binary message (not supported)");
            }
            Message::Close(_) => {
                info!("Client {} disconnected", client_id);
                break;
            }
            _ => {}
        }
    }

    info!("Connection {} closed", client_id);
    Ok(())
}

/// Parses one text frame, applies it to the session and forwards the
/// resulting presence command. Returns the acknowledgement to send back.
pub async fn handle_text(
    text: &str,
    session: &SessionState,
    presence: &PresenceHandle,
    now: i64,
) -> Ack {
    let message = match serde_json::from_str::<InboundMessage>(text) {
        Ok(message) => message,
        Err(e) => return Ack::Error(e.to_string()),
    };
    debug!("Received payload: {:?}", message);

    // Queue the command under the lock so presence order matches state order.
    let mut session = session.lock().await;
    let transition = session.apply(&message, now);
    if let Some(command) = transition.command {
        presence.send(command);
    }
    transition.ack
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceCommand;
    use crate::session::{SessionSettings, SessionStateMachine};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use url::Url;

    fn session() -> SessionState {
        Arc::new(Mutex::new(SessionStateMachine::new(SessionSettings {
            image_base: Url::parse("https://x.com/").unwrap(),
            default_link: Url::parse("https://ostjourney.xyz/").unwrap(),
            large_text: "OST Journey".to_string(),
        })))
    }

    #[tokio::test]
    async fn malformed_json_is_reported_and_state_untouched() {
        let session = session();
        let (presence, mut rx) = PresenceHandle::channel();

        let ack = handle_text("{not json", &session, &presence, 0).await;
        assert!(matches!(ack, Ack::Error(_)));
        assert!(ack.to_string().starts_with("error: "));

        let ack = handle_text(r#"{"title": 5}"#, &session, &presence, 0).await;
        assert!(matches!(ack, Ack::Error(ref reason) if reason.contains("invalid type")));

        assert!(session.lock().await.song().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn commands_are_forwarded_to_presence() {
        let session = session();
        let (presence, mut rx) = PresenceHandle::channel();

        let ack = handle_text(
            r#"{"title":"A","artist":"B","image":"a.png","duration":180}"#,
            &session,
            &presence,
            1_000,
        )
        .await;
        assert_eq!(ack, Ack::Updated);
        assert!(matches!(rx.try_recv(), Ok(PresenceCommand::Update(ref a)) if a.large_image == "https://x.com/a.png"));

        let ack = handle_text(r#"{"paused":true}"#, &session, &presence, 1_010).await;
        assert_eq!(ack, Ack::Paused);
        assert_eq!(rx.try_recv().ok(), Some(PresenceCommand::Clear));

        let ack = handle_text(r#"{"foo":1}"#, &session, &presence, 1_011).await;
        assert_eq!(ack, Ack::Invalid);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn last_applied_message_is_last_presence_command() {
        let session = session();
        let (presence, mut rx) = PresenceHandle::channel();
        handle_text(
            r#"{"title":"A","artist":"B","image":"a.png","duration":600}"#,
            &session,
            &presence,
            1_000,
        )
        .await;

        let tasks: Vec<_> = (0..64)
            .map(|position| {
                let session = session.clone();
                let presence = presence.clone();
                tokio::spawn(async move {
                    let seek = format!(r#"{{"currentTime":{}}}"#, position);
                    handle_text(&seek, &session, &presence, 1_000).await
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), Ack::Updated);
        }

        let mut last_start = None;
        while let Ok(command) = rx.try_recv() {
            if let PresenceCommand::Update(activity) = command {
                last_start = Some(activity.start);
            }
        }
        let final_start = session.lock().await.song().unwrap().start_time;
        assert_eq!(last_start, Some(final_start));
    }
}
