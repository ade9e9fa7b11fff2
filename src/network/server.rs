//! Castle Table Server
//!
//! Hosts the one Castle table over WebSockets.
//! Accepts connections, parses frames and routes them through the table
//! session under a single write lock.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio::time::{interval, timeout};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::game::state::TableConfig;
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::network::registry::{short_id, ConnectionId};
use crate::network::session::{dispatch, TableSession};

/// Listener settings for the table server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket to listen on.
    pub bind_addr: SocketAddr,
    /// Sockets beyond this are dropped at accept.
    pub max_connections: usize,
    /// Silence after which a connection is closed.
    pub idle_timeout: Duration,
    /// Reported to clients in `joined`.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 64,
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `CASTLE_*` environment variables.
    pub fn from_env() -> Result<Self, GameServerError> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("CASTLE_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|_| GameServerError::Config(format!("invalid CASTLE_BIND_ADDR: {}", addr)))?;
        }
        if let Ok(max) = std::env::var("CASTLE_MAX_CONNECTIONS") {
            config.max_connections = max
                .parse()
                .map_err(|_| GameServerError::Config(format!("invalid CASTLE_MAX_CONNECTIONS: {}", max)))?;
        }
        if let Ok(secs) = std::env::var("CASTLE_IDLE_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| GameServerError::Config(format!("invalid CASTLE_IDLE_TIMEOUT_SECS: {}", secs)))?;
            config.idle_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Failures of the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Listener could not be opened.
    #[error("Could not bind listener: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Handshake or frame failure.
    #[error("WebSocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Bad configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// WebSocket front end for a single table.
pub struct GameServer {
    config: ServerConfig,
    /// The table and its connections.
    session: Arc<RwLock<TableSession>>,
    /// Fired once on shutdown.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Server with a fresh table built from `table_config`.
    pub fn new(config: ServerConfig, table_config: TableConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            session: Arc::new(RwLock::new(
                TableSession::new(table_config).with_server_version(config.version.clone()),
            )),
            config,
            shutdown_tx,
        }
    }

    /// Shared handle to the table session.
    pub fn session(&self) -> Arc<RwLock<TableSession>> {
        self.session.clone()
    }

    /// Run the server until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Castle server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Accept connections on an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let cleanup_session = self.session.clone();
        let idle_timeout = self.config.idle_timeout;

        // Idle sweeper
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_session, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let count = self.session.read().await.connection_count();
                            if count >= self.config.max_connections {
                                warn!("Table at {} connections, dropping {}", self.config.max_connections, addr);
                                continue;
                            }

                            debug!("Accepted {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("accept() failed: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Listener stopping");
                    break;
                }
            }
        }

        cleanup_handle.abort();

        Ok(())
    }

    /// Upgrade a socket and run its reader and writer until it goes away.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let session = self.session.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("Handshake with {} failed: {}", addr, e);
                    return;
                }
            };

            let conn_id: ConnectionId = uuid::Uuid::new_v4().into_bytes();
            let short = short_id(&conn_id);
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<ServerMessage>();

            // Register; the registry holds the only sender, so dropping the
            // registration ends the writer below.
            {
                let mut session = session.write().await;
                dispatch(session.connect(conn_id, msg_tx));
            }

            // Writer
            let writer_short = short.clone();
            let mut writer = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Dropping unserializable {} message: {}", writer_short, e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                let _ = ws_sender.send(Message::Close(None)).await;
            });
            let mut writer_done = false;

            // Reader
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                // Queue under the guard so views leave in mutation order
                                let mut session = session.write().await;
                                let deliveries = match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => session.handle(conn_id, client_msg),
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", short, e);
                                        session.malformed(conn_id, "Invalid message format")
                                    }
                                };
                                dispatch(deliveries);
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let mut session = session.write().await;
                                dispatch(session.malformed(conn_id, "Binary frames are not supported"));
                            }
                            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                                session.write().await.touch(&conn_id);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", short);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", short, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = &mut writer, if !writer_done => {
                        // Registration dropped (idle cleanup) or socket closed
                        writer_done = true;
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let session = session.read().await;
                        dispatch(session.notice(conn_id, ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }));
                        break;
                    }
                }
            }

            // Keep the player record, release the seat binding
            {
                let mut session = session.write().await;
                let deliveries = session.disconnect(&conn_id);
                dispatch(deliveries);
            }

            if !writer_done && timeout(Duration::from_secs(2), &mut writer).await.is_err() {
                writer.abort();
            }

            info!("Client {} ({}) cleaned up", short, addr);
        });
    }

    /// Close connections that have gone quiet.
    async fn run_cleanup_loop(session: Arc<RwLock<TableSession>>, idle_timeout: Duration) {
        let mut interval = interval(idle_timeout.min(Duration::from_secs(60)));

        loop {
            interval.tick().await;

            let idle = session.read().await.idle_connections(idle_timeout);
            for conn in idle {
                let mut session = session.write().await;
                let deliveries = session.disconnect(&conn);
                dispatch(deliveries);
                info!("Removed idle client {}", short_id(&conn));
            }
        }
    }

    /// Notify every connection and stop accepting.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Open sockets, bound or not.
    pub async fn connection_count(&self) -> usize {
        self.session.read().await.connection_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Phase, PlayerId};
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start(server: &Arc<GameServer>) -> (String, tokio::task::JoinHandle<Result<(), GameServerError>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = server.clone();
        (format!("ws://{}", addr), tokio::spawn(async move { running.serve(listener).await }))
    }

    async fn join_and_wait(mut ws: Client, id: String) -> Client {
        let join = ClientMessage::JoinLobby { player_id: PlayerId::from(id.as_str()), display_name: id.clone() };
        ws.send(Message::Text(join.to_json().unwrap())).await.unwrap();
        loop {
            let frame = ws.next().await.unwrap().unwrap();
            if let Ok(ServerMessage::Joined { .. }) = ServerMessage::from_json(frame.to_text().unwrap()) {
                return ws;
            }
        }
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            version: "castle-test".to_string(),
            ..Default::default()
        }
    }

    fn seeded() -> TableConfig {
        TableConfig { rng_seed: Some(11), ..Default::default() }
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 64);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[tokio::test]
    async fn test_new_server_has_empty_lobby() {
        let server = GameServer::new(test_config(), seeded());
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.session().read().await.table().phase(), Phase::Lobby);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Arc::new(GameServer::new(test_config(), seeded()));

        let running = server.clone();
        let handle = tokio::spawn(async move { running.serve(listener).await });

        // serve() subscribes after spawning; repeat until it has heard
        for _ in 0..100 {
            server.shutdown();
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let result = timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_join_over_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(GameServer::new(test_config(), seeded()));

        let running = server.clone();
        let handle = tokio::spawn(async move { running.serve(listener).await });

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        // Greeting
        let first = ws.next().await.unwrap().unwrap();
        let greeting = ServerMessage::from_json(first.to_text().unwrap()).unwrap();
        assert!(matches!(greeting, ServerMessage::PublicState(_)));

        let join = ClientMessage::JoinLobby {
            player_id: crate::game::state::PlayerId::from("alice"),
            display_name: "Alice".to_string(),
        };
        ws.send(Message::Text(join.to_json().unwrap())).await.unwrap();

        let reply = ws.next().await.unwrap().unwrap();
        let joined = ServerMessage::from_json(reply.to_text().unwrap()).unwrap();
        assert!(matches!(
            joined,
            ServerMessage::Joined { rejoined: false, ref server_version, .. } if server_version == "castle-test"
        ));
        assert_eq!(server.connection_count().await, 1);

        ws.send(Message::Text("{\"type\":\"nope\"}".to_string())).await.unwrap();
        let mut saw_error = false;
        for _ in 0..4 {
            let msg = ws.next().await.unwrap().unwrap();
            if let ServerMessage::Error(err) = ServerMessage::from_json(msg.to_text().unwrap()).unwrap() {
                assert_eq!(err.code, crate::network::protocol::ErrorCode::InvalidMessage);
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);

        server.shutdown();
        let _ = handle.await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_leave_watcher_current() {
        for trial in 0..10 {
            let server = Arc::new(GameServer::new(test_config(), seeded()));
            let (url, handle) = start(&server).await;

            let (mut watcher, _) = connect_async(&url).await.unwrap();
            let mut joins = Vec::new();
            for i in 0..9 {
                let (ws, _) = connect_async(&url).await.unwrap();
                joins.push(tokio::spawn(join_and_wait(ws, format!("p{}", i))));
            }
            let mut seated = Vec::new();
            for join in joins {
                seated.push(join.await.unwrap());
            }

            // Every join's broadcast is queued before its `joined` goes out
            let mut last_players = None;
            while let Ok(Some(Ok(frame))) = timeout(Duration::from_millis(200), watcher.next()).await {
                if let Ok(ServerMessage::PublicState(view)) = ServerMessage::from_json(frame.to_text().unwrap()) {
                    last_players = Some(view.players.len());
                }
            }
            assert_eq!(last_players, Some(9), "trial {}", trial);
            assert_eq!(server.session().read().await.table().players().len(), 9);

            server.shutdown();
            let _ = handle.await;
            drop(seated);
        }
    }

    #[tokio::test]
    async fn test_websocket_ping_counts_as_activity() {
        let server = Arc::new(GameServer::new(test_config(), seeded()));
        let (url, handle) = start(&server).await;

        let (mut ws, _) = connect_async(&url).await.unwrap();
        ws.next().await.unwrap().unwrap();

        let quiet = Duration::from_millis(150);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(server.session().read().await.idle_connections(quiet).len(), 1);

        ws.send(Message::Ping(vec![7])).await.unwrap();
        let reply = timeout(Duration::from_secs(2), ws.next()).await.unwrap().unwrap().unwrap();
        assert!(matches!(reply, Message::Pong(_)));

        let mut fresh = false;
        for _ in 0..50 {
            if server.session().read().await.idle_connections(quiet).is_empty() {
                fresh = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(fresh);

        server.shutdown();
        let _ = handle.await;
    }
}
