//! WebSocket Game Server
//!
//! Front door for player connections. Each upgrade request must carry a
//! `username` query parameter; the connection is then either re-attached to
//! that player's suspended session or handed to the matchmaker.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, instrument, warn};

use crate::game::board::CONNECT;
use crate::network::matchmaker::{Matchmaker, MatchmakerError, MatchmakerHandle};
use crate::network::runner::MatchServices;
use crate::network::session::SessionConfig;
use crate::network::transport::{Transport, WsTransport};
use crate::ranking::ResultSink;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Server version string.
    pub version: String,
    /// Match tuning.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
            session: SessionConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },

    /// Parsed but out of range.
    #[error("{key} {reason}")]
    OutOfRange {
        /// Variable name.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let session = &mut config.session;

        if let Some(v) = parse(&lookup, "CONNECT_FOUR_BIND_ADDR")? {
            config.bind_addr = v;
        }
        if let Some(v) = parse(&lookup, "CONNECT_FOUR_MAX_CONNECTIONS")? {
            config.max_connections = v;
        }
        if let Some(v) = parse(&lookup, "BOARD_ROWS")? {
            session.rows = v;
        }
        if let Some(v) = parse(&lookup, "BOARD_COLUMNS")? {
            session.cols = v;
        }
        if let Some(v) = parse(&lookup, "MATCHMAKING_TIMEOUT_SECS")? {
            session.matchmaking_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse(&lookup, "RECONNECT_TIMEOUT_SECS")? {
            session.reconnect_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse(&lookup, "RECONNECT_CACHE_CAPACITY")? {
            session.reconnect_capacity = v;
        }
        if let Some(v) = parse(&lookup, "AI_SEARCH_DEPTH")? {
            session.ai_depth = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if session.rows < CONNECT {
            return Err(ConfigError::OutOfRange {
                key: "BOARD_ROWS",
                reason: "must be at least 4",
            });
        }
        if session.cols < CONNECT {
            return Err(ConfigError::OutOfRange {
                key: "BOARD_COLUMNS",
                reason: "must be at least 4",
            });
        }
        // Human matches occupy two keys.
        if session.reconnect_capacity < 2 {
            return Err(ConfigError::OutOfRange {
                key: "RECONNECT_CACHE_CAPACITY",
                reason: "must be at least 2",
            });
        }
        if session.ai_depth == 0 {
            return Err(ConfigError::OutOfRange {
                key: "AI_SEARCH_DEPTH",
                reason: "must be at least 1",
            });
        }
        if self.max_connections == 0 {
            return Err(ConfigError::OutOfRange {
                key: "CONNECT_FOUR_MAX_CONNECTIONS",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Upgrade request had no usable `username`.
    #[error("Missing username")]
    MissingUsername,

    /// Matchmaker stopped.
    #[error("Matchmaking error: {0}")]
    Matchmaking(#[from] MatchmakerError),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Registry, cache, sink.
    services: Arc<MatchServices>,
    /// Connection slots.
    connections: Arc<Semaphore>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server reporting results to `sink`.
    pub fn new(config: ServerConfig, sink: Arc<dyn ResultSink>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let services = MatchServices::new(config.session.clone(), sink);
        let connections = Arc::new(Semaphore::new(config.max_connections));

        Self {
            config,
            services,
            connections,
            shutdown_tx,
        }
    }

    /// Shared match services.
    pub fn services(&self) -> &Arc<MatchServices> {
        &self.services
    }

    /// Handle that stops [`GameServer::run`] when sent to.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run the server until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server v{} listening on {}", self.config.version, self.config.bind_addr);
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let (matchmaker, matchmaking_handle) = Matchmaker::spawn(self.services.clone());
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let Ok(permit) = self.connections.clone().try_acquire_owned() else {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            };
                            debug!("New connection from {}", addr);
                            let services = self.services.clone();
                            let matchmaker = matchmaker.clone();
                            tokio::spawn(async move {
                                let (username, ws) = match accept_player(stream, addr).await {
                                    Ok(accepted) => accepted,
                                    Err(e) => {
                                        warn!("Handshake failed for {}: {}", addr, e);
                                        return;
                                    }
                                };
                                let transport = ws.hold_permit(permit);
                                let peer = transport.peer();
                                if let Err(e) = route_player(&services, &matchmaker, username, Arc::new(transport)).await {
                                    error!("Failed to place {}: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        matchmaking_handle.abort();
        Ok(())
    }
}

/// Upgrade the connection, reading the player's identity from the request.
async fn accept_player(
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<(String, WsTransport<TcpStream>), GameServerError> {
    let mut username = None;
    let callback = |request: &Request, response: Response| {
        match username_from_query(request.uri().query()) {
            Some(name) => {
                username = Some(name);
                Ok(response)
            }
            None => {
                let mut rejection = ErrorResponse::new(Some("username is required".to_string()));
                *rejection.status_mut() = StatusCode::BAD_REQUEST;
                Err(rejection)
            }
        }
    };
    let ws = accept_hdr_async(stream, callback).await?;
    let username = username.ok_or(GameServerError::MissingUsername)?;
    info!(player = %username, %addr, "player connected");
    Ok((username, WsTransport::new(ws, addr)))
}

/// Resume the session the player is away from, or queue them for a new one.
///
/// A player whose seat in a suspended session is still connected (a second
/// tab, say) is queued rather than resumed.
pub async fn route_player(
    services: &MatchServices,
    matchmaker: &MatchmakerHandle,
    username: String,
    transport: Arc<dyn Transport>,
) -> Result<(), GameServerError> {
    if let Some(entry) = services.cache.resume(&username).await {
        if entry.runner.reattach(&username, transport.clone()).await {
            return Ok(());
        }
    }
    matchmaker.enqueue(username, transport).await?;
    Ok(())
}

/// Extract a non-empty, percent-decoded `username` from a query string.
pub fn username_from_query(query: Option<&str>) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "username")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
