//! Match Session Management
//!
//! A [`MatchSession`] pairs one [`GameState`] (behind the per-session lock)
//! with the two seated players and their attachable transports.
//! [`SessionRegistry`] is the live-session map; a session sits either there
//! or in the reconnection cache, never both.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::debug;

use crate::game::board::{Seat, DEFAULT_COLUMNS, DEFAULT_ROWS};
use crate::game::state::{GameState, SessionId};
use crate::network::protocol::ServerMessage;
use crate::network::transport::Transport;

/// Identity used for the computer opponent.
pub const BOT_NAME: &str = "Bot";

/// Configuration for matches.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Board rows.
    pub rows: usize,
    /// Board columns.
    pub cols: usize,
    /// How long a lone queued player waits before getting the bot.
    pub matchmaking_timeout: Duration,
    /// Forfeiture window after a disconnect.
    pub reconnect_timeout: Duration,
    /// Reconnection cache capacity (usernames).
    pub reconnect_capacity: usize,
    /// Bot search depth (plies).
    pub ai_depth: u32,
    /// Pause before the bot plays.
    pub ai_move_delay: Duration,
    /// How often the bot checks whose turn it is.
    pub ai_poll_interval: Duration,
    /// Timer broadcast period.
    pub clock_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLUMNS,
            matchmaking_timeout: Duration::from_secs(10),
            reconnect_timeout: Duration::from_secs(30),
            reconnect_capacity: 100,
            ai_depth: 6,
            ai_move_delay: Duration::from_secs(1),
            ai_poll_interval: Duration::from_millis(100),
            clock_interval: Duration::from_secs(1),
        }
    }
}

/// Build a session id from the creation time and the first player's name.
pub fn new_session_id(username: &str) -> SessionId {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}-{}", Utc::now().format("%H%M%S"), username, &suffix[..8])
}

/// A player seated in a session.
pub struct SessionPlayer {
    /// Username.
    pub username: String,
    /// Seat, fixed for the whole match.
    pub seat: Seat,
    /// Computer opponent; never has a transport.
    pub is_bot: bool,
    transport: RwLock<Option<Arc<dyn Transport>>>,
}

impl SessionPlayer {
    /// A human player with a live connection.
    pub fn human(username: impl Into<String>, seat: Seat, transport: Arc<dyn Transport>) -> Self {
        Self {
            username: username.into(),
            seat,
            is_bot: false,
            transport: RwLock::new(Some(transport)),
        }
    }

    /// The computer opponent.
    pub fn bot(seat: Seat) -> Self {
        Self {
            username: BOT_NAME.to_string(),
            seat,
            is_bot: true,
            transport: RwLock::new(None),
        }
    }

    /// Current transport, if connected.
    pub async fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().await.clone()
    }

    /// Whether a transport is attached.
    pub async fn is_connected(&self) -> bool {
        self.transport.read().await.is_some()
    }

    /// Replace the transport (reconnect).
    pub async fn attach(&self, transport: Arc<dyn Transport>) {
        *self.transport.write().await = Some(transport);
    }

    /// Drop `transport` if it is still the attached one (disconnect).
    ///
    /// Returns false when a newer connection has replaced it.
    pub async fn detach_if(&self, transport: &Arc<dyn Transport>) -> bool {
        let mut attached = self.transport.write().await;
        match attached.as_ref() {
            Some(current) if Arc::ptr_eq(current, transport) => {
                *attached = None;
                true
            }
            _ => false,
        }
    }

    /// Best-effort send; a missing or failed transport is only logged.
    pub async fn send(&self, message: ServerMessage) {
        let Some(transport) = self.transport().await else {
            return;
        };
        let kind = message.kind();
        if let Err(e) = transport.send(message).await {
            debug!(player = %self.username, kind, "send failed: {}", e);
        }
    }
}

/// A match session.
pub struct MatchSession {
    /// Unique session identifier.
    pub id: SessionId,
    state: Mutex<GameState>,
    players: [SessionPlayer; 2],
}

impl MatchSession {
    /// Create a session. `player1` must hold seat 1 and `player2` seat 2.
    pub fn new(state: GameState, player1: SessionPlayer, player2: SessionPlayer) -> Self {
        debug_assert_eq!(player1.seat, Seat::One);
        debug_assert_eq!(player2.seat, Seat::Two);
        Self {
            id: state.id.clone(),
            state: Mutex::new(state),
            players: [player1, player2],
        }
    }

    /// Lock the game state.
    pub async fn lock(&self) -> MutexGuard<'_, GameState> {
        self.state.lock().await
    }

    /// Player at `seat`.
    pub fn player(&self, seat: Seat) -> &SessionPlayer {
        &self.players[seat.index()]
    }

    /// Both players, seat 1 first.
    pub fn players(&self) -> &[SessionPlayer; 2] {
        &self.players
    }

    /// Seat held by a human `username`.
    pub fn seat_of(&self, username: &str) -> Option<Seat> {
        self.players
            .iter()
            .find(|p| !p.is_bot && p.username == username)
            .map(|p| p.seat)
    }

    /// Seat held by the bot, if any.
    pub fn bot_seat(&self) -> Option<Seat> {
        self.players.iter().find(|p| p.is_bot).map(|p| p.seat)
    }

    /// Send to every connected player. Per-player order is kept; cross-player order is not.
    pub async fn broadcast(&self, message: ServerMessage) {
        for player in &self.players {
            player.send(message.clone()).await;
        }
    }
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

/// Live sessions by id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<SessionId, Arc<MatchSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live session.
    pub async fn insert(&self, session: Arc<MatchSession>) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    /// Deregister a session. Returns it if it was present.
    pub async fn remove(&self, id: &str) -> Option<Arc<MatchSession>> {
        self.sessions.write().await.remove(id)
    }

    /// Look up a live session.
    pub async fn get(&self, id: &str) -> Option<Arc<MatchSession>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Whether a session is live.
    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
