//! Matchmaking
//!
//! One consumer drains a queue of depth one. It takes a player, then races
//! a second arrival against the matchmaking timeout: a second player makes
//! a human match, the timeout makes a match against the bot.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::info;

use crate::game::board::Seat;
use crate::game::state::GameState;
use crate::network::protocol::{GameStartInfo, ServerMessage};
use crate::network::runner::{MatchServices, SessionRunner};
use crate::network::session::{new_session_id, MatchSession, SessionPlayer};
use crate::network::transport::Transport;

/// Queue depth.
const QUEUE_CAPACITY: usize = 1;

/// Matchmaking errors.
#[derive(Debug, Error)]
pub enum MatchmakerError {
    /// The matchmaker task has stopped.
    #[error("matchmaker is not running")]
    Stopped,
}

/// A player waiting for a match.
pub struct QueuedPlayer {
    /// Username.
    pub username: String,
    /// Player connection.
    pub transport: Arc<dyn Transport>,
}

/// Handle for enqueueing players.
#[derive(Clone)]
pub struct MatchmakerHandle {
    queue: mpsc::Sender<QueuedPlayer>,
}

impl MatchmakerHandle {
    /// Queue a player. Waits while another player is already pending.
    pub async fn enqueue(
        &self,
        username: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Result<(), MatchmakerError> {
        let player = QueuedPlayer {
            username: username.into(),
            transport,
        };
        info!(player = %player.username, "player queued");
        self.queue
            .send(player)
            .await
            .map_err(|_| MatchmakerError::Stopped)
    }
}

/// Matchmaking consumer.
pub struct Matchmaker {
    services: Arc<MatchServices>,
    queue: mpsc::Receiver<QueuedPlayer>,
}

impl Matchmaker {
    /// Start the consumer task.
    pub fn spawn(services: Arc<MatchServices>) -> (MatchmakerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let matchmaker = Self {
            services,
            queue: rx,
        };
        (MatchmakerHandle { queue: tx }, tokio::spawn(matchmaker.run()))
    }

    async fn run(mut self) {
        let wait = self.services.config.matchmaking_timeout;
        while let Some(first) = self.queue.recv().await {
            let second = match timeout(wait, self.queue.recv()).await {
                Ok(Some(second)) => Some(second),
                Ok(None) => None,
                Err(_) => {
                    info!(player = %first.username, "no opponent found, matching with bot");
                    None
                }
            };
            open_session(&self.services, first, second).await;
        }
    }
}

/// Create, register and announce a session, then start its runner.
///
/// `second` takes seat 2; without one, the bot does.
pub async fn open_session(
    services: &Arc<MatchServices>,
    first: QueuedPlayer,
    second: Option<QueuedPlayer>,
) -> Arc<SessionRunner> {
    let id = new_session_id(&first.username);
    let player2 = match second {
        Some(p) => SessionPlayer::human(p.username, Seat::Two, p.transport),
        None => SessionPlayer::bot(Seat::Two),
    };
    let player1 = SessionPlayer::human(first.username, Seat::One, first.transport);

    let config = &services.config;
    let state = GameState::new(
        id,
        player1.username.clone(),
        player2.username.clone(),
        config.rows,
        config.cols,
    );
    let session = Arc::new(MatchSession::new(state, player1, player2));
    services.registry.insert(session.clone()).await;

    let announcements: Vec<_> = {
        let state = session.lock().await;
        session
            .players()
            .iter()
            .map(|p| GameStartInfo::for_seat(&state, p.seat))
            .collect()
    };
    for (player, start) in session.players().iter().zip(announcements) {
        player.send(ServerMessage::GameStart(start)).await;
    }

    let [p1, p2] = session.players();
    info!(session = %session.id, player1 = %p1.username, player2 = %p2.username, "match created");
    SessionRunner::start(session, services.clone())
}
