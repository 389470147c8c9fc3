//! Session Runner
//!
//! Drives one match. A runner owns a set of tasks that share a single
//! cancellation token:
//!
//! - a move reader per connected human, stamping moves with the reader's seat
//! - a bot mover when seat 2 is the computer
//! - a clock broadcasting elapsed seconds
//! - the apply loop, the only place game state is mutated
//!
//! The apply loop and the result paths (forfeit, eviction) are the only
//! callers that cancel the token. A disconnect suspends instead.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::game::board::{MoveError, Seat};
use crate::game::search::MoveSearch;
use crate::game::state::{GameState, Outcome, SessionStatus};
use crate::network::protocol::{ClientMessage, GameStartInfo, ReconnectInfo, ServerMessage};
use crate::network::reconnect::ReconnectionCache;
use crate::network::session::{MatchSession, SessionConfig, SessionRegistry};
use crate::network::transport::Transport;
use crate::ranking::{GameRecord, ResultSink};

/// Pending-move queue depth.
const MOVE_BUFFER: usize = 16;

/// Shared collaborators every runner needs.
pub struct MatchServices {
    /// Live sessions.
    pub registry: Arc<SessionRegistry>,
    /// Suspended sessions.
    pub cache: Arc<ReconnectionCache>,
    /// Result store.
    pub sink: Arc<dyn ResultSink>,
    /// Match tuning.
    pub config: SessionConfig,
}

impl MatchServices {
    /// Wire up a fresh registry and cache around `sink`.
    pub fn new(config: SessionConfig, sink: Arc<dyn ResultSink>) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new());
        let cache = Arc::new(ReconnectionCache::new(
            registry.clone(),
            config.reconnect_timeout,
            config.reconnect_capacity,
        ));
        Arc::new(Self {
            registry,
            cache,
            sink,
            config,
        })
    }
}

/// A move waiting for the apply loop.
#[derive(Debug, Clone, Copy)]
struct PendingMove {
    seat: Seat,
    column: i32,
}

/// Point in a game the bot has answered: ply count plus suspension count.
///
/// A move queued just before a disconnect is rejected by the apply loop, and
/// after the resume the ply count is unchanged. The suspension count tells
/// the two positions apart so the bot answers again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    ply: usize,
    suspensions: u64,
}

impl Position {
    fn of(state: &GameState) -> Self {
        Self {
            ply: state.moves().len(),
            suspensions: state.suspensions(),
        }
    }
}

/// Whether the bot at `bot` still owes a move in `state`.
fn bot_ready(state: &GameState, bot: Seat, submitted: Option<Position>) -> bool {
    state.status() == SessionStatus::Active
        && state.turn() == bot
        && submitted != Some(Position::of(state))
}

/// Task set driving one session.
pub struct SessionRunner {
    session: Arc<MatchSession>,
    services: Arc<MatchServices>,
    done: CancellationToken,
    moves: mpsc::Sender<PendingMove>,
}

impl SessionRunner {
    /// Spawn every task for `session` and return the runner.
    pub fn start(session: Arc<MatchSession>, services: Arc<MatchServices>) -> Arc<Self> {
        let (moves, rx) = mpsc::channel(MOVE_BUFFER);
        let runner = Arc::new(Self {
            session,
            services,
            done: CancellationToken::new(),
            moves,
        });

        tokio::spawn(runner.clone().apply_loop(rx));
        tokio::spawn(runner.clone().clock());

        for player in runner.session.players() {
            if player.is_bot {
                tokio::spawn(runner.clone().bot_mover(player.seat));
            }
        }
        let runner_for_readers = runner.clone();
        tokio::spawn(async move {
            for player in runner_for_readers.session.players() {
                if let Some(transport) = player.transport().await {
                    runner_for_readers.spawn_reader(player.seat, transport);
                }
            }
        });

        info!(session = %runner.session.id, "session started");
        runner
    }

    /// The session this runner drives.
    pub fn session(&self) -> &Arc<MatchSession> {
        &self.session
    }

    /// Whether the runner's tasks have been told to stop.
    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }

    // =========================================================================
    // TASKS
    // =========================================================================

    fn spawn_reader(self: &Arc<Self>, seat: Seat, transport: Arc<dyn Transport>) {
        let runner = self.clone();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = runner.done.cancelled() => return,
                    received = transport.receive() => received,
                };

                match received {
                    Ok(ClientMessage::Move(request)) => {
                        if request.player.is_some_and(|claimed| claimed != seat.number()) {
                            debug!(
                                session = %runner.session.id,
                                seat = %seat,
                                claimed = ?request.player,
                                "move rejected: {}",
                                MoveError::NotYourTurn
                            );
                            continue;
                        }
                        let pending = PendingMove {
                            seat,
                            column: request.col,
                        };
                        if runner.moves.send(pending).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        if runner.done.is_cancelled() {
                            return;
                        }
                        let player = runner.session.player(seat);
                        info!(session = %runner.session.id, player = %player.username, "player disconnected: {}", e);
                        runner.services.cache.suspend(&runner, seat, Some(&transport)).await;
                        return;
                    }
                }
            }
        });
    }

    async fn bot_mover(self: Arc<Self>, bot: Seat) {
        let config = &self.services.config;
        let search = MoveSearch::new(bot, config.ai_depth);
        let mut submitted: Option<Position> = None;

        loop {
            let ready = {
                let state = self.session.lock().await;
                if state.is_over() {
                    return;
                }
                bot_ready(&state, bot, submitted)
            };

            let wait = if ready {
                config.ai_move_delay
            } else {
                config.ai_poll_interval
            };
            tokio::select! {
                _ = self.done.cancelled() => return,
                _ = sleep(wait) => {}
            }
            if !ready {
                continue;
            }

            let snapshot = {
                let state = self.session.lock().await;
                if state.status() != SessionStatus::Active || state.turn() != bot {
                    continue;
                }
                if state.is_draw() {
                    return;
                }
                (state.board().clone(), Position::of(&state))
            };
            let (board, position) = snapshot;

            let column = match tokio::task::spawn_blocking(move || search.best_move(&board)).await {
                Ok(Some(column)) => column,
                Ok(None) => return,
                Err(e) => {
                    error!(session = %self.session.id, "move search failed: {}", e);
                    return;
                }
            };

            debug!(session = %self.session.id, column, "bot chose move");
            let pending = PendingMove {
                seat: bot,
                column: column as i32,
            };
            if self.moves.send(pending).await.is_err() {
                return;
            }
            submitted = Some(position);
        }
    }

    async fn clock(self: Arc<Self>) {
        let mut ticker = interval(self.services.config.clock_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.done.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let elapsed = {
                let state = self.session.lock().await;
                if state.is_over() {
                    return;
                }
                state.elapsed().as_secs()
            };
            self.session
                .broadcast(ServerMessage::TimerUpdate { elapsed })
                .await;
        }
    }

    async fn apply_loop(self: Arc<Self>, mut rx: mpsc::Receiver<PendingMove>) {
        loop {
            let pending = tokio::select! {
                _ = self.done.cancelled() => return,
                pending = rx.recv() => match pending {
                    Some(pending) => pending,
                    None => return,
                },
            };

            let applied = {
                let mut state = self.session.lock().await;
                match state.apply_move(pending.seat, pending.column) {
                    Ok((row, column)) => {
                        let outcome = state.outcome_at(row, column, pending.seat);
                        if outcome.is_some() {
                            state.finish();
                        }
                        Some((row, column, state.turn(), outcome))
                    }
                    Err(e) => {
                        debug!(
                            session = %self.session.id,
                            seat = %pending.seat,
                            column = pending.column,
                            "move rejected: {}",
                            e
                        );
                        None
                    }
                }
            };
            let Some((row, column, next_turn, outcome)) = applied else {
                continue;
            };

            debug!(session = %self.session.id, seat = %pending.seat, column, row, "move applied");
            self.session
                .broadcast(ServerMessage::moved(column, row, pending.seat, next_turn))
                .await;

            match outcome {
                Some(Outcome::Win(seat)) => {
                    let winner = self.session.player(seat).username.clone();
                    self.conclude(Some(seat), ServerMessage::win(&winner)).await;
                    return;
                }
                Some(Outcome::Draw) => {
                    self.conclude(None, ServerMessage::draw()).await;
                    return;
                }
                None => {}
            }
        }
    }

    // =========================================================================
    // RESULT PATHS
    // =========================================================================

    /// Announce the result, stop every task, deregister, then report it.
    ///
    /// The caller must already have moved the state to Over. Sink writes run
    /// on their own task; a slow or failing sink only produces a warning.
    async fn conclude(&self, winner: Option<Seat>, notice: ServerMessage) {
        let record = {
            let state = self.session.lock().await;
            GameRecord::new(
                state.player1.clone(),
                state.player2.clone(),
                winner.map(|seat| state.player_name(seat).to_string()),
                state.moves().to_vec(),
            )
        };

        self.session.broadcast(notice).await;
        self.done.cancel();
        self.services.registry.remove(&self.session.id).await;

        info!(
            session = %self.session.id,
            winner = %record.winner_field(),
            moves = record.moves.len(),
            "game over"
        );

        let sink = self.services.sink.clone();
        let session_id = self.session.id.clone();
        tokio::spawn(async move {
            if let Some(name) = &record.winner {
                if let Err(e) = sink.record_win(name).await {
                    warn!(session = %session_id, player = %name, "failed to record win: {}", e);
                }
            }
            if let Err(e) = sink.record_game(&record).await {
                warn!(session = %session_id, "failed to record game: {}", e);
            }
        });
    }

    /// The player at `loser` ran out of time to reconnect.
    pub async fn forfeit(&self, loser: Seat) {
        if !self.session.lock().await.finish() {
            return;
        }
        let name = self.session.player(loser).username.clone();
        info!(session = %self.session.id, player = %name, "player forfeited");
        self.conclude(Some(loser.other()), ServerMessage::forfeit(&name))
            .await;
    }

    /// Drop the session without a result (reconnection cache overflow).
    pub async fn abandon(&self) {
        self.session.lock().await.finish();
        self.done.cancel();
        self.services.registry.remove(&self.session.id).await;
        warn!(session = %self.session.id, "session abandoned");
    }

    /// Re-attach `username` after a successful resume.
    ///
    /// Sends the reconnecting player a fresh `GAME_START`, tells the opponent,
    /// and restarts the player's reader. If the opponent is gone too, the
    /// session is suspended again against them. Returns false if `username`
    /// does not play in this session.
    pub async fn reattach(self: &Arc<Self>, username: &str, transport: Arc<dyn Transport>) -> bool {
        let Some(seat) = self.session.seat_of(username) else {
            return false;
        };
        let player = self.session.player(seat);
        player.attach(transport.clone()).await;

        let (start, reconnected) = {
            let state = self.session.lock().await;
            (
                GameStartInfo::for_seat(&state, seat),
                ReconnectInfo::for_seat(&state, seat.other()),
            )
        };
        player.send(ServerMessage::GameStart(start)).await;
        self.spawn_reader(seat, transport);

        let opponent = self.session.player(seat.other());
        if opponent.is_bot || opponent.is_connected().await {
            opponent
                .send(ServerMessage::OpponentReconnected(reconnected))
                .await;
        } else {
            info!(session = %self.session.id, player = %opponent.username, "opponent still away");
            self.services.cache.suspend(self, seat.other(), None).await;
        }

        info!(session = %self.session.id, player = %username, "player reconnected");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::{GameOverInfo, MoveRequest};
    use crate::network::session::{SessionPlayer, BOT_NAME};
    use crate::network::transport::local::{self, LocalClient};
    use crate::ranking::{MemoryResultSink, SinkError};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FailingSink;

    #[async_trait]
    impl ResultSink for FailingSink {
        async fn record_win(&self, _username: &str) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("down".into()))
        }

        async fn record_game(&self, _record: &GameRecord) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("down".into()))
        }
    }

    struct HangingSink;

    #[async_trait]
    impl ResultSink for HangingSink {
        async fn record_win(&self, _username: &str) -> Result<(), SinkError> {
            std::future::pending().await
        }

        async fn record_game(&self, _record: &GameRecord) -> Result<(), SinkError> {
            std::future::pending().await
        }
    }

    fn bot_match(services: &Arc<MatchServices>) -> (Arc<SessionRunner>, LocalClient) {
        let (transport, client) = local::pair();
        let state = GameState::new("g2".into(), "alice", BOT_NAME, 7, 6);
        let session = Arc::new(MatchSession::new(
            state,
            SessionPlayer::human("alice", Seat::One, Arc::new(transport)),
            SessionPlayer::bot(Seat::Two),
        ));
        (SessionRunner::start(session, services.clone()), client)
    }

    async fn human_match(
        services: &Arc<MatchServices>,
    ) -> (Arc<SessionRunner>, LocalClient, LocalClient) {
        let (t1, c1) = local::pair();
        let (t2, c2) = local::pair();
        let state = GameState::new("g1".into(), "alice", "bob", 7, 6);
        let session = Arc::new(MatchSession::new(
            state,
            SessionPlayer::human("alice", Seat::One, Arc::new(t1)),
            SessionPlayer::human("bob", Seat::Two, Arc::new(t2)),
        ));
        services.registry.insert(session.clone()).await;
        (SessionRunner::start(session, services.clone()), c1, c2)
    }

    async fn play_vertical_win(alice: &mut LocalClient, bob: &mut LocalClient) {
        for _ in 0..3 {
            alice.play(3);
            alice.next_of("MOVE").await.unwrap();
            bob.play(0);
            alice.next_of("MOVE").await.unwrap();
        }
        alice.play(3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vertical_win_flow() {
        let sink = Arc::new(MemoryResultSink::new());
        let services = MatchServices::new(SessionConfig::default(), sink.clone());
        let (runner, mut alice, mut bob) = human_match(&services).await;

        play_vertical_win(&mut alice, &mut bob).await;

        let last = alice.next_of("MOVE").await.unwrap();
        assert_eq!(last, ServerMessage::moved(3, 3, Seat::One, Seat::Two));
        assert_eq!(alice.next_of("GAME_OVER").await, Some(ServerMessage::win("alice")));
        assert_eq!(bob.next_of("GAME_OVER").await, Some(ServerMessage::win("alice")));
        sleep(Duration::from_millis(10)).await;

        assert!(runner.is_done());
        assert!(runner.session().lock().await.is_over());
        assert!(!services.registry.contains("g1").await);

        assert_eq!(sink.score("alice").await, 1);
        let history = sink.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].moves_field(), "3:1,0:2,3:1,0:2,3:1,0:2,3:1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_turn_and_invalid_moves_are_ignored() {
        let services = MatchServices::new(SessionConfig::default(), Arc::new(MemoryResultSink::new()));
        let (runner, mut alice, mut bob) = human_match(&services).await;

        alice.play(9);
        alice.play(-1);
        alice.send(ClientMessage::Move(MoveRequest { col: 2, player: Some(2) }));
        alice.play(4);
        assert_eq!(
            alice.next_of("MOVE").await,
            Some(ServerMessage::moved(4, 6, Seat::One, Seat::Two))
        );

        alice.play(5);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(runner.session().lock().await.moves().len(), 1);

        bob.play(5);
        assert_eq!(
            bob.next_of("MOVE").await,
            Some(ServerMessage::moved(5, 6, Seat::Two, Seat::One))
        );
        let state = runner.session().lock().await;
        assert_eq!(state.moves().len(), 2);
        assert_eq!(state.turn(), Seat::One);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_sink_still_announces_game_over() {
        let services = MatchServices::new(SessionConfig::default(), Arc::new(FailingSink));
        let (runner, mut alice, mut bob) = human_match(&services).await;

        play_vertical_win(&mut alice, &mut bob).await;

        assert_eq!(bob.next_of("GAME_OVER").await, Some(ServerMessage::win("alice")));
        sleep(Duration::from_millis(10)).await;
        assert!(runner.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_sink_does_not_hold_back_game_over() {
        let services = MatchServices::new(SessionConfig::default(), Arc::new(HangingSink));
        let (runner, mut alice, mut bob) = human_match(&services).await;

        play_vertical_win(&mut alice, &mut bob).await;

        assert_eq!(alice.next_of("GAME_OVER").await, Some(ServerMessage::win("alice")));
        assert_eq!(bob.next_of("GAME_OVER").await, Some(ServerMessage::win("alice")));
        sleep(Duration::from_millis(10)).await;
        assert!(runner.is_done());
        assert!(!services.registry.contains("g1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_broadcasts_elapsed_seconds() {
        let services = MatchServices::new(SessionConfig::default(), Arc::new(MemoryResultSink::new()));
        let (_runner, mut alice, _bob) = human_match(&services).await;

        assert_eq!(
            alice.next_of("TIMER_UPDATE").await,
            Some(ServerMessage::TimerUpdate { elapsed: 1 })
        );
        assert_eq!(
            alice.next_of("TIMER_UPDATE").await,
            Some(ServerMessage::TimerUpdate { elapsed: 2 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bot_answers_human_move() {
        let services = MatchServices::new(SessionConfig::default(), Arc::new(MemoryResultSink::new()));
        let (runner, mut alice) = bot_match(&services);

        alice.play(0);
        assert_eq!(
            alice.next_of("MOVE").await,
            Some(ServerMessage::moved(0, 6, Seat::One, Seat::Two))
        );

        let reply = alice.next_of("MOVE").await.unwrap();
        let ServerMessage::Move(result) = reply else {
            panic!("expected MOVE, got {reply:?}");
        };
        assert_eq!(result.player, Seat::Two);
        assert_eq!(result.next_turn, Seat::One);

        // No second bot move while it is the human's turn.
        sleep(Duration::from_secs(5)).await;
        let extra: Vec<_> = alice
            .drain()
            .into_iter()
            .filter(|m| m.kind() == "MOVE")
            .collect();
        assert!(extra.is_empty());
        assert_eq!(runner.session().lock().await.moves().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forfeit_credits_the_other_seat() {
        let sink = Arc::new(MemoryResultSink::new());
        let services = MatchServices::new(SessionConfig::default(), sink.clone());
        let (runner, _alice, mut bob) = human_match(&services).await;

        runner.forfeit(Seat::One).await;
        runner.forfeit(Seat::One).await;

        assert_eq!(
            bob.next_of("GAME_OVER").await,
            Some(ServerMessage::GameOver(GameOverInfo {
                message: "alice forfeited. You win!".into(),
                reason: Some("opponent_timeout".into()),
            }))
        );
        sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.score("bob").await, 1);
        assert_eq!(sink.history().await.len(), 1);
        assert!(runner.is_done());
    }

    #[test]
    fn test_bot_answers_again_after_rejected_move() {
        let mut state = GameState::new("g3".into(), "alice", BOT_NAME, 7, 6);
        assert!(!bot_ready(&state, Seat::Two, None));

        state.apply_move(Seat::One, 0).unwrap();
        assert!(bot_ready(&state, Seat::Two, None));

        // Queued, then rejected because the human dropped first.
        let queued = Position::of(&state);
        assert!(!bot_ready(&state, Seat::Two, Some(queued)));
        assert!(state.suspend());
        assert_eq!(state.apply_move(Seat::Two, 3), Err(MoveError::SessionNotActive));
        assert!(!bot_ready(&state, Seat::Two, Some(queued)));

        assert!(state.resume());
        assert_eq!(state.moves().len(), 1);
        assert!(bot_ready(&state, Seat::Two, Some(queued)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bot_moves_after_human_resumes_on_bots_turn() {
        let services = MatchServices::new(SessionConfig::default(), Arc::new(MemoryResultSink::new()));
        let (runner, mut alice) = bot_match(&services);

        alice.play(0);
        assert_eq!(
            alice.next_of("MOVE").await,
            Some(ServerMessage::moved(0, 6, Seat::One, Seat::Two))
        );
        drop(alice);

        sleep(Duration::from_secs(5)).await;
        {
            let state = runner.session().lock().await;
            assert_eq!(state.status(), SessionStatus::Suspended);
            assert_eq!(state.moves().len(), 1);
        }
        assert!(services.cache.contains("alice").await);

        let entry = services.cache.resume("alice").await.unwrap();
        let (transport, mut back) = local::pair();
        assert!(entry.runner.reattach("alice", Arc::new(transport)).await);

        let Some(ServerMessage::GameStart(start)) = back.next_of("GAME_START").await else {
            panic!("expected GAME_START");
        };
        assert_eq!(start.starting_player, Seat::Two);

        let reply = back.next_of("MOVE").await.unwrap();
        let ServerMessage::Move(result) = reply else {
            panic!("expected MOVE, got {reply:?}");
        };
        assert_eq!(result.player, Seat::Two);
        assert_eq!(runner.session().lock().await.moves().len(), 2);

        // The countdown was cancelled by the resume.
        sleep(Duration::from_secs(40)).await;
        assert!(!runner.is_done());
    }
}
