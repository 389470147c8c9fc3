//! Reconnection Cache
//!
//! Suspended sessions wait here, keyed by each human player's username,
//! while a forfeiture countdown runs. The cache is a bounded LRU over
//! usernames.
//!
//! Resume and forfeiture race on the same entry. Both resolve the race by
//! removing the entry's keys under the cache lock; whichever removes them
//! first wins, and the loser sees nothing to remove and does nothing.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::game::board::Seat;
use crate::network::protocol::ServerMessage;
use crate::network::runner::SessionRunner;
use crate::network::session::SessionRegistry;
use crate::network::transport::Transport;

/// A suspended session.
pub struct CachedSession {
    /// Runner driving the session.
    pub runner: Arc<SessionRunner>,
    /// Seat whose disconnect started the countdown.
    pub disconnected: Seat,
    /// Usernames this entry is stored under.
    pub usernames: Vec<String>,
    /// When the session was suspended.
    pub cached_at: DateTime<Utc>,
    cancel: CancellationToken,
    id: u64,
}

impl CachedSession {
    /// Whether the forfeiture countdown was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whole seconds since the session was suspended.
    pub fn away_secs(&self) -> i64 {
        (Utc::now() - self.cached_at).num_seconds()
    }
}

// =============================================================================
// ENTRIES
// =============================================================================

/// Username-keyed LRU. One entry sits under each of its usernames.
struct Entries {
    lru: LruCache<String, Arc<CachedSession>>,
    next_id: u64,
}

impl Entries {
    fn new(capacity: usize) -> Self {
        Self {
            lru: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            next_id: 0,
        }
    }

    /// Store `entry` under each of its usernames. Returns the entries pushed
    /// out to make room; their other keys are removed too.
    fn insert(&mut self, entry: &Arc<CachedSession>) -> Vec<Arc<CachedSession>> {
        let mut evicted = Vec::new();
        for key in &entry.usernames {
            let Some((old_key, old)) = self.lru.push(key.clone(), entry.clone()) else {
                continue;
            };
            // A replaced key, not an eviction.
            if old_key == *key || old.id == entry.id {
                continue;
            }
            self.remove_entry(&old);
            evicted.push(old);
        }
        evicted
    }

    /// Remove every key of `entry` still pointing at it. Returns true if any did.
    fn remove_entry(&mut self, entry: &CachedSession) -> bool {
        let mut removed = false;
        for key in &entry.usernames {
            if self.lru.peek(key.as_str()).is_some_and(|e| e.id == entry.id) {
                self.lru.pop(key.as_str());
                removed = true;
            }
        }
        removed
    }
}

// =============================================================================
// CACHE
// =============================================================================

/// Suspended sessions awaiting reconnection.
pub struct ReconnectionCache {
    registry: Arc<SessionRegistry>,
    timeout: Duration,
    inner: Mutex<Entries>,
}

impl ReconnectionCache {
    /// Create a cache that removes suspended sessions from `registry`.
    pub fn new(registry: Arc<SessionRegistry>, timeout: Duration, capacity: usize) -> Self {
        Self {
            registry,
            timeout,
            inner: Mutex::new(Entries::new(capacity)),
        }
    }

    /// Suspend `runner`'s session after the player at `seat` dropped.
    ///
    /// `failed` is the connection that closed. If the player has since been
    /// given a newer connection, nothing happens. Otherwise the player is
    /// detached, the session moves from the live registry into the cache,
    /// the forfeiture countdown starts and the opponent is told. If the
    /// session is already suspended only the detach happens; if it is over
    /// nothing else does.
    pub async fn suspend(
        self: &Arc<Self>,
        runner: &Arc<SessionRunner>,
        seat: Seat,
        failed: Option<&Arc<dyn Transport>>,
    ) {
        let session = runner.session();
        if let Some(failed) = failed {
            if !session.player(seat).detach_if(failed).await {
                debug!(session = %session.id, seat = %seat, "stale connection closed");
                return;
            }
        }

        if !session.lock().await.suspend() {
            debug!(session = %session.id, "session not active, nothing to suspend");
            return;
        }
        self.registry.remove(&session.id).await;

        let usernames: Vec<String> = session
            .players()
            .iter()
            .filter(|p| !p.is_bot)
            .map(|p| p.username.clone())
            .collect();

        let (entry, evicted) = {
            let mut entries = self.inner.lock().await;
            entries.next_id += 1;
            let entry = Arc::new(CachedSession {
                runner: runner.clone(),
                disconnected: seat,
                usernames,
                cached_at: Utc::now(),
                cancel: CancellationToken::new(),
                id: entries.next_id,
            });
            let evicted = entries.insert(&entry);
            (entry, evicted)
        };

        for stale in evicted {
            stale.cancel.cancel();
            warn!(session = %stale.runner.session().id, "reconnection cache full, evicting");
            stale.runner.abandon().await;
        }

        let cache = self.clone();
        let countdown = entry.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = countdown.cancel.cancelled() => return,
                _ = sleep(timeout) => {}
            }
            let claimed = cache.inner.lock().await.remove_entry(&countdown);
            if !claimed {
                return;
            }
            countdown.cancel.cancel();
            info!(
                session = %countdown.runner.session().id,
                away_secs = countdown.away_secs(),
                "reconnection window closed"
            );
            countdown.runner.forfeit(countdown.disconnected).await;
        });

        let player = session.player(seat);
        info!(
            session = %session.id,
            player = %player.username,
            timeout_secs = self.timeout.as_secs(),
            "session suspended"
        );
        session
            .player(seat.other())
            .send(ServerMessage::opponent_disconnected())
            .await;
    }

    /// Take the suspended session `username` is away from, if any.
    ///
    /// A username whose seat is still connected is not resumed; its entry,
    /// and the countdown against the absent opponent, stay as they are.
    /// Otherwise cancels the countdown, removes every key of the entry and
    /// puts the session back into the live registry as Active. The caller
    /// re-attaches the player.
    pub async fn resume(&self, username: &str) -> Option<Arc<CachedSession>> {
        let entry = {
            let mut entries = self.inner.lock().await;
            let entry = entries.lru.peek(username)?.clone();
            let session = entry.runner.session();
            let away = match session.seat_of(username) {
                Some(seat) => !session.player(seat).is_connected().await,
                None => false,
            };
            if !away {
                debug!(session = %session.id, player = %username, "player still connected, not resuming");
                return None;
            }
            entries.remove_entry(&entry);
            entry
        };
        entry.cancel.cancel();

        let session = entry.runner.session();
        session.lock().await.resume();
        self.registry.insert(session.clone()).await;

        info!(
            session = %session.id,
            player = %username,
            away_secs = entry.away_secs(),
            "session resumed"
        );
        Some(entry)
    }

    /// Look up `username`, marking it recently used.
    pub async fn get(&self, username: &str) -> Option<Arc<CachedSession>> {
        self.inner.lock().await.lru.get(username).cloned()
    }

    /// Whether `username` has a suspended session.
    pub async fn contains(&self, username: &str) -> bool {
        self.inner.lock().await.lru.contains(username)
    }

    /// Number of cached usernames.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.lru.len()
    }

    /// Whether the cache holds nothing.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
