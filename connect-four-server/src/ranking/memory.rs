//! In-memory result store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{GameRecord, RankingEntry, ResultSink, SinkError};

/// Win table plus append-only history, both held in memory.
#[derive(Default)]
pub struct MemoryResultSink {
    scores: RwLock<BTreeMap<String, u32>>,
    history: RwLock<Vec<GameRecord>>,
}

impl MemoryResultSink {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wins recorded for `username`.
    pub async fn score(&self, username: &str) -> u32 {
        self.scores.read().await.get(username).copied().unwrap_or(0)
    }

    /// All entries, highest score first, ties by username.
    pub async fn ranking(&self) -> Vec<RankingEntry> {
        let scores = self.scores.read().await;
        let mut ranking: Vec<RankingEntry> = scores
            .iter()
            .map(|(username, score)| RankingEntry {
                username: username.clone(),
                score: *score,
            })
            .collect();
        ranking.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.username.cmp(&b.username)));
        ranking
    }

    /// Recorded matches, oldest first.
    pub async fn history(&self) -> Vec<GameRecord> {
        self.history.read().await.clone()
    }
}

#[async_trait]
impl ResultSink for MemoryResultSink {
    async fn record_win(&self, username: &str) -> Result<(), SinkError> {
        let mut scores = self.scores.write().await;
        let score = scores.entry(username.to_string()).or_insert(0);
        *score += 1;
        debug!(player = %username, score = *score, "win recorded");
        Ok(())
    }

    async fn record_game(&self, record: &GameRecord) -> Result<(), SinkError> {
        debug!(
            player1 = %record.player1,
            player2 = %record.player2,
            winner = %record.winner_field(),
            moves = %record.moves_field(),
            "game recorded"
        );
        self.history.write().await.push(record.clone());
        Ok(())
    }
}
