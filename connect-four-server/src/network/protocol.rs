//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object with an upper-case `type` discriminator.

use serde::{Deserialize, Serialize};

use crate::game::board::Seat;
use crate::game::state::GameState;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Drop a disc.
    Move(MoveRequest),
}

/// Move request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Target column.
    pub col: i32,
    /// Seat the client believes it holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<u8>,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Match is starting (also sent to a player on reconnect).
    GameStart(GameStartInfo),

    /// A move was applied.
    Move(MoveResult),

    /// Seconds since the match started.
    TimerUpdate {
        /// Whole seconds elapsed.
        elapsed: u64,
    },

    /// Opponent dropped; waiting for them to return.
    OpponentDisconnected {
        /// Human-readable notice.
        message: String,
    },

    /// Opponent came back.
    OpponentReconnected(ReconnectInfo),

    /// Match finished.
    GameOver(GameOverInfo),
}

/// Match start information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStartInfo {
    /// Session identifier.
    pub game_id: String,
    /// Row-major grid, row 0 on top, 0 = empty.
    pub board: Vec<Vec<u8>>,
    /// Receiving player's seat.
    pub player_number: Seat,
    /// Seat 1 username.
    pub player1_name: String,
    /// Seat 2 username.
    pub player2_name: String,
    /// Seat to move.
    pub starting_player: Seat,
}

impl GameStartInfo {
    /// Snapshot of `state` addressed to `seat`.
    pub fn for_seat(state: &GameState, seat: Seat) -> Self {
        Self {
            game_id: state.id.clone(),
            board: state.board().to_grid(),
            player_number: seat,
            player1_name: state.player1.clone(),
            player2_name: state.player2.clone(),
            starting_player: state.turn(),
        }
    }
}

/// Applied move broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveResult {
    /// Column played.
    pub col: usize,
    /// Row the disc landed in.
    pub row: usize,
    /// Seat that played.
    pub player: Seat,
    /// Seat to move next.
    pub next_turn: Seat,
}

/// Reconnection notice with a full state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectInfo {
    /// Human-readable notice.
    pub message: String,
    /// Session identifier.
    pub game_id: String,
    /// Row-major grid, row 0 on top.
    pub board: Vec<Vec<u8>>,
    /// Seat to move.
    pub next_turn: Seat,
    /// Receiving player's seat.
    pub player_number: Seat,
    /// Seat 1 username.
    pub player1_name: String,
    /// Seat 2 username.
    pub player2_name: String,
}

impl ReconnectInfo {
    /// Snapshot of `state` addressed to `seat`.
    pub fn for_seat(state: &GameState, seat: Seat) -> Self {
        Self {
            message: "Your opponent has reconnected!".to_string(),
            game_id: state.id.clone(),
            board: state.board().to_grid(),
            next_turn: state.turn(),
            player_number: seat,
            player1_name: state.player1.clone(),
            player2_name: state.player2.clone(),
        }
    }
}

/// Match end information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOverInfo {
    /// Human-readable result.
    pub message: String,
    /// Machine-readable reason for non-board endings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Reason attached to a forfeit.
pub const REASON_OPPONENT_TIMEOUT: &str = "opponent_timeout";

impl ServerMessage {
    /// Move broadcast.
    pub fn moved(col: usize, row: usize, player: Seat, next_turn: Seat) -> Self {
        ServerMessage::Move(MoveResult { col, row, player, next_turn })
    }

    /// Disconnect notice for the remaining player.
    pub fn opponent_disconnected() -> Self {
        ServerMessage::OpponentDisconnected {
            message: "Your opponent has disconnected. Waiting for them to reconnect...".to_string(),
        }
    }

    /// Win announcement.
    pub fn win(winner: &str) -> Self {
        ServerMessage::GameOver(GameOverInfo {
            message: format!("{winner} wins!"),
            reason: None,
        })
    }

    /// Draw announcement.
    pub fn draw() -> Self {
        ServerMessage::GameOver(GameOverInfo {
            message: "It's a draw!".to_string(),
            reason: None,
        })
    }

    /// Forfeit announcement for the player who stayed.
    pub fn forfeit(loser: &str) -> Self {
        ServerMessage::GameOver(GameOverInfo {
            message: format!("{loser} forfeited. You win!"),
            reason: Some(REASON_OPPONENT_TIMEOUT.to_string()),
        })
    }

    /// Message type tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::GameStart(_) => "GAME_START",
            ServerMessage::Move(_) => "MOVE",
            ServerMessage::TimerUpdate { .. } => "TIMER_UPDATE",
            ServerMessage::OpponentDisconnected { .. } => "OPPONENT_DISCONNECTED",
            ServerMessage::OpponentReconnected(_) => "OPPONENT_RECONNECTED",
            ServerMessage::GameOver(_) => "GAME_OVER",
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Board;
    use serde_json::{json, Value};

    #[test]
    fn test_parse_inbound_move() {
        let msg = ClientMessage::from_json(r#"{"type":"MOVE","col":3,"player":1}"#).unwrap();
        assert_eq!(msg, ClientMessage::Move(MoveRequest { col: 3, player: Some(1) }));

        let msg = ClientMessage::from_json(r#"{"type":"MOVE","col":-2}"#).unwrap();
        assert_eq!(msg, ClientMessage::Move(MoveRequest { col: -2, player: None }));
    }

    #[test]
    fn test_rejects_unknown_type() {
        assert!(ClientMessage::from_json(r#"{"type":"CHAT","text":"hi"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_game_start_shape() {
        let state = GameState::new("120000alice".into(), "alice", "Bot", 7, 6);
        let msg = ServerMessage::GameStart(GameStartInfo::for_seat(&state, Seat::One));
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "GAME_START");
        assert_eq!(value["game_id"], "120000alice");
        assert_eq!(value["player_number"], 1);
        assert_eq!(value["player1_name"], "alice");
        assert_eq!(value["player2_name"], "Bot");
        assert_eq!(value["starting_player"], 1);
        assert_eq!(value["board"], json!(Board::new(7, 6).to_grid()));
    }

    #[test]
    fn test_move_and_timer_shape() {
        let value: Value =
            serde_json::from_str(&ServerMessage::moved(3, 6, Seat::One, Seat::Two).to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "MOVE", "col": 3, "row": 6, "player": 1, "next_turn": 2}));

        let value: Value =
            serde_json::from_str(&ServerMessage::TimerUpdate { elapsed: 12 }.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "TIMER_UPDATE", "elapsed": 12}));
    }

    #[test]
    fn test_game_over_reason_is_optional() {
        let value: Value = serde_json::from_str(&ServerMessage::win("alice").to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "GAME_OVER", "message": "alice wins!"}));

        let value: Value = serde_json::from_str(&ServerMessage::forfeit("bob").to_json().unwrap()).unwrap();
        assert_eq!(value["message"], "bob forfeited. You win!");
        assert_eq!(value["reason"], "opponent_timeout");
    }

    #[test]
    fn test_disconnect_notices() {
        let value: Value =
            serde_json::from_str(&ServerMessage::opponent_disconnected().to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "OPPONENT_DISCONNECTED");

        let state = GameState::new("g".into(), "alice", "bob", 7, 6);
        let msg = ServerMessage::OpponentReconnected(ReconnectInfo::for_seat(&state, Seat::Two));
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "OPPONENT_RECONNECTED");
        assert_eq!(value["next_turn"], 1);
        assert_eq!(value["player_number"], 2);
        assert_eq!(msg.kind(), "OPPONENT_RECONNECTED");
    }
}
