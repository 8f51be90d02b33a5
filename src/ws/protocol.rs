//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::physics::Vec2;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMsg {
    /// Bind this connection to a logical player
    #[serde(rename = "register")]
    Register(String),

    /// Enqueue for ranked pairing within a league
    #[serde(rename = "matchmaking")]
    Matchmaking { username: String, league: String },

    /// Leave the matchmaking queue
    #[serde(rename = "cancel-matchmaking")]
    CancelMatchmaking { username: String },

    /// Two-phase direct challenge: the first call with an id creates the
    /// entry, the second call with the same id accepts it
    #[serde(rename = "challenge")]
    Challenge {
        id: String,
        #[serde(rename = "Challenger")]
        challenger: String,
        #[serde(rename = "Opponent")]
        opponent: String,
    },

    /// Paddle input, naming the acting player
    #[serde(rename = "move-left")]
    MoveLeft(String),

    /// Paddle input, naming the acting player
    #[serde(rename = "move-right")]
    MoveRight(String),

    /// Practice mode against the computer (handled elsewhere)
    #[serde(rename = "join-game")]
    JoinGame(serde_json::Value),
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMsg {
    /// Sent to both paired connections when an opponent is found
    #[serde(rename = "matchmakingfound")]
    MatchmakingFound { matchmaking: bool, opponent: String },

    /// One-time match initialization payload
    #[serde(rename = "canvas")]
    Canvas {
        canvas: CanvasDims,
        #[serde(rename = "frameRate")]
        frame_rate: f32,
        #[serde(rename = "topPaddle")]
        top_paddle: PaddleDims,
        #[serde(rename = "bottomPaddle")]
        bottom_paddle: PaddleDims,
        ball: BallDims,
    },

    /// Per-tick snapshot, mirrored per recipient
    #[serde(rename = "update-game")]
    UpdateGame {
        #[serde(rename = "ballPos")]
        ball_pos: Vec2,
        #[serde(rename = "topPaddlePos")]
        top_paddle_pos: Vec2,
        #[serde(rename = "bottomPaddlePos")]
        bottom_paddle_pos: Vec2,
        username: String,
        score: ScoreView,
    },

    /// Final result, `i_win` computed relative to the recipient
    #[serde(rename = "finished")]
    Finished {
        winner: String,
        player1: String,
        player2: String,
        player1_score: u8,
        player2_score: u8,
        #[serde(rename = "iWin")]
        i_win: bool,
    },

    /// The opponent's connection closed mid-match
    #[serde(rename = "opponentdisconnect")]
    OpponentDisconnect,

    /// The match was stopped; the named opponent forfeited
    #[serde(rename = "game-stop")]
    GameStop { opponent: String },
}

/// Playing field dimensions
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CanvasDims {
    pub width: f32,
    pub height: f32,
}

/// Paddle dimensions
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaddleDims {
    pub width: f32,
    pub height: f32,
}

/// Ball dimensions
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BallDims {
    pub radius: f32,
}

/// Scores as seen by one recipient: own score at the bottom,
/// opponent score at the top
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreView {
    pub top: u8,
    pub bottom: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_event_names_round_trip() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"event":"register","data":"alice"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::Register(u) if u == "alice"));

        let msg: ClientMsg = serde_json::from_str(
            r#"{"event":"matchmaking","data":{"username":"alice","league":"bronze"}}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMsg::Matchmaking { username, league } if username == "alice" && league == "bronze"
        ));

        let msg: ClientMsg = serde_json::from_str(
            r#"{"event":"challenge","data":{"id":"c1","Challenger":"alice","Opponent":"bob"}}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMsg::Challenge { id, .. } if id == "c1"));

        let msg: ClientMsg =
            serde_json::from_str(r#"{"event":"move-left","data":"bob"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::MoveLeft(u) if u == "bob"));
    }

    #[test]
    fn server_msg_uses_source_field_names() {
        let msg = ServerMsg::UpdateGame {
            ball_pos: Vec2::new(250.0, 400.0),
            top_paddle_pos: Vec2::new(250.0, 50.0),
            bottom_paddle_pos: Vec2::new(250.0, 750.0),
            username: "alice".to_string(),
            score: ScoreView { top: 1, bottom: 2 },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""event":"update-game""#));
        assert!(json.contains(r#""ballPos""#));
        assert!(json.contains(r#""topPaddlePos""#));
        assert!(json.contains(r#""bottomPaddlePos""#));

        let msg = ServerMsg::Finished {
            winner: "alice".to_string(),
            player1: "alice".to_string(),
            player2: "bob".to_string(),
            player1_score: 7,
            player2_score: 3,
            i_win: true,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""event":"finished""#));
        assert!(json.contains(r#""iWin":true"#));
    }
}
