use crate::state::Snapshot;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for a fresh copy of the game document
    RequestSnapshot,
    Heartbeat,

    // Player messages
    JoinGame {
        join_code: String,
        name: String,
        color: String,
        device: String,
    },
    /// Take over a GM-created player from this device
    ClaimPlayer {
        player_id: PlayerId,
        device: String,
    },
    /// Replace every earlier session of the player with one for this device
    Reconnect {
        player_id: PlayerId,
        device: String,
    },
    SubmitAnswer {
        text: String,
        #[serde(default)]
        use_double: bool,
    },
    Disconnect,

    // GM-only messages
    GmTransitionGame {
        status: GameStatus,
    },
    GmStartGame,
    GmCompleteGame,
    GmReturnToSetup,
    GmToggleRules {
        show: bool,
    },
    GmAddPlayer {
        name: String,
        color: String,
    },
    GmRemovePlayer {
        player_id: PlayerId,
    },
    GmReorderPlayers {
        order: Vec<PlayerId>,
    },
    GmAssignCategory {
        round_number: u32,
        category_id: CategoryId,
    },
    GmUpdateConfig {
        config: GameConfig,
        thinking_time: u32,
    },
    GmTransitionRound {
        status: RoundStatus,
    },
    GmStartCollecting,
    GmStartRevealing,
    GmRevealNext,
    GmRevealPrev,
    GmRevealAll,
    GmShowScores,
    GmNextRound,
    /// Enter an answer on behalf of a player without a device
    GmSubmitAnswer {
        player_id: PlayerId,
        text: String,
        #[serde(default)]
        use_double: bool,
    },
    GmCorrectAnswer {
        player_id: PlayerId,
        /// Round to correct; the current round when absent
        #[serde(default)]
        round_number: Option<u32>,
        /// None marks the answer as not on the list
        answer_id: Option<AnswerId>,
    },
    GmResetScores,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        /// Absent until the connection is bound to a game
        snapshot: Option<Snapshot>,
    },
    /// Full replace of the game document
    Snapshot {
        snapshot: Snapshot,
    },
    /// Sent to a device once it controls a player
    SessionCreated {
        player_id: PlayerId,
        game_id: GameId,
        token: String,
    },
    HeartbeatAck {
        server_now: String,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn snapshot(snapshot: &Snapshot) -> Self {
        ServerMessage::Snapshot {
            snapshot: snapshot.clone(),
        }
    }

    pub fn error(err: &crate::error::GameError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages_use_tag_field() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"t":"submit_answer","text":"Fuego"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::SubmitAnswer { ref text, use_double: false } if text == "Fuego"
        ));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"t":"gm_transition_round","status":"REVEALING"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::GmTransitionRound {
                status: RoundStatus::Revealing
            }
        ));
    }

    #[test]
    fn test_correct_answer_defaults_to_current_round() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"t":"gm_correct_answer","player_id":"p1","answer_id":null}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::GmCorrectAnswer {
                round_number: None,
                answer_id: None,
                ..
            }
        ));
    }

    #[test]
    fn test_error_message_carries_code() {
        let err = crate::error::GameError::validation("Answer must not be empty");
        let json = serde_json::to_value(ServerMessage::error(&err)).unwrap();
        assert_eq!(json["t"], "error");
        assert_eq!(json["code"], "VALIDATION_FAILED");
    }
}
