use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::board::State;
use crate::side::Side;

/// Internal classification of a bot fault. Never serialized on its own; it
/// only shapes the human-readable `msg` carried by [`ExceptionInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Hangs,
    Raises,
    InvalidMove,
    MoveBreaksRules,
    InitFailed,
    InitTimedOut,
}

impl FailureKind {
    pub fn tag(self) -> &'static str {
        match self {
            FailureKind::Hangs => "HANGS",
            FailureKind::Raises => "RAISES",
            FailureKind::InvalidMove => "INVALID_MOVE",
            FailureKind::MoveBreaksRules => "MOVE_BREAKS_RULES",
            FailureKind::InitFailed => "INIT_FAILED",
            FailureKind::InitTimedOut => "INIT_TIMED_OUT",
        }
    }
}

/// A classified bot fault, attributed to the side that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    pub msg: String,
    pub caused_by_side: Side,
    #[serde(rename = "move", skip_serializing_if = "Option::is_none", default)]
    pub mv: Option<serde_json::Value>,
}

impl ExceptionInfo {
    pub fn new(kind: FailureKind, caused_by_side: Side, detail: impl std::fmt::Display) -> Self {
        Self { msg: format!("{}: {}", kind.tag(), detail), caused_by_side, mv: None }
    }

    pub fn with_move(mut self, mv: serde_json::Value) -> Self {
        self.mv = Some(mv);
        self
    }
}

/// The Runner's report of a finished or crashed game.
///
/// `winner` and `exception` are mutually exclusive; both absent means a tie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameLog {
    pub game_id: Uuid,
    pub states: Vec<State>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub winner: Option<Side>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exception: Option<ExceptionInfo>,
}
