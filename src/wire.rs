//! JSON DTOs exchanged between services and with bot-author clients. These
//! mirror the persistence model but are shaped for the wire, not storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::ExceptionInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Code {
    pub source: String,
    pub cls_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunGameTask {
    pub game_id: Uuid,
    pub callback: String,
    pub blue_code: Code,
    pub red_code: Code,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCodeRequest {
    pub source: String,
    pub cls_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCodeResponse {
    pub updated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub created_at: DateTime<Utc>,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exception: Option<ExceptionInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GameStats {
    pub victories: i64,
    pub losses: i64,
    pub ties: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub created_at: DateTime<Utc>,
    pub loc: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exception: Option<ExceptionInfo>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stats: Option<GameStats>,
}
