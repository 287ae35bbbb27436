//! Row types for the `bots`, `code_versions`, `games`, `states` and
//! `participants` tables. `Game.id` and `StoredState.game_id` are stored as
//! their string `Uuid` form, and every `created_at` column is stored as a
//! fixed-width RFC 3339 string (see `persistence::codec::encode_timestamp`),
//! so the same schema and the same bind types work unchanged on both the
//! Postgres and SQLite backends the Any driver can target — the Any driver
//! only implements `Encode`/`Decode` for a small core of types, which does
//! not include `chrono::DateTime`.

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Bot {
    pub id: i64,
    pub token: String,
    pub suspended: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CodeVersion {
    pub id: i64,
    pub created_at: String,
    pub bot_id: i64,
    pub source: String,
    pub cls_name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Game {
    pub id: String,
    pub created_at: String,
    pub winner_id: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Participant {
    pub id: i64,
    pub game_id: String,
    pub bot_id: i64,
    pub side: i64,
    pub result: Option<String>,
    pub exception: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredState {
    pub id: i64,
    pub game_id: String,
    pub serial_no_within_game: i64,
    pub board: String,
    pub next_side: i64,
    pub created_at: String,
}
