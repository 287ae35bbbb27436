//! Lifecycle state store: code versions, games, participant outcomes and
//! state sequences, plus the per-bot query surface bots poll for results.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use bot_battle::config::{self, DispatcherConfig};
use bot_battle::game::GameLog;
use bot_battle::persistence::codec::{self, decode_timestamp, encode_timestamp};
use bot_battle::persistence::models::{CodeVersion, Participant};
use bot_battle::persistence::{Bot, Db};
use bot_battle::side::Side;
use bot_battle::wire::{GameStats, ParticipantInfo, UpdateCodeRequest, UpdateCodeResponse, VersionInfo};

#[derive(Clone)]
struct AppState {
    db: Db,
    http: reqwest::Client,
    scheduler_url: String,
}

#[derive(Debug, Error)]
enum DispatcherError {
    #[error("missing or malformed Authorization header")]
    Unauthenticated,
    #[error("no bot matches the provided token")]
    UnknownBot,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored data could not be decoded: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("stored timestamp could not be parsed: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("expected exactly two participants for game {0}, found {1}")]
    ParticipantCountMismatch(uuid::Uuid, usize),
    #[error("game {0} has no participant on the {1} side")]
    MissingSide(uuid::Uuid, Side),
}

impl IntoResponse for DispatcherError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatcherError::Unauthenticated | DispatcherError::UnknownBot => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "dispatcher request failed");
        } else {
            warn!(error = %self, "dispatcher request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

async fn extract_bot(headers: &HeaderMap, db: &Db) -> Result<Bot, DispatcherError> {
    let header = headers.get(header::AUTHORIZATION).ok_or(DispatcherError::Unauthenticated)?;
    let value = header.to_str().map_err(|_| DispatcherError::Unauthenticated)?;
    let token = value.strip_prefix("Bearer ").ok_or(DispatcherError::Unauthenticated)?;

    let bot: Option<Bot> = sqlx::query_as("SELECT id, token, suspended FROM bots WHERE token = ?")
        .bind(token)
        .fetch_optional(db.pool())
        .await?;
    bot.ok_or(DispatcherError::UnknownBot)
}

fn side_matches(participant_side: i64, side: Side) -> bool {
    participant_side == i64::from(u8::from(side))
}

async fn update_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateCodeRequest>,
) -> Result<Json<UpdateCodeResponse>, DispatcherError> {
    let bot = extract_bot(&headers, &state.db).await?;

    let last_version: Option<CodeVersion> = sqlx::query_as(
        "SELECT id, created_at, bot_id, source, cls_name FROM code_versions \
         WHERE bot_id = ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(bot.id)
    .fetch_optional(state.db.pool())
    .await?;

    if let Some(last) = &last_version {
        if last.source == req.source && last.cls_name == req.cls_name {
            return Ok(Json(UpdateCodeResponse { updated: false }));
        }
    }

    sqlx::query("INSERT INTO code_versions (created_at, bot_id, source, cls_name) VALUES (?, ?, ?, ?)")
        .bind(encode_timestamp(Utc::now()))
        .bind(bot.id)
        .bind(&req.source)
        .bind(&req.cls_name)
        .execute(state.db.pool())
        .await?;
    sqlx::query("UPDATE bots SET suspended = FALSE WHERE id = ?")
        .bind(bot.id)
        .execute(state.db.pool())
        .await?;

    if let Err(e) = state.http.post(&state.scheduler_url).send().await {
        warn!(error = %e, scheduler_url = %state.scheduler_url, "failed to trigger scheduler after code update");
    }

    info!(bot_id = bot.id, "accepted new code version");
    Ok(Json(UpdateCodeResponse { updated: true }))
}

async fn game_result(State(state): State<AppState>, Json(log): Json<GameLog>) -> StatusCode {
    info!(game_id = %log.game_id, "accepted game result");
    tokio::spawn(async move {
        if let Err(e) = save_game_result(&state, log).await {
            error!(error = %e, "failed to save game result");
        }
    });
    StatusCode::ACCEPTED
}

async fn save_game_result(state: &AppState, log: GameLog) -> Result<(), DispatcherError> {
    let mut tx = state.db.pool().begin().await?;

    let participants: Vec<Participant> = sqlx::query_as(
        "SELECT id, game_id, bot_id, side, result, exception, created_at FROM participants WHERE game_id = ?",
    )
    .bind(log.game_id.to_string())
    .fetch_all(&mut *tx)
    .await?;

    if participants.len() != 2 {
        return Err(DispatcherError::ParticipantCountMismatch(log.game_id, participants.len()));
    }
    if participants.iter().any(|p| p.result.is_some()) {
        // Idempotence: a game_id is only ever resolved once.
        return Ok(());
    }

    let find_side = |side: Side| {
        participants
            .iter()
            .position(|p| side_matches(p.side, side))
            .ok_or(DispatcherError::MissingSide(log.game_id, side))
    };

    let mut results = [String::new(), String::new()];
    let mut exceptions: [Option<String>; 2] = [None, None];
    let mut winner_bot_id = None;
    let mut suspend_bot_id = None;

    if let Some(exception) = &log.exception {
        let offending = find_side(exception.caused_by_side)?;
        let opponent = 1 - offending;
        results[offending] = "crashed".to_string();
        results[opponent] = "opponent_crashed".to_string();
        exceptions[offending] = Some(serde_json::to_string(exception)?);
        suspend_bot_id = Some(participants[offending].bot_id);
    } else if let Some(winner) = log.winner {
        let winner_idx = find_side(winner)?;
        let loser_idx = 1 - winner_idx;
        results[winner_idx] = "victory".to_string();
        results[loser_idx] = "loss".to_string();
        winner_bot_id = Some(participants[winner_idx].bot_id);
    } else {
        results = ["tie".to_string(), "tie".to_string()];
    }

    for (participant, (result, exception)) in participants.iter().zip(results.iter().zip(exceptions.iter())) {
        sqlx::query("UPDATE participants SET result = ?, exception = ? WHERE id = ?")
            .bind(result)
            .bind(exception)
            .bind(participant.id)
            .execute(&mut *tx)
            .await?;
    }

    if let Some(winner_bot_id) = winner_bot_id {
        sqlx::query("UPDATE games SET winner_id = ? WHERE id = ?")
            .bind(winner_bot_id)
            .bind(log.game_id.to_string())
            .execute(&mut *tx)
            .await?;
    }
    if let Some(bot_id) = suspend_bot_id {
        sqlx::query("UPDATE bots SET suspended = TRUE WHERE id = ?")
            .bind(bot_id)
            .execute(&mut *tx)
            .await?;
        warn!(bot_id, game_id = %log.game_id, "suspended bot after a crash");
    }

    for (i, state) in log.states.iter().enumerate() {
        let board = codec::encode_board(&state.board)?;
        sqlx::query(
            "INSERT INTO states (game_id, serial_no_within_game, board, next_side, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(log.game_id.to_string())
        .bind(i as i64)
        .bind(board)
        .bind(i64::from(u8::from(state.next_side)))
        .bind(encode_timestamp(Utc::now()))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct AfterQuery {
    after: Option<DateTime<Utc>>,
}

async fn get_part_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<AfterQuery>,
) -> Result<Json<Vec<ParticipantInfo>>, DispatcherError> {
    let bot = extract_bot(&headers, &state.db).await?;

    let mut sql = String::from(
        "SELECT id, game_id, bot_id, side, result, exception, created_at FROM participants \
         WHERE bot_id = ? AND result IS NOT NULL",
    );
    if q.after.is_some() {
        sql.push_str(" AND created_at > ?");
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT 20");

    let mut query = sqlx::query_as::<_, Participant>(&sql).bind(bot.id);
    if let Some(after) = q.after {
        query = query.bind(encode_timestamp(after));
    }
    let mut rows = query.fetch_all(state.db.pool()).await?;
    rows.reverse();

    let mut infos = Vec::with_capacity(rows.len());
    for p in rows {
        infos.push(ParticipantInfo {
            created_at: decode_timestamp(&p.created_at)?,
            result: p.result.unwrap_or_default(),
            exception: p.exception.as_deref().and_then(|raw| serde_json::from_str(raw).ok()),
        });
    }
    Ok(Json(infos))
}

async fn latest_versions_info(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<VersionInfo>>, DispatcherError> {
    let bot = extract_bot(&headers, &state.db).await?;

    let mut versions: Vec<CodeVersion> = sqlx::query_as(
        "SELECT id, created_at, bot_id, source, cls_name FROM code_versions \
         WHERE bot_id = ? ORDER BY created_at DESC LIMIT 20",
    )
    .bind(bot.id)
    .fetch_all(state.db.pool())
    .await?;
    versions.reverse();

    let mut infos = Vec::with_capacity(versions.len());
    for (i, version) in versions.iter().enumerate() {
        let window_end = versions.get(i + 1).map(|v| v.created_at.clone());

        let mut sql = String::from(
            "SELECT id, game_id, bot_id, side, result, exception, created_at FROM participants \
             WHERE bot_id = ? AND created_at >= ? AND result IS NOT NULL",
        );
        if window_end.is_some() {
            sql.push_str(" AND created_at < ?");
        }
        let mut query = sqlx::query_as::<_, Participant>(&sql).bind(bot.id).bind(version.created_at.clone());
        if let Some(end) = window_end {
            query = query.bind(end);
        }
        let participants = query.fetch_all(state.db.pool()).await?;

        // created_at is a fixed-width RFC 3339 string; its lexicographic
        // order matches chronological order, so plain max_by_key is enough.
        let latest_crash = participants
            .iter()
            .filter(|p| p.result.as_deref() == Some("crashed"))
            .max_by_key(|p| p.created_at.clone());

        let (exception, stats) = match latest_crash {
            Some(crashed) => {
                let exception = crashed.exception.as_deref().and_then(|raw| serde_json::from_str(raw).ok());
                (exception, None)
            }
            None => {
                let mut stats = GameStats::default();
                for p in &participants {
                    match p.result.as_deref() {
                        Some("victory") | Some("opponent_crashed") => stats.victories += 1,
                        Some("loss") => stats.losses += 1,
                        Some("tie") => stats.ties += 1,
                        _ => {}
                    }
                }
                (None, Some(stats))
            }
        };

        infos.push(VersionInfo {
            created_at: decode_timestamp(&version.created_at)?,
            loc: version.source.lines().count() as i64,
            exception,
            stats,
        });
    }

    Ok(Json(infos))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = DispatcherConfig::from_env()?;
    let db = Db::connect(&settings.database_url).await?;
    let state = AppState { db, http: reqwest::Client::new(), scheduler_url: settings.scheduler_url.clone() };

    let app = Router::new()
        .route("/update_code", post(update_code))
        .route("/game_result", post(game_result))
        .route("/get_part_info/", get(get_part_info))
        .route("/latest_versions_info/", get(latest_versions_info))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    info!(addr = %settings.bind_addr, "dispatcher listening");
    axum::serve(listener, app).await?;
    Ok(())
}
