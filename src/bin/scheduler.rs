//! Matchmaking & pacing: picks which bots play next and submits `RunGameTask`s
//! to the Runner through a leaky-bucket rate limiter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

use bot_battle::config::{self, SchedulerConfig};
use bot_battle::leaky_bucket::LeakyBucket;
use bot_battle::matchmaker::{self, BotId, Limits, Pairing};
use bot_battle::persistence::codec::encode_timestamp;
use bot_battle::persistence::models::CodeVersion;
use bot_battle::persistence::Db;
use bot_battle::side::Side;
use bot_battle::wire::{Code, RunGameTask};

#[derive(Clone)]
struct AppState {
    db: Db,
    http: reqwest::Client,
    runner_url: String,
    callback_url: String,
    limits: Limits,
    bucket: Arc<LeakyBucket>,
    pass_in_flight: Arc<AtomicBool>,
    rerun_requested: Arc<AtomicBool>,
}

#[derive(Debug, Error)]
enum SchedulerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

async fn trigger(State(state): State<AppState>) -> StatusCode {
    if state.pass_in_flight.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
        tokio::spawn(run_until_quiescent(state));
    } else {
        debug!("scheduling pass already in flight; requesting a follow-up pass");
        state.rerun_requested.store(true, Ordering::SeqCst);
    }
    StatusCode::ACCEPTED
}

async fn run_until_quiescent(state: AppState) {
    coalesce_passes(&state.pass_in_flight, &state.rerun_requested, || async {
        if let Err(e) = run_pass(&state).await {
            error!(error = %e, "scheduling pass failed");
        }
    })
    .await;
}

/// Runs `pass` back to back until it completes with no trigger having
/// arrived during it, then releases `pass_in_flight`. A trigger that lands
/// mid-pass sets `rerun_requested` instead of spawning its own task, so it
/// is guaranteed exactly one follow-up pass rather than being silently
/// dropped if it loses the race to whatever bot's trigger happens to fire
/// next. `pass_in_flight` must already be held (set to `true`) by the
/// caller before this is called.
async fn coalesce_passes<F, Fut>(pass_in_flight: &AtomicBool, rerun_requested: &AtomicBool, mut pass: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    loop {
        pass().await;

        if rerun_requested.swap(false, Ordering::SeqCst) {
            continue;
        }

        pass_in_flight.store(false, Ordering::SeqCst);

        // A trigger may have slipped in between the check above and the
        // store just now; reclaim the flight flag if so rather than lose it.
        if rerun_requested.swap(false, Ordering::SeqCst)
            && pass_in_flight.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
        {
            continue;
        }
        break;
    }
}

async fn run_pass(state: &AppState) -> Result<(), SchedulerError> {
    let pairings = matchmaker::schedule_games(state.db.pool(), state.limits).await?;
    debug!(pair_count = pairings.len(), "starting schedule pass");

    for pairing in pairings {
        state
            .bucket
            .throttle(|| async {
                if let Err(e) = submit_game(state, pairing).await {
                    warn!(error = %e, "failed to submit a scheduled game");
                }
            })
            .await;
    }

    Ok(())
}

async fn submit_game(state: &AppState, pairing: Pairing) -> Result<(), SchedulerError> {
    let blue_code = load_latest_code(state, pairing.blue).await?;
    let red_code = load_latest_code(state, pairing.red).await?;
    let game_id = Uuid::new_v4();

    let mut tx = state.db.pool().begin().await?;
    sqlx::query("INSERT INTO games (id, created_at, winner_id) VALUES (?, ?, NULL)")
        .bind(game_id.to_string())
        .bind(encode_timestamp(Utc::now()))
        .execute(&mut *tx)
        .await?;
    for (bot, side) in [(pairing.blue, Side::Blue), (pairing.red, Side::Red)] {
        sqlx::query("INSERT INTO participants (game_id, bot_id, side, created_at) VALUES (?, ?, ?, ?)")
            .bind(game_id.to_string())
            .bind(bot.0)
            .bind(i64::from(u8::from(side)))
            .bind(encode_timestamp(Utc::now()))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    let task = RunGameTask { game_id, callback: state.callback_url.clone(), blue_code, red_code };
    if let Err(e) = state.http.post(&state.runner_url).json(&task).send().await {
        warn!(error = %e, runner_url = %state.runner_url, "failed to submit task to runner");
    }
    Ok(())
}

async fn load_latest_code(state: &AppState, bot: BotId) -> Result<Code, SchedulerError> {
    let version: CodeVersion = sqlx::query_as(
        "SELECT id, created_at, bot_id, source, cls_name FROM code_versions \
         WHERE bot_id = ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(bot.0)
    .fetch_one(state.db.pool())
    .await?;
    Ok(Code { source: version.source, cls_name: version.cls_name })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = SchedulerConfig::from_env()?;
    let db = Db::connect(&settings.database_url).await?;
    let bucket = Arc::new(LeakyBucket::new(settings.bucket_size, settings.requests_per_minute));
    let limits = Limits {
        min_games_per_version: settings.min_games_per_version,
        max_bots_to_schedule: settings.max_bots_to_schedule,
        max_games_to_schedule: settings.max_games_to_schedule,
    };
    let state = AppState {
        db,
        http: reqwest::Client::new(),
        runner_url: settings.runner_url.clone(),
        callback_url: settings.callback_url(),
        limits,
        bucket,
        pass_in_flight: Arc::new(AtomicBool::new(false)),
        rerun_requested: Arc::new(AtomicBool::new(false)),
    };

    let app = Router::new()
        .route("/", post(trigger))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "scheduler listening");
    axum::serve(listener, app).await?;
    Ok(())
}
