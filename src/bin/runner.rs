//! Game Runner: accepts a `RunGameTask`, plays it out in a sandboxed child
//! process per bot, and posts the resulting `GameLog` back to the Dispatcher
//! callback through a single-consumer queue so retries on one game never
//! queue-jump another.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use bot_battle::config::{self, RunnerConfig};
use bot_battle::game::{run_game, GameLog};
use bot_battle::sandbox::Timeouts;
use bot_battle::wire::RunGameTask;

#[derive(Clone)]
struct AppState {
    results: mpsc::UnboundedSender<(String, GameLog)>,
    bot_host_path: Arc<PathBuf>,
    timeouts: Timeouts,
}

async fn accept_task(State(state): State<AppState>, Json(task): Json<RunGameTask>) -> StatusCode {
    info!(
        game_id = %task.game_id,
        blue = %task.blue_code.cls_name,
        red = %task.red_code.cls_name,
        "accepted game task"
    );
    tokio::spawn(async move {
        let log = run_game(task.game_id, &state.bot_host_path, &task.blue_code, &task.red_code, &state.timeouts).await;
        if let Some(exception) = &log.exception {
            warn!(game_id = %log.game_id, side = %exception.caused_by_side, msg = %exception.msg, "bot fault during game");
        }
        if state.results.send((task.callback.clone(), log)).is_err() {
            error!(game_id = %task.game_id, "result queue closed; dropping game result");
        }
    });
    StatusCode::ACCEPTED
}

/// The single consumer of the result queue: posts callbacks strictly in the
/// order games finish producing a result, retrying each one to completion
/// before moving on to the next.
async fn process_result_queue(mut results: mpsc::UnboundedReceiver<(String, GameLog)>) {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("building the callback http client");

    while let Some((callback, log)) = results.recv().await {
        info!(game_id = %log.game_id, %callback, "posting game result");
        post_with_retry(&client, &callback, &log).await;
    }
}

/// Retries on connection failure with initial delay 3s, multiplier 1.5 and
/// jitter of +/-1s, indefinitely: the Dispatcher must eventually come back,
/// and a dropped result here would silently strand a finished game.
async fn post_with_retry(client: &reqwest::Client, callback: &str, log: &GameLog) {
    let mut delay = Duration::from_secs(3);
    let mut attempt: u32 = 1;

    loop {
        match client.post(callback).json(log).send().await {
            Ok(response) if response.status().is_success() => return,
            Ok(response) => {
                warn!(game_id = %log.game_id, status = %response.status(), attempt, "callback rejected");
            }
            Err(e) => {
                warn!(game_id = %log.game_id, error = %e, attempt, "callback request failed");
            }
        }

        let jitter = rand::rng().random_range(-1.0..=1.0);
        let wait = (delay.as_secs_f64() + jitter).max(0.0);
        tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        delay = delay.mul_f64(1.5);
        attempt += 1;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = RunnerConfig::from_env()?;
    let (sender, receiver) = mpsc::unbounded_channel();
    tokio::spawn(process_result_queue(receiver));

    let state = AppState {
        results: sender,
        bot_host_path: Arc::new(settings.bot_host_path.clone()),
        timeouts: Timeouts { init: settings.init_timeout, r#move: settings.move_timeout },
    };

    let app = Router::new()
        .route("/", post(accept_task))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    info!(addr = %settings.bind_addr, "runner listening");
    axum::serve(listener, app).await?;
    Ok(())
}
