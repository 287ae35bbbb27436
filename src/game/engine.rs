//! The turn loop: drives two sandboxed bots to completion or to a fault.

use uuid::Uuid;

use crate::board::{self, State};
use crate::game::state::{ExceptionInfo, GameLog};
use crate::sandbox::executor::{SandboxedBot, Timeouts};
use crate::side::Side;
use crate::wire::Code;

/// Plays one game between `blue_code` and `red_code`, returning a
/// [`GameLog`] with either a populated `winner` (or neither, meaning a tie)
/// or an `exception` attributing the fault. Never both.
pub async fn run_game(
    game_id: Uuid,
    bot_host: &std::path::Path,
    blue_code: &Code,
    red_code: &Code,
    timeouts: &Timeouts,
) -> GameLog {
    let mut states = Vec::new();

    let (mut blue, mut red) = match init_both(bot_host, blue_code, red_code, timeouts).await {
        Ok(bots) => bots,
        Err(exception) => return GameLog { game_id, states, winner: None, exception: Some(exception) },
    };

    let mut state = State::new();
    let mut current_side = Side::Blue;

    loop {
        states.push(state.clone());

        let winners = board::winners(&state);
        if !winners.is_empty() {
            let winner = if winners.len() == 1 { Some(winners[0]) } else { None };
            blue.shutdown().await;
            red.shutdown().await;
            return GameLog { game_id, states, winner, exception: None };
        }

        let current_bot = match current_side {
            Side::Blue => &mut blue,
            Side::Red => &mut red,
        };

        match current_bot.invoke_move(&state, timeouts).await {
            Ok(col) => {
                board::drop_token(&mut state, col, None)
                    .expect("executor already validated the move is legal");
                current_side = current_side.other();
            }
            Err(exception) => {
                blue.shutdown().await;
                red.shutdown().await;
                return GameLog { game_id, states, winner: None, exception: Some(exception) };
            }
        }
    }
}

async fn init_both(
    bot_host: &std::path::Path,
    blue_code: &Code,
    red_code: &Code,
    timeouts: &Timeouts,
) -> Result<(SandboxedBot, SandboxedBot), ExceptionInfo> {
    let (blue, red) = tokio::join!(
        SandboxedBot::spawn(bot_host, blue_code, Side::Blue, timeouts),
        SandboxedBot::spawn(bot_host, red_code, Side::Red, timeouts),
    );
    match (blue, red) {
        (Ok(blue), Ok(red)) => Ok((blue, red)),
        (Ok(blue), Err(exception)) => {
            blue.shutdown().await;
            Err(exception)
        }
        (Err(exception), Ok(red)) => {
            red.shutdown().await;
            Err(exception)
        }
        (Err(exception), Err(_other)) => Err(exception),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::executor::Timeouts;
    use std::time::Duration;

    /// `run_game` against a nonexistent bot host must fail fast with an
    /// `INIT_FAILED`/process-spawn style exception rather than hang.
    #[tokio::test]
    async fn run_game_surfaces_spawn_failure_as_exception() {
        let timeouts = Timeouts { init: Duration::from_millis(200), r#move: Duration::from_millis(100) };
        let code = Code { source: String::new(), cls_name: String::new() };
        let log = run_game(
            Uuid::nil(),
            std::path::Path::new("/nonexistent/bot-host-binary"),
            &code,
            &code,
            &timeouts,
        )
        .await;
        assert!(log.exception.is_some());
        assert!(log.winner.is_none());
        assert!(log.states.is_empty());
    }
}
