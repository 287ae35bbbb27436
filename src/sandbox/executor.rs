//! Wraps one bot-host child process with init/move deadlines and exception
//! capture so a misbehaving bot can never block or crash the game engine.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::time::timeout;
use tracing::warn;

use crate::board::{self, State};
use crate::game::state::{ExceptionInfo, FailureKind};
use crate::sandbox::protocol::{self, BotMessage, HostMessage};
use crate::side::Side;
use crate::wire::Code;

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub init: Duration,
    pub r#move: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { init: Duration::from_millis(200), r#move: Duration::from_millis(100) }
    }
}

/// A running bot-host child process, bound to one side for the lifetime of
/// a single game.
#[derive(Debug)]
pub struct SandboxedBot {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr_relay: tokio::task::JoinHandle<()>,
    side: Side,
}

impl SandboxedBot {
    /// Spawns `bot_host`, hands it `code` over the IPC channel and waits for
    /// a `Ready` acknowledgement within `timeouts.init`.
    pub async fn spawn(
        bot_host: &Path,
        code: &Code,
        side: Side,
        timeouts: &Timeouts,
    ) -> Result<Self, ExceptionInfo> {
        let mut child = tokio::process::Command::new(bot_host)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExceptionInfo::new(FailureKind::InitFailed, side, format!("failed to spawn bot host: {e}")))?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");
        let stderr_relay = spawn_stderr_relay(stderr, side);

        let mut bot =
            Self { child, stdin, stdout, stderr_relay, side };

        let init = HostMessage::Init { side, code: code.clone() };
        let handshake = async {
            protocol::write_frame(&mut bot.stdin, &init).await?;
            protocol::read_frame::<_, BotMessage>(&mut bot.stdout).await
        };

        match timeout(timeouts.init, handshake).await {
            Ok(Ok(BotMessage::Ready)) => Ok(bot),
            Ok(Ok(BotMessage::Error { msg })) => {
                bot.kill().await;
                Err(ExceptionInfo::new(FailureKind::InitFailed, side, msg))
            }
            Ok(Ok(BotMessage::Move { .. })) => {
                bot.kill().await;
                Err(ExceptionInfo::new(FailureKind::InitFailed, side, "bot sent a move before init completed"))
            }
            Ok(Err(e)) => {
                bot.kill().await;
                Err(ExceptionInfo::new(FailureKind::InitFailed, side, e))
            }
            Err(_elapsed) => {
                bot.kill().await;
                Err(ExceptionInfo::new(FailureKind::InitTimedOut, side, format!("init exceeded {:?}", timeouts.init)))
            }
        }
    }

    /// Requests a move for `state`, enforcing `timeouts.move` and validating
    /// the response against board rules. Returns the chosen column on
    /// success; any failure is final for this bot.
    pub async fn invoke_move(&mut self, state: &State, timeouts: &Timeouts) -> Result<i64, ExceptionInfo> {
        let side = self.side;
        let request = HostMessage::Move { state: state.clone() };
        let round_trip = async {
            protocol::write_frame(&mut self.stdin, &request).await?;
            protocol::read_frame::<_, BotMessage>(&mut self.stdout).await
        };

        let response = match timeout(timeouts.r#move, round_trip).await {
            Ok(Ok(message)) => message,
            Ok(Err(e)) => {
                self.kill().await;
                return Err(ExceptionInfo::new(FailureKind::Raises, side, e));
            }
            Err(_elapsed) => {
                // The straggler is abandoned, not awaited: we don't poll the
                // pipe again, we just kill the process outright.
                self.kill().await;
                return Err(ExceptionInfo::new(FailureKind::Hangs, side, format!("move exceeded {:?}", timeouts.r#move)));
            }
        };

        match response {
            BotMessage::Move { col } => self.validate_move(state, col),
            BotMessage::Error { msg } => {
                self.kill().await;
                Err(ExceptionInfo::new(FailureKind::Raises, side, msg))
            }
            BotMessage::Ready => {
                self.kill().await;
                Err(ExceptionInfo::new(FailureKind::Raises, side, "bot sent Ready instead of a move"))
            }
        }
    }

    fn validate_move(&self, state: &State, col: serde_json::Value) -> Result<i64, ExceptionInfo> {
        let width = state.board.width() as i64;
        let parsed = col.as_i64().filter(|&c| (0..width).contains(&c));
        match parsed {
            None => Err(ExceptionInfo::new(FailureKind::InvalidMove, self.side, format!("expected an integer in [0, {width})")).with_move(col)),
            Some(c) if board::column_full(state, c as usize) => {
                Err(ExceptionInfo::new(FailureKind::MoveBreaksRules, self.side, format!("column {c} is full")).with_move(col))
            }
            Some(c) => Ok(c),
        }
    }

    pub async fn shutdown(mut self) {
        self.kill().await;
    }

    async fn kill(&mut self) {
        self.stderr_relay.abort();
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}

fn spawn_stderr_relay(stderr: tokio::process::ChildStderr, side: Side) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            warn!(%side, bot_stderr = %line, "bot wrote to stderr");
        }
    })
}
