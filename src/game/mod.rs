pub mod engine;
pub mod state;

pub use engine::run_game;
pub use state::{ExceptionInfo, FailureKind, GameLog};
