pub mod codec;
pub mod db;
pub mod models;

pub use db::Db;
pub use models::{Bot, CodeVersion, Game, Participant, StoredState};
