pub mod executor;
pub mod protocol;

pub use executor::{SandboxedBot, Timeouts};
