//! CLI argument types and parsing helpers.
mod cli;
pub(crate) mod parsers;
mod types;


pub use cli::WorkerArgs;
pub use types::{ListenAddress, PositiveU64, PositiveUsize};
