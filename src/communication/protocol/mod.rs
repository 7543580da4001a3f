mod io;
mod types;

pub use io::{read_message, write_message};
pub use types::*;
