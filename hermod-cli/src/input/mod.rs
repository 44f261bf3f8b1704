//! Line input for the interactive shell

mod history;
mod readline;

pub use history::InputHistory;
pub use readline::{ReadlineResult, Readline};
