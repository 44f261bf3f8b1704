//! Terminal helpers

mod clear;
mod raw;

pub use clear::clear_command;
pub use raw::RawMode;
