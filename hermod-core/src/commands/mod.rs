//! Command dispatch
//!
//! - [`CommandDispatcher`]: resolves a name across built-ins and plugins and
//!   runs it, turning every failure into a [`hermod_plugin_api::CommandResult`]
//! - built-ins: `help`, `load-plugin`, `unload-plugin`, `get-plugins`,
//!   `get-topics`, `quit`

pub(crate) mod builtins;
mod dispatcher;

pub use dispatcher::CommandDispatcher;
