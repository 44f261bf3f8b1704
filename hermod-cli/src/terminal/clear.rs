//! The `clear` shell command

use std::io;

use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use hermod_plugin_api::{Command, CommandArgs, CommandOption, CommandResult, ParseStyle};

/// `clear [--secure/-s]`: clear the screen, and with `--secure` the
/// scrollback as well
pub fn clear_command() -> Command {
    let options = vec![CommandOption::flag("secure", Some('s'))];
    let parse_options = options.clone();

    let command = Command::new("clear", "Clears the terminal", move |args| {
        let parsed = CommandArgs::parse(args, &parse_options, ParseStyle::Posix)?;

        let mut stdout = io::stdout();
        execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
        if parsed.has_flag("secure") {
            execute!(stdout, Clear(ClearType::Purge))?;
        }
        Ok(CommandResult::empty())
    })
    .with_long_description("clear [--secure]\n\nClears the visible screen. --secure also purges the scrollback buffer.");

    options.into_iter().fold(command, Command::with_option)
}
