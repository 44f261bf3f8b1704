//! Interactive read-eval loop

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use hermod_core::Hermod;
use hermod_plugin_api::CommandResult;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::input::{Readline, ReadlineResult};

const PROMPT: &str = "hermod> ";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SplitError {
    #[error("Unterminated {0} quote")]
    UnterminatedQuote(char),
    #[error("Trailing backslash")]
    TrailingEscape,
}

/// Split a line into words the way a POSIX shell would
///
/// Whitespace separates words. Single quotes keep everything literally,
/// double quotes allow `\"` and `\\`, and a backslash outside quotes escapes
/// the next character. `""` yields an empty word.
pub fn split_line(line: &str) -> Result<Vec<String>, SplitError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(SplitError::UnterminatedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\')) => current.push(escaped),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(SplitError::UnterminatedQuote('"')),
                        },
                        Some(c) => current.push(c),
                        None => return Err(SplitError::UnterminatedQuote('"')),
                    }
                }
            }
            '\\' => {
                in_word = true;
                current.push(chars.next().ok_or(SplitError::TrailingEscape)?);
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Print a command outcome: successes on stdout, errors on stderr
pub fn report(result: &CommandResult) {
    if result.is_error() {
        eprintln!("{result}");
        return;
    }
    match (result.message_text(), result.payload()) {
        (Some(message), _) if !message.is_empty() => println!("{message}"),
        (_, Some(payload)) => match serde_json::to_string_pretty(payload) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Could not render result: {e}"),
        },
        _ => {}
    }
}

/// Runs the blocking line editor off the runtime so reads can race Ctrl-C
///
/// An interrupted read cannot be torn down; it stays pending and the line
/// it eventually returns is dropped.
struct Reader {
    idle: Option<Readline>,
    pending: Option<JoinHandle<(Readline, io::Result<ReadlineResult>)>>,
    discard: bool,
}

impl Reader {
    fn new() -> Self {
        Self {
            idle: Some(Readline::new(PROMPT)),
            pending: None,
            discard: false,
        }
    }

    fn spawn(&mut self) -> Result<JoinHandle<(Readline, io::Result<ReadlineResult>)>> {
        let mut readline = self.idle.take().context("Line editor is not available")?;
        Ok(tokio::task::spawn_blocking(move || {
            let result = readline.readline();
            (readline, result)
        }))
    }

    async fn next(&mut self) -> Result<ReadlineResult> {
        loop {
            let mut read = match self.pending.take() {
                Some(read) => read,
                None => self.spawn()?,
            };

            tokio::select! {
                joined = &mut read => {
                    let (readline, result) = joined?;
                    self.idle = Some(readline);
                    let result = result?;
                    if std::mem::take(&mut self.discard) && matches!(result, ReadlineResult::Line(_)) {
                        continue;
                    }
                    return Ok(result);
                }
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    self.pending = Some(read);
                    self.discard = true;
                    print!("\n{PROMPT}");
                    io::stdout().flush()?;
                    return Ok(ReadlineResult::Interrupted);
                }
            }
        }
    }
}

/// Read, dispatch and print until `quit`, end of input, or Ctrl-C while a
/// command runs
pub async fn run(hermod: Arc<Hermod>) -> Result<()> {
    let mut reader = Reader::new();

    while hermod.keep_alive() {
        let line = match reader.next().await? {
            ReadlineResult::Line(line) => line,
            ReadlineResult::Interrupted => continue,
            ReadlineResult::Eof => break,
        };

        let words = match split_line(&line) {
            Ok(words) if words.is_empty() => continue,
            Ok(words) => words,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        tracing::debug!(command = %words[0], "Executing");
        let command = hermod.dispatcher().execute_async(words);
        tokio::pin!(command);

        let mut interrupted = false;
        let result = tokio::select! {
            result = &mut command => result,
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted, waiting for the running command");
                interrupted = true;
                command.await
            }
        };
        report(&result);

        if interrupted {
            break;
        }
    }

    Ok(())
}
