//! Line editor with history, built on crossterm
//!
//! Supports:
//! - Up/Down for history
//! - Left/Right, Home/End (and Ctrl+A/Ctrl+E) for cursor movement
//! - Backspace/Delete, Ctrl+U to clear the line
//! - Ctrl+C to cancel the pending line, Ctrl+D on an empty line for EOF
//!
//! When stdin is not a terminal, lines are read plainly.

use std::io::{self, IsTerminal, Stdout, Write};

use crossterm::{
    ExecutableCommand,
    cursor::MoveToColumn,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{self, ClearType},
};

use super::InputHistory;
use crate::terminal::RawMode;

/// Outcome of one read
#[derive(Debug, PartialEq, Eq)]
pub enum ReadlineResult {
    Line(String),
    /// Ctrl+C: the pending line was dropped
    Interrupted,
    /// Ctrl+D on an empty line, or end of input
    Eof,
}

pub struct Readline {
    history: InputHistory,
    prompt: String,
}

/// The line being edited. Cursor positions count chars, not bytes.
#[derive(Debug, Default)]
struct LineBuffer {
    chars: Vec<char>,
    cursor: usize,
}

impl LineBuffer {
    fn text(&self) -> String {
        self.chars.iter().collect()
    }

    fn insert(&mut self, c: char) {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
    }

    fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.chars.remove(self.cursor);
        true
    }

    fn delete(&mut self) -> bool {
        if self.cursor >= self.chars.len() {
            return false;
        }
        self.chars.remove(self.cursor);
        true
    }

    fn left(&mut self) -> bool {
        let moved = self.cursor > 0;
        self.cursor = self.cursor.saturating_sub(1);
        moved
    }

    fn right(&mut self) -> bool {
        let moved = self.cursor < self.chars.len();
        if moved {
            self.cursor += 1;
        }
        moved
    }

    fn replace(&mut self, text: &str) {
        self.chars = text.chars().collect();
        self.cursor = self.chars.len();
    }
}

impl Readline {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            history: InputHistory::new(),
            prompt: prompt.into(),
        }
    }

    /// Print the prompt and read one line
    pub fn readline(&mut self) -> io::Result<ReadlineResult> {
        let mut stdout = io::stdout();
        print!("{}", self.prompt);
        stdout.flush()?;

        if !io::stdin().is_terminal() {
            return self.read_line_plain();
        }

        let result = {
            let _raw = RawMode::enable()?;
            self.read_line_raw(&mut stdout)
        };
        println!();

        if let Ok(ReadlineResult::Line(line)) = &result {
            self.history.push(line);
        }
        result
    }

    fn read_line_plain(&mut self) -> io::Result<ReadlineResult> {
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(ReadlineResult::Eof);
        }
        let line = input.trim_end_matches(['\r', '\n']).to_string();
        self.history.push(&line);
        Ok(ReadlineResult::Line(line))
    }

    fn prompt_width(&self) -> u16 {
        u16::try_from(self.prompt.chars().count()).unwrap_or(u16::MAX)
    }

    fn read_line_raw(&mut self, stdout: &mut Stdout) -> io::Result<ReadlineResult> {
        let mut line = LineBuffer::default();

        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind == KeyEventKind::Release {
                continue;
            }

            let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
            match key {
                KeyEvent {
                    code: KeyCode::Char('c'),
                    ..
                } if ctrl => return Ok(ReadlineResult::Interrupted),

                KeyEvent {
                    code: KeyCode::Char('d'),
                    ..
                } if ctrl => {
                    if line.chars.is_empty() {
                        return Ok(ReadlineResult::Eof);
                    }
                }

                KeyEvent {
                    code: KeyCode::Char('u'),
                    ..
                } if ctrl => {
                    line.replace("");
                    self.redraw(stdout, &line)?;
                }

                KeyEvent {
                    code: KeyCode::Char('a'),
                    ..
                }
                | KeyEvent {
                    code: KeyCode::Home,
                    ..
                } if ctrl || key.code == KeyCode::Home => {
                    line.cursor = 0;
                    self.place_cursor(stdout, &line)?;
                }

                KeyEvent {
                    code: KeyCode::Char('e'),
                    ..
                }
                | KeyEvent {
                    code: KeyCode::End,
                    ..
                } if ctrl || key.code == KeyCode::End => {
                    line.cursor = line.chars.len();
                    self.place_cursor(stdout, &line)?;
                }

                KeyEvent {
                    code: KeyCode::Enter,
                    ..
                } => return Ok(ReadlineResult::Line(line.text())),

                KeyEvent {
                    code: KeyCode::Up, ..
                } => {
                    let current = line.text();
                    if let Some(previous) = self.history.navigate_up(&current).map(str::to_string) {
                        line.replace(&previous);
                        self.redraw(stdout, &line)?;
                    }
                }

                KeyEvent {
                    code: KeyCode::Down,
                    ..
                } => {
                    if let Some(next) = self.history.navigate_down().map(str::to_string) {
                        line.replace(&next);
                        self.redraw(stdout, &line)?;
                    }
                }

                KeyEvent {
                    code: KeyCode::Left,
                    ..
                } => {
                    if line.left() {
                        self.place_cursor(stdout, &line)?;
                    }
                }

                KeyEvent {
                    code: KeyCode::Right,
                    ..
                } => {
                    if line.right() {
                        self.place_cursor(stdout, &line)?;
                    }
                }

                KeyEvent {
                    code: KeyCode::Backspace,
                    ..
                } => {
                    if line.backspace() {
                        self.redraw(stdout, &line)?;
                    }
                }

                KeyEvent {
                    code: KeyCode::Delete,
                    ..
                } => {
                    if line.delete() {
                        self.redraw(stdout, &line)?;
                    }
                }

                KeyEvent {
                    code: KeyCode::Char(c),
                    ..
                } if !ctrl => {
                    line.insert(c);
                    if line.cursor == line.chars.len() {
                        print!("{c}");
                        stdout.flush()?;
                    } else {
                        self.redraw(stdout, &line)?;
                    }
                }

                _ => {}
            }
        }
    }

    /// Rewrite everything after the prompt and restore the cursor
    fn redraw(&self, stdout: &mut Stdout, line: &LineBuffer) -> io::Result<()> {
        stdout.execute(MoveToColumn(self.prompt_width()))?;
        stdout.execute(terminal::Clear(ClearType::UntilNewLine))?;
        print!("{}", line.text());
        stdout.flush()?;
        self.place_cursor(stdout, line)
    }

    fn place_cursor(&self, stdout: &mut Stdout, line: &LineBuffer) -> io::Result<()> {
        let offset = u16::try_from(line.cursor).unwrap_or(u16::MAX);
        stdout.execute(MoveToColumn(self.prompt_width().saturating_add(offset)))?;
        Ok(())
    }
}
