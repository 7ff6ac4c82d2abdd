//! line sources for the interactive loop

use std::io::{self, BufRead, Write};

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    Line(String),
    /// Ctrl+C at the prompt
    Interrupted,
    Eof,
}

pub trait LineReader {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadEvent>;
}

impl LineReader for DefaultEditor {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadEvent> {
        match self.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.add_history_entry(line.as_str());
                }
                Ok(ReadEvent::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(ReadEvent::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadEvent::Eof),
            Err(ReadlineError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::other(e.to_string())),
        }
    }
}

/// plain buffered reader, for piped input and tests; the prompt is echoed
/// to `echo` when one is given
pub struct BufReadLines<R> {
    reader: R,
    echo: Option<Box<dyn Write>>,
}

impl<R: BufRead> BufReadLines<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, echo: None }
    }

    pub fn with_echo(mut self, echo: Box<dyn Write>) -> Self {
        self.echo = Some(echo);
        self
    }
}

impl<R: BufRead> LineReader for BufReadLines<R> {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadEvent> {
        if let Some(echo) = self.echo.as_mut() {
            echo.write_all(prompt.as_bytes())?;
            echo.flush()?;
        }
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(ReadEvent::Eof);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(ReadEvent::Line(line))
    }
}
