//! The I/O boundary every observable effect of a program goes through.
//!
//! - [`StdConsole`]: the process's stdout and stdin (or a scripted reader)
//! - [`BufferConsole`]: captured output and queued input, for tests and embedding

use std::{
    collections::VecDeque,
    io::{self, BufRead, Write},
    thread,
    time::Duration,
};

/// Console capability consumed by the interpreter. Every call completes
/// before the next statement runs.
pub trait Console {
    fn write_line(&mut self, text: &str) -> io::Result<()>;

    fn write(&mut self, text: &str) -> io::Result<()>;

    /// Next input line without its terminator, or `None` once input is exhausted.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    fn read_key(&mut self) -> io::Result<Option<char>>;

    fn clear(&mut self) -> io::Result<()>;
}

pub struct StdConsole {
    input: Box<dyn BufRead>,
    pacing: Option<Duration>,
}

impl StdConsole {
    pub fn new() -> Self {
        Self {
            input: Box::new(io::stdin().lock()),
            pacing: None,
        }
    }

    pub fn with_input(mut self, input: Box<dyn BufRead>) -> Self {
        self.input = input;
        self
    }

    pub fn with_pacing(mut self, pacing: Option<Duration>) -> Self {
        self.pacing = pacing.filter(|delay| !delay.is_zero());
        self
    }

    fn flush_and_pace(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(delay) = self.pacing {
            thread::sleep(delay);
        }
        Ok(())
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdConsole {
    fn write_line(&mut self, text: &str) -> io::Result<()> {
        writeln!(io::stdout(), "{text}")?;
        self.flush_and_pace()
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        write!(io::stdout(), "{text}")?;
        self.flush_and_pace()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(trim_line_ending(line)))
    }

    fn read_key(&mut self) -> io::Result<Option<char>> {
        Ok(self.read_line()?.map(|line| first_key(&line)))
    }

    fn clear(&mut self) -> io::Result<()> {
        write!(io::stdout(), "\x1b[2J\x1b[H")?;
        io::stdout().flush()
    }
}

#[derive(Debug, Default, Clone)]
pub struct BufferConsole {
    output: String,
    input: VecDeque<String>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            output: String::new(),
            input: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push_input(&mut self, line: impl Into<String>) {
        self.input.push_back(line.into());
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn lines(&self) -> Vec<&str> {
        self.output.lines().collect()
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

impl Console for BufferConsole {
    fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.output.push_str(text);
        self.output.push('\n');
        Ok(())
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        self.output.push_str(text);
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.input.pop_front())
    }

    fn read_key(&mut self) -> io::Result<Option<char>> {
        Ok(self.input.pop_front().map(|line| first_key(&line)))
    }

    fn clear(&mut self) -> io::Result<()> {
        self.output.clear();
        Ok(())
    }
}

fn trim_line_ending(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

/// A key press read from a line: its first character, or Enter for an empty line.
fn first_key(line: &str) -> char {
    line.chars().next().unwrap_or('\r')
}
