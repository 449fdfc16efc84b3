use rustyline::{error::ReadlineError, DefaultEditor};

use crate::{
    ast::ExprKind,
    config::RunConfig,
    console::{Console, StdConsole},
    diagnostics::{Result, SharplingError},
    parser,
    runtime::{Interpreter, RunOutcome},
    segmenter,
};

/// Interactive session. Functions and variables persist across entries;
/// input with unclosed brackets continues on the next line.
pub struct Repl {
    interpreter: Interpreter<StdConsole>,
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

impl Repl {
    pub fn new() -> Self {
        Self::with_config(RunConfig::default())
    }

    pub fn with_config(config: RunConfig) -> Self {
        let console = StdConsole::new().with_pacing(config.pacing);
        Self {
            interpreter: Interpreter::with_config(console, config),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        let mut pending = String::new();
        loop {
            let prompt = if pending.is_empty() { "cs> " } else { "... " };
            match editor.readline(prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if pending.is_empty() {
                        match trimmed {
                            ":quit" | ":exit" => break,
                            ":reset" => {
                                self.interpreter.reset();
                                continue;
                            }
                            ":vars" => {
                                self.list_bindings()?;
                                continue;
                            }
                            "" => continue,
                            _ => {}
                        }
                    }
                    pending.push_str(&line);
                    pending.push('\n');
                    if segmenter::is_incomplete(&pending) {
                        continue;
                    }
                    let entry = std::mem::take(&mut pending);
                    editor.add_history_entry(entry.trim()).ok();
                    self.submit(entry.trim())?;
                }
                Err(ReadlineError::Interrupted) if !pending.is_empty() => pending.clear(),
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        Ok(())
    }

    /// A lone expression is evaluated and echoed; anything else runs as
    /// statements and declarations.
    fn submit(&mut self, entry: &str) -> Result<()> {
        if !entry.ends_with(';') && !entry.ends_with('}') {
            if let Ok(expr) = parser::parse_expression(entry) {
                if !matches!(expr.kind, ExprKind::UserCall(_)) {
                    return self.echo(entry);
                }
            }
        }
        match self.interpreter.execute_snippet(entry) {
            Ok(RunOutcome::Completed { value: Some(value) }) if !value.is_null() => {
                self.interpreter.console_mut().write_line(&value.to_string())?;
            }
            Ok(_) => {}
            Err(SharplingError::Diagnostic(diag)) => eprintln!("{diag}"),
            Err(other) => return Err(other),
        }
        Ok(())
    }

    fn echo(&mut self, entry: &str) -> Result<()> {
        match self.interpreter.evaluate_source(entry) {
            Ok(value) if value.is_null() => {}
            Ok(value) => self.interpreter.console_mut().write_line(&value.to_string())?,
            Err(SharplingError::Diagnostic(diag)) => eprintln!("{diag}"),
            Err(other) => return Err(other),
        }
        Ok(())
    }

    fn list_bindings(&mut self) -> Result<()> {
        let mut lines = Vec::new();
        for name in self.interpreter.visible_names() {
            if let Some(value) = self.interpreter.global(&name) {
                lines.push(format!("{name} = {value:?}"));
            }
        }
        for name in self.interpreter.function_names() {
            lines.push(format!("{name}()"));
        }
        let console = self.interpreter.console_mut();
        for line in lines {
            console.write_line(&line)?;
        }
        Ok(())
    }
}

fn readline_error(err: ReadlineError) -> SharplingError {
    SharplingError::from(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
}
