use std::{
    fs,
    io::BufReader,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sharpling::{Interpreter, Repl, RunConfig, RunOutcome, SharplingError, StdConsole};

#[derive(Parser)]
#[command(author, version, about = "Interpreter for a subset of C#")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a C# source file
    Run {
        file: PathBuf,
        /// Read console input from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        options: RunOptions,
    },
    /// Start an interactive session
    Repl {
        #[command(flatten)]
        options: RunOptions,
    },
    /// Run a snippet of statements
    Eval {
        source: String,
        #[command(flatten)]
        options: RunOptions,
    },
}

#[derive(ClapArgs)]
struct RunOptions {
    /// Pause after every console write, in milliseconds
    #[arg(long, default_value_t = 0)]
    pace_ms: u64,
    /// Deepest chain of nested user-function calls
    #[arg(long, default_value_t = sharpling::config::DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            pace_ms: 0,
            max_call_depth: sharpling::config::DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl RunOptions {
    fn config(&self) -> RunConfig {
        RunConfig::default()
            .with_max_call_depth(self.max_call_depth)
            .with_pacing_ms(self.pace_ms)
    }
}

/// Installs a stderr subscriber when `RUST_LOG` is set.
fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true).with_level(true))
        .with(EnvFilter::from_default_env())
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let result = match args.command.unwrap_or(Command::Repl {
        options: RunOptions::default(),
    }) {
        Command::Run {
            file,
            input,
            options,
        } => run_file(&file, input.as_deref(), options.config()),
        Command::Repl { options } => Repl::with_config(options.config()).run().map(|()| true),
        Command::Eval { source, options } => {
            let config = options.config();
            let console = StdConsole::new().with_pacing(config.pacing);
            let mut interpreter = Interpreter::with_config(console, config);
            interpreter
                .execute_snippet(&source)
                .map(|outcome| outcome.is_completed())
        }
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(SharplingError::Diagnostic(diag)) => {
            eprintln!("{diag}");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_file(path: &Path, input: Option<&Path>, config: RunConfig) -> Result<bool, SharplingError> {
    let source = fs::read_to_string(path)?;
    let mut console = StdConsole::new().with_pacing(config.pacing);
    if let Some(input) = input {
        console = console.with_input(Box::new(BufReader::new(fs::File::open(input)?)));
    }
    let mut interpreter = Interpreter::with_config(console, config);
    match interpreter.run(&source)? {
        RunOutcome::Completed { .. } => Ok(true),
        RunOutcome::Aborted(diag) => {
            tracing::debug!(error = %diag, path = %path.display(), "program aborted");
            Ok(false)
        }
    }
}
