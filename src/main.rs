// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use oxilink::{
    path::default_settings_file, Command, Linker, PolicyResolver, Reaction, Session,
    SessionConfig, TextPrompt,
};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use inquire::Text;
use std::{fs, io::ErrorKind, path::PathBuf, process::exit, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(about, version)]
struct Cli {
    /// Directory to start browsing from.
    #[arg(value_name = "directory")]
    pub directory: Option<PathBuf>,

    /// Settings file to load instead of the default location.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Permission policy document to load instead of discovering one.
    #[arg(short, long, value_name = "path")]
    pub policy: Option<PathBuf>,
}

/// Line of input from the interactive loop.
enum Input {
    Run(Command),
    Help,
    Quit,
    Noop,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer().compact().with_target(false).without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    let resolver = match cli.policy {
        Some(path) => PolicyResolver::from_file(path)?,
        None => PolicyResolver::discover(&config.policy),
    };
    let mut session = Session::bootstrap(
        cli.directory,
        &config.settings.start_dirs,
        Linker::new(resolver),
    )?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    render(&session);
    loop {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match parse_input(&line) {
            Input::Quit => break,
            Input::Help => print_help(),
            Input::Noop => render(&session),
            Input::Run(command) => session = step(session, command).await?,
        }
    }

    Ok(())
}

fn load_config(cli_path: Option<PathBuf>) -> Result<SessionConfig> {
    if let Some(path) = cli_path {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("cannot read settings file {:?}", path.display()))?;
        return Ok(content.parse()?);
    }

    let Ok(path) = default_settings_file() else {
        return Ok(SessionConfig::default());
    };
    match fs::read_to_string(&path) {
        Ok(content) => Ok(content.parse()?),
        Err(error) if error.kind() == ErrorKind::NotFound => {
            info!("no settings file at {:?}, using defaults", path.display());
            Ok(SessionConfig::default())
        }
        Err(error) => Err(error)
            .with_context(|| format!("cannot read settings file {:?}", path.display())),
    }
}

/// Run one command against the session and report its reaction.
async fn step(session: Session, command: Command) -> Result<Session> {
    let spinner = matches!(command, Command::Deploy).then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_message("linking selection");
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    });

    let (mut session, reaction) = dispatch(session, command).await?;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match reaction {
        Reaction::Done => render(&session),
        Reaction::Refused(refusal) => {
            bell();
            println!("refused: {refusal}");
            render(&session);
        }
        Reaction::Deployed { deployed, failed } => {
            if failed > 0 {
                bell();
            }
            println!("deployed {deployed} selection(s), {failed} failed");
            render(&session);
        }
        Reaction::Prompt(prompt) => session = answer_prompt(session, prompt).await?,
    }

    Ok(session)
}

/// Move the session onto a blocking thread for one command.
async fn dispatch(mut session: Session, command: Command) -> Result<(Session, Reaction)> {
    // INVARIANT: One command mutates the session at a time. The session
    // comes back from the blocking thread before the next line is read.
    let handle = tokio::task::spawn_blocking(move || {
        let reaction = session.apply(command);
        (session, reaction)
    });

    Ok(handle.await?)
}

async fn answer_prompt(session: Session, prompt: TextPrompt) -> Result<Session> {
    let answer = tokio::task::spawn_blocking(move || match prompt {
        TextPrompt::Rename { current } => Text::new("rename directory to:")
            .with_initial_value(&current)
            .prompt(),
        TextPrompt::NewDirectory => Text::new("new directory name:").prompt(),
    })
    .await?;

    let command = match answer {
        Ok(text) => Command::Submit(text),
        Err(_) => Command::CancelInput,
    };
    let (session, reaction) = dispatch(session, command).await?;
    if let Reaction::Refused(refusal) = reaction {
        bell();
        println!("refused: {refusal}");
    }
    render(&session);

    Ok(session)
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        "q" | "quit" => Input::Quit,
        "h" => Input::Run(Command::GoUp),
        "j" => Input::Run(Command::MoveDown),
        "k" => Input::Run(Command::MoveUp),
        "l" => Input::Run(Command::EnterDir),
        "s" => Input::Run(Command::ToggleSelect),
        "d" => Input::Run(Command::Deploy),
        "x" => Input::Run(Command::DeleteEntry),
        "r" => Input::Run(Command::RenameDir),
        "n" => Input::Run(Command::NewDir),
        "?" | "help" => Input::Help,
        "" => Input::Noop,
        other => {
            println!("unknown command {other:?}, type \"?\" for help");
            Input::Noop
        }
    }
}

fn render(session: &Session) {
    println!();
    println!("{}", session.current_dir().display());
    if session.entries().is_empty() {
        println!("  (empty)");
        return;
    }
    for (position, entry) in session.entries().iter().enumerate() {
        let cursor = if position == session.cursor() { '>' } else { ' ' };
        let mark = if session.is_selected(&entry.path) { '*' } else { ' ' };
        let suffix = if entry.is_dir {
            "/"
        } else if entry.is_hardlinked() {
            "  [linked]"
        } else {
            ""
        };
        println!("{cursor}{mark} {}{suffix}", entry.name);
    }
}

fn print_help() {
    println!("h  parent directory    l  enter directory");
    println!("k  cursor up           j  cursor down");
    println!("s  toggle selection    d  deploy selection here");
    println!("x  delete entry        r  rename directory");
    println!("n  new directory       q  quit");
}

fn bell() {
    print!("\x07");
}
