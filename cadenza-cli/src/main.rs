//! Cadenza: track asynchronous music generations from the terminal.
//!
//! # Usage
//!
//! ```text
//! cadenza daemon start|stop|status
//! cadenza submit --prompt <text> [--style <tags>] [--title <title>] [--instrumental] [--model <id>]
//! cadenza track <task-id> --prompt <text> --model <id>
//! cadenza remove <task-id>
//! cadenza tasks [--json]
//! cadenza library [--json]
//! cadenza playback play <artifact-id> | stop
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand,
    library::LibraryArgs,
    playback::PlaybackCommand,
    submit::SubmitArgs,
    tasks::{RemoveArgs, TasksArgs, TrackArgs},
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "cadenza",
    version,
    about = "Submit music generations and follow them through to your library",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or control the background orchestrator.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Submit a new generation to the provider and start tracking it.
    Submit(SubmitArgs),

    /// Track a task that was submitted elsewhere.
    Track(TrackArgs),

    /// Stop tracking a task.
    Remove(RemoveArgs),

    /// List tracked tasks and their progress.
    Tasks(TasksArgs),

    /// List completed artifacts, newest first.
    Library(LibraryArgs),

    /// Hand an artifact to the audio engine, or stop playback.
    Playback {
        #[command(subcommand)]
        command: PlaybackCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Submit(args) => args.run(),
        Commands::Track(args) => args.run(),
        Commands::Remove(args) => args.run(),
        Commands::Tasks(args) => args.run(),
        Commands::Library(args) => args.run(),
        Commands::Playback { command } => commands::playback::run(command),
    }
}
