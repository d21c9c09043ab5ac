//! `cadenza playback`: select an artifact for the audio engine.

use anyhow::{Context, Result};
use clap::Subcommand;

use cadenza_core::Artifact;
use cadenza_daemon::{request_play, request_stop_playback};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum PlaybackCommand {
    /// Select an artifact (library or in-progress track) and start it.
    Play { artifact_id: String },
    /// Clear the selection and stop the engine.
    Stop,
}

pub fn run(command: PlaybackCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        PlaybackCommand::Play { artifact_id } => {
            let data = request_play(&home, &artifact_id)
                .with_context(|| format!("failed to play '{artifact_id}'"))?;
            let artifact: Artifact =
                serde_json::from_value(data).context("daemon returned malformed artifact")?;
            println!(
                "playing {} ({})",
                artifact.title,
                artifact.playback_url().unwrap_or_default()
            );
        }
        PlaybackCommand::Stop => {
            request_stop_playback(&home).context("failed to stop playback")?;
            println!("playback stopped");
        }
    }
    Ok(())
}
