//! `cadenza submit`: start a generation at the provider and hand it to the daemon.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use cadenza_daemon::{
    request_track, DaemonConfig, DaemonError, GenerationRequest, HttpProvider, Submitter,
};

use super::home_dir;

pub const DEFAULT_MODEL: &str = "V4_5";

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Song description (simple mode) or lyrics (custom mode).
    #[arg(long)]
    pub prompt: String,

    /// Style tags; with --title, switches to custom mode.
    #[arg(long)]
    pub style: Option<String>,

    /// Track title; with --style, switches to custom mode.
    #[arg(long)]
    pub title: Option<String>,

    /// Generate without vocals.
    #[arg(long)]
    pub instrumental: bool,

    /// Provider model id.
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,
}

impl SubmitArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let config = DaemonConfig::load_at(&home).context("failed to load config")?;

        let callback_url = config.provider.callback_url.clone().context(
            "no callback URL configured; set provider.callback_url in ~/.cadenza/config.yaml",
        )?;
        let request = GenerationRequest::new(&self.prompt, &self.model, callback_url)
            .custom(self.style, self.title)
            .instrumental(self.instrumental);
        request.validate().context("generation request rejected")?;

        let provider =
            HttpProvider::from_config(&config.provider).context("provider is not configured")?;
        let task_id = provider
            .submit(&request)
            .context("failed to submit generation")?;
        println!("submitted {}", task_id.to_string().bold());

        match request_track(&home, task_id.as_str(), &self.prompt, &self.model) {
            Ok(_) => println!("tracking {task_id}"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!(
                    "{} start it and run `cadenza track {task_id} --prompt ... --model {}`",
                    "daemon is not running;".yellow(),
                    self.model,
                );
            }
            Err(err) => return Err(err).context("failed to hand task to daemon"),
        }
        Ok(())
    }
}
