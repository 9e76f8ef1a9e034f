//! Application context — unified state passed to every command handler.
//!
//! `AppContext` carries the terminal output context, the interactivity mode
//! and the configuration location. It also answers the dispatcher's
//! questions through the `Prompter` port.

use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::Prompter;
use crate::domain::AppConfig;
use crate::infra::config::FileConfigStore;
use crate::output::OutputContext;

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Answer confirmations with yes (also set by `CI` / `MC_AUTO_YES`).
    pub yes: bool,
    /// Explicit configuration file.
    pub config: Option<PathBuf>,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// When `true`, confirmations are answered with yes without prompting.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `MC_AUTO_YES`
    /// environment variables are present.
    pub non_interactive: bool,
    config_path: Option<PathBuf>,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    #[must_use]
    pub fn new(flags: AppFlags) -> Self {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("MC_AUTO_YES").is_ok();
        Self {
            output: OutputContext::new(flags.output.no_color, flags.output.quiet),
            non_interactive: flags.behaviour.yes || ci_env,
            config_path: flags.behaviour.config,
        }
    }

    /// Load and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unparseable or invalid.
    pub fn load_config(&self) -> Result<AppConfig> {
        FileConfigStore::new(self.config_path.clone()).load()
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true`, returns `true` without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub async fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(true);
        }
        let prompt = prompt.to_owned();
        blocking(move || {
            Ok(dialoguer::Confirm::new()
                .with_prompt(prompt)
                .default(default)
                .interact()?)
        })
        .await
    }

    /// Read one line after `prompt`; `None` at end of input.
    ///
    /// Uses a dialoguer prompt on a terminal and plain line reads otherwise,
    /// so input can be piped in. The read runs on the blocking pool so the
    /// server's output keeps draining while the user types.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin cannot be read.
    pub async fn read_line(&self, prompt: &str) -> Result<Option<String>> {
        let prompt = prompt.to_owned();
        blocking(move || read_line_blocking(&prompt)).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("prompt task failed")?
}

fn read_line_blocking(prompt: &str) -> Result<Option<String>> {
    if std::io::stdin().is_terminal() {
        return match dialoguer::Input::<String>::new()
            .with_prompt(prompt.trim_end())
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => Ok(Some(line)),
            Err(e) => {
                tracing::debug!(error = %e, "prompt closed");
                Ok(None)
            }
        };
    }
    let mut line = String::new();
    let read = std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading stdin")?;
    Ok((read > 0).then(|| line.trim_end_matches(['\r', '\n']).to_owned()))
}

impl Prompter for AppContext {
    async fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        AppContext::confirm(self, prompt, default).await
    }

    async fn input(&self, prompt: &str) -> Result<String> {
        self.read_line(prompt)
            .await?
            .context("end of input while waiting for an answer")
    }
}
