//! Interactive command dispatcher.
//!
//! The REPL is a small state machine: the run state says whether an instance
//! is tracked and whether a server session is live, and `guard` decides from
//! that alone whether a command may run.

use std::str::FromStr;

use anyhow::Result;

use crate::application::ports::{
    ControlPlane, LocalPayload, ProgressReporter, Prompter, RemoteSession, SessionConnector,
};
use crate::application::services::lifecycle::DestroyOutcome;
use crate::application::services::orchestrator::Provisioner;
use crate::application::services::session::SessionController;
use crate::domain::{DispatchError, Instance, InstanceId, InstanceStatus};

/// One line of REPL input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Create,
    /// Rebuild an existing droplet; the id is prompted for when omitted.
    Recover(Option<InstanceId>),
    Download,
    Destroy,
    Help,
    Exit,
}

impl FromStr for ReplCommand {
    type Err = DispatchError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut words = input.split_whitespace();
        let unknown = || DispatchError::UnknownCommand(input.trim().to_owned());
        let command = match words.next().ok_or_else(unknown)? {
            "create" => Self::Create,
            "recover" => Self::Recover(words.next().map(parse_instance_id).transpose()?),
            "download" => Self::Download,
            "destroy" => Self::Destroy,
            "help" | "?" => Self::Help,
            "exit" | "quit" => Self::Exit,
            _ => return Err(unknown()),
        };
        if words.next().is_some() {
            return Err(unknown());
        }
        Ok(command)
    }
}

/// Parse a droplet id typed by the user.
///
/// # Errors
///
/// Returns `DispatchError::InvalidInstanceId` for anything but a positive
/// integer.
pub fn parse_instance_id(raw: &str) -> Result<InstanceId, DispatchError> {
    match raw.trim().parse::<InstanceId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(DispatchError::InvalidInstanceId(raw.trim().to_owned())),
    }
}

/// What the run state currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No instance tracked.
    Idle,
    /// An instance is tracked but no server session is live.
    Tracked(InstanceId),
    /// A server session is live on the tracked instance.
    Serving(InstanceId),
}

/// Whether `command` may run in `phase`.
///
/// # Errors
///
/// Returns the `DispatchError` explaining why not.
pub fn guard(command: &ReplCommand, phase: Phase) -> Result<(), DispatchError> {
    match (command, phase) {
        (ReplCommand::Create, Phase::Tracked(id) | Phase::Serving(id)) => {
            Err(DispatchError::AlreadyProvisioned(id))
        }
        (ReplCommand::Recover(_), Phase::Serving(id)) => Err(DispatchError::SessionActive(id)),
        (ReplCommand::Download, Phase::Idle | Phase::Tracked(_)) => Err(DispatchError::NoSession),
        (ReplCommand::Destroy, Phase::Idle) => Err(DispatchError::NoInstance),
        _ => Ok(()),
    }
}

/// Explicit state of one REPL run.
pub struct RunState<S: RemoteSession> {
    pub instance: Option<Instance>,
    pub session: Option<SessionController<S>>,
}

impl<S: RemoteSession> Default for RunState<S> {
    fn default() -> Self {
        Self {
            instance: None,
            session: None,
        }
    }
}

impl<S: RemoteSession> RunState<S> {
    #[must_use]
    pub fn phase(&self) -> Phase {
        match (&self.instance, &self.session) {
            (None, _) => Phase::Idle,
            (Some(i), None) => Phase::Tracked(i.id),
            (Some(i), Some(_)) => Phase::Serving(i.id),
        }
    }
}

/// What the REPL should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Print the command list.
    Help,
    Exit,
}

/// Runs REPL commands against the run state.
pub struct Dispatcher<CP, SC: SessionConnector, LP, R, P> {
    provisioner: Provisioner<CP, SC, LP, R>,
    prompter: P,
    state: RunState<SC::Session>,
}

impl<CP, SC, LP, R, P> Dispatcher<CP, SC, LP, R, P>
where
    CP: ControlPlane,
    SC: SessionConnector,
    LP: LocalPayload,
    R: ProgressReporter,
    P: Prompter,
{
    #[must_use]
    pub fn new(provisioner: Provisioner<CP, SC, LP, R>, prompter: P) -> Self {
        Self {
            provisioner,
            prompter,
            state: RunState::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &RunState<SC::Session> {
        &self.state
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Parse and run one input line.
    ///
    /// # Errors
    ///
    /// Returns parse and guard errors as `DispatchError`, and whatever the
    /// command itself fails with.
    pub async fn dispatch_line(&mut self, line: &str) -> Result<Flow> {
        let command: ReplCommand = line.parse()?;
        self.dispatch(command).await
    }

    /// Run one command.
    ///
    /// # Errors
    ///
    /// Returns a `DispatchError` when the command is not allowed now, or the
    /// command's own failure. A failed provisioning run keeps the instance
    /// tracked so it can be recovered or destroyed.
    pub async fn dispatch(&mut self, command: ReplCommand) -> Result<Flow> {
        guard(&command, self.phase())?;
        tracing::debug!(?command, phase = ?self.phase(), "dispatch");
        match command {
            ReplCommand::Create => {
                let instance = self.provisioner.acquire().await?;
                self.provision(instance).await?;
            }
            ReplCommand::Recover(id) => {
                let id = match id {
                    Some(id) => id,
                    None => parse_instance_id(&self.prompter.input(" Droplet ID >>> ").await?)?,
                };
                let instance = self.provisioner.acquire_rebuilt(id).await?;
                self.provision(instance).await?;
            }
            ReplCommand::Download => self.download().await?,
            ReplCommand::Destroy => self.destroy().await?,
            ReplCommand::Help => return Ok(Flow::Help),
            ReplCommand::Exit => {
                self.exit().await;
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    async fn provision(&mut self, instance: Instance) -> Result<()> {
        let instance = self.state.instance.insert(instance);
        let controller = self.provisioner.bring_up(instance).await?;
        self.state.session = Some(controller);
        Ok(())
    }

    async fn download(&mut self) -> Result<()> {
        let session = self
            .state
            .session
            .as_mut()
            .ok_or(DispatchError::NoSession)?;
        session
            .backup(self.provisioner.config(), self.provisioner.reporter())
            .await?;
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        let id = self
            .state
            .instance
            .as_ref()
            .ok_or(DispatchError::NoInstance)?
            .id;
        let reporter = self.provisioner.reporter();

        let unsaved = self
            .state
            .session
            .as_ref()
            .is_some_and(|s| s.is_serving() && !s.backed_up());
        if unsaved
            && !self.prompter.confirm(
                "The server is still running and the world has not been downloaded. Destroy anyway?",
                false,
            )
            .await?
        {
            reporter.warn("destroy cancelled");
            return Ok(());
        }

        if let Some(session) = self.state.session.take() {
            reporter.step("closing SSH session...");
            if let Err(e) = session.close().await {
                tracing::warn!(error = %format!("{e:#}"), "closing server session");
            }
        }

        match self.provisioner.destroy(id).await? {
            DestroyOutcome::Destroyed => {
                if let Some(mut instance) = self.state.instance.take() {
                    instance.transition(InstanceStatus::Destroyed)?;
                }
                reporter.success(&format!("droplet {id} destroyed"));
            }
            DestroyOutcome::Rejected { status } => {
                reporter.warn(&format!("failed with HTTP status code {status}"));
            }
        }
        Ok(())
    }

    async fn exit(&mut self) {
        if let Some(session) = self.state.session.take() {
            if let Err(e) = session.close().await {
                tracing::warn!(error = %format!("{e:#}"), "closing server session");
            }
        }
        if let Some(instance) = &self.state.instance {
            self.provisioner.reporter().warn(&format!(
                "droplet {} is still running and billed; run `mc-auto destroy {}` to remove it",
                instance.id, instance.id
            ));
        }
    }
}
