//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

use crate::domain::instance::{InstanceId, InstanceStatus};

// ── Provisioning errors ───────────────────────────────────────────────────────

/// Errors raised while driving remote setup on an instance.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{operation} did not succeed after {attempts} attempts")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
    },

    #[error("step '{step}' failed with exit status {status}")]
    StepFailed { step: String, status: i32 },

    #[error("payload directory {0} does not exist")]
    MissingPayload(String),

    #[error("{task} task aborted: {reason}")]
    TaskAborted { task: &'static str, reason: String },
}

// ── Transfer errors ───────────────────────────────────────────────────────────

/// Errors raised by the transfer verifier that are not retried.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("remote checksum command failed with exit status {status}: {stderr}")]
    RemoteChecksumFailed { status: i32, stderr: String },

    #[error("remote checksum output could not be parsed: {0:?}")]
    UnparseableChecksum(String),
}

// ── Control-plane errors ──────────────────────────────────────────────────────

/// Errors reported by the cloud control plane.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("{operation} failed with HTTP status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

// ── Lifecycle errors ──────────────────────────────────────────────────────────

/// Errors related to the instance lifecycle state machine.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("instance {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: InstanceId,
        from: InstanceStatus,
        to: InstanceStatus,
    },

    #[error("instance {0} has no network address yet")]
    NoAddress(InstanceId),
}

// ── Dispatch errors ───────────────────────────────────────────────────────────

/// Errors from the interactive command dispatcher.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Invalid command: {0:?}. Type 'help' for the list of commands.")]
    UnknownCommand(String),

    #[error("Invalid droplet ID: {0:?}")]
    InvalidInstanceId(String),

    #[error("Droplet {0} is already provisioned. Run 'destroy' first.")]
    AlreadyProvisioned(InstanceId),

    #[error("A server session is active on droplet {0}. Run 'destroy' first.")]
    SessionActive(InstanceId),

    #[error("No droplet is being tracked. Run 'create' or 'recover' first.")]
    NoInstance,

    #[error("No server session is active. Run 'create' or 'recover' first.")]
    NoSession,
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}\n\n{hint}")]
    InvalidValue {
        key: &'static str,
        value: String,
        hint: String,
    },

    #[error("Configuration file not found: {0}\n\nCreate one or pass --config <path>.")]
    NotFound(String),
}
