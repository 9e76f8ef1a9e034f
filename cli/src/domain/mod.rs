//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod checksum;
pub mod config;
pub mod error;
pub mod instance;
pub mod retry;
pub mod server;
pub mod shell;

pub use checksum::ChecksumAlgorithm;
pub use config::AppConfig;
pub use error::{
    ConfigError, ControlPlaneError, DispatchError, LifecycleError, ProvisionError, TransferError,
};
pub use instance::{Instance, InstanceDescriptor, InstanceId, InstanceStatus, NetworkAddress};
pub use retry::{Backoff, RetryPolicy};
