//! Infrastructure layer — concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the
//! control-plane HTTP client, SSH sessions, payload archives, configuration
//! files and logging setup.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod command_runner;
pub mod config;
pub mod control_plane;
pub mod logging;
pub mod payload;
pub mod ssh;
