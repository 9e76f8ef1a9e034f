//! Instance lifecycle state machine and control-plane descriptor types.
//!
//! Pure types only — no I/O.

use std::fmt;

use crate::domain::error::LifecycleError;

/// Identifier assigned by the control plane.
pub type InstanceId = u64;

/// HTTP status the control plane answers when it accepts a delete request.
pub const DESTROY_ACCEPTED_STATUS: u16 = 204;

/// Lifecycle status of the instance as tracked locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Creating,
    Active,
    Rebuilding,
    Destroyed,
}

impl InstanceStatus {
    /// Whether the state machine allows moving from `self` to `to`.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        use InstanceStatus::{Active, Creating, Destroyed, Rebuilding};
        matches!(
            (self, to),
            (Creating | Rebuilding, Active)
                | (Active, Rebuilding)
                | (Creating | Active | Rebuilding, Destroyed)
        )
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Rebuilding => "rebuilding",
            Self::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// One network interface reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAddress {
    pub ip: String,
    pub public: bool,
}

/// The control plane's current view of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDescriptor {
    pub id: InstanceId,
    /// Raw control-plane status, e.g. `"new"` or `"active"`.
    pub status: String,
    pub addresses: Vec<NetworkAddress>,
}

impl InstanceDescriptor {
    /// The address sessions should connect to: the first public IPv4
    /// address, falling back to the first address of any kind.
    #[must_use]
    pub fn primary_address(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.public)
            .or_else(|| self.addresses.first())
            .map(|a| a.ip.as_str())
    }
}

/// Locally tracked instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: InstanceId,
    pub address: Option<String>,
    pub status: InstanceStatus,
}

impl Instance {
    #[must_use]
    pub fn creating(id: InstanceId) -> Self {
        Self {
            id,
            address: None,
            status: InstanceStatus::Creating,
        }
    }

    #[must_use]
    pub fn rebuilding(id: InstanceId) -> Self {
        Self {
            id,
            address: None,
            status: InstanceStatus::Rebuilding,
        }
    }

    /// Move to `to`, rejecting transitions the state machine does not allow.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::InvalidTransition` for a disallowed move.
    pub fn transition(&mut self, to: InstanceStatus) -> Result<(), LifecycleError> {
        if !self.status.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Record the address from a freshly fetched descriptor.
    pub fn observe(&mut self, descriptor: &InstanceDescriptor) {
        self.address = descriptor.primary_address().map(str::to_owned);
    }

    /// The known address.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::NoAddress` while the address is still pending.
    pub fn require_address(&self) -> Result<&str, LifecycleError> {
        self.address
            .as_deref()
            .ok_or(LifecycleError::NoAddress(self.id))
    }
}
