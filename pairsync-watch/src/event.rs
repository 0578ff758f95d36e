//! Events raised by watchers.

use pairsync_core::types::{Address, TargetIdentity};

/// Level-triggered target notifications. Receivers only care about the latest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEvent {
    /// The target resolved after being reported removed (or never seen).
    Appeared {
        identity: TargetIdentity,
        address: Address,
    },
    /// Address, draw object or fingerprint changed.
    Changed {
        identity: TargetIdentity,
        address: Address,
    },
    /// The target stopped resolving (after the grace period, if any).
    Removed { identity: TargetIdentity },
}

impl TargetEvent {
    pub fn identity(&self) -> &TargetIdentity {
        match self {
            TargetEvent::Appeared { identity, .. }
            | TargetEvent::Changed { identity, .. }
            | TargetEvent::Removed { identity } => identity,
        }
    }
}
