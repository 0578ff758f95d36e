//! Per-target fingerprint watcher.
//!
//! Driven by an external tick: each [`FingerprintWatcher::poll`] re-resolves the
//! target, compares its masked fingerprint with the previous one and raises
//! [`TargetEvent`]s. The watcher never holds an address across polls as truth;
//! it only remembers the last one to detect churn.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use pairsync_core::config::WatchSettings;
use pairsync_core::host::TargetHost;
use pairsync_core::types::{Address, TargetIdentity};

use crate::event::TargetEvent;
use crate::fingerprint::Fingerprint;
use crate::gate::SuppressionGate;

/// Tracking state of one watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// No address resolved.
    Searching,
    /// Address resolved on the last poll.
    Tracking,
    /// Lookup failed; removal is reported once the grace period has elapsed.
    Absent { since: Instant },
}

pub struct FingerprintWatcher {
    identity: TargetIdentity,
    self_owned: bool,
    host: Arc<dyn TargetHost>,
    gate: SuppressionGate,
    events: mpsc::UnboundedSender<TargetEvent>,
    removal_grace: Duration,
    state: WatchState,
    address: Option<Address>,
    draw_object: Option<Address>,
    fingerprint: Option<Fingerprint>,
}

impl FingerprintWatcher {
    /// `self_owned` marks targets belonging to the local user; a self-owned
    /// primary is reported removed without a grace period.
    pub fn new(
        identity: TargetIdentity,
        self_owned: bool,
        host: Arc<dyn TargetHost>,
        gate: SuppressionGate,
        settings: &WatchSettings,
        events: mpsc::UnboundedSender<TargetEvent>,
    ) -> Self {
        Self {
            identity,
            self_owned,
            host,
            gate,
            events,
            removal_grace: settings.removal_grace(),
            state: WatchState::Searching,
            address: None,
            draw_object: None,
            fingerprint: None,
        }
    }

    pub fn identity(&self) -> &TargetIdentity {
        &self.identity
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    fn grace(&self) -> Duration {
        if self.self_owned && self.identity.kind.is_primary() {
            Duration::ZERO
        } else {
            self.removal_grace
        }
    }

    pub fn poll(&mut self) {
        self.poll_at(Instant::now());
    }

    pub fn poll_at(&mut self, now: Instant) {
        if !self.gate.allows_polling(now) {
            return;
        }

        let resolved = self.host.resolve_address(&self.identity);
        match (self.state, resolved) {
            (WatchState::Searching, None) => {}
            (WatchState::Searching, Some(address)) => {
                self.state = WatchState::Tracking;
                tracing::debug!(identity = %self.identity, %address, "target appeared");
                self.emit(TargetEvent::Appeared {
                    identity: self.identity.clone(),
                    address,
                });
                self.track(address);
            }
            (WatchState::Absent { .. }, Some(address)) => {
                self.state = WatchState::Tracking;
                tracing::debug!(identity = %self.identity, "target back within grace period");
                self.track(address);
            }
            (WatchState::Tracking, Some(address)) => self.track(address),
            (WatchState::Tracking, None) => {
                self.address = None;
                self.draw_object = None;
                if self.grace().is_zero() {
                    self.report_removed();
                } else {
                    self.state = WatchState::Absent { since: now };
                }
            }
            (WatchState::Absent { since }, None) => {
                if now.duration_since(since) >= self.grace() {
                    self.report_removed();
                }
            }
        }
    }

    fn track(&mut self, address: Address) {
        let draw_object = self.host.draw_object(address);
        let moved = self.address != Some(address) || self.draw_object != draw_object;
        self.address = Some(address);
        self.draw_object = draw_object;

        let significant = match self.host.snapshot_fingerprint(address) {
            Some(raw) => {
                let current = Fingerprint::from(raw);
                let significant = match &self.fingerprint {
                    Some(previous) => {
                        let significant = previous.is_significant_change(&current);
                        if !significant && previous != &current {
                            tracing::trace!(identity = %self.identity, "cosmetic toggle recorded");
                        }
                        significant
                    }
                    None => true,
                };
                self.fingerprint = Some(current);
                significant
            }
            None => false,
        };

        if moved || significant {
            self.emit(TargetEvent::Changed {
                identity: self.identity.clone(),
                address,
            });
        }
    }

    fn report_removed(&mut self) {
        self.state = WatchState::Searching;
        self.fingerprint = None;
        tracing::debug!(identity = %self.identity, "target removed");
        self.emit(TargetEvent::Removed {
            identity: self.identity.clone(),
        });
    }

    fn emit(&self, event: TargetEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!(identity = %self.identity, "no event receiver; dropping watcher event");
        }
    }
}
