//! [`FakeHost`]: a target table that tests mutate between polls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use pairsync_core::host::TargetHost;
use pairsync_core::types::{Address, RawFingerprint, TargetIdentity};

#[derive(Default)]
struct HostState {
    targets: HashMap<TargetIdentity, Address>,
    names: HashMap<Address, String>,
    draw_objects: HashMap<Address, Address>,
    drawing: HashSet<Address>,
    fingerprints: HashMap<Address, RawFingerprint>,
}

/// Scriptable [`TargetHost`].
///
/// # Example
///
/// ```rust,no_run
/// use pairsync_core::types::{Address, TargetIdentity};
/// use pairsync_test_utils::FakeHost;
///
/// let host = FakeHost::new();
/// let player = TargetIdentity::primary("Remote Peer");
/// host.place(&player, Address(0x1000));
/// host.remove(&player);
/// ```
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
    resolve_calls: AtomicUsize,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `identity` resolve to `address`, naming the object after the identity.
    pub fn place(&self, identity: &TargetIdentity, address: Address) {
        let mut state = self.state.lock().unwrap();
        state.targets.insert(identity.clone(), address);
        state.names.insert(address, identity.name.clone());
    }

    /// Make `identity` stop resolving. The object at its address goes away too.
    pub fn remove(&self, identity: &TargetIdentity) {
        let mut state = self.state.lock().unwrap();
        if let Some(address) = state.targets.remove(identity) {
            state.names.remove(&address);
        }
    }

    /// Put a differently named object at `address` without touching lookups.
    pub fn rename_object(&self, address: Address, name: &str) {
        self.state
            .lock()
            .unwrap()
            .names
            .insert(address, name.to_owned());
    }

    pub fn set_draw_object(&self, address: Address, draw_object: Option<Address>) {
        let mut state = self.state.lock().unwrap();
        match draw_object {
            Some(draw) => state.draw_objects.insert(address, draw),
            None => state.draw_objects.remove(&address),
        };
    }

    pub fn set_drawing(&self, address: Address, drawing: bool) {
        let mut state = self.state.lock().unwrap();
        if drawing {
            state.drawing.insert(address);
        } else {
            state.drawing.remove(&address);
        }
    }

    pub fn set_fingerprint(&self, address: Address, fingerprint: RawFingerprint) {
        self.state
            .lock()
            .unwrap()
            .fingerprints
            .insert(address, fingerprint);
    }

    /// Number of `resolve_address` calls so far.
    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetHost for FakeHost {
    fn resolve_address(&self, identity: &TargetIdentity) -> Option<Address> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().targets.get(identity).copied()
    }

    fn object_name(&self, address: Address) -> Option<String> {
        self.state.lock().unwrap().names.get(&address).cloned()
    }

    fn draw_object(&self, address: Address) -> Option<Address> {
        self.state.lock().unwrap().draw_objects.get(&address).copied()
    }

    fn is_drawing(&self, address: Address) -> bool {
        self.state.lock().unwrap().drawing.contains(&address)
    }

    fn snapshot_fingerprint(&self, address: Address) -> Option<RawFingerprint> {
        self.state.lock().unwrap().fingerprints.get(&address).cloned()
    }
}
