//! Host-provided access to live targets.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Cancelled;
use crate::generation::CancelGuard;
use crate::types::{Address, RawFingerprint, TargetIdentity};

/// Interval used by the default [`TargetHost::wait_while_drawing`] poll loop.
pub const DRAW_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lookup and inspection of externally owned targets.
///
/// Callers never keep an [`Address`] across suspension points; they resolve
/// the identity again instead.
#[async_trait]
pub trait TargetHost: Send + Sync {
    /// Current address of `identity`, or `None` if it does not exist right now.
    fn resolve_address(&self, identity: &TargetIdentity) -> Option<Address>;

    /// Display name of the object currently living at `address`.
    fn object_name(&self, address: Address) -> Option<String>;

    /// Address of the drawable sub-object, if one is attached.
    fn draw_object(&self, address: Address) -> Option<Address>;

    /// Whether the target is in the middle of an external draw or redraw.
    fn is_drawing(&self, address: Address) -> bool;

    fn snapshot_fingerprint(&self, address: Address) -> Option<RawFingerprint>;

    /// Wait until `address` is no longer drawing.
    ///
    /// Returns `Ok(true)` when drawing finished, `Ok(false)` on timeout.
    async fn wait_while_drawing(
        &self,
        address: Address,
        timeout: Duration,
        cancel: &CancelGuard,
    ) -> Result<bool, Cancelled> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.is_drawing(address) {
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            cancel.sleep(DRAW_POLL_INTERVAL).await?;
        }
        cancel.check()?;
        Ok(true)
    }
}
