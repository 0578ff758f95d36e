//! Global suppression of watcher polling.
//!
//! Zone transitions open a time-bounded window; cutscenes and redraws are
//! level-triggered flags that hold polling off until cleared.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use pairsync_core::config::WatchSettings;

#[derive(Debug, Default)]
struct GateState {
    suppressed_until: Option<Instant>,
    in_cutscene: bool,
    redrawing: bool,
}

/// Shared by every watcher of one session. Cloning shares the state.
#[derive(Debug, Clone)]
pub struct SuppressionGate {
    state: Arc<Mutex<GateState>>,
    zone_suppression: Duration,
    zone_settle: Duration,
}

impl SuppressionGate {
    pub fn new(settings: &WatchSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState::default())),
            zone_suppression: settings.zone_suppression(),
            zone_settle: settings.zone_settle(),
        }
    }

    pub fn zone_transition_start(&self, now: Instant) {
        let mut state = self.lock();
        state.suppressed_until = Some(now + self.zone_suppression);
        tracing::debug!("zone transition started, watcher updates suppressed");
    }

    /// Shorten an open window to end after the settle delay.
    pub fn zone_transition_end(&self, now: Instant) {
        let mut state = self.lock();
        let settled = now + self.zone_settle;
        state.suppressed_until = state.suppressed_until.map(|until| until.min(settled));
    }

    pub fn set_cutscene(&self, active: bool) {
        self.lock().in_cutscene = active;
    }

    pub fn set_redrawing(&self, active: bool) {
        self.lock().redrawing = active;
    }

    pub fn is_halted(&self) -> bool {
        let state = self.lock();
        state.in_cutscene || state.redrawing
    }

    pub fn allows_polling(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if state.in_cutscene || state.redrawing {
            return false;
        }
        match state.suppressed_until {
            Some(until) if now < until => false,
            Some(_) => {
                state.suppressed_until = None;
                true
            }
            None => true,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SuppressionGate {
        SuppressionGate::new(&WatchSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn zone_window_caps_at_suppression_limit() {
        let gate = gate();
        let start = Instant::now();
        gate.zone_transition_start(start);

        assert!(!gate.allows_polling(start + Duration::from_secs(119)));
        assert!(gate.allows_polling(start + Duration::from_secs(120)));
    }

    #[tokio::test(start_paused = true)]
    async fn zone_end_shortens_window_to_settle_delay() {
        let gate = gate();
        let start = Instant::now();
        gate.zone_transition_start(start);
        let end = start + Duration::from_secs(5);
        gate.zone_transition_end(end);

        assert!(!gate.allows_polling(end + Duration::from_millis(2_499)));
        assert!(gate.allows_polling(end + Duration::from_millis(2_500)));
    }

    #[tokio::test(start_paused = true)]
    async fn zone_end_without_start_is_ignored() {
        let gate = gate();
        let now = Instant::now();
        gate.zone_transition_end(now);
        assert!(gate.allows_polling(now));
    }

    #[test]
    fn halt_flags_are_level_triggered() {
        let gate = gate();
        let now = Instant::now();
        gate.set_cutscene(true);
        gate.set_redrawing(true);
        gate.set_cutscene(false);
        assert!(!gate.allows_polling(now));
        gate.set_redrawing(false);
        assert!(gate.allows_polling(now));
    }
}
