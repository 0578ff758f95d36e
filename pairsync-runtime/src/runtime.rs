use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use pairsync_core::backend::Backends;
use pairsync_core::config::SyncConfig;
use pairsync_core::content::{AssetFetcher, ContentResolver};
use pairsync_core::host::TargetHost;
use pairsync_core::types::{StateSnapshot, TargetIdentity};
use pairsync_sync::{ApplyRequest, RevertReport, SyncOrchestrator};
use pairsync_watch::{FingerprintWatcher, SuppressionGate, TargetEvent};

use crate::error::RuntimeError;

const COMMAND_QUEUE: usize = 64;

/// Host notifications that pause or resume watcher polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostSignal {
    ZoneTransitionStarted,
    ZoneTransitionEnded,
    CutsceneStarted,
    CutsceneEnded,
    RedrawStarted,
    RedrawEnded,
}

impl HostSignal {
    fn apply(self, gate: &SuppressionGate, now: Instant) {
        match self {
            HostSignal::ZoneTransitionStarted => gate.zone_transition_start(now),
            HostSignal::ZoneTransitionEnded => gate.zone_transition_end(now),
            HostSignal::CutsceneStarted => gate.set_cutscene(true),
            HostSignal::CutsceneEnded => gate.set_cutscene(false),
            HostSignal::RedrawStarted => gate.set_redrawing(true),
            HostSignal::RedrawEnded => gate.set_redrawing(false),
        }
    }
}

#[derive(Debug)]
pub enum SessionCommand {
    ApplySnapshot { snapshot: StateSnapshot, forced: bool },
    Signal(HostSignal),
}

/// External collaborators of one session.
pub struct SessionParts {
    pub primary: TargetIdentity,
    pub host: Arc<dyn TargetHost>,
    pub resolver: Arc<dyn ContentResolver>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub backends: Backends,
}

/// Sending side of a session. Dropping every handle ends the session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    shutdown: broadcast::Sender<()>,
    orchestrator: SyncOrchestrator,
}

impl SessionHandle {
    pub async fn apply_snapshot(
        &self,
        snapshot: StateSnapshot,
        forced: bool,
    ) -> Result<(), RuntimeError> {
        self.send(SessionCommand::ApplySnapshot { snapshot, forced })
            .await
    }

    pub async fn signal(&self, signal: HostSignal) -> Result<(), RuntimeError> {
        self.send(SessionCommand::Signal(signal)).await
    }

    /// Ask the session to stop; [`Session::run`] then reverts and returns.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    async fn send(&self, command: SessionCommand) -> Result<(), RuntimeError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RuntimeError::ChannelClosed("session commands"))
    }
}

/// One synchronized remote target: its watchers, its orchestrator and the
/// tasks connecting them.
pub struct Session {
    config: SyncConfig,
    primary: TargetIdentity,
    host: Arc<dyn TargetHost>,
    orchestrator: SyncOrchestrator,
    gate: SuppressionGate,
    commands: mpsc::Receiver<SessionCommand>,
    shutdown: broadcast::Sender<()>,
    early_shutdown: broadcast::Receiver<()>,
    catch_ctrl_c: bool,
}

impl Session {
    pub fn new(
        parts: SessionParts,
        config: SyncConfig,
    ) -> Result<(Self, SessionHandle), RuntimeError> {
        config.validate()?;
        let orchestrator = SyncOrchestrator::new(
            parts.primary.clone(),
            Arc::clone(&parts.host),
            parts.resolver,
            parts.fetcher,
            parts.backends,
            config.apply.clone(),
        );
        let gate = SuppressionGate::new(&config.watch);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (shutdown_tx, early_shutdown) = broadcast::channel(16);

        let handle = SessionHandle {
            commands: command_tx,
            shutdown: shutdown_tx.clone(),
            orchestrator: orchestrator.clone(),
        };
        let session = Self {
            config,
            primary: parts.primary,
            host: parts.host,
            orchestrator,
            gate,
            commands: command_rx,
            shutdown: shutdown_tx,
            early_shutdown,
            catch_ctrl_c: false,
        };
        Ok((session, handle))
    }

    /// Also stop on ctrl-c.
    pub fn with_ctrl_c(mut self) -> Self {
        self.catch_ctrl_c = true;
        self
    }

    /// Run until shutdown, then revert everything the session applied.
    pub async fn run(self) -> Result<RevertReport, RuntimeError> {
        let Session {
            config,
            primary,
            host,
            orchestrator,
            gate,
            commands,
            shutdown,
            mut early_shutdown,
            catch_ctrl_c,
        } = self;

        let (event_tx, event_rx) = mpsc::unbounded_channel::<TargetEvent>();
        // Secondary categories are looked up when an apply reaches them; only
        // the primary's visibility drives the orchestrator.
        let watcher = FingerprintWatcher::new(
            primary.clone(),
            false,
            Arc::clone(&host),
            gate.clone(),
            &config.watch,
            event_tx,
        );

        let tick_rx = shutdown.subscribe();
        let router_rx = shutdown.subscribe();
        let command_rx = shutdown.subscribe();
        let signal_rx = shutdown.subscribe();
        if !matches!(early_shutdown.try_recv(), Err(TryRecvError::Empty)) {
            let _ = shutdown.send(());
        }
        tracing::info!(identity = %primary, "session started");

        let tick_handle = {
            let shutdown = shutdown.clone();
            let tick = config.watch.tick_interval();
            tokio::spawn(async move {
                let result = tick_task(watcher, tick, tick_rx).await;
                let _ = shutdown.send(());
                result
            })
        };

        let router_handle = {
            let shutdown = shutdown.clone();
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let result = event_router_task(orchestrator, event_rx, router_rx).await;
                let _ = shutdown.send(());
                result
            })
        };

        let command_handle = {
            let shutdown = shutdown.clone();
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let result = command_task(orchestrator, gate, commands, command_rx).await;
                let _ = shutdown.send(());
                result
            })
        };

        let signal_handle = {
            let shutdown = shutdown.clone();
            tokio::spawn(signal_task(shutdown, signal_rx, catch_ctrl_c))
        };

        let (tick_result, router_result, command_result, signal_result) =
            tokio::join!(tick_handle, router_handle, command_handle, signal_handle);

        let report = orchestrator.teardown().await;
        tracing::info!(
            identity = %primary,
            trace_id = %report.trace_id,
            categories = report.categories.len(),
            clean = report.is_clean(),
            "session stopped"
        );

        handle_join("watcher_tick", tick_result)?;
        handle_join("event_router", router_result)?;
        handle_join("commands", command_result)?;
        handle_join("signal_handler", signal_result)?;
        Ok(report)
    }
}

async fn tick_task(
    mut watcher: FingerprintWatcher,
    tick: std::time::Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), RuntimeError> {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                watcher.poll_at(Instant::now());
            }
        }
    }
    Ok(())
}

async fn event_router_task(
    orchestrator: SyncOrchestrator,
    mut events: mpsc::UnboundedReceiver<TargetEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), RuntimeError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                tracing::trace!(?event, "watcher event");
                if let Some(request) = orchestrator.handle_target_event(&event)? {
                    log_request(&request, "replayed snapshot");
                }
            }
        }
    }
    Ok(())
}

async fn command_task(
    orchestrator: SyncOrchestrator,
    gate: SuppressionGate,
    mut commands: mpsc::Receiver<SessionCommand>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), RuntimeError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            command = commands.recv() => {
                let Some(command) = command else {
                    tracing::info!("all session handles dropped; shutting down");
                    break;
                };
                match command {
                    SessionCommand::ApplySnapshot { snapshot, forced } => {
                        let request = orchestrator.apply_state(snapshot, forced)?;
                        log_request(&request, "received snapshot");
                    }
                    SessionCommand::Signal(signal) => {
                        tracing::debug!(?signal, "host signal");
                        signal.apply(&gate, Instant::now());
                    }
                }
            }
        }
    }
    Ok(())
}

async fn signal_task(
    shutdown: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    catch_ctrl_c: bool,
) -> Result<(), RuntimeError> {
    if !catch_ctrl_c {
        let _ = shutdown_rx.recv().await;
        return Ok(());
    }
    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    tracing::info!("received ctrl-c, stopping session");
                    let _ = shutdown.send(());
                    Ok(())
                }
                Err(err) => Err(RuntimeError::Task {
                    task: "signal_handler",
                    reason: format!("ctrl-c handler failed: {err}"),
                }),
            }
        }
    }
}

fn log_request(request: &ApplyRequest, what: &str) {
    match request {
        ApplyRequest::Scheduled(handle) => {
            tracing::debug!(generation = handle.generation(), "{what}: apply scheduled")
        }
        ApplyRequest::Deferred => tracing::debug!("{what}: deferred until the target resolves"),
        ApplyRequest::Unchanged => tracing::debug!("{what}: unchanged"),
        ApplyRequest::NoChanges => tracing::debug!("{what}: no changes"),
    }
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), RuntimeError>, tokio::task::JoinError>,
) -> Result<(), RuntimeError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(RuntimeError::Task {
            task,
            reason: format!("join failure: {err}"),
        }),
    }
}

/// Install the global subscriber. Logs go to stderr; set `PAIRSYNC_LOG_JSON`
/// for one JSON object per line.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if std::env::var_os("PAIRSYNC_LOG_JSON").is_some() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairsync_core::config::WatchSettings;

    #[tokio::test(start_paused = true)]
    async fn signals_drive_the_gate() {
        let gate = SuppressionGate::new(&WatchSettings::default());
        let now = Instant::now();

        HostSignal::CutsceneStarted.apply(&gate, now);
        HostSignal::RedrawStarted.apply(&gate, now);
        assert!(gate.is_halted());
        HostSignal::CutsceneEnded.apply(&gate, now);
        assert!(gate.is_halted());
        HostSignal::RedrawEnded.apply(&gate, now);
        assert!(!gate.is_halted());

        HostSignal::ZoneTransitionStarted.apply(&gate, now);
        assert!(!gate.allows_polling(now));
        HostSignal::ZoneTransitionEnded.apply(&gate, now);
        assert!(gate.allows_polling(now + std::time::Duration::from_millis(2_500)));
    }

    #[test]
    fn host_signal_wire_names() {
        let signal: HostSignal = serde_json::from_str("\"zone_transition_started\"").unwrap();
        assert_eq!(signal, HostSignal::ZoneTransitionStarted);
        assert_eq!(
            serde_json::to_string(&HostSignal::RedrawEnded).unwrap(),
            "\"redraw_ended\""
        );
    }
}
