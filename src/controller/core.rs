//! # Controller: the summary state machine.
//!
//! Every command runs one explicit, ordered procedure:
//! ```text
//! guard (current state) ─► side effects (settings, directory, watch, loops) ─► state write ─► publish summaryState
//! ```
//! A failing guard or side effect returns an error before the state write, so a
//! rejected command leaves the state unchanged.
//!
//! ## Loops
//! ```text
//!               enable                          disable / standby / fault
//! ingest     : watch(dir) ─► ensure_started      cancel_and_wait ─► unwatch(dir)
//! simulation : ensure_started (simulated only)   cancel_and_wait ─► config flag reset
//! ```
//! The ingestion loop is active iff the state is ENABLED. A loop that dies while
//! ENABLED is detected on the next heartbeat and drives the controller to FAULT.
//!
//! ## Serving
//! ```text
//! ControllerHandle::send ──► mpsc ──► serve() ──► execute(command) ──► oneshot ack
//!                                       ├─► heartbeat tick ─► publish + check_loops
//!                                       └─► token cancelled ─► shutdown() walk-down to OFFLINE
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::command::{Ack, Command, Request};
use super::state::{SimulationMode, State};
use crate::config::{Config, Settings, SettingsSource, TELEMETRY_DIR_ENV};
use crate::core::LoopSupervisor;
use crate::error::ControllerError;
use crate::events::{Bus, Event};
use crate::tasks::TaskRef;
use crate::telemetry::{
    DirectoryManager, DirectoryWatch, IngestLoop, SettingsApplied, SimulationLoop, INGEST_LOOP,
    SIMULATION_LOOP,
};

/// Error code published when the ingestion loop ends while ENABLED.
pub const INGEST_LOOP_DIED: i32 = 1;

/// Error code published when the simulation loop ends while ENABLED.
pub const SIMULATION_LOOP_DIED: i32 = 2;

/// Submits commands to a serving [`Controller`].
#[derive(Clone, Debug)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Request>,
    timeout: Duration,
}

impl ControllerHandle {
    /// Sends `command` and waits for its ack, bounded by the command timeout.
    ///
    /// Never hangs: a stopped controller or an expired timeout yields a failed ack.
    /// The timeout covers time spent queued behind other commands; a request
    /// whose caller gave up before it was dequeued is dropped, not executed.
    pub async fn send(&self, command: Command) -> Ack {
        let name = command.name();
        let (reply, rx) = oneshot::channel();
        let exchange = async {
            self.tx.send(Request { command, reply }).await.ok()?;
            rx.await.ok()
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Some(ack)) => ack,
            Ok(None) => Ack::failed("controller_closed", format!("{name}: controller is not serving")),
            Err(_) => Ack::failed(
                "command_timeout",
                format!("{name}: no ack within {:?}", self.timeout),
            ),
        }
    }
}

/// Lifecycle controller for one DSM index.
pub struct Controller {
    cfg: Config,
    state: State,
    mode: SimulationMode,
    settings_source: Arc<dyn SettingsSource>,
    settings: Settings,
    directory: DirectoryManager,
    watcher: Box<dyn DirectoryWatch>,
    watched: Option<PathBuf>,
    ingest: LoopSupervisor,
    simulation: LoopSupervisor,
    config_written: Arc<AtomicBool>,
    bus: Bus,
    tx: mpsc::Sender<Request>,
    rx: Option<mpsc::Receiver<Request>>,
    listener: Option<JoinHandle<()>>,
}

impl Controller {
    pub(crate) fn new_internal(
        cfg: Config,
        mode: SimulationMode,
        settings_source: Arc<dyn SettingsSource>,
        watcher: Box<dyn DirectoryWatch>,
        bus: Bus,
        listener: Option<JoinHandle<()>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(16);
        Self {
            directory: DirectoryManager::new(cfg.temp_root()),
            ingest: LoopSupervisor::new(INGEST_LOOP, bus.clone()),
            simulation: LoopSupervisor::new(SIMULATION_LOOP, bus.clone()),
            cfg,
            state: State::Standby,
            mode,
            settings_source,
            settings: Settings::default(),
            watcher,
            watched: None,
            config_written: Arc::new(AtomicBool::new(false)),
            bus,
            tx,
            rx: Some(rx),
            listener,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Bus carrying records and loop events; subscribe before issuing commands.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Telemetry directory resolved by the last `start` (or mode change).
    pub fn telemetry_directory(&self) -> Option<&Path> {
        self.directory.current()
    }

    pub fn ingest_active(&self) -> bool {
        self.ingest.is_active()
    }

    pub fn simulation_active(&self) -> bool {
        self.simulation.is_active()
    }

    /// Returns a handle for submitting commands to [`Controller::serve`].
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            tx: self.tx.clone(),
            timeout: self.cfg.command_timeout(),
        }
    }

    fn require(&self, command: &'static str, allowed: &[State]) -> Result<(), ControllerError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ControllerError::InvalidStateTransition {
                command,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, to: State) {
        info!(from = %self.state, to = %to, "summary state");
        self.state = to;
        self.bus.publish(Event::summary_state(to));
    }

    /// Publishes the current summary state without changing it.
    pub(crate) fn announce(&self) {
        self.bus.publish(Event::summary_state(self.state));
    }

    /// STANDBY → DISABLED.
    ///
    /// Loads the settings for `label`, resolves the telemetry directory and
    /// publishes `settingsApplied`.
    pub fn start(&mut self, label: &str) -> Result<(), ControllerError> {
        self.require("start", &[State::Standby])?;

        let settings = self.settings_source.load(label)?;
        let external = external_directory(&settings);
        let dir = self.directory.resolve(self.mode, external.as_deref())?;
        info!(label, dir = %dir.display(), mode = %self.mode, "settings resolved");

        self.settings = settings;
        self.bus.publish(Event::settings_applied(SettingsApplied {
            telemetry_directory: Some(dir),
            simulation_loop_time: self.mode.period().as_secs_f64(),
        }));
        self.transition(State::Disabled);
        Ok(())
    }

    /// DISABLED → ENABLED: registers the watch and starts the loops.
    pub fn enable(&mut self) -> Result<(), ControllerError> {
        self.require("enable", &[State::Disabled])?;

        let dir = self
            .directory
            .current()
            .map(Path::to_path_buf)
            .ok_or_else(|| ControllerError::Configuration("telemetry directory not resolved".into()))?;

        if !self.watcher.watch(&dir)? {
            debug!(dir = %dir.display(), "watch already registered");
        }
        self.watched = Some(dir.clone());

        let index = self.cfg.index;
        let events = self.watcher.events();
        let bus = self.bus.clone();
        let remove_consumed = self.directory.is_simulated() && !self.settings.retain_simulated_files;
        let ingest_dir = dir.clone();
        self.ingest.ensure_started(move || {
            Arc::new(IngestLoop::new(ingest_dir, index, events, bus, remove_consumed)) as TaskRef
        });

        if self.mode.is_simulated() {
            let period = self.mode.period();
            let written = Arc::clone(&self.config_written);
            self.simulation
                .ensure_started(move || Arc::new(SimulationLoop::new(dir, period, written)) as TaskRef);
        }

        self.transition(State::Enabled);
        Ok(())
    }

    /// ENABLED → DISABLED: stops both loops and removes generated files.
    pub async fn disable(&mut self) -> Result<(), ControllerError> {
        self.require("disable", &[State::Enabled])?;

        self.stop_loops().await;
        if self.directory.is_simulated() {
            if let Some(dir) = self.directory.current() {
                match DirectoryManager::cleanup_files(dir) {
                    Ok(removed) => debug!(dir = %dir.display(), removed, "cleaned telemetry directory"),
                    Err(e) => warn!(dir = %dir.display(), error = %e, "failed to clean telemetry directory"),
                }
            }
        }

        self.transition(State::Disabled);
        Ok(())
    }

    /// DISABLED | FAULT → STANDBY.
    pub async fn standby(&mut self) -> Result<(), ControllerError> {
        self.require("standby", &[State::Disabled, State::Fault])?;
        self.stop_loops().await;
        self.transition(State::Standby);
        Ok(())
    }

    /// STANDBY → OFFLINE: removes a simulation directory.
    pub fn exit_control(&mut self) -> Result<(), ControllerError> {
        self.require("exitControl", &[State::Standby])?;
        if let Err(e) = self.directory.release() {
            warn!(error = %e, "failed to remove telemetry directory");
        }
        self.transition(State::Offline);
        Ok(())
    }

    /// Changes the simulation mode and re-resolves the directory for it. STANDBY only.
    pub fn set_simulation_mode(&mut self, mode: i64) -> Result<(), ControllerError> {
        self.require("setSimulationMode", &[State::Standby])?;
        let mode = SimulationMode::try_from(mode)?;
        if mode == self.mode {
            debug!(mode = %mode, "simulation mode unchanged");
            return Ok(());
        }

        if self.directory.current().is_some() && self.directory.is_simulated() != mode.is_simulated() {
            self.directory.release()?;
        }
        if mode.is_simulated() {
            self.directory.resolve(mode, None)?;
        } else if let Some(external) = external_directory(&self.settings) {
            self.directory.resolve(mode, Some(&external))?;
        }

        info!(from = %self.mode, to = %mode, "simulation mode");
        self.mode = mode;
        Ok(())
    }

    /// Stops both loops, publishes `errorCode` and goes to FAULT.
    ///
    /// A no-op when already in FAULT.
    pub async fn fault(&mut self, code: i32, report: &str) -> Result<(), ControllerError> {
        match self.state {
            State::Fault => return Ok(()),
            State::Offline => {
                return Err(ControllerError::InvalidStateTransition {
                    command: "fault",
                    state: self.state,
                })
            }
            _ => {}
        }

        self.stop_loops().await;
        error!(code, report, "fault");
        self.bus.publish(Event::error_code(code, report));
        self.transition(State::Fault);
        Ok(())
    }

    /// Faults if a loop ended on its own while ENABLED.
    pub async fn check_loops(&mut self) {
        if !self.state.permits_loops() {
            return;
        }
        let dead = if !self.ingest.is_active() {
            Some((INGEST_LOOP_DIED, "ingestion loop died"))
        } else if self.mode.is_simulated() && !self.simulation.is_active() {
            Some((SIMULATION_LOOP_DIED, "simulation loop died"))
        } else {
            None
        };

        if let Some((code, report)) = dead {
            if let Err(e) = self.fault(code, report).await {
                error!(error = %e, "failed to enter fault");
            }
        }
    }

    async fn stop_loops(&mut self) {
        let timeout = self.cfg.loop_die_timeout();
        self.simulation.cancel_and_wait(timeout).await;
        self.config_written.store(false, Ordering::Release);
        self.ingest.cancel_and_wait(timeout).await;
        if let Some(dir) = self.watched.take() {
            self.watcher.unwatch(&dir);
        }
    }

    /// Runs one command to completion.
    pub async fn execute(&mut self, command: Command) -> Ack {
        let name = command.name();
        debug!(command = %command, state = %self.state, "command");
        let res = match command {
            Command::Start { settings } => self.start(&settings),
            Command::Enable => self.enable(),
            Command::Disable => self.disable().await,
            Command::Standby => self.standby().await,
            Command::ExitControl => self.exit_control(),
            Command::SetSimulationMode { mode } => self.set_simulation_mode(mode),
        };
        if let Err(e) = &res {
            warn!(command = name, label = e.as_label(), error = %e, "command rejected");
        }
        res.into()
    }

    /// Walks the controller down to OFFLINE through the regular commands.
    pub async fn shutdown(&mut self) {
        while self.state != State::Offline {
            let res = match self.state {
                State::Enabled => self.disable().await,
                State::Disabled | State::Fault => self.standby().await,
                State::Standby => self.exit_control(),
                State::Offline => Ok(()),
            };
            if let Err(e) = res {
                error!(state = %self.state, error = %e, "shutdown step failed; forcing offline");
                self.stop_loops().await;
                self.transition(State::Offline);
            }
        }
    }

    /// Processes commands one at a time until OFFLINE.
    ///
    /// Publishes a heartbeat and checks loop health every heartbeat interval.
    /// Cancelling `token` walks the controller down to OFFLINE. Returns the final state.
    pub async fn serve(&mut self, token: CancellationToken) -> State {
        let Some(mut rx) = self.rx.take() else {
            warn!("controller is already serving");
            return self.state;
        };

        let mut heartbeat = tokio::time::interval(self.cfg.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(index = self.cfg.index, mode = %self.mode, "controller serving");

        while self.state != State::Offline {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("shutdown requested");
                    self.shutdown().await;
                }
                req = rx.recv() => match req {
                    Some(Request { command, reply }) if reply.is_closed() => {
                        warn!(command = %command, "caller gave up before dispatch; dropped");
                    }
                    Some(Request { command, reply }) => {
                        let ack = self.execute(command).await;
                        let _ = reply.send(ack);
                    }
                    None => self.shutdown().await,
                },
                _ = heartbeat.tick() => {
                    self.bus.publish(Event::heartbeat());
                    self.check_loops().await;
                }
            }
        }

        info!("controller offline");
        self.state
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Environment override first, then the settings.
fn external_directory(settings: &Settings) -> Option<PathBuf> {
    std::env::var_os(TELEMETRY_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| settings.telemetry_directory.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use tokio::sync::broadcast;

    use crate::config::StaticSettings;
    use crate::controller::ControllerBuilder;
    use crate::events::{EventKind, Payload};
    use crate::telemetry::{ChannelWatcher, FileEvent, FileEvents, CONFIG_FILE_NAME};

    const ROW: &str = "2019-08-08T22:26:52.451723,2019-08-08T22:26:27.451723,2019-08-08T22:26:52.451723,0.5,0.5,214.3,320.1,2001.2,1001.4,6.2\n";

    fn test_config(temp_root: &Path) -> Config {
        Config {
            temp_root: Some(temp_root.to_path_buf()),
            loop_die_timeout_ms: 500,
            heartbeat_interval_ms: 20,
            ..Config::default()
        }
    }

    fn build(temp_root: &Path, mode: i64, settings: StaticSettings) -> Controller {
        ControllerBuilder::new(test_config(temp_root))
            .with_simulation_mode(mode)
            .with_settings(settings)
            .with_watcher(ChannelWatcher::new())
            .build()
            .unwrap()
    }

    fn count(dir: &Path, ext: &str) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|x| x == ext))
            .count()
    }

    fn states(rx: &mut broadcast::Receiver<Event>) -> Vec<State> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let Some(s) = ev.state() {
                out.push(s);
            }
        }
        out
    }

    /// Watcher whose stream is already closed, so the ingestion loop dies at once.
    struct ClosedWatcher(FileEvents);

    impl DirectoryWatch for ClosedWatcher {
        fn watch(&mut self, _dir: &Path) -> Result<bool, ControllerError> {
            Ok(true)
        }
        fn unwatch(&mut self, _dir: &Path) {}
        fn is_watching(&self, _dir: &Path) -> bool {
            false
        }
        fn events(&self) -> FileEvents {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_ingest_active_iff_enabled() {
        let root = tempfile::tempdir().unwrap();
        let mut ctrl = build(root.path(), 1, StaticSettings::new());
        let check = |c: &Controller| assert_eq!(c.ingest_active(), c.state() == State::Enabled);

        check(&ctrl);
        ctrl.start("simulation").unwrap();
        check(&ctrl);
        ctrl.enable().unwrap();
        check(&ctrl);
        assert!(ctrl.simulation_active());
        ctrl.disable().await.unwrap();
        check(&ctrl);
        assert!(!ctrl.simulation_active());
        ctrl.enable().unwrap();
        check(&ctrl);
        ctrl.disable().await.unwrap();
        ctrl.standby().await.unwrap();
        check(&ctrl);
        ctrl.exit_control().unwrap();
        check(&ctrl);
        assert_eq!(ctrl.state(), State::Offline);
    }

    #[tokio::test]
    async fn test_enable_from_standby_rejected() {
        let root = tempfile::tempdir().unwrap();
        let mut ctrl = build(root.path(), 1, StaticSettings::new());

        let err = ctrl.enable().unwrap_err();
        assert!(matches!(
            err,
            ControllerError::InvalidStateTransition {
                command: "enable",
                state: State::Standby
            }
        ));
        assert_eq!(ctrl.state(), State::Standby);
        assert!(!ctrl.ingest_active());
    }

    #[tokio::test]
    async fn test_invalid_mode_keeps_prior_mode() {
        let root = tempfile::tempdir().unwrap();
        let mut ctrl = build(root.path(), 2, StaticSettings::new());

        let ack = ctrl.execute(Command::SetSimulationMode { mode: 3 }).await;
        assert_eq!(ack.code(), Some("invalid_mode"));
        assert_eq!(ctrl.mode(), SimulationMode::Slow);
        assert_eq!(ctrl.state(), State::Standby);
    }

    #[tokio::test]
    async fn test_unknown_settings_label_keeps_standby() {
        let root = tempfile::tempdir().unwrap();
        let mut ctrl = build(root.path(), 1, StaticSettings::new());

        let ack = ctrl.execute(Command::start("nope")).await;
        assert_eq!(ack.code(), Some("configuration_error"));
        assert_eq!(ctrl.state(), State::Standby);
    }

    #[tokio::test]
    async fn test_simulation_writes_config_and_data() {
        let root = tempfile::tempdir().unwrap();
        let settings = StaticSettings::new().with(
            "simulation",
            Settings {
                retain_simulated_files: true,
                ..Settings::default()
            },
        );
        let mut ctrl = build(root.path(), 1, settings);

        ctrl.start("simulation").unwrap();
        ctrl.enable().unwrap();
        let dir = ctrl.telemetry_directory().unwrap().to_path_buf();
        assert!(dir.starts_with(root.path()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count(&dir, "yaml"), 1);
        assert!(dir.join(CONFIG_FILE_NAME).is_file());
        assert!(count(&dir, "dat") >= 1);

        ctrl.disable().await.unwrap();
        assert_eq!(count(&dir, "yaml"), 0);
        assert_eq!(count(&dir, "dat"), 0);
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn test_directory_reused_then_removed_on_exit() {
        let root = tempfile::tempdir().unwrap();
        let mut ctrl = build(root.path(), 1, StaticSettings::new());

        ctrl.start("simulation").unwrap();
        let first = ctrl.telemetry_directory().unwrap().to_path_buf();
        ctrl.enable().unwrap();
        ctrl.disable().await.unwrap();
        ctrl.standby().await.unwrap();

        ctrl.start("simulation").unwrap();
        assert_eq!(ctrl.telemetry_directory().unwrap(), first);
        ctrl.enable().unwrap();
        ctrl.disable().await.unwrap();
        ctrl.standby().await.unwrap();
        ctrl.exit_control().unwrap();

        assert!(!first.exists());
    }

    #[tokio::test]
    async fn test_real_mode_ingests_external_directory() {
        let root = tempfile::tempdir().unwrap();
        let external = tempfile::tempdir().unwrap();
        let watcher = ChannelWatcher::new();
        let tx = watcher.sender();
        let settings = StaticSettings::new().with(
            "default",
            Settings {
                telemetry_directory: Some(external.path().to_path_buf()),
                ..Settings::default()
            },
        );
        let mut ctrl = ControllerBuilder::new(test_config(root.path()))
            .with_settings(settings)
            .with_watcher(watcher)
            .build()
            .unwrap();
        let mut rx = ctrl.bus().subscribe();

        ctrl.start("default").unwrap();
        assert_eq!(ctrl.telemetry_directory(), Some(external.path()));
        ctrl.enable().unwrap();
        assert!(!ctrl.simulation_active());

        let path = external.path().join("dsm_real.dat");
        std::fs::write(&path, ROW).unwrap();
        tx.send(Ok(FileEvent::closed_write(&path))).unwrap();

        let rec = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let ev = rx.recv().await.unwrap();
                if let Some(Payload::DomeSeeing(rec)) = ev.payload {
                    break rec;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(rec.dsm_index, 1);
        assert_eq!(rec.rms_x, 0.5);

        ctrl.disable().await.unwrap();
        ctrl.standby().await.unwrap();
        ctrl.exit_control().unwrap();
        assert!(path.exists());
        assert!(external.path().is_dir());
    }

    #[tokio::test]
    async fn test_real_mode_without_directory_fails_start() {
        let root = tempfile::tempdir().unwrap();
        if std::env::var_os(TELEMETRY_DIR_ENV).is_some() {
            return;
        }
        let mut ctrl = build(root.path(), 0, StaticSettings::new());
        let err = ctrl.start("default").unwrap_err();
        assert_eq!(err.as_label(), "configuration_error");
        assert_eq!(ctrl.state(), State::Standby);
    }

    #[tokio::test]
    async fn test_summary_state_published_per_transition() {
        let root = tempfile::tempdir().unwrap();
        let mut ctrl = build(root.path(), 1, StaticSettings::new());
        let mut rx = ctrl.bus().subscribe();

        ctrl.start("simulation").unwrap();
        ctrl.enable().unwrap();
        let _ = ctrl.enable();
        ctrl.disable().await.unwrap();
        ctrl.standby().await.unwrap();

        assert_eq!(
            states(&mut rx),
            vec![State::Disabled, State::Enabled, State::Disabled, State::Standby]
        );
    }

    #[tokio::test]
    async fn test_mode_change_reallocates_directory() {
        let root = tempfile::tempdir().unwrap();
        let mut ctrl = build(root.path(), 1, StaticSettings::new());

        ctrl.start("simulation").unwrap();
        let sim_dir = ctrl.telemetry_directory().unwrap().to_path_buf();
        ctrl.standby().await.unwrap();

        ctrl.set_simulation_mode(2).unwrap();
        assert_eq!(ctrl.mode(), SimulationMode::Slow);
        assert_eq!(ctrl.telemetry_directory().unwrap(), sim_dir);

        ctrl.set_simulation_mode(0).unwrap();
        assert_eq!(ctrl.mode(), SimulationMode::Real);
        assert!(!sim_dir.exists());
    }

    #[tokio::test]
    async fn test_dead_ingest_loop_faults() {
        let root = tempfile::tempdir().unwrap();
        let (tx, events) = FileEvents::channel();
        drop(tx);
        let mut ctrl = ControllerBuilder::new(test_config(root.path()))
            .with_simulation_mode(1)
            .with_settings(StaticSettings::new())
            .with_watcher(ClosedWatcher(events))
            .build()
            .unwrap();
        let mut rx = ctrl.bus().subscribe();

        ctrl.start("simulation").unwrap();
        ctrl.enable().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctrl.check_loops().await;

        assert_eq!(ctrl.state(), State::Fault);
        assert!(!ctrl.simulation_active());

        let mut code = None;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::ErrorCode {
                code = ev.code;
            }
        }
        assert_eq!(code, Some(INGEST_LOOP_DIED));

        ctrl.standby().await.unwrap();
        assert_eq!(ctrl.state(), State::Standby);
    }

    #[tokio::test]
    async fn test_serve_walks_down_on_cancel() {
        let root = tempfile::tempdir().unwrap();
        let mut ctrl = build(root.path(), 1, StaticSettings::new());
        let handle = ctrl.handle();
        let token = CancellationToken::new();

        let server = tokio::spawn({
            let token = token.clone();
            async move {
                let state = ctrl.serve(token).await;
                (state, ctrl)
            }
        });

        assert!(handle.send(Command::start("simulation")).await.is_complete());
        assert!(handle.send(Command::Enable).await.is_complete());
        let ack = handle.send(Command::ExitControl).await;
        assert_eq!(ack.code(), Some("invalid_state_transition"));

        token.cancel();
        let (state, ctrl) = server.await.unwrap();
        assert_eq!(state, State::Offline);
        assert!(!ctrl.ingest_active());
        assert!(!ctrl.simulation_active());

        let ack = handle.send(Command::Standby).await;
        assert_eq!(ack.code(), Some("controller_closed"));
    }

    #[tokio::test]
    async fn test_abandoned_request_is_dropped() {
        let root = tempfile::tempdir().unwrap();
        let mut ctrl = build(root.path(), 1, StaticSettings::new());
        let mut rx = ctrl.bus().subscribe();
        let handle = ctrl.handle();

        let (reply, abandoned) = oneshot::channel();
        drop(abandoned);
        ctrl.tx
            .send(Request {
                command: Command::start("simulation"),
                reply,
            })
            .await
            .unwrap();

        let server = tokio::spawn(async move {
            let state = ctrl.serve(CancellationToken::new()).await;
            (state, ctrl)
        });

        assert!(handle.send(Command::ExitControl).await.is_complete());
        let (state, _ctrl) = server.await.unwrap();
        assert_eq!(state, State::Offline);
        assert_eq!(states(&mut rx), vec![State::Offline]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transitions_complete_when_loop_ignores_cancel() {
        if std::env::var_os(TELEMETRY_DIR_ENV).is_some() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let external = tempfile::tempdir().unwrap();

        // A fifo blocks its reader until a writer opens it.
        let pipe = external.path().join("dsm_stalled.dat");
        let made = std::process::Command::new("mkfifo").arg(&pipe).status();
        if !made.is_ok_and(|s| s.success()) {
            return;
        }

        let watcher = ChannelWatcher::new();
        let tx = watcher.sender();
        let settings = StaticSettings::new().with(
            "default",
            Settings {
                telemetry_directory: Some(external.path().to_path_buf()),
                ..Settings::default()
            },
        );
        let mut ctrl = ControllerBuilder::new(test_config(root.path()))
            .with_settings(settings)
            .with_watcher(watcher)
            .build()
            .unwrap();
        let mut rx = ctrl.bus().subscribe();

        ctrl.start("default").unwrap();
        ctrl.enable().unwrap();
        tx.send(Ok(FileEvent::closed_write(&pipe))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        tokio::time::timeout(Duration::from_secs(5), ctrl.disable())
            .await
            .unwrap()
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(ctrl.state(), State::Disabled);
        assert!(!ctrl.ingest_active());

        ctrl.standby().await.unwrap();
        assert_eq!(ctrl.state(), State::Standby);

        let mut forced = None;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::LoopForced {
                forced = ev.source.clone();
            }
        }
        assert_eq!(forced.as_deref(), Some(INGEST_LOOP));

        // Release the reader still parked on the fifo.
        drop(std::fs::OpenOptions::new().write(true).open(&pipe).unwrap());
    }
}
