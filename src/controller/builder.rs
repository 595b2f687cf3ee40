//! # ControllerBuilder: assembles a [`Controller`] with its collaborators.
//!
//! Unset collaborators fall back to [`FileSettings`] and [`NotifyWatcher`].

use std::sync::Arc;

use crate::config::{Config, FileSettings, SettingsSource};
use crate::controller::{Controller, SimulationMode};
use crate::error::ControllerError;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::telemetry::{DirectoryWatch, NotifyWatcher};

/// Builder for a [`Controller`] with optional collaborators.
pub struct ControllerBuilder {
    cfg: Config,
    mode: i64,
    settings: Option<Arc<dyn SettingsSource>>,
    watcher: Option<Box<dyn DirectoryWatch>>,
    bus: Option<Bus>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ControllerBuilder {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            mode: SimulationMode::Real.as_i64(),
            settings: None,
            watcher: None,
            bus: None,
            subscribers: Vec::new(),
        }
    }

    /// Sets the simulation mode; an out-of-range value makes [`build`](Self::build) fail.
    pub fn with_simulation_mode(mut self, mode: i64) -> Self {
        self.mode = mode;
        self
    }

    /// Overrides the settings source (default: [`FileSettings`] over `settings_dir`).
    pub fn with_settings(mut self, source: impl SettingsSource) -> Self {
        self.settings = Some(Arc::new(source));
        self
    }

    /// Overrides the directory watcher (default: [`NotifyWatcher`]).
    pub fn with_watcher(mut self, watcher: impl DirectoryWatch) -> Self {
        self.watcher = Some(Box::new(watcher));
        self
    }

    /// Publishes onto an existing bus instead of a fresh one.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Sets bus subscribers, each fed through its own bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the controller in STANDBY and publishes its initial summary state.
    ///
    /// Subscribers are started here, so this must run inside a tokio runtime
    /// when any are configured.
    pub fn build(self) -> Result<Controller, ControllerError> {
        let mode = SimulationMode::try_from(self.mode)?;
        let bus = self
            .bus
            .unwrap_or_else(|| Bus::new(self.cfg.bus_capacity_clamped()));

        let settings: Arc<dyn SettingsSource> = match self.settings {
            Some(s) => s,
            None => Arc::new(FileSettings::new(self.cfg.settings_dir.clone())),
        };
        let watcher: Box<dyn DirectoryWatch> = match self.watcher {
            Some(w) => w,
            None => Box::new(NotifyWatcher::new()?),
        };

        let listener = if self.subscribers.is_empty() {
            None
        } else {
            let set = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
            Some(set.listen())
        };

        let controller = Controller::new_internal(self.cfg, mode, settings, watcher, bus, listener);
        controller.announce();
        Ok(controller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::config::StaticSettings;
    use crate::controller::State;
    use crate::events::Event;
    use crate::telemetry::ChannelWatcher;

    struct Forward(mpsc::UnboundedSender<Event>);

    #[async_trait]
    impl Subscribe for Forward {
        async fn on_event(&self, event: &Event) {
            let _ = self.0.send(event.clone());
        }
        fn name(&self) -> &'static str {
            "forward"
        }
    }

    #[test]
    fn test_invalid_mode_fails_build() {
        let err = ControllerBuilder::new(Config::default())
            .with_simulation_mode(3)
            .with_watcher(ChannelWatcher::new())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ControllerError::InvalidMode(3)));
    }

    #[tokio::test]
    async fn test_subscribers_see_initial_state() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctrl = ControllerBuilder::new(Config::default())
            .with_simulation_mode(1)
            .with_settings(StaticSettings::new())
            .with_watcher(ChannelWatcher::new())
            .with_subscribers(vec![Arc::new(Forward(tx)) as Arc<dyn Subscribe>])
            .build()
            .unwrap();

        assert_eq!(ctrl.state(), State::Standby);
        assert_eq!(ctrl.mode(), SimulationMode::Fast);

        let ev = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ev.state(), Some(State::Standby));
    }
}
