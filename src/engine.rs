//! Engine facade.
//!
//! [`StreamRegexEngine`] wires the rule service, the notification bus and the
//! stream watcher together so the command surface and the interception path
//! share one rule set and one serialisation guard.

use std::sync::Arc;

use crate::commands::Command;
use crate::config::EngineConfig;
use crate::error::StreamRegexResult;
use crate::service::RuleService;
use crate::storage::SettingsStore;
use crate::watch::{
    ChannelBus, GenerationFlag, MessageBuffer, NotificationBus, NotificationPublisher,
    NotificationStream, RuleObserver, StreamWatcher, WatchGuard, WatcherHandle,
};

/// One extension instance: rules, bus and watcher wiring.
#[derive(Debug)]
pub struct StreamRegexEngine {
    cfg: EngineConfig,
    rules: Arc<RuleService>,
    bus: Arc<ChannelBus>,
    publisher: Arc<NotificationPublisher>,
    guard: WatchGuard,
}

impl StreamRegexEngine {
    /// Validates `cfg`, loads the rule set from `store` and starts the saver.
    pub fn new(cfg: EngineConfig, store: Arc<dyn SettingsStore>) -> StreamRegexResult<Self> {
        let cfg = cfg.validate()?;
        let rules = Arc::new(RuleService::open(store, cfg.save_debounce)?);
        let bus = Arc::new(ChannelBus::new(cfg.bus.clone()));
        let publisher = Arc::new(NotificationPublisher::new(
            Arc::clone(&bus) as Arc<dyn NotificationBus>
        ));

        Ok(Self {
            cfg,
            rules,
            bus,
            publisher,
            guard: WatchGuard::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// The shared rule service.
    #[must_use]
    pub const fn rules(&self) -> &Arc<RuleService> {
        &self.rules
    }

    #[must_use]
    pub const fn bus(&self) -> &Arc<ChannelBus> {
        &self.bus
    }

    #[must_use]
    pub const fn publisher(&self) -> &Arc<NotificationPublisher> {
        &self.publisher
    }

    /// Runs a parsed command against the rule service.
    pub fn execute(&self, command: Command) -> StreamRegexResult<String> {
        command.execute(&self.rules)
    }

    /// Parses and runs one command line.
    pub fn execute_line(&self, line: &str) -> StreamRegexResult<String> {
        self.execute(Command::parse(line)?)
    }

    /// Opens a new notification stream.
    #[must_use]
    pub fn subscribe(&self) -> NotificationStream {
        self.bus.subscribe()
    }

    /// Builds an idle watcher over the host's flag and buffer that the caller
    /// drives with [`StreamWatcher::poll_once`].
    #[must_use]
    pub fn watcher(
        &self,
        flag: Arc<dyn GenerationFlag>,
        buffer: Arc<dyn MessageBuffer>,
    ) -> StreamWatcher {
        let observer = Arc::new(RuleObserver::new(
            Arc::clone(&self.rules),
            Arc::clone(&self.publisher),
            self.guard.clone(),
        ));
        StreamWatcher::new(
            self.cfg.watcher.clone(),
            flag,
            buffer,
            observer,
            self.guard.clone(),
        )
    }

    /// Starts a background watcher. Stop it through the returned handle.
    pub fn watch(
        &self,
        flag: Arc<dyn GenerationFlag>,
        buffer: Arc<dyn MessageBuffer>,
    ) -> StreamRegexResult<WatcherHandle> {
        self.watcher(flag, buffer).spawn()
    }

    /// Writes pending settings now.
    pub fn flush(&self) -> StreamRegexResult<()> {
        self.rules.flush()
    }
}
