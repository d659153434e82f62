use std::path::Path;

use chess_common::GamePosition;
use engine::{OptionValue, SearchLimit};
use tokio::sync::{broadcast, watch};

use crate::config::BridgeConfig;
use crate::descriptor::{EngineDescriptor, EngineRegistry};
use crate::worker::{
    EngineWorker, EventSink, SessionState, WorkerEvent, WorkerHandle, WorkerSettings,
};
use crate::BridgeError;

const EVENT_CAPACITY: usize = 256;

struct ActiveEngine {
    name: String,
    worker: EngineWorker,
    sink: EventSink,
}

/// Registry of analysis engines plus the single one currently running.
///
/// Events from whichever worker is active are re-broadcast to
/// [`EngineManager::subscribe`]rs.
pub struct EngineManager {
    config: BridgeConfig,
    registry: EngineRegistry,
    events: broadcast::Sender<WorkerEvent>,
    /// Manager-level events (registry errors); never closed.
    own_sink: EventSink,
    active: Option<ActiveEngine>,
}

impl EngineManager {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_registry(config, EngineRegistry::default())
    }

    pub fn with_registry(config: BridgeConfig, registry: EngineRegistry) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            registry,
            own_sink: EventSink::new(events.clone()),
            events,
            active: None,
        }
    }

    /// Build a manager from the registry file named in `config`.
    pub fn load(config: BridgeConfig) -> Result<Self, BridgeError> {
        let registry = EngineRegistry::load(&config.engines_file)?;
        Ok(Self::with_registry(config, registry))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    pub fn save_registry(&self) -> Result<(), BridgeError> {
        self.registry.save(&self.config.engines_file)
    }

    pub fn save_registry_to(&self, path: &Path) -> Result<(), BridgeError> {
        self.registry.save(path)
    }

    /// Register an engine; failures are also reported as an error event.
    pub fn add_engine(&mut self, descriptor: EngineDescriptor) -> Result<(), BridgeError> {
        let name = descriptor.name.clone();
        self.registry.add(descriptor).inspect_err(|e| {
            tracing::warn!("Cannot add engine {}: {}", name, e);
            self.own_sink.emit(WorkerEvent::Error(e.to_string()));
        })
    }

    pub fn remove_engine(&mut self, name: &str) -> Option<EngineDescriptor> {
        self.registry.remove(name)
    }

    pub fn engines(&self) -> &[EngineDescriptor] {
        self.registry.engines()
    }

    pub fn engine(&self, name: &str) -> Option<&EngineDescriptor> {
        self.registry.get(name)
    }

    pub fn active_engine_name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.name.as_str())
    }

    pub fn is_engine_running(&self) -> bool {
        self.state().is_some_and(SessionState::is_running)
    }

    pub fn state(&self) -> Option<SessionState> {
        self.active.as_ref().map(|a| a.worker.handle().state())
    }

    pub fn watch_state(&self) -> Option<watch::Receiver<SessionState>> {
        self.active.as_ref().map(|a| a.worker.handle().watch_state())
    }

    /// Start `name`, stopping whatever engine was running first.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn start_engine(&mut self, name: &str) -> Result<(), BridgeError> {
        let Some(descriptor) = self.registry.get(name).cloned() else {
            let err = BridgeError::UnknownEngine(name.to_string());
            self.own_sink.emit(WorkerEvent::Error(err.to_string()));
            return Err(err);
        };

        if self.active.is_some() {
            tracing::info!("Stopping previous engine before starting {}", name);
            self.stop_engine().await;
        }

        let sink = EventSink::new(self.events.clone());
        let worker = EngineWorker::spawn(
            &descriptor.name,
            sink.clone(),
            WorkerSettings::for_engines(&self.config),
        )?;
        worker.handle().start(descriptor)?;

        self.active = Some(ActiveEngine {
            name: name.to_string(),
            worker,
            sink,
        });
        Ok(())
    }

    /// Stop the active engine and tear down its worker.
    ///
    /// Emits exactly one `Stopped` event, even when the worker never
    /// answers. No-op when nothing is running.
    pub async fn stop_engine(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        tracing::info!("Stopping engine {}", active.name);
        teardown(active.worker, &active.sink, &self.own_sink, &self.config).await;
    }

    pub fn analyze_position(
        &self,
        position: GamePosition,
        multipv: u32,
        limit: SearchLimit,
    ) -> Result<(), BridgeError> {
        self.active_handle()?.analyze(position, multipv.max(1), limit)
    }

    /// Cancel the running analysis; the engine stays up.
    pub fn stop_analysis(&self) {
        if let Some(active) = &self.active {
            active.worker.handle().stop_analysis();
        }
    }

    pub fn get_best_move(&self, position: GamePosition, limit: SearchLimit) -> Result<(), BridgeError> {
        self.active_handle()?.best_move(position, limit)
    }

    /// Change an option on the running engine and remember it on the
    /// descriptor for later starts.
    pub fn update_option(&mut self, name: &str, value: OptionValue) -> Result<(), BridgeError> {
        let active = self.active.as_ref().ok_or(BridgeError::NotRunning)?;
        active.worker.handle().update_option(name, value.clone())?;

        if let Some(descriptor) = self.registry.get_mut(&active.name) {
            if !descriptor.options.set(name, value) {
                tracing::warn!("Option {} not stored on {}", name, descriptor.name);
            }
        }
        Ok(())
    }

    /// Replay personality commands on the running (legacy) engine.
    pub fn apply_personality(&self, commands: Vec<String>) -> Result<(), BridgeError> {
        self.active_handle()?.apply_personality(commands)
    }

    fn active_handle(&self) -> Result<&WorkerHandle, BridgeError> {
        self.active
            .as_ref()
            .map(|a| a.worker.handle())
            .ok_or(BridgeError::NotRunning)
    }
}

/// Stop a worker's session, make sure subscribers hear exactly one
/// `Stopped`, then silence and dispose of the worker.
///
/// The worker's sink is closed before the fallback `Stopped` goes out on
/// `announce`, so a late acknowledgement cannot produce a second one.
pub(crate) async fn teardown(
    worker: EngineWorker,
    sink: &EventSink,
    announce: &EventSink,
    config: &BridgeConfig,
) {
    let acked = worker.handle().stop_and_wait(config.stop_timeout).await;
    sink.close();
    match acked {
        Some(true) => {}
        Some(false) => announce.emit(WorkerEvent::Stopped),
        None => {
            tracing::warn!(
                "Worker {} did not acknowledge stop within {:?}",
                worker.handle().label(),
                config.stop_timeout
            );
            announce.emit(WorkerEvent::Stopped);
        }
    }
    worker.shutdown(config.join_timeout).await;
}
