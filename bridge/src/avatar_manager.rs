use chess_common::GamePosition;
use engine::{EngineOptions, SearchLimit};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::avatar::{avatar_options, AvatarWorker, Humanizer, PlayerStyleProfile};
use crate::config::BridgeConfig;
use crate::descriptor::EngineDescriptor;
use crate::manager::teardown;
use crate::worker::{EventSink, SessionState, WorkerEvent, WorkerSettings};
use crate::BridgeError;

const EVENT_CAPACITY: usize = 64;

struct ActiveAvatar {
    id: String,
    worker: AvatarWorker,
    sink: EventSink,
}

/// Owns at most one avatar opponent at a time.
pub struct AvatarEngineManager {
    config: BridgeConfig,
    events: broadcast::Sender<WorkerEvent>,
    own_sink: EventSink,
    active: Option<ActiveAvatar>,
}

impl AvatarEngineManager {
    pub fn new(config: BridgeConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            own_sink: EventSink::new(events.clone()),
            events,
            active: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Start an avatar for `avatar_id` on `engine`, replacing any running one.
    ///
    /// Strength options are derived from `profile`; `overrides` and the
    /// descriptor's own options (in that order of precedence) win.
    pub async fn start_avatar(
        &mut self,
        avatar_id: &str,
        engine: &EngineDescriptor,
        profile: Option<PlayerStyleProfile>,
        overrides: Option<&EngineOptions>,
    ) -> Result<(), BridgeError> {
        self.start_with(avatar_id, engine, Humanizer::new(profile), overrides)
            .await
    }

    /// [`AvatarEngineManager::start_avatar`] with a caller-provided humanizer.
    pub async fn start_with(
        &mut self,
        avatar_id: &str,
        engine: &EngineDescriptor,
        humanizer: Humanizer,
        overrides: Option<&EngineOptions>,
    ) -> Result<(), BridgeError> {
        if self.active.is_some() {
            tracing::info!("Replacing running avatar with {}", avatar_id);
            self.stop_avatar().await;
        }

        let mut options = avatar_options(humanizer.profile(), &engine.options);
        if let Some(overrides) = overrides {
            options = options.merged_with(overrides);
        }
        tracing::info!(
            "Starting avatar {} on {} (rating {:?})",
            avatar_id,
            engine.name,
            humanizer.rating()
        );

        let descriptor = EngineDescriptor {
            options,
            ..engine.clone()
        };
        let sink = EventSink::new(self.events.clone());
        let worker = AvatarWorker::with_humanizer(
            sink.clone(),
            WorkerSettings::for_avatars(&self.config),
            humanizer,
        )?;
        worker.handle().start(descriptor)?;

        self.active = Some(ActiveAvatar {
            id: avatar_id.to_string(),
            worker,
            sink,
        });
        Ok(())
    }

    /// Stop the running avatar; exactly one `Stopped` event follows.
    pub async fn stop_avatar(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        tracing::info!("Stopping avatar {}", active.id);
        teardown(active.worker.into_inner(), &active.sink, &self.own_sink, &self.config).await;
    }

    /// Ask the avatar for its move; the answer arrives as `MoveReady`.
    pub fn request_move(&self, position: GamePosition, time_limit: Duration) -> Result<(), BridgeError> {
        let active = self.active.as_ref().ok_or(BridgeError::NotRunning)?;
        active
            .worker
            .handle()
            .best_move(position, SearchLimit::time(time_limit))
    }

    pub fn active_avatar_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.id.as_str())
    }

    pub fn is_avatar_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.worker.handle().state().is_running())
    }

    pub fn state(&self) -> Option<SessionState> {
        self.active.as_ref().map(|a| a.worker.handle().state())
    }
}
