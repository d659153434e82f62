use std::time::Duration;

use crate::worker::{humanized, EngineWorker, EventSink, WorkerHandle, WorkerSettings};
use crate::BridgeError;

use super::{Humanizer, PlayerStyleProfile};

/// An [`EngineWorker`] whose best-move requests go through a [`Humanizer`].
///
/// Announces itself with the imitated player's name (or "Avatar").
pub struct AvatarWorker {
    inner: EngineWorker,
}

impl AvatarWorker {
    pub fn spawn(
        sink: EventSink,
        settings: WorkerSettings,
        profile: Option<PlayerStyleProfile>,
    ) -> Result<Self, BridgeError> {
        Self::with_humanizer(sink, settings, Humanizer::new(profile))
    }

    pub fn with_humanizer(
        sink: EventSink,
        settings: WorkerSettings,
        humanizer: Humanizer,
    ) -> Result<Self, BridgeError> {
        let name = humanizer
            .profile()
            .map(|p| p.username.clone())
            .unwrap_or_else(|| "Avatar".to_string());
        let inner = EngineWorker::spawn_with(
            &format!("avatar-{}", name),
            sink,
            settings,
            humanized(humanizer),
            Some(name),
        )?;
        Ok(Self { inner })
    }

    pub fn handle(&self) -> &WorkerHandle {
        self.inner.handle()
    }

    pub async fn shutdown(self, timeout: Duration) {
        self.inner.shutdown(timeout).await;
    }

    pub(crate) fn into_inner(self) -> EngineWorker {
        self.inner
    }
}
