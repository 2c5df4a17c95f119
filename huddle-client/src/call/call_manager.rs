use crate::call::call_command::CallCommand;
use crate::call::call_engine::CallEngine;
use crate::call::call_events::{CallEnded, CallEvents, StreamAdded};
use crate::call::call_session::{CallRequest, CallSnapshot};
use crate::connection::{ConnectionFactory, RtcConfig, WebRtcConnectionFactory};
use crate::error::CallError;
use crate::media::{LocalStream, MediaConstraints, MediaDevices};
use crate::observers::Subscription;
use crate::transport::TransportClient;
use huddle_core::UserId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

const COMMAND_BUFFER: usize = 32;

/// Mesh call coordinator for one local participant.
///
/// Cheap to clone. The engine task stops once every handle is dropped,
/// closing whatever call was still active.
#[derive(Clone)]
pub struct CallManager {
    command_tx: mpsc::Sender<CallCommand>,
    events: Arc<CallEvents>,
}

impl CallManager {
    /// Spawns the engine on the current tokio runtime.
    pub fn new(
        transport: TransportClient,
        devices: Arc<dyn MediaDevices>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let events = Arc::new(CallEvents::new());

        let engine = CallEngine::new(transport, devices, factory, events.clone(), command_rx);
        tokio::spawn(engine.run());

        Self { command_tx, events }
    }

    pub fn with_webrtc(
        transport: TransportClient,
        devices: Arc<dyn MediaDevices>,
        config: RtcConfig,
    ) -> Self {
        Self::new(
            transport,
            devices,
            Arc::new(WebRtcConnectionFactory::new(config)),
        )
    }

    /// Acquire local media, announce `call-start` to the room and join it.
    pub async fn initialize_call(
        &self,
        request: CallRequest,
        constraints: MediaConstraints,
    ) -> Result<LocalStream, CallError> {
        self.start(request, constraints, true).await
    }

    /// Same as [`Self::initialize_call`] without the `call-start` announcement.
    pub async fn join_call(
        &self,
        request: CallRequest,
        constraints: MediaConstraints,
    ) -> Result<LocalStream, CallError> {
        self.start(request, constraints, false).await
    }

    /// Returns the new video state. `false` without an active call.
    pub async fn toggle_video(&self) -> bool {
        self.ask(|reply| CallCommand::ToggleVideo { reply })
            .await
            .unwrap_or(false)
    }

    /// Returns the new audio state. `false` without an active call.
    pub async fn toggle_audio(&self) -> bool {
        self.ask(|reply| CallCommand::ToggleAudio { reply })
            .await
            .unwrap_or(false)
    }

    /// Returns whether the screen is being shared after the toggle.
    pub async fn toggle_screen_sharing(&self) -> Result<bool, CallError> {
        self.ask(|reply| CallCommand::ToggleScreenSharing { reply })
            .await
            .unwrap_or(Err(CallError::EngineStopped))
    }

    /// Leave the call. Safe to call without an active call.
    pub async fn end_call(&self) {
        let _ = self.ask(|reply| CallCommand::EndCall { reply }).await;
    }

    pub async fn snapshot(&self) -> Option<CallSnapshot> {
        self.ask(|reply| CallCommand::Snapshot { reply })
            .await
            .flatten()
    }

    pub async fn is_screen_sharing(&self) -> bool {
        self.snapshot().await.is_some_and(|s| s.screen_sharing)
    }

    pub fn on_stream_added<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&StreamAdded) + Send + Sync + 'static,
    {
        self.events.stream_added.subscribe(handler)
    }

    pub fn on_stream_removed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&UserId) + Send + Sync + 'static,
    {
        self.events.stream_removed.subscribe(handler)
    }

    pub fn on_participant_joined<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&UserId) + Send + Sync + 'static,
    {
        self.events.participant_joined.subscribe(handler)
    }

    pub fn on_participant_left<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&UserId) + Send + Sync + 'static,
    {
        self.events.participant_left.subscribe(handler)
    }

    pub fn on_call_ended<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&CallEnded) + Send + Sync + 'static,
    {
        self.events.call_ended.subscribe(handler)
    }

    pub fn on_screen_sharing_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.events.screen_sharing_changed.subscribe(handler)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let events = &self.events;
        events.stream_added.unsubscribe(subscription)
            || events.stream_removed.unsubscribe(subscription)
            || events.participant_joined.unsubscribe(subscription)
            || events.participant_left.unsubscribe(subscription)
            || events.call_ended.unsubscribe(subscription)
            || events.screen_sharing_changed.unsubscribe(subscription)
    }

    async fn start(
        &self,
        request: CallRequest,
        constraints: MediaConstraints,
        announce: bool,
    ) -> Result<LocalStream, CallError> {
        self.ask(|reply| CallCommand::Start {
            request,
            constraints,
            announce,
            reply,
        })
        .await
        .unwrap_or(Err(CallError::EngineStopped))
    }

    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> CallCommand) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        if self.command_tx.send(build(reply)).await.is_err() {
            warn!("Call engine is gone; command dropped");
            return None;
        }
        rx.await.ok()
    }
}
