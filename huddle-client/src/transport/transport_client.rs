use crate::error::TransportError;
use crate::observers::{Observers, Subscription};
use crate::transport::channel::Connector;
use crate::transport::transport_config::ClientConfig;
use crate::transport::ws_connector::WsConnector;
use huddle_core::signaling;
use huddle_core::{Envelope, UserId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Identity announced with `register` on every (re)connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

#[derive(Default)]
struct ChannelState {
    outbound: Option<mpsc::UnboundedSender<String>>,
    identity: Option<Identity>,
    /// Bumped on every open and on `disconnect`; readers of older channels go quiet.
    generation: u64,
    attempts: u32,
    reconnect_task: Option<JoinHandle<()>>,
    closed_by_user: bool,
}

struct TransportInner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<ChannelState>,
    connect_lock: tokio::sync::Mutex<()>,
    messages: Observers<Envelope>,
    connectivity: Observers<bool>,
}

/// One logical connection to the coordination server for one local identity.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct TransportClient {
    inner: Arc<TransportInner>,
}

impl TransportClient {
    pub fn new<C: Connector>(config: ClientConfig, connector: C) -> Self {
        Self {
            inner: Arc::new(TransportInner {
                config,
                connector: Arc::new(connector),
                state: Mutex::new(ChannelState::default()),
                connect_lock: tokio::sync::Mutex::new(()),
                messages: Observers::new("message"),
                connectivity: Observers::new("connection-change"),
            }),
        }
    }

    pub fn with_websocket(config: ClientConfig) -> Self {
        Self::new(config, WsConnector)
    }

    /// Open the channel and register. Returns `true` once open, `false` when the
    /// open attempt fails. A call while already open is a no-op success.
    pub async fn connect(&self, user_id: UserId, display_name: impl Into<String>) -> bool {
        let _guard = self.inner.connect_lock.lock().await;

        let identity = Identity {
            user_id,
            display_name: display_name.into(),
        };
        {
            let mut state = self.state();
            if state.outbound.is_some() {
                debug!("connect() while already open; nothing to do");
                return true;
            }
            state.identity = Some(identity.clone());
            state.closed_by_user = false;
            state.attempts = 0;
        }

        match self.open(identity).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to connect: {}", e);
                false
            }
        }
    }

    /// Serialize and write one envelope. Returns `false` when the channel is not open.
    pub fn send(&self, mut envelope: Envelope) -> bool {
        envelope.ensure_id();
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize {} envelope: {}", envelope.kind(), e);
                return false;
            }
        };

        let state = self.state();
        let Some(outbound) = &state.outbound else {
            debug!("Channel closed; {} envelope not delivered", envelope.kind());
            return false;
        };
        outbound.send(text).is_ok()
    }

    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.inner.messages.subscribe(handler)
    }

    pub fn on_connection_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.inner.connectivity.subscribe(handler)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.inner.messages.unsubscribe(subscription)
            || self.inner.connectivity.unsubscribe(subscription)
    }

    /// Close the channel and cancel any pending reconnect.
    pub fn disconnect(&self) {
        let (was_open, task) = {
            let mut state = self.state();
            state.closed_by_user = true;
            state.generation += 1;
            state.attempts = 0;
            (state.outbound.take().is_some(), state.reconnect_task.take())
        };

        if let Some(task) = task {
            task.abort();
        }
        if was_open {
            info!("Disconnected from {}", self.inner.config.url);
            self.inner.connectivity.emit(&false);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state().outbound.is_some()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state().identity.clone()
    }

    /// Reconnect attempts made since the channel was last open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.state().attempts
    }

    async fn open(&self, identity: Identity) -> Result<(), TransportError> {
        let handle = self.inner.connector.open(&self.inner.config.url).await?;

        let generation = {
            let mut state = self.state();
            if state.closed_by_user {
                return Err(TransportError::Closed);
            }
            state.generation += 1;
            state.attempts = 0;
            state.outbound = Some(handle.outbound);
            state.generation
        };

        self.spawn_reader(generation, handle.inbound);

        if !self.send(signaling::register(
            identity.user_id.clone(),
            identity.display_name.clone(),
        )) {
            warn!("Channel closed before register could be sent");
        }
        info!(
            "Connected to {} as {}",
            self.inner.config.url, identity.user_id
        );
        self.inner.connectivity.emit(&true);
        Ok(())
    }

    fn spawn_reader(&self, generation: u64, mut inbound: mpsc::UnboundedReceiver<String>) {
        let client = self.clone();
        tokio::spawn(async move {
            while let Some(text) = inbound.recv().await {
                if client.state().generation != generation {
                    return;
                }
                match Envelope::from_json(&text) {
                    Ok(envelope) => client.inner.messages.emit(&envelope),
                    Err(e) => warn!("Dropping malformed envelope: {}", e),
                }
            }
            client.handle_close(generation);
        });
    }

    fn handle_close(&self, generation: u64) {
        {
            let mut state = self.state();
            if state.generation != generation || state.closed_by_user {
                return;
            }
            state.outbound = None;
        }

        warn!("Channel to {} closed unexpectedly", self.inner.config.url);
        self.inner.connectivity.emit(&false);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&self) {
        let policy = &self.inner.config.reconnect;
        let mut state = self.state();
        if state.closed_by_user {
            return;
        }
        let Some(identity) = state.identity.clone() else {
            return;
        };
        if state.attempts >= policy.max_attempts {
            warn!(
                "Giving up after {} reconnect attempts",
                policy.max_attempts
            );
            return;
        }

        state.attempts += 1;
        let attempt = state.attempts;
        let delay = policy.delay_for(attempt);
        info!(
            "Reconnecting in {:?} (attempt {}/{})",
            delay, attempt, policy.max_attempts
        );

        let client = self.clone();
        state.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            client.reconnect(identity).await;
        }));
    }

    async fn reconnect(&self, identity: Identity) {
        let _guard = self.inner.connect_lock.lock().await;
        {
            let state = self.state();
            if state.closed_by_user || state.outbound.is_some() {
                return;
            }
        }

        match self.open(identity).await {
            Ok(()) => info!("Reconnected to {}", self.inner.config.url),
            Err(e) => {
                warn!("Reconnect attempt failed: {}", e);
                self.schedule_reconnect();
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, ChannelState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
