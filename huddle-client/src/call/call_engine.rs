use crate::call::call_command::{CallCommand, EngineEvent};
use crate::call::call_events::{CallEnded, CallEvents, EndReason, StreamAdded};
use crate::call::call_session::{CallRequest, CallSession, MediaState, NegotiationRole, PeerRecord};
use crate::connection::{
    ConnectionEvent, ConnectionFactory, ConnectionId, MediaConnection, NativeState, PeerLink,
};
use crate::error::{CallError, MediaError};
use crate::media::{LocalStream, LocalTrack, MediaConstraints, MediaDevices, MediaKind};
use crate::observers::Subscription;
use crate::transport::TransportClient;
use huddle_core::signaling;
use huddle_core::{
    CallSignal, CallStartPayload, Envelope, EnvelopeBody, RoomId, SessionDescription, SignalType,
    UserId,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

type Connections = Vec<(UserId, Arc<dyn MediaConnection>)>;

/// Owns the call session and the peer map. Every mutation happens on this task.
pub(crate) struct CallEngine {
    transport: TransportClient,
    devices: Arc<dyn MediaDevices>,
    factory: Arc<dyn ConnectionFactory>,
    events: Arc<CallEvents>,
    session: Option<CallSession>,
    command_rx: mpsc::Receiver<CallCommand>,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
    event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    connection_tx: mpsc::UnboundedSender<ConnectionEvent>,
    connection_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    subscriptions: Vec<Subscription>,
    next_connection: u64,
    screen_generation: u64,
    transport_lost: bool,
}

impl CallEngine {
    pub(crate) fn new(
        transport: TransportClient,
        devices: Arc<dyn MediaDevices>,
        factory: Arc<dyn ConnectionFactory>,
        events: Arc<CallEvents>,
        command_rx: mpsc::Receiver<CallCommand>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (connection_tx, connection_rx) = mpsc::unbounded_channel();

        let inbound_tx = event_tx.clone();
        let on_message = transport.on_message(move |envelope| {
            let _ = inbound_tx.send(EngineEvent::Inbound(envelope.clone()));
        });
        let link_tx = event_tx.clone();
        let on_change = transport.on_connection_change(move |up| {
            let _ = link_tx.send(EngineEvent::Connectivity(*up));
        });

        Self {
            transport,
            devices,
            factory,
            events,
            session: None,
            command_rx,
            event_tx,
            event_rx,
            connection_tx,
            connection_rx,
            subscriptions: vec![on_message, on_change],
            next_connection: 0,
            screen_generation: 0,
            transport_lost: false,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Call engine started");

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("All call manager handles dropped. Shutting down call engine.");
                            break;
                        }
                    }
                }

                Some(evt) = self.event_rx.recv() => self.handle_event(evt).await,

                Some(evt) = self.connection_rx.recv() => self.handle_connection_event(evt).await,
            }
        }

        self.cleanup().await;
        for subscription in self.subscriptions.drain(..) {
            self.transport.unsubscribe(subscription);
        }
        info!("Call engine finished");
    }

    async fn handle_command(&mut self, cmd: CallCommand) {
        match cmd {
            CallCommand::Start {
                request,
                constraints,
                announce,
                reply,
            } => {
                let result = self.start_call(request, constraints, announce).await;
                let _ = reply.send(result);
            }

            CallCommand::ToggleVideo { reply } => {
                let enabled = self.toggle_media(MediaKind::Video).await;
                let _ = reply.send(enabled);
            }

            CallCommand::ToggleAudio { reply } => {
                let enabled = self.toggle_media(MediaKind::Audio).await;
                let _ = reply.send(enabled);
            }

            CallCommand::ToggleScreenSharing { reply } => {
                let result = self.toggle_screen_sharing().await;
                let _ = reply.send(result);
            }

            CallCommand::EndCall { reply } => {
                self.end_call().await;
                let _ = reply.send(());
            }

            CallCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.as_ref().map(CallSession::snapshot));
            }
        }
    }

    async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Inbound(envelope) => self.handle_envelope(envelope).await,

            EngineEvent::Connectivity(up) => self.handle_connectivity(up).await,

            EngineEvent::ScreenEnded { generation } => {
                let sharing = self.session.as_ref().is_some_and(|s| s.screen.is_some());
                if generation == self.screen_generation && sharing {
                    info!("Screen capture ended by the platform");
                    self.stop_screen_sharing().await;
                }
            }
        }
    }

    async fn start_call(
        &mut self,
        request: CallRequest,
        constraints: MediaConstraints,
        announce: bool,
    ) -> Result<LocalStream, CallError> {
        if let Some(session) = &self.session {
            return Err(CallError::AlreadyInCall(session.room_id.clone()));
        }

        let local = self.devices.user_media(constraints).await.inspect_err(|e| {
            warn!("Local media unavailable for room {}: {}", request.room_id, e);
        })?;
        let media = MediaState {
            video: constraints.video && local.has(MediaKind::Video),
            audio: constraints.audio && local.has(MediaKind::Audio),
        };
        info!(
            "Starting call in room {} as {} ({:?})",
            request.room_id, request.user_id, media
        );

        let username = request
            .username
            .clone()
            .or_else(|| self.transport.identity().map(|i| i.display_name));
        self.session = Some(CallSession::new(
            request.user_id.clone(),
            request.room_id.clone(),
            local.clone(),
            media,
        ));

        if announce {
            let payload = CallStartPayload {
                conversation_id: request.conversation_id,
                call_session_id: request.call_session_id,
                video: media.video,
                audio: media.audio,
            };
            let payload = serde_json::to_value(&payload).unwrap_or_default();
            self.signal(SignalType::CallStart, None, payload);
        }
        self.send(signaling::join_room(
            request.user_id,
            request.room_id,
            username,
        ));

        Ok(local)
    }

    async fn end_call(&mut self) {
        let Some(session) = &self.session else {
            debug!("end_call() without an active call");
            return;
        };
        let (user_id, room_id) = (session.user_id.clone(), session.room_id.clone());

        self.signal(SignalType::CallEnd, None, Value::Null);
        self.send(signaling::leave_room(user_id, room_id));
        self.finish(EndReason::Local).await;
    }

    async fn finish(&mut self, reason: EndReason) {
        let Some(room_id) = self.cleanup().await else {
            return;
        };
        info!("Call in room {} ended ({:?})", room_id, reason);
        self.events
            .call_ended
            .emit(&CallEnded { room_id, reason });
    }

    /// Close every connection, stop every local track, drop the session.
    async fn cleanup(&mut self) -> Option<RoomId> {
        let mut session = self.session.take()?;
        self.transport_lost = false;

        if let Some(watch) = session.screen_watch.take() {
            watch.abort();
        }
        for (peer, record) in session.peers.drain() {
            if let Err(e) = record.connection.close().await {
                warn!("Failed to close connection to {}: {:#}", peer, e);
            }
        }
        session.local.stop();
        if let Some(screen) = session.screen.take() {
            screen.stop();
        }
        Some(session.room_id)
    }

    async fn handle_connectivity(&mut self, up: bool) {
        if !up {
            if self.session.is_some() {
                warn!("Signaling channel lost during a call");
                self.transport_lost = true;
            }
            return;
        }
        if !std::mem::take(&mut self.transport_lost) {
            return;
        }
        if self.session.is_some() {
            warn!("Signaling channel reconnected mid-call; tearing the call down");
            self.finish(EndReason::TransportReset).await;
        }
    }

    async fn handle_envelope(&mut self, envelope: Envelope) {
        let Some(session) = &self.session else {
            return;
        };
        let me = session.user_id.clone();
        let room = session.room_id.clone();

        match envelope.body {
            EnvelopeBody::UserJoined(m) if m.room_id == room && m.user_id != me => {
                info!("{} joined room {}", m.user_id, room);
                self.offer_to(m.user_id).await;
            }
            EnvelopeBody::UserLeft(m) if m.room_id == room => {
                self.teardown_peer(&m.user_id, "left the room").await;
            }
            EnvelopeBody::CallSignaling(signal) => self.handle_signal(signal).await,
            _ => {}
        }
    }

    async fn handle_signal(&mut self, signal: CallSignal) {
        let Some(session) = &self.session else {
            return;
        };
        if signal.room_id != session.room_id
            || signal.sender_id == session.user_id
            || !signal.is_addressed_to(&session.user_id)
        {
            debug!(
                "Ignoring {} from {} not meant for this call",
                signal.signal_type, signal.sender_id
            );
            return;
        }
        let sender = signal.sender_id.clone();

        match signal.signal_type {
            SignalType::Offer => match signal.description() {
                Ok(desc) => self.handle_offer(sender, desc.sdp).await,
                Err(e) => {
                    warn!("Malformed offer from {}: {}", sender, e);
                    self.teardown_peer(&sender, "malformed offer").await;
                }
            },

            SignalType::Answer => match signal.description() {
                Ok(desc) => self.handle_answer(sender, desc.sdp).await,
                Err(e) => {
                    warn!("Malformed answer from {}: {}", sender, e);
                    self.teardown_peer(&sender, "malformed answer").await;
                }
            },

            SignalType::IceCandidate => match signal.candidate_json() {
                Ok(candidate) => self.handle_remote_candidate(sender, candidate).await,
                Err(e) => warn!("Malformed ICE candidate from {}: {}", sender, e),
            },

            SignalType::CallStart => info!("{} started a call in room {}", sender, signal.room_id),

            SignalType::CallEnd => self.handle_remote_call_end(sender).await,

            SignalType::UserJoined => self.offer_to(sender).await,

            SignalType::UserLeft => {
                self.teardown_peer(&sender, "left the call").await;
            }
        }
    }

    /// This side saw `peer` join, so this side offers.
    async fn offer_to(&mut self, peer: UserId) {
        let Some(session) = &self.session else {
            return;
        };
        if session.peers.contains_key(&peer) {
            debug!("{} is already tracked; not offering again", peer);
            return;
        }

        let record = match self.open_connection(peer.clone(), NegotiationRole::Offerer).await {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to create connection for {}: {:#}", peer, e);
                return;
            }
        };
        if !self.insert_peer(record).await {
            return;
        }
        self.events.participant_joined.emit(&peer);
        self.send_offer(&peer).await;
    }

    async fn handle_offer(&mut self, sender: UserId, sdp: String) {
        let existing = self
            .record_mut(&sender)
            .map(|r| (r.connection.clone(), r.offer_pending, r.role));

        let connection = match existing {
            Some((connection, offer_pending, role)) => {
                if offer_pending {
                    if role == NegotiationRole::Offerer {
                        warn!("Offer collision with {}; keeping ours", sender);
                        return;
                    }
                    debug!("Offer collision with {}; answering theirs first", sender);
                    if let Err(e) = connection.rollback().await {
                        warn!("Failed to roll back offer to {}: {:#}", sender, e);
                        self.teardown_peer(&sender, "rollback failed").await;
                        return;
                    }
                    if let Some(record) = self.record_mut(&sender) {
                        record.offer_pending = false;
                        record.renegotiate = true;
                    }
                }
                connection
            }
            None => {
                let record = match self
                    .open_connection(sender.clone(), NegotiationRole::Answerer)
                    .await
                {
                    Ok(record) => record,
                    Err(e) => {
                        error!("Failed to create connection for {}: {:#}", sender, e);
                        return;
                    }
                };
                let connection = record.connection.clone();
                if !self.insert_peer(record).await {
                    return;
                }
                self.events.participant_joined.emit(&sender);
                connection
            }
        };

        match connection.accept_offer(sdp).await {
            Ok(answer) => {
                self.signal(
                    SignalType::Answer,
                    Some(sender.clone()),
                    SessionDescription::answer(answer).to_value(),
                );
                if self.record_mut(&sender).is_some_and(|r| r.renegotiate) {
                    self.renegotiate(&sender).await;
                }
            }
            Err(e) => {
                warn!("Failed to apply offer from {}: {:#}", sender, e);
                self.teardown_peer(&sender, "negotiation failed").await;
            }
        }
    }

    async fn handle_answer(&mut self, sender: UserId, sdp: String) {
        let Some(record) = self.record_mut(&sender) else {
            warn!("Answer from untracked peer {}; dropping", sender);
            return;
        };
        if !record.offer_pending {
            warn!("Unexpected answer from {}; dropping", sender);
            return;
        }
        let connection = record.connection.clone();

        match connection.accept_answer(sdp).await {
            Ok(()) => {
                let again = match self.record_mut(&sender) {
                    Some(record) => {
                        record.offer_pending = false;
                        record.renegotiate
                    }
                    None => false,
                };
                if again {
                    self.renegotiate(&sender).await;
                }
            }
            Err(e) => {
                warn!("Failed to apply answer from {}: {:#}", sender, e);
                self.teardown_peer(&sender, "negotiation failed").await;
            }
        }
    }

    async fn handle_remote_candidate(&mut self, sender: UserId, candidate: String) {
        let Some(connection) = self.connection_of(&sender) else {
            warn!(
                "ICE candidate from {} arrived before its connection; dropping",
                sender
            );
            return;
        };
        if let Err(e) = connection.add_ice_candidate(candidate).await {
            warn!("Failed to add ICE candidate for {}: {:#}", sender, e);
        }
    }

    async fn handle_remote_call_end(&mut self, sender: UserId) {
        // Only a tracked peer can end the call.
        if !self.teardown_peer(&sender, "ended the call").await {
            debug!("call-end from untracked {}; ignoring", sender);
            return;
        }

        let Some(session) = &self.session else {
            return;
        };
        if session.peers.is_empty() {
            let (user_id, room_id) = (session.user_id.clone(), session.room_id.clone());
            info!("{} ended the call and no peers remain", sender);
            self.send(signaling::leave_room(user_id, room_id));
            self.finish(EndReason::Remote).await;
        }
    }

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        let link = event.link().clone();
        let current = self
            .session
            .as_ref()
            .and_then(|s| s.peers.get(&link.user_id))
            .is_some_and(|r| r.link == link);
        if !current {
            debug!("Dropping event from stale connection {}", link);
            return;
        }

        match event {
            ConnectionEvent::IceCandidate { candidate, .. } => {
                match serde_json::from_str::<Value>(&candidate) {
                    Ok(payload) => {
                        self.signal(SignalType::IceCandidate, Some(link.user_id), payload);
                    }
                    Err(e) => error!("Local ICE candidate for {} is not JSON: {}", link, e),
                }
            }

            ConnectionEvent::Track { track, .. } => {
                let opened = self
                    .record_mut(&link.user_id)
                    .and_then(|r| r.attach_track(track));
                if let Some(stream) = opened {
                    info!("Stream {} from {} added", stream.id, link.user_id);
                    self.events.stream_added.emit(&StreamAdded {
                        user_id: link.user_id,
                        stream,
                    });
                }
            }

            ConnectionEvent::StateChanged { state, .. } => {
                if state.is_terminal() {
                    self.teardown_peer(&link.user_id, "connection ended").await;
                } else if state == NativeState::Connected {
                    debug!("Media transport to {} connected", link);
                }
            }
        }
    }

    /// Remove one peer. Returns false when the peer was not tracked.
    async fn teardown_peer(&mut self, peer: &UserId, reason: &str) -> bool {
        let Some(record) = self.session.as_mut().and_then(|s| s.peers.remove(peer)) else {
            return false;
        };
        info!("Tearing down connection {} ({})", record.link, reason);

        if let Err(e) = record.connection.close().await {
            warn!("Failed to close connection to {}: {:#}", peer, e);
        }
        self.events.stream_removed.emit(peer);
        self.events.participant_left.emit(peer);
        true
    }

    async fn toggle_media(&mut self, kind: MediaKind) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        let tracks = session.local.tracks_of(kind);
        if let Some(first) = tracks.first() {
            let enabled = !first.is_enabled();
            for track in &tracks {
                track.set_enabled(enabled);
            }
            set_flag(&mut session.media, kind, enabled);
            info!("{:?} {}", kind, if enabled { "enabled" } else { "disabled" });
            return enabled;
        }

        // No track of this kind yet, so toggling means "turn it on".
        let constraints = match kind {
            MediaKind::Audio => MediaConstraints::audio_only(),
            MediaKind::Video => MediaConstraints::video_only(),
        };
        let acquired = match self.devices.user_media(constraints).await {
            Ok(stream) => stream.tracks_of(kind),
            Err(e) => {
                warn!("Could not enable {:?}: {}", kind, e);
                return false;
            }
        };
        if acquired.is_empty() {
            warn!("Capture returned no {:?} track", kind);
            return false;
        }

        let Some(session) = self.session.as_mut() else {
            acquired.iter().for_each(LocalTrack::stop);
            return false;
        };
        for track in &acquired {
            session.local.add_track(track.clone());
        }
        set_flag(&mut session.media, kind, true);
        let connections = session.connections();

        info!("{:?} acquired and attached to {} peers", kind, connections.len());
        self.attach_tracks(connections, &acquired).await;
        true
    }

    async fn toggle_screen_sharing(&mut self) -> Result<bool, CallError> {
        let Some(session) = &self.session else {
            return Err(CallError::NoActiveCall);
        };
        if session.screen.is_some() {
            self.stop_screen_sharing().await;
            return Ok(false);
        }

        let screen = self.devices.display_media().await.inspect_err(|e| {
            warn!("Screen capture unavailable: {}", e);
        })?;
        let tracks = screen.tracks();
        if tracks.is_empty() {
            return Err(MediaError::NotFound("screen".to_owned()).into());
        }

        self.screen_generation += 1;
        let generation = self.screen_generation;
        let event_tx = self.event_tx.clone();
        let watched = tracks.clone();
        let watch = tokio::spawn(async move {
            futures::future::select_all(watched.iter().map(|t| Box::pin(t.ended()))).await;
            let _ = event_tx.send(EngineEvent::ScreenEnded { generation });
        });

        let Some(session) = self.session.as_mut() else {
            watch.abort();
            screen.stop();
            return Err(CallError::NoActiveCall);
        };
        session.screen = Some(screen);
        session.screen_watch = Some(watch);
        let connections = session.connections();

        info!("Screen sharing started for {} peers", connections.len());
        self.attach_tracks(connections, &tracks).await;
        self.events.screen_sharing_changed.emit(&true);
        Ok(true)
    }

    /// Shared by the manual toggle and the capture's own ended event.
    async fn stop_screen_sharing(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(screen) = session.screen.take() else {
            return;
        };
        if let Some(watch) = session.screen_watch.take() {
            watch.abort();
        }
        let connections = session.connections();
        let track_ids: Vec<String> = screen.tracks().iter().map(|t| t.id().to_owned()).collect();

        for (peer, connection) in connections {
            for id in &track_ids {
                if let Err(e) = connection.remove_track(id).await {
                    warn!("Failed to remove screen track from {}: {:#}", peer, e);
                }
            }
            self.renegotiate(&peer).await;
        }
        screen.stop();

        info!("Screen sharing stopped");
        self.events.screen_sharing_changed.emit(&false);
    }

    async fn attach_tracks(&mut self, connections: Connections, tracks: &[LocalTrack]) {
        for (peer, connection) in connections {
            let mut failure = None;
            for track in tracks {
                if let Err(e) = connection.add_track(track).await {
                    failure = Some(e);
                    break;
                }
            }

            match failure {
                Some(e) => {
                    warn!("Failed to attach track to {}: {:#}", peer, e);
                    self.teardown_peer(&peer, "track attach failed").await;
                }
                None => self.renegotiate(&peer).await,
            }
        }
    }

    async fn open_connection(&mut self, peer: UserId, role: NegotiationRole) -> anyhow::Result<PeerRecord> {
        let Some(session) = &self.session else {
            anyhow::bail!("no active call");
        };
        let mut tracks = session.local.tracks();
        if let Some(screen) = &session.screen {
            tracks.extend(screen.tracks());
        }

        self.next_connection += 1;
        let link = PeerLink {
            user_id: peer,
            connection: ConnectionId(self.next_connection),
        };
        let connection = self
            .factory
            .create(link.clone(), self.connection_tx.clone())
            .await?;

        for track in tracks.iter().filter(|t| !t.is_ended()) {
            if let Err(e) = connection.add_track(track).await {
                let _ = connection.close().await;
                return Err(e);
            }
        }
        debug!("Opened connection {} as {:?}", link, role);
        Ok(PeerRecord::new(link, connection, role))
    }

    async fn insert_peer(&mut self, record: PeerRecord) -> bool {
        match self.session.as_mut() {
            Some(session) => {
                session.peers.insert(record.link.user_id.clone(), record);
                true
            }
            None => {
                let _ = record.connection.close().await;
                false
            }
        }
    }

    async fn send_offer(&mut self, peer: &UserId) {
        let Some(connection) = self.connection_of(peer) else {
            return;
        };

        match connection.create_offer().await {
            Ok(sdp) => {
                if let Some(record) = self.record_mut(peer) {
                    record.offer_pending = true;
                    record.renegotiate = false;
                }
                self.signal(
                    SignalType::Offer,
                    Some(peer.clone()),
                    SessionDescription::offer(sdp).to_value(),
                );
            }
            Err(e) => {
                warn!("Failed to create offer for {}: {:#}", peer, e);
                self.teardown_peer(peer, "offer failed").await;
            }
        }
    }

    /// Offer again after a track change, or defer until the pending answer lands.
    async fn renegotiate(&mut self, peer: &UserId) {
        let Some(record) = self.record_mut(peer) else {
            return;
        };
        if record.offer_pending {
            record.renegotiate = true;
            return;
        }
        debug!("Renegotiating with {}", peer);
        self.send_offer(peer).await;
    }

    fn record_mut(&mut self, peer: &UserId) -> Option<&mut PeerRecord> {
        self.session.as_mut()?.peers.get_mut(peer)
    }

    fn connection_of(&self, peer: &UserId) -> Option<Arc<dyn MediaConnection>> {
        self.session
            .as_ref()?
            .peers
            .get(peer)
            .map(|r| r.connection.clone())
    }

    fn signal(&self, signal_type: SignalType, receiver: Option<UserId>, payload: Value) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        let envelope = signaling::call_signal(
            signal_type,
            session.room_id.clone(),
            session.user_id.clone(),
            payload,
            receiver,
        );
        let delivered = self.transport.send(envelope);
        if !delivered {
            warn!("{} signal not delivered; signaling channel is closed", signal_type);
        }
        delivered
    }

    fn send(&self, envelope: Envelope) -> bool {
        let kind = envelope.kind();
        let delivered = self.transport.send(envelope);
        if !delivered {
            warn!("{} not delivered; signaling channel is closed", kind);
        }
        delivered
    }
}

fn set_flag(media: &mut MediaState, kind: MediaKind, value: bool) {
    match kind {
        MediaKind::Audio => media.audio = value,
        MediaKind::Video => media.video = value,
    }
}
