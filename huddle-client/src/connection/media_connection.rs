use crate::connection::connection_event::{ConnectionEvent, PeerLink};
use crate::media::LocalTrack;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One negotiated media connection to one remote peer.
#[async_trait]
pub trait MediaConnection: Send + Sync {
    async fn add_track(&self, track: &LocalTrack) -> Result<()>;

    async fn remove_track(&self, track_id: &str) -> Result<()>;

    /// Create an offer and apply it locally. Returns the SDP to send.
    async fn create_offer(&self) -> Result<String>;

    /// Apply a remote offer, create and apply the answer. Returns the answer SDP.
    async fn accept_offer(&self, sdp: String) -> Result<String>;

    async fn accept_answer(&self, sdp: String) -> Result<()>;

    /// Discard our pending local offer and return to the stable state.
    async fn rollback(&self) -> Result<()>;

    async fn add_ice_candidate(&self, candidate_json: String) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates native connections. Events of every created connection go to `events`.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    async fn create(
        &self,
        link: PeerLink,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Arc<dyn MediaConnection>>;
}
