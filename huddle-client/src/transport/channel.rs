use crate::error::TransportError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// An open text channel to the coordination server.
///
/// Dropping `outbound` closes the channel; `inbound` yields `None` once the
/// remote side is gone.
pub struct ChannelHandle {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens the physical channel. Implemented over WebSocket by [`crate::WsConnector`],
/// and by test doubles.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<ChannelHandle, TransportError>;
}
