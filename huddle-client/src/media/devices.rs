use crate::error::MediaError;
use crate::media::local::{LocalStream, MediaConstraints};
use async_trait::async_trait;

/// Capture devices of the local machine. Implemented by the embedding application.
///
/// Both methods may suspend for as long as the platform needs (permission prompts,
/// device warm-up) and fail with a [`MediaError`].
#[async_trait]
pub trait MediaDevices: Send + Sync + 'static {
    /// Camera and/or microphone per `constraints`.
    async fn user_media(&self, constraints: MediaConstraints) -> Result<LocalStream, MediaError>;

    /// Screen capture. Its tracks end when the user stops sharing from the OS.
    async fn display_media(&self) -> Result<LocalStream, MediaError>;
}
