use bytes::Bytes;
use huddle_core::utils::new_id;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
}

impl TrackSource {
    pub fn kind(self) -> MediaKind {
        match self {
            TrackSource::Microphone => MediaKind::Audio,
            TrackSource::Camera | TrackSource::Screen => MediaKind::Video,
        }
    }
}

/// Which capture devices a call asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl MediaConstraints {
    pub fn new(video: bool, audio: bool) -> Self {
        Self { video, audio }
    }

    pub fn audio_only() -> Self {
        Self::new(false, true)
    }

    pub fn video_only() -> Self {
        Self::new(true, false)
    }
}

struct LocalTrackInner {
    id: String,
    stream_id: String,
    source: TrackSource,
    enabled: AtomicBool,
    ended: watch::Sender<bool>,
    rtp: Arc<TrackLocalStaticSample>,
}

/// A captured local track. Clones share the enabled flag and the ended signal.
#[derive(Clone)]
pub struct LocalTrack {
    inner: Arc<LocalTrackInner>,
}

impl LocalTrack {
    pub fn new(source: TrackSource, stream_id: impl Into<String>) -> Self {
        let id = new_id();
        let stream_id = stream_id.into();
        let codec = match source.kind() {
            MediaKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            MediaKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        };
        let rtp = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.clone(),
            stream_id.clone(),
        ));
        let (ended, _) = watch::channel(false);

        Self {
            inner: Arc::new(LocalTrackInner {
                id,
                stream_id,
                source,
                enabled: AtomicBool::new(true),
                ended,
                rtp,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.source.kind()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Stop capture. Fires the ended signal exactly like an OS-initiated stop.
    pub fn stop(&self) {
        self.inner.ended.send_replace(true);
    }

    pub fn is_ended(&self) -> bool {
        *self.inner.ended.borrow()
    }

    /// Resolves once the track has ended, whoever stopped it.
    pub async fn ended(&self) {
        let mut rx = self.inner.ended.subscribe();
        let _ = rx.wait_for(|ended| *ended).await;
    }

    pub fn rtp_track(&self) -> Arc<TrackLocalStaticSample> {
        self.inner.rtp.clone()
    }

    /// Push one encoded frame. Frames are dropped while the track is disabled or ended.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> anyhow::Result<()> {
        if !self.is_enabled() || self.is_ended() {
            return Ok(());
        }
        self.inner
            .rtp
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("enabled", &self.is_enabled())
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// A set of local tracks sharing one stream id. Clones observe tracks added later.
#[derive(Clone, Debug)]
pub struct LocalStream {
    id: String,
    tracks: Arc<Mutex<Vec<LocalTrack>>>,
}

impl LocalStream {
    pub fn new() -> Self {
        Self {
            id: new_id(),
            tracks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Build a stream with one fresh track per source.
    pub fn with_sources(sources: &[TrackSource]) -> Self {
        let stream = Self::new();
        for source in sources {
            stream.add_track(LocalTrack::new(*source, stream.id()));
        }
        stream
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> Vec<LocalTrack> {
        self.lock().clone()
    }

    pub fn tracks_of(&self, kind: MediaKind) -> Vec<LocalTrack> {
        self.lock()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn has(&self, kind: MediaKind) -> bool {
        self.lock().iter().any(|t| t.kind() == kind)
    }

    pub fn add_track(&self, track: LocalTrack) {
        self.lock().push(track);
    }

    pub fn stop(&self) {
        for track in self.lock().iter() {
            track.stop();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LocalTrack>> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LocalStream {
    fn default() -> Self {
        Self::new()
    }
}
