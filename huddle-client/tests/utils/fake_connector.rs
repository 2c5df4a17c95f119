use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use huddle_client::{ChannelHandle, Connector, TransportError};
use huddle_core::Envelope;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// In-memory connector. Every successful open hands the server side to the test.
#[derive(Clone)]
pub struct FakeConnector {
    accepting: Arc<AtomicBool>,
    opens: Arc<AtomicU32>,
    sessions: mpsc::UnboundedSender<FakeSession>,
}

impl FakeConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FakeSession>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        let connector = Self {
            accepting: Arc::new(AtomicBool::new(true)),
            opens: Arc::new(AtomicU32::new(0)),
            sessions,
        };
        (connector, rx)
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Open attempts so far, successful or not.
    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, url: &str) -> Result<ChannelHandle, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                url: url.to_owned(),
                reason: "refused".to_owned(),
            });
        }

        let (outbound, sent) = mpsc::unbounded_channel();
        let (inject, inbound) = mpsc::unbounded_channel();
        let _ = self.sessions.send(FakeSession {
            sent,
            inject: Some(inject),
        });
        Ok(ChannelHandle { outbound, inbound })
    }
}

/// Server end of one fake channel. Dropping it closes the channel.
pub struct FakeSession {
    sent: mpsc::UnboundedReceiver<String>,
    inject: Option<mpsc::UnboundedSender<String>>,
}

impl FakeSession {
    /// Next envelope the client wrote.
    pub async fn recv(&mut self) -> Result<Envelope> {
        let text = tokio::time::timeout(Duration::from_secs(5), self.sent.recv())
            .await
            .context("timed out waiting for the client")?
            .context("client closed the channel")?;
        Ok(Envelope::from_json(&text)?)
    }

    /// Skip envelopes until one of `kind` arrives.
    pub async fn recv_kind(&mut self, kind: &str) -> Result<Envelope> {
        loop {
            let envelope = self.recv().await?;
            if envelope.kind() == kind {
                return Ok(envelope);
            }
        }
    }

    /// Nothing already written and nothing written within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<()> {
        match tokio::time::timeout(window, self.sent.recv()).await {
            Ok(Some(text)) => bail!("unexpected envelope: {text}"),
            _ => Ok(()),
        }
    }

    pub fn push(&self, envelope: Envelope) {
        let text = envelope.to_json().expect("Failed to serialize envelope");
        self.push_raw(&text);
    }

    pub fn push_raw(&self, text: &str) {
        if let Some(inject) = &self.inject {
            let _ = inject.send(text.to_owned());
        }
    }

    /// Close the channel from the server side.
    pub fn close(&mut self) {
        self.inject = None;
    }
}

pub async fn next_session(sessions: &mut mpsc::UnboundedReceiver<FakeSession>) -> FakeSession {
    tokio::time::timeout(Duration::from_secs(30), sessions.recv())
        .await
        .expect("No channel was opened")
        .expect("Connector dropped")
}
