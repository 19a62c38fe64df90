//! Pub/sub publishing boundary
//!
//! The engine publishes through the [`PublishSink`] trait; the production
//! implementation is a Spacebrew WebSocket client, while tests capture
//! messages in memory.

use biobooth_common::payload;
use biobooth_common::{Error, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Spacebrew servers listen for WebSocket clients on this port only;
/// anything else is a misconfiguration worth failing fast on
pub const SPACEBREW_PORT: u16 = 9002;

/// Outbound publishing surface for the session engine
pub trait PublishSink: Send + Sync {
    /// Publish one string payload on a named channel. Implementations must
    /// not block the caller on network progress.
    fn publish(&self, channel: &str, payload: &str) -> Result<()>;
}

/// Spacebrew pub/sub client.
///
/// On connect it announces the client's publish channels, then feeds
/// outbound envelopes through an unbounded channel to a writer task so
/// [`PublishSink::publish`] never awaits. Inbound frames are drained and
/// discarded; this client only publishes.
pub struct SpacebrewClient {
    client_name: String,
    outbound: mpsc::UnboundedSender<String>,
}

impl SpacebrewClient {
    pub async fn connect(server: &str, port: u16, client_name: &str) -> Result<Self> {
        if port != SPACEBREW_PORT {
            return Err(Error::Config(format!(
                "spacebrew port must be {SPACEBREW_PORT}, got {port}"
            )));
        }

        let url = format!("ws://{server}:{port}");
        let (stream, _) = connect_async(&url)
            .await
            .map_err(|e| Error::TransportUnavailable(format!("spacebrew at {url}: {e}")))?;
        info!("connected to spacebrew at {url} as {client_name}");

        let (mut writer, mut reader) = stream.split();
        writer
            .send(Message::Text(payload::config_announcement(client_name)))
            .await
            .map_err(|e| Error::Publish(format!("config announcement: {e}")))?;

        let (outbound, mut pending) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(envelope) = pending.recv().await {
                if let Err(e) = writer.send(Message::Text(envelope)).await {
                    warn!("spacebrew send failed, stopping writer: {e}");
                    break;
                }
            }
            debug!("spacebrew writer task exiting");
        });

        // Keep the read side pumped so server pings get answered
        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            debug!("spacebrew connection closed by server");
        });

        Ok(Self {
            client_name: client_name.to_string(),
            outbound,
        })
    }
}

impl PublishSink for SpacebrewClient {
    fn publish(&self, channel: &str, payload_text: &str) -> Result<()> {
        let envelope = payload::publish_envelope(&self.client_name, channel, payload_text);
        self.outbound
            .send(envelope)
            .map_err(|_| Error::Publish("spacebrew writer is gone".to_string()))
    }
}

/// Captures published messages for inspection in tests
#[derive(Default)]
pub struct MemorySink {
    messages: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured (channel, payload) pairs in publish order
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    /// Payloads published on one channel, in order
    pub fn messages_for(&self, channel: &str) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl PublishSink for MemorySink {
    fn publish(&self, channel: &str, payload_text: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((channel.to_string(), payload_text.to_string()));
        Ok(())
    }
}
