//! One WebSocket per session, carrying JSON envelopes.
//!
//! The socket is split into a reader task and a writer task that talk to the
//! owner through channels. The owner polls [`ChannelSocket::next_event`],
//! which also drives heartbeat probing and swallows heartbeat echoes before
//! anything reaches lobby dispatch.

use crate::error::ConnectionError;
use crate::latency::{LatencyEdge, LatencyMonitor};
use crate::session::SessionTarget;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Serialize;
use shared::{decode_frame, ClientEnvelope, InboundEnvelope};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};

const OUTBOUND_CAPACITY: usize = 64;
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Milliseconds since the unix epoch, the clock heartbeats are stamped with.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// What the owner of a socket gets back from one poll.
#[derive(Debug)]
pub enum SocketEvent {
    Envelope(InboundEnvelope),
    Latency(LatencyEdge),
    /// The peer closed the connection.
    Closed,
    /// Fatal transport failure. The socket is already torn down.
    Error(ConnectionError),
}

struct Connection {
    outbound: mpsc::Sender<Message>,
    inbound: mpsc::UnboundedReceiver<Result<Message, tungstenite::Error>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    heartbeat: Option<Interval>,
    last_heartbeat_sent_at: Option<u64>,
}

pub struct ChannelSocket {
    heartbeat: Option<Duration>,
    connection: Option<Connection>,
    // A socket instance is single-use: reconnecting takes a fresh instance.
    used: bool,
    latency: LatencyMonitor,
}

impl ChannelSocket {
    pub fn new(heartbeat: Option<Duration>, latency: LatencyMonitor) -> Self {
        Self {
            heartbeat,
            connection: None,
            used: false,
            latency,
        }
    }

    /// Socket with heartbeat probing disabled, used for short-lived flows like
    /// the matchmaking queue.
    pub fn without_heartbeat() -> Self {
        Self::new(
            None,
            LatencyMonitor::new(Duration::from_millis(shared::SLOW_CONNECTION_THRESHOLD_MS)),
        )
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    pub fn heartbeat_enabled(&self) -> bool {
        self.heartbeat.is_some()
    }

    pub fn latency(&self) -> &LatencyMonitor {
        &self.latency
    }

    pub fn last_heartbeat_sent_at(&self) -> Option<u64> {
        self.connection.as_ref().and_then(|c| c.last_heartbeat_sent_at)
    }

    pub async fn open(&mut self, target: &SessionTarget) -> Result<(), ConnectionError> {
        self.open_url(&target.url).await
    }

    pub async fn open_url(&mut self, raw_url: &str) -> Result<(), ConnectionError> {
        if self.used {
            return Err(ConnectionError::ConnectionRefused);
        }

        let url = url::Url::parse(raw_url)
            .map_err(|_| ConnectionError::InvalidUrl(raw_url.to_string()))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ConnectionError::InvalidUrl(raw_url.to_string()));
        }

        self.used = true;
        info!("Connecting to {}", url);
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut sink, mut source) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    debug!("Writer stopped: {}", e);
                    return;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let failed = frame.is_err();
                if inbound_tx.send(frame).is_err() || failed {
                    break;
                }
            }
        });

        let heartbeat = self.heartbeat.map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        self.connection = Some(Connection {
            outbound: outbound_tx,
            inbound: inbound_rx,
            reader,
            writer,
            heartbeat,
            last_heartbeat_sent_at: None,
        });
        info!("Connected to {}", raw_url);
        Ok(())
    }

    /// Sends one envelope. Dropped without error when the socket is not open:
    /// state messages are superseded by the next tick, so nothing is queued.
    pub fn send<T: Serialize>(&self, envelope: &T) {
        let Some(connection) = &self.connection else {
            debug!("Dropping outbound envelope, socket not open");
            return;
        };

        let text = match serde_json::to_string(envelope) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode envelope: {}", e);
                return;
            }
        };

        if let Err(e) = connection.outbound.try_send(Message::text(text)) {
            warn!("Dropping outbound envelope: {}", e);
        }
    }

    /// Waits for the next event worth handing to the owner. Pends forever once
    /// the socket is closed.
    ///
    /// Cancel-safe: nothing is awaited after a frame is taken off the inbound
    /// queue, so dropping the future never loses an event.
    pub async fn next_event(&mut self) -> SocketEvent {
        loop {
            let Some(connection) = self.connection.as_mut() else {
                return std::future::pending().await;
            };

            let frame = tokio::select! {
                frame = connection.inbound.recv() => Some(frame),
                _ = heartbeat_tick(&mut connection.heartbeat) => None,
            };

            let Some(frame) = frame else {
                self.send_heartbeat();
                continue;
            };

            match frame {
                Some(Ok(Message::Text(text))) => match decode_frame(text.as_str()) {
                    Ok(InboundEnvelope::Ping { time }) => {
                        self.send(&ClientEnvelope::Pong { time });
                    }
                    Ok(InboundEnvelope::Pong { time }) => {
                        if let Some(edge) = self.latency.on_heartbeat_echo(time, epoch_millis()) {
                            return SocketEvent::Latency(edge);
                        }
                    }
                    Ok(envelope) => return SocketEvent::Envelope(envelope),
                    Err(e) => warn!("Dropping frame ({}): {}", e, text.as_str()),
                },
                Some(Ok(Message::Binary(data))) => {
                    warn!("Dropping binary frame of {} bytes", data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Server closed connection: {:?}", frame);
                    self.detach();
                    return SocketEvent::Closed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Connection error: {}", e);
                    self.detach();
                    return SocketEvent::Error(ConnectionError::Transport(e));
                }
                None => {
                    info!("Connection closed");
                    self.detach();
                    return SocketEvent::Closed;
                }
            }
        }
    }

    fn send_heartbeat(&mut self) {
        let time = epoch_millis();
        if let Some(connection) = self.connection.as_mut() {
            connection.last_heartbeat_sent_at = Some(time);
        }
        self.send(&ClientEnvelope::Ping { time });
    }

    // Drops the connection without awaiting anything, so the event that
    // caused it is returned from the same poll. The writer finishes on its
    // own once the outbound sender is gone.
    fn detach(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.reader.abort();
        }
    }

    /// Closes the connection, flushing anything already handed to the writer.
    /// Safe to call any number of times.
    pub async fn close(&mut self) {
        if self.connection.is_some() {
            info!("Closing connection");
        }
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let Connection {
            outbound,
            reader,
            mut writer,
            ..
        } = connection;

        // Writer drains what is queued, then sends the close frame
        drop(outbound);
        if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            warn!("Writer did not flush in time");
            writer.abort();
        }
        reader.abort();
    }
}

impl Drop for ChannelSocket {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.reader.abort();
            connection.writer.abort();
        }
    }
}

async fn heartbeat_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
