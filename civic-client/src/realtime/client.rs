//! Realtime websocket client
//!
//! Speaks the platform's channel protocol over one websocket per
//! subscription:
//! 1. Connect to `/realtime/v1/websocket`
//! 2. `phx_join` the channel with a `postgres_changes` filter
//! 3. Heartbeat on the `phoenix` topic
//! 4. Forward `postgres_changes` frames as [`ChangeEvent`]s
//! 5. `phx_leave` and close when the subscription is released

use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shared::{ChangeEvent, ChangeKind, EventMask, Table};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{RealtimeConfig, Subscription};
use crate::error::{ClientError, ClientResult};

/// One protocol frame
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

impl Frame {
    fn join(topic: &str, table: Table, mask: EventMask, access_token: Option<&str>) -> Self {
        let mut payload = json!({
            "config": {
                "postgres_changes": [{
                    "event": mask.as_filter(),
                    "schema": "public",
                    "table": table.as_str(),
                }]
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }
        Self {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload,
            reference: Some("1".to_string()),
        }
    }

    fn heartbeat(reference: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    fn leave(topic: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    fn to_message(&self) -> ClientResult<Message> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

/// `postgres_changes` payload body
#[derive(Debug, Deserialize)]
struct ChangeData {
    table: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Value,
    #[serde(default)]
    old_record: Value,
    #[serde(default)]
    commit_timestamp: Option<DateTime<Utc>>,
}

/// Realtime websocket client
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    url: String,
    access_token: Option<String>,
    config: RealtimeConfig,
}

impl RealtimeClient {
    pub fn new(url: impl Into<String>, access_token: Option<String>, config: RealtimeConfig) -> Self {
        Self {
            url: url.into(),
            access_token,
            config,
        }
    }

    /// Use a different access token for channels opened from now on
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    /// Open a channel for `table` and start forwarding its changes.
    pub async fn subscribe(&self, table: Table, mask: EventMask) -> ClientResult<Subscription> {
        let connect = tokio_tungstenite::connect_async(self.url.as_str());
        let (ws, _response) = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| ClientError::Subscription("realtime connect timed out".to_string()))?
            .map_err(|e| ClientError::Subscription(format!("realtime connect failed: {e}")))?;

        let (mut sink, stream) = ws.split();

        let topic = format!("realtime:{}:{}", table, Uuid::new_v4().simple());
        let join = Frame::join(&topic, table, mask, self.access_token.as_deref());
        sink.send(join.to_message()?)
            .await
            .map_err(|e| ClientError::Subscription(format!("channel join failed: {e}")))?;

        tracing::info!(table = %table, topic = %topic, "Realtime channel joined");

        let heartbeat = self.config.heartbeat_interval;
        Ok(Subscription::spawn(
            table,
            mask,
            self.config.channel_buffer,
            move |tx, cancel| run_channel(sink, stream, topic, table, mask, heartbeat, tx, cancel),
        ))
    }
}

/// What an incoming frame means for one channel
#[derive(Debug)]
enum Inbound {
    Change(ChangeEvent),
    /// The server dropped or refused this channel
    Closed,
    Ignored,
}

/// Feed task for one channel
#[allow(clippy::too_many_arguments)]
async fn run_channel<S, R>(
    mut sink: S,
    mut stream: R,
    topic: String,
    table: Table,
    mask: EventMask,
    heartbeat_interval: Duration,
    tx: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
) where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin + Send,
{
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await;
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Ok(msg) = Frame::leave(&topic, next_ref).to_message() {
                    let _ = sink.send(msg).await;
                }
                let _ = sink.close().await;
                tracing::debug!(topic = %topic, "Realtime channel left");
                break;
            }
            _ = heartbeat.tick() => {
                let sent = match Frame::heartbeat(next_ref).to_message() {
                    Ok(msg) => sink.send(msg).await.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                next_ref += 1;
                if let Err(e) = sent {
                    tracing::warn!(topic = %topic, "Heartbeat failed, dropping channel: {}", e);
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match decode_frame(text.as_str(), &topic, table, mask) {
                    Ok(Inbound::Change(event)) => {
                        if tx.send(event).await.is_err() {
                            tracing::debug!(topic = %topic, "Subscriber gone, leaving channel");
                            break;
                        }
                    }
                    Ok(Inbound::Closed) => {
                        let _ = sink.close().await;
                        break;
                    }
                    Ok(Inbound::Ignored) => {}
                    Err(e) => tracing::warn!(topic = %topic, "Undecodable realtime frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(topic = %topic, ?frame, "Realtime server closed the channel");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(topic = %topic, "Realtime transport error: {}", e);
                    break;
                }
                None => {
                    tracing::info!(topic = %topic, "Realtime stream ended");
                    break;
                }
            }
        }
    }
}

/// Classify a raw frame for the channel on `topic`.
///
/// `phx_close`, `phx_error` and a refused join on `topic` end the channel.
/// Heartbeat replies, frames for other topics and changes outside
/// `table`/`mask` are ignored.
fn decode_frame(text: &str, topic: &str, table: Table, mask: EventMask) -> Result<Inbound, String> {
    let frame: Frame = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let own = frame.topic == topic;

    match frame.event.as_str() {
        "postgres_changes" => {}
        "phx_reply" => {
            if frame.payload.get("status").and_then(Value::as_str) == Some("error") {
                tracing::warn!(topic = %frame.topic, payload = %frame.payload, "Channel reply with error");
                if own {
                    return Ok(Inbound::Closed);
                }
            }
            return Ok(Inbound::Ignored);
        }
        "phx_error" | "phx_close" if own => {
            tracing::warn!(topic = %frame.topic, event = %frame.event, "Channel closed by server");
            return Ok(Inbound::Closed);
        }
        _ => return Ok(Inbound::Ignored),
    }

    let data: ChangeData = serde_json::from_value(
        frame
            .payload
            .get("data")
            .cloned()
            .ok_or_else(|| "postgres_changes frame without data".to_string())?,
    )
    .map_err(|e| e.to_string())?;

    let kind: ChangeKind = data.kind.parse().map_err(|e: shared::models::ParseLabelError| e.to_string())?;
    if data.table != table.as_str() || !mask.contains(kind) {
        return Ok(Inbound::Ignored);
    }

    Ok(Inbound::Change(ChangeEvent {
        table,
        kind,
        record: data.record,
        old_record: data.old_record,
        commit_timestamp: data.commit_timestamp,
    }))
}
