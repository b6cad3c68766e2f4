//! Realtime change feed: one Phoenix channel per subscription.
//!
//! PROTOCOL
//! ========
//! The socket joins `realtime:bookmarks:user_<id>` asking for
//! `postgres_changes` on `public.bookmarks` filtered to the user. A `phx_reply`
//! to the join ref reports the subscription status. Heartbeats go to the
//! `phoenix` topic on a fixed interval. Releasing the subscription sends
//! `phx_leave` and closes the socket.
//!
//! There is no reconnect. A dropped socket ends the feed; the next session
//! change opens a new one.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::rest::TABLE;
use crate::backend::{BackendError, ChangeSubscription, Subscription};
use crate::model::{ChangeEvent, ChangeFilter, ChangeKind, UserId};

pub(crate) const VSN: &str = "1.0.0";
const JOIN_REF: &str = "1";
const SCHEMA: &str = "public";

// =============================================================================
// WIRE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PhxMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Subscription status as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelStatus {
    Subscribed,
    ChannelError,
    Closed,
}

impl ChannelStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Subscribed => "SUBSCRIBED",
            Self::ChannelError => "CHANNEL_ERROR",
            Self::Closed => "CLOSED",
        }
    }
}

/// What an inbound frame means for the channel.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inbound {
    Joined,
    JoinRejected(String),
    Change(ChangeEvent),
    Closed,
    Failed(String),
    Ignored,
}

pub(crate) fn socket_url(base_url: &str, anon_key: &str) -> Result<String, BackendError> {
    let mut url = reqwest::Url::parse(&format!("{base_url}/realtime/v1/websocket"))
        .map_err(|e| BackendError::Realtime(format!("socket url: {e}")))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| BackendError::Realtime(format!("cannot use {scheme} for {base_url}")))?;
    url.query_pairs_mut()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", VSN);
    Ok(url.into())
}

pub(crate) fn topic_for(user_id: UserId) -> String {
    format!("realtime:{TABLE}:user_{user_id}")
}

pub(crate) fn join_message(topic: &str, user_id: UserId, filter: ChangeFilter, access_token: &str) -> PhxMessage {
    PhxMessage {
        topic: topic.to_owned(),
        event: "phx_join".to_owned(),
        payload: json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": filter.as_wire(),
                    "schema": SCHEMA,
                    "table": TABLE,
                    "filter": format!("user_id=eq.{user_id}"),
                }],
                "private": false,
            },
            "access_token": access_token,
        }),
        msg_ref: Some(JOIN_REF.to_owned()),
        join_ref: Some(JOIN_REF.to_owned()),
    }
}

pub(crate) fn heartbeat_message(msg_ref: u64) -> PhxMessage {
    PhxMessage {
        topic: "phoenix".to_owned(),
        event: "heartbeat".to_owned(),
        payload: json!({}),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: None,
    }
}

pub(crate) fn leave_message(topic: &str, msg_ref: u64) -> PhxMessage {
    PhxMessage {
        topic: topic.to_owned(),
        event: "phx_leave".to_owned(),
        payload: json!({}),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: Some(JOIN_REF.to_owned()),
    }
}

/// Classify a frame received on `topic`. Frames for other topics (heartbeat
/// replies included) are ignored.
pub(crate) fn classify(message: &PhxMessage, topic: &str) -> Inbound {
    if message.topic != topic {
        return Inbound::Ignored;
    }

    match message.event.as_str() {
        "phx_reply" if message.msg_ref.as_deref() == Some(JOIN_REF) => {
            if message.payload["status"] == "ok" {
                Inbound::Joined
            } else {
                Inbound::JoinRejected(reason(&message.payload["response"]))
            }
        }
        "postgres_changes" => {
            let data = &message.payload["data"];
            match data["type"].as_str().and_then(ChangeKind::from_wire) {
                Some(kind) => Inbound::Change(ChangeEvent {
                    kind,
                    table: data["table"].as_str().unwrap_or(TABLE).to_owned(),
                    payload: data.clone(),
                }),
                None => Inbound::Ignored,
            }
        }
        "system" if message.payload["status"] == "error" => Inbound::Failed(reason(&message.payload)),
        "phx_error" => Inbound::Failed(reason(&message.payload)),
        "phx_close" => Inbound::Closed,
        _ => Inbound::Ignored,
    }
}

fn reason(payload: &Value) -> String {
    ["reason", "message"]
        .iter()
        .find_map(|key| payload[key].as_str())
        .map_or_else(|| payload.to_string(), str::to_owned)
}

// =============================================================================
// CHANNEL TASK
// =============================================================================

/// Open the channel in a background task and hand back its subscription.
/// Connection and join failures are logged as `CHANNEL_ERROR`; the returned
/// subscription then simply never yields.
pub(crate) fn subscribe(
    url: String,
    heartbeat: Duration,
    user_id: UserId,
    filter: ChangeFilter,
    access_token: String,
) -> ChangeSubscription {
    let (tx, rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let topic = topic_for(user_id);
    let join = join_message(&topic, user_id, filter, &access_token);

    tokio::spawn(run_channel(url, topic, heartbeat, join, tx, stop_rx));

    Subscription::new(rx, move || {
        let _ = stop_tx.send(());
    })
}

fn log_status(topic: &str, status: ChannelStatus, detail: Option<&str>) {
    match status {
        ChannelStatus::Subscribed => info!(topic, status = status.as_str(), "realtime subscription status"),
        ChannelStatus::Closed => debug!(topic, status = status.as_str(), "realtime subscription status"),
        ChannelStatus::ChannelError => {
            warn!(topic, status = status.as_str(), detail = detail.unwrap_or(""), "realtime subscription status");
        }
    }
}

fn encode(message: &PhxMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!(error = %e, "realtime frame encode failed");
            None
        }
    }
}

async fn run_channel(
    url: String,
    topic: String,
    heartbeat: Duration,
    join: PhxMessage,
    tx: mpsc::UnboundedSender<ChangeEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    let connected = tokio::select! {
        _ = &mut stop => return,
        result = tokio_tungstenite::connect_async(url.as_str()) => result,
    };
    let socket = match connected {
        Ok((socket, _)) => socket,
        Err(e) => {
            log_status(&topic, ChannelStatus::ChannelError, Some(&e.to_string()));
            return;
        }
    };
    let (mut sink, mut stream) = socket.split();

    let Some(frame) = encode(&join) else { return };
    if let Err(e) = sink.send(frame).await {
        log_status(&topic, ChannelStatus::ChannelError, Some(&e.to_string()));
        return;
    }

    let mut next_ref: u64 = 2;
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut stop => {
                if let Some(frame) = encode(&leave_message(&topic, next_ref)) {
                    let _ = sink.send(frame).await;
                }
                let _ = sink.close().await;
                log_status(&topic, ChannelStatus::Closed, None);
                return;
            }
            _ = ticker.tick() => {
                let Some(frame) = encode(&heartbeat_message(next_ref)) else { continue };
                next_ref += 1;
                if let Err(e) = sink.send(frame).await {
                    log_status(&topic, ChannelStatus::ChannelError, Some(&e.to_string()));
                    return;
                }
            }
            inbound = stream.next() => {
                let text = match inbound {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        log_status(&topic, ChannelStatus::Closed, None);
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        log_status(&topic, ChannelStatus::ChannelError, Some(&e.to_string()));
                        return;
                    }
                };

                let message: PhxMessage = match serde_json::from_str(text.as_str()) {
                    Ok(message) => message,
                    Err(e) => {
                        debug!(error = %e, "ignoring unparseable realtime frame");
                        continue;
                    }
                };

                match classify(&message, &topic) {
                    Inbound::Joined => log_status(&topic, ChannelStatus::Subscribed, None),
                    Inbound::Change(event) => {
                        debug!(topic, kind = event.kind.as_wire(), "change received");
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                    Inbound::JoinRejected(detail) | Inbound::Failed(detail) => {
                        log_status(&topic, ChannelStatus::ChannelError, Some(&detail));
                        return;
                    }
                    Inbound::Closed => {
                        log_status(&topic, ChannelStatus::Closed, None);
                        return;
                    }
                    Inbound::Ignored => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "realtime_test.rs"]
mod tests;
