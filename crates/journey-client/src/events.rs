//! Fire-and-forget outbound notifications.

use std::time::Duration;

use journey_protocol::{BusinessEvent, FlagChangeNotice};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::transport::{build_client, execute};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    Business(BusinessEvent),
    FlagChange(FlagChangeNotice),
}

impl OutboundEvent {
    pub fn event_type(&self) -> &str {
        match self {
            OutboundEvent::Business(e) => &e.event_type,
            OutboundEvent::FlagChange(e) => &e.event_type,
        }
    }
}

/// Emission never blocks the caller and never reports failure back to it.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OutboundEvent);
}

/// POSTs each event as JSON on a detached task.
#[derive(Debug, Clone)]
pub struct HttpEventSink {
    http: Client,
    url: String,
    timeout: Duration,
}

impl HttpEventSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_client()?,
            url: url.into(),
            timeout,
        })
    }
}

impl EventSink for HttpEventSink {
    fn emit(&self, event: OutboundEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(event_type = event.event_type(), "no runtime, dropping event");
            return;
        };
        let event_type = event.event_type().to_string();
        let req = self.http.post(&self.url).json(&event);
        let timeout = self.timeout;
        runtime.spawn(async move {
            match execute(req, timeout).await {
                Ok(raw) if raw.status.is_success() => debug!(event_type, "event delivered"),
                Ok(raw) => warn!(event_type, status = raw.status.as_u16(), "event rejected"),
                Err(err) => warn!(event_type, %err, "event delivery failed"),
            }
        });
    }
}

/// Used when no collector URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: OutboundEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(
                target: "journey::events",
                event_type = event.event_type(),
                %payload,
                "event"
            ),
            Err(err) => warn!(%err, "failed to encode event"),
        }
    }
}
