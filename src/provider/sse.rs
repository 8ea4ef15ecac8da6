//! Shared SSE (Server-Sent Events) plumbing for streaming providers.

use futures::StreamExt;
use reqwest_eventsource::{Error as EsError, Event, EventSource};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::traits::ProviderError;

/// A parsed SSE event with event type and data.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Open an event source for `request` with reconnects disabled; retries are
/// decided by the caller's retry policy, not by the transport.
pub fn event_source(request: reqwest::RequestBuilder) -> Result<EventSource, ProviderError> {
    let mut es = EventSource::new(request).map_err(|e| ProviderError::Other(e.to_string()))?;
    es.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));
    Ok(es)
}

/// Drives an EventSource, sending parsed events through a channel.
/// Returns when the stream ends, errors, or is cancelled.
///
/// Non-success responses are classified by status so the retry policy can
/// see them.
pub async fn drive_sse(
    mut es: EventSource,
    tx: mpsc::UnboundedSender<SseEvent>,
    cancel: CancellationToken,
) -> Result<(), ProviderError> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                es.close();
                return Err(ProviderError::Cancelled);
            }
            event = es.next() => {
                match event {
                    None => return Ok(()),
                    Some(Ok(Event::Open)) => {
                        debug!("SSE connection opened");
                    }
                    Some(Ok(Event::Message(msg))) => {
                        if tx.send(SseEvent {
                            event: msg.event,
                            data: msg.data,
                        }).is_err() {
                            es.close();
                            return Ok(());
                        }
                    }
                    Some(Err(EsError::StreamEnded)) => {
                        es.close();
                        return Ok(());
                    }
                    Some(Err(EsError::InvalidStatusCode(status, response))) => {
                        es.close();
                        let body = response.text().await.unwrap_or_default();
                        return Err(ProviderError::classify(status.as_u16(), &body));
                    }
                    Some(Err(EsError::Transport(e))) => {
                        es.close();
                        return Err(ProviderError::Network(e.to_string()));
                    }
                    Some(Err(e)) => {
                        es.close();
                        return Err(ProviderError::Api(e.to_string()));
                    }
                }
            }
        }
    }
}
