//! Server-sent-events plumbing shared by the streaming adapters.
//!
//! - [`SseDecoder`] turns arbitrary byte chunks into complete SSE events
//! - [`open_event_stream`] sends the request and maps HTTP failures
//! - [`read_events`] pumps the response body through the decoder while
//!   watching the cancellation token

use std::ops::ControlFlow;

use futures::StreamExt;
use switchyard_core::error::ProviderError;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Incremental SSE line decoder.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(event) = self.process_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        // Comment / keep-alive
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => trace!(field, "Ignoring SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// How a [`read_events`] pump ended.
#[derive(Debug)]
pub enum StreamOutcome {
    /// The handler signalled the end of the response
    Finished,
    /// The body ended without the handler signalling completion
    Eof,
    /// The cancellation token fired
    Aborted,
    /// Transport or handler failure
    Failed(ProviderError),
}

/// Send a streaming request, racing it against `cancel`.
///
/// Returns `Ok(None)` when cancelled before a response arrived.
pub async fn open_event_stream(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
    vendor: &str,
) -> Result<Option<reqwest::Response>, ProviderError> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(None),
        response = request.header("Accept", "text/event-stream").send() => {
            response.map_err(|e| ProviderError::Network(e.to_string()))?
        }
    };

    let status = response.status().as_u16();
    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }
    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(format!(
            "Invalid {vendor} API key or insufficient permissions"
        )));
    }
    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, vendor, "Provider streaming error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }
    Ok(Some(response))
}

/// Pump a response body through an [`SseDecoder`].
///
/// `handle` sees each event in order and returns `Break` once the vendor's
/// terminal event has been seen. Cancellation is checked between chunks.
pub async fn read_events<F>(
    response: reqwest::Response,
    cancel: &CancellationToken,
    mut handle: F,
) -> StreamOutcome
where
    F: FnMut(SseEvent) -> Result<ControlFlow<()>, ProviderError>,
{
    let mut bytes = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamOutcome::Aborted,
            chunk = bytes.next() => chunk,
        };
        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return StreamOutcome::Failed(ProviderError::StreamInterrupted(e.to_string())),
            None => break,
        };
        for event in decoder.feed(&chunk) {
            match handle(event) {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => return StreamOutcome::Finished,
                Err(e) => return StreamOutcome::Failed(e),
            }
        }
    }

    if let Some(event) = decoder.finish() {
        match handle(event) {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) => return StreamOutcome::Finished,
            Err(e) => return StreamOutcome::Failed(e),
        }
    }
    StreamOutcome::Eof
}
