//! Server-Sent-Events framing for upstream provider streams.
//!
//! DESIGN
//! ======
//! Providers speak the same outer framing (`data: {json}` records separated
//! by blank lines, optional `[DONE]` sentinel) but different inner event
//! schemas. This module owns the outer layer: byte buffering, event
//! boundary detection, `data:` extraction, and the pump loop that feeds a
//! provider-specific [`SseParser`]. Parsers are pure and synchronous so the
//! inner schemas are testable without a network.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::warn;

use super::types::{LlmError, StreamEvent};

/// Upper bound on buffered bytes between event boundaries.
const MAX_BUFFER_BYTES: usize = 1024 * 1024;

/// Abort the stream when the provider goes quiet for this long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Consecutive unparseable payloads tolerated before giving up.
const MAX_PARSE_ERRORS: usize = 5;

// =============================================================================
// PARSER CONTRACT
// =============================================================================

#[derive(Debug)]
pub(crate) enum SseParseAction {
    /// Nothing to emit yet.
    Continue,
    /// Emit these events; stop if one is terminal.
    Emit(Vec<StreamEvent>),
    /// The payload is malformed beyond recovery.
    Error(String),
}

/// Provider-specific interpretation of decoded SSE payloads.
pub(crate) trait SseParser {
    fn parse(&mut self, json: &serde_json::Value) -> SseParseAction;

    /// Flush events held back for assembly (tool-call fragments, the final
    /// stop reason). Called at the `[DONE]` sentinel and at end of stream.
    fn finish(&mut self) -> Vec<StreamEvent>;

    fn provider_name(&self) -> &'static str;
}

pub(crate) fn emit_or_continue(events: Vec<StreamEvent>) -> SseParseAction {
    if events.is_empty() {
        SseParseAction::Continue
    } else {
        SseParseAction::Emit(events)
    }
}

// =============================================================================
// FRAMING
// =============================================================================

fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a <= b { (a, 2) } else { (b, 4) }),
        (Some(a), None) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

fn drain_next_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_event_boundary(buffer)?;
    let event = buffer[..pos].to_vec();
    buffer.drain(..pos + delim_len);
    Some(event)
}

fn extract_data(event: &str) -> Option<String> {
    let mut data = String::new();
    let mut found = false;

    for line in event.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(mut rest) = line.strip_prefix("data:") {
            if let Some(stripped) = rest.strip_prefix(' ') {
                rest = stripped;
            }
            if found {
                data.push('\n');
            }
            data.push_str(rest);
            found = true;
        }
    }

    if found { Some(data) } else { None }
}

// =============================================================================
// PUMP
// =============================================================================

async fn send(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

/// Forward assembled events; returns `false` when the stream should stop
/// (receiver gone or a terminal event was delivered).
async fn forward(tx: &mpsc::Sender<StreamEvent>, events: Vec<StreamEvent>) -> bool {
    for event in events {
        let terminal = event.is_terminal();
        if !send(tx, event).await || terminal {
            return false;
        }
    }
    true
}

/// Drive an SSE response body through a provider parser, pushing decoded
/// [`StreamEvent`]s on `tx`.
///
/// Always leaves the consumer with a terminal event (or a dropped channel);
/// a transport failure is reported both as a [`StreamEvent::Error`] and in
/// the returned `Result`.
pub(crate) async fn process_stream<P: SseParser>(
    response: reqwest::Response,
    parser: &mut P,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<(), LlmError> {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut parse_errors = 0usize;

    loop {
        let Ok(next) = tokio::time::timeout(IDLE_TIMEOUT, stream.next()).await else {
            let msg = "stream idle timeout".to_string();
            let _ = send(tx, StreamEvent::Error(msg.clone())).await;
            return Err(LlmError::ApiRequest(msg));
        };

        let Some(chunk) = next else { break };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = send(tx, StreamEvent::Error(e.to_string())).await;
                return Err(LlmError::ApiRequest(e.to_string()));
            }
        };
        buffer.extend_from_slice(&chunk);

        if buffer.len() > MAX_BUFFER_BYTES {
            let msg = "SSE buffer exceeded maximum size".to_string();
            let _ = send(tx, StreamEvent::Error(msg.clone())).await;
            return Err(LlmError::StreamParse(msg));
        }

        while let Some(event) = drain_next_event(&mut buffer) {
            if event.is_empty() {
                continue;
            }

            let Ok(event) = std::str::from_utf8(&event) else {
                let msg = "invalid UTF-8 in SSE stream".to_string();
                let _ = send(tx, StreamEvent::Error(msg.clone())).await;
                return Err(LlmError::StreamParse(msg));
            };

            let Some(data) = extract_data(event) else {
                continue;
            };

            if data == "[DONE]" {
                let _ = forward(tx, parser.finish()).await;
                return Ok(());
            }

            match serde_json::from_str::<serde_json::Value>(&data) {
                Ok(json) => {
                    parse_errors = 0;
                    match parser.parse(&json) {
                        SseParseAction::Continue => {}
                        SseParseAction::Emit(events) => {
                            if !forward(tx, events).await {
                                return Ok(());
                            }
                        }
                        SseParseAction::Error(msg) => {
                            let _ = send(tx, StreamEvent::Error(msg.clone())).await;
                            return Err(LlmError::StreamParse(msg));
                        }
                    }
                }
                Err(e) => {
                    parse_errors = parse_errors.saturating_add(1);
                    warn!(
                        error = %e,
                        payload_bytes = data.len(),
                        provider = parser.provider_name(),
                        "invalid SSE JSON payload"
                    );
                    if parse_errors >= MAX_PARSE_ERRORS {
                        let msg = format!("invalid stream payload: {e}");
                        let _ = send(tx, StreamEvent::Error(msg.clone())).await;
                        return Err(LlmError::StreamParse(msg));
                    }
                }
            }
        }
    }

    // Stream ended without [DONE]; flush whatever the parser held back.
    let leftovers = parser.finish();
    if leftovers.iter().any(StreamEvent::is_terminal) {
        let _ = forward(tx, leftovers).await;
        return Ok(());
    }
    let _ = forward(tx, leftovers).await;
    let msg = "connection closed before stream completed".to_string();
    let _ = send(tx, StreamEvent::Error(msg.clone())).await;
    Err(LlmError::ApiRequest(msg))
}

// =============================================================================
// TESTS
// =============================================================================
