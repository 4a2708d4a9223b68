//! Line-oriented pipe transport
//!
//! Reads one JSON envelope per line, dispatches it to completion, and writes at
//! most one JSON line back before reading the next. Logs never touch the
//! output stream.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use regex::Regex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn, Span};

use crate::errors::TransportError;
use crate::mcp::dispatcher::Dispatch;
use crate::mcp::rpc::{RequestId, ResponseEnvelope, PARSE_ERROR};

pub struct StdioTransport {
    dispatcher: Arc<dyn Dispatch>,
    span: Span,
}

impl StdioTransport {
    pub fn new(dispatcher: Arc<dyn Dispatch>, span: Span) -> Self {
        Self { dispatcher, span }
    }

    /// Serves the process's stdin/stdout until stdin closes.
    pub async fn serve_stdio(&self) -> Result<(), TransportError> {
        self.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), TransportError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(parent: &self.span, "stdio transport started");
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            let read = reader
                .read_until(b'\n', &mut buffer)
                .await
                .map_err(TransportError::Read)?;
            if read == 0 {
                break;
            }

            let response = match std::str::from_utf8(&buffer) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(line.trim()).await,
                Err(err) => {
                    let lossy = String::from_utf8_lossy(&buffer);
                    self.parse_failure(lossy.trim(), &err)
                }
            };

            if let Some(response) = response {
                self.write_response(&mut writer, &response).await?;
            }
        }

        info!(parent: &self.span, "input stream closed, stdio transport stopping");
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<ResponseEnvelope> {
        match serde_json::from_str::<Value>(line) {
            Ok(payload) => self.dispatcher.dispatch(payload).await,
            Err(err) => self.parse_failure(line, &err),
        }
    }

    /// A `-32700` reply when the line still names its id, otherwise nothing.
    fn parse_failure(&self, line: &str, err: &dyn fmt::Display) -> Option<ResponseEnvelope> {
        let Some(id) = recover_request_id(line) else {
            warn!(
                parent: &self.span,
                error = %err,
                "dropping unparseable line without recoverable id"
            );
            return None;
        };

        warn!(
            parent: &self.span,
            id = %id,
            error = %err,
            "unparseable line, replying with parse error"
        );
        Some(ResponseEnvelope::error(
            Some(id),
            PARSE_ERROR,
            "Parse error",
            Some(json!({ "message": err.to_string() })),
        ))
    }

    async fn write_response<W>(
        &self,
        writer: &mut W,
        response: &ResponseEnvelope,
    ) -> Result<(), TransportError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut encoded = match serde_json::to_vec(response) {
            Ok(encoded) => encoded,
            Err(err) => {
                error!(parent: &self.span, error = %err, "failed to serialize response");
                return Ok(());
            }
        };
        encoded.push(b'\n');

        writer
            .write_all(&encoded)
            .await
            .map_err(TransportError::Write)?;
        writer.flush().await.map_err(TransportError::Write)?;
        debug!(parent: &self.span, id = ?response.id, "response written");
        Ok(())
    }
}

/// Best-effort scan of a malformed line for the envelope's own `"id"` member.
///
/// Only keys directly inside the outermost object count, so an `"id"` nested
/// in `params` is never mistaken for the request id.
pub fn recover_request_id(line: &str) -> Option<RequestId> {
    static ID_VALUE: OnceLock<Regex> = OnceLock::new();
    let id_value = ID_VALUE.get_or_init(|| {
        Regex::new(r#"^\s*:\s*(-?\d+|"(?:[^"\\]|\\.)*")"#).expect("valid id pattern")
    });

    let bytes = line.as_bytes();
    let mut depth = 0usize;
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            b'"' => {
                let end = closing_quote(bytes, index)?;
                if depth == 1 && &line[index..=end] == "\"id\"" {
                    if let Some(value) = id_value.captures(&line[end + 1..]) {
                        return parse_recovered_id(value.get(1)?.as_str());
                    }
                }
                index = end;
            }
            _ => {}
        }
        index += 1;
    }

    None
}

fn closing_quote(bytes: &[u8], open: usize) -> Option<usize> {
    let mut index = open + 1;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' => index += 2,
            b'"' => return Some(index),
            _ => index += 1,
        }
    }
    None
}

fn parse_recovered_id(raw: &str) -> Option<RequestId> {
    if raw.starts_with('"') {
        serde_json::from_str::<String>(raw).ok().map(RequestId::String)
    } else {
        raw.parse::<i64>().ok().map(RequestId::Integer)
    }
}
