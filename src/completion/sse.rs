//! Server-Sent Events decoding for OpenAI-compatible streaming responses.
//!
//! Feed raw body bytes as they arrive; complete `data:` lines are decoded
//! into content fragments. Partial lines (and partial UTF-8 sequences) are
//! buffered across chunk boundaries.

use serde::Deserialize;

use super::CompletionError;

// ---------------------------------------------------------------------------
// SSE line parsing
// ---------------------------------------------------------------------------

/// Extract the JSON payload from an SSE `data:` line.
///
/// Returns `None` for blank lines, comment lines, non-data fields,
/// and the terminal `data: [DONE]` sentinel.
pub fn extract_sse_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let payload = trimmed.strip_prefix("data:")?;
    let payload = payload.trim_start();
    if payload == "[DONE]" {
        return None;
    }
    Some(payload)
}

fn is_done_line(line: &str) -> bool {
    line.trim().strip_prefix("data:").map(str::trim) == Some("[DONE]")
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chunk types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SseChunk {
    #[serde(default)]
    choices: Vec<SseChoice>,
    #[serde(default)]
    error: Option<SseError>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: Option<SseDelta>,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl SseError {
    fn into_completion_error(self) -> CompletionError {
        let message = self.message.unwrap_or_else(|| "unknown upstream error".into());
        let status = match &self.code {
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .and_then(|code| u16::try_from(code).ok())
                .unwrap_or(0),
            _ => 0,
        };
        let code_text = match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.as_str()),
            _ => None,
        };
        if status == 401 || code_text == Some("invalid_api_key") {
            CompletionError::Authentication(message)
        } else {
            CompletionError::Upstream { status, message }
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Incremental SSE decoder yielding content fragments.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes after the last complete line
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `data: [DONE]` was seen. Later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decode every complete line in `bytes` plus whatever was buffered.
    ///
    /// Empty content deltas (role-only chunks) are dropped.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<String, CompletionError>> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if self.decode_line(&line, &mut out) {
                self.buffer.clear();
                break;
            }
        }
        out
    }

    /// Flush a trailing line that had no terminating newline.
    pub fn finish(&mut self) -> Vec<Result<String, CompletionError>> {
        let mut out = Vec::new();
        if self.done || self.buffer.is_empty() {
            return out;
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        self.decode_line(&line, &mut out);
        out
    }

    /// Returns true when the line terminated the stream.
    fn decode_line(&mut self, line: &str, out: &mut Vec<Result<String, CompletionError>>) -> bool {
        if is_done_line(line) {
            self.done = true;
            return true;
        }

        let Some(json) = extract_sse_data(line) else {
            return false;
        };

        match serde_json::from_str::<SseChunk>(json) {
            Ok(chunk) => {
                if let Some(err) = chunk.error {
                    out.push(Err(err.into_completion_error()));
                    self.done = true;
                    return true;
                }
                for choice in chunk.choices {
                    if let Some(content) = choice.delta.and_then(|d| d.content) {
                        if !content.is_empty() {
                            out.push(Ok(content));
                        }
                    }
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Skipping undecodable SSE data line");
            }
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
