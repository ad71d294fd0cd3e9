//! Ollama-backed [`Generator`].
//!
//! Calls `POST {url}/api/generate`. Non-streaming requests send
//! `"stream": false` and read the `response` field of the reply. Streaming
//! requests read newline-delimited JSON objects, each carrying a `response`
//! fragment, until one arrives with `"done": true`.
//!
//! The model backend is reached through two clients: one with a whole-request
//! timeout for blocking completions, and one with only a connect timeout for
//! streams, which may legitimately run for minutes.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use rag_harness_core::error::GenerationError;
use rag_harness_core::generation::{FragmentStream, Generator};

use crate::config::ModelConfig;

const CONNECT_TIMEOUT_SECS: u64 = 10;

pub struct OllamaGenerator {
    base_url: String,
    client: Client,
    stream_client: Client,
}

impl OllamaGenerator {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let stream_client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        info!(url = %config.url, "ollama client initialized");
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
            stream_client,
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

fn unavailable(err: reqwest::Error) -> GenerationError {
    GenerationError::Unavailable(err.to_string())
}

/// Reject non-success replies, surfacing Ollama's `{"error": ...}` message.
async fn check_status(response: Response) -> Result<Response, GenerationError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or(body);
    Err(GenerationError::Backend(format!("{}: {}", status, message)))
}

/// Longest NDJSON line accepted before the stream is treated as broken.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a byte stream into NDJSON lines and decodes each into a fragment.
///
/// Empty fragments are dropped. Decoding stops at the first error or at a
/// line with `"done": true`; anything after is ignored. A partial line
/// longer than [`MAX_LINE_BYTES`] is an error.
#[derive(Default)]
struct NdjsonDecoder {
    buffer: Vec<u8>,
    /// Leading bytes of `buffer` already searched for a newline.
    scanned: usize,
    done: bool,
}

impl NdjsonDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, GenerationError>> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(bytes);

        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = buffer[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            self.decode_line(&buffer[start..end], &mut out);
            if self.done {
                return out;
            }
            start = end + 1;
            from = start;
        }

        if buffer.len() - start > MAX_LINE_BYTES {
            out.push(Err(GenerationError::Backend(format!(
                "stream line exceeds {} bytes",
                MAX_LINE_BYTES
            ))));
            self.done = true;
            return out;
        }
        buffer.drain(..start);
        self.scanned = buffer.len();
        self.buffer = buffer;
        out
    }

    /// Flush a trailing line that arrived without a newline.
    fn finish(&mut self) -> Vec<Result<String, GenerationError>> {
        let line = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        let mut out = Vec::new();
        self.decode_line(&line, &mut out);
        self.done = true;
        out
    }

    fn decode_line(&mut self, line: &[u8], out: &mut Vec<Result<String, GenerationError>>) {
        if self.done {
            return;
        }
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match serde_json::from_str::<GenerateChunk>(text) {
            Ok(GenerateChunk {
                error: Some(message),
                ..
            }) => {
                out.push(Err(GenerationError::Backend(message)));
                self.done = true;
            }
            Ok(chunk) => {
                if !chunk.response.is_empty() {
                    out.push(Ok(chunk.response));
                }
                self.done = chunk.done;
            }
            Err(e) => {
                out.push(Err(GenerationError::Backend(format!(
                    "invalid stream line: {}",
                    e
                ))));
                self.done = true;
            }
        }
    }
}

struct FragmentState {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: NdjsonDecoder,
    pending: VecDeque<Result<String, GenerationError>>,
}

/// Adapt a streaming `/api/generate` response body into fragments.
fn fragments(response: Response) -> FragmentStream {
    let body = response
        .bytes_stream()
        .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
        .boxed();
    let state = FragmentState {
        body,
        decoder: NdjsonDecoder::default(),
        pending: VecDeque::new(),
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    return Some((item, None));
                }
                return Some((item, Some(state)));
            }
            if state.decoder.done {
                debug!("ollama stream finished");
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => state.pending.extend(state.decoder.push(&bytes)),
                Some(Err(e)) => {
                    warn!(error = %e, "ollama stream interrupted");
                    return Some((Err(GenerationError::Backend(e.to_string())), None));
                }
                None => state.pending.extend(state.decoder.finish()),
            }
        }
    })
    .boxed()
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, GenerationError> {
        debug!(model, prompt_len = prompt.len(), "ollama generate");
        let response = self
            .client
            .post(self.generate_url())
            .json(&json!({ "model": model, "prompt": prompt, "stream": false }))
            .send()
            .await
            .map_err(unavailable)?;
        let response = check_status(response).await?;

        let chunk: GenerateChunk = response
            .json()
            .await
            .map_err(|e| GenerationError::Backend(format!("invalid response body: {}", e)))?;
        if let Some(message) = chunk.error {
            return Err(GenerationError::Backend(message));
        }
        Ok(chunk.response)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        model: &str,
    ) -> Result<FragmentStream, GenerationError> {
        debug!(model, prompt_len = prompt.len(), "ollama generate stream");
        let response = self
            .stream_client
            .post(self.generate_url())
            .json(&json!({ "model": model, "prompt": prompt, "stream": true }))
            .send()
            .await
            .map_err(unavailable)?;
        let response = check_status(response).await?;
        Ok(fragments(response))
    }

    async fn health(&self) -> Result<Value, GenerationError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(unavailable)?;
        let response = check_status(response).await?;
        let tags: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Backend(format!("invalid response body: {}", e)))?;
        let models: Vec<Value> = tags["models"]
            .as_array()
            .map(|models| models.iter().map(|m| m["name"].clone()).collect())
            .unwrap_or_default();
        Ok(json!({ "models": models }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[Result<String, GenerationError>]) -> Vec<&str> {
        items
            .iter()
            .filter_map(|r| r.as_ref().ok().map(String::as_str))
            .collect()
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = NdjsonDecoder::default();
        let mut out = decoder.push(b"{\"response\":\"Hel\",\"done\":false}\n{\"resp");
        out.extend(decoder.push(b"onse\":\"lo\",\"done\":false}\n"));
        assert_eq!(texts(&out), vec!["Hel", "lo"]);
        assert!(!decoder.done);

        let out = decoder.push(b"{\"response\":\"\",\"done\":true,\"eval_count\":12}\n");
        assert!(out.is_empty());
        assert!(decoder.done);
    }

    #[test]
    fn test_decoder_ignores_lines_after_done() {
        let mut decoder = NdjsonDecoder::default();
        let out = decoder.push(b"{\"response\":\"a\",\"done\":true}\n{\"response\":\"b\"}\n");
        assert_eq!(texts(&out), vec!["a"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_decoder_error_line_terminates() {
        let mut decoder = NdjsonDecoder::default();
        let out = decoder.push(b"{\"response\":\"a\"}\n{\"error\":\"model crashed\"}\n{\"response\":\"b\"}\n");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok("a".to_string()));
        assert_eq!(out[1], Err(GenerationError::Backend("model crashed".into())));
    }

    #[test]
    fn test_decoder_flushes_trailing_line() {
        let mut decoder = NdjsonDecoder::default();
        assert!(decoder.push(b"{\"response\":\"tail\"}").is_empty());
        assert_eq!(texts(&decoder.finish()), vec!["tail"]);
    }

    #[test]
    fn test_decoder_caps_unterminated_line() {
        let mut decoder = NdjsonDecoder::default();
        assert!(decoder.push(&vec![b' '; MAX_LINE_BYTES]).is_empty());
        assert!(!decoder.done);

        let out = decoder.push(b"x");
        assert!(matches!(
            out.as_slice(),
            [Err(GenerationError::Backend(message))] if message.contains("exceeds")
        ));
        assert!(decoder.done);
        assert!(decoder.push(b"{\"response\":\"late\"}\n").is_empty());
    }

    #[test]
    fn test_decoder_keeps_partial_line_across_pushes() {
        let mut decoder = NdjsonDecoder::default();
        assert!(decoder.push(b"{\"response\":").is_empty());
        assert!(decoder.push(b"\"a\"").is_empty());
        let out = decoder.push(b"}\n{\"response\":\"b\"}\n");
        assert_eq!(texts(&out), vec!["a", "b"]);
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let mut decoder = NdjsonDecoder::default();
        let out = decoder.push(b"not json\n");
        assert!(matches!(out.as_slice(), [Err(GenerationError::Backend(_))]));
    }
}
