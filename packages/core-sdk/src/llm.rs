use async_stream::stream;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::pin::Pin;

use crate::error::LlmError;
use crate::models::{Message, Role};

pub const GEMINI_DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com";
pub const OPENROUTER_DEFAULT_BASE: &str = "https://openrouter.ai/api/v1";

/**
 * \brief Incremental completion text produced by a provider.
 */
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/**
 * \brief Everything a single provider call needs; built per request and never shared.
 */
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub api_key: String,
    pub model: String,
    /** \brief `None` leaves sampling to the provider default. */
    pub temperature: Option<f64>,
    pub messages: Vec<Message>,
}

/**
 * \brief Streaming chat completion backend.
 */
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn stream_chat(&self, call: &ProviderCall) -> Result<TokenStream, LlmError>;
}

/**
 * \brief Google Gemini `streamGenerateContent` client.
 */
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_base: String,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent",
            normalize_gemini_base(&self.api_base),
            model
        )
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn stream_chat(&self, call: &ProviderCall) -> Result<TokenStream, LlmError> {
        let body = gemini_payload(&call.messages);
        tracing::debug!(
            model = %call.model,
            contents = body["contents"].as_array().map_or(0, Vec::len),
            "gemini stream request"
        );

        let resp = self
            .http
            .post(self.endpoint(&call.model))
            .query(&[("alt", "sse"), ("key", call.api_key.as_str())])
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                provider: "gemini",
                status,
                body,
            });
        }

        Ok(sse_text_stream(resp, parse_gemini_chunk))
    }
}

/**
 * \brief OpenAI-compatible `chat/completions` client (OpenRouter by default).
 */
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_base: String,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn stream_chat(&self, call: &ProviderCall) -> Result<TokenStream, LlmError> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let body = openai_payload(call);
        tracing::debug!(
            model = %call.model,
            messages = call.messages.len(),
            "openai stream request"
        );

        let resp = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", call.api_key))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                provider: "openai",
                status,
                body,
            });
        }

        Ok(sse_text_stream(resp, parse_openai_chunk))
    }
}

/**
 * \brief Gemini body: user/assistant turns only, assistant renamed to `model`.
 */
pub fn gemini_payload(messages: &[Message]) -> Value {
    let contents = messages
        .iter()
        .filter(|m| m.role.is_visible())
        .map(|m| {
            let role = if m.role == Role::User { "user" } else { "model" };
            json!({
                "role": role,
                "parts": [{"text": m.content}]
            })
        })
        .collect::<Vec<_>>();
    json!({ "contents": contents })
}

/**
 * \brief OpenAI body: messages pass through as-is.
 */
pub fn openai_payload(call: &ProviderCall) -> Value {
    let mut body = json!({
        "model": call.model,
        "messages": call.messages,
        "stream": true
    });
    if let Some(temperature) = call.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

/** \brief What a single SSE `data:` payload carried. */
#[derive(Debug, PartialEq)]
enum Chunk {
    Text(String),
    Skip,
    Done,
    Failed(String),
}

fn sse_text_stream(resp: reqwest::Response, parse: fn(&str) -> Chunk) -> TokenStream {
    let mut bytes = resp.bytes_stream();
    let mut decoder = SseDecoder::default();

    let out = stream! {
        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(LlmError::Http(e));
                    return;
                }
            };
            for data in decoder.push(&chunk) {
                match parse(&data) {
                    Chunk::Text(text) => {
                        yield Ok(text);
                    }
                    Chunk::Skip => {}
                    Chunk::Done => return,
                    Chunk::Failed(message) => {
                        yield Err(LlmError::Decode(message));
                        return;
                    }
                }
            }
        }
        if let Some(data) = decoder.finish() {
            match parse(&data) {
                Chunk::Text(text) => {
                    yield Ok(text);
                }
                Chunk::Failed(message) => {
                    yield Err(LlmError::Decode(message));
                }
                Chunk::Skip | Chunk::Done => {}
            }
        }
    };

    Box::pin(out)
}

/**
 * \brief Splits a byte stream into SSE `data:` payloads; tolerates CRLF framing.
 */
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
        let mut out = Vec::new();
        while let Some(pos) = find_double_newline(&self.buf) {
            let block = self.buf.drain(..pos + 2).collect::<Vec<u8>>();
            if let Some(data) = extract_data(&block) {
                out.push(data);
            }
        }
        out
    }

    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        extract_data(&rest)
    }
}

fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn extract_data(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let lines = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect::<Vec<_>>();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn error_message(v: &Value) -> Option<String> {
    let err = v.get("error")?;
    Some(
        err.get("message")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| err.to_string()),
    )
}

fn parse_openai_chunk(data: &str) -> Chunk {
    if data.trim() == "[DONE]" {
        return Chunk::Done;
    }
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Chunk::Skip,
    };
    if let Some(message) = error_message(&v) {
        return Chunk::Failed(message);
    }
    match v
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
    {
        Some(text) if !text.is_empty() => Chunk::Text(text.to_string()),
        _ => Chunk::Skip,
    }
}

fn parse_gemini_chunk(data: &str) -> Chunk {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Chunk::Skip,
    };
    if let Some(message) = error_message(&v) {
        return Chunk::Failed(message);
    }
    let text = v
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default();
    if text.is_empty() {
        Chunk::Skip
    } else {
        Chunk::Text(text)
    }
}

fn normalize_gemini_base(api_base: &str) -> String {
    let trimmed = api_base.trim_end_matches('/');
    if trimmed.ends_with("/v1")
        || trimmed.ends_with("/v1beta")
        || trimmed.contains("/v1/")
        || trimmed.contains("/v1beta/")
    {
        trimmed.to_string()
    } else {
        format!("{}/v1beta", trimmed)
    }
}
