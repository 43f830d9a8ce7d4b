use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

const DEFAULT_TIMEOUT_S: f64 = 120.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    /// Text part sent just before the image, if any.
    pub label: Option<String>,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub prompt: String,
    pub attachments: Vec<ImageAttachment>,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachments: Vec::new(),
        }
    }

    pub fn attach(mut self, label: Option<&str>, mime: &str, bytes: Vec<u8>) -> Self {
        self.attachments.push(ImageAttachment {
            label: label.map(str::to_string),
            mime: mime.to_string(),
            bytes,
        });
        self
    }
}

/// A vision-capable language model: prompt plus ordered images in, text out.
///
/// Implementations are called from a background thread, one request at a
/// time per session.
pub trait VisionModel: Send + Sync {
    fn name(&self) -> &str;
    fn invoke(&self, request: &ModelRequest) -> Result<String>;
}

/// Picks the model by name. `dryrun` never touches the network.
pub fn model_for_name(name: &str, temperature: f32) -> Arc<dyn VisionModel> {
    match name.trim() {
        "dryrun" | "dry-run" => Arc::new(DryrunModel),
        other => Arc::new(GeminiModel::new(other, temperature)),
    }
}

pub struct DryrunModel;

impl VisionModel for DryrunModel {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn invoke(&self, request: &ModelRequest) -> Result<String> {
        let sizes: Vec<String> = request
            .attachments
            .iter()
            .map(|image| format!("{} ({} bytes)", image.mime, image.bytes.len()))
            .collect();
        Ok(format!(
            "[dryrun] Received {} image(s): {}. Prompt was {} characters. Try brightness +10 and contrast 1.1.",
            request.attachments.len(),
            if sizes.is_empty() {
                "none".to_string()
            } else {
                sizes.join(", ")
            },
            request.prompt.chars().count(),
        ))
    }
}

pub struct GeminiModel {
    model: String,
    temperature: f32,
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiModel {
    pub fn new(model: &str, temperature: f32) -> Self {
        Self {
            model: model.trim().to_string(),
            temperature,
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            timeout: Duration::from_secs_f64(timeout_seconds(
                non_empty_env("LUMEN_MODEL_TIMEOUT_S").as_deref(),
            )),
            http: HttpClient::new(),
        }
    }

    fn api_key() -> Option<String> {
        non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }

    fn endpoint(&self) -> String {
        let model_path = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(&self, request: &ModelRequest) -> Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        for image in &request.attachments {
            if let Some(label) = image.label.as_deref() {
                parts.push(json!({ "text": label }));
            }
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime,
                    "data": BASE64.encode(&image.bytes),
                }
            }));
        }
        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "temperature": self.temperature },
        })
    }

    fn extract_text(payload: &Value) -> Result<String> {
        let mut chunks = Vec::new();
        let candidates = payload
            .get("candidates")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    chunks.push(text);
                }
            }
        }
        let text = chunks.concat();
        if text.trim().is_empty() {
            let reason = payload
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no text in response");
            bail!("Gemini returned an empty reply ({reason})");
        }
        Ok(text.trim().to_string())
    }
}

impl VisionModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn invoke(&self, request: &ModelRequest) -> Result<String> {
        let Some(api_key) = Self::api_key() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key.as_str())])
            .timeout(self.timeout)
            .json(&self.build_payload(request))
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let payload = response_json_or_error("Gemini", response)?;
        Self::extract_text(&payload)
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Flattens an error and its causes into one line for the chat transcript.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().map(|last| last == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn timeout_seconds(raw: Option<&str>) -> f64 {
    raw.and_then(|text| text.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(DEFAULT_TIMEOUT_S)
        .clamp(5.0, 600.0)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
