use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::image::UploadedImage;

/// Wire dialect of the inference server. `generate` is Ollama's
/// single-turn endpoint; `chat` is the OpenAI-compatible completion
/// endpoint some deployments front the model with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Generate,
    Chat,
}

impl Dialect {
    /// Chat deployments run slower multi-turn models, hence the wider
    /// default window. Overridable via `timeout_secs` in config.
    pub fn default_timeout(self) -> Duration {
        match self {
            Dialect::Generate => Duration::from_secs(30),
            Dialect::Chat => Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

fn encode_images(images: &[UploadedImage]) -> Vec<String> {
    images.iter().map(|img| STANDARD.encode(&img.bytes)).collect()
}

/// Thin client over the inference server. One shared connection pool per
/// process; never retries — inference calls are expensive and possibly
/// non-idempotent on the model side.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// POST the built body and decode the reply JSON. Transport failures
    /// and non-2xx statuses both collapse into `OllamaError`: the backend
    /// is one opaque dependency from the caller's point of view.
    async fn post<T, B>(
        &self,
        url: &str,
        body: &B,
        timeout: Duration,
        bearer: Option<&str>,
    ) -> Result<T, GatewayError>
    where
        T: serde::de::DeserializeOwned,
        B: Serialize,
    {
        let mut request = self.http.post(url).timeout(timeout).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| GatewayError::Ollama {
            details: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Ollama {
                details: format!("HTTP {status}: {body}"),
            });
        }

        response.json::<T>().await.map_err(|e| GatewayError::Ollama {
            details: format!("undecodable reply: {e}"),
        })
    }

    /// Single-turn `POST {base}/api/generate`; the reply text lives in
    /// the `response` field.
    pub async fn generate(
        &self,
        base_url: &str,
        model: &str,
        prompt: &str,
        images: &[UploadedImage],
        timeout: Duration,
    ) -> Result<String, GatewayError> {
        let payload = GenerateRequest {
            model,
            prompt,
            images: encode_images(images),
            stream: false,
        };
        let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
        tracing::info!(model, url, "sending generate request");
        let reply: GenerateResponse = self.post(&url, &payload, timeout, None).await?;
        Ok(reply.response)
    }

    /// Chat-completion form `POST {base}/v1/chat/completions`; images ride
    /// along as `image_url` data-URL content parts. Hosted deployments
    /// authenticate with a bearer token.
    pub async fn chat(
        &self,
        base_url: &str,
        model: &str,
        system_prompt: Option<&str>,
        prompt: &str,
        images: &[UploadedImage],
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<String, GatewayError> {
        let mut content = vec![serde_json::json!({ "type": "text", "text": prompt })];
        for (encoded, image) in encode_images(images).iter().zip(images) {
            content.push(serde_json::json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{}", image.mime, encoded) },
            }));
        }

        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: serde_json::Value::String(system.to_string()),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: serde_json::Value::Array(content),
        });

        let payload = ChatRequest {
            model,
            messages,
            temperature: 0,
            stream: false,
        };
        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
        tracing::info!(model, url, "sending chat request");
        let reply: ChatResponse = self.post(&url, &payload, timeout, api_key).await?;
        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::Ollama {
                details: "chat reply carried no choices".to_string(),
            })
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}
