use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Multipart, State, multipart::MultipartRejection},
    routing::{get, post},
};
use serde::Serialize;

use crate::AppState;
use crate::config::GatewayConfig;
use crate::error::{ErrorResponse, GatewayError};
use crate::image::{self, UploadedImage};
use crate::ollama::Dialect;
use crate::salvage::salvage;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub is_healthy: bool,
    pub status: String,
}

pub async fn healthy(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        is_healthy: true,
        status: "OK".to_string(),
    })
}

/// Decoded multipart form: file parts keyed by field name, plus the
/// plain-text fields (prompt/url/model overrides).
#[derive(Default)]
struct UploadForm {
    files: HashMap<String, Vec<u8>>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, GatewayError> {
        let mut form = UploadForm::default();
        loop {
            let field = multipart
                .next_field()
                .await
                .map_err(|e| GatewayError::Validation {
                    details: Some(serde_json::Value::String(e.to_string())),
                })?;
            let Some(field) = field else { break };
            let name = field.name().unwrap_or_default().to_string();
            let is_file = field.file_name().is_some();
            let data = field.bytes().await.map_err(|e| GatewayError::Validation {
                details: Some(serde_json::Value::String(e.to_string())),
            })?;
            if is_file {
                form.files.insert(name, data.to_vec());
            } else {
                let text = String::from_utf8_lossy(&data).into_owned();
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    /// Validates the named file parts in order; the first failure aborts
    /// the whole request.
    fn take_images(&mut self, names: &[&str]) -> Result<Vec<UploadedImage>, GatewayError> {
        let mut images = Vec::with_capacity(names.len());
        for name in names {
            let bytes = self.files.remove(*name).ok_or_else(|| GatewayError::Validation {
                details: Some(serde_json::json!({ "missing": name })),
            })?;
            images.push(image::validate(bytes)?);
        }
        Ok(images)
    }
}

/// Which endpoint prompt to fall back to when the form carries no
/// `prompt_text` override.
#[derive(Clone, Copy)]
enum PromptKind {
    ExtractInfo,
    FaceSimilarity,
}

impl PromptKind {
    fn from_config(self, config: &GatewayConfig) -> String {
        match self {
            PromptKind::ExtractInfo => config.extract_info_prompt.clone(),
            PromptKind::FaceSimilarity => config.face_similarity_prompt.clone(),
        }
    }
}

/// The one pipeline behind every document route: validate uploads, pick
/// prompt/backend from form overrides or `config.json`, call the model,
/// salvage the reply.
async fn run_pipeline(
    state: &AppState,
    multipart: Multipart,
    image_names: &[&str],
    prompt_kind: PromptKind,
) -> Result<serde_json::Value, GatewayError> {
    let mut form = UploadForm::read(multipart).await?;
    let images = form.take_images(image_names)?;

    let prompt_override = form.fields.remove("prompt_text");
    let url_override = form.fields.remove("ollama_url");
    let model_override = form.fields.remove("ollama_model");

    // The ad-hoc variant supplies all three as form fields and runs
    // without any config.json on disk.
    let needs_config =
        prompt_override.is_none() || url_override.is_none() || model_override.is_none();
    let config = if needs_config {
        Some(GatewayConfig::load(&state.config_path).await?)
    } else {
        None
    };

    let prompt = match (prompt_override, &config) {
        (Some(text), _) => text,
        (None, Some(config)) => prompt_kind.from_config(config),
        (None, None) => {
            return Err(GatewayError::Internal {
                details: "no prompt available for request".to_string(),
            });
        }
    };
    let url = url_override
        .or_else(|| config.as_ref().map(|c| c.ollama_url.clone()))
        .unwrap_or_default();
    let model = model_override
        .or_else(|| config.as_ref().map(|c| c.ollama_model.clone()))
        .unwrap_or_default();

    let dialect = config.as_ref().map(|c| c.dialect).unwrap_or_default();
    let timeout = config
        .as_ref()
        .and_then(|c| c.timeout_secs)
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| dialect.default_timeout());

    let reply = match dialect {
        Dialect::Generate => {
            state
                .client
                .generate(&url, &model, &prompt, &images, timeout)
                .await?
        }
        Dialect::Chat => {
            let system = config.as_ref().and_then(|c| c.system_prompt.clone());
            let api_key = config.as_ref().and_then(|c| c.api_key.clone());
            state
                .client
                .chat(
                    &url,
                    &model,
                    system.as_deref(),
                    &prompt,
                    &images,
                    api_key.as_deref(),
                    timeout,
                )
                .await?
        }
    };

    Ok(salvage(&reply))
}

/// Framework-level rejections (wrong content type, body over the limit)
/// must come back as the envelope too, so the extractor result is taken
/// as-is and folded into the taxonomy here.
fn accept_multipart(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Multipart, GatewayError> {
    multipart.map_err(|e| GatewayError::Validation {
        details: Some(serde_json::Value::String(e.body_text())),
    })
}

pub async fn extract_info_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    let multipart = accept_multipart(multipart).map_err(|e| state.reporter.respond(e))?;
    run_pipeline(&state, multipart, &["image"], PromptKind::ExtractInfo)
        .await
        .map(Json)
        .map_err(|e| state.reporter.respond(e))
}

pub async fn face_similarity_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    let multipart = accept_multipart(multipart).map_err(|e| state.reporter.respond(e))?;
    run_pipeline(
        &state,
        multipart,
        &["image1", "image2"],
        PromptKind::FaceSimilarity,
    )
    .await
    .map(Json)
    .map_err(|e| state.reporter.respond(e))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/extract-info", post(extract_info_handler))
        .route("/face-similarity", post(face_similarity_handler))
        .route("/health", get(healthy))
}
