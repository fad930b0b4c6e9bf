use axum::Json;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::config::ErrorConfig;

/// Everything a request can fail with. Handlers never return anything
/// else to the client; `ErrorReporter::respond` turns these into the
/// wire envelope.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request input")]
    Validation { details: Option<serde_json::Value> },

    #[error("image exceeds the maximum allowed size")]
    ImageTooLarge { size: usize, limit: usize },

    #[error("unsupported image format")]
    UnsupportedImageFormat,

    #[error("inference server failure: {details}")]
    Ollama { details: String },

    #[error("configuration error: {details}")]
    Config { details: String },

    #[error("internal error: {details}")]
    Internal { details: String },
}

impl GatewayError {
    /// Stable symbolic code, part of the public contract.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation { .. } => "ValidationError",
            GatewayError::ImageTooLarge { .. } => "ImageTooLarge",
            GatewayError::UnsupportedImageFormat => "UnsupportedImageFormat",
            GatewayError::Ollama { .. } => "OllamaError",
            GatewayError::Config { .. } => "ConfigError",
            GatewayError::Internal { .. } => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
            GatewayError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::UnsupportedImageFormat => StatusCode::BAD_REQUEST,
            GatewayError::Ollama { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-input failures log at warn, everything else at error.
    fn is_client_fault(&self) -> bool {
        matches!(
            self,
            GatewayError::Validation { .. }
                | GatewayError::ImageTooLarge { .. }
                | GatewayError::UnsupportedImageFormat
        )
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            GatewayError::Validation { details } => details.clone(),
            GatewayError::ImageTooLarge { size, limit } => Some(serde_json::json!({
                "size": size,
                "limit": limit,
            })),
            GatewayError::UnsupportedImageFormat => None,
            GatewayError::Ollama { details }
            | GatewayError::Config { details }
            | GatewayError::Internal { details } => {
                Some(serde_json::Value::String(details.clone()))
            }
        }
    }
}

/// Wire shape of every failed request. Field names are a compatibility
/// contract and must not change.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub code: u16,
    #[serde(rename = "type")]
    pub kind: String,
    pub details: Option<serde_json::Value>,
    pub trace_id: String,
}

pub type ErrorResponse = (StatusCode, Json<ErrorEnvelope>);

/// Maps `GatewayError`s to logged, localized error responses. Built once
/// at startup from `error_config.json` and shared read-only.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    config: ErrorConfig,
}

impl ErrorReporter {
    pub fn new(config: ErrorConfig) -> Self {
        Self { config }
    }

    /// Localized message for a code: configured language first, then the
    /// default locale, then the raw error text.
    fn message(&self, err: &GatewayError) -> String {
        let table = self.config.messages.get(err.code());
        table
            .and_then(|m| m.get(&self.config.language))
            .or_else(|| table.and_then(|m| m.get(ErrorConfig::DEFAULT_LANGUAGE)))
            .cloned()
            .unwrap_or_else(|| err.to_string())
    }

    /// Last line of defense: logs the failure and produces the uniform
    /// envelope. Never fails itself.
    pub fn respond(&self, err: GatewayError) -> ErrorResponse {
        let trace_id = uuid::Uuid::new_v4().to_string();
        let status = err.status();
        let code = err.code();

        if self.config.log_errors {
            if err.is_client_fault() {
                tracing::warn!(%trace_id, code, "{err}");
            } else {
                tracing::error!(%trace_id, code, "{err}");
            }
        }

        // Structured client-fault details (what was wrong with the
        // upload) are part of the contract; internal and downstream
        // detail strings only leak when traces are enabled.
        let details = if err.is_client_fault() || self.config.show_trace {
            err.details()
        } else {
            None
        };

        let envelope = ErrorEnvelope {
            error: self.message(&err),
            code: status.as_u16(),
            kind: code.to_string(),
            details,
            trace_id,
        };

        (status, Json(envelope))
    }
}
