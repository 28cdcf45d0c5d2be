use std::time::Duration;

use async_trait::async_trait;
use garde::Validate;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};

use crate::config::{AppConfig, ConfigError};
use crate::error::TranslateError;
use crate::models::payload::ImagePayload;
use crate::models::translation::{ApiErrorBody, TranslationResult};

/// One network call per method against the translation service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Upload one image and wait for its translated counterpart.
    async fn translate(
        &self,
        payload: &ImagePayload,
        accelerated: bool,
    ) -> Result<TranslationResult, TranslateError>;

    /// Cheap liveness probe.
    async fn check_health(&self) -> Result<(), TranslateError>;

    /// Delete temporary artifacts the service kept for `file_id`.
    async fn cleanup(&self, file_id: &str) -> Result<(), TranslateError>;
}

/// reqwest-backed client for the translation service HTTP API.
pub struct HttpTransport {
    http: Client,
    base_url: Url,
    translate_timeout: Duration,
    health_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        // A trailing slash keeps `join` from dropping the last path segment.
        let mut base = config.service_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)
            .map_err(|e| ConfigError::ServiceUrl(format!("'{}': {e}", config.service_url)))?;

        let http = Client::builder()
            .user_agent(concat!("mangama-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            translate_timeout: config.translate_timeout(),
            health_timeout: config.health_timeout(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TranslateError> {
        self.base_url
            .join(path)
            .map_err(|e| TranslateError::Unknown(format!("invalid endpoint '{path}': {e}")))
    }

    /// Turn an image reference from a result into an absolute URL.
    ///
    /// The service returns paths such as `/static/{id}_translated.png`, relative to its origin.
    pub fn resolve_image_url(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return reference.to_string();
        }
        self.base_url
            .join(reference)
            .map(String::from)
            .unwrap_or_else(|_| reference.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn translate(
        &self,
        payload: &ImagePayload,
        accelerated: bool,
    ) -> Result<TranslationResult, TranslateError> {
        let url = self.endpoint("translate")?;

        let part = Part::bytes(payload.bytes.clone())
            .file_name(payload.file_name.clone())
            .mime_str(&payload.content_type)
            .map_err(|e| TranslateError::InvalidPayload(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("use_gpu", accelerated.to_string());

        tracing::debug!(
            url = %url,
            file = %payload.file_name,
            size_bytes = payload.len(),
            accelerated,
            "Uploading image for translation"
        );

        let response = self
            .http
            .post(url)
            .multipart(form)
            .timeout(self.translate_timeout)
            .send()
            .await
            .map_err(|e| classify(e, self.translate_timeout))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, self.translate_timeout))?;
        let result: TranslationResult = serde_json::from_slice(&body)
            .map_err(|e| TranslateError::ProtocolViolation(e.to_string()))?;
        result
            .validate()
            .map_err(|report| TranslateError::ProtocolViolation(report.to_string()))?;

        Ok(result)
    }

    async fn check_health(&self) -> Result<(), TranslateError> {
        let url = self.endpoint("health")?;
        let response = self
            .http
            .get(url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| classify(e, self.health_timeout))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn cleanup(&self, file_id: &str) -> Result<(), TranslateError> {
        let url = self.endpoint(&format!("cleanup/{file_id}"))?;
        let response = self
            .http
            .delete(url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| classify(e, self.health_timeout))?;

        if response.status().is_success() {
            tracing::debug!(file_id, "Cleaned up service artifacts");
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }
}

/// Classify a transport-level reqwest failure. `limit` is the timeout that applied to the call.
///
/// Bodies are read as raw bytes, so a body or decode error means the connection
/// broke mid-response; malformed JSON is classified after the read.
fn classify(err: reqwest::Error, limit: Duration) -> TranslateError {
    if err.is_timeout() {
        TranslateError::Timeout(limit)
    } else if err.is_connect() || err.is_request() || err.is_body() || err.is_decode() {
        TranslateError::Connectivity(err.to_string())
    } else {
        TranslateError::Unknown(err.to_string())
    }
}

/// Build a classified error from a non-2xx response, preferring the service's `detail`.
async fn error_from_response(response: Response) -> TranslateError {
    let status = response.status();
    let fallback = if status.is_client_error() {
        "Translation failed".to_string()
    } else {
        status
            .canonical_reason()
            .unwrap_or("Translation failed")
            .to_string()
    };

    let detail = match response.text().await {
        Ok(text) => serde_json::from_str::<ApiErrorBody>(&text)
            .map(|body| body.detail)
            .ok()
            .filter(|detail| !detail.is_empty())
            .unwrap_or(fallback),
        Err(_) => fallback,
    };

    TranslateError::from_status(status.as_u16(), detail)
}
