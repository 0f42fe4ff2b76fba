use std::time::Duration;

use axum::{
    Extension, Form, Json,
    extract::{State, rejection::FormRejection},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use reqwest::header;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use corkboard_types::api::{GenerateImageForm, GenerateImageResponse};
use corkboard_types::models::Identity;

use crate::auth::AppState;
use crate::error::{BoardError, JsonError};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com";
pub const DEFAULT_MODEL: &str = "black-forest-labs/flux-1.1-pro";

#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub base_url: String,
    pub model: String,
    /// Without a token every request fails with `ExternalServiceFailure`.
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_token: None,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Client for the hosted text-to-image model. One request runs a prediction
/// (waiting for it to finish), then downloads the PNG it produced.
#[derive(Clone)]
pub struct ImageClient {
    http: reqwest::Client,
    config: ImageConfig,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl ImageClient {
    pub fn new(config: ImageConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_token.is_some()
    }

    /// Generate an image and return it as base64-encoded PNG.
    pub async fn generate(&self, req: &GenerateImageForm) -> Result<String, BoardError> {
        let prompt = req.prompt.trim();
        if prompt.is_empty() {
            return Err(BoardError::EmptyContent);
        }
        let token = self.config.api_token.as_deref().ok_or_else(|| {
            BoardError::ExternalServiceFailure("image generation is not configured".into())
        })?;

        let url = format!(
            "{}/v1/models/{}/predictions",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let body = json!({
            "input": {
                "prompt": prompt,
                "aspect_ratio": req.aspect_ratio,
                "width": req.width,
                "height": req.height,
                "output_format": "png",
                "safety_tolerance": 2,
                "prompt_upsampling": false,
            }
        });

        let res = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(external)?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            warn!("Prediction request failed with {}: {}", status, detail);
            return Err(BoardError::ExternalServiceFailure(format!(
                "provider returned {}",
                status
            )));
        }

        let prediction: Prediction = res.json().await.map_err(external)?;
        let output_url = output_url(&prediction)?;

        let image = self.http.get(&output_url).send().await.map_err(external)?;
        if !image.status().is_success() {
            return Err(BoardError::ExternalServiceFailure(format!(
                "image download returned {}",
                image.status()
            )));
        }
        let is_png = image
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_none_or(|ct| ct.starts_with("image/png") || ct.starts_with("application/octet-stream"));
        let bytes = image.bytes().await.map_err(external)?;
        if !is_png || !bytes.starts_with(PNG_SIGNATURE) {
            return Err(BoardError::ExternalServiceFailure(
                "provider did not return a PNG".into(),
            ));
        }

        Ok(B64.encode(&bytes))
    }
}

/// The prediction's image URL. Models return either a single URL or a list.
fn output_url(prediction: &Prediction) -> Result<String, BoardError> {
    if let Some(err) = prediction.error.as_ref().filter(|e| !e.is_null()) {
        let msg = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        return Err(BoardError::ExternalServiceFailure(msg));
    }

    match prediction.status.as_deref() {
        None | Some("succeeded") => {}
        Some(other) => {
            return Err(BoardError::ExternalServiceFailure(format!(
                "prediction {}",
                other
            )));
        }
    }

    let url = match &prediction.output {
        Some(Value::String(url)) => Some(url.clone()),
        Some(Value::Array(items)) => items.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    };
    url.ok_or_else(|| BoardError::ExternalServiceFailure("prediction returned no image".into()))
}

fn external(e: reqwest::Error) -> BoardError {
    BoardError::ExternalServiceFailure(e.to_string())
}

/// POST /generate_image returns `{"image_data": <base64 png>}`. Every
/// failure, including a malformed form, comes back as `{"error": ...}`.
pub async fn generate_image(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    form: Result<Form<GenerateImageForm>, FormRejection>,
) -> Result<Json<GenerateImageResponse>, JsonError> {
    let Form(form) = form.map_err(|rejection| BoardError::InvalidForm(rejection.body_text()))?;
    info!(
        "{} requested an image ({}x{}, {})",
        identity.username, form.width, form.height, form.aspect_ratio
    );

    let image_data = state.images.generate(&form).await?;
    Ok(Json(GenerateImageResponse { image_data }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(v: Value) -> Prediction {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn output_may_be_a_string_or_a_list() {
        let p = prediction(json!({"status": "succeeded", "output": "https://x/a.png"}));
        assert_eq!(output_url(&p).unwrap(), "https://x/a.png");

        let p = prediction(json!({"status": "succeeded", "output": ["https://x/b.png"]}));
        assert_eq!(output_url(&p).unwrap(), "https://x/b.png");
    }

    #[test]
    fn failed_or_unfinished_predictions_are_errors() {
        let p = prediction(json!({"status": "failed", "error": "NSFW content detected"}));
        match output_url(&p) {
            Err(BoardError::ExternalServiceFailure(msg)) => assert_eq!(msg, "NSFW content detected"),
            other => panic!("unexpected {:?}", other),
        }

        let p = prediction(json!({"status": "processing", "output": null, "error": null}));
        assert!(matches!(output_url(&p), Err(BoardError::ExternalServiceFailure(_))));
    }

    #[tokio::test]
    async fn unconfigured_client_fails_cleanly() {
        let client = ImageClient::new(ImageConfig::default()).unwrap();
        let form = GenerateImageForm {
            prompt: "a crab".to_string(),
            aspect_ratio: "1:1".to_string(),
            width: 512,
            height: 512,
        };

        assert!(!client.is_configured());
        assert!(matches!(
            client.generate(&form).await,
            Err(BoardError::ExternalServiceFailure(_))
        ));
    }
}
