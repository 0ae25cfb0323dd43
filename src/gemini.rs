use crate::config::Settings;
use crate::media::{self, PNG_MIME};
use crate::models::{DesignConfiguration, DesignStyle, GearAnalysis};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, error, debug};

/// Both outbound requests label the photo this way regardless of its real format.
const UPLOAD_MIME: &str = "image/jpeg";

const ANALYSIS_INSTRUCTION: &str = "Analyze this protective gear. Identify its category, functional regions, and key design elements. Provide a JSON response with category name, detailed analysis text, and normalized coordinates (0-1) for keypoints like joints, straps, and protective padding.";

pub const FUTURISTIC_FOCUS: &str = "geometric facets and sharp lines";
pub const ERGONOMIC_FOCUS: &str = "ergonomic curves and high-performance textiles";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("status={status} body={body}")]
    Status { status: reqwest::StatusCode, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no image data in response")]
    NoImage,
}

impl GeminiError {
    /// True when the service answered but the answer was unusable.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::NoImage)
    }
}

/// The two remote operations the studio depends on.
#[async_trait]
pub trait DesignService: Send + Sync {
    async fn analyze(&self, image: &[u8]) -> Result<GearAnalysis, GeminiError>;

    /// Returns a `data:image/png;base64,...` URI.
    async fn render_variant(&self, image: &[u8], config: &DesignConfiguration) -> Result<String, GeminiError>;
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn loggable(value: &Value) -> String {
    let mut copy = value.clone();
    truncate_base64_in_json(&mut copy);
    serde_json::to_string_pretty(&copy).unwrap_or_default()
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    analysis_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            analysis_model: crate::config::DEFAULT_ANALYSIS_MODEL.into(),
            image_model: crate::config::DEFAULT_IMAGE_MODEL.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut client = Self::new(settings.api_key.clone(), settings.api_base.clone());
        client.analysis_model = settings.analysis_model.clone();
        client.image_model = settings.image_model.clone();
        client
    }

    async fn perform_api_call(&self, model: &str, request_body: &Value) -> Result<GeminiResponse, GeminiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        info!("🔗 Making request to: {}", url);
        debug!("📤 Request body: {}", loggable(request_body));

        let response = self.client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request_body)
            .send()
            .await?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ API Error response: {}", body);
            return Err(GeminiError::Status { status, body });
        }

        let response_text = response.text().await?;
        let parsed: Value = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Malformed(format!("parse error: {}", e)))?;
        debug!("📥 Raw Gemini API response: {}", loggable(&parsed));

        serde_json::from_value(parsed)
            .map_err(|e| GeminiError::Malformed(format!("unexpected response shape: {}", e)))
    }

    pub async fn analyze_gear_image(&self, image: &[u8]) -> Result<GearAnalysis, GeminiError> {
        info!("🔍 Analyzing gear image ({} bytes) with {}", image.len(), self.analysis_model);
        let request_body = json!({
            "contents": [{
                "parts": [inline_image(image), {"text": ANALYSIS_INSTRUCTION}]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": analysis_schema()
            }
        });

        let parsed = self.perform_api_call(&self.analysis_model, &request_body).await?;
        let text = extract_first_text(&parsed)
            .ok_or_else(|| GeminiError::Malformed("no text part in analysis response".into()))?;
        let analysis: GearAnalysis = serde_json::from_str(text)
            .map_err(|e| GeminiError::Malformed(format!("analysis JSON: {}", e)))?;

        info!("✅ Analysis returned category '{}' with {} keypoints", analysis.category, analysis.keypoints.len());
        Ok(analysis)
    }

    pub async fn generate_design_variant(&self, image: &[u8], config: &DesignConfiguration) -> Result<String, GeminiError> {
        let prompt = build_design_prompt(config);
        info!("🎯 Generating variant with prompt (truncated): {}", prompt.chars().take(100).collect::<String>());

        let request_body = json!({
            "contents": [{
                "parts": [inline_image(image), {"text": prompt}]
            }]
        });

        let parsed = self.perform_api_call(&self.image_model, &request_body).await?;
        let inline = extract_first_image(&parsed).ok_or(GeminiError::NoImage)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(inline.data.trim())
            .map_err(|e| GeminiError::Malformed(format!("image base64: {}", e)))?;
        let png = media::ensure_png(bytes, &inline.mime_type)
            .map_err(|e| GeminiError::Malformed(e.to_string()))?;

        info!("🖼️ Extracted {} image ({} bytes as PNG)", inline.mime_type, png.len());
        Ok(media::encode_data_uri(PNG_MIME, &png))
    }
}

#[async_trait]
impl DesignService for GeminiClient {
    async fn analyze(&self, image: &[u8]) -> Result<GearAnalysis, GeminiError> {
        self.analyze_gear_image(image).await
    }

    async fn render_variant(&self, image: &[u8], config: &DesignConfiguration) -> Result<String, GeminiError> {
        self.generate_design_variant(image, config).await
    }
}

fn inline_image(image: &[u8]) -> Value {
    json!({
        "inlineData": {
            "data": base64::engine::general_purpose::STANDARD.encode(image),
            "mimeType": UPLOAD_MIME
        }
    })
}

fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "category": {"type": "STRING"},
            "analysis": {"type": "STRING"},
            "keypoints": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "x": {"type": "NUMBER"},
                        "y": {"type": "NUMBER"},
                        "label": {"type": "STRING"},
                        "type": {"type": "STRING"}
                    }
                }
            }
        }
    })
}

pub fn build_design_prompt(config: &DesignConfiguration) -> String {
    let focus = if config.style == DesignStyle::Futuristic { FUTURISTIC_FOCUS } else { ERGONOMIC_FOCUS };
    [
        format!("Professional product design update for this {}.", config.category.label()),
        format!("Style: {}.", config.style.label()),
        format!("Materials: Primary material should be {}.", config.material.label()),
        format!("Colors: Main color {}, accents in {}.", config.main_color, config.accent_color),
        format!("Setting: Place the product in a {} background.", config.scenario.label()),
        format!("Requirements: Maintain the functional structure and proportions of the original gear. Enhance the aesthetic with professional lighting, crisp textures, and clean background. Focus on {focus}."),
    ]
    .join("\n")
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData
    },
    Text { text: String },
    #[allow(dead_code)]
    Other(Value)
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType", default = "default_inline_mime")]
    mime_type: String,
}

fn default_inline_mime() -> String { PNG_MIME.to_string() }

// Only the first candidate is considered; later ones are alternatives, not continuations.
fn first_candidate_parts(resp: &GeminiResponse) -> &[Part] {
    resp.candidates.first().map(|c| c.content.parts.as_slice()).unwrap_or_default()
}

fn extract_first_image(resp: &GeminiResponse) -> Option<&InlineData> {
    let found = first_candidate_parts(resp).iter().find_map(|p| match p {
        Part::Inline { inline_data } => Some(inline_data),
        _ => None,
    });
    if found.is_none() {
        info!("⚠️ No inline image data found in response structure");
    }
    found
}

fn extract_first_text(resp: &GeminiResponse) -> Option<&str> {
    first_candidate_parts(resp).iter().find_map(|p| match p {
        Part::Text { text } => Some(text.as_str()),
        _ => None,
    })
}
