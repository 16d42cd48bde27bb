use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

/// Prompt sent with every image. The label layout must stay in sync with
/// [`parse_model_response`](crate::services::response_parser::parse_model_response).
pub const ANALYSIS_PROMPT: &str = concat!(
    "Analyze this image and provide:\n",
    "1. A detailed description of the image (2-4 sentences)\n",
    "2. Exactly 5 relevant keywords that describe the image content\n",
    "3. Any text visible in the image, as a comma-separated list, ",
    "or \"No text detected\" if there is no text\n",
    "\n",
    "Format your response exactly as follows:\n",
    "DESCRIPTION: [your description here]\n",
    "KEYWORDS: [keyword1, keyword2, keyword3, keyword4, keyword5]\n",
    "DETECTED_TEXT: [text1, text2, ...] or No text detected"
);

const MAX_TOKENS: u32 = 512;

/// Hosted vision-language model.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Run the analysis prompt against an image and return the raw completion.
    async fn describe(&self, image: &[u8], content_type: &str) -> Result<String, ModelError>;
}

/// Client for a Cloudflare Workers AI image-to-text model.
pub struct WorkersAiClient {
    http: Client,
    account_id: String,
    api_token: String,
    model: String,
}

#[derive(Deserialize)]
struct RunResponse {
    #[serde(default)]
    success: Option<bool>,
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Deserialize)]
struct RunResult {
    #[serde(alias = "response")]
    description: String,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

impl WorkersAiClient {
    pub fn new(account_id: &str, api_token: &str, model: &str) -> Self {
        Self {
            http: Client::new(),
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
            model: model.to_string(),
        }
    }

    fn run_url(&self) -> String {
        format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/{}",
            self.account_id, self.model
        )
    }
}

#[async_trait]
impl VisionModel for WorkersAiClient {
    async fn describe(&self, image: &[u8], content_type: &str) -> Result<String, ModelError> {
        tracing::debug!(
            model = %self.model,
            content_type,
            bytes = image.len(),
            "Invoking vision model"
        );

        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image),
            "prompt": ANALYSIS_PROMPT,
            "max_tokens": MAX_TOKENS
        });

        let response = self
            .http
            .post(self.run_url())
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let run: RunResponse = response.json().await?;
        match (run.success, run.result) {
            (Some(false), _) | (_, None) => Err(ModelError::Rejected(
                run.errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
            (_, Some(result)) => Ok(result.description),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model rejected the request: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_all_three_labels() {
        for label in ["DESCRIPTION:", "KEYWORDS:", "DETECTED_TEXT:", "No text detected"] {
            assert!(ANALYSIS_PROMPT.contains(label), "missing {label}");
        }
    }

    #[test]
    fn run_response_accepts_either_field_name() {
        let llava: RunResponse =
            serde_json::from_str(r#"{"success":true,"result":{"description":"hi"}}"#).unwrap();
        assert_eq!(llava.result.unwrap().description, "hi");

        let chat: RunResponse =
            serde_json::from_str(r#"{"result":{"response":"yo"},"errors":[]}"#).unwrap();
        assert_eq!(chat.result.unwrap().description, "yo");
    }
}
