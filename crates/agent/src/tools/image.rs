use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use chatrelay_core::config::{ImageConfig, LlmConfig, IMAGE_PROBE_TIMEOUT_SECS};
use chatrelay_core::domain::schema::{ParameterSchema, ToolArgs};

use super::Tool;

pub const IMAGE_TOOL_NAME: &str = "generate_image";

const IMAGE_STYLES: [&str; 3] = ["realistic", "cartoon", "artistic"];
const IMAGE_SIZES: [&str; 3] = ["256x256", "512x512", "1024x1024"];
const PROBE_TIMEOUT: Duration = Duration::from_secs(IMAGE_PROBE_TIMEOUT_SECS);

#[derive(Debug, Deserialize)]
struct ImageGenerationParams {
    prompt: String,
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

/// Payload returned by a successful `generate_image` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageGenerationResult {
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
    revised_prompt: Option<String>,
}

/// Calls an OpenAI-compatible `/images/generations` endpoint.
pub struct ImageGenerationTool {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    default_size: String,
}

impl ImageGenerationTool {
    pub fn from_config(image: &ImageConfig, llm: &LlmConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(image.timeout()).build()?;
        Ok(Self {
            client,
            api_key: image.effective_api_key(llm),
            base_url: image.base_url.trim_end_matches('/').to_string(),
            model: image.model.clone(),
            default_size: image.default_size.clone(),
        })
    }

    fn generations_url(&self) -> String {
        format!("{}/images/generations", self.base_url)
    }

    /// Best effort; a failed probe is only worth a warning.
    async fn probe(&self, url: &str) -> Result<()> {
        let response = self.client.head(url).timeout(PROBE_TIMEOUT).send().await?;
        if response.status() != StatusCode::OK {
            bail!("image URL returned status {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl Tool for ImageGenerationTool {
    fn name(&self) -> &str {
        IMAGE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Generate an image based on text prompt"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .property(
                "prompt",
                ParameterSchema::string().describe("Text description of the image to generate"),
            )
            .property(
                "style",
                ParameterSchema::enumeration(IMAGE_STYLES)
                    .describe("Style of the generated image"),
            )
            .property(
                "size",
                ParameterSchema::enumeration(IMAGE_SIZES).describe("Size of the generated image"),
            )
            .require("prompt")
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value> {
        let params: ImageGenerationParams = args.deserialize()?;
        let prompt = params.prompt.trim();
        if prompt.is_empty() {
            bail!("prompt is required");
        }

        let size = params.size.unwrap_or_else(|| self.default_size.clone());
        let prompt = match params.style.as_deref() {
            Some(style) => format!("{prompt}, in a {style} style"),
            None => prompt.to_string(),
        };

        info!(
            event_name = "tool.image.requested",
            model = %self.model,
            size = %size,
            style = ?params.style,
            "generating image"
        );

        let started = Instant::now();
        let response = self
            .client
            .post(self.generations_url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&ImageRequest {
                model: &self.model,
                prompt: &prompt,
                n: 1,
                size: &size,
                response_format: "url",
            })
            .send()
            .await
            .context("image generation request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("image generation failed with status {status}: {body}");
        }

        let payload: ImageResponse =
            response.json().await.context("image generation response was not valid JSON")?;
        let first = payload.data.into_iter().next().ok_or_else(|| anyhow!("no image generated"))?;
        let image_url = first
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow!("image response carried no URL"))?;

        let result = ImageGenerationResult { image_url, revised_prompt: first.revised_prompt };
        info!(
            event_name = "tool.image.generated",
            duration_ms = started.elapsed().as_millis() as u64,
            image_url = %result.image_url,
            "image generated"
        );

        if let Err(error) = self.probe(&result.image_url).await {
            warn!(
                event_name = "tool.image.probe_failed",
                image_url = %result.image_url,
                error = %error,
                "generated image URL did not answer a HEAD probe"
            );
        }

        Ok(serde_json::to_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use chatrelay_core::config::AppConfig;
    use chatrelay_core::domain::schema::ToolArgs;

    use super::{ImageGenerationResult, ImageGenerationTool, IMAGE_TOOL_NAME};
    use crate::tools::Tool;

    fn tool_for(server: &MockServer) -> ImageGenerationTool {
        let mut config = AppConfig::default();
        config.llm.api_key = "sk-image-test".to_string().into();
        config.image.base_url = server.uri();
        ImageGenerationTool::from_config(&config.image, &config.llm).expect("client")
    }

    #[test]
    fn schema_requires_prompt_and_limits_enums() {
        let server_less = {
            let mut config = AppConfig::default();
            config.llm.api_key = "sk".to_string().into();
            ImageGenerationTool::from_config(&config.image, &config.llm).expect("client")
        };
        let descriptor = server_less.descriptor();
        let schema = descriptor.parameters.to_json_schema();

        assert_eq!(descriptor.name, IMAGE_TOOL_NAME);
        assert_eq!(schema["required"], json!(["prompt"]));
        assert_eq!(schema["properties"]["size"]["enum"], json!(["256x256", "512x512", "1024x1024"]));
        assert_eq!(schema["properties"]["style"]["enum"], json!(["realistic", "cartoon", "artistic"]));
    }

    #[tokio::test]
    async fn successful_generation_returns_url_and_revised_prompt() {
        let server = MockServer::start().await;
        let image_url = format!("{}/files/cat.png", server.uri());

        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(header("authorization", "Bearer sk-image-test"))
            .and(body_partial_json(json!({
                "prompt": "a cat, in a cartoon style",
                "size": "1024x1024",
                "n": 1,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"url": image_url, "revised_prompt": "a cheerful cartoon cat"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/files/cat.png"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let args = ToolArgs::default().with("prompt", "a cat").with("style", "cartoon");
        let value = tool_for(&server).execute(&args).await.expect("generate");
        let result: ImageGenerationResult = serde_json::from_value(value).expect("result shape");

        assert_eq!(result.image_url, image_url);
        assert_eq!(result.revised_prompt.as_deref(), Some("a cheerful cartoon cat"));
    }

    #[tokio::test]
    async fn failed_probe_does_not_fail_generation() {
        let server = MockServer::start().await;
        let image_url = format!("{}/files/gone.png", server.uri());

        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": [{"url": image_url}]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/files/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let args = ToolArgs::default().with("prompt", "a dog").with("size", "256x256");
        let value = tool_for(&server).execute(&args).await.expect("generate");
        assert_eq!(value, json!({"image_url": image_url}));
    }

    #[tokio::test]
    async fn upstream_error_status_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let args = ToolArgs::default().with("prompt", "a cat");
        let error = tool_for(&server).execute(&args).await.expect_err("should fail");
        assert!(error.to_string().contains("503"), "unexpected error: {error}");
    }

    #[tokio::test]
    async fn empty_data_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let args = ToolArgs::default().with("prompt", "a cat");
        let error = tool_for(&server).execute(&args).await.expect_err("should fail");
        assert_eq!(error.to_string(), "no image generated");
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected_before_any_request() {
        let server = MockServer::start().await;
        let args = ToolArgs::default().with("prompt", "   ");

        let error = tool_for(&server).execute(&args).await.expect_err("should fail");
        assert_eq!(error.to_string(), "prompt is required");
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
