//! OpenAI-compatible `chat/completions` client.
//!
//! Requests carry the turn's prompt plus every registered tool rendered in
//! function-calling form; `tool_choice` is left to the model.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use chatrelay_core::config::LlmConfig;
use chatrelay_core::domain::message::ChatMessage;
use chatrelay_core::domain::tool::ToolDescriptor;

use crate::llm::{
    Completion, CompletionChoice, CompletionClient, CompletionError, TokenUsage, ToolCallRequest,
};

pub struct OpenAiCompletionClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiCompletionClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|error| CompletionError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn map_transport(&self, error: reqwest::Error) -> CompletionError {
        if error.is_timeout() {
            CompletionError::Timeout(self.timeout)
        } else {
            CompletionError::Transport(error.to_string())
        }
    }
}

pub fn build_request(
    model: &str,
    max_tokens: u32,
    messages: &[ChatMessage],
    tools: &[ToolDescriptor],
) -> Value {
    let messages: Vec<Value> = messages
        .iter()
        .map(|message| json!({"role": message.role.as_str(), "content": message.content}))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": max_tokens,
    });

    if !tools.is_empty() {
        body["tools"] = Value::Array(tools.iter().map(ToolDescriptor::to_function_json).collect());
        body["tool_choice"] = json!("auto");
    }

    body
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

pub fn parse_completion(body: &str) -> Result<Completion, CompletionError> {
    let wire: WireResponse =
        serde_json::from_str(body).map_err(|error| CompletionError::Decode(error.to_string()))?;

    let choices = wire
        .choices
        .into_iter()
        .map(|choice| CompletionChoice {
            text: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolCallRequest {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
        })
        .collect();

    let usage = wire.usage.map(|usage| TokenUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    });

    Ok(Completion { choices, usage })
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<Completion, CompletionError> {
        let body = build_request(&self.model, self.max_tokens, messages, tools);

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| self.map_transport(error))?;

        let status = response.status();
        let text = response.text().await.map_err(|error| self.map_transport(error))?;

        match status.as_u16() {
            200..=299 => {}
            401 => return Err(CompletionError::Unauthorized),
            code => return Err(CompletionError::Status { status: code, body: text }),
        }

        let completion = parse_completion(&text)?;
        debug!(
            event_name = "llm.completion.received",
            model = %self.model,
            choices = completion.choices.len(),
            total_tokens = completion.usage.map(|usage| usage.total_tokens).unwrap_or_default(),
            "completion received"
        );
        Ok(completion)
    }
}
