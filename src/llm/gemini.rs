//! Google Gemini client for the `generateContent` REST endpoint

use super::provider::LlmProvider;
use crate::config::LlmConfig;
use crate::error::{Result, SpeakSqlError};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How much of an error body is echoed back in messages
const ERROR_BODY_LIMIT: usize = 200;

/// Gemini API client
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_base: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback", default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason", default)]
    block_reason: Option<String>,
}

impl GeminiClient {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::build(
            crate::config::DEFAULT_API_BASE.to_string(),
            model.into(),
            api_key.into(),
            None,
            Duration::from_secs(60),
        )
    }

    /// Create a client from configuration, reading the API key from the
    /// configured environment variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| SpeakSqlError::MissingApiKey(config.api_key_env.clone()))?;

        Self::build(
            config.api_base.clone(),
            config.model.clone(),
            api_key,
            config.temperature,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn build(
        api_base: String,
        model: String,
        api_key: String,
        temperature: Option<f32>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            api_key,
            temperature,
            client,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    fn request_body<'a>(&self, instructions: &'a str, question: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: instructions }, Part { text: question }],
            }],
            generation_config: self.temperature.map(|temperature| GenerationConfig { temperature }),
        }
    }
}

/// Pull the reply text out of a decoded response
fn reply_text(response: GenerateResponse) -> Result<String> {
    let candidate = match response.candidates.into_iter().next() {
        Some(candidate) => candidate,
        None => {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map(|r| format!("prompt blocked ({})", r))
                .unwrap_or_else(|| "no candidates in response".to_string());
            return Err(SpeakSqlError::Llm(reason));
        }
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(SpeakSqlError::Llm(format!(
            "empty response (finish reason: {})",
            reason
        )));
    }
    Ok(text)
}

#[async_trait]
impl LlmProvider for GeminiClient {
    async fn generate(&self, instructions: &str, question: &str) -> Result<String> {
        let url = self.endpoint();
        debug!("POST {}", url);
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(instructions, question))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(SpeakSqlError::Llm(format!("HTTP {}: {}", status, excerpt)));
        }

        let decoded: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SpeakSqlError::Llm(format!("could not decode response: {}", e)))?;

        let text = reply_text(decoded)?;
        info!(
            "{} replied with {} characters in {}ms",
            self.model,
            text.len(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn client() -> GeminiClient {
        GeminiClient::new("gemini-1.5-flash", "test-key").unwrap()
    }

    /// Answer a single HTTP request with a canned response. The task returns
    /// the raw request it received.
    async fn serve_once(status: &'static str, body: String) -> (GeminiClient, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });

        let client = GeminiClient::build(
            base,
            "gemini-test".to_string(),
            "secret".to_string(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        (client, server)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut received = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&received);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if received.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&received).into_owned()
    }

    #[tokio::test]
    async fn test_generate_returns_joined_reply() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "SELECT name "}, {"text": "FROM df;"}], "role": "model"},
                "finishReason": "STOP"
            }]
        })
        .to_string();
        let (client, server) = serve_once("200 OK", body).await;

        let reply = client.generate("instructions", "who is there?").await.unwrap();
        assert_eq!(reply, "SELECT name FROM df;");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /models/gemini-test:generateContent HTTP/1.1"));
        assert!(request.to_lowercase().contains("x-goog-api-key: secret"));
        assert!(request.contains("who is there?"));
    }

    #[tokio::test]
    async fn test_generate_reports_http_errors_with_excerpt() {
        let (client, server) = serve_once("500 Internal Server Error", "x".repeat(1024)).await;

        let err = client.generate("instructions", "question").await.unwrap_err();
        server.await.unwrap();
        match err {
            SpeakSqlError::Llm(message) => {
                assert!(message.starts_with("HTTP 500"));
                assert!(message.ends_with(&"x".repeat(ERROR_BODY_LIMIT)));
                assert!(!message.contains(&"x".repeat(ERROR_BODY_LIMIT + 1)));
            }
            other => panic!("expected an LLM error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_rejects_malformed_json() {
        let (client, server) = serve_once("200 OK", "{not json".to_string()).await;

        let err = client.generate("instructions", "question").await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, SpeakSqlError::Llm(ref message) if message.contains("could not decode response")));
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            client().endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn test_request_body_has_two_parts() {
        let client = client();
        let body = serde_json::to_value(client.request_body("instructions", "how many rows?")).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [{"text": "instructions"}, {"text": "how many rows?"}]
                }]
            })
        );

        let client = client.with_temperature(0.0);
        let body = serde_json::to_value(client.request_body("a", "b")).unwrap();
        assert_eq!(body["generationConfig"]["temperature"], json!(0.0));
    }

    #[test]
    fn test_reply_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"text": "SELECT COUNT(*) "}, {"text": "FROM df;"}], "role": "model"},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(reply_text(response).unwrap(), "SELECT COUNT(*) FROM df;");
    }

    #[test]
    fn test_blocked_prompt() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let err = reply_text(response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_empty_candidate() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "MAX_TOKENS"}]
        }))
        .unwrap();
        let err = reply_text(response).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn test_missing_api_key() {
        let config = LlmConfig {
            api_key_env: "SPEAKSQL_TEST_UNSET_KEY".to_string(),
            ..LlmConfig::default()
        };
        let err = GeminiClient::from_config(&config).unwrap_err();
        assert!(matches!(err, SpeakSqlError::MissingApiKey(ref name) if name == "SPEAKSQL_TEST_UNSET_KEY"));
    }
}
