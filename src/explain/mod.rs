//! Natural-language explanations from an OpenAI-compatible chat endpoint
//!
//! One non-streaming `POST {base_url}/chat/completions` per request. Failures
//! are returned as they are; nothing is retried.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ExplainConfig;
use crate::types::Step;

const SYSTEM_PROMPT: &str = "You are a patient programming tutor. Explain Python code to a \
beginner in plain language. Be concise and refer to concrete variable values when they are given.";

#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("explanation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid API key header: {0}")]
    InvalidApiKey(#[from] reqwest::header::InvalidHeaderValue),

    #[error("explanation service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("explanation service returned no content")]
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Explainer {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl Explainer {
    pub fn from_config(cfg: &ExplainConfig) -> Result<Self, ExplainError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
        })
    }

    /// Explain `source`, focusing on `step` when one is given
    pub async fn explain(&self, source: &str, step: Option<&Step>) -> Result<String, ExplainError> {
        let messages = build_messages(source, step);
        let url = format!("{}/chat/completions", self.base_url);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
        }

        debug!(model = %self.model, line_no = step.map(|s| s.line_no), "requesting explanation");
        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(&ChatRequest {
                model: &self.model,
                temperature: self.temperature,
                messages: &messages,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExplainError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.and_then(|m| m.content))
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(ExplainError::EmptyResponse)
    }
}

/// System prompt plus one user message carrying the program and the step
pub fn build_messages(source: &str, step: Option<&Step>) -> Vec<ChatMessage> {
    let mut prompt = format!("Here is a Python program:\n\n```python\n{}\n```\n", source.trim_end());
    match step {
        Some(step) => {
            let line = source
                .lines()
                .nth(step.line_no.saturating_sub(1))
                .map(str::trim)
                .unwrap_or("");
            prompt.push_str(&format!(
                "\nExplain what line {} (`{}`) just did.",
                step.line_no, line
            ));
            if step.locals.is_empty() {
                prompt.push_str(" No variables are defined at that point.");
            } else {
                prompt.push_str(" Right after it ran, the variables were:\n");
                for (name, value) in &step.locals {
                    prompt.push_str(&format!("- {} = {}\n", name, value));
                }
            }
        }
        None => prompt.push_str("\nExplain what this program does, step by step."),
    }

    vec![
        ChatMessage {
            role: Role::System,
            content: SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: Role::User,
            content: prompt,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// One-shot HTTP endpoint answering with `status_line` and `body`;
    /// the handle yields the raw request it received
    async fn mock_endpoint(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        request.len() >= header_end + 4 + length
    }

    fn explainer(base_url: String) -> Explainer {
        Explainer::from_config(&ExplainConfig {
            base_url,
            api_key: Some("test-key".to_string()),
            timeout_secs: 5,
            ..ExplainConfig::default()
        })
        .unwrap()
    }

    fn step(line_no: usize, locals: &[(&str, &str)]) -> Step {
        Step {
            line_no,
            locals: locals
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<IndexMap<_, _>>(),
        }
    }

    #[test]
    fn test_messages_without_step() {
        let messages = build_messages("print(1)\n", None);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].content.contains("```python\nprint(1)\n```"));
        assert!(messages[1].content.contains("step by step"));
    }

    #[test]
    fn test_messages_with_step_list_bindings() {
        let source = "x = 1\ny = x + 1\n";
        let messages = build_messages(source, Some(&step(2, &[("x", "1"), ("y", "2")])));
        let prompt = &messages[1].content;
        assert!(prompt.contains("line 2 (`y = x + 1`)"));
        assert!(prompt.contains("- x = 1\n- y = 2\n"));
    }

    #[tokio::test]
    async fn test_explain_returns_first_choice() {
        let (url, request) = mock_endpoint(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"  It prints one.  "}}]}"#,
        )
        .await;
        let text = explainer(url).explain("print(1)", None).await.unwrap();
        assert_eq!(text, "It prints one.");

        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /chat/completions"));
        assert!(raw.to_lowercase().contains("authorization: bearer test-key"));
        assert!(raw.contains("\"model\":\"gpt-4o-mini\""));
    }

    #[tokio::test]
    async fn test_explain_surfaces_http_errors() {
        let (url, _request) = mock_endpoint("401 Unauthorized", r#"{"error":"bad key"}"#).await;
        let err = explainer(url).explain("x = 1", None).await.unwrap_err();
        match err {
            ExplainError::Status { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unreachable_endpoint_is_an_http_error() {
        let explainer = explainer("http://127.0.0.1:9".to_string());
        let err = tokio_test::block_on(explainer.explain("x = 1", None)).unwrap_err();
        assert!(matches!(err, ExplainError::Http(_)));
        assert!(err.to_string().starts_with("explanation request failed"));
    }

    #[tokio::test]
    async fn test_explain_rejects_empty_choices() {
        let (url, _request) = mock_endpoint("200 OK", r#"{"choices":[]}"#).await;
        let err = explainer(url).explain("x = 1", None).await.unwrap_err();
        assert!(matches!(err, ExplainError::EmptyResponse));
    }
}
