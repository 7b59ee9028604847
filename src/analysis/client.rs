use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

use super::prompt::{build_prompt, strip_stats_recap};
use super::AnalysisPort;
use crate::stats::StatsRecord;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_TOKENS: u32 = 300;
const TEMPERATURE: f32 = 0.7;
const RETRY_PAUSE: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Analysis generator backed by the OpenAI chat-completions API.
pub struct OpenAiAnalyzer {
    api_key: String,
    model: String,
    endpoint: String,
    max_attempts: u32,
    client: reqwest::blocking::Client,
}

impl OpenAiAnalyzer {
    pub fn new(api_key: &str, model: &str, timeout: Duration, max_attempts: u32) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build analysis HTTP client")?;
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: CHAT_COMPLETIONS_URL.to_string(),
            max_attempts: max_attempts.max(1),
            client,
        })
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .context("Chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("Chat completion returned {}: {}", status, body.trim()));
        }

        let parsed: ChatResponse = response
            .json()
            .context("Invalid chat completion response")?;
        extract_reply(parsed)
    }
}

impl AnalysisPort for OpenAiAnalyzer {
    fn generate(&self, stats: &StatsRecord, display_name: &str) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(anyhow!("No analysis API key configured"));
        }
        let prompt = build_prompt(stats, display_name);
        let reply = with_retries(self.max_attempts, RETRY_PAUSE, |attempt| {
            log::debug!("Analysis for '{}', attempt {}", display_name, attempt);
            self.complete(&prompt)
        })?;
        Ok(strip_stats_recap(&reply))
    }
}

fn extract_reply(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| anyhow!("Chat completion returned no content"))
}

/// Calls `op` up to `max_attempts` times, sleeping `pause` between failures.
/// Returns the last error when every attempt fails.
fn with_retries<T, F>(max_attempts: u32, pause: Duration, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => {
                return Err(e.context(format!("Analysis failed after {} attempt(s)", attempt)));
            }
            Err(e) => {
                log::warn!("Analysis attempt {} failed: {}", attempt, e);
                thread::sleep(pause);
                attempt += 1;
            }
        }
    }
}
