//! Synthesizer backed by an OpenAI-compatible chat completions endpoint.
//!
//! Selected when `AITS_MODEL_API_KEY` is set; otherwise the rule catalogue
//! in [`RuleSynthesizer`] is used.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::cluster::{Draft, RuleSynthesizer, Synthesizer};
use crate::models::{Sentiment, Solution};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_SOLUTIONS: usize = 3;

#[derive(Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

pub fn select_synthesizer(model: Option<&ModelConfig>) -> Arc<dyn Synthesizer> {
    match model {
        Some(config) => {
            info!("Using model synthesizer {} at {}", config.model, config.base_url);
            Arc::new(ModelSynthesizer::new(config.clone()))
        }
        None => {
            info!("AITS_MODEL_API_KEY not set, using rule-based synthesizer");
            Arc::new(RuleSynthesizer)
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

pub struct ModelSynthesizer {
    config: ModelConfig,
    client: reqwest::Client,
}

impl ModelSynthesizer {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn complete(&self, prompt: String, temperature: f32, max_tokens: u32) -> anyhow::Result<String> {
        let body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("model request to {url} failed"))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!("model endpoint returned {status}: {text}"));
        }
        debug!("Model response: {text}");

        let parsed: ChatResponse =
            serde_json::from_str(&text).context("unreadable model response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| anyhow!("model returned no content"))
    }
}

#[async_trait]
impl Synthesizer for ModelSynthesizer {
    async fn problem_statement(&self, draft: &Draft) -> anyhow::Result<String> {
        self.complete(problem_prompt(draft), 0.2, 256).await
    }

    async fn solutions(
        &self,
        draft: &Draft,
        problem_statement: &str,
    ) -> anyhow::Result<Vec<Solution>> {
        let raw = self
            .complete(solutions_prompt(problem_statement), 0.4, 1024)
            .await?;
        parse_solutions(&raw, draft.sentiment)
    }
}

fn problem_prompt(draft: &Draft) -> String {
    let comments: Vec<String> = draft.texts.iter().map(|text| format!("- {text}")).collect();
    format!(
        "Student feedback on \"{}\":\n{}\n\nWrite a concise problem statement describing the main issue.\nProblem statement:",
        draft.theme,
        comments.join("\n")
    )
}

fn solutions_prompt(problem_statement: &str) -> String {
    format!(
        "Problem: {problem_statement}\n\n\
         Suggest {MAX_SOLUTIONS} concrete, actionable solutions, most impactful first.\n\
         Return only a JSON list of objects with keys \"solution_title\", \"steps\" (list of strings), \
         \"total_estimated_cost\" (Low/Medium/High plus a rough amount) and \"required_tools\"."
    )
}

/// Reads the model's solution list, tolerating a markdown code fence and
/// legacy field names. Every solution takes the group's tone.
fn parse_solutions(raw: &str, sentiment: Sentiment) -> anyhow::Result<Vec<Solution>> {
    let body = raw.trim();
    let body = body
        .strip_prefix("```json")
        .or_else(|| body.strip_prefix("```"))
        .unwrap_or(body);
    let body = body.strip_suffix("```").unwrap_or(body).trim();

    let mut solutions: Vec<Solution> =
        serde_json::from_str(body).context("model solutions are not a JSON list")?;
    solutions.truncate(MAX_SOLUTIONS);
    for solution in &mut solutions {
        solution.sentiment = sentiment;
    }
    Ok(solutions)
}
