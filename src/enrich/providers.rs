use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use super::{Provider, SYSTEM_PROMPT};

const USER_AGENT: &str = "feed-relay/0.1";

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(30))
        .build()
        .context("building enrichment http client")
}

/// Google Gemini `generateContent` with every safety category at `BLOCK_NONE`.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub const DEFAULT_MODEL: &'static str = "gemini-2.0-flash-exp";

    pub fn new(api_key: String, model_override: Option<&str>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
            model: model_override.unwrap_or(Self::DEFAULT_MODEL).to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiReq<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    safety_settings: Vec<GeminiSafety>,
    generation_config: GeminiGenConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPartOut<'a>>,
}

#[derive(Serialize)]
struct GeminiPartOut<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiSafety {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResp {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPartIn>,
}

#[derive(Deserialize)]
struct GeminiPartIn {
    #[serde(default)]
    text: String,
}

impl Provider for GeminiProvider {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let safety = [
                "HARM_CATEGORY_HATE_SPEECH",
                "HARM_CATEGORY_SEXUALLY_EXPLICIT",
                "HARM_CATEGORY_HARASSMENT",
                "HARM_CATEGORY_DANGEROUS_CONTENT",
            ]
            .into_iter()
            .map(|category| GeminiSafety {
                category,
                threshold: "BLOCK_NONE",
            })
            .collect();

            let req = GeminiReq {
                system_instruction: GeminiContent {
                    role: None,
                    parts: vec![GeminiPartOut {
                        text: SYSTEM_PROMPT,
                    }],
                },
                contents: vec![GeminiContent {
                    role: Some("user"),
                    parts: vec![GeminiPartOut { text: prompt }],
                }],
                safety_settings: safety,
                generation_config: GeminiGenConfig {
                    temperature: 0.3,
                    max_output_tokens: 200,
                },
            };

            let url = format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            );
            let body: GeminiResp = self
                .http
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&req)
                .send()
                .await
                .context("gemini post")?
                .error_for_status()
                .context("gemini non-2xx")?
                .json()
                .await
                .context("gemini response json")?;

            let text: String = body
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|c| c.parts.into_iter().map(|p| p.text).collect())
                .unwrap_or_default();
            if text.trim().is_empty() {
                return Err(anyhow!("gemini returned no text"));
            }
            Ok(text)
        })
    }
    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// OpenAI provider (Chat Completions API).
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    pub fn new(api_key: String, model_override: Option<&str>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
            model: model_override.unwrap_or(Self::DEFAULT_MODEL).to_string(),
        })
    }
}

impl Provider for OpenAiProvider {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: Option<String>,
            }

            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    Msg {
                        role: "user",
                        content: prompt,
                    },
                ],
                temperature: 0.3,
                max_tokens: 120,
            };

            let body: Resp = self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .context("openai post")?
                .error_for_status()
                .context("openai non-2xx")?
                .json()
                .await
                .context("openai response json")?;

            body.choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| anyhow!("openai returned no text"))
        })
    }
    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Deterministic provider for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl Provider for MockProvider {
    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}
