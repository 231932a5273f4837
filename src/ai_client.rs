/// Client for the content-generation service.
///
/// The model is asked to separate drafts with a fixed marker; the reply is
/// split on it and each draft is clamped to the platform content ceiling.
/// Any transport or contract failure surfaces as `AiUnavailable` so it can
/// never be mistaken for a caller error.

use serde::{Deserialize, Serialize};

use crate::configuration::AiSettings;
use crate::error::AppError;

const POST_SEPARATOR: &str = "---POST_SEPARATOR---";
const MAX_POST_LENGTH: usize = 3000;

const SYSTEM_PROMPT: &str = "You are a professional content writer who creates engaging \
social media posts.\n\
INSTRUCTIONS:\n\
1. Create posts based on the user's topic, written from a learning-in-public perspective.\n\
2. Keep EACH post under 3000 characters.\n\
3. Use relevant hashtags and end with a question that invites replies.\n\
4. Structure: hook, value, call-to-action.\n\
IMPORTANT:\n\
- Separate each post with \"---POST_SEPARATOR---\".\n\
- Create 1-3 posts depending on content depth.\n\
User's topic: ";

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Clone)]
pub struct AiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AiClient {
    pub fn new(settings: &AiSettings, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        }
    }

    /// Asks the model for 1–3 post drafts on the given topic.
    pub async fn generate_posts(&self, topic: &str) -> Result<Vec<String>, AppError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: format!("{}{}", SYSTEM_PROMPT, topic),
                }],
            }],
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Content generation request failed: {}", e);
                AppError::AiUnavailable(e.to_string())
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!("Content generation service returned error: {}", e);
                AppError::AiUnavailable(e.to_string())
            })?;

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            tracing::error!("Content generation response unreadable: {}", e);
            AppError::AiUnavailable(e.to_string())
        })?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| AppError::AiUnavailable("no content generated".to_string()))?;

        let posts = split_posts(&text);
        if posts.is_empty() {
            return Err(AppError::AiUnavailable("no content generated".to_string()));
        }

        Ok(posts)
    }
}

fn split_posts(text: &str) -> Vec<String> {
    text.split(POST_SEPARATOR)
        .map(str::trim)
        .filter(|post| !post.is_empty())
        .map(clamp_post)
        .collect()
}

fn clamp_post(post: &str) -> String {
    if post.len() <= MAX_POST_LENGTH {
        return post.to_string();
    }

    // Cut on a char boundary, leaving room for the ellipsis.
    let mut clamped: String = post.chars().take(MAX_POST_LENGTH - 3).collect();
    clamped.push_str("...");
    clamped
}
