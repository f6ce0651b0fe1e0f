use serde::{Deserialize, Serialize};

pub const DEFAULT_REVIEW_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_REVIEW_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug)]
pub enum ReviewError {
    Http(reqwest::Error),
    BadStatus(reqwest::StatusCode, String),
    InvalidResponse,
    EmptyResponse,
}

impl std::fmt::Display for ReviewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewError::Http(err) => write!(f, "review request failed: {}", err),
            // Callers surface this message verbatim, so prefer the provider's
            // own wording when it sent one.
            ReviewError::BadStatus(status, message) => {
                if message.is_empty() {
                    write!(f, "review engine returned status {}", status)
                } else {
                    write!(f, "{}", message)
                }
            }
            ReviewError::InvalidResponse => {
                write!(f, "review engine returned an unreadable response")
            }
            ReviewError::EmptyResponse => write!(f, "review engine returned no candidates"),
        }
    }
}

impl std::error::Error for ReviewError {}

impl From<reqwest::Error> for ReviewError {
    fn from(value: reqwest::Error) -> Self {
        ReviewError::Http(value)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    message: String,
}

/// Client for the generative-language `generateContent` endpoint.
///
/// One call per review, no retries and no timeout beyond the transport
/// default: a provider failure propagates immediately to the caller.
#[derive(Clone)]
pub struct ReviewClient {
    base_url: String,
    model: String,
    api_key: String,
    http: reqwest::Client,
}

impl ReviewClient {
    pub fn new(base_url: String, model: String, api_key: String) -> Result<Self, ReviewError> {
        let http = reqwest::Client::builder().build().map_err(ReviewError::Http)?;

        Ok(Self {
            base_url,
            model,
            api_key,
            http,
        })
    }

    /// Asks the model for a brief vulnerability audit of `code`, returning
    /// the generated Markdown text.
    pub async fn review(&self, code: &str) -> Result<String, ReviewError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(code),
                }],
            }],
        };

        let resp = self
            .http
            .post(self.generate_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReviewError::BadStatus(status, provider_error_message(&body)));
        }

        let decoded = resp
            .json::<GenerateContentResponse>()
            .await
            .map_err(|_| ReviewError::InvalidResponse)?;

        decoded
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or(ReviewError::EmptyResponse)
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

fn build_prompt(code: &str) -> String {
    format!(
        "Act as a Senior Security Engineer. Review this code for vulnerabilities \
         and give a brief audit report in Markdown format:\n\n{}",
        code
    )
}

// Failure bodies look like {"error": {"message": "...", ...}}; anything else
// is passed through trimmed.
fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<ProviderError>(body)
        .map(|decoded| decoded.error.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}
