use reqwest::Client;
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};

use crate::error::DispatchFailure;
use crate::mode::Template;
use crate::state::Citation;

/// Address used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Which of the two POST contracts a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Query,
    Draft,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Query => "/query",
            Endpoint::Draft => "/draft",
        }
    }
}

/// Request body shared by `/query` and `/draft`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payload {
    pub text: String,
    pub template: Option<Template>,
}

/// Reply body shared by `/query` and `/draft`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Reply {
    pub answer: String,
    #[serde(default)]
    pub citations: Option<Vec<Citation>>,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

/// Client for the Legal Intelligence Server
#[derive(Clone, Debug)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST one payload to one endpoint. No retries, no timeout.
    pub async fn send(&self, endpoint: Endpoint, payload: &Payload) -> Result<Reply, DispatchFailure> {
        let url = format!("{}{}", self.base_url, endpoint.path());

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DispatchFailure::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str::<Reply>(&body)
            .map_err(|e| DispatchFailure::Malformed(e.to_string()))
    }

    /// Probe `GET /health`
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Health check failed with status: {}. Make sure the backend is running at {}",
                response.status(),
                self.base_url
            ));
        }

        let health: HealthResponse = response.json().await?;
        if health.status != "healthy" {
            return Err(anyhow!("Backend reported status: {}", health.status));
        }
        Ok(())
    }
}
