//! reqwest-backed incident API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::{IncidentApi, IncidentPayload, RemoteError, RemoteIncident, RemoteResult};
use crate::util::{compact_text, is_http_url, normalize_text_option};

#[derive(Clone, Debug)]
pub struct HttpIncidentApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpIncidentApi {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> RemoteResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url,
            client: builder.build()?,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn incidents_url(&self) -> String {
        format!("{}/incidents", self.base_url)
    }

    fn incident_url(&self, server_id: &str) -> String {
        format!(
            "{}/incidents/{}",
            self.base_url,
            urlencoding::encode(server_id.trim())
        )
    }
}

#[async_trait]
impl IncidentApi for HttpIncidentApi {
    async fn create_incident(&self, payload: &IncidentPayload) -> RemoteResult<RemoteIncident> {
        let response = self
            .client
            .post(self.incidents_url())
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }

        let body = response.text().await?;
        parse_incident(&body)
    }

    async fn list_incidents(&self) -> RemoteResult<Vec<RemoteIncident>> {
        let response = self
            .client
            .get(self.incidents_url())
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }

        let body = response.text().await?;
        parse_incident_list(&body)
    }

    async fn get_incident(&self, server_id: &str) -> RemoteResult<Option<RemoteIncident>> {
        if server_id.trim().is_empty() {
            return Ok(None);
        }

        let response = self
            .client
            .get(self.incident_url(server_id))
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }

        let body = response.text().await?;
        parse_incident(&body).map(Some)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IncidentListResponse {
    Bare(Vec<RemoteIncident>),
    Wrapped { data: Vec<RemoteIncident> },
}

fn parse_incident_list(body: &str) -> RemoteResult<Vec<RemoteIncident>> {
    match serde_json::from_str::<IncidentListResponse>(body) {
        Ok(IncidentListResponse::Bare(incidents) | IncidentListResponse::Wrapped { data: incidents }) => {
            Ok(incidents)
        }
        Err(error) => Err(RemoteError::InvalidPayload(format!(
            "incident list is neither an array nor {{\"data\": [...]}}: {error}"
        ))),
    }
}

/// Single incident body, bare or wrapped in `{"data": {...}}`
fn parse_incident(body: &str) -> RemoteResult<RemoteIncident> {
    let mut value = serde_json::from_str::<Value>(body)
        .map_err(|error| RemoteError::InvalidPayload(format!("incident is not JSON: {error}")))?;
    if let Some(inner) = value.get_mut("data").filter(|inner| inner.is_object()) {
        value = inner.take();
    }
    if !value.is_object() {
        return Err(RemoteError::InvalidPayload(
            "incident body is not a JSON object".to_string(),
        ));
    }
    serde_json::from_value(value)
        .map_err(|error| RemoteError::InvalidPayload(format!("incident: {error}")))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> RemoteResult<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        RemoteError::InvalidConfiguration("base URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}
