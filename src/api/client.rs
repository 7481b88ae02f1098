use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{ApiConfig, Config};
use crate::window::ReportingWindow;

/// REST client for the facilities dashboard endpoints
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  token: Option<String>,
  from_param: String,
  to_param: String,
}

impl ApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let base_url = Url::parse(&config.url)
      .map_err(|e| eyre!("Invalid API url '{}': {}", config.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      token: Config::get_api_token(),
      from_param: config.from_param.clone(),
      to_param: config.to_param.clone(),
    })
  }

  /// Use an explicit bearer token instead of the environment's.
  pub fn with_token(mut self, token: impl Into<String>) -> Self {
    self.token = Some(token.into());
    self
  }

  /// Endpoint URL for `path` with the window's bounds as query parameters.
  ///
  /// Date-aligned windows are sent as `YYYY-MM-DD`; any other window keeps
  /// its exact instants as RFC 3339.
  pub fn endpoint_url(&self, path: &str, window: &ReportingWindow) -> Result<Url> {
    let mut url = self
      .base_url
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint path '{}': {}", path, e))?;

    let (from, to) = if window.is_date_aligned() {
      (
        window.from().format("%Y-%m-%d").to_string(),
        window.to().format("%Y-%m-%d").to_string(),
      )
    } else {
      (window.from().to_rfc3339(), window.to().to_rfc3339())
    };

    url
      .query_pairs_mut()
      .append_pair(&self.from_param, &from)
      .append_pair(&self.to_param, &to);

    Ok(url)
  }

  /// GET an endpoint for the window and return its JSON body.
  pub async fn get_json(&self, path: &str, window: ReportingWindow) -> Result<Value> {
    let url = self.endpoint_url(path, &window)?;
    debug!(%url, "GET");

    let mut request = self.http.get(url);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", path, e))?;

    let status = response.status();
    if !status.is_success() {
      return Err(eyre!("{} returned HTTP {}", path, status));
    }

    response
      .json::<Value>()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", path, e))
  }
}
