//! Dashboards built from configured pages, one panel per REST endpoint.

use color_eyre::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::client::ApiClient;
use crate::cache::DashboardDataOrchestrator;
use crate::config::Config;
use crate::dashboard::{Dashboard, PanelSource};
use crate::window::ReportingWindow;

/// A panel backed by one REST endpoint.
pub struct Endpoint {
  client: ApiClient,
  path: String,
}

impl Endpoint {
  pub fn new(client: ApiClient, path: impl Into<String>) -> Self {
    Self {
      client,
      path: path.into(),
    }
  }
}

impl PanelSource<Value> for Endpoint {
  fn fetch(&self, window: ReportingWindow) -> BoxFuture<'static, Result<Value, String>> {
    let client = self.client.clone();
    let path = self.path.clone();
    async move {
      client
        .get_json(&path, window)
        .await
        .map_err(|e| e.to_string())
    }
    .boxed()
  }
}

/// Build the dashboard for a configured page.
pub fn build_dashboard(config: &Config, page: &str, client: ApiClient) -> Result<Dashboard<Value>> {
  let operations = config.page(page)?;

  let orchestrator = DashboardDataOrchestrator::new()
    .with_ttl(config.cache.ttl())
    .with_error_policy(config.cache.on_error)
    .with_operations(operations.iter().map(|op| op.name.clone()));

  let dashboard = operations
    .iter()
    .fold(Dashboard::new(page, orchestrator), |dashboard, op| {
      dashboard.with_panel(op.name.clone(), Endpoint::new(client.clone(), op.path.clone()))
    });

  Ok(dashboard)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::OperationState;
  use serde_json::json;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn config(url: &str) -> Config {
    Config::from_yaml(&format!(
      r#"
api:
  url: {url}
pages:
  asset-analytics:
    - name: assetStatistics
      path: /pms/assets/statistics.json
    - name: groupWiseAssets
      path: /pms/assets/group_wise.json
"#
    ))
    .unwrap()
  }

  #[tokio::test]
  async fn test_page_caches_successes_and_retries_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/pms/assets/statistics.json"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "total": 42 })))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/pms/assets/group_wise.json"))
      .respond_with(ResponseTemplate::new(500))
      .expect(2)
      .mount(&server)
      .await;

    let config = config(&server.uri());
    let client = ApiClient::new(&config.api).unwrap();
    let mut dashboard = build_dashboard(&config, "asset-analytics", client).unwrap();
    let window = ReportingWindow::parse("2024-01-01", "2024-01-31").unwrap();

    dashboard.set_window(window).unwrap();
    dashboard.wait_settled().await;
    // within the TTL a second visit reuses the statistics and retries the failure
    dashboard.set_window(window).unwrap();
    dashboard.wait_settled().await;

    let stats = dashboard.panel(&"assetStatistics".into()).unwrap();
    assert_eq!(stats.data(), Some(&json!({ "total": 42 })));
    let groups = dashboard.panel(&"groupWiseAssets".into()).unwrap();
    assert_eq!(groups.state, OperationState::Failed);
    assert!(groups.error().unwrap().contains("500"));
  }

  #[test]
  fn test_unknown_page() {
    let config = config("http://localhost/");
    let client = ApiClient::new(&config.api).unwrap();
    assert!(build_dashboard(&config, "amc", client).is_err());
  }
}
