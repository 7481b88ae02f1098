use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{ErrorPolicy, DEFAULT_TTL};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Page shown when none is given on the command line
  pub default_page: Option<String>,
  /// Dashboard pages by name, each a list of panels
  #[serde(default)]
  pub pages: BTreeMap<String, Vec<OperationConfig>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Query parameter carrying the window start
  #[serde(default = "default_from_param")]
  pub from_param: String,
  /// Query parameter carrying the window end
  #[serde(default = "default_to_param")]
  pub to_param: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: u64,
  #[serde(default)]
  pub on_error: ErrorPolicy,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_secs: default_ttl_secs(),
      on_error: ErrorPolicy::default(),
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_secs)
  }
}

/// One panel: an operation name and the endpoint that serves it.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationConfig {
  pub name: String,
  pub path: String,
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_from_param() -> String {
  "from_date".to_string()
}

fn default_to_param() -> String {
  "to_date".to_string()
}

fn default_ttl_secs() -> u64 {
  DEFAULT_TTL.as_secs()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./assetdash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/assetdash/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/assetdash/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("assetdash.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("assetdash").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  /// Parse and validate configuration from YAML text.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.cache.ttl_secs == 0 {
      return Err(eyre!("cache.ttl_secs must be greater than zero"));
    }

    for (page, operations) in &self.pages {
      if operations.is_empty() {
        return Err(eyre!("Page '{}' has no panels", page));
      }
      let mut seen = BTreeSet::new();
      for op in operations {
        if !seen.insert(op.name.as_str()) {
          return Err(eyre!("Page '{}' lists panel '{}' twice", page, op.name));
        }
      }
    }

    if let Some(page) = &self.default_page {
      if !self.pages.contains_key(page) {
        return Err(eyre!("default_page '{}' is not a configured page", page));
      }
    }

    Ok(())
  }

  /// Panels of the given page.
  pub fn page(&self, name: &str) -> Result<&[OperationConfig]> {
    self.pages.get(name).map(Vec::as_slice).ok_or_else(|| {
      let known: Vec<&str> = self.pages.keys().map(String::as_str).collect();
      eyre!("Unknown page '{}'. Configured pages: {}", name, known.join(", "))
    })
  }

  /// Get the API token from the environment.
  ///
  /// Checks ASSETDASH_API_TOKEN. Requests are sent unauthenticated without it.
  pub fn get_api_token() -> Option<String> {
    std::env::var("ASSETDASH_API_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  const EXAMPLE: &str = r#"
api:
  url: https://fm.example.com/
default_page: asset-analytics
pages:
  asset-analytics:
    - name: assetStatistics
      path: pms/assets/statistics.json
    - name: groupWiseAssets
      path: pms/assets/group_wise.json
"#;

  #[test]
  fn test_defaults_applied() {
    let config = Config::from_yaml(EXAMPLE).unwrap();
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.api.from_param, "from_date");
    assert_eq!(config.api.to_param, "to_date");
    assert_eq!(config.cache.ttl(), DEFAULT_TTL);
    assert_eq!(config.cache.on_error, ErrorPolicy::KeepStale);

    let panels = config.page("asset-analytics").unwrap();
    assert_eq!(panels.len(), 2);
    assert_eq!(panels[0].name, "assetStatistics");
  }

  #[test]
  fn test_cache_section() {
    let yaml = format!("{}cache:\n  ttl_secs: 10\n  on_error: clear_data\n", EXAMPLE);
    let config = Config::from_yaml(&yaml).unwrap();
    assert_eq!(config.cache.ttl(), Duration::from_secs(10));
    assert_eq!(config.cache.on_error, ErrorPolicy::ClearData);
  }

  #[test]
  fn test_rejects_duplicate_panels() {
    let yaml = r#"
api:
  url: https://fm.example.com/
pages:
  amc:
    - name: amcStatistics
      path: a.json
    - name: amcStatistics
      path: b.json
"#;
    let err = Config::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("twice"));
  }

  #[test]
  fn test_rejects_unknown_default_page() {
    let yaml = EXAMPLE.replace("default_page: asset-analytics", "default_page: amc");
    assert!(Config::from_yaml(&yaml).is_err());
  }

  #[test]
  fn test_rejects_zero_ttl() {
    let yaml = format!("{}cache:\n  ttl_secs: 0\n", EXAMPLE);
    assert!(Config::from_yaml(&yaml).is_err());
  }

  #[test]
  fn test_unknown_page_lists_known() {
    let config = Config::from_yaml(EXAMPLE).unwrap();
    let err = config.page("amc").unwrap_err();
    assert!(err.to_string().contains("asset-analytics"));
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(EXAMPLE.as_bytes()).unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.default_page.as_deref(), Some("asset-analytics"));
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yaml");
    let err = Config::load(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("not found"));
  }
}
