use std::path::Path;

use serde::{Deserialize, Serialize};

use super::store::Placement;

pub(crate) const CONFIG_FILE_NAME: &str = "chatsync_config.json";
pub(crate) const DEFAULT_PAGE_SIZE: u32 = 20;
const PAGE_SIZE_ENV: &str = "CHATSYNC_PAGE_SIZE";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `first` for every page request.
    pub page_size: u32,
    /// Where load-more pages land. `tail` matches the observed list behavior.
    pub history_placement: Placement,
    /// Issue the initial fetch as soon as the actor starts.
    pub auto_load: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            history_placement: Placement::Tail,
            auto_load: true,
        }
    }
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let config = match std::fs::read_to_string(&path) {
        Ok(raw) => match serde_json::from_str::<AppConfig>(&raw) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(%e, path = %path.display(), "invalid config; using defaults");
                AppConfig::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "unreadable config; using defaults");
            AppConfig::default()
        }
    };

    apply_page_size_override(config, std::env::var(PAGE_SIZE_ENV).ok())
}

/// `CHATSYNC_PAGE_SIZE` wins over the file when it parses; zero from either
/// source means the default.
fn apply_page_size_override(mut config: AppConfig, env_value: Option<String>) -> AppConfig {
    if let Some(v) = env_value {
        match v.trim().parse::<u32>() {
            Ok(n) => config.page_size = n,
            Err(_) => tracing::warn!(value = %v, "ignoring {PAGE_SIZE_ENV}"),
        }
    }
    if config.page_size == 0 {
        config.page_size = DEFAULT_PAGE_SIZE;
    }
    config
}
