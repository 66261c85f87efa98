//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use folio_upstream::UpstreamClient;

use crate::config::Config;
use crate::prompt;

/// State shared across all HTTP handlers. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// The provider adapter every `/api/invoke` call streams from.
    pub upstream: Arc<dyn UpstreamClient>,
}

impl AppState {
    pub fn new(config: Config, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            config: Arc::new(config),
            upstream,
        }
    }

    /// System instruction for a request handled at `now`.
    pub fn system_prompt(&self, now: DateTime<Utc>) -> String {
        prompt::render(&self.config.system_prompt_template, now)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("upstream", &self.upstream.name())
            .finish()
    }
}
