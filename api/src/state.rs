use std::sync::Arc;

use crate::config::ServerConfig;
use crate::providers::Providers;

/// Shared, read-only state. Nothing mutable crosses call sessions.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub providers: Providers,
}

impl AppState {
    pub fn new(config: ServerConfig, providers: Providers) -> Self {
        Self {
            config: Arc::new(config),
            providers,
        }
    }
}
