//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::duel::DuelHandle;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub duel: DuelHandle,
}

impl AppState {
    pub fn new(config: Config, duel: DuelHandle) -> Self {
        Self {
            config: Arc::new(config),
            duel,
        }
    }
}
