// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, engine::session::SessionEngine, stores::Stores};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<SessionEngine>,
    pub stores: Stores,
}

impl AppState {
    pub fn new(config: Config, stores: Stores) -> Self {
        let engine = Arc::new(SessionEngine::new(stores.clone(), config.costs.clone()));
        Self {
            config,
            engine,
            stores,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
