//! The axum application state: the dispatch fabric, durable session
//! storage, and the configured LLM provider, threaded through every route
//! handler via `State<AppState>`.

use std::sync::Arc;

use sa_domain::config::Config;
use sa_providers::LlmProvider;
use sa_sessions::SessionStore;

use crate::hub::Hub;

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub sessions: Arc<SessionStore>,
    pub provider: Arc<dyn LlmProvider>,
    pub config: Arc<Config>,
}
