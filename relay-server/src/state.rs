//! Shared handler state: the engine's core handle plus whatever the HTTP
//! boundary needs of its own (API key, chain collaborator, rescan driver).

use std::sync::Arc;

use relay_core::{ChainSource, Engine, FilterParams, Relay, RequestManager};

#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub requests: Arc<RequestManager>,
    pub engine: Arc<Engine>,
    pub chain: Arc<dyn ChainSource>,
    /// `None` disables API-key authentication (spec §6 "unless disabled").
    pub api_key: Option<String>,
    /// The operator-configured Bloom sizing, reapplied by `wipe` so a
    /// non-default deployment doesn't silently fall back to the defaults.
    pub filter_params: FilterParams,
}
