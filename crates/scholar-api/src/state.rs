//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use scholar_core::config::ScholarConfig;
use scholar_vector::{Recommender, StorePaths};

use crate::auth::generate_token;

/// Shared application state.
///
/// Cloned into every handler; all fields are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// The recommendation facade. Owns the served store.
    pub recommender: Arc<Recommender>,
    /// Application configuration, read-only while serving.
    pub config: Arc<ScholarConfig>,
    /// Where `/admin/reload` reads the store from.
    pub store_paths: StorePaths,
    /// Bearer token the admin routes require.
    pub admin_token: String,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: ScholarConfig, recommender: Arc<Recommender>) -> Self {
        let store_paths = StorePaths::from_config(&config.store);
        // Without a configured token, admin access lasts for this process only.
        let admin_token = config
            .server
            .admin_token
            .clone()
            .unwrap_or_else(generate_token);
        Self {
            recommender,
            config: Arc::new(config),
            store_paths,
            admin_token,
            start_time: Instant::now(),
        }
    }
}
