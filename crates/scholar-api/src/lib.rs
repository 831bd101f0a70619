//! Scholar API crate - axum HTTP surface over the recommendation facade.
//!
//! Exposes recommendations, the category list, health, and a token-protected
//! admin route that reloads the vector store from disk.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
