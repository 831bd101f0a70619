pub mod config;
pub mod error;
pub mod types;

pub use config::ScholarConfig;
pub use error::{Result, ScholarError};
pub use types::*;
