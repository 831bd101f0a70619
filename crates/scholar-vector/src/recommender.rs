//! Recommendation facade.
//!
//! Owns the process-wide query encoder and the currently served vector
//! store. The store sits behind an `Arc` inside a small state machine:
//!
//! ```text
//! Uninitialized -> Loading -> Ready
//!                         \-> Failed -> Loading -> ...
//! ```
//!
//! A refresh builds the new store off to the side and replaces the `Arc`
//! under a short write lock. Every `recommend` call clones the `Arc` once at
//! the start, so it ranks and assembles against exactly one store.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use scholar_core::config::RecommendConfig;
use scholar_core::error::{Result, ScholarError};
use scholar_core::types::{Category, ResultRecord, StoreInfo};

use crate::assemble::assemble;
use crate::encoder::QueryEncoder;
use crate::ranker::rank;
use crate::store::{StorePaths, VectorStore};

#[derive(Debug)]
enum EngineState {
    Uninitialized,
    Loading,
    Ready(Arc<VectorStore>),
    Failed(String),
}

/// Externally visible lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum EngineStatus {
    Uninitialized,
    Loading,
    Ready(StoreInfo),
    Failed(String),
}

impl EngineStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineStatus::Ready(_))
    }
}

/// Single entry point for recommendations.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct Recommender {
    encoder: QueryEncoder,
    config: RecommendConfig,
    state: RwLock<EngineState>,
}

impl Recommender {
    pub fn new(encoder: QueryEncoder, config: RecommendConfig) -> Self {
        Self {
            encoder,
            config,
            state: RwLock::new(EngineState::Uninitialized),
        }
    }

    pub fn config(&self) -> &RecommendConfig {
        &self.config
    }

    pub fn status(&self) -> Result<EngineStatus> {
        let state = self.read_state()?;
        Ok(match &*state {
            EngineState::Uninitialized => EngineStatus::Uninitialized,
            EngineState::Loading => EngineStatus::Loading,
            EngineState::Ready(store) => EngineStatus::Ready(store.info().clone()),
            EngineState::Failed(reason) => EngineStatus::Failed(reason.clone()),
        })
    }

    /// Load the store at `paths` and start serving it.
    ///
    /// From `Uninitialized` or `Failed` the engine passes through `Loading`
    /// and ends in `Ready` or `Failed`. From `Ready` this is a refresh: the
    /// current store keeps serving until the new one is fully validated, and
    /// stays in place if the new one is rejected.
    pub async fn load(&self, paths: &StorePaths) -> Result<StoreInfo> {
        let refreshing = self.begin_load()?;
        let loaded = self.read_store(paths.clone()).await;
        self.finish_load(refreshing, loaded)
    }

    /// Enter `Loading` unless a store is already served. Returns whether this
    /// load refreshes a served store.
    fn begin_load(&self) -> Result<bool> {
        let mut state = self.write_state()?;
        match &*state {
            EngineState::Ready(_) => Ok(true),
            EngineState::Loading => Err(ScholarError::State(
                "a store load is already in progress".to_string(),
            )),
            EngineState::Uninitialized | EngineState::Failed(_) => {
                *state = EngineState::Loading;
                Ok(false)
            }
        }
    }

    fn finish_load(&self, refreshing: bool, loaded: Result<VectorStore>) -> Result<StoreInfo> {
        let mut state = self.write_state()?;
        match loaded {
            Ok(store) => {
                let info = store.info().clone();
                *state = EngineState::Ready(Arc::new(store));
                info!(
                    generation = %info.generation,
                    size = info.size,
                    refreshing,
                    "Vector store ready"
                );
                Ok(info)
            }
            // A store installed while this load ran stays in place.
            Err(e) if refreshing || !matches!(*state, EngineState::Loading) => {
                warn!(error = %e, "Store refresh rejected; keeping current store");
                Err(e)
            }
            Err(e) => {
                error!(error = %e, "Store load failed");
                *state = EngineState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Reload the store from disk. Same semantics as [`Recommender::load`].
    pub async fn reload(&self, paths: &StorePaths) -> Result<StoreInfo> {
        self.load(paths).await
    }

    /// Serve an already built store, replacing whatever was loaded before.
    pub fn install(&self, store: VectorStore) -> Result<StoreInfo> {
        self.check_dimension(&store)?;
        let info = store.info().clone();
        *self.write_state()? = EngineState::Ready(Arc::new(store));
        info!(generation = %info.generation, size = info.size, "Vector store installed");
        Ok(info)
    }

    /// Snapshot of the store currently being served.
    pub fn store(&self) -> Result<Arc<VectorStore>> {
        match &*self.read_state()? {
            EngineState::Ready(store) => Ok(Arc::clone(store)),
            _ => Err(ScholarError::StoreNotLoaded),
        }
    }

    /// Rank the store against `query` and return at most `top_k` results.
    ///
    /// `top_k` defaults to the configured value and must lie in
    /// `1..=max_top_k`. A `category` keeps only records of exactly that
    /// category.
    pub async fn recommend(
        &self,
        query: &str,
        top_k: Option<usize>,
        category: Option<Category>,
    ) -> Result<Vec<ResultRecord>> {
        let store = self.store()?;
        let top_k = self.resolve_top_k(top_k)?;

        let vector = self.encoder.encode(query).await?;
        let hits = rank(&vector, &store, category, top_k)?;

        debug!(
            top_k,
            category = category.map(|c| c.as_str()),
            hits = hits.len(),
            generation = %store.info().generation,
            "Recommendation ranked"
        );
        Ok(assemble(&hits, &store))
    }

    fn resolve_top_k(&self, requested: Option<usize>) -> Result<usize> {
        let top_k = requested.unwrap_or(self.config.default_top_k);
        if top_k == 0 {
            return Err(ScholarError::InvalidQuery(
                "top_k must be a positive integer".to_string(),
            ));
        }
        if top_k > self.config.max_top_k {
            return Err(ScholarError::InvalidQuery(format!(
                "top_k must be at most {}",
                self.config.max_top_k
            )));
        }
        Ok(top_k)
    }

    async fn read_store(&self, paths: StorePaths) -> Result<VectorStore> {
        let store = tokio::task::spawn_blocking(move || VectorStore::load(&paths))
            .await
            .map_err(|e| ScholarError::State(format!("Store load task failed: {}", e)))??;
        self.check_dimension(&store)?;
        Ok(store)
    }

    fn check_dimension(&self, store: &VectorStore) -> Result<()> {
        if !store.is_empty() && store.dimension() != self.encoder.dimensions() {
            return Err(ScholarError::DimensionMismatch {
                expected: self.encoder.dimensions(),
                actual: store.dimension(),
            });
        }
        Ok(())
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, EngineState>> {
        self.state
            .read()
            .map_err(|e| ScholarError::State(format!("Lock poisoned: {}", e)))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, EngineState>> {
        self.state
            .write()
            .map_err(|e| ScholarError::State(format!("Lock poisoned: {}", e)))
    }
}
