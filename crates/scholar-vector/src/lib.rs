//! Scholar Vector crate - embedding services, vector store, query encoding,
//! exhaustive cosine ranking, result assembly, and the recommendation facade.
//!
//! The store is small enough (a few hundred faculty profiles) that every
//! query scores every row; there is no approximate index.

pub mod assemble;
pub mod builder;
pub mod embedding;
pub mod encoder;
pub mod npy;
pub mod ranker;
pub mod recommender;
pub mod store;

pub use assemble::{assemble, round_score};
pub use builder::{load_corpus, BuildReport, CorpusRecord, StoreBuilder};
pub use embedding::{
    embedder_from_config, DynEmbeddingService, EmbeddingService, MockEmbedding,
    OnnxEmbeddingService,
};
pub use encoder::QueryEncoder;
pub use ranker::{cosine_similarity, rank, RankedHit};
pub use recommender::{EngineStatus, Recommender};
pub use store::{EmbeddingRecord, StoreFiles, StorePaths, VectorStore};
