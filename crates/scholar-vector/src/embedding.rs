//! Text embedding backends.
//!
//! `OnnxEmbeddingService` runs a sentence-transformer export (all-mpnet-base-v2
//! by default) through ONNX Runtime. `MockEmbedding` produces deterministic
//! pseudo-random unit vectors so the store, ranker and facade can be exercised
//! without model files.

use std::collections::hash_map::DefaultHasher;
use std::fmt::Display;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use ort::session::Session;
use ort::value::TensorRef;
use scholar_core::config::{EncoderBackend, EncoderConfig};
use scholar_core::error::ScholarError;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::info;

/// Turns text into a fixed-width vector.
///
/// The store builder embeds profile text with it and the query encoder
/// embeds queries and their augmented variants.
pub trait EmbeddingService: Send + Sync {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, ScholarError>> + Send;

    /// Width of every vector this service returns.
    fn dimensions(&self) -> usize;
}

pub type EmbedFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<f32>, ScholarError>> + Send + 'a>>;

/// Boxed-future twin of [`EmbeddingService`], usable as `dyn`.
///
/// Every `EmbeddingService` gets this for free, so the facade, the HTTP state
/// and the CLI can hold an `Arc<dyn DynEmbeddingService>` chosen at runtime.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(EmbeddingService::embed(self, text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

/// Build the backend named by `config.backend`.
pub fn embedder_from_config(
    config: &EncoderConfig,
) -> Result<Arc<dyn DynEmbeddingService>, ScholarError> {
    match config.backend {
        EncoderBackend::Onnx => {
            let service = OnnxEmbeddingService::from_directory(
                Path::new(&config.model_dir),
                config.intra_threads,
                config.max_tokens,
            )?;
            info!(model = %config.model_name, dimensions = service.dimensions, "ONNX encoder ready");
            Ok(Arc::new(service))
        }
        EncoderBackend::Mock => {
            info!(dimensions = config.dimensions, "Mock encoder ready");
            Ok(Arc::new(MockEmbedding::with_dimensions(config.dimensions)))
        }
    }
}

/// Scale `vector` to unit L2 norm in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

fn embedding_error<E: Display>(stage: &'static str) -> impl Fn(E) -> ScholarError {
    move |e| ScholarError::Embedding(format!("{}: {}", stage, e))
}

// ---------------------------------------------------------------------------
// ONNX Runtime backend
// ---------------------------------------------------------------------------

/// Everything one inference needs. Shared by all clones of the service.
struct OnnxModel {
    /// ONNX Runtime sessions are not re-entrant; calls queue on this lock.
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    /// BERT-style exports take `token_type_ids` as a third input, MPNet does not.
    takes_token_types: bool,
}

/// Sentence-transformer embeddings via ONNX Runtime.
///
/// The model directory holds `model.onnx` and the HuggingFace
/// `tokenizer.json`. Token states are mean-pooled over the attention mask and
/// L2-normalized, which is what sentence-transformers does for
/// all-mpnet-base-v2.
#[derive(Clone)]
pub struct OnnxEmbeddingService {
    model: Arc<OnnxModel>,
    dimensions: usize,
}

impl std::fmt::Debug for OnnxEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingService")
            .field("dimensions", &self.dimensions)
            .field("takes_token_types", &self.model.takes_token_types)
            .finish()
    }
}

impl OnnxEmbeddingService {
    pub fn from_directory(
        model_dir: &Path,
        intra_threads: usize,
        max_tokens: usize,
    ) -> Result<Self, ScholarError> {
        Self::from_files(
            &model_dir.join("model.onnx"),
            &model_dir.join("tokenizer.json"),
            intra_threads,
            max_tokens,
        )
    }

    /// `max_tokens` caps the sequence length, special tokens included.
    pub fn from_files(
        model_path: &Path,
        tokenizer_path: &Path,
        intra_threads: usize,
        max_tokens: usize,
    ) -> Result<Self, ScholarError> {
        for (path, what) in [(model_path, "ONNX model"), (tokenizer_path, "tokenizer")] {
            if !path.is_file() {
                return Err(ScholarError::Embedding(format!(
                    "{} not found at {}",
                    what,
                    path.display()
                )));
            }
        }

        let session = Session::builder()
            .map_err(embedding_error("create ONNX session"))?
            .with_intra_threads(intra_threads.max(1))
            .map_err(embedding_error("configure ONNX threads"))?
            .commit_from_file(model_path)
            .map_err(embedding_error("load ONNX model"))?;

        // Output 0 is [batch, seq_len, hidden]; fall back to mpnet's width
        // when the export leaves the hidden axis symbolic.
        let dimensions = session
            .outputs()
            .first()
            .and_then(|output| output.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .filter(|width| *width > 0)
            .map_or(768, |width| width as usize);
        let takes_token_types = session.inputs().len() >= 3;

        let mut tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(embedding_error("load tokenizer"))?;
        limit_tokens(&mut tokenizer, max_tokens)?;

        info!(
            model = %model_path.display(),
            dimensions,
            max_tokens,
            takes_token_types,
            "ONNX embedding model loaded"
        );

        Ok(Self {
            model: Arc::new(OnnxModel {
                session: Mutex::new(session),
                tokenizer,
                takes_token_types,
            }),
            dimensions,
        })
    }
}

impl OnnxModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ScholarError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(embedding_error("tokenize"))?;
        let mask = encoding.get_attention_mask();
        let seq_len = encoding.get_ids().len();

        let ids = token_row(encoding.get_ids())?;
        let attention = token_row(mask)?;
        let type_ids = token_row(encoding.get_type_ids())?;

        let ids = TensorRef::from_array_view(&ids).map_err(embedding_error("input_ids tensor"))?;
        let attention =
            TensorRef::from_array_view(&attention).map_err(embedding_error("attention_mask tensor"))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ScholarError::Embedding(format!("ONNX session lock poisoned: {}", e)))?;
        let run = if self.takes_token_types {
            let type_ids = TensorRef::from_array_view(&type_ids)
                .map_err(embedding_error("token_type_ids tensor"))?;
            session.run(ort::inputs![ids, attention, type_ids])
        } else {
            session.run(ort::inputs![ids, attention])
        };
        let outputs = run.map_err(embedding_error("ONNX inference"))?;

        let (shape, states) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(embedding_error("read token states"))?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        let hidden = match dims.as_slice() {
            [.., seq, hidden] if *seq as usize == seq_len && *hidden > 0 => *hidden as usize,
            _ => {
                return Err(ScholarError::Embedding(format!(
                    "token states have shape {:?}, expected [1, {}, hidden]",
                    dims, seq_len
                )))
            }
        };

        let mut pooled = masked_mean_pool(states, mask, hidden);
        l2_normalize(&mut pooled);
        Ok(pooled)
    }
}

/// Truncate every encoding to `max_tokens`. sentence-transformers cuts
/// all-mpnet-base-v2 inputs at 384; the model itself rejects more than 512.
fn limit_tokens(tokenizer: &mut Tokenizer, max_tokens: usize) -> Result<(), ScholarError> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_tokens,
            ..Default::default()
        }))
        .map_err(embedding_error("configure truncation"))?;
    Ok(())
}

/// One tokenized sequence as a `[1, len]` i64 batch.
fn token_row(values: &[u32]) -> Result<Array2<i64>, ScholarError> {
    let row: Vec<i64> = values.iter().map(|&v| i64::from(v)).collect();
    Array2::from_shape_vec((1, row.len()), row).map_err(embedding_error("shape token batch"))
}

/// Average the rows of `states` (row-major, `hidden` wide) whose mask is set.
///
/// `hidden` must be non-zero.
fn masked_mean_pool(states: &[f32], mask: &[u32], hidden: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden];
    let mut kept = 0usize;
    for (row, _) in states
        .chunks_exact(hidden)
        .zip(mask)
        .filter(|(_, keep)| **keep > 0)
    {
        for (acc, value) in pooled.iter_mut().zip(row) {
            *acc += value;
        }
        kept += 1;
    }
    if kept > 0 {
        let n = kept as f32;
        pooled.iter_mut().for_each(|v| *v /= n);
    }
    pooled
}

impl EmbeddingService for OnnxEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ScholarError> {
        if text.trim().is_empty() {
            return Err(ScholarError::Embedding("cannot embed empty text".to_string()));
        }
        // Inference is CPU-bound; keep it off the async workers.
        let model = Arc::clone(&self.model);
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || model.embed(&text))
            .await
            .map_err(embedding_error("embedding task"))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// Mock backend
// ---------------------------------------------------------------------------

/// Deterministic stand-in for a real model.
///
/// The text's hash seeds a splitmix64 stream that fills the vector, which is
/// then scaled to unit length. Equal texts give equal vectors; different
/// texts give nearly orthogonal ones at realistic widths.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbedding {
    /// Same width as all-mpnet-base-v2.
    pub fn new() -> Self {
        Self::with_dimensions(768)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish();

        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|_| {
                let unit = (splitmix64(&mut state) >> 11) as f64 / (1u64 << 53) as f64;
                (unit * 2.0 - 1.0) as f32
            })
            .collect();
        l2_normalize(&mut vector);
        vector
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ScholarError> {
        if text.is_empty() {
            return Err(ScholarError::Embedding("cannot embed empty text".to_string()));
        }
        Ok(self.vector_for(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
