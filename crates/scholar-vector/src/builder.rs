//! Embedding producer: corpus records in, a persisted vector store out.
//!
//! The corpus is the crawler's flat JSON array. Each record's text is
//! normalized, embedded and L2-normalized; records with no text are left
//! out of the store entirely.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use scholar_core::error::{Result, ScholarError};
use scholar_core::types::{Category, RecordId, RecordMetadata};

use crate::embedding::{l2_normalize, DynEmbeddingService};
use crate::encoder::normalize_whitespace;
use crate::store::{EmbeddingRecord, VectorStore};

/// A text field the crawler emits either as one string or as a list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
pub enum TextField {
    #[default]
    Empty,
    One(String),
    Many(Vec<String>),
}

impl TextField {
    fn push_into(&self, parts: &mut Vec<String>) {
        match self {
            TextField::Empty => {}
            TextField::One(s) => parts.push(s.clone()),
            TextField::Many(items) => parts.extend(items.iter().cloned()),
        }
    }
}

/// One corpus entry as produced by the corpus builder.
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusRecord {
    pub id: RecordId,
    pub name: String,
    #[serde(default, alias = "faculty_type")]
    pub category: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "profile_url")]
    pub profile_link: Option<String>,
    /// Prepared embedding text; composed from the list fields when blank.
    #[serde(default, alias = "text_for_embedding")]
    pub text: Option<String>,
    #[serde(default)]
    pub biography: TextField,
    #[serde(default)]
    pub specialization: TextField,
    #[serde(default)]
    pub research: TextField,
    #[serde(default)]
    pub teaching: TextField,
}

impl CorpusRecord {
    /// The normalized text to embed. Empty when the record has nothing to say.
    pub fn embedding_text(&self) -> String {
        if let Some(text) = &self.text {
            let normalized = normalize_whitespace(text);
            if !normalized.is_empty() {
                return normalized;
            }
        }

        let mut parts = Vec::new();
        self.biography.push_into(&mut parts);
        self.specialization.push_into(&mut parts);
        self.research.push_into(&mut parts);
        self.teaching.push_into(&mut parts);
        normalize_whitespace(&parts.join(" "))
    }

    fn category(&self) -> Result<Category> {
        self.category.trim().parse::<Category>().map_err(|_| {
            ScholarError::Corpus(format!(
                "record {} has unknown category '{}'",
                self.id, self.category
            ))
        })
    }
}

/// Read a corpus JSON array from disk.
pub fn load_corpus(path: &Path) -> Result<Vec<CorpusRecord>> {
    let bytes = std::fs::read(path)?;
    let records: Vec<CorpusRecord> = serde_json::from_slice(&bytes).map_err(|e| {
        ScholarError::Corpus(format!("{} is not a valid corpus: {}", path.display(), e))
    })?;
    info!(path = %path.display(), records = records.len(), "Corpus loaded");
    Ok(records)
}

/// Counts from one build run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub embedded: usize,
    pub skipped_empty: usize,
}

/// Embeds a corpus into a fresh [`VectorStore`].
pub struct StoreBuilder {
    embedder: Arc<dyn DynEmbeddingService>,
}

impl StoreBuilder {
    pub fn new(embedder: Arc<dyn DynEmbeddingService>) -> Self {
        Self { embedder }
    }

    /// Embed every record with non-empty text, in corpus order.
    ///
    /// Vectors and metadata travel together as [`EmbeddingRecord`]s, so the
    /// resulting store is aligned by construction.
    pub async fn build(&self, corpus: &[CorpusRecord]) -> Result<(VectorStore, BuildReport)> {
        let mut records = Vec::with_capacity(corpus.len());
        let mut report = BuildReport::default();

        for entry in corpus {
            let text = entry.embedding_text();
            if text.is_empty() {
                debug!(id = %entry.id, "Skipping record with empty text");
                report.skipped_empty += 1;
                continue;
            }
            if entry.name.trim().is_empty() {
                return Err(ScholarError::Corpus(format!(
                    "record {} has an empty name",
                    entry.id
                )));
            }

            let mut vector = self.embedder.embed_boxed(&text).await?;
            l2_normalize(&mut vector);

            records.push(EmbeddingRecord {
                metadata: RecordMetadata {
                    id: entry.id.clone(),
                    name: entry.name.trim().to_string(),
                    category: entry.category()?,
                    email: entry.email.clone().filter(|s| !s.trim().is_empty()),
                    profile_link: entry.profile_link.clone().filter(|s| !s.trim().is_empty()),
                    text,
                },
                vector,
            });
            report.embedded += 1;
        }

        let store = VectorStore::from_records(records)?;
        info!(
            embedded = report.embedded,
            skipped_empty = report.skipped_empty,
            dimension = store.dimension(),
            "Vector store built"
        );
        Ok((store, report))
    }
}
