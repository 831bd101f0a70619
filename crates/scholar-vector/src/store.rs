//! Read-only vector store: the embedding matrix and its aligned metadata.
//!
//! Row `i` of the matrix and `records[i]` always describe the same corpus
//! entry. Both halves are validated together at construction and never
//! change afterwards; a refresh builds a new store. On disk each build is
//! published as one generation so a reader always gets a matched pair.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use scholar_core::config::StoreConfig;
use scholar_core::error::{Result, ScholarError};
use scholar_core::types::{Category, RecordId, RecordMetadata, StoreInfo};

use crate::npy::{self, Matrix};

/// One corpus entry together with the vector its text produced.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub metadata: RecordMetadata,
    pub vector: Vec<f32>,
}

/// Pointer file naming the published generation inside the store directory.
pub const CURRENT_FILE: &str = "current.json";

/// Subdirectory holding one directory per published build.
pub const GENERATIONS_DIR: &str = "generations";

/// Superseded generations kept next to the current one. Readers that
/// resolved an older pointer can still finish reading it.
const RETAINED_GENERATIONS: usize = 2;

/// How often `load` re-resolves the pointer when the generation it was
/// reading is pruned underneath it.
const RESOLVE_ATTEMPTS: usize = 3;

/// The two files of one persisted store, always from the same build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFiles {
    pub embeddings: PathBuf,
    pub metadata: PathBuf,
}

/// Where a store lives on disk.
///
/// `save` writes every build into its own directory under
/// `generations/` and then renames `current.json` into place to publish it.
/// `load` reads the pointer once and takes both files from the directory it
/// names. A directory without a pointer is read as a plain pair of files
/// directly under `dir`, the layout external producers write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub dir: PathBuf,
    pub embeddings_file: String,
    pub metadata_file: String,
}

/// Contents of `current.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Manifest {
    generation: String,
    embeddings: String,
    metadata: String,
    size: usize,
    dimension: usize,
    created_at: DateTime<Utc>,
}

impl StorePaths {
    pub fn new(
        dir: impl Into<PathBuf>,
        embeddings_file: impl Into<String>,
        metadata_file: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            embeddings_file: embeddings_file.into(),
            metadata_file: metadata_file.into(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.dir, &config.embeddings_file, &config.metadata_file)
    }

    /// Default file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        let defaults = StoreConfig::default();
        Self::new(dir, defaults.embeddings_file, defaults.metadata_file)
    }

    /// The unversioned pair directly under `dir`.
    pub fn plain_files(&self) -> StoreFiles {
        StoreFiles {
            embeddings: self.dir.join(&self.embeddings_file),
            metadata: self.dir.join(&self.metadata_file),
        }
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT_FILE)
    }

    fn generations_dir(&self) -> PathBuf {
        self.dir.join(GENERATIONS_DIR)
    }

    /// Read the pointer once and return the pair it names, or the plain
    /// pair when nothing has been published.
    fn resolve(&self) -> Result<(StoreFiles, Option<Manifest>)> {
        let path = self.current_path();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((self.plain_files(), None));
            }
            Err(e) => return Err(e.into()),
        };
        let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| {
            ScholarError::CorruptStore(format!("{} is not a valid pointer: {}", path.display(), e))
        })?;
        for name in [&manifest.generation, &manifest.embeddings, &manifest.metadata] {
            if !is_plain_name(name) {
                return Err(ScholarError::CorruptStore(format!(
                    "{} names '{}', which is not a plain file name",
                    path.display(),
                    name
                )));
            }
        }

        let dir = self.generations_dir().join(&manifest.generation);
        let files = StoreFiles {
            embeddings: dir.join(&manifest.embeddings),
            metadata: dir.join(&manifest.metadata),
        };
        Ok((files, Some(manifest)))
    }

    /// Swap the pointer to `manifest` with a single rename.
    fn publish(&self, manifest: &Manifest) -> Result<()> {
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", CURRENT_FILE, Uuid::new_v4().simple()));
        std::fs::write(&tmp, serde_json::to_vec_pretty(manifest)?)?;
        if let Err(e) = std::fs::rename(&tmp, self.current_path()) {
            if let Err(cleanup) = std::fs::remove_file(&tmp) {
                warn!(path = %tmp.display(), error = %cleanup, "Could not remove pointer temp file");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove generations older than the retained window. Never touches
    /// `current` or anything newer, which may belong to a build in flight.
    fn prune(&self, current: &str) {
        let entries = match std::fs::read_dir(self.generations_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not list store generations");
                return;
            }
        };
        let mut older: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.as_str() < current)
            .collect();
        older.sort();

        let excess = older.len().saturating_sub(RETAINED_GENERATIONS);
        for name in &older[..excess] {
            let path = self.generations_dir().join(name);
            match std::fs::remove_dir_all(&path) {
                Ok(()) => debug!(generation = %name, "Pruned store generation"),
                Err(e) => warn!(path = %path.display(), error = %e, "Could not prune store generation"),
            }
        }
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// A row as seen by the ranker.
#[derive(Debug, Clone, Copy)]
pub struct StoreRow<'a> {
    pub index: usize,
    pub vector: &'a [f32],
    /// Precomputed L2 norm of `vector`.
    pub norm: f64,
    pub metadata: &'a RecordMetadata,
}

/// Embedding matrix plus aligned metadata, validated as one unit.
///
/// Immutable after construction, so it can be shared behind an `Arc` and
/// read from any number of threads without locking.
#[derive(Debug)]
pub struct VectorStore {
    dimension: usize,
    vectors: Vec<f32>,
    norms: Vec<f64>,
    records: Vec<RecordMetadata>,
    info: StoreInfo,
}

impl VectorStore {
    /// Load the store published at `paths`.
    ///
    /// Fails with `CorruptStore` when the row counts differ, a record lacks
    /// `id` or `name`, ids repeat, the matrix holds non-finite values, or the
    /// pair disagrees with the pointer that named it.
    pub fn load(paths: &StorePaths) -> Result<Self> {
        let mut attempt = 1;
        loop {
            let (files, manifest) = paths.resolve()?;
            match Self::load_files(&files, manifest.as_ref()) {
                Err(ScholarError::Io(e))
                    if e.kind() == std::io::ErrorKind::NotFound
                        && manifest.is_some()
                        && attempt < RESOLVE_ATTEMPTS =>
                {
                    debug!(attempt, error = %e, "Generation vanished while loading; resolving again");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn load_files(files: &StoreFiles, manifest: Option<&Manifest>) -> Result<Self> {
        let matrix = npy::read_matrix(&files.embeddings)?;

        let bytes = std::fs::read(&files.metadata)?;
        let raw: Vec<RawRecord> = serde_json::from_slice(&bytes).map_err(|e| {
            ScholarError::CorruptStore(format!(
                "metadata {} is not a valid record array: {}",
                files.metadata.display(),
                e
            ))
        })?;
        let records = raw
            .into_iter()
            .enumerate()
            .map(|(i, record)| record.validate(i))
            .collect::<Result<Vec<_>>>()?;

        let store = Self::from_parts(matrix, records)?;
        if let Some(manifest) = manifest {
            if manifest.size != store.size() || manifest.dimension != store.dimension() {
                return Err(ScholarError::CorruptStore(format!(
                    "generation {} holds {}x{} but its pointer records {}x{}",
                    manifest.generation,
                    store.size(),
                    store.dimension(),
                    manifest.size,
                    manifest.dimension
                )));
            }
        }
        info!(
            embeddings = %files.embeddings.display(),
            published = manifest.map(|m| m.generation.as_str()).unwrap_or("plain"),
            size = store.size(),
            dimension = store.dimension(),
            generation = %store.info.generation,
            "Vector store loaded"
        );
        Ok(store)
    }

    /// Build a store from records that each carry their own vector.
    ///
    /// Keeping vector and metadata in one value makes a misaligned store
    /// impossible to construct from this path.
    pub fn from_records(records: Vec<EmbeddingRecord>) -> Result<Self> {
        let dimension = records.first().map(|r| r.vector.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(records.len() * dimension);
        let mut metadata = Vec::with_capacity(records.len());

        for (i, record) in records.into_iter().enumerate() {
            if record.vector.len() != dimension {
                return Err(ScholarError::CorruptStore(format!(
                    "record {} ({}) has dimension {}, expected {}",
                    i,
                    record.metadata.id,
                    record.vector.len(),
                    dimension
                )));
            }
            data.extend_from_slice(&record.vector);
            metadata.push(record.metadata);
        }

        let matrix = Matrix::new(metadata.len(), dimension, data)?;
        Self::from_parts(matrix, metadata)
    }

    fn from_parts(matrix: Matrix, records: Vec<RecordMetadata>) -> Result<Self> {
        if matrix.rows() != records.len() {
            return Err(ScholarError::CorruptStore(format!(
                "{} embedding rows but {} metadata records",
                matrix.rows(),
                records.len()
            )));
        }

        let mut seen = HashSet::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if record.name.trim().is_empty() {
                return Err(ScholarError::CorruptStore(format!(
                    "record {} ({}) has an empty name",
                    i, record.id
                )));
            }
            if !seen.insert(&record.id) {
                return Err(ScholarError::CorruptStore(format!(
                    "duplicate record id {} at index {}",
                    record.id, i
                )));
            }
        }

        let dimension = matrix.cols();
        let vectors = matrix.into_data();
        if let Some(pos) = vectors.iter().position(|v| !v.is_finite()) {
            let row = if dimension == 0 { 0 } else { pos / dimension };
            return Err(ScholarError::CorruptStore(format!(
                "non-finite value in embedding row {}",
                row
            )));
        }

        let norms: Vec<f64> = if dimension == 0 {
            vec![0.0; records.len()]
        } else {
            vectors
                .chunks_exact(dimension)
                .map(|row| row.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt())
                .collect()
        };

        let zero_rows = norms.iter().filter(|n| **n == 0.0).count();
        if zero_rows > 0 {
            debug!(zero_rows, "Store contains zero-norm vectors; they score 0");
        }

        let info = StoreInfo {
            generation: Uuid::new_v4(),
            size: records.len(),
            dimension,
            loaded_at: Utc::now(),
        };

        Ok(Self {
            dimension,
            vectors,
            norms,
            records,
            info,
        })
    }

    /// Publish the store as a new generation under `paths.dir`.
    ///
    /// Both files go into a fresh directory that no reader knows about
    /// yet; the pointer rename is the only step readers can observe. On
    /// failure the previous generation stays published. Returns the files
    /// just written.
    pub fn save(&self, paths: &StorePaths) -> Result<StoreFiles> {
        let generations = paths.generations_dir();
        std::fs::create_dir_all(&generations)?;

        let created_at = Utc::now();
        // Names sort by creation time.
        let generation = format!(
            "{}-{}",
            created_at.format("%Y%m%dT%H%M%S%.9fZ"),
            Uuid::new_v4().simple()
        );
        let dir = generations.join(&generation);
        std::fs::create_dir(&dir)?;

        let files = StoreFiles {
            embeddings: dir.join(&paths.embeddings_file),
            metadata: dir.join(&paths.metadata_file),
        };
        let manifest = Manifest {
            generation: generation.clone(),
            embeddings: paths.embeddings_file.clone(),
            metadata: paths.metadata_file.clone(),
            size: self.size(),
            dimension: self.dimension,
            created_at,
        };

        if let Err(e) = self
            .write_files(&files)
            .and_then(|()| paths.publish(&manifest))
        {
            if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                warn!(path = %dir.display(), error = %cleanup, "Could not remove unpublished generation");
            }
            return Err(e);
        }
        paths.prune(&generation);

        info!(
            dir = %paths.dir.display(),
            generation = %generation,
            size = self.size(),
            "Vector store published"
        );
        Ok(files)
    }

    fn write_files(&self, files: &StoreFiles) -> Result<()> {
        let matrix = Matrix::new(self.size(), self.dimension, self.vectors.clone())?;
        npy::write_matrix(&files.embeddings, &matrix)?;
        std::fs::write(&files.metadata, serde_json::to_vec_pretty(&self.records)?)?;
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn vector_at(&self, i: usize) -> Option<&[f32]> {
        if i >= self.size() {
            return None;
        }
        Some(&self.vectors[i * self.dimension..(i + 1) * self.dimension])
    }

    pub fn metadata_at(&self, i: usize) -> Option<&RecordMetadata> {
        self.records.get(i)
    }

    pub fn records(&self) -> &[RecordMetadata] {
        &self.records
    }

    pub fn info(&self) -> &StoreInfo {
        &self.info
    }

    /// All rows in store order.
    pub fn rows(&self) -> impl Iterator<Item = StoreRow<'_>> + '_ {
        self.records.iter().enumerate().map(move |(index, metadata)| StoreRow {
            index,
            vector: &self.vectors[index * self.dimension..(index + 1) * self.dimension],
            norm: self.norms[index],
            metadata,
        })
    }
}

/// Metadata row as found on disk, before required-field checks.
#[derive(Debug, Deserialize)]
struct RawRecord {
    id: Option<RecordId>,
    name: Option<String>,
    #[serde(default, alias = "faculty_type")]
    category: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "profile_url")]
    profile_link: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl RawRecord {
    fn validate(self, index: usize) -> Result<RecordMetadata> {
        let id = self.id.ok_or_else(|| {
            ScholarError::CorruptStore(format!("record {} is missing 'id'", index))
        })?;
        let name = self.name.ok_or_else(|| {
            ScholarError::CorruptStore(format!("record {} ({}) is missing 'name'", index, id))
        })?;
        let category = match self.category.as_deref().map(str::trim) {
            None => Category::Unclassified,
            Some(raw) => raw.parse::<Category>().map_err(|_| {
                ScholarError::CorruptStore(format!(
                    "record {} ({}) has unknown category '{}'",
                    index, id, raw
                ))
            })?,
        };

        Ok(RecordMetadata {
            id,
            name,
            category,
            email: self.email.filter(|s| !s.trim().is_empty()),
            profile_link: self.profile_link.filter(|s| !s.trim().is_empty()),
            text: self.text.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: i64, name: &str, category: Category) -> RecordMetadata {
        RecordMetadata {
            id: RecordId::from(id),
            name: name.to_string(),
            category,
            email: None,
            profile_link: None,
            text: format!("profile of {}", name),
        }
    }

    fn record(id: i64, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            metadata: meta(id, &format!("Person {}", id), Category::Faculty),
            vector,
        }
    }

    fn write_pair(dir: &Path, rows: usize, cols: usize, metadata_json: &str) -> StorePaths {
        let paths = StorePaths::in_dir(dir);
        let files = paths.plain_files();
        let matrix = Matrix::new(rows, cols, vec![0.5; rows * cols]).unwrap();
        npy::write_matrix(&files.embeddings, &matrix).unwrap();
        std::fs::write(&files.metadata, metadata_json).unwrap();
        paths
    }

    #[test]
    fn test_from_records_keeps_alignment() {
        let store = VectorStore::from_records(vec![
            record(1, vec![1.0, 0.0]),
            record(2, vec![0.0, 1.0]),
        ])
        .unwrap();

        assert_eq!(store.size(), 2);
        assert_eq!(store.dimension(), 2);
        assert_eq!(store.vector_at(1), Some(&[0.0f32, 1.0][..]));
        assert_eq!(store.metadata_at(1).unwrap().id, RecordId::from(2));
        assert!(store.vector_at(2).is_none());
        assert!(store.metadata_at(2).is_none());
    }

    #[test]
    fn test_from_records_rejects_mixed_dimensions() {
        let err = VectorStore::from_records(vec![
            record(1, vec![1.0, 0.0]),
            record(2, vec![1.0, 0.0, 0.0]),
        ])
        .unwrap_err();
        assert!(matches!(err, ScholarError::CorruptStore(_)));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = VectorStore::from_records(vec![record(1, vec![1.0]), record(1, vec![0.5])])
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let err = VectorStore::from_records(vec![record(1, vec![f32::NAN, 1.0])]).unwrap_err();
        assert!(matches!(err, ScholarError::CorruptStore(_)));
    }

    #[test]
    fn test_empty_store() {
        let store = VectorStore::from_records(Vec::new()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.rows().count(), 0);
    }

    #[test]
    fn test_rows_carry_norms() {
        let store = VectorStore::from_records(vec![
            record(1, vec![3.0, 4.0]),
            record(2, vec![0.0, 0.0]),
        ])
        .unwrap();
        let rows: Vec<_> = store.rows().collect();
        assert!((rows[0].norm - 5.0).abs() < 1e-9);
        assert_eq!(rows[1].norm, 0.0);
        assert_eq!(rows[1].metadata.id, RecordId::from(2));
    }

    #[test]
    fn test_load_length_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_pair(
            dir.path(),
            3,
            4,
            r#"[{"id": 1, "name": "A", "category": "faculty", "text": "a"},
                {"id": 2, "name": "B", "category": "adjunct", "text": "b"}]"#,
        );
        let err = VectorStore::load(&paths).unwrap_err();
        assert!(matches!(err, ScholarError::CorruptStore(_)));
        assert!(err.to_string().contains("3 embedding rows but 2 metadata records"));
    }

    #[test]
    fn test_load_missing_name_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_pair(dir.path(), 1, 2, r#"[{"id": 1, "category": "faculty"}]"#);
        let err = VectorStore::load(&paths).unwrap_err();
        assert!(err.to_string().contains("missing 'name'"));
    }

    #[test]
    fn test_load_missing_id_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_pair(dir.path(), 1, 2, r#"[{"name": "A"}]"#);
        assert!(VectorStore::load(&paths)
            .unwrap_err()
            .to_string()
            .contains("missing 'id'"));
    }

    #[test]
    fn test_load_unknown_category_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_pair(dir.path(), 1, 2, r#"[{"id": 1, "name": "A", "category": "visiting"}]"#);
        assert!(matches!(
            VectorStore::load(&paths),
            Err(ScholarError::CorruptStore(_))
        ));
    }

    #[test]
    fn test_load_accepts_original_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_pair(
            dir.path(),
            1,
            2,
            r#"[{"id": 9, "name": "A", "faculty_type": "international_adjunct",
                 "profile_url": "https://example.edu/a", "email": "", "text": "optics"}]"#,
        );
        let store = VectorStore::load(&paths).unwrap();
        let meta = store.metadata_at(0).unwrap();
        assert_eq!(meta.category, Category::InternationalAdjunct);
        assert_eq!(meta.profile_link.as_deref(), Some("https://example.edu/a"));
        assert!(meta.email.is_none());
        assert_eq!(meta.text, "optics");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        assert!(matches!(VectorStore::load(&paths), Err(ScholarError::Io(_))));
    }

    #[test]
    fn test_save_then_load_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::in_dir(&dir.path().join("artifacts"));
        let store = VectorStore::from_records(vec![
            record(10, vec![0.25, -0.5, 1.0]),
            record(20, vec![1.0, 1.0, 0.0]),
        ])
        .unwrap();
        store.save(&paths).unwrap();

        let loaded = VectorStore::load(&paths).unwrap();
        assert_eq!(loaded.size(), 2);
        assert_eq!(loaded.dimension(), 3);
        assert_eq!(loaded.records(), store.records());
        assert_eq!(loaded.vector_at(0), store.vector_at(0));
        assert_ne!(loaded.info().generation, store.info().generation);
        assert!(paths.dir.join(CURRENT_FILE).is_file());
        assert!(!paths.plain_files().embeddings.exists());
    }

    #[test]
    fn test_save_returns_published_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let store = VectorStore::from_records(vec![record(1, vec![1.0, 0.0])]).unwrap();

        let files = store.save(&paths).unwrap();
        assert!(files.embeddings.starts_with(dir.path().join(GENERATIONS_DIR)));
        assert_eq!(files.embeddings.parent(), files.metadata.parent());
        assert_eq!(paths.resolve().unwrap().0, files);
    }

    #[test]
    fn test_pointer_wins_over_plain_pair() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_pair(
            dir.path(),
            1,
            2,
            r#"[{"id": 5, "name": "Stale", "category": "faculty"}]"#,
        );
        VectorStore::from_records(vec![record(1, vec![1.0, 0.0]), record(2, vec![0.0, 1.0])])
            .unwrap()
            .save(&paths)
            .unwrap();

        let loaded = VectorStore::load(&paths).unwrap();
        assert_eq!(loaded.size(), 2);
        assert_eq!(loaded.metadata_at(0).unwrap().id, RecordId::from(1));
    }

    #[test]
    fn test_old_generations_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        for id in 0..6 {
            VectorStore::from_records(vec![record(id, vec![1.0])])
                .unwrap()
                .save(&paths)
                .unwrap();
        }

        let kept = std::fs::read_dir(dir.path().join(GENERATIONS_DIR))
            .unwrap()
            .count();
        assert_eq!(kept, RETAINED_GENERATIONS + 1);
        assert_eq!(
            VectorStore::load(&paths).unwrap().metadata_at(0).unwrap().id,
            RecordId::from(5)
        );
    }

    #[test]
    fn test_pointer_disagreeing_with_pair_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let files = VectorStore::from_records(vec![record(1, vec![1.0]), record(2, vec![0.5])])
            .unwrap()
            .save(&paths)
            .unwrap();
        std::fs::write(
            &files.metadata,
            r#"[{"id": 1, "name": "A", "category": "faculty"}]"#,
        )
        .unwrap();
        let matrix = Matrix::new(1, 1, vec![1.0]).unwrap();
        npy::write_matrix(&files.embeddings, &matrix).unwrap();

        let err = VectorStore::load(&paths).unwrap_err();
        assert!(err.to_string().contains("pointer records 2x1"));
    }

    #[test]
    fn test_pointer_with_path_components_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        std::fs::write(
            dir.path().join(CURRENT_FILE),
            r#"{"generation": "../elsewhere", "embeddings": "e.npy", "metadata": "m.json",
                "size": 0, "dimension": 0, "created_at": "2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(
            VectorStore::load(&paths),
            Err(ScholarError::CorruptStore(_))
        ));
    }

    /// Two builds with the same ids and row count but swapped vectors.
    /// Every row's vector is determined by its text, so any mix of one
    /// build's matrix with the other's metadata shows up as a mismatch.
    fn swapped_build(flip: bool) -> VectorStore {
        let (first, second) = if flip { ("y", "x") } else { ("x", "y") };
        let row = |id: i64, text: &str| EmbeddingRecord {
            metadata: RecordMetadata {
                text: text.to_string(),
                ..meta(id, &format!("Person {}", id), Category::Faculty)
            },
            vector: if text == "x" { vec![1.0, 0.0] } else { vec![0.0, 1.0] },
        };
        VectorStore::from_records(vec![row(1, first), row(2, second)]).unwrap()
    }

    #[test]
    fn test_load_during_concurrent_saves_stays_aligned() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let builds = [swapped_build(false), swapped_build(true)];
        builds[0].save(&paths).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let stop = Arc::clone(&stop);
            let paths = paths.clone();
            std::thread::spawn(move || {
                let mut i = 0;
                while !stop.load(Ordering::Relaxed) {
                    builds[i % 2].save(&paths).unwrap();
                    i += 1;
                }
            })
        };

        let mut loads = 0;
        let mut misaligned = 0;
        for _ in 0..400 {
            let store = match VectorStore::load(&paths) {
                Ok(store) => store,
                // A generation pruned between resolve attempts; never a mixed pair.
                Err(ScholarError::Io(_)) => continue,
                Err(e) => panic!("unexpected load error: {}", e),
            };
            loads += 1;
            for row in store.rows() {
                let expected: &[f32] = if row.metadata.text == "x" {
                    &[1.0, 0.0]
                } else {
                    &[0.0, 1.0]
                };
                if row.vector != expected {
                    misaligned += 1;
                }
            }
        }
        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();

        assert!(loads > 0);
        assert_eq!(misaligned, 0);
    }
}
