//! Index pipeline: scan → chunk → embed → build → persist → reload.
//!
//! Nothing touches disk until the full vector/chunk pair is in memory, so a failure
//! anywhere before the persist step leaves the previous index files as they were.

use std::fmt;
use std::path::PathBuf;

use tracing::info;

use crate::chunks::{chunk_documents, ChunkError};
use crate::config::RagConfig;
use crate::documents::{scan_documents, ScanError};
use crate::embed::{embed_texts, EmbedError, EmbedProgress};
use crate::llm::LlmClient;
use crate::store::{IndexStore, LoadedIndex, StoreError};
use crate::vector_index::{IndexError, VectorIndex};

/// Where a build currently is. Displayed as the rebuild status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    Scanning { folder: PathBuf },
    Chunking { documents: usize },
    Embedding { done: usize, total: usize },
    Persisting,
    Reloading,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::Scanning { folder } => write!(f, "Scanning files in {}...", folder.display()),
            BuildStep::Chunking { documents } => write!(f, "Chunking {documents} documents..."),
            BuildStep::Embedding { done, total } => {
                write!(f, "Embedding and indexing ({done}/{total})...")
            }
            BuildStep::Persisting => f.write_str("Saving index..."),
            BuildStep::Reloading => f.write_str("Reloading index..."),
        }
    }
}

/// Receives every step change of a build.
pub type BuildProgress<'a> = &'a (dyn Fn(BuildStep) + Send + Sync);

/// Runs the full pipeline against `config.folder_path` and returns the pair as reloaded
/// from disk.
pub async fn build_index(
    config: &RagConfig,
    client: &dyn LlmClient,
    store: &IndexStore,
    progress: Option<BuildProgress<'_>>,
) -> Result<LoadedIndex, BuildError> {
    let report = |step: BuildStep| {
        info!(step = %step, "build step");
        if let Some(progress) = progress {
            progress(step);
        }
    };

    let folder = config.folder_path.clone();
    report(BuildStep::Scanning {
        folder: folder.clone(),
    });
    let ignore_dirs = config.ignore_dirs.clone();
    let scan_root = folder.clone();
    let documents =
        tokio::task::spawn_blocking(move || scan_documents(&scan_root, &ignore_dirs)).await??;
    if documents.is_empty() {
        return Err(BuildError::NoDocuments(folder));
    }

    report(BuildStep::Chunking {
        documents: documents.len(),
    });
    let chunks = chunk_documents(&documents, config.chunk_size, config.overlap)?;
    if chunks.is_empty() {
        return Err(BuildError::NoChunks);
    }
    info!(chunks = chunks.len(), "created chunks");

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let total = texts.len();
    report(BuildStep::Embedding { done: 0, total });
    let on_embedded: EmbedProgress<'_> = &|done, total| {
        if let Some(progress) = progress {
            progress(BuildStep::Embedding { done, total });
        }
    };
    let vectors = embed_texts(client, &texts, &config.embedding_model, Some(on_embedded)).await?;
    let index = VectorIndex::build(&vectors)?;
    let loaded = LoadedIndex::new(index, chunks)?;

    report(BuildStep::Persisting);
    let persist_store = store.clone();
    tokio::task::spawn_blocking(move || persist_store.persist(&loaded)).await??;

    report(BuildStep::Reloading);
    let load_store = store.clone();
    tokio::task::spawn_blocking(move || load_store.load())
        .await??
        .ok_or(BuildError::Vanished)
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("no valid documents found in {0}")]
    NoDocuments(PathBuf),
    #[error("documents produced no chunks")]
    NoChunks,
    #[error("chunking error: {0}")]
    Chunk(#[from] ChunkError),
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("index files disappeared right after being written")]
    Vanished,
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::llm::fake::FakeClient;

    fn config_for(folder: &std::path::Path) -> RagConfig {
        let mut config = RagConfig::new(folder);
        config.chunk_size = 4;
        config.overlap = 2;
        config
    }

    #[tokio::test]
    async fn builds_persists_and_reloads() {
        let docs = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        std::fs::write(docs.path().join("p.txt"), "AAAABBBB").unwrap();
        let store = IndexStore::new(work.path());
        let steps = Mutex::new(Vec::new());
        let record: BuildProgress<'_> = &|step| steps.lock().unwrap().push(step);

        let loaded = build_index(
            &config_for(docs.path()),
            &FakeClient::default(),
            &store,
            Some(record),
        )
        .await
        .unwrap();

        let texts: Vec<_> = loaded.chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["AAAA", "AABB", "BBBB", "BB"]);
        assert_eq!(loaded.index.len(), 4);
        assert_eq!(loaded.index.vector(1).unwrap(), &[4.0, 2.0, 2.0]);
        assert!(store.exists());

        let steps = steps.into_inner().unwrap();
        assert!(matches!(steps[0], BuildStep::Scanning { .. }));
        assert_eq!(steps[1], BuildStep::Chunking { documents: 1 });
        assert!(steps.contains(&BuildStep::Embedding { done: 4, total: 4 }));
        assert_eq!(steps.last(), Some(&BuildStep::Reloading));
    }

    #[tokio::test]
    async fn empty_folder_is_no_documents() {
        let docs = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let store = IndexStore::new(work.path());
        let err = build_index(&config_for(docs.path()), &FakeClient::default(), &store, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::NoDocuments(_)));
        assert!(!store.dir().exists());
    }

    #[tokio::test]
    async fn embedding_failure_leaves_old_files() {
        let docs = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        std::fs::write(docs.path().join("p.txt"), "AAAABBBB").unwrap();
        let store = IndexStore::new(work.path());
        build_index(&config_for(docs.path()), &FakeClient::default(), &store, None)
            .await
            .unwrap();
        let before = std::fs::read(store.meta_path()).unwrap();

        std::fs::write(docs.path().join("q.txt"), "CCCC").unwrap();
        let failing = FakeClient {
            fail_on: vec!["CCCC".to_string()],
            ..FakeClient::default()
        };
        let err = build_index(&config_for(docs.path()), &failing, &store, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Embed(_)));
        assert_eq!(std::fs::read(store.meta_path()).unwrap(), before);
    }

    #[tokio::test]
    async fn missing_folder_is_scan_error() {
        let work = tempfile::tempdir().unwrap();
        let store = IndexStore::new(work.path());
        let config = config_for(&work.path().join("nope"));
        let err = build_index(&config, &FakeClient::default(), &store, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Scan(ScanError::NotADirectory(_))));
    }

    #[test]
    fn step_messages() {
        assert_eq!(
            BuildStep::Embedding { done: 3, total: 9 }.to_string(),
            "Embedding and indexing (3/9)..."
        );
        assert_eq!(BuildStep::Reloading.to_string(), "Reloading index...");
    }
}
