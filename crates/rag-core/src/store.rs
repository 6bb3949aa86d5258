//! On-disk index: a binary vector file plus a JSON array of chunks, same length and order.
//!
//! Both files live in `.rag_index/` under the working directory. The vector file header
//! carries a blake3 digest of the metadata bytes written with it, so a load only ever
//! returns a matched pair. A missing file or a digest from another generation means
//! there is no index.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::chunks::Chunk;
use crate::vector_index::{IndexError, VectorIndex, DIGEST_LEN};

pub const INDEX_DIR_NAME: &str = ".rag_index";
pub const INDEX_FILE: &str = "vectors.index";
pub const META_FILE: &str = "metadata.json";

/// A vector index together with the chunks it was built from. Row `i` of `index`
/// is the embedding of `chunks[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedIndex {
    pub index: VectorIndex,
    pub chunks: Vec<Chunk>,
}

impl LoadedIndex {
    /// Pairs an index with its chunks; the counts must agree.
    pub fn new(index: VectorIndex, chunks: Vec<Chunk>) -> Result<Self, StoreError> {
        if index.len() != chunks.len() {
            return Err(StoreError::Mismatch {
                vectors: index.len(),
                chunks: chunks.len(),
            });
        }
        Ok(Self { index, chunks })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Location of the persisted index pair.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    /// Store under `<base_dir>/.rag_index/`.
    pub fn new(base_dir: &Path) -> Self {
        Self {
            dir: base_dir.join(INDEX_DIR_NAME),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    /// True when both files of the pair are present.
    pub fn exists(&self) -> bool {
        self.index_path().is_file() && self.meta_path().is_file()
    }

    /// Write both files. Each is written to a temporary sibling first and then renamed
    /// over the old one, so readers never see a half-written file. A crash between the
    /// two renames leaves a vector file whose digest doesn't match the metadata, which
    /// [`IndexStore::load`] treats as no index.
    pub fn persist(&self, loaded: &LoadedIndex) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io(self.dir.clone(), e))?;
        let meta = serde_json::to_vec(&loaded.chunks)?;
        let index_tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));
        let meta_tmp = self.dir.join(format!("{META_FILE}.tmp"));
        write(&index_tmp, &loaded.index.to_bytes(&metadata_digest(&meta)))?;
        write(&meta_tmp, &meta)?;
        rename(&index_tmp, &self.index_path())?;
        rename(&meta_tmp, &self.meta_path())?;
        info!(
            dir = %self.dir.display(),
            chunks = loaded.len(),
            dimension = loaded.index.dimension(),
            "index persisted"
        );
        Ok(())
    }

    /// Load the pair. `Ok(None)` if either file is missing or the two come from different
    /// writes; an error if they fail to parse.
    pub fn load(&self) -> Result<Option<LoadedIndex>, StoreError> {
        let index_path = self.index_path();
        let meta_path = self.meta_path();
        if !index_path.is_file() || !meta_path.is_file() {
            if index_path.is_file() != meta_path.is_file() {
                warn!(dir = %self.dir.display(), "index directory holds only half of a pair, ignoring it");
            }
            return Ok(None);
        }
        let bytes = std::fs::read(&index_path).map_err(|e| StoreError::Io(index_path, e))?;
        let (index, companion) = VectorIndex::from_bytes(&bytes)?;
        let meta = std::fs::read(&meta_path).map_err(|e| StoreError::Io(meta_path, e))?;
        if companion != metadata_digest(&meta) {
            warn!(
                dir = %self.dir.display(),
                "vector and metadata files are from different writes, ignoring them"
            );
            return Ok(None);
        }
        let chunks: Vec<Chunk> = serde_json::from_slice(&meta)?;
        let loaded = LoadedIndex::new(index, chunks)?;
        info!(chunks = loaded.len(), "index loaded");
        Ok(Some(loaded))
    }
}

fn metadata_digest(meta: &[u8]) -> [u8; DIGEST_LEN] {
    *blake3::hash(meta).as_bytes()
}

fn write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    std::fs::write(path, bytes).map_err(|e| StoreError::Io(path.to_path_buf(), e))
}

fn rename(from: &Path, to: &Path) -> Result<(), StoreError> {
    std::fs::rename(from, to).map_err(|e| StoreError::Io(to.to_path_buf(), e))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("index has {vectors} vectors but metadata has {chunks} chunks")]
    Mismatch { vectors: usize, chunks: usize },
}
