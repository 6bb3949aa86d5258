//! All backend logic independent of how the tool is run.
//!
//! Documents stay in the folder the user chooses. The index lives in `.rag_index/`
//! under the working directory (see [store]) and the config in `rag.yaml` next to it.
//!
//! Pipeline: [documents] → [chunks] → [embed] → [vector_index] → [store], driven by
//! [index::build_index]. Queries go through [retrieve] and [chat]. [rebuild] runs
//! rebuilds in the background while queries keep a consistent view of the live index.

pub mod chat;
pub mod chunks;
pub mod config;
pub mod documents;
pub mod embed;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod openai;
pub mod rebuild;
pub mod retrieve;
pub mod store;
pub mod vector_index;
pub mod watcher;

pub use chat::{answer_with_context, format_context, generate_answer, Answer};
pub use chunks::{chunk_document, chunk_documents, Chunk, ChunkError};
pub use config::{load_config, save_config, ConfigError, Provider, RagConfig, CONFIG_FILENAME};
pub use documents::{scan_documents, Document, ScanError};
pub use embed::{embed_query, embed_texts, normalize_text, EmbedError};
pub use index::{build_index, BuildError, BuildStep};
pub use llm::{client_from_config, ChatMessage, LlmClient, LlmError};
pub use rebuild::{
    AskError, QueryError, RebuildCoordinator, RebuildRejected, RebuildState, RebuildStatus,
};
pub use retrieve::{retrieve, DEFAULT_TOP_K};
pub use store::{IndexStore, LoadedIndex, StoreError, INDEX_DIR_NAME};
pub use vector_index::{IndexError, Neighbor, VectorIndex};
pub use watcher::{watch_folder, FolderWatcher, WatchError, DEFAULT_DEBOUNCE};
