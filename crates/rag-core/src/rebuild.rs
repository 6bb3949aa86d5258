//! Background rebuilds against a live index.
//!
//! [`RebuildCoordinator`] owns the one shared resource: the live `(index, chunks)` pair.
//! Readers take an `Arc` snapshot of it. A rebuild works on its own copy and swaps the
//! `Arc` only after the new pair has been persisted and reloaded, so a failed rebuild
//! leaves the previous index in service untouched.
//!
//! State machine:
//!
//! ```text
//! Idle ──start──> Running ──ok──> Success
//!                    │    ──err─> Error
//! Success | Error | Idle ──start──> Running
//! Running ──start──> rejected (AlreadyRunning)
//! ```
//!
//! While `Running`, queries are refused with [`QueryError::Busy`] instead of being
//! served next to an in-flight swap.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chat::{answer_with_context, Answer};
use crate::chunks::Chunk;
use crate::config::RagConfig;
use crate::index::{build_index, BuildProgress, BuildStep};
use crate::llm::{LlmClient, LlmError};
use crate::retrieve::retrieve;
use crate::store::{IndexStore, LoadedIndex, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildState {
    Idle,
    Running,
    Success,
    Error,
}

/// Current state plus a human-readable progress or outcome message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildStatus {
    pub state: RebuildState,
    pub message: String,
}

impl Default for RebuildStatus {
    fn default() -> Self {
        Self {
            state: RebuildState::Idle,
            message: "No rebuild has run in this session.".to_string(),
        }
    }
}

/// Shared handle; clones refer to the same state.
#[derive(Clone)]
pub struct RebuildCoordinator {
    shared: Arc<Shared>,
}

struct Shared {
    client: Arc<dyn LlmClient>,
    store: IndexStore,
    config: RwLock<RagConfig>,
    live: RwLock<Option<Arc<LoadedIndex>>>,
    status: Mutex<RebuildStatus>,
}

impl Shared {
    fn set_progress(&self, message: String) {
        let mut status = self.status.lock();
        if status.state == RebuildState::Running {
            status.message = message;
        }
    }

    fn finish(&self, state: RebuildState, message: String) {
        *self.status.lock() = RebuildStatus { state, message };
    }
}

impl RebuildCoordinator {
    pub fn new(config: RagConfig, client: Arc<dyn LlmClient>, store: IndexStore) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                store,
                config: RwLock::new(config),
                live: RwLock::new(None),
                status: Mutex::new(RebuildStatus::default()),
            }),
        }
    }

    /// Loads the persisted index, if any, as the live one. Returns whether one was found.
    pub fn load_existing(&self) -> Result<bool, StoreError> {
        let loaded = self.shared.store.load()?;
        let found = loaded.is_some();
        *self.shared.live.write() = loaded.map(Arc::new);
        Ok(found)
    }

    pub fn config(&self) -> RagConfig {
        self.shared.config.read().clone()
    }

    pub fn store(&self) -> &IndexStore {
        &self.shared.store
    }

    pub fn status(&self) -> RebuildStatus {
        self.shared.status.lock().clone()
    }

    /// Number of chunks in the live index, if there is one.
    pub fn indexed_chunks(&self) -> Option<usize> {
        self.shared.live.read().as_ref().map(|l| l.len())
    }

    /// Starts a rebuild in the background, optionally against a different folder.
    /// Rejected while another rebuild is running or when called outside a Tokio runtime.
    /// The returned handle completes when the rebuild reaches a terminal state.
    pub fn start_rebuild(
        &self,
        folder: Option<PathBuf>,
    ) -> Result<JoinHandle<()>, RebuildRejected> {
        let runtime = Handle::try_current().map_err(|_| RebuildRejected::NoRuntime)?;
        {
            let mut status = self.shared.status.lock();
            if status.state == RebuildState::Running {
                return Err(RebuildRejected::AlreadyRunning);
            }
            *status = RebuildStatus {
                state: RebuildState::Running,
                message: "Starting rebuild...".to_string(),
            };
        }

        let mut config = self.config();
        if let Some(folder) = &folder {
            config.folder_path = folder.clone();
        }
        info!(folder = %config.folder_path.display(), "rebuild accepted");
        let shared = self.shared.clone();
        Ok(runtime.spawn(run_rebuild(shared, config, folder)))
    }

    /// The live index for a query. Refused while a rebuild runs or before any index exists.
    pub fn snapshot(&self) -> Result<Arc<LoadedIndex>, QueryError> {
        if self.shared.status.lock().state == RebuildState::Running {
            return Err(QueryError::Busy);
        }
        self.shared
            .live
            .read()
            .clone()
            .ok_or(QueryError::NotInitialized)
    }

    /// Chunks nearest to `query` from the live index.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>, QueryError> {
        let loaded = self.snapshot()?;
        let config = self.config();
        Ok(retrieve(
            self.shared.client.as_ref(),
            query,
            &loaded,
            &config.embedding_model,
            config.top_k,
        )
        .await)
    }

    /// Retrieve context for `query` and generate an answer from it.
    pub async fn ask(&self, query: &str) -> Result<Answer, AskError> {
        let chunks = self.retrieve(query).await?;
        let chat_model = self.shared.config.read().chat_model.clone();
        Ok(answer_with_context(self.shared.client.as_ref(), &chat_model, &chunks, query).await?)
    }
}

async fn run_rebuild(shared: Arc<Shared>, config: RagConfig, new_folder: Option<PathBuf>) {
    // The build runs as its own task so a panic inside it still ends in `Error`.
    let task_shared = shared.clone();
    let build = tokio::spawn(async move {
        let report = |step: BuildStep| task_shared.set_progress(step.to_string());
        let progress: BuildProgress<'_> = &report;
        build_index(
            &config,
            task_shared.client.as_ref(),
            &task_shared.store,
            Some(progress),
        )
        .await
    });

    match build.await {
        Ok(Ok(loaded)) => {
            let chunks = loaded.len();
            // Swap before publishing `Success` so no reader sees the old pair afterwards.
            *shared.live.write() = Some(Arc::new(loaded));
            if let Some(folder) = new_folder {
                shared.config.write().folder_path = folder;
            }
            info!(chunks, "rebuild succeeded");
            shared.finish(
                RebuildState::Success,
                format!("Rebuild complete: {chunks} chunks indexed."),
            );
        }
        Ok(Err(e)) => {
            warn!(error = %e, "rebuild failed; keeping the previous index");
            shared.finish(RebuildState::Error, format!("Rebuild failed: {e}"));
        }
        Err(e) => {
            warn!(error = %e, "rebuild task died; keeping the previous index");
            shared.finish(RebuildState::Error, format!("Rebuild aborted: {e}"));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RebuildRejected {
    #[error("a rebuild is already in progress")]
    AlreadyRunning,
    #[error("rebuilds need an async runtime")]
    NoRuntime,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("no index has been built yet; run `rag rebuild` first")]
    NotInitialized,
    #[error("the index is being rebuilt; try again shortly")]
    Busy,
}

#[derive(Debug, thiserror::Error)]
pub enum AskError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("answer generation failed: {0}")]
    Llm(#[from] LlmError),
}
