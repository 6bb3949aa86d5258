//! Top-k retrieval for a question. Best effort: any failure yields no context.

use tracing::{debug, warn};

use crate::chunks::Chunk;
use crate::embed::embed_query;
use crate::llm::LlmClient;
use crate::store::LoadedIndex;

pub const DEFAULT_TOP_K: usize = 5;

/// Returns up to `k` chunks nearest to `query`, nearest first. Embedding or search
/// failures are logged and produce an empty list; answering without context is an
/// acceptable degraded result.
pub async fn retrieve(
    client: &dyn LlmClient,
    query: &str,
    loaded: &LoadedIndex,
    embed_model: &str,
    k: usize,
) -> Vec<Chunk> {
    let vector = match embed_query(client, query, embed_model).await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "retrieval: embedding the query failed");
            return Vec::new();
        }
    };
    let hits = match loaded.index.search(&vector, k) {
        Ok(hits) => hits,
        Err(e) => {
            warn!(error = %e, "retrieval: search failed");
            return Vec::new();
        }
    };
    let chunks: Vec<Chunk> = hits
        .iter()
        .filter_map(|hit| loaded.chunks.get(hit.position).cloned())
        .collect();
    debug!(found = chunks.len(), k, "retrieval done");
    chunks
}
