//! Turns an ordered list of texts into an ordered list of vectors.
//!
//! Vector `i` belongs to text `i`, and the index relies on that. So a failure on any
//! single text fails the whole call; callers never see a partial list.

use tracing::{debug, info};

use crate::llm::{LlmClient, LlmError};

/// Called with `(embedded_so_far, total)` after each text.
pub type EmbedProgress<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Embedding services treat line breaks as tokens; collapse them to spaces.
pub fn normalize_text(text: &str) -> String {
    text.replace('\n', " ")
}

/// Embed `texts` one at a time, in order. Every vector must have the dimension of the
/// first one.
pub async fn embed_texts(
    client: &dyn LlmClient,
    texts: &[String],
    model: &str,
    progress: Option<EmbedProgress<'_>>,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let total = texts.len();
    info!(total, model, "embedding texts");
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(total);
    for (position, text) in texts.iter().enumerate() {
        let vector = client
            .embed(model, &normalize_text(text))
            .await
            .map_err(|source| EmbedError::Item { position, source })?;
        if vector.is_empty() {
            return Err(EmbedError::EmptyVector { position });
        }
        if let Some(first) = vectors.first() {
            if vector.len() != first.len() {
                return Err(EmbedError::DimensionMismatch {
                    position,
                    expected: first.len(),
                    actual: vector.len(),
                });
            }
        }
        vectors.push(vector);
        if let Some(progress) = progress {
            progress(position + 1, total);
        }
        if (position + 1) % 10 == 0 {
            debug!(done = position + 1, total, "embedding progress");
        }
    }
    Ok(vectors)
}

/// Embed a single query the same way chunks are embedded.
pub async fn embed_query(
    client: &dyn LlmClient,
    query: &str,
    model: &str,
) -> Result<Vec<f32>, EmbedError> {
    let vector = client
        .embed(model, &normalize_text(query))
        .await
        .map_err(|source| EmbedError::Item {
            position: 0,
            source,
        })?;
    if vector.is_empty() {
        return Err(EmbedError::EmptyVector { position: 0 });
    }
    Ok(vector)
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding text #{position} failed: {source}")]
    Item {
        position: usize,
        #[source]
        source: LlmError,
    },
    #[error("embedding for text #{position} is empty")]
    EmptyVector { position: usize },
    #[error("embedding for text #{position} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },
}
