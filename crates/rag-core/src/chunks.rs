//! Splits document text into fixed-size overlapping windows for embedding and search.
//! Sizes are counted in characters; a window never splits a code point.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::documents::Document;

/// A window of text from a document, with its source path.
///
/// A chunk's position in the chunk sequence is its identity: the vector at the same
/// position in the index was computed from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: PathBuf,
}

/// Chunk a single document. Blank documents yield no chunks.
pub fn chunk_document(
    document: &Document,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    check_params(chunk_size, overlap)?;
    if document.content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(windows(&document.content, chunk_size, overlap)
        .into_iter()
        .map(|text| Chunk {
            text: text.to_string(),
            source: document.path.clone(),
        })
        .collect())
}

/// Chunk all documents. Returns chunks in document order, then window order.
pub fn chunk_documents(
    documents: &[Document],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    check_params(chunk_size, overlap)?;
    let mut chunks = Vec::new();
    for document in documents {
        chunks.extend(chunk_document(document, chunk_size, overlap)?);
    }
    Ok(chunks)
}

fn check_params(chunk_size: usize, overlap: usize) -> Result<(), ChunkError> {
    if chunk_size == 0 {
        return Err(ChunkError::ZeroSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkError::OverlapTooLarge {
            chunk_size,
            overlap,
        });
    }
    Ok(())
}

/// Windows start at 0 and advance by `chunk_size - overlap` while the start is inside
/// the text. The last window is clamped to the end and may be shorter than `overlap`.
fn windows(text: &str, chunk_size: usize, overlap: usize) -> Vec<&str> {
    // Byte offset of every char boundary, including the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = bounds.len() - 1;
    let stride = chunk_size - overlap;

    let mut out = Vec::with_capacity(len / stride + 1);
    let mut start = 0;
    while start < len {
        let end = (start + chunk_size).min(len);
        out.push(&text[bounds[start]..bounds[end]]);
        start += stride;
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk size must be positive")]
    ZeroSize,
    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn doc(path: &str, content: &str) -> Document {
        Document {
            path: PathBuf::from(path),
            content: content.to_string(),
        }
    }

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn clamps_final_window() {
        let c = chunk_document(&doc("p.txt", "AAAABBBB"), 4, 2).unwrap();
        assert_eq!(texts(&c), vec!["AAAA", "AABB", "BBBB", "BB"]);
        assert!(c.iter().all(|ch| ch.source == PathBuf::from("p.txt")));
    }

    #[test]
    fn short_document_is_one_chunk() {
        let c = chunk_document(&doc("p.txt", "tiny"), 100, 10).unwrap();
        assert_eq!(texts(&c), vec!["tiny"]);
    }

    #[test]
    fn no_overlap_tiles_exactly() {
        let c = chunk_document(&doc("p.txt", "abcdefgh"), 4, 0).unwrap();
        assert_eq!(texts(&c), vec!["abcd", "efgh"]);
    }

    #[test]
    fn blank_document_yields_nothing() {
        assert!(chunk_document(&doc("p.txt", ""), 4, 1).unwrap().is_empty());
        assert!(chunk_document(&doc("p.txt", " \n\t "), 4, 1).unwrap().is_empty());
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(matches!(
            chunk_document(&doc("p.txt", "abc"), 4, 4),
            Err(ChunkError::OverlapTooLarge { .. })
        ));
        assert!(matches!(
            chunk_documents(&[], 0, 0),
            Err(ChunkError::ZeroSize)
        ));
    }

    #[test]
    fn counts_chars_not_bytes() {
        let c = chunk_document(&doc("p.txt", "héllo wörld"), 5, 1).unwrap();
        assert_eq!(texts(&c), vec!["héllo", "o wör", "rld"]);
    }

    #[test]
    fn windows_cover_text_and_overlap_exactly() {
        let text: String = (0..137).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        for (size, overlap) in [(10, 3), (7, 1), (16, 8), (5, 4), (200, 50)] {
            let c = chunk_document(&doc("p.txt", &text), size, overlap).unwrap();
            let stride = size - overlap;

            let mut rebuilt = c[0].text.clone();
            for pair in c.windows(2) {
                let (prev, next) = (&pair[0].text, &pair[1].text);
                let shared = overlap.min(next.chars().count());
                let prev_tail: String = prev.chars().skip(stride).collect();
                let next_head: String = next.chars().take(shared).collect();
                assert_eq!(prev_tail.chars().take(shared).collect::<String>(), next_head);
                rebuilt.extend(next.chars().skip(prev.chars().count() - stride));
            }
            assert_eq!(rebuilt, text, "size={size} overlap={overlap}");
        }
    }

    #[test]
    fn documents_never_merge() {
        let docs = [doc("a.txt", "aaaaaa"), doc("b.txt", "bb")];
        let c = chunk_documents(&docs, 4, 1).unwrap();
        assert_eq!(texts(&c), vec!["aaaa", "aaa", "bb"]);
        assert_eq!(c[1].source, PathBuf::from("a.txt"));
        assert_eq!(c[2].source, PathBuf::from("b.txt"));
    }
}
