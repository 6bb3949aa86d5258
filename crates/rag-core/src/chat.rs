//! Answer generation: format retrieved chunks as context and ask the chat model.

use std::path::Path;

use serde::Serialize;

use crate::chunks::Chunk;
use crate::llm::{ChatMessage, LlmClient, LlmError};

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the following context to answer the user's question. \
If the answer is not contained in the context, say 'I don't know'.";

/// An answer plus the file names it was grounded on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    /// File names of the retrieved chunks, first occurrence order, no repeats.
    pub sources: Vec<String>,
}

/// Each chunk as `Source: ...` / `Content: ...`, separated by a blank line.
pub fn format_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("Source: {}\nContent: {}", c.source.display(), c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Distinct file names of `chunks`, in retrieval order.
pub fn source_names(chunks: &[Chunk]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for chunk in chunks {
        let name = file_name(&chunk.source);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Ask `model` to answer `query` from `context` at temperature 0.
pub async fn generate_answer(
    client: &dyn LlmClient,
    model: &str,
    context: &str,
    query: &str,
) -> Result<String, LlmError> {
    let messages = [
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("Context:\n{context}\n\nQuestion: {query}")),
    ];
    client.chat(model, &messages, 0.0).await
}

/// Generate an answer grounded on `chunks`.
pub async fn answer_with_context(
    client: &dyn LlmClient,
    model: &str,
    chunks: &[Chunk],
    query: &str,
) -> Result<Answer, LlmError> {
    let text = generate_answer(client, model, &format_context(chunks), query).await?;
    Ok(Answer {
        text,
        sources: source_names(chunks),
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::llm::fake::FakeClient;

    fn chunk(text: &str, source: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: PathBuf::from(source),
        }
    }

    #[test]
    fn context_layout() {
        let chunks = [chunk("one", "docs/a.md"), chunk("two", "b.txt")];
        assert_eq!(
            format_context(&chunks),
            "Source: docs/a.md\nContent: one\n\nSource: b.txt\nContent: two"
        );
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn sources_are_file_names_without_repeats() {
        let chunks = [
            chunk("1", "docs/a.md"),
            chunk("2", "other/b.txt"),
            chunk("3", "docs/a.md"),
        ];
        assert_eq!(source_names(&chunks), vec!["a.md", "b.txt"]);
    }

    #[tokio::test]
    async fn question_goes_after_context() {
        let client = FakeClient::default();
        let answer = answer_with_context(&client, "chat-m", &[chunk("x", "a.md")], "why?")
            .await
            .unwrap();
        assert_eq!(
            answer.text,
            "[chat-m] Context:\nSource: a.md\nContent: x\n\nQuestion: why?"
        );
        assert_eq!(answer.sources, vec!["a.md"]);
    }
}
