//! Discovering and reading documents from a user-chosen folder.
//!
//! Plain text (`.txt`, `.md`) is read as UTF-8; PDFs go through text extraction.
//! Anything else is skipped. A file that fails to read is logged and skipped so one
//! bad file never sinks the whole scan.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A document we found: its path and extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    PlainText,
    Pdf,
}

/// Scans `root` recursively and returns every supported document with non-blank content.
/// Directories whose name is in `ignore_dirs` are pruned at any depth. Entries are
/// visited in file-name order so the result is deterministic for a given tree.
pub fn scan_documents(root: &Path, ignore_dirs: &[String]) -> Result<Vec<Document>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    info!(root = %root.display(), "scanning for documents");
    let mut documents = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored_dir(e, ignore_dirs));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(format) = detect_format(path) else {
            continue;
        };
        match read_document(path, format) {
            Ok(content) if !content.trim().is_empty() => {
                debug!(path = %path.display(), "loaded document");
                documents.push(Document {
                    path: path.to_path_buf(),
                    content,
                });
            }
            Ok(_) => debug!(path = %path.display(), "skipping blank document"),
            Err(e) => warn!(path = %path.display(), error = %e, "could not load document"),
        }
    }
    info!(count = documents.len(), "found supported documents");
    Ok(documents)
}

fn is_ignored_dir(entry: &walkdir::DirEntry, ignore_dirs: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| ignore_dirs.iter().any(|d| d == name))
            .unwrap_or(false)
}

fn detect_format(path: &Path) -> Option<Format> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "txt" | "md" => Some(Format::PlainText),
        "pdf" => Some(Format::Pdf),
        _ => None,
    }
}

fn read_document(path: &Path, format: Format) -> Result<String, ReadError> {
    match format {
        Format::PlainText => {
            let bytes = std::fs::read(path)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Format::Pdf => {
            let bytes = std::fs::read(path)?;
            // pdf-extract panics on some malformed files instead of returning an error.
            std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes))
                .map_err(|_| ReadError::Pdf("extractor panicked".to_string()))?
                .map_err(|e| ReadError::Pdf(e.to_string()))
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ReadError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("pdf extraction failed: {0}")]
    Pdf(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignore() -> Vec<String> {
        vec![".git".to_string(), ".rag_index".to_string()]
    }

    #[test]
    fn not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            scan_documents(&file, &ignore()),
            Err(ScanError::NotADirectory(_))
        ));
    }

    #[test]
    fn reads_supported_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "# Bee").unwrap();
        std::fs::write(dir.path().join("a.TXT"), "ay").unwrap();
        std::fs::write(dir.path().join("c.rs"), "fn main() {}").unwrap();
        let docs = scan_documents(dir.path(), &ignore()).unwrap();
        let names: Vec<_> = docs
            .iter()
            .map(|d| d.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.TXT", "b.md"]);
        assert_eq!(docs[0].content, "ay");
    }

    #[test]
    fn prunes_ignored_dirs_and_blank_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/.git")).unwrap();
        std::fs::write(dir.path().join("sub/.git/HEAD.txt"), "ref").unwrap();
        std::fs::write(dir.path().join("sub/keep.txt"), "kept").unwrap();
        std::fs::write(dir.path().join("blank.txt"), "  \n\t").unwrap();
        let docs = scan_documents(dir.path(), &ignore()).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].path.ends_with("sub/keep.txt"));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bin.txt"), [b'o', b'k', 0xff]).unwrap();
        let docs = scan_documents(dir.path(), &ignore()).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].content.starts_with("ok"));
    }

    #[test]
    fn broken_pdf_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.pdf"), "not a pdf").unwrap();
        std::fs::write(dir.path().join("fine.md"), "fine").unwrap();
        let docs = scan_documents(dir.path(), &ignore()).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].path.ends_with("fine.md"));
    }
}
