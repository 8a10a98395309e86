//! Loading knowledge-base documents from a directory.
//!
//! Recognized files:
//!
//! - `*.json`: an array of scraped records `{title, content, url, timestamp, language}`,
//!   one [`Document`] per record;
//! - `*.txt` and `*.md`: one [`Document`] per file.
//!
//! Everything else is ignored. A file that cannot be read or parsed is logged
//! and skipped so one bad file does not block the rest of the corpus.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{error, info};
use walkdir::WalkDir;

use crate::document::{Document, DocumentMetadata};
use crate::error::{RagError, Result};

/// Language assumed for records that do not state one.
pub const DEFAULT_LANGUAGE: &str = "zh";

#[derive(Debug, Deserialize)]
struct ScrapedRecord {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    language: Option<String>,
}

fn is_corpus_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json" || ext == "txt" || ext == "md")
}

/// Every corpus file under `dir`, sorted by path.
fn discover(dir: &Path) -> Vec<PathBuf> {
    let mut files = WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_corpus_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();
    files.sort();
    files
}

fn relative_id(dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(dir).unwrap_or(path);
    relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

fn load_records(dir: &Path, path: &Path) -> Result<Vec<Document>> {
    let bytes = fs::read(path).map_err(|e| RagError::io(path, e))?;
    let records: Vec<ScrapedRecord> = serde_json::from_slice(&bytes)?;
    let file_id = relative_id(dir, path);
    let fallback_source = path.display().to_string();

    Ok(records
        .into_iter()
        .enumerate()
        .map(|(i, record)| Document {
            id: format!("{file_id}#{i}"),
            content: format!("Title: {}\n\nContent: {}", record.title, record.content),
            metadata: DocumentMetadata {
                source: record
                    .url
                    .filter(|url| !url.is_empty())
                    .unwrap_or_else(|| fallback_source.clone()),
                title: record.title,
                timestamp: record.timestamp,
                language: record.language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            },
        })
        .collect())
}

fn load_text(dir: &Path, path: &Path) -> Result<Document> {
    let content = fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
    let title = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    Ok(Document::new(relative_id(dir, path), content)
        .with_source(path.display().to_string())
        .with_title(title))
}

/// Load every recognized document under `dir`, visiting files in sorted order.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if `dir` is not a directory. Individual
/// file failures are logged and skipped.
pub fn load_corpus(dir: impl AsRef<Path>) -> Result<Vec<Document>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(RagError::ConfigError(format!(
            "corpus directory {} does not exist",
            dir.display()
        )));
    }

    let mut documents = Vec::new();
    for path in discover(dir) {
        let loaded = if path.extension().is_some_and(|ext| ext == "json") {
            load_records(dir, &path)
        } else {
            load_text(dir, &path).map(|doc| vec![doc])
        };

        match loaded {
            Ok(docs) => {
                info!(path = %path.display(), documents = docs.len(), "loaded corpus file");
                documents.extend(docs);
            }
            Err(e) => error!(path = %path.display(), error = %e, "skipping unreadable corpus file"),
        }
    }

    info!(dir = %dir.display(), documents = documents.len(), "corpus loaded");
    Ok(documents)
}
