//! Document ingestion pipeline.
//!
//! Normalizes heterogeneous raw inputs (picked files, dropped folders,
//! pasted URLs) into uniform [`Document`] records. Ingestion never
//! deduplicates: re-adding the same file yields a second record with a
//! fresh id.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use futures::future::{BoxFuture, FutureExt, join_all};
use tracing::warn;

use crate::ids::DocumentId;
use crate::project::model::{Document, DocumentKind};

/// MIME type tag carried by link documents.
pub const LINK_MIME_TYPE: &str = "text/uri-list";

/// A raw file handle from a picker or a drop event.
#[derive(Clone, Debug)]
pub struct RawFile {
    /// File name as presented by the picker.
    pub name: String,
    /// Location of the bytes on disk.
    pub path: PathBuf,
}

impl RawFile {
    /// Build a handle from a path, taking the file name from its last
    /// component.
    #[must_use]
    pub fn from_path(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, path }
    }
}

/// One entry of a drag-and-drop payload.
#[derive(Clone, Debug)]
pub enum DropEntry {
    /// A plain file.
    File(PathBuf),
    /// A directory to expand recursively.
    Directory(PathBuf),
}

/// Convert a batch of raw files into documents.
///
/// Hidden files (name starting with `.`) are filtered out and the batch is
/// capped at `max_files`; the remainder is silently dropped as a safety
/// bound. File bytes are read concurrently and base64-encoded. A read
/// failure skips that one file and never aborts the batch.
pub async fn ingest_files(files: Vec<RawFile>, max_files: usize) -> Vec<Document> {
    let batch: Vec<RawFile> = files
        .into_iter()
        .filter(|f| !f.name.starts_with('.'))
        .take(max_files)
        .collect();

    let reads = batch.into_iter().map(|file| async move {
        match tokio::fs::read(&file.path).await {
            Ok(bytes) => Some(Document {
                id: DocumentId::new(),
                kind: DocumentKind::File,
                mime_type: mime_for_name(&file.name).to_string(),
                size: bytes.len() as u64,
                data: BASE64_STANDARD.encode(bytes),
                name: file.name,
            }),
            Err(err) => {
                warn!("Skipping unreadable file {}: {err}", file.path.display());
                None
            }
        }
    });

    join_all(reads).await.into_iter().flatten().collect()
}

/// Expand drag-and-drop entries into a flat file list.
///
/// Directories are walked recursively with unbounded depth; each directory's
/// children are listed concurrently with its siblings. Unreadable
/// directories are skipped with a warning.
pub async fn expand_dropped(entries: Vec<DropEntry>) -> Vec<RawFile> {
    let expansions = entries.into_iter().map(expand_entry);
    join_all(expansions)
        .await
        .into_iter()
        .flatten()
        .collect()
}

fn expand_entry(entry: DropEntry) -> BoxFuture<'static, Vec<RawFile>> {
    async move {
        match entry {
            DropEntry::File(path) => vec![RawFile::from_path(path)],
            DropEntry::Directory(path) => {
                let children = match list_dir(&path).await {
                    Ok(children) => children,
                    Err(err) => {
                        warn!("Skipping unreadable directory {}: {err}", path.display());
                        return Vec::new();
                    }
                };
                expand_dropped(children).await
            }
        }
    }
    .boxed()
}

async fn list_dir(path: &PathBuf) -> std::io::Result<Vec<DropEntry>> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(path).await?;
    while let Some(entry) = reader.next_entry().await? {
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            entries.push(DropEntry::Directory(entry.path()));
        } else {
            entries.push(DropEntry::File(entry.path()));
        }
    }
    Ok(entries)
}

/// Build a link document from a pasted URL.
///
/// The input is trimmed and `https://` is prepended when no scheme is
/// present. Links carry no payload bytes: `size` is 0 and `data` holds the
/// normalized URL itself.
#[must_use]
pub fn make_link(raw: &str) -> Document {
    let trimmed = raw.trim();
    let url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    Document {
        id: DocumentId::new(),
        kind: DocumentKind::Link,
        name: url.clone(),
        mime_type: LINK_MIME_TYPE.to_string(),
        data: url,
        size: 0,
    }
}

/// Guess a MIME type from the file extension.
fn mime_for_name(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or_default().to_lowercase();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "csv" => "text/csv",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> RawFile {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        RawFile::from_path(path)
    }

    #[tokio::test]
    async fn test_batch_capped_at_fifty() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<RawFile> = (0..60)
            .map(|i| write_file(dir.path(), &format!("doc{i}.txt"), b"body"))
            .collect();
        let docs = ingest_files(files, 50).await;
        assert_eq!(docs.len(), 50);
    }

    #[tokio::test]
    async fn test_hidden_files_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = vec![write_file(dir.path(), ".env", b"secret")];
        for i in 0..3 {
            files.push(write_file(dir.path(), &format!("note{i}.md"), b"text"));
        }
        let docs = ingest_files(files, 50).await;
        assert_eq!(docs.len(), 3);
        assert!(docs.iter().all(|d| !d.name.starts_with('.')));
    }

    #[tokio::test]
    async fn test_read_failure_skips_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let ok = write_file(dir.path(), "kept.txt", b"kept");
        let missing = RawFile {
            name: "gone.txt".to_string(),
            path: dir.path().join("gone.txt"),
        };
        let docs = ingest_files(vec![missing, ok], 50).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "kept.txt");
    }

    #[tokio::test]
    async fn test_base64_roundtrip_exact() {
        let dir = tempfile::tempdir().unwrap();
        let bytes: Vec<u8> = (0..1024 * 1024_u32).map(|i| (i % 251) as u8).collect();
        let file = write_file(dir.path(), "big.bin", &bytes);
        let docs = ingest_files(vec![file], 50).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].size, bytes.len() as u64);
        let decoded = BASE64_STANDARD.decode(&docs[0].data).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[tokio::test]
    async fn test_dropped_tree_flattens_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("a/mid.txt"), b"2").unwrap();
        std::fs::write(nested.join("deep.txt"), b"3").unwrap();

        let files = expand_dropped(vec![
            DropEntry::File(dir.path().join("top.txt")),
            DropEntry::Directory(dir.path().join("a")),
        ])
        .await;
        let mut names: Vec<String> = files.into_iter().map(|f| f.name).collect();
        names.sort();
        assert_eq!(names, vec!["deep.txt", "mid.txt", "top.txt"]);
    }

    #[test]
    fn test_link_gets_default_scheme() {
        let doc = make_link("  example.com/x ");
        assert_eq!(doc.data, "https://example.com/x");
        assert_eq!(doc.kind, DocumentKind::Link);
        assert_eq!(doc.size, 0);
        assert_eq!(doc.mime_type, LINK_MIME_TYPE);

        let kept = make_link("http://example.org");
        assert_eq!(kept.data, "http://example.org");
    }
}
