//! Folder ingestion: files in, chunks out.
//!
//! Files are parsed in parallel, one blocking task per file. The chunk list
//! is assembled in path order only after every file is done, so the same
//! folder always yields the same corpus.

use crate::chunker::{chunk_id, chunk_text};
use crate::config::PipelineConfig;
use crate::parser::{parse_file, ContentType};
use crate::types::{Chunk, MetadataValue, POSITION_KEY};
use docchat_core::{AppError, AppResult};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl From<&PipelineConfig> for IngestOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

/// What an ingestion run produced.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub chunks: Vec<Chunk>,

    /// Files that produced at least one chunk
    pub files_loaded: Vec<PathBuf>,

    /// Files that failed to parse, with the reason
    pub files_skipped: Vec<(PathBuf, String)>,
}

/// Load and chunk every supported document under `folder`.
pub async fn chunks_from_folder(folder: &Path, options: &IngestOptions) -> AppResult<Vec<Chunk>> {
    Ok(ingest_folder(folder, options).await?.chunks)
}

/// Like [`chunks_from_folder`], also reporting which files were used or skipped.
pub async fn ingest_folder(folder: &Path, options: &IngestOptions) -> AppResult<IngestReport> {
    if !folder.is_dir() {
        return Err(AppError::Ingestion(format!(
            "{} is not a valid directory",
            folder.display()
        )));
    }

    let files = discover_files(folder);
    if files.is_empty() {
        tracing::warn!("No supported documents found in {}", folder.display());
        return Ok(IngestReport::default());
    }

    let handles: Vec<_> = files
        .iter()
        .cloned()
        .map(|path| {
            let options = *options;
            tokio::task::spawn_blocking(move || load_and_chunk(&path, &options))
        })
        .collect();

    let results = futures::future::join_all(handles).await;

    let mut report = IngestReport::default();
    for (path, result) in files.into_iter().zip(results) {
        match result {
            Ok(Ok(chunks)) => {
                if !chunks.is_empty() {
                    report.files_loaded.push(path);
                }
                report.chunks.extend(chunks);
            }
            Ok(Err(e)) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                report.files_skipped.push((path, e.to_string()));
            }
            Err(e) => {
                tracing::error!("Parser task for {} failed: {}", path.display(), e);
                report.files_skipped.push((path, e.to_string()));
            }
        }
    }

    tracing::info!(
        "Loaded and chunked {} chunks from {} files ({} skipped)",
        report.chunks.len(),
        report.files_loaded.len(),
        report.files_skipped.len()
    );

    Ok(report)
}

/// Supported files under `folder`, sorted by path.
fn discover_files(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| ContentType::from_path(p).is_supported())
        .collect();

    files.sort();
    files
}

fn load_and_chunk(path: &Path, options: &IngestOptions) -> AppResult<Vec<Chunk>> {
    let source = path.to_string_lossy();
    let mut chunks: Vec<Chunk> = parse_file(path)?
        .iter()
        .flat_map(|document| {
            chunk_text(
                &source,
                &document.text,
                options.chunk_size,
                options.chunk_overlap,
                &document.metadata,
            )
        })
        .collect();

    // Pages are chunked one at a time; positions run across the whole file.
    for (position, chunk) in chunks.iter_mut().enumerate() {
        chunk.id = chunk_id(&source, position, &chunk.text);
        chunk
            .metadata
            .insert(POSITION_KEY.to_string(), MetadataValue::Integer(position as i64));
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::minimal_pdf;
    use crate::types::{PAGE_KEY, SOURCE_KEY};
    use std::fs;
    use tempfile::TempDir;

    fn small() -> IngestOptions {
        IngestOptions {
            chunk_size: 40,
            chunk_overlap: 10,
        }
    }

    #[tokio::test]
    async fn test_not_a_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, "text").unwrap();

        let err = chunks_from_folder(&file, &small()).await.unwrap_err();
        assert_eq!(err.kind(), "ingestion");
    }

    #[tokio::test]
    async fn test_empty_folder_yields_empty_corpus() {
        let temp = TempDir::new().unwrap();
        let chunks = chunks_from_folder(temp.path(), &small()).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_chunks_are_in_path_order() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.txt"), "second file body").unwrap();
        fs::write(temp.path().join("a.md"), "---\nyear: 2022\n---\nfirst file body").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("sub").join("c.html"), "<p>third file body</p>").unwrap();
        fs::write(temp.path().join("ignored.pptx"), "PK").unwrap();

        let report = ingest_folder(temp.path(), &small()).await.unwrap();
        let texts: Vec<&str> = report.chunks.iter().map(|c| c.text.as_str()).collect();

        assert_eq!(texts, vec!["first file body", "second file body", "third file body"]);
        assert_eq!(report.files_loaded.len(), 3);
        assert_eq!(
            report.chunks[0].metadata.get("year"),
            Some(&MetadataValue::Integer(2022))
        );
        assert!(report.chunks[1]
            .metadata
            .get(SOURCE_KEY)
            .map(|s| s.to_string().ends_with("b.txt"))
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("good.txt"), "readable").unwrap();
        fs::write(temp.path().join("bad.txt"), [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let report = ingest_folder(temp.path(), &small()).await.unwrap();
        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.files_skipped.len(), 1);
        assert!(report.files_skipped[0].0.ends_with("bad.txt"));
    }

    #[tokio::test]
    async fn test_hidden_directories_are_skipped() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".docchat")).unwrap();
        fs::write(temp.path().join(".docchat").join("notes.md"), "internal").unwrap();
        fs::write(temp.path().join("visible.md"), "public").unwrap();

        let chunks = chunks_from_folder(temp.path(), &small()).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "public");
    }

    #[tokio::test]
    async fn test_pdf_pages_become_chunks() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("report.pdf"),
            minimal_pdf(&["Quarterly revenue grew", "Hiring plans for next year"]),
        )
        .unwrap();

        let report = ingest_folder(temp.path(), &small()).await.unwrap();
        assert_eq!(report.files_loaded.len(), 1);
        assert_eq!(report.chunks.len(), 2);

        let pages: Vec<_> = report
            .chunks
            .iter()
            .map(|c| c.metadata.get(PAGE_KEY).cloned())
            .collect();
        assert_eq!(
            pages,
            vec![Some(MetadataValue::Integer(0)), Some(MetadataValue::Integer(1))]
        );

        let positions: Vec<_> = report
            .chunks
            .iter()
            .map(|c| c.metadata.get(POSITION_KEY).cloned())
            .collect();
        assert_eq!(
            positions,
            vec![Some(MetadataValue::Integer(0)), Some(MetadataValue::Integer(1))]
        );
        assert_ne!(report.chunks[0].id, report.chunks[1].id);
        assert!(report.chunks[1].text.contains("Hiring plans"));
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("broken.pdf"), "%PDF-1.4 truncated").unwrap();
        fs::write(temp.path().join("notes.txt"), "plain notes").unwrap();

        let report = ingest_folder(temp.path(), &small()).await.unwrap();
        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.files_skipped.len(), 1);
        assert!(report.files_skipped[0].0.ends_with("broken.pdf"));
    }
}
