//! Source file parsing and text extraction.

use crate::types::{MetadataMap, MetadataValue, PAGE_KEY};
use docchat_core::{AppError, AppResult};
use std::fs;
use std::path::Path;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    PlainText,
    Pdf,
    Unsupported,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            Some("txt") => Self::PlainText,
            Some("pdf") => Self::Pdf,
            _ => Self::Unsupported,
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::PlainText => "text",
            Self::Pdf => "pdf",
            Self::Unsupported => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// Clean text and document-level attributes of one file.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub text: String,
    pub metadata: MetadataMap,
}

/// Parse a source file and extract clean text.
///
/// Text formats yield one document. PDFs yield one document per page that
/// has text, each tagged with its zero-based `page`. Markdown files may start
/// with a YAML front matter block whose scalar entries become document
/// metadata.
pub fn parse_file(path: &Path) -> AppResult<Vec<ParsedDocument>> {
    let content_type = ContentType::from_path(path);
    match content_type {
        ContentType::Unsupported => Err(AppError::Ingestion(format!(
            "Unsupported file type: {:?}",
            path
        ))),
        ContentType::Pdf => parse_pdf(path),
        _ => parse_text_file(path, content_type).map(|doc| vec![doc]),
    }
}

fn parse_text_file(path: &Path, content_type: ContentType) -> AppResult<ParsedDocument> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Ingestion(format!("Failed to read {:?}: {}", path, e)))?;

    if raw.contains('\0') {
        return Err(AppError::Ingestion(format!(
            "Binary content in {:?}",
            path
        )));
    }

    let document = match content_type {
        ContentType::Markdown => {
            let (metadata, body) = split_front_matter(&raw, path);
            ParsedDocument {
                text: clean_markdown(body),
                metadata,
            }
        }
        ContentType::Html => ParsedDocument {
            text: clean_html(&raw),
            metadata: MetadataMap::new(),
        },
        _ => ParsedDocument {
            text: raw.trim().to_string(),
            metadata: MetadataMap::new(),
        },
    };

    Ok(document)
}

/// Extract the text layer of every page.
///
/// Scanned pages without a text layer come back empty and are dropped.
fn parse_pdf(path: &Path) -> AppResult<Vec<ParsedDocument>> {
    let mut pdf = pdf_oxide::PdfDocument::open(path).map_err(|e| pdf_error(path, e))?;
    let page_count = pdf.page_count().map_err(|e| pdf_error(path, e))?;

    let mut pages = Vec::with_capacity(page_count);
    for index in 0..page_count {
        let raw = pdf.extract_text(index).map_err(|e| pdf_error(path, e))?;
        let text = collapse_blank_lines(&raw);
        if text.is_empty() {
            tracing::debug!("Page {} of {:?} has no text layer", index, path);
            continue;
        }

        let mut metadata = MetadataMap::new();
        metadata.insert(PAGE_KEY.to_string(), MetadataValue::Integer(index as i64));
        pages.push(ParsedDocument { text, metadata });
    }

    tracing::debug!(
        "Extracted {} of {} pages from {:?}",
        pages.len(),
        page_count,
        path
    );

    Ok(pages)
}

fn pdf_error(path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::Ingestion(format!("Failed to read PDF {:?}: {}", path, e))
}

/// Trim every line and drop the empty ones.
fn collapse_blank_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Separate a leading `---` YAML block from the body.
///
/// A block that is not a YAML mapping is logged and ignored; the body is
/// still returned without it.
fn split_front_matter<'a>(raw: &'a str, path: &Path) -> (MetadataMap, &'a str) {
    let Some(rest) = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))
    else {
        return (MetadataMap::new(), raw);
    };

    let Some(end) = rest.find("\n---") else {
        return (MetadataMap::new(), raw);
    };

    let yaml = &rest[..end];
    let after = &rest[end + 4..];
    let body = after
        .find('\n')
        .map(|i| &after[i + 1..])
        .unwrap_or("");

    let metadata = match serde_yaml::from_str::<serde_yaml::Mapping>(yaml) {
        Ok(mapping) => mapping
            .iter()
            .filter_map(|(k, v)| {
                let key = k.as_str()?;
                MetadataValue::from_yaml(v).map(|value| (key.to_string(), value))
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Ignoring malformed front matter in {:?}: {}", path, e);
            MetadataMap::new()
        }
    };

    (metadata, body)
}

/// Clean markdown by removing excess formatting.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        // Remove markdown headers
        let trimmed = line.trim_start_matches('#').trim();

        // Skip horizontal rules and code fences
        if trimmed.starts_with("---") || trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }

        if !trimmed.is_empty() {
            result.push_str(trimmed);
            result.push('\n');
        }
    }

    result.trim().to_string()
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Clean HTML by stripping tags, scripts and styles.
fn clean_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    for (i, ch) in text.char_indices() {
        if ch == '<' {
            in_tag = true;
            let rest = &text[i..];

            if starts_with_ignore_case(rest, "<script") {
                in_script = true;
            } else if starts_with_ignore_case(rest, "</script") {
                in_script = false;
            } else if starts_with_ignore_case(rest, "<style") {
                in_style = true;
            } else if starts_with_ignore_case(rest, "</style") {
                in_style = false;
            }
        } else if ch == '>' {
            in_tag = false;
            // Tags separate words: "<td>a</td><td>b</td>"
            result.push(' ');
        } else if !in_tag && !in_script && !in_style {
            result.push(ch);
        }
    }

    let decoded = result
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    // Collapse whitespace
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::minimal_pdf;
    use tempfile::TempDir;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(
            ContentType::from_path(Path::new("file.md")),
            ContentType::Markdown
        );
        assert_eq!(
            ContentType::from_path(Path::new("INDEX.HTML")),
            ContentType::Html
        );
        assert_eq!(
            ContentType::from_path(Path::new("file.txt")),
            ContentType::PlainText
        );
        assert_eq!(
            ContentType::from_path(Path::new("Report.PDF")),
            ContentType::Pdf
        );
        assert_eq!(
            ContentType::from_path(Path::new("slides.pptx")),
            ContentType::Unsupported
        );
    }

    #[test]
    fn test_clean_markdown() {
        let input = "# Header\n\nSome text\n\n```rust\ncode\n```\n\nMore text";
        let output = clean_markdown(input);
        assert!(output.contains("Header"));
        assert!(output.contains("Some text"));
        assert!(output.contains("More text"));
        assert!(!output.contains("```"));
    }

    #[test]
    fn test_clean_html() {
        let input = "<html><body><p>Hello <b>world</b></p></body></html>";
        assert_eq!(clean_html(input), "Hello world");
    }

    #[test]
    fn test_clean_html_drops_scripts_and_decodes_entities() {
        let input = "<p>R&amp;D</p><script>var x = 1;</script><STYLE>p{}</STYLE><p>café</p>";
        assert_eq!(clean_html(input), "R&D café");
    }

    #[test]
    fn test_front_matter_becomes_metadata() {
        let raw = "---\nyear: 2021\ntopic: ml\ntags: [a, b]\n---\n# Title\nBody text\n";
        let (metadata, body) = split_front_matter(raw, Path::new("a.md"));

        assert_eq!(metadata.get("year"), Some(&MetadataValue::Integer(2021)));
        assert_eq!(metadata.get("topic"), Some(&MetadataValue::Text("ml".into())));
        assert!(!metadata.contains_key("tags"));
        assert_eq!(body, "# Title\nBody text\n");
    }

    #[test]
    fn test_no_front_matter() {
        let raw = "# Title\n---\nBody";
        let (metadata, body) = split_front_matter(raw, Path::new("a.md"));
        assert!(metadata.is_empty());
        assert_eq!(body, raw);
    }

    #[test]
    fn test_parse_markdown_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.md");
        fs::write(&path, "---\ntopic: nlp\n---\n## Tokenizers\nSplit text into tokens.\n").unwrap();

        let docs = parse_file(&path).unwrap();
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.text, "Tokenizers\nSplit text into tokens.");
        assert_eq!(doc.metadata.get("topic"), Some(&MetadataValue::Text("nlp".into())));
    }

    #[test]
    fn test_parse_unsupported_is_ingestion_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("deck.pptx");
        fs::write(&path, "PK").unwrap();

        assert_eq!(parse_file(&path).unwrap_err().kind(), "ingestion");
    }

    #[test]
    fn test_parse_pdf_one_document_per_page() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rates.pdf");
        fs::write(
            &path,
            minimal_pdf(&["Gold loan interest rate", "Repayment schedule"]),
        )
        .unwrap();

        let pages = parse_file(&path).unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].text.contains("Gold loan interest rate"));
        assert!(pages[1].text.contains("Repayment schedule"));
        assert_eq!(pages[0].metadata.get(PAGE_KEY), Some(&MetadataValue::Integer(0)));
        assert_eq!(pages[1].metadata.get(PAGE_KEY), Some(&MetadataValue::Integer(1)));
    }

    #[test]
    fn test_parse_corrupt_pdf_is_ingestion_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scan.pdf");
        fs::write(&path, "%PDF-1.7\nnot really a pdf").unwrap();

        assert_eq!(parse_file(&path).unwrap_err().kind(), "ingestion");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("  a \n\n\n b\n  "), "a\nb");
        assert_eq!(collapse_blank_lines(" \n "), "");
    }
}
