//! Format detection and text conversion.
//!
//! Each supported file format maps to one [`FileFormat`] variant with a
//! converter that produces a plain-text/Markdown rendition preserving read
//! order. Unsupported extensions are a skip signal, not a failure: the
//! ingestion pass continues over the rest of the directory. Malformed
//! content is a per-file failure.

use std::path::Path;

use thiserror::Error;

/// Rows included in the Markdown preview of a tabular file.
const CSV_PREVIEW_ROWS: usize = 500;

/// Closed set of supported file formats, resolved once per file.
///
/// Adding a format means adding a variant here plus a converter arm in
/// [`convert`]; dispatch never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Structured data (`.json`), rendered as a fenced pretty-printed block.
    Json,
    /// Tabular data (`.csv`), rendered as schema plus a bounded preview table.
    Csv,
    /// Markup (`.html`, `.htm`), rendered as visible text.
    Html,
    /// Documents (`.pdf`), rendered via text extraction.
    Pdf,
    /// Plain text and Markdown (`.txt`, `.md`), ingested as-is.
    Text,
}

impl FileFormat {
    /// Resolve the format tag from a path's extension.
    ///
    /// Returns `None` for unsupported or missing extensions.
    pub fn from_path(path: &Path) -> Option<FileFormat> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(FileFormat::Json),
            "csv" => Some(FileFormat::Csv),
            "html" | "htm" => Some(FileFormat::Html),
            "pdf" => Some(FileFormat::Pdf),
            "txt" | "md" | "markdown" => Some(FileFormat::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Json => "json",
            FileFormat::Csv => "csv",
            FileFormat::Html => "html",
            FileFormat::Pdf => "pdf",
            FileFormat::Text => "text",
        }
    }
}

/// Conversion error. `Unsupported` skips the file; `Malformed` fails it.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("unsupported file format: {0}")]
    Unsupported(String),

    #[error("{format} conversion failed: {message}")]
    Malformed {
        format: &'static str,
        message: String,
    },
}

/// Convert raw file bytes into normalized text for the given format.
pub fn convert(format: FileFormat, bytes: &[u8]) -> Result<String, ConvertError> {
    match format {
        FileFormat::Json => convert_json(bytes),
        FileFormat::Csv => convert_csv(bytes),
        FileFormat::Html => convert_html(bytes),
        FileFormat::Pdf => convert_pdf(bytes),
        FileFormat::Text => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn convert_json(bytes: &[u8]) -> Result<String, ConvertError> {
    let raw = String::from_utf8_lossy(bytes);
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| ConvertError::Malformed {
            format: "json",
            message: e.to_string(),
        })?;
    let pretty = serde_json::to_string_pretty(&value).map_err(|e| ConvertError::Malformed {
        format: "json",
        message: e.to_string(),
    })?;
    Ok(format!("```json\n{}\n```", pretty))
}

fn convert_csv(bytes: &[u8]) -> Result<String, ConvertError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ConvertError::Malformed {
            format: "csv",
            message: e.to_string(),
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut out = String::from("### Schema\n\n");
    for header in &headers {
        out.push_str(&format!("- **{}**\n", header));
    }

    out.push_str("\n### Preview (first rows)\n\n");
    out.push_str(&format!("| {} |\n", headers.join(" | ")));
    out.push_str(&format!(
        "|{}\n",
        " --- |".repeat(headers.len().max(1))
    ));

    for record in reader.records().take(CSV_PREVIEW_ROWS) {
        let record = record.map_err(|e| ConvertError::Malformed {
            format: "csv",
            message: e.to_string(),
        })?;
        let cells: Vec<String> = record.iter().map(|c| c.replace('|', "\\|")).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    Ok(out)
}

fn convert_html(bytes: &[u8]) -> Result<String, ConvertError> {
    let raw = String::from_utf8_lossy(bytes);
    let document = scraper::Html::parse_document(&raw);
    let text = visible_text(document.root_element());

    // Collapse whitespace: trimmed lines joined by blank lines.
    let lines: Vec<&str> = text
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect();
    Ok(lines.join("\n\n"))
}

/// Collect text nodes, skipping script/style/noscript subtrees.
fn visible_text(element: scraper::ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.children() {
        if let Some(child) = scraper::ElementRef::wrap(node) {
            match child.value().name() {
                "script" | "style" | "noscript" => continue,
                _ => {
                    let inner = visible_text(child);
                    if !inner.is_empty() {
                        out.push_str(&inner);
                        out.push('\n');
                    }
                }
            }
        } else if let Some(text) = node.value().as_text() {
            out.push_str(text);
        }
    }
    out
}

fn convert_pdf(bytes: &[u8]) -> Result<String, ConvertError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ConvertError::Malformed {
        format: "pdf",
        message: e.to_string(),
    })
}
