//! Source documents of a benchmark run.
//!
//! A source document is one file in the input directory. Its stem (the file
//! name up to the first `.`) names the per-document output folder and the
//! question set that belongs to it.

use crate::error::{BenchError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Full path of the input file.
    pub path: PathBuf,
    /// File name including extensions.
    pub file_name: String,
    /// File name up to the first `.`.
    pub stem: String,
}

impl SourceDocument {
    /// Describe the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = document_stem(&file_name).to_string();
        Self {
            path,
            file_name,
            stem,
        }
    }

    /// Per-document output folder under `output_dir`.
    pub fn output_dir(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(&self.stem)
    }
}

/// File name up to the first `.`; `report.v2.pdf` becomes `report`.
pub fn document_stem(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

/// List the files of `input_dir` in directory-listing order.
///
/// The order is whatever the platform returns; it is not sorted. Files
/// without a stem, such as `.hidden.pdf`, have no output folder and are
/// skipped.
pub fn list_input_files(input_dir: &Path) -> Result<Vec<SourceDocument>> {
    if !input_dir.is_dir() {
        return Err(BenchError::InvalidInputDir(input_dir.to_path_buf()));
    }

    let entries = fs::read_dir(input_dir).map_err(|e| BenchError::io(input_dir, e))?;
    let mut documents = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BenchError::io(input_dir, e))?;
        let file_type = entry.file_type().map_err(|e| BenchError::io(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        let document = SourceDocument::new(entry.path());
        if document.stem.is_empty() {
            warn!(file = %document.path.display(), "file name has no stem, skipping");
            continue;
        }
        documents.push(document);
    }
    Ok(documents)
}

/// Number of pages of a PDF file.
pub fn page_count(path: &Path) -> Result<usize> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| BenchError::Serialization(format!("Failed to load PDF {:?}: {}", path, e)))?;
    Ok(doc.get_pages().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_document_stem() {
        assert_eq!(document_stem("report.pdf"), "report");
        assert_eq!(document_stem("report.v2.pdf"), "report");
        assert_eq!(document_stem("README"), "README");
    }

    #[test]
    fn test_source_document() {
        let doc = SourceDocument::new("input/annual.report.pdf");
        assert_eq!(doc.file_name, "annual.report.pdf");
        assert_eq!(doc.stem, "annual");
        assert_eq!(doc.output_dir(Path::new("out")), PathBuf::from("out/annual"));
    }

    #[test]
    fn test_list_input_files_skips_directories() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("b.pdf"), b"%PDF").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let mut stems: Vec<_> = list_input_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|d| d.stem)
            .collect();
        stems.sort();
        assert_eq!(stems, vec!["a", "b"]);
    }

    #[test]
    fn test_list_input_files_skips_dotfiles() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".hidden.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("report.pdf"), b"%PDF").unwrap();

        let documents = list_input_files(dir.path()).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].stem, "report");
    }

    #[test]
    fn test_list_input_files_missing_dir() {
        let result = list_input_files(Path::new("/nonexistent/input"));
        assert!(matches!(result, Err(BenchError::InvalidInputDir(_))));
    }

    #[test]
    fn test_page_count_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"not a pdf").unwrap();
        assert!(page_count(&path).is_err());
    }
}
