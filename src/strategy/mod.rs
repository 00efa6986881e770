//! Extraction strategies and their registry.
//!
//! A strategy turns one source PDF into one artifact on disk. Every strategy
//! implements [`ExtractionStrategy`]; the [`StrategyRegistry`] keeps them in
//! registration order, which is the order the batch driver runs them in.
//!
//! Adding a strategy means implementing the trait and registering a
//! [`StrategyDescriptor`]; nothing else changes.

pub mod external;
pub mod local;
pub mod remote;

use crate::config::Config;
use crate::error::{BenchError, Result};
use crate::llm::LlmClient;
use crate::metrics::ExtraMetrics;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use external::{OcrLlmCorrected, PdftotextLayout, TesseractOcr};
pub use local::{LopdfHtml, LopdfPages, PdfExtractText};
pub use remote::{ParseResultType, ParseServiceClient, RemoteParse};

/// Page delimiter written between pages of plain-text artifacts.
pub const PAGE_DELIMITER: char = '\x0C';

/// Converts a source document into an artifact at `output`.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Extract `input` into `output`, returning any metrics the technique reports.
    async fn extract(&self, input: &Path, output: &Path) -> Result<ExtraMetrics>;
}

/// A named strategy and the artifact file it produces.
#[derive(Clone)]
pub struct StrategyDescriptor {
    pub name: String,
    /// Artifact file name inside the per-document output folder.
    pub output_file: String,
    pub strategy: Arc<dyn ExtractionStrategy>,
}

impl std::fmt::Debug for StrategyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyDescriptor")
            .field("name", &self.name)
            .field("output_file", &self.output_file)
            .finish()
    }
}

impl StrategyDescriptor {
    pub fn new(
        name: impl Into<String>,
        output_file: impl Into<String>,
        strategy: impl ExtractionStrategy + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            output_file: output_file.into(),
            strategy: Arc::new(strategy),
        }
    }

    /// Artifact path inside `document_dir`.
    pub fn output_path(&self, document_dir: &Path) -> PathBuf {
        document_dir.join(&self.output_file)
    }
}

/// Ordered set of uniquely named strategies.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    descriptors: Vec<StrategyDescriptor>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy. Names must be unique.
    pub fn register(&mut self, descriptor: StrategyDescriptor) -> Result<()> {
        if self.get(&descriptor.name).is_some() {
            return Err(BenchError::Registry(format!(
                "strategy '{}' is already registered",
                descriptor.name
            )));
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Builder-style [`StrategyRegistry::register`].
    pub fn with(mut self, descriptor: StrategyDescriptor) -> Result<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&StrategyDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StrategyDescriptor> {
        self.descriptors.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Keep only the named strategies, preserving registration order.
    pub fn retain_only(self, names: &[String]) -> Result<Self> {
        if let Some(unknown) = names.iter().find(|n| self.get(n).is_none()) {
            return Err(BenchError::Registry(format!(
                "unknown strategy '{}' (available: {})",
                unknown,
                self.names().join(", ")
            )));
        }
        Ok(Self {
            descriptors: self
                .descriptors
                .into_iter()
                .filter(|d| names.contains(&d.name))
                .collect(),
        })
    }

    /// The standard strategy line-up, built from configuration.
    pub fn standard(config: &Config) -> Result<Self> {
        let llm = Arc::new(LlmClient::new(config.llm.clone()));
        let parser = ParseServiceClient::new(config.parse_service.clone(), config.llm.timeout_secs);

        Self::new()
            .with(StrategyDescriptor::new("pdf_extract", "pdf_extract.txt", PdfExtractText))?
            .with(StrategyDescriptor::new("lopdf_pages", "lopdf_pages.txt", LopdfPages))?
            .with(StrategyDescriptor::new("lopdf_html", "lopdf_html.html", LopdfHtml))?
            .with(StrategyDescriptor::new(
                "pdftotext_layout",
                "pdftotext_layout.txt",
                PdftotextLayout::new(&config.ocr),
            ))?
            .with(StrategyDescriptor::new(
                "tesseract_ocr",
                "tesseract_ocr.txt",
                TesseractOcr::new(config.ocr.clone()),
            ))?
            .with(StrategyDescriptor::new(
                "ocr_llm_corrected",
                "ocr_llm_corrected.md",
                OcrLlmCorrected::new(config.ocr.clone(), llm, config.llm.model.clone()),
            ))?
            .with(StrategyDescriptor::new(
                "remote_parse_md",
                "remote_parse.md",
                RemoteParse::new(parser.clone(), ParseResultType::Markdown),
            ))?
            .with(StrategyDescriptor::new(
                "remote_parse_txt",
                "remote_parse.txt",
                RemoteParse::new(parser, ParseResultType::Text),
            ))
    }
}

/// Write an artifact, creating its folder when needed.
pub(crate) fn write_artifact(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
        }
    }
    fs::write(path, content).map_err(|e| BenchError::io(path, e))
}

/// Join page texts, terminating each page with [`PAGE_DELIMITER`].
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(page.as_ref());
        text.push(PAGE_DELIMITER);
    }
    text
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by strategy and driver tests.

    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};
    use std::path::Path;

    /// Write a PDF with one Courier text line per page.
    pub fn write_sample_pdf(path: &Path, pages: &[&str]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl ExtractionStrategy for Noop {
        async fn extract(&self, _input: &Path, output: &Path) -> Result<ExtraMetrics> {
            write_artifact(output, "")?;
            Ok(ExtraMetrics::none())
        }
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = StrategyRegistry::new();
        registry.register(StrategyDescriptor::new("a", "a.txt", Noop)).unwrap();
        let err = registry.register(StrategyDescriptor::new("a", "other.txt", Noop));
        assert!(matches!(err, Err(BenchError::Registry(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_retain_only_keeps_registration_order() {
        let registry = StrategyRegistry::new()
            .with(StrategyDescriptor::new("a", "a.txt", Noop))
            .unwrap()
            .with(StrategyDescriptor::new("b", "b.txt", Noop))
            .unwrap()
            .with(StrategyDescriptor::new("c", "c.txt", Noop))
            .unwrap();

        let filtered = registry
            .clone()
            .retain_only(&["c".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(filtered.names(), vec!["a", "c"]);

        assert!(registry.retain_only(&["missing".to_string()]).is_err());
    }

    #[test]
    fn test_standard_registry() {
        let registry = StrategyRegistry::standard(&Config::default()).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "pdf_extract",
                "lopdf_pages",
                "lopdf_html",
                "pdftotext_layout",
                "tesseract_ocr",
                "ocr_llm_corrected",
                "remote_parse_md",
                "remote_parse_txt",
            ]
        );
        let mut files: Vec<_> = registry.iter().map(|d| d.output_file.clone()).collect();
        files.sort();
        files.dedup();
        assert_eq!(files.len(), registry.len());
    }

    #[test]
    fn test_join_pages() {
        assert_eq!(join_pages(&["one", "two"]), "one\x0Ctwo\x0C");
        assert_eq!(join_pages::<&str>(&[]), "");
    }

    #[test]
    fn test_output_path() {
        let descriptor = StrategyDescriptor::new("a", "a.txt", Noop);
        assert_eq!(
            descriptor.output_path(Path::new("out/report")),
            PathBuf::from("out/report/a.txt")
        );
    }
}
